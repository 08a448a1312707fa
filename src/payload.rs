//! Locating server-rendered state inside a page.
//!
//! The platform has embedded its state in three different ways over time.
//! Each is a [`Convention`]; extraction never fails, it just returns no
//! candidates when the page does not look like what was expected.

use percent_encoding::percent_decode_str;

/// Reflow pages: `<script>window.__INIT_PROPS__ = {...}</script>`.
pub const INIT_PROPS_OPEN: &str = "<script>window.__INIT_PROPS__ = ";
pub const SCRIPT_CLOSE: &str = "</script>";

/// Category pages: `<script id="RENDER_DATA" ...>%7B...%7D</script>`.
pub const RENDER_DATA_MARKER: &str = "RENDER_DATA";

/// Streaming hydration: `<script>self.__pace_f.push([1,"..."])</script>`.
pub const HYDRATION_CALL: &str = "self.__pace_f.push(";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convention {
    /// Raw JSON assigned to a global inside a script element.
    ScriptAssignment,
    /// Percent-encoded JSON in the element tagged `RENDER_DATA`.
    RenderData,
    /// JSON string literals pushed into the hydration queue.
    Hydration,
}

impl Convention {
    /// Returns the candidate payloads this convention finds in `html`.
    pub fn extract(self, html: &str) -> Vec<String> {
        match self {
            Convention::ScriptAssignment => script_assignment(html, INIT_PROPS_OPEN)
                .map(|s| vec![s.to_string()])
                .unwrap_or_default(),
            Convention::RenderData => render_data(html).map(|s| vec![s]).unwrap_or_default(),
            Convention::Hydration => hydration_fragments(html),
        }
    }
}

/// Text between `marker` and the next `</script>`, trimmed.
pub fn script_assignment<'a>(html: &'a str, marker: &str) -> Option<&'a str> {
    let idx_start = html.find(marker)? + marker.len();
    let idx_end = html[idx_start..].find(SCRIPT_CLOSE)? + idx_start;

    Some(html[idx_start..idx_end].trim())
}

/// Percent-decoded text content of the element carrying `RENDER_DATA`.
pub fn render_data(html: &str) -> Option<String> {
    let idx_marker = html.find(RENDER_DATA_MARKER)?;
    let idx_start = html[idx_marker..].find('>')? + idx_marker + 1;
    let idx_end = html[idx_start..].find('<')? + idx_start;

    query_unescape(&html[idx_start..idx_end])
}

/// Decodes `+` and `%XX` the way a query string value is decoded. Invalid
/// UTF-8 after decoding yields `None`.
pub fn query_unescape(input: &str) -> Option<String> {
    let plus_decoded = input.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8()
        .ok()
        .map(|s| s.into_owned())
}

/// Collects every hydration string literal, unescapes and joins them with
/// newlines, then returns the outermost `[...]` or `{...}` span of each line.
pub fn hydration_fragments(html: &str) -> Vec<String> {
    let mut joined = String::new();
    let mut rest = html;

    while let Some(idx) = rest.find(HYDRATION_CALL) {
        rest = &rest[idx + HYDRATION_CALL.len()..];
        let Some(idx_end) = rest.find(SCRIPT_CLOSE) else {
            break;
        };
        let call = &rest[..idx_end];
        rest = &rest[idx_end..];

        if let Some(literal) = string_literal(call) {
            if !joined.is_empty() {
                joined.push('\n');
            }
            joined.push_str(&literal);
        }
    }

    joined.lines().filter_map(json_span).map(String::from).collect()
}

/// The first JSON string literal in a call such as `[1,"..."])`, decoded.
fn string_literal(call: &str) -> Option<String> {
    let idx_start = call.find('"')?;
    let idx_end = call.rfind('"')?;
    if idx_end <= idx_start {
        return None;
    }

    serde_json::from_str(&call[idx_start..=idx_end]).ok()
}

/// From the first `[` or `{` in `line` to the last matching closer.
pub fn json_span(line: &str) -> Option<&str> {
    let idx_start = line.find(['[', '{'])?;
    let close = if line[idx_start..].starts_with('[') {
        ']'
    } else {
        '}'
    };
    let idx_end = line.rfind(close)?;
    if idx_end < idx_start {
        return None;
    }

    Some(&line[idx_start..=idx_end])
}
