use std::str::FromStr;

use crate::model::StreamManifest;

/// Label fragment the platform uses for its best quality.
const FULL_HD_LABEL: &str = "FULL_HD";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Uhd,
    Hd,
    Ld,
    Sd,
}

impl Quality {
    /// Parses a quality token case-insensitively. Anything else, including
    /// the empty string, means "no preference".
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "uhd" => Some(Quality::Uhd),
            "hd" => Some(Quality::Hd),
            "ld" => Some(Quality::Ld),
            "sd" => Some(Quality::Sd),
            _ => None,
        }
    }

    fn matches(self, label: &str, url: &str) -> bool {
        match self {
            Quality::Uhd => label.contains(FULL_HD_LABEL) || url.contains("_uhd"),
            Quality::Hd => url.contains("_hd"),
            Quality::Ld => url.contains("_ld"),
            Quality::Sd => url.contains("_sd"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamFormat {
    #[default]
    Flv,
    Hls,
}

impl FromStr for StreamFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flv" => Ok(StreamFormat::Flv),
            "hls" | "m3u8" => Ok(StreamFormat::Hls),
            other => Err(format!("unknown stream format {:?}", other)),
        }
    }
}

/// Picks one playback URL from `manifest` for the requested `quality`,
/// falling back to `default` when the token is unrecognised or nothing in
/// the manifest matches.
pub fn resolve<'a>(manifest: &'a StreamManifest, quality: &str, default: &'a str) -> &'a str {
    let Some(quality) = Quality::parse(quality) else {
        return default;
    };

    manifest
        .iter()
        .find(|(label, url)| quality.matches(label, url))
        .map(|(_, url)| url.as_str())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: &str = "https://pull.example.com/stage/stream-1.flv";

    fn manifest() -> StreamManifest {
        [
            ("FULL_HD1", "https://pull.example.com/stage/stream-1_or4.flv"),
            ("HD1", "https://pull.example.com/stage/stream-1_hd.flv"),
            ("SD1", "https://pull.example.com/stage/stream-1_ld.flv"),
            ("SD2", "https://pull.example.com/stage/stream-1_sd.flv"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn each_tier_picks_its_entry() {
        let m = manifest();
        assert_eq!(resolve(&m, "uhd", DEFAULT), m["FULL_HD1"]);
        assert_eq!(resolve(&m, "hd", DEFAULT), m["HD1"]);
        assert_eq!(resolve(&m, "ld", DEFAULT), m["SD1"]);
        assert_eq!(resolve(&m, "sd", DEFAULT), m["SD2"]);
        assert_eq!(resolve(&m, "HD", DEFAULT), m["HD1"]);
    }

    #[test]
    fn uhd_matches_url_marker() {
        let m: StreamManifest = [("ORIGION".to_string(), "https://a/b_uhd.flv".to_string())]
            .into_iter()
            .collect();
        assert_eq!(resolve(&m, "uhd", DEFAULT), "https://a/b_uhd.flv");
    }

    #[test]
    fn unknown_quality_uses_default() {
        let m = manifest();
        for q in ["", "4k", "origin", " "] {
            assert_eq!(resolve(&m, q, DEFAULT), DEFAULT);
        }
    }

    #[test]
    fn empty_manifest_uses_default() {
        let m = StreamManifest::new();
        for q in ["uhd", "hd", "ld", "sd", ""] {
            assert_eq!(resolve(&m, q, DEFAULT), DEFAULT);
        }
    }

    #[test]
    fn missing_tier_uses_default() {
        let mut m = manifest();
        m.remove("SD2");
        assert_eq!(resolve(&m, "sd", DEFAULT), DEFAULT);
    }

    #[test]
    fn stream_format_from_str() {
        assert_eq!("flv".parse(), Ok(StreamFormat::Flv));
        assert_eq!("M3U8".parse(), Ok(StreamFormat::Hls));
        assert_eq!("hls".parse(), Ok(StreamFormat::Hls));
        assert!("mp4".parse::<StreamFormat>().is_err());
    }
}
