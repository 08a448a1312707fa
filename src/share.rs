//! Turning share messages and links into user or room ids.

use std::sync::LazyLock;

use regex::Regex;

use crate::util::{FetchError, Transport};

pub const USER_PAGE_PREFIX: &str = "https://www.iesdouyin.com/share/user/";
pub const ROOM_PAGE_PREFIX: &str = "https://webcast.amemv.com/webcast/reflow/";
pub const SHORT_LINK_PREFIX: &str = "https://v.douyin.com/";

/// Shortest share code the platform issues.
const MIN_SHARE_CODE_LEN: usize = 7;

static NUMERIC_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]{10,20}").unwrap());

#[derive(thiserror::Error, Debug)]
pub enum ShareError {
    #[error("No URL found")]
    NoUrl,
    #[error("Short link still unresolved after {0} redirects")]
    TooManyRedirects(usize),
    #[error("Invalid id in {0}")]
    InvalidId(String),
    #[error("Could not resolve short link")]
    FetchError(#[from] FetchError),
}

/// What a canonical page URL points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageTarget {
    User(u64),
    Room(u64),
    ShortLink(String),
    Other,
}

/// What a command-line argument looks like.
///
/// A lone token of letters and digits is read as an account handle: share
/// codes and handles look alike, so a share code on its own must be passed
/// as its short link or inside the share message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Free text that should contain a share link or code.
    Share(String),
    RoomId(u64),
    /// A bare account handle.
    DouyinId(String),
}

impl Input {
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input.contains("://") || input.contains(char::is_whitespace) {
            return Input::Share(input.to_string());
        }
        if !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(id) = input.parse() {
                return Input::RoomId(id);
            }
        }
        Input::DouyinId(input.to_string())
    }
}

/// Finds a share link in `text` and returns it along with the text it was
/// built from. A user or room page URL wins, since it already carries the
/// id; then a full short link; otherwise the first alphanumeric run of at
/// least seven characters is taken as a share code.
pub fn find_page_url(text: &str) -> Option<(String, &str)> {
    if let Some(url) = find_direct_url(text) {
        return Some((url.to_string(), url));
    }

    for scheme in ["https://", "http://"] {
        let marker = format!("{}v.douyin.com/", scheme);
        let mut offset = 0;
        while let Some(idx) = text[offset..].find(&marker) {
            let idx_start = offset + idx;
            let idx_code = idx_start + marker.len();
            let code_len = alphanumeric_run(&text[idx_code..]);
            if code_len >= MIN_SHARE_CODE_LEN && text[idx_code + code_len..].starts_with('/') {
                let matched = &text[idx_start..=idx_code + code_len];
                return Some((matched.to_string(), matched));
            }
            offset = idx_code;
        }
    }

    let mut rest = text;
    while !rest.is_empty() {
        let len = alphanumeric_run(rest);
        if len >= MIN_SHARE_CODE_LEN {
            let code = &rest[..len];
            return Some((format!("{}{}/", SHORT_LINK_PREFIX, code), code));
        }
        let skip = rest[len..]
            .chars()
            .next()
            .map(|c| len + c.len_utf8())
            .unwrap_or(len);
        rest = &rest[skip..];
    }

    None
}

/// The first user or room page URL in `text`, up to the next whitespace.
fn find_direct_url(text: &str) -> Option<&str> {
    [USER_PAGE_PREFIX, ROOM_PAGE_PREFIX]
        .iter()
        .filter_map(|prefix| text.find(*prefix))
        .min()
        .map(|idx_start| {
            let rest = &text[idx_start..];
            let len = rest.find(char::is_whitespace).unwrap_or(rest.len());
            &rest[..len]
        })
}

/// Just the URL part of [`find_page_url`].
pub fn page_url(text: &str) -> Option<String> {
    find_page_url(text).map(|(url, _)| url)
}

fn alphanumeric_run(s: &str) -> usize {
    s.bytes().take_while(|b| b.is_ascii_alphanumeric()).count()
}

pub fn user_page_url(id: u64, sec_uid: &str) -> String {
    format!("{}{}?sec_uid={}", USER_PAGE_PREFIX, id, sec_uid)
}

pub fn room_page_url(id: u64) -> String {
    format!("{}{}", ROOM_PAGE_PREFIX, id)
}

/// Classifies a page URL by prefix, without touching the network.
pub fn classify(url: &str) -> Result<PageTarget, ShareError> {
    if url.starts_with(USER_PAGE_PREFIX) {
        return numeric_id(url).map(|id| id.map(PageTarget::User).unwrap_or(PageTarget::Other));
    }
    if url.starts_with(ROOM_PAGE_PREFIX) {
        return numeric_id(url).map(|id| id.map(PageTarget::Room).unwrap_or(PageTarget::Other));
    }
    if url.starts_with(SHORT_LINK_PREFIX) {
        return page_url(url)
            .map(PageTarget::ShortLink)
            .ok_or(ShareError::NoUrl);
    }

    Ok(PageTarget::Other)
}

fn numeric_id(url: &str) -> Result<Option<u64>, ShareError> {
    NUMERIC_ID
        .find(url)
        .map(|m| {
            m.as_str()
                .parse()
                .map_err(|_| ShareError::InvalidId(url.to_string()))
        })
        .transpose()
}

/// Resolves a page URL to `(user_id, room_id)`; exactly one of them is
/// non-zero when the URL points at a user or a room, both are zero for pages
/// of any other kind. Short links are followed through their `Location`
/// header, at most `max_redirects` times.
pub async fn resolve_ids<T>(
    transport: &T,
    url: &str,
    max_redirects: usize,
) -> Result<(u64, u64), ShareError>
where
    T: Transport + ?Sized,
{
    let mut url = url.to_string();
    let mut hops = 0;

    loop {
        match classify(&url)? {
            PageTarget::User(id) => return Ok((id, 0)),
            PageTarget::Room(id) => return Ok((0, id)),
            PageTarget::Other => return Ok((0, 0)),
            PageTarget::ShortLink(link) => {
                if hops == max_redirects {
                    return Err(ShareError::TooManyRedirects(max_redirects));
                }
                hops += 1;

                match transport.get_location(&link).await? {
                    Some(location) => {
                        debug!("{} redirects to {}", link, location);
                        url = location;
                    }
                    None => return Ok((0, 0)),
                }
            }
        }
    }
}

/// Finds a share link in free text and resolves it.
pub async fn resolve_share_text<T>(
    transport: &T,
    text: &str,
    max_redirects: usize,
) -> Result<(u64, u64), ShareError>
where
    T: Transport + ?Sized,
{
    let url = page_url(text).ok_or(ShareError::NoUrl)?;
    resolve_ids(transport, &url, max_redirects).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::testing::FixtureTransport;

    const ROOM_SHARE: &str = "#在抖音，记录美好生活#【红警直播舞虾】正在直播，来和我一起支持Ta吧。复制下方链接，打开【抖音】，直接观看直播！ https://v.douyin.com/e9oSECC/";
    const USER_SHARE: &str = "快来加入抖音，让你发现最有趣的我！ https://v.douyin.com/e9oPjy7/";

    #[test]
    fn finds_full_short_link() {
        let (url, matched) = find_page_url(ROOM_SHARE).unwrap();
        assert_eq!(url, "https://v.douyin.com/e9oSECC/");
        assert_eq!(matched, "https://v.douyin.com/e9oSECC/");

        let (url, _) = find_page_url("see http://v.douyin.com/abcdefg/ now").unwrap();
        assert_eq!(url, "http://v.douyin.com/abcdefg/");
    }

    #[test]
    fn direct_page_urls_win_over_share_codes() {
        let room_url = "https://webcast.amemv.com/webcast/reflow/6972728684293999374";
        let (url, matched) = find_page_url(room_url).unwrap();
        assert_eq!(url, room_url);
        assert_eq!(matched, room_url);

        let text = "看看 https://www.iesdouyin.com/share/user/94792729333?sec_uid=MS4wLjABAAAA 吧";
        assert_eq!(
            page_url(text).as_deref(),
            Some("https://www.iesdouyin.com/share/user/94792729333?sec_uid=MS4wLjABAAAA")
        );
    }

    #[test]
    fn synthesises_link_from_bare_code() {
        let (url, matched) = find_page_url("复制口令 e9oPjy7 打开").unwrap();
        assert_eq!(url, "https://v.douyin.com/e9oPjy7/");
        assert_eq!(matched, "e9oPjy7");

        assert!(find_page_url("短 abc 码").is_none());
        assert!(find_page_url("").is_none());
    }

    #[test]
    fn classifies_without_network() {
        assert_eq!(
            classify("https://www.iesdouyin.com/share/user/94792729333?sec_uid=MS4wLjABAAAA").unwrap(),
            PageTarget::User(94792729333)
        );
        assert_eq!(
            classify("https://webcast.amemv.com/webcast/reflow/6972728684293999374?u_code=1").unwrap(),
            PageTarget::Room(6972728684293999374)
        );
        assert_eq!(
            classify("https://v.douyin.com/e9oSECC/?from=share").unwrap(),
            PageTarget::ShortLink("https://v.douyin.com/e9oSECC/".to_string())
        );
        assert_eq!(
            classify("https://www.douyin.com/video/1").unwrap(),
            PageTarget::Other
        );
        assert!(matches!(
            classify("https://webcast.amemv.com/webcast/reflow/99999999999999999999"),
            Err(ShareError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn direct_urls_need_no_redirect() {
        let transport = FixtureTransport::default();

        let ids = resolve_ids(&transport, &user_page_url(94792729333, "x"), 5)
            .await
            .unwrap();
        assert_eq!(ids, (94792729333, 0));

        let ids = resolve_ids(&transport, &room_page_url(6972728684293999374), 5)
            .await
            .unwrap();
        assert_eq!(ids, (0, 6972728684293999374));
    }

    #[tokio::test]
    async fn direct_urls_in_text_resolve_offline() {
        // No redirects are known, so any lookup would come back empty.
        let transport = FixtureTransport::default();

        let ids = resolve_share_text(
            &transport,
            "https://webcast.amemv.com/webcast/reflow/6972728684293999374",
            5,
        )
        .await
        .unwrap();
        assert_eq!(ids, (0, 6972728684293999374));

        let ids = resolve_share_text(
            &transport,
            "https://www.iesdouyin.com/share/user/94792729333?sec_uid=MS4wLjABAAAA",
            5,
        )
        .await
        .unwrap();
        assert_eq!(ids, (94792729333, 0));
    }

    #[tokio::test]
    async fn short_links_follow_location() {
        let transport = FixtureTransport::default()
            .redirect(
                "https://v.douyin.com/e9oSECC/",
                "https://webcast.amemv.com/webcast/reflow/6972728684293999374?u_code=abc",
            )
            .redirect(
                "https://v.douyin.com/e9oPjy7/",
                "https://www.iesdouyin.com/share/user/94792729333?sec_uid=abc",
            );

        let ids = resolve_share_text(&transport, ROOM_SHARE, 5).await.unwrap();
        assert_eq!(ids, (0, 6972728684293999374));

        let ids = resolve_share_text(&transport, USER_SHARE, 5).await.unwrap();
        assert_eq!(ids, (94792729333, 0));
    }

    #[tokio::test]
    async fn redirect_chains_are_bounded() {
        let transport = FixtureTransport::default()
            .redirect("https://v.douyin.com/aaaaaaa/", "https://v.douyin.com/bbbbbbb/")
            .redirect("https://v.douyin.com/bbbbbbb/", "https://v.douyin.com/aaaaaaa/");

        let err = resolve_ids(&transport, "https://v.douyin.com/aaaaaaa/", 5)
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::TooManyRedirects(5)));
    }

    #[tokio::test]
    async fn missing_location_resolves_to_nothing() {
        let transport = FixtureTransport::default();
        let ids = resolve_ids(&transport, "https://v.douyin.com/zzzzzzz/", 5)
            .await
            .unwrap();
        assert_eq!(ids, (0, 0));
    }

    #[tokio::test]
    async fn text_without_link_is_an_error() {
        let transport = FixtureTransport::default();
        let err = resolve_share_text(&transport, "没有链接", 5).await.unwrap_err();
        assert!(matches!(err, ShareError::NoUrl));
    }

    #[test]
    fn parses_inputs() {
        assert_eq!(Input::parse("6972728684293999374"), Input::RoomId(6972728684293999374));
        assert_eq!(
            Input::parse(" maidanglaodo "),
            Input::DouyinId("maidanglaodo".to_string())
        );
        assert!(matches!(Input::parse(USER_SHARE), Input::Share(_)));
        assert!(matches!(
            Input::parse("https://v.douyin.com/e9oPjy7/"),
            Input::Share(_)
        ));
        assert!(matches!(
            Input::parse("https://webcast.amemv.com/webcast/reflow/6972728684293999374"),
            Input::Share(_)
        ));
        assert_eq!(Input::parse("e9oPjy7"), Input::DouyinId("e9oPjy7".to_string()));
    }
}
