use std::time::Duration;

/// Mobile Safari, accepted by the reflow and category pages.
pub const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 13_2_3 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/13.0.3 Mobile/15E148 Safari/604.1";

/// Desktop Chrome, required by the live room page.
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Settings shared by every resolver and fetcher.
///
/// Nothing here is global: build one value and hand it to
/// [`HttpClient::new`](crate::util::HttpClient::new) and
/// [`Api::new`](crate::live::Api::new).
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Device id sent to the profile endpoint. It expires after a while, so
    /// treat it as a credential that may be rejected.
    pub device_id: u64,
    pub app_id: u32,
    /// Deadline for every single HTTP request.
    pub timeout: Duration,
    pub mobile_user_agent: String,
    pub desktop_user_agent: String,
    /// Value of the `__ac_nonce` cookie; without it the live page serves a
    /// bot challenge instead of the room.
    pub ac_nonce: String,
    /// Category whose page also carries the full top-level list.
    pub root_category: String,
    /// Maximum number of short-link hops followed before giving up.
    pub max_redirects: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_id: 66178590526,
            app_id: 1128,
            timeout: Duration::from_secs(5),
            mobile_user_agent: MOBILE_USER_AGENT.to_string(),
            desktop_user_agent: DESKTOP_USER_AGENT.to_string(),
            ac_nonce: "0123407cc00a9e438deb4".to_string(),
            root_category: "1_620".to_string(),
            max_redirects: 5,
        }
    }
}

impl Config {
    pub fn with_device_id(mut self, device_id: u64) -> Self {
        self.device_id = device_id;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_ac_nonce(mut self, ac_nonce: impl Into<String>) -> Self {
        self.ac_nonce = ac_nonce.into();
        self
    }

    pub fn with_root_category(mut self, id: impl Into<String>) -> Self {
        self.root_category = id.into();
        self
    }
}
