use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{header, redirect, Url};
use reqwest_cookie_store::{CookieStore, CookieStoreMutex};

use crate::config::Config;

pub const LIVE_ORIGIN: &str = "https://live.douyin.com/";

/// Which browser the request pretends to come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agent {
    Mobile,
    Desktop,
}

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("invalid url {0}")]
    InvalidUrl(String),
    #[error("could not seed cookie: {0}")]
    CookieError(String),
    #[error("request timed out")]
    Timeout,
}

/// The two kinds of GET this crate issues.
///
/// [`HttpClient`] is the real implementation; resolvers and the category
/// orchestrator are generic over it so they run against canned pages too.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches `url` and returns the body, failing on non-2xx.
    async fn get_text(&self, url: &str, agent: Agent) -> Result<String, FetchError>;

    /// Fetches `url` without following redirects and returns the `Location`
    /// header, if any.
    async fn get_location(&self, url: &str) -> Result<Option<String>, FetchError>;
}

pub struct HttpClient {
    pub client: reqwest::Client,
    pub no_redirect: reqwest::Client,
    pub cookies: Arc<CookieStoreMutex>,
    mobile_user_agent: String,
    desktop_user_agent: String,
}

impl HttpClient {
    pub fn new(config: &Config) -> Result<HttpClient, FetchError> {
        let origin = Url::parse(LIVE_ORIGIN).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        let mut store = CookieStore::default();
        store
            .parse(&format!("__ac_nonce={}", config.ac_nonce), &origin)
            .map_err(|e| FetchError::CookieError(e.to_string()))?;
        let cookies = Arc::new(CookieStoreMutex::new(store));

        let client = reqwest::Client::builder()
            .cookie_provider(cookies.clone())
            .timeout(config.timeout)
            .build()?;

        let no_redirect = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(config.timeout)
            .build()?;

        Ok(HttpClient {
            client,
            no_redirect,
            cookies,
            mobile_user_agent: config.mobile_user_agent.clone(),
            desktop_user_agent: config.desktop_user_agent.clone(),
        })
    }

    fn user_agent(&self, agent: Agent) -> &str {
        match agent {
            Agent::Mobile => &self.mobile_user_agent,
            Agent::Desktop => &self.desktop_user_agent,
        }
    }

    pub async fn fetch_text(&self, url: &str, agent: Agent) -> Result<String, FetchError> {
        debug!("GET {}", url);
        self.client
            .get(url)
            .header(header::USER_AGENT, self.user_agent(agent))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
            .map_err(|e| e.into())
    }

    pub async fn fetch_location(&self, url: &str) -> Result<Option<String>, FetchError> {
        debug!("GET {} (redirects suppressed)", url);
        let resp = self
            .no_redirect
            .get(url)
            .header(header::USER_AGENT, self.user_agent(Agent::Mobile))
            .send()
            .await?;

        Ok(resp
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from))
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn get_text(&self, url: &str, agent: Agent) -> Result<String, FetchError> {
        self.fetch_text(url, agent).await
    }

    async fn get_location(&self, url: &str) -> Result<Option<String>, FetchError> {
        self.fetch_location(url).await
    }
}

/// First entry of a possibly empty list, or an empty string.
pub fn first_or_default(list: &[String]) -> String {
    list.first().cloned().unwrap_or_default()
}
