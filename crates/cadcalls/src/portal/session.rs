//! Mutable session context for one portal run.
//!
//! Holds the cookie jar and the header set that later requests inherit.
//! Warm-up page visits fill the jar; the API step switches the headers to
//! XHR style and copies the CSRF cookie into a header.

use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, ORIGIN, REFERER,
    USER_AGENT,
};
use reqwest::redirect::Policy;
use reqwest::RequestBuilder;
use url::Url;

use crate::config::PortalConfig;
use crate::error::{PortalError, PortalResult};

/// Cookie some portals issue for anti-forgery checks.
pub const XSRF_COOKIE: &str = "XSRF-TOKEN";
/// Header the portal expects the cookie value echoed in.
pub const XSRF_HEADER: &str = "x-xsrf-token";

const PAGE_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8";
const API_ACCEPT: &str = "application/json, text/javascript, */*; q=0.01";

/// Cookies and default headers shared by the requests of one run.
pub struct Session {
    client: reqwest::Client,
    jar: Arc<Jar>,
    headers: HeaderMap,
    /// URLs cookies are looked up against: the site root, then every page
    /// that answered during the run.
    cookie_urls: Vec<Url>,
}

impl Session {
    /// Start a fresh session with browser-like page headers.
    pub fn new(config: &PortalConfig) -> PortalResult<Self> {
        let jar = Arc::new(Jar::default());

        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(config.timeout)
            .redirect(Policy::limited(10))
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| PortalError::Config(format!("cannot build HTTP client: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header_value(&config.user_agent)?);
        headers.insert(ACCEPT, HeaderValue::from_static(PAGE_ACCEPT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        Ok(Self {
            client,
            jar,
            headers,
            cookie_urls: vec![config.page_url("/")?],
        })
    }

    /// Headers every request in this session currently carries.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn get(&self, url: Url) -> RequestBuilder {
        self.client.get(url).headers(self.headers.clone())
    }

    pub fn post(&self, url: Url) -> RequestBuilder {
        self.client.post(url).headers(self.headers.clone())
    }

    /// Switch to the headers the portal's calls page uses for its XHR requests.
    pub fn use_api_headers(&mut self, origin: &str, referer: &Url) -> PortalResult<()> {
        self.headers.insert(ACCEPT, HeaderValue::from_static(API_ACCEPT));
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.headers.insert(ORIGIN, header_value(origin)?);
        self.headers.insert(REFERER, header_value(referer.as_str())?);
        self.headers.insert(
            HeaderName::from_static("x-requested-with"),
            HeaderValue::from_static("XMLHttpRequest"),
        );
        Ok(())
    }

    /// Copy the `XSRF-TOKEN` cookie into the `X-XSRF-TOKEN` header.
    ///
    /// Returns the token when one was found.
    pub fn attach_csrf_token(&mut self) -> PortalResult<Option<String>> {
        let Some(token) = self.cookie(XSRF_COOKIE) else {
            return Ok(None);
        };
        self.headers
            .insert(HeaderName::from_static(XSRF_HEADER), header_value(&token)?);
        Ok(Some(token))
    }

    /// Also look cookies up against `url`, so ones scoped to a narrower
    /// path or to a redirect host are found.
    pub fn remember_url(&mut self, url: &Url) {
        if !self.cookie_urls.contains(url) {
            self.cookie_urls.push(url.clone());
        }
    }

    /// Cookies the jar holds for any remembered URL, as name/value pairs.
    ///
    /// A name seen under several URLs keeps its first value.
    pub fn cookies(&self) -> Vec<(String, String)> {
        let mut found: Vec<(String, String)> = Vec::new();
        for url in &self.cookie_urls {
            let Some(header) = self.jar.cookies(url) else {
                continue;
            };
            let Ok(raw) = header.to_str() else {
                continue;
            };
            for pair in raw.split(';') {
                let Some((name, value)) = pair.trim().split_once('=') else {
                    continue;
                };
                if !found.iter().any(|(n, _)| n == name) {
                    found.push((name.to_string(), value.to_string()));
                }
            }
        }
        found
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies()
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

fn header_value(raw: &str) -> PortalResult<HeaderValue> {
    HeaderValue::from_str(raw)
        .map_err(|_| PortalError::Config(format!("invalid header value: '{raw}'")))
}

/// Header map flattened into printable pairs, in map order.
pub fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
        .collect()
}
