//! The portal request pipeline.
//!
//! One call to [`PortalClient::fetch`] runs, in order and without retries:
//! home page warm-up, calls page visit, CSRF token pickup, API dispatch,
//! and artifact persistence. Only a failed warm-up or a failed API
//! transport ends the run with an error; everything else is logged and the
//! pipeline keeps going so whatever the portal returned gets saved.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::artifact::{copy_artifact, ArtifactWriter, DebugReport};
use crate::config::{PortalConfig, RequestMethod};
use crate::error::{PortalError, PortalResult};
use crate::portal::payload::RequestParams;
use crate::portal::response::{ApiResponse, ResponseBody};
use crate::portal::session::{header_pairs, Session};

/// Outcome of a run that got an API response, whatever its status.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub response: ApiResponse,
    pub body: ResponseBody,
    /// Saved response body; `None` when the body was empty.
    pub artifact: Option<PathBuf>,
    /// Written only for non-200 responses.
    pub debug_artifact: Option<PathBuf>,
}

/// How a run that got a response ends.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A 200 whose body parsed as JSON.
    Data(Value),
    /// Any status other than 200.
    HttpStatus(u16),
    /// A 200 whose body is empty or not JSON.
    NotJson,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Data(_))
    }
}

impl Exchange {
    pub fn status(&self) -> u16 {
        self.response.status
    }

    /// The decoded body of a 200 response, if it parses as JSON.
    pub fn json(&self) -> Option<Value> {
        if !self.response.is_success() {
            return None;
        }
        match &self.body {
            ResponseBody::Json(value) => Some(value.clone()),
            _ => self.response.json().ok(),
        }
    }

    /// Decide whether the run succeeded. Only a 200 with a JSON body does.
    pub fn outcome(&self) -> Outcome {
        if !self.response.is_success() {
            return Outcome::HttpStatus(self.status());
        }
        match self.json() {
            Some(value) => Outcome::Data(value),
            None => Outcome::NotJson,
        }
    }

    /// Copy the saved response to `dest`, but only for a successful run.
    ///
    /// Returns `false` when nothing was copied.
    pub fn copy_to(&self, dest: &Path) -> PortalResult<bool> {
        let Some(saved) = self.artifact.as_deref() else {
            return Ok(false);
        };
        if !self.outcome().is_success() {
            return Ok(false);
        }
        copy_artifact(saved, dest)
    }
}

/// Client for one portal. Holds configuration only; each fetch opens its
/// own session and drops it when done.
pub struct PortalClient {
    config: PortalConfig,
}

impl PortalClient {
    pub fn new(config: PortalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    /// Run the full pipeline, stamping artifacts with the current local time.
    pub async fn fetch(&self, params: &RequestParams) -> PortalResult<Exchange> {
        self.fetch_at(params, Local::now()).await
    }

    /// Run the full pipeline with an explicit capture time.
    pub async fn fetch_at(
        &self,
        params: &RequestParams,
        captured_at: DateTime<Local>,
    ) -> PortalResult<Exchange> {
        let site = self.config.site_name();
        let api_url = self.config.api_url(params.agency_id)?;
        let writer = ArtifactWriter::new(&self.config.output_dir, &site, captured_at);
        info!(url = %api_url, "using API endpoint");
        debug!(
            dir = %writer.dir().display(),
            timestamp = writer.timestamp(),
            "artifact destination"
        );

        if !self.config.verify_ssl {
            debug!("TLS certificate verification is disabled for this portal");
        }

        let mut session = Session::new(&self.config)?;

        self.warm_up(&mut session, &site).await?;
        let referer = self.visit_calls_page(&mut session).await?;

        session.use_api_headers(self.config.origin(), &referer)?;
        match session.attach_csrf_token()? {
            Some(token) => {
                let preview: String = token.chars().take(15).collect();
                info!("found CSRF token: {preview}...");
            }
            None => warn!(
                "no CSRF token found in cookies; some portals require it for API access"
            ),
        }

        let payload = serde_json::to_value(params.payload())?;
        let response = self.dispatch(&session, &api_url, params, &payload).await?;
        session.remember_url(&api_url);

        info!(status = response.status, "response status");
        info!(content_type = %response.content_type, "response content type");

        let body = response.classify();
        let artifact = if response.body.is_empty() {
            warn!("response body is empty; nothing to save");
            None
        } else {
            let path = writer.write_response(params.agency_id, &response, &body)?;
            info!(path = %path.display(), kind = body.extension(), "saved response");
            Some(path)
        };

        let debug_artifact = if response.status != 200 {
            warn!(status = response.status, "API request returned non-200 status");
            let headers_sent = header_pairs(session.headers());
            let cookies = session.cookies();
            let report = DebugReport {
                url: api_url.as_str(),
                status: response.status,
                headers_sent: &headers_sent,
                cookies: &cookies,
                payload: &payload,
                response: &response,
            };
            let path = writer.write_debug(&report)?;
            info!(path = %path.display(), "saved debug information");
            Some(path)
        } else {
            None
        };

        Ok(Exchange {
            response,
            body,
            artifact,
            debug_artifact,
        })
    }

    /// Visit the portal home page. The only fatal network step.
    async fn warm_up(&self, session: &mut Session, site: &str) -> PortalResult<()> {
        let url = self.config.home_url()?;
        info!(site, "visiting portal home page for cookies");

        let result = session
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match result {
            Ok(r) => {
                session.remember_url(r.url());
                info!(url = %url, "connected to portal");
                debug!(cookies = ?session.cookies(), "home page cookies");
                Ok(())
            }
            Err(e) => {
                error!(url = %url, error = %e, "cannot access portal home page");
                Err(PortalError::Connectivity {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Try each configured calls page in order until one answers 2xx.
    ///
    /// Failure of every candidate is tolerated. The first candidate is used
    /// as the API referer when none succeeds.
    async fn visit_calls_page(&self, session: &mut Session) -> PortalResult<Url> {
        let candidates = self
            .config
            .secondary_paths
            .iter()
            .map(|p| self.config.page_url(p))
            .collect::<PortalResult<Vec<Url>>>()?;

        let Some(first) = candidates.first().cloned() else {
            return self.config.home_url();
        };

        for url in candidates {
            info!(url = %url, "visiting calls page");
            let result = session
                .get(url.clone())
                .send()
                .await
                .and_then(|r| r.error_for_status());
            match result {
                Ok(r) => {
                    session.remember_url(r.url());
                    info!(url = %url, "calls page reached");
                    return Ok(url);
                }
                Err(e) => warn!(url = %url, error = %e, "cannot access calls page"),
            }
        }

        // Possibly hides an auth failure; the API call will show it.
        warn!("no calls page reachable; continuing with API request anyway");
        Ok(first)
    }

    async fn dispatch(
        &self,
        session: &Session,
        api_url: &Url,
        params: &RequestParams,
        payload: &Value,
    ) -> PortalResult<ApiResponse> {
        info!(url = %api_url, method = %self.config.request_method, "making API request");
        debug!(headers = ?session.headers(), "request headers");

        let request = match self.config.request_method {
            RequestMethod::Post => {
                debug!(payload = %payload, "POST payload");
                session.post(api_url.clone()).json(payload)
            }
            RequestMethod::Get => {
                let query = params.query();
                debug!(query = ?query, "GET parameters");
                session.get(api_url.clone()).query(&query)
            }
        };

        // A connection dropped mid-body fails here too, not only in `send`.
        let result = match request.send().await {
            Ok(r) => ApiResponse::read(api_url.as_str(), r).await,
            Err(e) => Err(e),
        };
        result.map_err(|source| {
            error!(url = %api_url, error = %source, "error making API request");
            PortalError::Transport {
                url: api_url.to_string(),
                source,
            }
        })
    }
}
