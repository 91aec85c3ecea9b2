//! Configuration loading and resolution.
//!
//! Settings come from a TOML file, then environment variables, then CLI
//! flags, each layer overriding the one before. The resolved
//! [`PortalConfig`] is handed to the portal client at construction.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{PortalError, PortalResult};

/// Browser user agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// API path relative to the base URL. `{agency_id}` is substituted per request.
pub const DEFAULT_API_ENDPOINT: &str = "/api/CADCalls/{agency_id}";

/// Directory artifacts are written to.
pub const DEFAULT_OUTPUT_DIR: &str = "cadcalls_results";

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Calls-page paths visited to collect cookies, in order.
pub const DEFAULT_SECONDARY_PATHS: [&str; 2] = ["/CADCalls", "/Home/CADCalls"];

const CONFIG_ENV: &str = "CADCALLS_CONFIG";
const BASE_URL_ENV: &str = "CADCALLS_BASE_URL";
const AGENCY_ID_ENV: &str = "CADCALLS_AGENCY_ID";

/// How the API request is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(try_from = "String")]
pub enum RequestMethod {
    /// JSON payload in the request body.
    #[default]
    Post,
    /// Paging and filter values as query parameters.
    Get,
}

impl FromStr for RequestMethod {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "POST" => Ok(RequestMethod::Post),
            "GET" => Ok(RequestMethod::Get),
            other => Err(PortalError::Config(format!(
                "unsupported request_method '{other}' (expected POST or GET)"
            ))),
        }
    }
}

impl TryFrom<String> for RequestMethod {
    type Error = PortalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestMethod::Post => f.write_str("POST"),
            RequestMethod::Get => f.write_str("GET"),
        }
    }
}

/// On-disk configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub portal: PortalSection,
    pub output: OutputSection,
    pub defaults: DefaultsSection,
    /// Named portal profiles layered over `[portal]`.
    pub sites: BTreeMap<String, PortalSection>,
}

/// `[portal]` table, also the shape of each `[sites.<name>]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PortalSection {
    pub base_url: Option<String>,
    pub agency_id: Option<u32>,
    pub api_endpoint: Option<String>,
    pub secondary_paths: Option<Vec<String>>,
    pub verify_ssl: Option<bool>,
    pub timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
    pub request_method: Option<RequestMethod>,
}

impl PortalSection {
    /// Fields set in `top` replace the ones in `self`.
    fn overlay(self, top: PortalSection) -> PortalSection {
        PortalSection {
            base_url: top.base_url.or(self.base_url),
            agency_id: top.agency_id.or(self.agency_id),
            api_endpoint: top.api_endpoint.or(self.api_endpoint),
            secondary_paths: top.secondary_paths.or(self.secondary_paths),
            verify_ssl: top.verify_ssl.or(self.verify_ssl),
            timeout_secs: top.timeout_secs.or(self.timeout_secs),
            user_agent: top.user_agent.or(self.user_agent),
            request_method: top.request_method.or(self.request_method),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub dir: PathBuf,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

/// Request parameter defaults used when a flag is not given.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DefaultsSection {
    pub include_open: bool,
    pub include_closed: bool,
    pub take: u32,
    pub skip: u32,
    pub search_text: String,
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            include_open: true,
            include_closed: false,
            take: 30,
            skip: 0,
            search_text: String::new(),
        }
    }
}

/// Values supplied on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub site: Option<String>,
    pub base_url: Option<String>,
    pub agency_id: Option<u32>,
    pub request_method: Option<RequestMethod>,
    pub timeout_secs: Option<u64>,
    pub output_dir: Option<PathBuf>,
}

impl Overrides {
    /// Fill fields the CLI left empty from `CADCALLS_BASE_URL` and
    /// `CADCALLS_AGENCY_ID`.
    pub fn fill_from_env(&mut self) -> PortalResult<()> {
        if self.base_url.is_none() {
            self.base_url = std::env::var(BASE_URL_ENV).ok().filter(|v| !v.is_empty());
        }
        if self.agency_id.is_none() {
            if let Ok(raw) = std::env::var(AGENCY_ID_ENV) {
                let id = raw.trim().parse::<u32>().map_err(|_| {
                    PortalError::Config(format!("{AGENCY_ID_ENV} is not an integer: '{raw}'"))
                })?;
                self.agency_id = Some(id);
            }
        }
        Ok(())
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub portal: PortalConfig,
    pub defaults: DefaultsSection,
}

/// Everything the portal client needs to reach one agency's portal.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Base address without a trailing slash, e.g. `https://town.policetocitizen.com`.
    base_url: String,
    pub agency_id: u32,
    pub api_endpoint: String,
    pub secondary_paths: Vec<String>,
    pub verify_ssl: bool,
    pub timeout: Duration,
    pub user_agent: String,
    pub request_method: RequestMethod,
    pub output_dir: PathBuf,
}

impl PortalConfig {
    /// Build a config with default settings for the given portal.
    pub fn new(base_url: &str, agency_id: u32) -> PortalResult<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            agency_id,
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            secondary_paths: DEFAULT_SECONDARY_PATHS.iter().map(|p| p.to_string()).collect(),
            verify_ssl: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_method: RequestMethod::Post,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The portal home page, visited first to pick up cookies.
    pub fn home_url(&self) -> PortalResult<Url> {
        parse_url(&self.base_url)
    }

    /// Value of the `Origin` header.
    pub fn origin(&self) -> &str {
        &self.base_url
    }

    /// A page under the portal, e.g. `/CADCalls`.
    pub fn page_url(&self, path: &str) -> PortalResult<Url> {
        let joined = if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        };
        parse_url(&joined)
    }

    /// The CAD calls API URL for an agency.
    ///
    /// A relative endpoint is appended to the base URL; an absolute one is used as is.
    pub fn api_url(&self, agency_id: u32) -> PortalResult<Url> {
        let endpoint = self
            .api_endpoint
            .replace("{agency_id}", &agency_id.to_string());
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            parse_url(&endpoint)
        } else {
            self.page_url(&endpoint)
        }
    }

    /// Short site label used in artifact names: the first label of the host.
    pub fn site_name(&self) -> String {
        let without_scheme = self
            .base_url
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        without_scheme
            .split(['.', '/', ':'])
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("portal")
            .to_string()
    }
}

fn parse_url(raw: &str) -> PortalResult<Url> {
    Url::parse(raw).map_err(|e| PortalError::Config(format!("invalid URL '{raw}': {e}")))
}

fn normalize_base_url(raw: &str) -> PortalResult<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() || trimmed.starts_with("REPLACE_WITH") {
        return Err(PortalError::Config(
            "portal base_url is not set (use --base-url, CADCALLS_BASE_URL or [portal] base_url)"
                .to_string(),
        ));
    }
    let url = parse_url(trimmed)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(PortalError::Config(format!(
            "portal base_url must be http or https: '{trimmed}'"
        )));
    }
    Ok(trimmed.to_string())
}

/// Resolve the configuration file path.
///
/// Order: explicit path, `CADCALLS_CONFIG`, `./cadcalls.toml`, then
/// `<config_dir>/cadcalls/config.toml`. Returns `None` when no file applies.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        if !env_path.is_empty() {
            return Some(PathBuf::from(env_path));
        }
    }

    let cwd_config = PathBuf::from("cadcalls.toml");
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    dirs::config_dir()
        .map(|dir| dir.join("cadcalls").join("config.toml"))
        .filter(|p| p.exists())
}

/// Read and parse a configuration file.
pub fn load_config_file(path: &Path) -> PortalResult<ConfigFile> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        PortalError::Config(format!("cannot read config {}: {e}", path.display()))
    })?;
    ConfigFile::parse(&raw)
        .map_err(|e| PortalError::Config(format!("{} in {}", e, path.display())))
}

impl ConfigFile {
    pub fn parse(raw: &str) -> PortalResult<Self> {
        toml::from_str(raw).map_err(|e| PortalError::Config(format!("invalid config: {e}")))
    }

    /// Merge file values with overrides into the settings for one run.
    pub fn into_settings(self, overrides: &Overrides) -> PortalResult<Settings> {
        let mut section = self.portal;
        if let Some(name) = &overrides.site {
            let site = self.sites.get(name).cloned().ok_or_else(|| {
                let known: Vec<&str> = self.sites.keys().map(String::as_str).collect();
                PortalError::Config(format!(
                    "unknown site '{name}' (configured: {})",
                    if known.is_empty() { "none".to_string() } else { known.join(", ") }
                ))
            })?;
            section = section.overlay(site);
        }

        let base_url = overrides
            .base_url
            .clone()
            .or(section.base_url)
            .unwrap_or_default();
        let agency_id = overrides.agency_id.or(section.agency_id).unwrap_or(0);

        let mut portal = PortalConfig::new(&base_url, agency_id)?;
        if let Some(endpoint) = section.api_endpoint {
            portal.api_endpoint = endpoint;
        }
        if let Some(paths) = section.secondary_paths {
            portal.secondary_paths = paths;
        }
        if let Some(verify) = section.verify_ssl {
            portal.verify_ssl = verify;
        }
        if let Some(secs) = overrides.timeout_secs.or(section.timeout_secs) {
            if secs == 0 {
                return Err(PortalError::Config("timeout must be at least 1 second".into()));
            }
            portal.timeout = Duration::from_secs(secs);
        }
        if let Some(ua) = section.user_agent {
            portal.user_agent = ua;
        }
        if let Some(method) = overrides.request_method.or(section.request_method) {
            portal.request_method = method;
        }
        portal.output_dir = overrides
            .output_dir
            .clone()
            .unwrap_or(self.output.dir);

        if self.defaults.take == 0 {
            return Err(PortalError::Config("[defaults] take must be positive".into()));
        }

        Ok(Settings {
            portal,
            defaults: self.defaults,
        })
    }
}

/// Load settings from the resolved config file (if any) plus overrides.
pub fn load_settings(config_path: Option<&Path>, overrides: &Overrides) -> PortalResult<Settings> {
    let file = match resolve_config_path(config_path) {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading configuration");
            load_config_file(&path)?
        }
        None => ConfigFile::default(),
    };
    file.into_settings(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [portal]
        base_url = "https://southmiamipdfl.policetocitizen.com/"
        agency_id = 386
        verify_ssl = true
        timeout_secs = 12
        request_method = "get"

        [output]
        dir = "out"

        [defaults]
        include_closed = true
        take = 50

        [sites.coral]
        base_url = "https://coralgables.policetocitizen.com"
        agency_id = 12
    "#;

    #[test]
    fn test_parse_full_file() {
        let settings = ConfigFile::parse(SAMPLE)
            .unwrap()
            .into_settings(&Overrides::default())
            .unwrap();
        let portal = &settings.portal;
        assert_eq!(portal.base_url(), "https://southmiamipdfl.policetocitizen.com");
        assert_eq!(portal.agency_id, 386);
        assert!(portal.verify_ssl);
        assert_eq!(portal.timeout, Duration::from_secs(12));
        assert_eq!(portal.request_method, RequestMethod::Get);
        assert_eq!(portal.output_dir, PathBuf::from("out"));
        assert!(settings.defaults.include_open);
        assert!(settings.defaults.include_closed);
        assert_eq!(settings.defaults.take, 50);
        assert_eq!(settings.defaults.skip, 0);
    }

    #[test]
    fn test_site_profile_overlays_portal() {
        let overrides = Overrides {
            site: Some("coral".into()),
            ..Default::default()
        };
        let settings = ConfigFile::parse(SAMPLE).unwrap().into_settings(&overrides).unwrap();
        assert_eq!(settings.portal.base_url(), "https://coralgables.policetocitizen.com");
        assert_eq!(settings.portal.agency_id, 12);
        // Inherited from [portal].
        assert!(settings.portal.verify_ssl);
    }

    #[test]
    fn test_unknown_site_is_rejected() {
        let overrides = Overrides {
            site: Some("nowhere".into()),
            ..Default::default()
        };
        let err = ConfigFile::parse(SAMPLE).unwrap().into_settings(&overrides).unwrap_err();
        assert!(err.to_string().contains("coral"));
    }

    #[test]
    fn test_cli_overrides_win() {
        let overrides = Overrides {
            base_url: Some("http://localhost:8080".into()),
            agency_id: Some(7),
            request_method: Some(RequestMethod::Post),
            timeout_secs: Some(5),
            output_dir: Some(PathBuf::from("elsewhere")),
            ..Default::default()
        };
        let settings = ConfigFile::parse(SAMPLE).unwrap().into_settings(&overrides).unwrap();
        assert_eq!(settings.portal.base_url(), "http://localhost:8080");
        assert_eq!(settings.portal.agency_id, 7);
        assert_eq!(settings.portal.request_method, RequestMethod::Post);
        assert_eq!(settings.portal.timeout, Duration::from_secs(5));
        assert_eq!(settings.portal.output_dir, PathBuf::from("elsewhere"));
    }

    #[test]
    fn test_missing_base_url_is_config_error() {
        let err = ConfigFile::default()
            .into_settings(&Overrides::default())
            .unwrap_err();
        assert!(matches!(err, PortalError::Config(_)));

        let err = PortalConfig::new("REPLACE_WITH_YOUR_BASE_URL", 0).unwrap_err();
        assert!(matches!(err, PortalError::Config(_)));
    }

    #[test]
    fn test_bad_request_method_is_rejected() {
        let err = ConfigFile::parse("[portal]\nrequest_method = \"PUT\"\n").unwrap_err();
        assert!(err.to_string().contains("PUT"));
    }

    #[test]
    fn test_api_url_substitutes_agency() {
        let portal = PortalConfig::new("https://town.policetocitizen.com", 386).unwrap();
        assert_eq!(
            portal.api_url(386).unwrap().as_str(),
            "https://town.policetocitizen.com/api/CADCalls/386"
        );

        let mut absolute = portal.clone();
        absolute.api_endpoint = "https://api.example.com/cad/{agency_id}".into();
        assert_eq!(
            absolute.api_url(9).unwrap().as_str(),
            "https://api.example.com/cad/9"
        );
    }

    #[test]
    fn test_site_name_is_first_host_label() {
        let portal = PortalConfig::new("https://southmiamipdfl.policetocitizen.com", 386).unwrap();
        assert_eq!(portal.site_name(), "southmiamipdfl");

        let local = PortalConfig::new("http://localhost:3000", 1).unwrap();
        assert_eq!(local.site_name(), "localhost");
    }

    #[test]
    fn test_page_url_keeps_base_path() {
        let portal = PortalConfig::new("https://host.example.com/portal/", 1).unwrap();
        assert_eq!(
            portal.page_url("/CADCalls").unwrap().as_str(),
            "https://host.example.com/portal/CADCalls"
        );
    }
}
