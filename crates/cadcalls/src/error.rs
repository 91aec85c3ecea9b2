//! Error types for the portal client.

use std::path::PathBuf;

/// All errors that can end a portal run.
///
/// Only `Connectivity` and `Transport` come from the network. Secondary page
/// failures, a missing CSRF token, malformed JSON and non-2xx API statuses
/// are logged and never surface here.
#[derive(thiserror::Error, Debug)]
pub enum PortalError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The portal base address could not be reached during warm-up.
    #[error("Cannot reach portal at {url}: {reason}")]
    Connectivity { url: String, reason: String },

    /// The API request itself failed before any response arrived.
    #[error("API request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PortalError {
    /// Whether the run ended without any API response to show.
    pub fn is_no_response(&self) -> bool {
        matches!(
            self,
            PortalError::Connectivity { .. } | PortalError::Transport { .. }
        )
    }
}

pub type PortalResult<T> = Result<T, PortalError>;
