//! Response and debug artifacts.
//!
//! Files are named `{site}_cadcalls_{agency}_{timestamp}.{ext}` and
//! `{site}_debug_info_{timestamp}.txt`. Files are created with
//! `create_new`, so an existing artifact is never overwritten; a clashing
//! name gets a numeric suffix instead.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde_json::{Map, Value};

use crate::error::{PortalError, PortalResult};
use crate::portal::response::{ApiResponse, ResponseBody};

/// Longest response excerpt written to a debug artifact, in characters.
pub const DEBUG_BODY_LIMIT: usize = 2000;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Writes the artifacts of one run into the output directory.
pub struct ArtifactWriter {
    dir: PathBuf,
    site: String,
    timestamp: String,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>, site: &str, captured_at: DateTime<Local>) -> Self {
        Self {
            dir: dir.into(),
            site: site.to_string(),
            timestamp: captured_at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Capture timestamp as it appears in file names.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Save an API response body. JSON is pretty-printed, everything else
    /// is written exactly as received.
    pub fn write_response(
        &self,
        agency_id: u32,
        response: &ApiResponse,
        body: &ResponseBody,
    ) -> PortalResult<PathBuf> {
        let stem = format!("{}_cadcalls_{}_{}", self.site, agency_id, self.timestamp);
        let contents = match body {
            ResponseBody::Json(value) => serde_json::to_string_pretty(value)?,
            ResponseBody::MalformedJson | ResponseBody::Html => response.body.clone(),
        };
        self.create_unique(&stem, body.extension(), contents.as_bytes())
    }

    /// Save the request/response context of a failed API call.
    pub fn write_debug(&self, report: &DebugReport<'_>) -> PortalResult<PathBuf> {
        let stem = format!("{}_debug_info_{}", self.site, self.timestamp);
        self.create_unique(&stem, "txt", report.render()?.as_bytes())
    }

    fn create_unique(&self, stem: &str, ext: &str, contents: &[u8]) -> PortalResult<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|source| PortalError::Artifact {
            path: self.dir.clone(),
            source,
        })?;

        let mut attempt = 1u32;
        loop {
            let name = if attempt == 1 {
                format!("{stem}.{ext}")
            } else {
                format!("{stem}_{attempt}.{ext}")
            };
            let path = self.dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(contents)
                        .map_err(|source| PortalError::Artifact {
                            path: path.clone(),
                            source,
                        })?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(source) => return Err(PortalError::Artifact { path, source }),
            }
        }
    }
}

/// Everything needed to diagnose a non-success API response.
pub struct DebugReport<'a> {
    pub url: &'a str,
    pub status: u16,
    pub headers_sent: &'a [(String, String)],
    pub cookies: &'a [(String, String)],
    pub payload: &'a Value,
    pub response: &'a ApiResponse,
}

impl DebugReport<'_> {
    pub fn render(&self) -> PortalResult<String> {
        let mut out = String::new();
        out.push_str(&format!("URL: {}\n", self.url));
        out.push_str(&format!("Status Code: {}\n", self.status));
        out.push_str(&format!(
            "Headers Sent:\n{}\n\n",
            serde_json::to_string_pretty(&pairs_to_json(self.headers_sent))?
        ));
        out.push_str(&format!(
            "Cookies:\n{}\n\n",
            serde_json::to_string_pretty(&pairs_to_json(self.cookies))?
        ));
        out.push_str(&format!(
            "Payload:\n{}\n\n",
            serde_json::to_string_pretty(self.payload)?
        ));
        out.push_str(&format!(
            "Response Headers:\n{}\n\n",
            serde_json::to_string_pretty(&pairs_to_json(&self.response.headers))?
        ));
        out.push_str(&format!(
            "Response Content:\n{}\n\n",
            truncate_chars(&self.response.body, DEBUG_BODY_LIMIT)
        ));
        Ok(out)
    }
}

/// Repeated names are joined with `, `.
fn pairs_to_json(pairs: &[(String, String)]) -> Value {
    let mut map = Map::new();
    for (name, value) in pairs {
        match map.get_mut(name) {
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            _ => {
                map.insert(name.clone(), Value::String(value.clone()));
            }
        }
    }
    Value::Object(map)
}

/// At most `limit` characters of `s`, cut on a char boundary.
pub fn truncate_chars(s: &str, limit: usize) -> &str {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Copy a saved artifact to a user-chosen path.
///
/// Returns `false` without touching anything when `to` already is `from`,
/// since copying a file onto itself truncates it.
pub fn copy_artifact(from: &Path, to: &Path) -> PortalResult<bool> {
    if is_same_file(from, to) {
        tracing::warn!(path = %to.display(), "output path is the saved artifact; not copying");
        return Ok(false);
    }
    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| PortalError::Artifact {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::copy(from, to).map_err(|source| PortalError::Artifact {
        path: to.to_path_buf(),
        source,
    })?;
    Ok(true)
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
