//! Captured API response and body classification.

use serde_json::Value;

/// Response from the CAD calls API, fully read into memory.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// Requested URL (without GET query string).
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Declared `Content-Type`, empty when absent.
    pub content_type: String,
    /// All response headers, in arrival order.
    pub headers: Vec<(String, String)>,
    /// Response body as text.
    pub body: String,
}

/// What the response body turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Declared JSON and parsed.
    Json(Value),
    /// Declared JSON but failed to parse; kept as raw text.
    MalformedJson,
    /// Anything else, kept as raw text.
    Html,
}

impl ResponseBody {
    /// File extension of the artifact this body is saved as.
    pub fn extension(&self) -> &'static str {
        match self {
            ResponseBody::Json(_) => "json",
            ResponseBody::MalformedJson => "txt",
            ResponseBody::Html => "html",
        }
    }
}

impl ApiResponse {
    /// Read status, headers and body from a reqwest response.
    ///
    /// Fails when the connection drops before the body is complete.
    pub async fn read(url: &str, r: reqwest::Response) -> reqwest::Result<Self> {
        let status = r.status().as_u16();
        let headers: Vec<(String, String)> = r
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let content_type = r
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = r.text().await?;

        Ok(Self {
            url: url.to_string(),
            status,
            content_type,
            headers,
            body,
        })
    }

    /// Only an exact 200 counts; redirects and other 2xx codes do not.
    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    pub fn declares_json(&self) -> bool {
        self.content_type
            .to_ascii_lowercase()
            .contains("application/json")
    }

    /// Classify the body by declared content type.
    pub fn classify(&self) -> ResponseBody {
        if !self.declares_json() {
            return ResponseBody::Html;
        }
        match serde_json::from_str(&self.body) {
            Ok(value) => ResponseBody::Json(value),
            Err(e) => {
                tracing::warn!(error = %e, "response declared JSON but did not parse");
                ResponseBody::MalformedJson
            }
        }
    }

    /// Parse the body as JSON regardless of the declared content type.
    pub fn json(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(content_type: &str, body: &str) -> ApiResponse {
        ApiResponse {
            url: "https://town.policetocitizen.com/api/CADCalls/1".into(),
            status: 200,
            content_type: content_type.into(),
            headers: vec![],
            body: body.into(),
        }
    }

    #[test]
    fn test_classify_json() {
        let r = response("application/json; charset=utf-8", r#"{"CADCalls":[],"Total":0}"#);
        match r.classify() {
            ResponseBody::Json(v) => assert_eq!(v["Total"], 0),
            other => panic!("expected JSON, got {other:?}"),
        }
        assert_eq!(r.classify().extension(), "json");
    }

    #[test]
    fn test_classify_malformed_json() {
        let r = response("application/json", "{not json");
        assert_eq!(r.classify(), ResponseBody::MalformedJson);
        assert_eq!(r.classify().extension(), "txt");
    }

    #[test]
    fn test_classify_html_and_missing_type() {
        assert_eq!(response("text/html", "<html/>").classify(), ResponseBody::Html);
        assert_eq!(response("", "{}").classify(), ResponseBody::Html);
        assert_eq!(ResponseBody::Html.extension(), "html");
    }

    #[test]
    fn test_success_is_exactly_200() {
        let mut r = response("application/json", "{}");
        assert!(r.is_success());
        r.status = 204;
        assert!(!r.is_success());
        r.status = 302;
        assert!(!r.is_success());
        r.status = 500;
        assert!(!r.is_success());
    }
}
