//! Stable error taxonomy for the fetch engines.
//!
//! `FetchError` is the single user-visible failure type returned by every
//! `FetchEngine` method. Internal plumbing (browser launch, CDP setup) uses
//! `anyhow::Error`, converted to a `FetchError` at the public API boundary.

use serde::Serialize;
use std::fmt;

/// Stable, serializable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    HttpError,
    Navigation,
    NoResponse,
    NonHtmlContent,
    ChallengePage,
    HttpFallbackFailed,
    PoolInitFailed,
    PoolUnavailable,
    QueueNoResult,
    MarkdownConversionNonHtml,
    UnsupportedRawContentType,
    FetchFailed,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The single user-visible failure type returned by every `FetchEngine` method.
///
/// Serializes to the stable shape `{name, message, code?, statusCode?,
/// originalError?}` so callers that cross a process boundary (an MCP tool
/// wrapper, a JSON-RPC response) can hand it along unchanged.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct FetchError {
    pub message: String,
    pub code: ErrorCode,
    pub status_code: Option<u16>,
    #[source]
    pub original_error: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl FetchError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
            status_code: None,
            original_error: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.original_error = Some(Box::new(source));
        self
    }

    /// Wrap an inner error after exhausting the retry loop, preserving its
    /// `code` and the deepest `original_error` while prefixing the message.
    #[must_use]
    pub fn wrap_after_retries(inner: FetchError, retries: u32) -> Self {
        let message = format!(
            "Fetch failed after {retries} retries: {}",
            inner.message
        );
        let code = inner.code;
        let status_code = inner.status_code;
        Self {
            message,
            code,
            status_code,
            original_error: Some(Box::new(inner)),
        }
    }

    pub fn http_error(status_code: u16) -> Self {
        Self::new(ErrorCode::HttpError, format!("HTTP error: status {status_code}"))
            .with_status(status_code)
    }

    pub fn challenge_page() -> Self {
        Self::new(ErrorCode::ChallengePage, "bot-protection challenge page detected")
    }

    pub fn no_response() -> Self {
        Self::new(ErrorCode::NoResponse, "navigation produced no response")
    }

    pub fn no_response_with_source(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::no_response().with_source(source)
    }

    pub fn pool_unavailable() -> Self {
        Self::new(ErrorCode::PoolUnavailable, "no healthy browser instance available")
    }

    pub fn non_html_content(content_type: &str) -> Self {
        Self::new(
            ErrorCode::NonHtmlContent,
            format!("response content-type is not HTML: {content_type}"),
        )
    }
}

/// Stable wire representation: `{name, message, code?, statusCode?, originalError?}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FetchErrorWire<'a> {
    name: &'static str,
    message: &'a str,
    code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    original_error: Option<String>,
}

impl Serialize for FetchError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        FetchErrorWire {
            name: "FetchError",
            message: &self.message,
            code: self.code,
            status_code: self.status_code,
            original_error: self.original_error.as_ref().map(|e| e.to_string()),
        }
        .serialize(serializer)
    }
}

impl From<anyhow::Error> for FetchError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(ErrorCode::FetchFailed, format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_after_retries_preserves_code_and_source() {
        let inner = FetchError::new(ErrorCode::Navigation, "navigation timed out");
        let wrapped = FetchError::wrap_after_retries(inner, 2);
        assert_eq!(wrapped.code, ErrorCode::Navigation);
        assert!(wrapped.message.starts_with("Fetch failed after 2 retries:"));
        assert!(wrapped.message.contains("navigation timed out"));
    }

    #[test]
    fn serializes_to_stable_shape() {
        let err = FetchError::http_error(503);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["name"], "FetchError");
        assert_eq!(json["code"], "HTTP_ERROR");
        assert_eq!(json["statusCode"], 503);
    }
}
