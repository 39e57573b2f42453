//! Shared types for the PDF service boundary.
//!
//! These types are framework-agnostic: the axum integration uses them, and
//! custom handlers can use them directly.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`OutputFormat`] | Binary body or base64 envelope |
//! | [`PdfPayload`] | A rendered or compressed document, ready to send |
//! | [`SuccessEnvelope`] | `{ "success": true, "data": "<base64>" }` |
//! | [`ServiceError`] | Error types with HTTP status mapping |
//! | [`ErrorResponse`] | JSON error body |
//! | [`HealthResponse`] | Health check body |
//!
//! # Error Handling
//!
//! ```rust
//! use html2pdf_render::service::{ErrorResponse, ServiceError};
//!
//! let err = ServiceError::InvalidRequest("missing html".to_string());
//! let status = err.status_code();
//! let body = ErrorResponse::from(&err);
//!
//! assert_eq!(status, 400);
//! assert!(!body.success);
//! assert_eq!(body.code, "INVALID_REQUEST");
//! ```

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::{CompressionError, RenderError, RenderFailure};

// ============================================================================
// Output
// ============================================================================

/// How a finished document is returned to the caller.
///
/// ```rust
/// use html2pdf_render::service::OutputFormat;
///
/// assert_eq!(OutputFormat::default(), OutputFormat::Binary);
/// let format: OutputFormat = serde_json::from_str("\"base64\"").unwrap();
/// assert_eq!(format, OutputFormat::Base64);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Raw `application/pdf` bytes.
    #[default]
    Binary,
    /// Base64 text wrapped in a [`SuccessEnvelope`].
    Base64,
}

/// Success body of the base64 output format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessEnvelope {
    /// Always `true`.
    pub success: bool,
    /// Base64-encoded PDF.
    pub data: String,
}

impl SuccessEnvelope {
    pub fn new(pdf: &[u8]) -> Self {
        Self {
            success: true,
            data: BASE64_STANDARD.encode(pdf),
        }
    }
}

/// A finished document in the format the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfPayload {
    Binary(Vec<u8>),
    Envelope(SuccessEnvelope),
}

impl PdfPayload {
    /// Wrap `pdf` according to `format`.
    ///
    /// ```rust
    /// use html2pdf_render::service::{OutputFormat, PdfPayload};
    ///
    /// let payload = PdfPayload::new(b"%PDF-1.7".to_vec(), OutputFormat::Base64);
    /// assert_eq!(payload.content_type(), "application/json");
    /// ```
    pub fn new(pdf: Vec<u8>, format: OutputFormat) -> Self {
        match format {
            OutputFormat::Binary => Self::Binary(pdf),
            OutputFormat::Base64 => Self::Envelope(SuccessEnvelope::new(&pdf)),
        }
    }

    /// MIME type of [`into_body`](Self::into_body).
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Binary(_) => "application/pdf",
            Self::Envelope(_) => "application/json",
        }
    }

    /// Serialize into response body bytes.
    pub fn into_body(self) -> Result<Vec<u8>, ServiceError> {
        match self {
            Self::Binary(pdf) => Ok(pdf),
            Self::Envelope(envelope) => serde_json::to_vec(&envelope)
                .map_err(|e| ServiceError::Internal(format!("cannot serialize envelope: {}", e))),
        }
    }
}

// ============================================================================
// Health
// ============================================================================

/// Response body of the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"healthy"` when the service answers.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Crate version.
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "healthy".to_string(),
            service: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors surfaced at the service boundary.
///
/// # HTTP Status Code Mapping
///
/// | Error Type | HTTP Status | Error Code |
/// |------------|-------------|------------|
/// | [`InvalidRequest`](Self::InvalidRequest) | 400 | `INVALID_REQUEST` |
/// | [`Render`](Self::Render) (bad input) | 400 | `INVALID_REQUEST` |
/// | [`Render`](Self::Render) | 500 | `RENDER_FAILED` |
/// | [`Compression`](Self::Compression) (bad level) | 400 | `INVALID_LEVEL` |
/// | [`Compression`](Self::Compression) | 500 | `COMPRESSION_FAILED` |
/// | [`Timeout`](Self::Timeout) | 504 | `TIMEOUT` |
/// | [`QueueClosed`](Self::QueueClosed) | 503 | `QUEUE_CLOSED` |
/// | [`Internal`](Self::Internal) | 500 | `INTERNAL_ERROR` |
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    /// The request could not be understood.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The render failed. The session is already torn down.
    #[error(transparent)]
    Render(#[from] RenderFailure),

    /// Compression failed or the level was out of range.
    #[error(transparent)]
    Compression(#[from] CompressionError),

    /// The overall deadline elapsed. The blocking work may still finish in
    /// the background; its result is discarded.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The job queue is shut down.
    #[error("Job queue is closed")]
    QueueClosed,

    /// Unexpected failure, such as a panicked worker.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// HTTP status code for this error.
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use html2pdf_render::service::ServiceError;
    ///
    /// assert_eq!(ServiceError::Timeout(Duration::from_secs(5)).status_code(), 504);
    /// assert_eq!(ServiceError::Internal("boom".into()).status_code(), 500);
    /// ```
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::Render(failure) if is_client_error(&failure.cause) => 400,
            Self::Compression(CompressionError::InvalidLevel(_)) => 400,
            Self::Render(_) | Self::Compression(_) | Self::Internal(_) => 500,
            Self::QueueClosed => 503,
            Self::Timeout(_) => 504,
        }
    }

    /// Stable machine-readable code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Render(failure) if is_client_error(&failure.cause) => "INVALID_REQUEST",
            Self::Render(_) => "RENDER_FAILED",
            Self::Compression(CompressionError::InvalidLevel(_)) => "INVALID_LEVEL",
            Self::Compression(_) => "COMPRESSION_FAILED",
            Self::Timeout(_) => "TIMEOUT",
            Self::QueueClosed => "QUEUE_CLOSED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Causes the caller can fix by changing the request.
fn is_client_error(cause: &RenderError) -> bool {
    matches!(
        cause,
        RenderError::InvalidRequest(_)
            | RenderError::InvalidOptions(_)
            | RenderError::MalformedDimension(_)
    )
}

/// JSON error body.
///
/// ```json
/// { "success": false, "error": "render failed during print: ...", "code": "RENDER_FAILED" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always `false`.
    pub success: bool,
    /// Human-readable message.
    pub error: String,
    /// Machine-readable code, see [`ServiceError::error_code`].
    pub code: String,
}

impl From<&ServiceError> for ErrorResponse {
    fn from(err: &ServiceError) -> Self {
        Self {
            success: false,
            error: err.to_string(),
            code: err.error_code().to_string(),
        }
    }
}

impl From<ServiceError> for ErrorResponse {
    fn from(err: ServiceError) -> Self {
        Self::from(&err)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderPhase;

    #[test]
    fn test_binary_payload_is_untouched() {
        let payload = PdfPayload::new(b"%PDF-1.7 body".to_vec(), OutputFormat::Binary);

        assert_eq!(payload.content_type(), "application/pdf");
        assert_eq!(payload.into_body().unwrap(), b"%PDF-1.7 body");
    }

    #[test]
    fn test_envelope_round_trip() {
        let payload = PdfPayload::new(b"%PDF-1.7".to_vec(), OutputFormat::Base64);
        let body = payload.into_body().unwrap();

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], true);
        let data = BASE64_STANDARD.decode(json["data"].as_str().unwrap()).unwrap();
        assert_eq!(data, b"%PDF-1.7");
    }

    #[test]
    fn test_status_codes() {
        let render = |cause| ServiceError::Render(RenderFailure::new(RenderPhase::Print, cause));

        assert_eq!(render(RenderError::PrintFailure("x".into())).status_code(), 500);
        assert_eq!(render(RenderError::LoadTimeout("x".into())).status_code(), 500);
        assert_eq!(render(RenderError::MalformedDimension("x".into())).status_code(), 400);
        assert_eq!(
            ServiceError::from(CompressionError::InvalidLevel(12)).status_code(),
            400
        );
        assert_eq!(
            ServiceError::from(CompressionError::Unparseable("x".into())).status_code(),
            500
        );
        assert_eq!(ServiceError::QueueClosed.status_code(), 503);
        assert_eq!(ServiceError::Timeout(Duration::from_secs(1)).status_code(), 504);
    }

    #[test]
    fn test_error_response_carries_message() {
        let err = ServiceError::Render(RenderFailure::new(
            RenderPhase::AwaitFonts,
            RenderError::FontWaitFailure("1 of 3 font faces failed".into()),
        ));
        let body = ErrorResponse::from(err);

        assert!(!body.success);
        assert_eq!(body.code, "RENDER_FAILED");
        assert!(body.error.contains("await-fonts"));
        assert!(body.error.contains("1 of 3"));
    }

    #[test]
    fn test_health_response_default() {
        let health = HealthResponse::default();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.service, "html2pdf-render");
    }
}
