//! Service boundary.
//!
//! The framework-agnostic layer between HTTP handlers and the blocking
//! render and compression cores. It follows the **"thin handler, thick
//! service"** pattern:
//!
//! | Layer | Responsibility | This Module? |
//! |-------|----------------|--------------|
//! | **Service** | Blocking-pool dispatch, deadline, output format, error mapping | ✅ Yes |
//! | **Handler** | HTTP request/response mapping, framework glue | ❌ No (integrations) |
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                   service module (this module)                │
//! │  ┌─────────────────────────┐  ┌────────────────────────────┐  │
//! │  │        types.rs         │  │          pdf.rs            │  │
//! │  │  OutputFormat           │  │  PdfService                │  │
//! │  │  PdfPayload             │  │    render / compress       │  │
//! │  │  SuccessEnvelope        │  │    render_and_compress     │  │
//! │  │  ServiceError           │  │    render_payload          │  │
//! │  │  ErrorResponse          │  │    compress_payload        │  │
//! │  │  HealthResponse         │  │                            │  │
//! │  └─────────────────────────┘  └────────────────────────────┘  │
//! └───────────────────────────────┬───────────────────────────────┘
//!                                 │ used by
//!                                 ▼
//!             integrations::axum        jobs::JobQueue
//! ```

mod pdf;
mod types;

// ============================================================================
// Re-exports
// ============================================================================

pub use pdf::PdfService;
pub use pdf::SharedPdfService;

pub use types::ErrorResponse;
pub use types::HealthResponse;
pub use types::OutputFormat;
pub use types::PdfPayload;
pub use types::ServiceError;
pub use types::SuccessEnvelope;

// ============================================================================
// Module-level tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Verify error type conversions work.
    #[test]
    fn test_error_to_response_conversion() {
        let error = ServiceError::InvalidRequest("test".to_string());
        let response: ErrorResponse = error.into();

        assert_eq!(response.code, "INVALID_REQUEST");
        assert!(response.error.contains("Invalid request"));
    }
}
