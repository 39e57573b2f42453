//! Web framework integrations.
//!
//! | Framework | Feature Flag | Module |
//! |-----------|--------------|--------|
//! | Axum | `axum-integration` | `axum` |
//!
//! ```toml
//! [dependencies]
//! html2pdf-render = { version = "0.3", features = ["axum-integration"] }
//! ```
//!
//! Handlers stay thin: they map HTTP to [`crate::service::PdfService`] calls
//! and [`crate::service::ServiceError`] back to HTTP.

#[cfg(feature = "axum-integration")]
pub mod axum;
