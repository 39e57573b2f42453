//! # html2pdf-render
//!
//! HTML to PDF rendering through a disposable headless browser, plus a
//! level-driven PDF compression engine.
//!
//! Every render owns its own browser process and its own temp working
//! directory, both torn down before the result is reported. Concurrent
//! renders share nothing, so they are safe without locking.
//!
//! ## Features
//!
//! - **Phase-tagged failures**: every error names the render phase that aborted
//! - **Guaranteed teardown**: RAII session closes the browser and removes the
//!   working directory on every exit path
//! - **Best-effort loading**: readiness timeouts can be tolerated per request;
//!   font failures never are
//! - **Compression levels 0-9**: JPEG image re-encoding, stream re-deflation and
//!   a whole-document pass at the top levels
//! - **Async service**: blocking work on tokio's blocking pool with a deadline
//! - **Background queue**: fixed workers with a job-status store
//! - **Web Framework Integration**: optional Axum routes
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │   integrations::axum  /  jobs::JobQueue     │
//! └─────────────────┬───────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │        service::PdfService (async)          │
//! └────────┬───────────────────────────┬────────┘
//!          │                           │
//!          ▼                           ▼
//! ┌──────────────────────┐   ┌──────────────────────┐
//! │  render::Renderer    │   │ compress::Compression│
//! │  Compile → Acquire → │   │ Engine               │
//! │  Load → AwaitReady → │   │  images → streams →  │
//! │  AwaitFonts → Print →│   │  optimize → write    │
//! │  Extract → Teardown  │   │                      │
//! └──────────┬───────────┘   └──────────┬───────────┘
//!            │                          │
//!            ▼                          ▼
//! ┌──────────────────────┐   ┌──────────────────────┐
//! │ driver::BrowserDriver│   │ compress::Document   │
//! │ (headless_chrome)    │   │ Editor (lopdf)       │
//! └──────────────────────┘   └──────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use html2pdf_render::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = PdfService::chrome(RenderConfig::default());
//!
//!     let mut request = RenderRequest::from_html("<h1>Invoice</h1>");
//!     request.options = RenderOptionsBuilder::new()
//!         .format(PageFormat::A4)
//!         .margin_all("1cm")
//!         .build()?;
//!
//!     let pdf = service.render(request).await?;
//!     let smaller = service.compress(pdf, 7).await?;
//!     std::fs::write("invoice.pdf", smaller)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Effect |
//! |---------|---------|--------|
//! | `env-config` | ✅ | `config::env` loading from `app.env` and environment variables |
//! | `axum-integration` | | `integrations::axum` routes |
//! | `test-utils` | | `driver::mock` fake browser for tests |

#![doc(html_root_url = "https://docs.rs/html2pdf-render/0.3.0")]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// Modules
// ============================================================================

pub mod compress;
pub mod config;
pub mod driver;
pub mod error;
pub mod jobs;
pub mod options;
pub mod prelude;
pub mod print;
pub mod render;
pub mod request;
pub mod service;
pub mod session;
pub mod units;

// ============================================================================
// Feature-gated modules
// ============================================================================

/// Web framework integrations.
///
/// Enable `axum-integration` to use them.
#[cfg(feature = "axum-integration")]
pub mod integrations;

// ============================================================================
// Re-exports (Public API)
// ============================================================================

pub use compress::{CompressionEngine, CompressionLevel, CompressionReport, compress_pdf};
pub use config::{QueueConfig, QueueConfigBuilder, RenderConfig, RenderConfigBuilder};
pub use error::{
    CompressionError, DriverError, EditError, RenderError, RenderFailure, RenderPhase,
};
pub use jobs::JobQueue;
pub use options::{Margin, RenderOptions, RenderOptionsBuilder};
pub use render::Renderer;
pub use request::RenderRequest;
pub use service::{PdfService, ServiceError, SharedPdfService};

// Feature-gated re-exports
#[cfg(feature = "env-config")]
pub use config::env::{chrome_path_from_env, from_env};
