//! Convenient imports for common usage.
//!
//! ```rust,ignore
//! use html2pdf_render::prelude::*;
//! ```

// Rendering
pub use crate::options::{Margin, RenderOptions, RenderOptionsBuilder};
pub use crate::render::Renderer;
pub use crate::request::{MediaType, RenderRequest, Viewport};
pub use crate::units::PageFormat;

// Compression
pub use crate::compress::{CompressionEngine, CompressionLevel, CompressionReport};

// Service
pub use crate::jobs::{JobQueue, JobState, JobStatus};
pub use crate::service::{OutputFormat, PdfPayload, PdfService, ServiceError, SharedPdfService};

// Configuration and errors
pub use crate::config::{QueueConfig, QueueConfigBuilder, RenderConfig, RenderConfigBuilder};
pub use crate::error::{CompressionError, RenderError, RenderFailure, RenderPhase};

// Feature-gated exports
#[cfg(feature = "env-config")]
pub use crate::config::env::{chrome_path_from_env, from_env};

// Re-export Arc for convenience (commonly needed with SharedPdfService)
pub use std::sync::Arc;
