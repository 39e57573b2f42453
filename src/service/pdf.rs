//! Async PDF service.
//!
//! [`Renderer::render`] and [`CompressionEngine::compress`] block the calling
//! thread for seconds. [`PdfService`] moves them onto tokio's blocking pool
//! and bounds them with an overall deadline:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Async handler (axum, ...)                    │
//! └───────────────────────────────┬─────────────────────────────────┘
//!                                 │
//!                                 ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │         tokio::time::timeout(deadline, spawn_blocking)          │
//! └───────────────────────────────┬─────────────────────────────────┘
//!                                 │
//!                                 ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │      Renderer::render  /  CompressionEngine::compress           │
//! │      (one browser process and one temp directory per call)     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! When the deadline elapses the caller gets [`ServiceError::Timeout`]. The
//! blocking call cannot be interrupted; it runs to teardown in the
//! background and its result is discarded.

use std::sync::Arc;
use std::time::Duration;

use crate::compress::{CompressionEngine, CompressionLevel};
use crate::config::RenderConfig;
use crate::render::Renderer;
use crate::request::RenderRequest;
use crate::service::types::{OutputFormat, PdfPayload, ServiceError};

/// Async façade over a [`Renderer`] and a [`CompressionEngine`].
///
/// Cheap to clone; clones share the launcher and PDF backend.
///
/// # Example
///
/// ```rust,ignore
/// use html2pdf_render::prelude::*;
///
/// let service = PdfService::chrome(RenderConfig::default());
/// let pdf = service.render(RenderRequest::from_html("<h1>Hi</h1>")).await?;
/// let smaller = service.compress(pdf, 7).await?;
/// ```
#[derive(Clone, Debug)]
pub struct PdfService {
    renderer: Renderer,
    engine: CompressionEngine,
    deadline: Option<Duration>,
}

/// Shared service handle for web framework state.
pub type SharedPdfService = Arc<PdfService>;

impl PdfService {
    /// Create a service. The deadline is taken from the renderer's
    /// [`RenderConfig::render_deadline`].
    pub fn new(renderer: Renderer, engine: CompressionEngine) -> Self {
        let deadline = renderer.config().render_deadline;
        Self {
            renderer,
            engine,
            deadline,
        }
    }

    /// Service backed by headless Chrome and lopdf.
    pub fn chrome(config: RenderConfig) -> Self {
        Self::new(Renderer::chrome(config), CompressionEngine::lopdf())
    }

    /// Override the overall deadline. `None` waits indefinitely.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn engine(&self) -> &CompressionEngine {
        &self.engine
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn into_shared(self) -> SharedPdfService {
        Arc::new(self)
    }

    // ========================================================================
    // Blocking API
    // ========================================================================

    /// Render on the current thread. Call from a blocking context only.
    pub fn render_blocking(&self, request: &RenderRequest) -> Result<Vec<u8>, ServiceError> {
        Ok(self.renderer.render(request)?)
    }

    /// Compress on the current thread. Call from a blocking context only.
    pub fn compress_blocking(&self, pdf: &[u8], level: u8) -> Result<Vec<u8>, ServiceError> {
        let level = CompressionLevel::new(level)?;
        Ok(self.engine.compress(pdf, level)?)
    }

    // ========================================================================
    // Async API
    // ========================================================================

    /// Render on the blocking pool.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Render`] with the failing phase.
    /// - [`ServiceError::Timeout`] if the deadline elapsed first.
    pub async fn render(&self, request: RenderRequest) -> Result<Vec<u8>, ServiceError> {
        let renderer = self.renderer.clone();
        self.run_blocking("render", move || Ok(renderer.render(&request)?))
            .await
    }

    /// Compress on the blocking pool.
    ///
    /// The level is validated before any work is scheduled.
    pub async fn compress(&self, pdf: Vec<u8>, level: u8) -> Result<Vec<u8>, ServiceError> {
        let level = CompressionLevel::new(level)?;
        let engine = self.engine.clone();
        self.run_blocking("compress", move || Ok(engine.compress(&pdf, level)?))
            .await
    }

    /// Render, then compress when `level` is given. One deadline covers
    /// both steps.
    pub async fn render_and_compress(
        &self,
        request: RenderRequest,
        level: Option<u8>,
    ) -> Result<Vec<u8>, ServiceError> {
        let level = level.map(CompressionLevel::new).transpose()?;
        let renderer = self.renderer.clone();
        let engine = self.engine.clone();

        self.run_blocking("render+compress", move || {
            let pdf = renderer.render(&request)?;
            match level {
                Some(level) => Ok(engine.compress(&pdf, level)?),
                None => Ok(pdf),
            }
        })
        .await
    }

    /// [`render`](Self::render) wrapped in the requested output format.
    pub async fn render_payload(
        &self,
        request: RenderRequest,
        format: OutputFormat,
    ) -> Result<PdfPayload, ServiceError> {
        let pdf = self.render(request).await?;
        Ok(PdfPayload::new(pdf, format))
    }

    /// [`compress`](Self::compress) wrapped in the requested output format.
    pub async fn compress_payload(
        &self,
        pdf: Vec<u8>,
        level: u8,
        format: OutputFormat,
    ) -> Result<PdfPayload, ServiceError> {
        let pdf = self.compress(pdf, level).await?;
        Ok(PdfPayload::new(pdf, format))
    }

    async fn run_blocking<T, F>(&self, operation: &str, work: F) -> Result<T, ServiceError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    {
        let task = tokio::task::spawn_blocking(work);

        let joined = match self.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    log::error!("❌ {} exceeded deadline of {:?}", operation, deadline);
                    return Err(ServiceError::Timeout(deadline));
                }
            },
            None => task.await,
        };

        joined.map_err(|e| {
            log::error!("❌ {} task failed: {}", operation, e);
            ServiceError::Internal(format!("{} task failed: {}", operation, e))
        })?
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
