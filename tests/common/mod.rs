//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use html2pdf_render::driver::mock::MockBrowserLauncher;
use html2pdf_render::prelude::*;

/// Initialise logging once; `RUST_LOG=debug cargo test` shows the pipeline.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Render config rooted at `root` with fast readiness polling.
pub fn config(root: &Path) -> RenderConfig {
    RenderConfigBuilder::new()
        .ready_poll_interval(Duration::from_millis(5))
        .temp_root(root)
        .build()
        .expect("valid test config")
}

pub fn renderer(launcher: &MockBrowserLauncher, root: &Path) -> Renderer {
    Renderer::new(Arc::new(launcher.clone()), config(root))
}

pub fn service(launcher: &MockBrowserLauncher, root: &Path) -> PdfService {
    PdfService::new(renderer(launcher, root), CompressionEngine::lopdf())
}

/// Number of entries left under `root`.
pub fn leftovers(root: &Path) -> usize {
    std::fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
}

/// Request with a short timeout so stalled phases fail fast.
pub fn quick_request(html: &str) -> RenderRequest {
    let mut request = RenderRequest::from_html(html);
    request.options = RenderOptionsBuilder::new()
        .timeout(Duration::from_millis(50))
        .build()
        .expect("valid options");
    request
}
