//! The render pipeline.
//!
//! [`Renderer::render`] drives one disposable browser through a fixed
//! sequence of phases:
//!
//! ```text
//! Compile ─▶ Acquire ─▶ Load ─▶ AwaitReady ─▶ (inject assets) ─▶ AwaitFonts ─▶ Print ─▶ Extract
//!    │          │         │          │                               │           │         │
//!    └──────────┴─────────┴──────────┴────────── any error ──────────┴───────────┴─────────┘
//!                                                    │
//!                                                    ▼
//!                                                Teardown (always)
//! ```
//!
//! Compile runs before anything is acquired, so invalid options never
//! launch a browser. Every later exit path, success included, tears the
//! session down before the caller sees the result.
//!
//! # Readiness policy
//!
//! | Situation | `bestAttempt = true` | `bestAttempt = false` |
//! |-----------|----------------------|-----------------------|
//! | Navigation error | logged, continue | [`RenderError::LoadTimeout`] |
//! | `readyState` not `complete` within timeout | logged, continue | [`RenderError::LoadTimeout`] |
//! | Font stylesheet or face failure | [`RenderError::FontWaitFailure`] | [`RenderError::FontWaitFailure`] |
//!
//! # Blocking
//!
//! `render` blocks the calling thread until Teardown completes. Async
//! callers go through [`PdfService`](crate::service::PdfService), which
//! runs it on the blocking pool.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use html2pdf_render::prelude::*;
//!
//! let renderer = Renderer::new(Arc::new(ChromeLauncher::new()), RenderConfig::default());
//! let pdf = renderer.render(&RenderRequest::from_html("<h1>Invoice</h1>"))?;
//! assert!(pdf.starts_with(b"%PDF-"));
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::config::RenderConfig;
use crate::driver::{BrowserDriver, BrowserLauncher, ChromeLauncher, PageSetup};
use crate::error::{RenderError, RenderFailure, RenderPhase};
use crate::print::{CompiledPrintParameters, compile};
use crate::request::{DocumentSource, RenderRequest, ScriptTag, StyleTag};
use crate::session::RenderSession;

/// Leading bytes of every PDF file.
pub const PDF_MAGIC: &[u8] = b"%PDF-";

/// Marker comment identifying the stylesheet wait script.
pub(crate) const FONT_STYLESHEETS_MARKER: &str = "html2pdf:font-stylesheets";

/// Marker comment identifying the font face verification script.
pub(crate) const FONT_FACES_MARKER: &str = "html2pdf:font-faces";

/// Value every pipeline script resolves to once it has run to completion.
/// Anything else, `None` included, means the script did not finish.
pub(crate) const SCRIPT_OK: &str = "ok";

/// Lower bound for individual browser protocol calls (navigation, print).
const MIN_OPERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Renders documents to PDF, one fresh browser per call.
///
/// Holds no per-render state: concurrent calls are independent because each
/// acquires its own working directory and browser process.
///
/// # Thread Safety
///
/// `Renderer` is `Send + Sync` and is normally shared behind an [`Arc`].
#[derive(Clone)]
pub struct Renderer {
    launcher: Arc<dyn BrowserLauncher>,
    config: RenderConfig,
}

impl Renderer {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, config: RenderConfig) -> Self {
        Self { launcher, config }
    }

    /// Renderer backed by local headless Chrome.
    pub fn chrome(config: RenderConfig) -> Self {
        Self::new(Arc::new(ChromeLauncher::new()), config)
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render `request` to PDF bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderFailure`] naming the phase that aborted. By then
    /// the browser has been closed and the working directory removed.
    pub fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, RenderFailure> {
        let started = Instant::now();

        let params =
            compile(&request.options).map_err(RenderFailure::during(RenderPhase::Compile))?;
        let source = request
            .source()
            .map_err(RenderFailure::during(RenderPhase::Compile))?;

        let timeout = request.options.timeout_duration();
        let mut session = RenderSession::open(
            self.launcher.as_ref(),
            &self.config,
            request.viewport.as_ref(),
            timeout.max(MIN_OPERATION_TIMEOUT),
        )
        .map_err(RenderFailure::during(RenderPhase::Acquire))?;

        let result = self.drive(&mut session, request, &source, &params);

        // Teardown happens before the outcome is reported.
        drop(session);

        match &result {
            Ok(pdf) => log::info!(
                "✅ Rendered {} bytes in {:?}",
                pdf.len(),
                started.elapsed()
            ),
            Err(failure) => log::warn!(
                "Render failed after {:?}: {}",
                started.elapsed(),
                failure
            ),
        }

        result
    }

    fn drive(
        &self,
        session: &mut RenderSession,
        request: &RenderRequest,
        source: &DocumentSource,
        params: &CompiledPrintParameters,
    ) -> Result<Vec<u8>, RenderFailure> {
        let load = RenderFailure::during(RenderPhase::Load);
        let timeout = request.options.timeout_duration();

        // ===== Load =====
        let target = match source {
            DocumentSource::Inline(html) => session.write_document(html).map_err(&load)?,
            DocumentSource::Remote(url) => url.clone(),
        };
        let document_url = match source {
            DocumentSource::Inline(_) => None,
            DocumentSource::Remote(url) => Some(url),
        };
        let setup = page_setup(request, document_url);

        let driver = session.driver_mut().map_err(&load)?;
        driver
            .prepare(&setup)
            .map_err(|e| load(RenderError::PageSetup(e.to_string())))?;

        log::debug!("Navigating to {}", truncate(target.as_str(), 100));
        let nav_start = Instant::now();
        if let Err(e) = driver.navigate(target.as_str()) {
            if request.best_attempt {
                log::warn!("Navigation did not complete ({}), continuing best-effort", e);
            } else {
                return Err(load(RenderError::LoadTimeout(format!(
                    "navigation to {} failed: {}",
                    truncate(target.as_str(), 100),
                    e
                ))));
            }
        }
        log::debug!("Navigation finished in {:?}", nav_start.elapsed());

        let driver: &dyn BrowserDriver = driver;

        // ===== AwaitReady =====
        self.await_ready(driver, timeout, request.best_attempt)
            .map_err(RenderFailure::during(RenderPhase::AwaitReady))?;

        inject_assets(driver, &request.add_script_tag, &request.add_style_tag).map_err(&load)?;

        if let Some(wait) = request.post_load_wait() {
            log::trace!("Waiting {:?} after load", wait);
            std::thread::sleep(wait);
        }

        // ===== AwaitFonts =====
        if request.options.wait_for_fonts {
            await_fonts(driver, timeout).map_err(RenderFailure::during(RenderPhase::AwaitFonts))?;
        }

        // ===== Print =====
        let print_start = Instant::now();
        let payload = driver
            .print_to_document(params)
            .map_err(|e| RenderError::PrintFailure(e.to_string()))
            .and_then(|payload| {
                payload
                    .filter(|p| !p.trim().is_empty())
                    .ok_or_else(|| RenderError::PrintFailure("browser returned no document".to_string()))
            })
            .map_err(RenderFailure::during(RenderPhase::Print))?;
        log::debug!("Print command finished in {:?}", print_start.elapsed());

        // ===== Extract =====
        decode_document(&payload).map_err(RenderFailure::during(RenderPhase::Extract))
    }

    /// Poll `document.readyState` until `complete` or `timeout` elapses.
    ///
    /// Evaluation errors while polling are treated like an incomplete
    /// document: a navigation in flight can briefly reject scripts.
    fn await_ready(
        &self,
        driver: &dyn BrowserDriver,
        timeout: Duration,
        best_attempt: bool,
    ) -> Result<(), RenderError> {
        let start = Instant::now();
        let poll_interval = self.config.ready_poll_interval;

        log::trace!(
            "Waiting up to {:?} for document readiness (polling every {:?})",
            timeout,
            poll_interval
        );

        let mut last_state = String::from("unknown");
        loop {
            match driver.ready_state() {
                Ok(state) if state == "complete" => {
                    log::debug!("Document ready after {:?}", start.elapsed());
                    return Ok(());
                }
                Ok(state) => last_state = state,
                Err(e) => last_state = format!("error: {}", e),
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                break;
            }
            std::thread::sleep(poll_interval.min(timeout - elapsed));
        }

        if best_attempt {
            log::warn!(
                "Document not ready after {:?} (last state: {}), continuing best-effort",
                timeout,
                last_state
            );
            Ok(())
        } else {
            Err(RenderError::LoadTimeout(format!(
                "document not ready after {:?} (last state: {})",
                timeout, last_state
            )))
        }
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Build the request-scoped page configuration for loading `document_url`
/// (`None` for inline markup).
fn page_setup(request: &RenderRequest, document_url: Option<&Url>) -> PageSetup {
    PageSetup {
        user_agent: request.user_agent.clone(),
        extra_headers: request.extra_http_headers.clone(),
        cookies: request.page_cookies(document_url),
        credentials: request.authenticate.clone(),
        media: request.emulate_media_type,
        javascript_enabled: request.javascript_enabled,
        reject_resource_types: request.reject_resource_types.clone(),
        reject_url_patterns: request.reject_request_pattern.clone(),
        touch: request.viewport.as_ref().is_some_and(|v| v.has_touch),
        mobile: request.viewport.clone().filter(|v| v.is_mobile),
    }
}

// ============================================================================
// Asset Injection
// ============================================================================

/// Quote `value` as a JavaScript string literal.
fn js_string(value: &str) -> String {
    // JSON strings are valid JS string literals.
    Value::String(value.to_string()).to_string()
}

fn read_asset(path: &str) -> Result<String, RenderError> {
    std::fs::read_to_string(path)
        .map_err(|e| RenderError::PageSetup(format!("cannot read {}: {}", path, e)))
}

fn script_tag_js(tag: &ScriptTag) -> Result<Option<String>, RenderError> {
    let mut attributes = String::new();
    if let Some(kind) = &tag.kind {
        attributes.push_str(&format!("el.type = {};", js_string(kind)));
    }
    if let Some(id) = &tag.id {
        attributes.push_str(&format!("el.id = {};", js_string(id)));
    }

    if let Some(url) = &tag.url {
        return Ok(Some(format!(
            "new Promise((resolve, reject) => {{ \
               const el = document.createElement('script'); {attributes} \
               el.src = {src}; \
               el.onload = () => resolve('ok'); \
               el.onerror = () => reject(new Error('failed to load script ' + el.src)); \
               (document.head || document.documentElement).appendChild(el); \
             }})",
            src = js_string(url),
        )));
    }

    let content = match (&tag.path, &tag.content) {
        (Some(path), _) => read_asset(path)?,
        (None, Some(content)) => content.clone(),
        (None, None) => return Ok(None),
    };

    Ok(Some(format!(
        "(() => {{ \
           const el = document.createElement('script'); {attributes} \
           el.textContent = {text}; \
           (document.head || document.documentElement).appendChild(el); \
           return 'ok'; \
         }})()",
        text = js_string(&content),
    )))
}

fn style_tag_js(tag: &StyleTag) -> Result<Option<String>, RenderError> {
    if let Some(url) = &tag.url {
        return Ok(Some(format!(
            "new Promise((resolve, reject) => {{ \
               const el = document.createElement('link'); \
               el.rel = 'stylesheet'; el.href = {href}; \
               el.onload = () => resolve('ok'); \
               el.onerror = () => reject(new Error('failed to load stylesheet ' + el.href)); \
               (document.head || document.documentElement).appendChild(el); \
             }})",
            href = js_string(url),
        )));
    }

    let content = match (&tag.path, &tag.content) {
        (Some(path), _) => read_asset(path)?,
        (None, Some(content)) => content.clone(),
        (None, None) => return Ok(None),
    };

    Ok(Some(format!(
        "(() => {{ \
           const el = document.createElement('style'); \
           el.textContent = {text}; \
           (document.head || document.documentElement).appendChild(el); \
           return 'ok'; \
         }})()",
        text = js_string(&content),
    )))
}

/// Check that a pipeline script resolved to [`SCRIPT_OK`].
fn completed(value: Option<Value>) -> Result<(), String> {
    match value {
        Some(Value::String(s)) if s == SCRIPT_OK => Ok(()),
        Some(other) => Err(format!("script finished with {}", truncate(&other.to_string(), 100))),
        None => Err("script did not complete".to_string()),
    }
}

/// Inject the request's scripts, then its styles, in order.
fn inject_assets(
    driver: &dyn BrowserDriver,
    scripts: &[ScriptTag],
    styles: &[StyleTag],
) -> Result<(), RenderError> {
    let scripts = scripts.iter().map(script_tag_js);
    let styles = styles.iter().map(style_tag_js);

    for js in scripts.chain(styles) {
        let Some(js) = js? else {
            log::warn!("Skipping injected tag with no url, path or content");
            continue;
        };
        driver
            .evaluate(&js, true)
            .map_err(|e| e.to_string())
            .and_then(completed)
            .map_err(|e| RenderError::PageSetup(format!("asset injection failed: {}", e)))?;
    }

    Ok(())
}

// ============================================================================
// Font Synchronization
// ============================================================================

/// Wait for every linked stylesheet that has not loaded yet. Any load error
/// rejects; so does the timeout.
fn font_stylesheets_script(timeout: Duration) -> String {
    let ms = timeout.as_millis();
    format!(
        "/* {FONT_STYLESHEETS_MARKER} */
new Promise((resolve, reject) => {{
  const pending = Array.from(document.querySelectorAll('link[rel~=\"stylesheet\"][href]'))
    .filter(link => !link.sheet);
  if (pending.length === 0) {{ resolve('ok'); return; }}
  const timer = setTimeout(() => reject(new Error('stylesheets still loading after {ms}ms')), {ms});
  let remaining = pending.length;
  for (const link of pending) {{
    link.addEventListener('load', () => {{
      if (--remaining === 0) {{ clearTimeout(timer); resolve('ok'); }}
    }}, {{ once: true }});
    link.addEventListener('error', () => {{
      clearTimeout(timer);
      reject(new Error('failed to load stylesheet ' + link.href));
    }}, {{ once: true }});
  }}
}})"
    )
}

/// Wait for `document.fonts.ready`, force every face to load, then report
/// which faces did not reach `loaded`.
fn font_faces_script(timeout: Duration) -> String {
    let ms = timeout.as_millis();
    format!(
        "/* {FONT_FACES_MARKER} */
(async () => {{
  let timer;
  const deadline = new Promise((_, reject) => {{
    timer = setTimeout(() => reject(new Error('fonts not ready after {ms}ms')), {ms});
  }});
  try {{
    await Promise.race([document.fonts.ready, deadline]);
    const faces = Array.from(document.fonts);
    await Promise.race([Promise.allSettled(faces.map(face => face.load())), deadline]);
    const failed = faces
      .filter(face => face.status !== 'loaded')
      .map(face => face.family);
    return JSON.stringify({{ total: faces.length, failed }});
  }} finally {{
    clearTimeout(timer);
  }}
}})()"
    )
}

#[derive(Debug, Deserialize)]
struct FontReport {
    total: usize,
    failed: Vec<String>,
}

fn parse_font_report(value: Option<Value>) -> Result<FontReport, RenderError> {
    let parsed = match value {
        Some(Value::String(json)) => serde_json::from_str(&json),
        Some(other) => serde_json::from_value(other),
        None => {
            return Err(RenderError::FontWaitFailure(
                "font check returned nothing".to_string(),
            ));
        }
    };
    parsed.map_err(|e| RenderError::FontWaitFailure(format!("unreadable font report: {}", e)))
}

/// Two-stage font wait. Failures are never downgraded by best-effort mode.
fn await_fonts(driver: &dyn BrowserDriver, timeout: Duration) -> Result<(), RenderError> {
    let start = Instant::now();

    driver
        .evaluate(&font_stylesheets_script(timeout), true)
        .map_err(|e| e.to_string())
        .and_then(completed)
        .map_err(|e| RenderError::FontWaitFailure(format!("font stylesheets: {}", e)))?;

    let report = driver
        .evaluate(&font_faces_script(timeout), true)
        .map_err(|e| RenderError::FontWaitFailure(format!("font faces: {}", e)))
        .and_then(parse_font_report)?;

    if !report.failed.is_empty() {
        return Err(RenderError::FontWaitFailure(format!(
            "{} of {} font faces failed to load: {}",
            report.failed.len(),
            report.total,
            report.failed.join(", ")
        )));
    }

    log::debug!(
        "{} font faces verified in {:?}",
        report.total,
        start.elapsed()
    );
    Ok(())
}

// ============================================================================
// Extraction
// ============================================================================

/// Decode the browser's base64 payload and check it is a PDF.
///
/// # Errors
///
/// [`RenderError::PrintFailure`] for undecodable or non-PDF payloads.
pub fn decode_document(payload: &str) -> Result<Vec<u8>, RenderError> {
    let bytes = BASE64_STANDARD
        .decode(payload.trim())
        .map_err(|e| RenderError::PrintFailure(format!("payload is not valid base64: {}", e)))?;

    if !bytes.starts_with(PDF_MAGIC) {
        return Err(RenderError::PrintFailure(
            "payload is not a PDF document".to_string(),
        ));
    }

    Ok(bytes)
}

/// Truncate a string for logging. Data and file URLs can be very long.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len).collect();
        format!("{}...", head)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
