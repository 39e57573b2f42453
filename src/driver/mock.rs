//! Mock browser launcher for testing.
//!
//! This module provides a scriptable implementation of [`BrowserLauncher`]
//! that never spawns a process. Each phase of a render can be made to
//! succeed, stall or fail, and every call is recorded so tests can assert
//! on what the pipeline asked the browser to do.
//!
//! # Feature Flag
//!
//! This module is only available when:
//! - The `test-utils` feature is enabled, OR
//! - During testing (`#[cfg(test)]`)
//!
//! # Example
//!
//! ```rust,ignore
//! use html2pdf_render::driver::mock::{MockBrowserLauncher, ReadyBehavior};
//!
//! // Launcher whose documents never finish loading
//! let launcher = MockBrowserLauncher::new().ready(ReadyBehavior::Never);
//!
//! // Launcher that cannot find a browser binary
//! let launcher = MockBrowserLauncher::always_fails("Chrome not installed");
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use lopdf::{Document, Object, Stream, dictionary};
use serde_json::Value;

use super::{BrowserDriver, BrowserLauncher, LaunchSpec, PageSetup, READY_STATE_SCRIPT};
use crate::error::DriverError;
use crate::print::CompiledPrintParameters;
use crate::render::{FONT_FACES_MARKER, FONT_STYLESHEETS_MARKER, SCRIPT_OK};

/// How `document.readyState` evolves in a mock page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyBehavior {
    /// `"complete"` on the first poll.
    Complete,
    /// `"loading"` for the first `n` polls, then `"complete"`.
    CompleteAfter(usize),
    /// `"loading"` forever.
    Never,
}

/// Outcome of the font-face verification script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontBehavior {
    /// Every face loaded.
    Loaded,
    /// The named families failed verification.
    Failed(Vec<String>),
    /// The script itself threw.
    ScriptError(String),
}

/// How a script that throws or rejects is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptErrors {
    /// As an `Err`, the way [`ChromeDriver`](super::ChromeDriver) reports
    /// `exceptionDetails`.
    #[default]
    Raised,
    /// As `Ok(None)`, the way `headless_chrome`'s `Tab::evaluate` does.
    Swallowed,
}

/// What the print command returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintBehavior {
    /// A small valid PDF, see [`sample_pdf`].
    Pdf,
    /// No payload at all.
    Missing,
    /// An empty payload.
    Empty,
    /// A payload that decodes but is not a PDF.
    NotPdf,
    /// A payload that is not valid base64.
    Undecodable,
    /// The command fails.
    Error(String),
}

#[derive(Debug, Clone)]
struct Behavior {
    launch_error: Option<String>,
    setup_error: Option<String>,
    navigation_error: Option<String>,
    ready: ReadyBehavior,
    stylesheet_error: Option<String>,
    asset_error: Option<String>,
    script_errors: ScriptErrors,
    fonts: FontBehavior,
    print: PrintBehavior,
    print_delay: Option<Duration>,
    close_error: Option<String>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            launch_error: None,
            setup_error: None,
            navigation_error: None,
            ready: ReadyBehavior::Complete,
            stylesheet_error: None,
            asset_error: None,
            script_errors: ScriptErrors::Raised,
            fonts: FontBehavior::Loaded,
            print: PrintBehavior::Pdf,
            print_delay: None,
            close_error: None,
        }
    }
}

#[derive(Debug, Default)]
struct Record {
    launch_count: AtomicUsize,
    live: AtomicUsize,
    close_count: AtomicUsize,
    launch_specs: Mutex<Vec<LaunchSpec>>,
    page_setups: Mutex<Vec<PageSetup>>,
    navigations: Mutex<Vec<String>>,
    scripts: Mutex<Vec<String>>,
    printed: Mutex<Vec<CompiledPrintParameters>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scriptable launcher for tests without Chrome.
///
/// Cloning shares the recorded state, so a test can keep one clone for
/// assertions after handing another to a [`Renderer`](crate::render::Renderer).
///
/// # Example
///
/// ```rust,ignore
/// let launcher = MockBrowserLauncher::new().print(PrintBehavior::Missing);
/// let renderer = Renderer::new(Arc::new(launcher.clone()), config);
///
/// assert!(renderer.render(&request).is_err());
/// assert_eq!(launcher.launch_count(), 1);
/// assert_eq!(launcher.live_sessions(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockBrowserLauncher {
    behavior: Arc<Behavior>,
    record: Arc<Record>,
}

impl MockBrowserLauncher {
    /// Launcher whose browsers succeed at everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Launcher that fails every launch with `message`.
    pub fn always_fails<S: Into<String>>(message: S) -> Self {
        Self::new().configure(|b| b.launch_error = Some(message.into()))
    }

    fn configure(mut self, f: impl FnOnce(&mut Behavior)) -> Self {
        f(Arc::make_mut(&mut self.behavior));
        self
    }

    /// Fail page setup with `message`.
    pub fn failing_setup<S: Into<String>>(self, message: S) -> Self {
        self.configure(|b| b.setup_error = Some(message.into()))
    }

    /// Fail navigation with `message`.
    pub fn failing_navigation<S: Into<String>>(self, message: S) -> Self {
        self.configure(|b| b.navigation_error = Some(message.into()))
    }

    pub fn ready(self, ready: ReadyBehavior) -> Self {
        self.configure(|b| b.ready = ready)
    }

    /// Make the stylesheet wait throw `message`.
    pub fn failing_stylesheets<S: Into<String>>(self, message: S) -> Self {
        self.configure(|b| b.stylesheet_error = Some(message.into()))
    }

    /// Make every injected script or style throw `message`.
    pub fn failing_assets<S: Into<String>>(self, message: S) -> Self {
        self.configure(|b| b.asset_error = Some(message.into()))
    }

    pub fn script_errors(self, script_errors: ScriptErrors) -> Self {
        self.configure(|b| b.script_errors = script_errors)
    }

    pub fn fonts(self, fonts: FontBehavior) -> Self {
        self.configure(|b| b.fonts = fonts)
    }

    pub fn print(self, print: PrintBehavior) -> Self {
        self.configure(|b| b.print = print)
    }

    /// Block the print command for `delay`.
    pub fn print_delay(self, delay: Duration) -> Self {
        self.configure(|b| b.print_delay = Some(delay))
    }

    /// Fail browser shutdown with `message`.
    pub fn failing_close<S: Into<String>>(self, message: S) -> Self {
        self.configure(|b| b.close_error = Some(message.into()))
    }

    /// Number of launch attempts.
    pub fn launch_count(&self) -> usize {
        self.record.launch_count.load(Ordering::SeqCst)
    }

    /// Browsers launched and not yet closed or dropped.
    pub fn live_sessions(&self) -> usize {
        self.record.live.load(Ordering::SeqCst)
    }

    /// Number of explicit close calls.
    pub fn close_count(&self) -> usize {
        self.record.close_count.load(Ordering::SeqCst)
    }

    pub fn launch_specs(&self) -> Vec<LaunchSpec> {
        lock(&self.record.launch_specs).clone()
    }

    pub fn page_setups(&self) -> Vec<PageSetup> {
        lock(&self.record.page_setups).clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        lock(&self.record.navigations).clone()
    }

    /// Every script evaluated, readiness polls excluded.
    pub fn scripts(&self) -> Vec<String> {
        lock(&self.record.scripts).clone()
    }

    pub fn printed(&self) -> Vec<CompiledPrintParameters> {
        lock(&self.record.printed).clone()
    }
}

impl BrowserLauncher for MockBrowserLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn BrowserDriver>, DriverError> {
        let count = self.record.launch_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.record.launch_specs).push(spec.clone());

        if let Some(message) = &self.behavior.launch_error {
            log::debug!("MockBrowserLauncher: Returning configured failure");
            return Err(DriverError::Launch(message.clone()));
        }

        // A real browser populates its profile directory on startup.
        std::fs::create_dir_all(&spec.profile_dir)
            .and_then(|_| std::fs::write(spec.profile_dir.join("Local State"), b"{}"))
            .map_err(|e| DriverError::Launch(format!("profile dir: {}", e)))?;

        log::debug!("MockBrowserLauncher: Launched mock browser #{}", count + 1);
        self.record.live.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MockDriver {
            behavior: Arc::clone(&self.behavior),
            record: Arc::clone(&self.record),
            polls: AtomicUsize::new(0),
            alive: true,
        }))
    }
}

// ============================================================================
// Mock Driver
// ============================================================================

struct MockDriver {
    behavior: Arc<Behavior>,
    record: Arc<Record>,
    polls: AtomicUsize,
    alive: bool,
}

impl MockDriver {
    fn next_ready_state(&self) -> &'static str {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst);
        let complete = match self.behavior.ready {
            ReadyBehavior::Complete => true,
            ReadyBehavior::CompleteAfter(n) => poll >= n,
            ReadyBehavior::Never => false,
        };
        if complete { "complete" } else { "loading" }
    }

    fn font_faces(&self) -> Result<Option<Value>, DriverError> {
        match &self.behavior.fonts {
            FontBehavior::Loaded => Ok(Some(Value::String(
                r#"{"total":2,"failed":[]}"#.to_string(),
            ))),
            FontBehavior::Failed(families) => {
                let report = serde_json::json!({
                    "total": families.len() + 1,
                    "failed": families,
                });
                Ok(Some(Value::String(report.to_string())))
            }
            FontBehavior::ScriptError(message) => self.thrown(message),
        }
    }

    fn thrown(&self, message: &str) -> Result<Option<Value>, DriverError> {
        match self.behavior.script_errors {
            ScriptErrors::Raised => Err(DriverError::Script(message.to_string())),
            ScriptErrors::Swallowed => Ok(None),
        }
    }
}

impl BrowserDriver for MockDriver {
    fn prepare(&mut self, setup: &PageSetup) -> Result<(), DriverError> {
        lock(&self.record.page_setups).push(setup.clone());
        match &self.behavior.setup_error {
            Some(message) => Err(DriverError::Script(message.clone())),
            None => Ok(()),
        }
    }

    fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        lock(&self.record.navigations).push(url.to_string());
        match &self.behavior.navigation_error {
            Some(message) => Err(DriverError::Navigation(message.clone())),
            None => Ok(()),
        }
    }

    fn evaluate(&self, script: &str, _await_promise: bool) -> Result<Option<Value>, DriverError> {
        if script == READY_STATE_SCRIPT {
            return Ok(Some(Value::String(self.next_ready_state().to_string())));
        }

        lock(&self.record.scripts).push(script.to_string());

        if script.contains(FONT_STYLESHEETS_MARKER) {
            return match &self.behavior.stylesheet_error {
                Some(message) => self.thrown(message),
                None => Ok(Some(Value::String(SCRIPT_OK.to_string()))),
            };
        }

        if script.contains(FONT_FACES_MARKER) {
            return self.font_faces();
        }

        // Anything else is an injected asset.
        match &self.behavior.asset_error {
            Some(message) => self.thrown(message),
            None => Ok(Some(Value::String(SCRIPT_OK.to_string()))),
        }
    }

    fn print_to_document(
        &self,
        params: &CompiledPrintParameters,
    ) -> Result<Option<String>, DriverError> {
        lock(&self.record.printed).push(params.clone());

        if let Some(delay) = self.behavior.print_delay {
            std::thread::sleep(delay);
        }

        match &self.behavior.print {
            PrintBehavior::Pdf => {
                let pdf = sample_pdf().map_err(|e| DriverError::Print(e.to_string()))?;
                Ok(Some(BASE64_STANDARD.encode(pdf)))
            }
            PrintBehavior::Missing => Ok(None),
            PrintBehavior::Empty => Ok(Some(String::new())),
            PrintBehavior::NotPdf => Ok(Some(BASE64_STANDARD.encode(b"<html>oops</html>"))),
            PrintBehavior::Undecodable => Ok(Some("%%% not base64 %%%".to_string())),
            PrintBehavior::Error(message) => Err(DriverError::Print(message.clone())),
        }
    }

    fn close(mut self: Box<Self>) -> Result<(), DriverError> {
        self.record.close_count.fetch_add(1, Ordering::SeqCst);
        // The process is gone even if shutdown reports an error.
        self.release();
        match &self.behavior.close_error {
            Some(message) => Err(DriverError::Close(message.clone())),
            None => Ok(()),
        }
    }
}

impl MockDriver {
    fn release(&mut self) {
        if self.alive {
            self.alive = false;
            self.record.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MockDriver {
    fn drop(&mut self) {
        self.release();
    }
}

/// A one-page PDF with a text content stream.
pub fn sample_pdf() -> Result<Vec<u8>, lopdf::Error> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = b"BT /F1 24 Tf 72 720 Td (Rendered by a mock browser) Tj ET".to_vec();
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)?;
    Ok(buffer)
}

// ============================================================================
// Unit Tests
// ============================================================================
