//! Browser driver abstraction.
//!
//! This module provides the [`BrowserLauncher`] and [`BrowserDriver`] traits
//! that the render pipeline talks to, plus the request-scoped data handed to
//! them ([`LaunchSpec`], [`PageSetup`]).
//!
//! # Overview
//!
//! A launcher spawns one disposable browser per render. The returned driver
//! owns that process and exposes only the handful of primitives the pipeline
//! needs: configure the page, navigate, evaluate a script, print, close.
//! Keeping the surface this small lets the whole state machine be exercised
//! against [`mock::MockBrowserLauncher`] without a browser installed.
//!
//! # Available Launchers
//!
//! | Launcher | Description |
//! |----------|-------------|
//! | [`ChromeLauncher`] | Spawns headless Chrome/Chromium via `headless_chrome` |
//! | [`mock::MockBrowserLauncher`] | Scriptable fake for tests (feature-gated) |
//!
//! # Custom Launcher
//!
//! ```rust,ignore
//! use html2pdf_render::driver::{BrowserDriver, BrowserLauncher, LaunchSpec};
//! use html2pdf_render::DriverError;
//!
//! struct RemoteLauncher { endpoint: String }
//!
//! impl BrowserLauncher for RemoteLauncher {
//!     fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn BrowserDriver>, DriverError> {
//!         // connect to a browser farm instead of spawning locally
//!         todo!()
//!     }
//! }
//! ```

mod chrome;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use chrome::{ChromeDriver, ChromeLauncher, create_launch_options};

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

use crate::error::DriverError;
use crate::print::CompiledPrintParameters;
use crate::request::{Cookie, Credentials, MediaType, ResourceType, Viewport};

/// Script returning `document.readyState`.
pub const READY_STATE_SCRIPT: &str = "document.readyState";

// ============================================================================
// Traits
// ============================================================================

/// Spawns browser processes.
///
/// # Thread Safety
///
/// Launchers are shared by every concurrent render of a
/// [`Renderer`](crate::render::Renderer), hence `Send + Sync`.
pub trait BrowserLauncher: Send + Sync {
    /// Start a fresh browser process for one render.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Launch`] if the binary is missing or the
    /// process dies during startup.
    fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn BrowserDriver>, DriverError>;
}

/// One live browser process with a single page.
///
/// A driver is used by exactly one render on one thread at a time; it only
/// needs to be `Send` so the render can run on a blocking worker.
pub trait BrowserDriver: Send {
    /// Apply request-scoped page settings. Called once, before navigation.
    fn prepare(&mut self, setup: &PageSetup) -> Result<(), DriverError>;

    /// Start loading `url`. Readiness is observed separately.
    fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    /// Evaluate `script` in the page, awaiting a returned promise when
    /// `await_promise` is set.
    fn evaluate(&self, script: &str, await_promise: bool) -> Result<Option<Value>, DriverError>;

    /// Run the print command, returning the base64-encoded document the
    /// browser produced, or `None` if it produced nothing.
    fn print_to_document(
        &self,
        params: &CompiledPrintParameters,
    ) -> Result<Option<String>, DriverError>;

    /// Terminate the browser process.
    fn close(self: Box<Self>) -> Result<(), DriverError>;

    /// Current `document.readyState`.
    fn ready_state(&self) -> Result<String, DriverError> {
        match self.evaluate(READY_STATE_SCRIPT, false)? {
            Some(Value::String(state)) => Ok(state),
            other => Err(DriverError::Script(format!(
                "unexpected readyState value: {:?}",
                other
            ))),
        }
    }
}

// ============================================================================
// Launch Spec
// ============================================================================

/// Everything a launcher needs to spawn one browser.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSpec {
    /// Browser binary, auto-detected when `None`.
    pub chrome_path: Option<String>,

    /// Full flag list: the configured capability flags plus request-scoped
    /// additions.
    pub args: Vec<String>,

    /// Window size in CSS pixels.
    pub window_size: Option<(u32, u32)>,

    /// Throwaway profile directory inside the session's working directory.
    pub profile_dir: PathBuf,

    /// Upper bound for individual protocol calls.
    pub operation_timeout: Duration,
}

// ============================================================================
// Page Setup
// ============================================================================

/// Request-scoped page configuration applied before navigation.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSetup {
    pub user_agent: Option<String>,

    /// Headers sent with every request.
    pub extra_headers: BTreeMap<String, String>,

    /// Cookies to install, each carrying its own `url` or `domain` scope.
    pub cookies: Vec<Cookie>,

    pub credentials: Option<Credentials>,

    pub media: Option<MediaType>,

    pub javascript_enabled: bool,

    pub reject_resource_types: Vec<ResourceType>,

    /// URL patterns, `*` matching any run of characters. A pattern without
    /// `*` matches as a substring.
    pub reject_url_patterns: Vec<String>,

    /// Emulate a touch screen.
    pub touch: bool,

    /// Emulate a mobile device with this viewport's metrics.
    pub mobile: Option<Viewport>,
}

impl Default for PageSetup {
    fn default() -> Self {
        Self {
            user_agent: None,
            extra_headers: BTreeMap::new(),
            cookies: Vec::new(),
            credentials: None,
            media: None,
            javascript_enabled: true,
            reject_resource_types: Vec::new(),
            reject_url_patterns: Vec::new(),
            touch: false,
            mobile: None,
        }
    }
}

impl PageSetup {
    /// Whether any request needs to be intercepted.
    pub fn intercepts_requests(&self) -> bool {
        !self.reject_resource_types.is_empty() || !self.reject_url_patterns.is_empty()
    }

    /// Whether a request for `url` of the given resource type (lowercase
    /// browser name, e.g. `"image"`) must be blocked.
    pub fn blocks(&self, url: &str, resource_type: &str) -> bool {
        self.reject_resource_types
            .iter()
            .any(|kind| kind.as_str().eq_ignore_ascii_case(resource_type))
            || self
                .reject_url_patterns
                .iter()
                .any(|pattern| pattern_matches(pattern, url))
    }
}

/// Match `text` against a pattern where `*` stands for any run of
/// characters. Patterns without `*` match anywhere in `text`.
pub fn pattern_matches(pattern: &str, text: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    if !pattern.contains('*') {
        return text.contains(pattern);
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let (first, rest) = match parts.split_first() {
        Some(split) => split,
        None => return false,
    };

    let Some(mut remaining) = text.strip_prefix(first) else {
        return false;
    };

    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };

    for part in middle {
        match remaining.find(part) {
            Some(index) => remaining = &remaining[index + part.len()..],
            None => return false,
        }
    }

    remaining.len() >= last.len() && remaining.ends_with(last)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_substring() {
        assert!(pattern_matches("analytics", "https://analytics.example.com/a.js"));
        assert!(!pattern_matches("tracker", "https://example.com/app.js"));
        assert!(!pattern_matches("", "https://example.com"));
    }

    #[test]
    fn test_pattern_wildcards() {
        assert!(pattern_matches("*.png", "https://cdn.example.com/logo.png"));
        assert!(!pattern_matches("*.png", "https://cdn.example.com/logo.png?v=2"));
        assert!(pattern_matches("https://*.ads.*/*", "https://x.ads.net/banner"));
        assert!(!pattern_matches("https://*.ads.*/*", "http://x.ads.net/banner"));
        assert!(pattern_matches("*", "anything"));
        assert!(pattern_matches("*ads*", "https://example.com/ads/1"));
    }

    /// Middle and last parts must not overlap.
    #[test]
    fn test_pattern_no_overlap() {
        assert!(!pattern_matches("a*bab", "ab"));
        assert!(pattern_matches("a*b*b", "abb"));
        assert!(!pattern_matches("a*b*b", "ab"));
    }

    #[test]
    fn test_page_setup_blocks() {
        let setup = PageSetup {
            reject_resource_types: vec![ResourceType::Image, ResourceType::Font],
            reject_url_patterns: vec!["*tracking*".to_string()],
            ..Default::default()
        };

        assert!(setup.intercepts_requests());
        assert!(setup.blocks("https://example.com/a.png", "image"));
        assert!(setup.blocks("https://example.com/a.woff2", "Font"));
        assert!(setup.blocks("https://example.com/tracking.js", "script"));
        assert!(!setup.blocks("https://example.com/app.js", "script"));
    }

    #[test]
    fn test_page_setup_default() {
        let setup = PageSetup::default();
        assert!(setup.javascript_enabled);
        assert!(!setup.intercepts_requests());
        assert!(!setup.blocks("https://example.com", "document"));
    }
}
