//! Error types for rendering and compression.
//!
//! Every fatal condition of the pipeline has its own variant so callers can
//! tell an environment problem (no browser binary) from a content problem
//! (fonts that never load) without parsing messages.
//!
//! | Type | Raised by |
//! |------|-----------|
//! | [`RenderError`] | Render pipeline, wrapped in [`RenderFailure`] with the phase it occurred in |
//! | [`DriverError`] | [`BrowserDriver`](crate::driver::BrowserDriver) implementations |
//! | [`CompressionError`] | [`CompressionEngine`](crate::compress::CompressionEngine) |
//! | [`EditError`] | [`DocumentEditor`](crate::compress::DocumentEditor) sub-steps (logged, never fatal) |
//!
//! # Example
//!
//! ```rust
//! use html2pdf_render::{RenderError, RenderFailure, RenderPhase};
//!
//! let failure = RenderFailure::new(
//!     RenderPhase::AwaitFonts,
//!     RenderError::FontWaitFailure("Inter did not load".to_string()),
//! );
//! assert_eq!(
//!     failure.to_string(),
//!     "render failed during await-fonts: Font loading failed: Inter did not load"
//! );
//! ```

use std::fmt;

// ============================================================================
// Render Errors
// ============================================================================

/// The state of the render state machine in which a failure occurred.
///
/// Teardown has no variant: teardown problems are logged and never reported
/// as the primary error of a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderPhase {
    /// Request validation and print-option compilation, before any resource exists.
    Compile,
    /// Temp directory creation and browser launch.
    Acquire,
    /// Page setup, navigation and asset injection.
    Load,
    /// Polling `document.readyState`.
    AwaitReady,
    /// Font stylesheet and font face synchronization.
    AwaitFonts,
    /// The browser print command.
    Print,
    /// Payload decoding.
    Extract,
}

impl fmt::Display for RenderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Compile => "compile",
            Self::Acquire => "acquire",
            Self::Load => "load",
            Self::AwaitReady => "await-ready",
            Self::AwaitFonts => "await-fonts",
            Self::Print => "print",
            Self::Extract => "extract",
        };
        f.write_str(name)
    }
}

/// Cause of a failed render.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    /// The request names neither inline markup nor a remote locator, or the
    /// locator is not a valid URL.
    #[error("Invalid render request: {0}")]
    InvalidRequest(String),

    /// Render options violate an invariant (non-positive scale, negative
    /// margin, zero timeout).
    #[error("Invalid render options: {0}")]
    InvalidOptions(String),

    /// A length string could not be parsed.
    ///
    /// ```rust
    /// use html2pdf_render::units::to_inches;
    /// use html2pdf_render::RenderError;
    ///
    /// let err = to_inches("twelve px").unwrap_err();
    /// assert!(matches!(err, RenderError::MalformedDimension(_)));
    /// ```
    #[error("Malformed dimension: '{0}'")]
    MalformedDimension(String),

    /// The browser process could not be spawned, or the session directory
    /// could not be created. Never retried.
    #[error("Failed to acquire browser: {0}")]
    AcquireFailure(String),

    /// Request-scoped page configuration (headers, interception, injected
    /// tags) was rejected by the browser.
    #[error("Page setup failed: {0}")]
    PageSetup(String),

    /// The document never became ready and the request was not best-effort.
    #[error("Document load timed out: {0}")]
    LoadTimeout(String),

    /// Fonts failed to load or verify. Never suppressed by best-effort.
    #[error("Font loading failed: {0}")]
    FontWaitFailure(String),

    /// The print command failed, returned no payload, or returned a payload
    /// that is not a PDF.
    #[error("Print failed: {0}")]
    PrintFailure(String),

    /// Host filesystem error while materializing the document.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for RenderError {
    fn from(err: std::io::Error) -> Self {
        RenderError::Io(err.to_string())
    }
}

/// A fatal render error tagged with the phase it aborted.
///
/// By the time a caller sees this value the session has already been torn
/// down: the browser process is gone and the working directory removed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("render failed during {phase}: {cause}")]
pub struct RenderFailure {
    /// Phase that failed.
    pub phase: RenderPhase,
    /// What went wrong.
    #[source]
    pub cause: RenderError,
}

impl RenderFailure {
    /// Create a failure for `phase`.
    pub fn new(phase: RenderPhase, cause: RenderError) -> Self {
        Self { phase, cause }
    }

    /// Returns a closure that wraps a [`RenderError`] with `phase`, for use
    /// with `map_err`.
    pub(crate) fn during(phase: RenderPhase) -> impl Fn(RenderError) -> RenderFailure {
        move |cause| RenderFailure::new(phase, cause)
    }
}

// ============================================================================
// Driver Errors
// ============================================================================

/// Errors reported by a [`BrowserDriver`](crate::driver::BrowserDriver) or
/// [`BrowserLauncher`](crate::driver::BrowserLauncher).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DriverError {
    /// Browser binary missing, not executable, or exited during startup.
    #[error("Browser launch failed: {0}")]
    Launch(String),

    /// Navigation was rejected (bad scheme, DNS failure, connection refused).
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// A browser operation exceeded its deadline.
    #[error("Browser operation timed out: {0}")]
    Timeout(String),

    /// Script evaluation threw or could not be delivered.
    #[error("Script evaluation failed: {0}")]
    Script(String),

    /// The print command failed.
    #[error("Print command failed: {0}")]
    Print(String),

    /// Closing the browser failed.
    #[error("Browser close failed: {0}")]
    Close(String),
}

// ============================================================================
// Compression Errors
// ============================================================================

/// Fatal compression errors.
///
/// Per-image and per-stream failures never surface here; they are logged and
/// counted in the [`CompressionReport`](crate::compress::CompressionReport).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompressionError {
    /// Level outside `0..=9`.
    #[error("Compression level {0} is out of range (expected 0-9)")]
    InvalidLevel(u8),

    /// The input could not be parsed as a PDF at all.
    #[error("Compression failed: input is not a readable PDF: {0}")]
    Unparseable(String),

    /// The rewritten document could not be serialized.
    #[error("Compression failed: could not write PDF: {0}")]
    Serialize(String),
}

/// Failure of a single structural edit (one image, one stream, one pass).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct EditError(pub String);

impl From<lopdf::Error> for EditError {
    fn from(err: lopdf::Error) -> Self {
        EditError(err.to_string())
    }
}

impl From<&str> for EditError {
    fn from(msg: &str) -> Self {
        EditError(msg.to_string())
    }
}

impl From<String> for EditError {
    fn from(msg: String) -> Self {
        EditError(msg)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Verifies the failure message names both phase and cause.
    #[test]
    fn test_render_failure_display() {
        let failure = RenderFailure::new(
            RenderPhase::AwaitReady,
            RenderError::LoadTimeout("readyState still 'loading' after 30s".to_string()),
        );
        assert_eq!(
            failure.to_string(),
            "render failed during await-ready: Document load timed out: readyState still 'loading' after 30s"
        );
    }

    #[test]
    fn test_render_failure_source_is_cause() {
        use std::error::Error;

        let failure = RenderFailure::new(
            RenderPhase::Print,
            RenderError::PrintFailure("no payload".to_string()),
        );
        let source = failure.source().expect("source should be set");
        assert_eq!(source.to_string(), "Print failed: no payload");
    }

    #[test]
    fn test_during_wraps_phase() {
        let wrap = RenderFailure::during(RenderPhase::Acquire);
        let failure = wrap(RenderError::AcquireFailure("chrome not found".to_string()));
        assert_eq!(failure.phase, RenderPhase::Acquire);
        assert!(matches!(failure.cause, RenderError::AcquireFailure(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: RenderError = io.into();
        assert!(matches!(err, RenderError::Io(msg) if msg.contains("denied")));
    }

    #[test]
    fn test_compression_error_display() {
        assert_eq!(
            CompressionError::InvalidLevel(12).to_string(),
            "Compression level 12 is out of range (expected 0-9)"
        );
        assert!(
            CompressionError::Unparseable("bad header".to_string())
                .to_string()
                .starts_with("Compression failed")
        );
    }

    #[test]
    fn test_edit_error_conversions() {
        let err: EditError = "unsupported filter".into();
        assert_eq!(err.to_string(), "unsupported filter");
        let err: EditError = String::from("bad stream").into();
        assert_eq!(err.0, "bad stream");
    }

    /// Errors cross the blocking-pool boundary, so they must be Send + Sync.
    #[test]
    fn test_errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync + std::error::Error>() {}
        assert_send_sync::<RenderFailure>();
        assert_send_sync::<RenderError>();
        assert_send_sync::<DriverError>();
        assert_send_sync::<CompressionError>();
        assert_send_sync::<EditError>();
    }
}
