//! User-facing print options.
//!
//! [`RenderOptions`] is what a client sends; the
//! [print compiler](crate::print::compile) turns it into physical-unit
//! parameters. Options are validated before anything is launched:
//! non-positive scale, negative margins and a zero timeout are rejected.
//!
//! # Example
//!
//! ```rust
//! use html2pdf_render::options::RenderOptionsBuilder;
//! use html2pdf_render::units::PageFormat;
//!
//! let options = RenderOptionsBuilder::new()
//!     .format(PageFormat::Letter)
//!     .landscape(true)
//!     .margin_all("10mm")
//!     .build()
//!     .expect("valid options");
//!
//! assert!(options.landscape);
//! assert_eq!(options.margin.top.as_deref(), Some("10mm"));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RenderError;
use crate::units::{PageFormat, to_inches};

/// Default readiness/font timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Four-sided page margin, each side a CSS length string.
///
/// Missing sides resolve to zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Margin {
    pub top: Option<String>,
    pub bottom: Option<String>,
    pub left: Option<String>,
    pub right: Option<String>,
}

impl Margin {
    /// Same length on every side.
    pub fn uniform(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            top: Some(value.clone()),
            bottom: Some(value.clone()),
            left: Some(value.clone()),
            right: Some(value),
        }
    }

    fn sides(&self) -> [(&'static str, Option<&str>); 4] {
        [
            ("top", self.top.as_deref()),
            ("bottom", self.bottom.as_deref()),
            ("left", self.left.as_deref()),
            ("right", self.right.as_deref()),
        ]
    }
}

/// Print options for a single render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderOptions {
    /// Rendering scale, must be > 0.
    pub scale: f64,

    /// Show header and footer templates.
    pub display_header_footer: bool,

    /// Header template HTML; only used with `display_header_footer`.
    pub header_template: Option<String>,

    /// Footer template HTML; only used with `display_header_footer`.
    pub footer_template: Option<String>,

    /// Print CSS backgrounds.
    pub print_background: bool,

    /// Landscape orientation.
    pub landscape: bool,

    /// Page ranges such as `"1-5, 8"`. Absent or empty means all pages.
    pub page_ranges: Option<String>,

    /// Named paper format, A4 when absent.
    pub format: Option<PageFormat>,

    /// Explicit paper width; overrides `format` together with `height`.
    pub width: Option<String>,

    /// Explicit paper height; overrides `format` together with `width`.
    pub height: Option<String>,

    /// Let CSS `@page` size win over the paper size.
    #[serde(rename = "preferCSSPageSize")]
    pub prefer_css_page_size: bool,

    /// Page margins.
    pub margin: Margin,

    /// Readiness and font-wait timeout in milliseconds, must be > 0.
    pub timeout: u64,

    /// Wait for web fonts before printing.
    pub wait_for_fonts: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            display_header_footer: false,
            header_template: None,
            footer_template: None,
            print_background: true,
            landscape: false,
            page_ranges: None,
            format: None,
            width: None,
            height: None,
            prefer_css_page_size: false,
            margin: Margin::default(),
            timeout: DEFAULT_TIMEOUT_MS,
            wait_for_fonts: true,
        }
    }
}

impl RenderOptions {
    /// Timeout as a [`Duration`].
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    /// Check the invariants the print command relies on.
    ///
    /// # Errors
    ///
    /// - [`RenderError::InvalidOptions`] for a non-positive or non-finite
    ///   scale, a negative margin, or a zero timeout.
    /// - [`RenderError::MalformedDimension`] for an unparseable margin.
    pub fn validate(&self) -> Result<(), RenderError> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(RenderError::InvalidOptions(format!(
                "scale must be greater than 0 (got {})",
                self.scale
            )));
        }

        if self.timeout == 0 {
            return Err(RenderError::InvalidOptions(
                "timeout must be greater than 0".to_string(),
            ));
        }

        for (side, value) in self.margin.sides() {
            if let Some(value) = value {
                if to_inches(value)? < 0.0 {
                    return Err(RenderError::InvalidOptions(format!(
                        "margin {} must not be negative (got '{}')",
                        side, value
                    )));
                }
            }
        }

        Ok(())
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`RenderOptions`] that validates on [`build`](Self::build).
#[derive(Debug, Default)]
pub struct RenderOptionsBuilder {
    options: RenderOptions,
    timeout_error: Option<String>,
}

impl RenderOptionsBuilder {
    /// Start from [`RenderOptions::default`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.options.scale = scale;
        self
    }

    pub fn landscape(mut self, landscape: bool) -> Self {
        self.options.landscape = landscape;
        self
    }

    pub fn print_background(mut self, print_background: bool) -> Self {
        self.options.print_background = print_background;
        self
    }

    pub fn format(mut self, format: PageFormat) -> Self {
        self.options.format = Some(format);
        self
    }

    /// Explicit paper size, taking precedence over any format.
    pub fn paper_size(mut self, width: impl Into<String>, height: impl Into<String>) -> Self {
        self.options.width = Some(width.into());
        self.options.height = Some(height.into());
        self
    }

    pub fn margin(mut self, margin: Margin) -> Self {
        self.options.margin = margin;
        self
    }

    pub fn margin_all(self, value: impl Into<String>) -> Self {
        self.margin(Margin::uniform(value))
    }

    pub fn page_ranges(mut self, ranges: impl Into<String>) -> Self {
        self.options.page_ranges = Some(ranges.into());
        self
    }

    /// Enable header/footer display with the given templates.
    pub fn header_footer(mut self, header: Option<String>, footer: Option<String>) -> Self {
        self.options.display_header_footer = true;
        self.options.header_template = header;
        self.options.footer_template = footer;
        self
    }

    pub fn prefer_css_page_size(mut self, prefer: bool) -> Self {
        self.options.prefer_css_page_size = prefer;
        self
    }

    /// Readiness/font-wait timeout. Durations whose milliseconds overflow
    /// `u64` are rejected by [`build`](Self::build).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        match u64::try_from(timeout.as_millis()) {
            Ok(ms) => {
                self.options.timeout = ms;
                self.timeout_error = None;
            }
            Err(_) => {
                self.timeout_error = Some(format!("timeout {:?} is too large", timeout));
            }
        }
        self
    }

    pub fn wait_for_fonts(mut self, wait: bool) -> Self {
        self.options.wait_for_fonts = wait;
        self
    }

    /// Validate and return the options.
    ///
    /// # Errors
    ///
    /// See [`RenderOptions::validate`].
    pub fn build(self) -> Result<RenderOptions, RenderError> {
        if let Some(message) = self.timeout_error {
            return Err(RenderError::InvalidOptions(message));
        }
        self.options.validate()?;
        Ok(self.options)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
