//! CSS length conversion and paper size resolution.
//!
//! Print parameters are expressed in inches, while requests use CSS-style
//! lengths (`"10mm"`, `"0.5in"`, `"96px"`). This module normalizes both.
//!
//! # Example
//!
//! ```rust
//! use html2pdf_render::units::{to_inches, resolve_page_size, PageFormat};
//!
//! assert_eq!(to_inches("96px").unwrap(), 1.0);
//! assert_eq!(to_inches("25.4mm").unwrap(), 1.0);
//!
//! let a4 = resolve_page_size(Some(PageFormat::A4), None, None).unwrap();
//! assert_eq!((a4.width, a4.height), (8.27, 11.69));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// CSS reference pixels per inch.
pub const PX_PER_INCH: f64 = 96.0;

/// Points per inch.
pub const PT_PER_INCH: f64 = 72.0;

/// Centimetres per inch.
pub const CM_PER_INCH: f64 = 2.54;

/// Millimetres per inch.
pub const MM_PER_INCH: f64 = 25.4;

/// Unit suffixes and the divisor that normalizes them to inches.
///
/// Order matters only in that every suffix is two characters long, so there
/// is no prefix ambiguity.
const UNITS: [(&str, f64); 5] = [
    ("px", PX_PER_INCH),
    ("in", 1.0),
    ("cm", CM_PER_INCH),
    ("mm", MM_PER_INCH),
    ("pt", PT_PER_INCH),
];

/// Convert a CSS length string to inches.
///
/// Accepts a numeric literal optionally followed by `px`, `in`, `cm`, `mm`
/// or `pt` (case-insensitive, surrounding whitespace ignored). A bare number
/// is taken as pixels. An empty string is zero.
///
/// # Errors
///
/// Returns [`RenderError::MalformedDimension`] when what remains after
/// stripping the unit is not a finite number.
///
/// # Example
///
/// ```rust
/// use html2pdf_render::units::to_inches;
///
/// assert_eq!(to_inches("1in").unwrap(), 1.0);
/// assert_eq!(to_inches("72pt").unwrap(), 1.0);
/// assert_eq!(to_inches("96").unwrap(), 1.0);
/// assert_eq!(to_inches("").unwrap(), 0.0);
/// assert!(to_inches("wide").is_err());
/// ```
pub fn to_inches(value: &str) -> Result<f64, RenderError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }

    let lower = trimmed.to_ascii_lowercase();
    let (number, divisor) = UNITS
        .iter()
        .find_map(|(suffix, divisor)| lower.strip_suffix(suffix).map(|n| (n, *divisor)))
        .unwrap_or((lower.as_str(), PX_PER_INCH));

    let parsed: f64 = number
        .trim()
        .parse()
        .map_err(|_| RenderError::MalformedDimension(value.to_string()))?;

    if !parsed.is_finite() {
        return Err(RenderError::MalformedDimension(value.to_string()));
    }

    Ok(parsed / divisor)
}

/// Convert an optional length, treating `None` as zero.
pub fn to_inches_or_zero(value: Option<&str>) -> Result<f64, RenderError> {
    value.map(to_inches).unwrap_or(Ok(0.0))
}

// ============================================================================
// Page Formats
// ============================================================================

/// Named paper formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PageFormat {
    A0,
    A1,
    A2,
    A3,
    /// The default format.
    #[default]
    A4,
    A5,
    Letter,
    Legal,
    Tabloid,
}

impl PageFormat {
    /// Every supported format, largest ISO size first.
    pub const ALL: [PageFormat; 9] = [
        PageFormat::A0,
        PageFormat::A1,
        PageFormat::A2,
        PageFormat::A3,
        PageFormat::A4,
        PageFormat::A5,
        PageFormat::Letter,
        PageFormat::Legal,
        PageFormat::Tabloid,
    ];

    /// Portrait dimensions in inches.
    pub const fn size(self) -> PageSize {
        let (width, height) = match self {
            PageFormat::A0 => (33.11, 46.81),
            PageFormat::A1 => (23.39, 33.11),
            PageFormat::A2 => (16.54, 23.39),
            PageFormat::A3 => (11.69, 16.54),
            PageFormat::A4 => (8.27, 11.69),
            PageFormat::A5 => (5.83, 8.27),
            PageFormat::Letter => (8.5, 11.0),
            PageFormat::Legal => (8.5, 14.0),
            PageFormat::Tabloid => (11.0, 17.0),
        };
        PageSize { width, height }
    }

    /// Canonical name as used in requests.
    pub const fn name(self) -> &'static str {
        match self {
            PageFormat::A0 => "A0",
            PageFormat::A1 => "A1",
            PageFormat::A2 => "A2",
            PageFormat::A3 => "A3",
            PageFormat::A4 => "A4",
            PageFormat::A5 => "A5",
            PageFormat::Letter => "Letter",
            PageFormat::Legal => "Legal",
            PageFormat::Tabloid => "Tabloid",
        }
    }
}

impl fmt::Display for PageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PageFormat {
    type Err = String;

    /// Case-insensitive lookup, so `"letter"` and `"LETTER"` both resolve.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PageFormat::ALL
            .into_iter()
            .find(|format| format.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown page format '{}'", s))
    }
}

/// Physical paper dimensions in inches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

/// Resolve the paper size for a request.
///
/// When both `width` and `height` are given they win over `format`; each is
/// converted with [`to_inches`]. A lone width or height is ignored. Without
/// explicit dimensions the named format is used, defaulting to A4.
///
/// # Example
///
/// ```rust
/// use html2pdf_render::units::{resolve_page_size, PageFormat};
///
/// let size = resolve_page_size(Some(PageFormat::Letter), Some("210mm"), Some("297mm")).unwrap();
/// assert!((size.width - 8.2677).abs() < 1e-3);
/// ```
pub fn resolve_page_size(
    format: Option<PageFormat>,
    width: Option<&str>,
    height: Option<&str>,
) -> Result<PageSize, RenderError> {
    if let (Some(width), Some(height)) = (width, height) {
        return Ok(PageSize {
            width: to_inches(width)?,
            height: to_inches(height)?,
        });
    }

    Ok(format.unwrap_or_default().size())
}

// ============================================================================
// Unit Tests
// ============================================================================
