//! Print-option compilation.
//!
//! [`compile`] is a pure function from [`RenderOptions`] to the physical-unit
//! [`CompiledPrintParameters`] handed to the browser's print command. It is
//! computed once per render, before the browser is launched, so a malformed
//! margin never costs a browser start.

use crate::error::RenderError;
use crate::options::RenderOptions;
use crate::units::{resolve_page_size, to_inches_or_zero};

/// Resolved print parameters, all lengths in inches.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPrintParameters {
    pub scale: f64,
    pub print_background: bool,
    pub paper_width: f64,
    pub paper_height: f64,
    pub margin_top: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
    pub margin_right: f64,
    pub landscape: bool,
    pub prefer_css_page_size: bool,
    /// `Some` exactly when header/footer display is on; an absent template
    /// becomes an empty string so the browser's default header is not used.
    pub header_template: Option<String>,
    pub footer_template: Option<String>,
    /// `None` means all pages.
    pub page_ranges: Option<String>,
}

impl CompiledPrintParameters {
    /// Whether header and footer templates are printed.
    pub fn displays_header_footer(&self) -> bool {
        self.header_template.is_some() || self.footer_template.is_some()
    }
}

/// Compile user options into print parameters.
///
/// # Errors
///
/// - [`RenderError::InvalidOptions`] if `options` fail validation.
/// - [`RenderError::MalformedDimension`] for an unparseable width, height
///   or margin.
///
/// # Example
///
/// ```rust
/// use html2pdf_render::options::RenderOptionsBuilder;
/// use html2pdf_render::print::compile;
///
/// let options = RenderOptionsBuilder::new().margin_all("0.5in").build().unwrap();
/// let params = compile(&options).unwrap();
///
/// assert_eq!((params.paper_width, params.paper_height), (8.27, 11.69));
/// assert_eq!(params.margin_left, 0.5);
/// assert!(params.page_ranges.is_none());
/// ```
pub fn compile(options: &RenderOptions) -> Result<CompiledPrintParameters, RenderError> {
    options.validate()?;

    let size = resolve_page_size(
        options.format,
        options.width.as_deref(),
        options.height.as_deref(),
    )?;

    let (header_template, footer_template) = if options.display_header_footer {
        (
            Some(options.header_template.clone().unwrap_or_default()),
            Some(options.footer_template.clone().unwrap_or_default()),
        )
    } else {
        (None, None)
    };

    let page_ranges = options
        .page_ranges
        .as_deref()
        .map(str::trim)
        .filter(|ranges| !ranges.is_empty())
        .map(str::to_string);

    let params = CompiledPrintParameters {
        scale: options.scale,
        print_background: options.print_background,
        paper_width: size.width,
        paper_height: size.height,
        margin_top: to_inches_or_zero(options.margin.top.as_deref())?,
        margin_bottom: to_inches_or_zero(options.margin.bottom.as_deref())?,
        margin_left: to_inches_or_zero(options.margin.left.as_deref())?,
        margin_right: to_inches_or_zero(options.margin.right.as_deref())?,
        landscape: options.landscape,
        prefer_css_page_size: options.prefer_css_page_size,
        header_template,
        footer_template,
        page_ranges,
    };

    log::trace!("Compiled print parameters: {:?}", params);

    Ok(params)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{Margin, RenderOptionsBuilder};
    use crate::units::PageFormat;

    #[test]
    fn test_compile_defaults() {
        let params = compile(&RenderOptions::default()).unwrap();

        assert_eq!(params.scale, 1.0);
        assert!(params.print_background);
        assert_eq!(params.paper_width, 8.27);
        assert_eq!(params.paper_height, 11.69);
        assert_eq!(params.margin_top, 0.0);
        assert_eq!(params.margin_bottom, 0.0);
        assert_eq!(params.margin_left, 0.0);
        assert_eq!(params.margin_right, 0.0);
        assert!(!params.landscape);
        assert!(!params.prefer_css_page_size);
        assert!(params.header_template.is_none());
        assert!(params.footer_template.is_none());
        assert!(!params.displays_header_footer());
        assert!(params.page_ranges.is_none());
    }

    #[test]
    fn test_margins_convert_independently() {
        let options = RenderOptionsBuilder::new()
            .margin(Margin {
                top: Some("96px".to_string()),
                bottom: Some("2.54cm".to_string()),
                left: Some("36pt".to_string()),
                right: None,
            })
            .build()
            .unwrap();
        let params = compile(&options).unwrap();

        assert_eq!(params.margin_top, 1.0);
        assert_eq!(params.margin_bottom, 1.0);
        assert_eq!(params.margin_left, 0.5);
        assert_eq!(params.margin_right, 0.0);
    }

    #[test]
    fn test_explicit_size_wins_over_format() {
        let options = RenderOptionsBuilder::new()
            .format(PageFormat::Legal)
            .paper_size("5in", "7in")
            .build()
            .unwrap();
        let params = compile(&options).unwrap();
        assert_eq!((params.paper_width, params.paper_height), (5.0, 7.0));
    }

    #[test]
    fn test_templates_only_with_display_flag() {
        let mut options = RenderOptions {
            header_template: Some("<div>h</div>".to_string()),
            ..Default::default()
        };
        let params = compile(&options).unwrap();
        assert!(params.header_template.is_none());

        options.display_header_footer = true;
        let params = compile(&options).unwrap();
        assert_eq!(params.header_template.as_deref(), Some("<div>h</div>"));
        assert_eq!(params.footer_template.as_deref(), Some(""));
        assert!(params.displays_header_footer());
    }

    #[test]
    fn test_empty_page_ranges_mean_all_pages() {
        for ranges in ["", "   "] {
            let options = RenderOptions {
                page_ranges: Some(ranges.to_string()),
                ..Default::default()
            };
            assert!(compile(&options).unwrap().page_ranges.is_none());
        }

        let options = RenderOptions {
            page_ranges: Some("1-3, 5".to_string()),
            ..Default::default()
        };
        assert_eq!(compile(&options).unwrap().page_ranges.as_deref(), Some("1-3, 5"));
    }

    #[test]
    fn test_flags_pass_through() {
        let options = RenderOptionsBuilder::new()
            .landscape(true)
            .print_background(false)
            .prefer_css_page_size(true)
            .scale(1.5)
            .build()
            .unwrap();
        let params = compile(&options).unwrap();
        assert!(params.landscape);
        assert!(!params.print_background);
        assert!(params.prefer_css_page_size);
        assert_eq!(params.scale, 1.5);
    }

    #[test]
    fn test_compile_rejects_invalid_options() {
        let options = RenderOptions {
            scale: -1.0,
            ..Default::default()
        };
        assert!(matches!(compile(&options), Err(RenderError::InvalidOptions(_))));

        let options = RenderOptions {
            width: Some("wide".to_string()),
            height: Some("11in".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            compile(&options),
            Err(RenderError::MalformedDimension(_))
        ));
    }
}
