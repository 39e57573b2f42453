//! PDF compression engine.
//!
//! [`CompressionEngine::compress`] maps a [`CompressionLevel`] (0-9) to an
//! image quality and a stream deflate level, then rewrites the document's
//! images and page content streams through a [`DocumentEditor`].
//!
//! # Level mapping
//!
//! | Level | Image quality | Stream deflate | Whole-document pass |
//! |-------|---------------|----------------|---------------------|
//! | 0 | (identity, input returned unchanged) | | |
//! | 1 | 90 | 1 | no |
//! | 5 | 50 | 5 | no |
//! | 7 | 30 | 7 | yes |
//! | 8, 9 | 20 | 8, 9 | yes |
//!
//! # Failure policy
//!
//! Only an unreadable input (or an unwritable result) fails the call. A
//! single image, a single stream or the whole-document pass failing is
//! logged, counted in the [`CompressionReport`], and the remaining work
//! still goes ahead.
//!
//! # Example
//!
//! ```rust,ignore
//! use html2pdf_render::compress::{CompressionEngine, CompressionLevel};
//!
//! let engine = CompressionEngine::lopdf();
//! let smaller = engine.compress(&pdf_bytes, CompressionLevel::new(7)?)?;
//! ```

mod lopdf_editor;

pub use lopdf_editor::{LopdfBackend, LopdfEditor};

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CompressionError, EditError};

/// Object identifier inside a document: object number and generation.
pub type ObjectRef = (u32, u16);

// ============================================================================
// Level
// ============================================================================

/// Lowest image quality any level maps to.
pub const MIN_IMAGE_QUALITY: u8 = 20;

/// Levels at or above this run the whole-document optimization pass.
pub const OPTIMIZE_THRESHOLD: u8 = 7;

/// Compression level in `0..=9`.
///
/// ```rust
/// use html2pdf_render::compress::CompressionLevel;
///
/// let level = CompressionLevel::new(7).unwrap();
/// assert_eq!(level.image_quality(), 30);
/// assert!(level.optimizes_document());
/// assert!(CompressionLevel::new(10).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    /// Identity: the input is returned untouched.
    pub const NONE: CompressionLevel = CompressionLevel(0);

    pub const MAX: CompressionLevel = CompressionLevel(9);

    pub fn new(level: u8) -> Result<Self, CompressionError> {
        if level > Self::MAX.0 {
            return Err(CompressionError::InvalidLevel(level));
        }
        Ok(Self(level))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_identity(self) -> bool {
        self.0 == 0
    }

    /// See [`image_quality`].
    pub fn image_quality(self) -> u8 {
        image_quality(self.0)
    }

    /// Deflate level for content streams.
    pub fn stream_level(self) -> u32 {
        u32::from(self.0)
    }

    /// Whether the whole-document pass runs.
    pub fn optimizes_document(self) -> bool {
        self.0 >= OPTIMIZE_THRESHOLD
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self(5)
    }
}

impl TryFrom<u8> for CompressionLevel {
    type Error = CompressionError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Self::new(level)
    }
}

impl From<CompressionLevel> for u8 {
    fn from(level: CompressionLevel) -> u8 {
        level.0
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// JPEG quality for `level`: `max(20, 100 - 10 * level)`.
pub fn image_quality(level: u8) -> u8 {
    100u8
        .saturating_sub(level.saturating_mul(10))
        .max(MIN_IMAGE_QUALITY)
}

// ============================================================================
// Editor Abstraction
// ============================================================================

/// The objects of one page the engine rewrites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRef {
    /// 1-based page number.
    pub number: u32,
    /// Raster images drawn on the page, directly or through form XObjects.
    pub images: Vec<ObjectRef>,
    /// The page's content streams.
    pub content_streams: Vec<ObjectRef>,
}

/// Result of re-encoding one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    /// The image was replaced by a smaller encoding.
    Replaced { before: usize, after: usize },
    /// Re-encoding would not have made the image smaller.
    Kept,
}

/// Writer flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Deflate every stream that is not yet filtered.
    pub compress_streams: bool,
    /// Pack objects into object streams where the writer supports it.
    pub object_streams: bool,
}

impl WriteOptions {
    /// Flags forced by the whole-document pass.
    pub fn optimized() -> Self {
        Self {
            compress_streams: true,
            object_streams: true,
        }
    }
}

/// Opens PDF bytes for editing.
pub trait PdfBackend: Send + Sync {
    /// # Errors
    ///
    /// [`CompressionError::Unparseable`] if `pdf` is not a readable PDF.
    fn open(&self, pdf: &[u8]) -> Result<Box<dyn DocumentEditor>, CompressionError>;
}

/// Structural edits on one open document.
pub trait DocumentEditor {
    fn read_pages(&self) -> Vec<PageRef>;

    fn recompress_image(&mut self, image: ObjectRef, quality: u8) -> Result<ImageOutcome, EditError>;

    /// Re-deflate a content stream at `level`. Returns whether the stream
    /// was replaced; a result that is not smaller is discarded.
    fn recompress_stream(&mut self, stream: ObjectRef, level: u32) -> Result<bool, EditError>;

    /// Drop objects no longer reachable from the document root. Returns how
    /// many were removed.
    fn remove_unreferenced(&mut self) -> Result<usize, EditError>;

    fn write(&mut self, options: WriteOptions) -> Result<Vec<u8>, CompressionError>;
}

// ============================================================================
// Report
// ============================================================================

/// What one compression run did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionReport {
    pub level: u8,
    pub original_size: usize,
    pub compressed_size: usize,
    pub pages: usize,
    pub images_recompressed: usize,
    pub images_kept: usize,
    pub images_failed: usize,
    pub streams_recompressed: usize,
    pub streams_kept: usize,
    pub streams_failed: usize,
    pub objects_removed: usize,
    /// The whole-document pass ran and failed.
    pub optimization_failed: bool,
}

impl CompressionReport {
    /// Size reduction in percent. Negative if the output grew.
    pub fn reduction_percent(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        (1.0 - self.compressed_size as f64 / self.original_size as f64) * 100.0
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Applies a compression level to PDF documents.
///
/// Stateless between calls; share freely across threads.
#[derive(Clone)]
pub struct CompressionEngine {
    backend: Arc<dyn PdfBackend>,
}

impl CompressionEngine {
    pub fn new(backend: Arc<dyn PdfBackend>) -> Self {
        Self { backend }
    }

    /// Engine backed by `lopdf`.
    pub fn lopdf() -> Self {
        Self::new(Arc::new(LopdfBackend))
    }

    /// Compress `pdf` at `level`.
    ///
    /// # Errors
    ///
    /// See [`compress_with_report`](Self::compress_with_report).
    pub fn compress(&self, pdf: &[u8], level: CompressionLevel) -> Result<Vec<u8>, CompressionError> {
        self.compress_with_report(pdf, level).map(|(bytes, _)| bytes)
    }

    /// Compress `pdf` at `level` and report what was done.
    ///
    /// Level 0 returns a copy of the input without parsing it.
    ///
    /// # Errors
    ///
    /// - [`CompressionError::Unparseable`] if the input cannot be read.
    /// - [`CompressionError::Serialize`] if no output could be written.
    pub fn compress_with_report(
        &self,
        pdf: &[u8],
        level: CompressionLevel,
    ) -> Result<(Vec<u8>, CompressionReport), CompressionError> {
        let mut report = CompressionReport {
            level: level.value(),
            original_size: pdf.len(),
            ..Default::default()
        };

        if level.is_identity() {
            log::debug!("Compression level 0, returning input unchanged");
            report.compressed_size = pdf.len();
            return Ok((pdf.to_vec(), report));
        }

        let mut editor = self.backend.open(pdf).map_err(|e| {
            log::error!("❌ Cannot open PDF for compression: {}", e);
            e
        })?;

        let pages = editor.read_pages();
        report.pages = pages.len();
        log::debug!(
            "Compressing {} pages at level {} (image quality {})",
            pages.len(),
            level,
            level.image_quality()
        );

        recompress_images(editor.as_mut(), &pages, level.image_quality(), &mut report);
        recompress_streams(editor.as_mut(), &pages, level.stream_level(), &mut report);

        let output = if level.optimizes_document() {
            optimize_and_write(editor.as_mut(), &mut report)?
        } else {
            editor.write(WriteOptions::default())?
        };

        report.compressed_size = output.len();
        log::info!(
            "Compressed PDF from {} to {} bytes ({:.1}% reduction) at level {}",
            report.original_size,
            report.compressed_size,
            report.reduction_percent(),
            level
        );

        Ok((output, report))
    }
}

impl fmt::Debug for CompressionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressionEngine").finish_non_exhaustive()
    }
}

impl Default for CompressionEngine {
    fn default() -> Self {
        Self::lopdf()
    }
}

/// Images shared between pages are re-encoded once.
fn recompress_images(
    editor: &mut dyn DocumentEditor,
    pages: &[PageRef],
    quality: u8,
    report: &mut CompressionReport,
) {
    let mut seen = HashSet::new();

    for page in pages {
        for &image in &page.images {
            if !seen.insert(image) {
                continue;
            }
            match editor.recompress_image(image, quality) {
                Ok(ImageOutcome::Replaced { before, after }) => {
                    log::trace!("Image {:?}: {} -> {} bytes", image, before, after);
                    report.images_recompressed += 1;
                }
                Ok(ImageOutcome::Kept) => report.images_kept += 1,
                Err(e) => {
                    log::warn!(
                        "Leaving image {:?} on page {} unchanged: {}",
                        image,
                        page.number,
                        e
                    );
                    report.images_failed += 1;
                }
            }
        }
    }
}

fn recompress_streams(
    editor: &mut dyn DocumentEditor,
    pages: &[PageRef],
    level: u32,
    report: &mut CompressionReport,
) {
    let mut seen = HashSet::new();

    for page in pages {
        for &stream in &page.content_streams {
            if !seen.insert(stream) {
                continue;
            }
            match editor.recompress_stream(stream, level) {
                Ok(true) => report.streams_recompressed += 1,
                Ok(false) => report.streams_kept += 1,
                Err(e) => {
                    log::warn!(
                        "Leaving content stream {:?} on page {} unchanged: {}",
                        stream,
                        page.number,
                        e
                    );
                    report.streams_failed += 1;
                }
            }
        }
    }
}

/// Whole-document pass. If it fails, the document is written with default
/// flags so the per-page work is still returned.
fn optimize_and_write(
    editor: &mut dyn DocumentEditor,
    report: &mut CompressionReport,
) -> Result<Vec<u8>, CompressionError> {
    match editor.remove_unreferenced() {
        Ok(removed) => {
            log::debug!("Removed {} unreferenced objects", removed);
            report.objects_removed = removed;
        }
        Err(e) => {
            log::warn!("Whole-document optimization failed, continuing: {}", e);
            report.optimization_failed = true;
            return editor.write(WriteOptions::default());
        }
    }

    match editor.write(WriteOptions::optimized()) {
        Ok(bytes) => Ok(bytes),
        Err(e) => {
            log::warn!("Optimized write failed, retrying with default flags: {}", e);
            report.optimization_failed = true;
            editor.write(WriteOptions::default())
        }
    }
}

/// Compress `pdf` at `level` with the `lopdf` backend.
///
/// # Errors
///
/// [`CompressionError::InvalidLevel`] for a level above 9, otherwise as
/// [`CompressionEngine::compress_with_report`].
pub fn compress_pdf(pdf: &[u8], level: u8) -> Result<Vec<u8>, CompressionError> {
    CompressionEngine::lopdf().compress(pdf, CompressionLevel::new(level)?)
}

// ============================================================================
// Unit Tests
// ============================================================================
