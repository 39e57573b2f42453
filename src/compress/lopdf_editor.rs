//! [`DocumentEditor`] on top of `lopdf`.

use std::collections::HashSet;
use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, SaveOptions};

use super::{DocumentEditor, ImageOutcome, ObjectRef, PageRef, PdfBackend, WriteOptions};
use crate::error::{CompressionError, EditError};

/// Opens documents with `lopdf`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfBackend;

impl PdfBackend for LopdfBackend {
    fn open(&self, pdf: &[u8]) -> Result<Box<dyn DocumentEditor>, CompressionError> {
        let doc = Document::load_mem(pdf)
            .map_err(|e| CompressionError::Unparseable(e.to_string()))?;
        Ok(Box::new(LopdfEditor::new(doc)))
    }
}

/// An open `lopdf` document.
pub struct LopdfEditor {
    doc: Document,
}

impl LopdfEditor {
    pub fn new(doc: Document) -> Self {
        Self { doc }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    fn resolve<'a>(&'a self, object: &'a Object) -> Option<&'a Object> {
        match object {
            Object::Reference(id) => self.doc.get_object(*id).ok(),
            other => Some(other),
        }
    }

    /// The page's resource dictionary, inherited through `Parent` if the
    /// page has none of its own.
    fn page_resources(&self, page_id: ObjectId) -> Option<&Dictionary> {
        let mut current = self.doc.get_dictionary(page_id).ok()?;
        let mut visited = HashSet::from([page_id]);

        loop {
            if let Ok(resources) = current.get(b"Resources") {
                return self.resolve(resources).and_then(|r| r.as_dict().ok());
            }
            let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
            if !visited.insert(parent) {
                return None;
            }
            current = self.doc.get_dictionary(parent).ok()?;
        }
    }

    fn xobject_refs(&self, resources: &Dictionary) -> Vec<ObjectId> {
        let Some(xobjects) = resources
            .get(b"XObject")
            .ok()
            .and_then(|x| self.resolve(x))
            .and_then(|x| x.as_dict().ok())
        else {
            return Vec::new();
        };

        xobjects
            .iter()
            .filter_map(|(_, value)| value.as_reference().ok())
            .collect()
    }

    /// Collect images reachable from `id`, descending into form XObjects.
    fn collect_images(&self, id: ObjectId, images: &mut Vec<ObjectId>, seen: &mut HashSet<ObjectId>) {
        if !seen.insert(id) {
            return;
        }
        let Ok(stream) = self.doc.get_object(id).and_then(Object::as_stream) else {
            return;
        };

        match name_of(&stream.dict, b"Subtype").as_deref() {
            Some("Image") => images.push(id),
            Some("Form") => {
                let resources = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|r| self.resolve(r))
                    .and_then(|r| r.as_dict().ok());
                if let Some(resources) = resources {
                    for child in self.xobject_refs(resources) {
                        self.collect_images(child, images, seen);
                    }
                }
            }
            _ => {}
        }
    }

    /// Number of colour components for an image's colour space, if it is
    /// one we can rebuild pixels for.
    fn components(&self, dict: &Dictionary) -> Result<u8, EditError> {
        let color_space = dict
            .get(b"ColorSpace")
            .ok()
            .and_then(|cs| self.resolve(cs))
            .ok_or("image has no colour space")?;

        match color_space {
            Object::Name(name) => match name.as_slice() {
                b"DeviceRGB" => Ok(3),
                b"DeviceGray" => Ok(1),
                other => Err(format!(
                    "unsupported colour space {}",
                    String::from_utf8_lossy(other)
                )
                .into()),
            },
            Object::Array(parts) if parts.first().and_then(|p| p.as_name().ok()) == Some(b"ICCBased".as_slice()) => {
                let profile = parts
                    .get(1)
                    .and_then(|p| self.resolve(p))
                    .and_then(|p| p.as_stream().ok())
                    .ok_or("ICCBased colour space without profile")?;
                match profile.dict.get(b"N").and_then(Object::as_i64) {
                    Ok(3) => Ok(3),
                    Ok(1) => Ok(1),
                    _ => Err("unsupported ICC profile component count".into()),
                }
            }
            _ => Err("unsupported colour space".into()),
        }
    }
}

/// The name stored under `key`, if any.
fn name_of(dict: &Dictionary, key: &[u8]) -> Option<String> {
    dict.get(key)
        .ok()
        .and_then(|n| n.as_name().ok())
        .map(|n| String::from_utf8_lossy(n).into_owned())
}

/// The stream's filter names; a single name or an array of names.
fn filters(dict: &Dictionary) -> Vec<String> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![String::from_utf8_lossy(name).into_owned()],
        Ok(Object::Array(names)) => names
            .iter()
            .filter_map(|n| n.as_name().ok())
            .map(|n| String::from_utf8_lossy(n).into_owned())
            .collect(),
        _ => Vec::new(),
    }
}

fn deflate(data: &[u8], level: u32) -> Result<Vec<u8>, EditError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder
        .write_all(data)
        .map_err(|e| EditError(format!("deflate failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| EditError(format!("deflate failed: {}", e)))
}

/// Rebuild an 8-bit image from raw samples.
fn from_pixels(
    raw: Vec<u8>,
    width: u32,
    height: u32,
    bits: i64,
    components: u8,
) -> Result<DynamicImage, EditError> {
    if bits != 8 {
        return Err(format!("unsupported bit depth {}", bits).into());
    }
    let expected = width as usize * height as usize * components as usize;
    if raw.len() < expected {
        return Err(format!("expected {} bytes of pixels, found {}", expected, raw.len()).into());
    }

    let mut raw = raw;
    raw.truncate(expected);
    let image = match components {
        3 => RgbImage::from_raw(width, height, raw).map(DynamicImage::ImageRgb8),
        _ => GrayImage::from_raw(width, height, raw).map(DynamicImage::ImageLuma8),
    };
    image.ok_or_else(|| "pixel buffer does not match dimensions".into())
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, EditError> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(image)
        .map_err(|e| EditError(format!("JPEG encode failed: {}", e)))?;
    Ok(buffer)
}

impl DocumentEditor for LopdfEditor {
    fn read_pages(&self) -> Vec<PageRef> {
        self.doc
            .get_pages()
            .into_iter()
            .map(|(number, page_id)| {
                let mut images = Vec::new();
                let mut seen = HashSet::new();
                if let Some(resources) = self.page_resources(page_id) {
                    for xobject in self.xobject_refs(resources) {
                        self.collect_images(xobject, &mut images, &mut seen);
                    }
                }

                PageRef {
                    number,
                    images,
                    content_streams: self.doc.get_page_contents(page_id),
                }
            })
            .collect()
    }

    fn recompress_image(&mut self, id: ObjectRef, quality: u8) -> Result<ImageOutcome, EditError> {
        let stream = self.doc.get_object(id)?.as_stream()?;
        let dict = &stream.dict;

        if dict.get(b"ImageMask").and_then(Object::as_bool).unwrap_or(false) {
            return Err("stencil masks are not re-encoded".into());
        }

        let width = u32::try_from(dict.get(b"Width")?.as_i64()?)
            .map_err(|_| EditError::from("invalid image width"))?;
        let height = u32::try_from(dict.get(b"Height")?.as_i64()?)
            .map_err(|_| EditError::from("invalid image height"))?;
        let bits = dict.get(b"BitsPerComponent").and_then(Object::as_i64).unwrap_or(8);
        let components = self.components(dict)?;

        let before = stream.content.len();
        let chain = filters(dict);
        let decoded = match chain.as_slice() {
            [filter] if filter == "DCTDecode" => {
                image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)
                    .map_err(|e| EditError(format!("JPEG decode failed: {}", e)))?
            }
            [] => from_pixels(stream.content.clone(), width, height, bits, components)?,
            [filter] if filter == "FlateDecode" => {
                from_pixels(stream.decompressed_content()?, width, height, bits, components)?
            }
            other => return Err(format!("unsupported filter chain {:?}", other).into()),
        };

        let decoded = match components {
            3 => DynamicImage::ImageRgb8(decoded.to_rgb8()),
            _ => DynamicImage::ImageLuma8(decoded.to_luma8()),
        };
        let encoded = encode_jpeg(&decoded, quality)?;
        if encoded.len() >= before {
            return Ok(ImageOutcome::Kept);
        }

        let after = encoded.len();
        let stream = self.doc.get_object_mut(id)?.as_stream_mut()?;
        stream.dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
        stream.dict.set("BitsPerComponent", 8);
        stream.dict.remove(b"DecodeParms");
        stream.set_content(encoded);
        stream.allows_compression = false;

        Ok(ImageOutcome::Replaced { before, after })
    }

    fn recompress_stream(&mut self, id: ObjectRef, level: u32) -> Result<bool, EditError> {
        let stream = self.doc.get_object_mut(id)?.as_stream_mut()?;

        let raw = match filters(&stream.dict).as_slice() {
            [] => stream.content.clone(),
            [filter] if filter == "FlateDecode" => stream.decompressed_content()?,
            other => return Err(format!("unsupported filter chain {:?}", other).into()),
        };

        let compressed = deflate(&raw, level)?;
        if compressed.len() >= stream.content.len() {
            return Ok(false);
        }

        stream.dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
        stream.dict.remove(b"DecodeParms");
        stream.set_content(compressed);
        Ok(true)
    }

    fn remove_unreferenced(&mut self) -> Result<usize, EditError> {
        if self.doc.trailer.get(b"Root").is_err() {
            return Err("document has no root; refusing to prune".into());
        }
        let pruned = self.doc.prune_objects().len();
        let empty = self.doc.delete_zero_length_streams().len();
        self.doc.renumber_objects();
        Ok(pruned + empty)
    }

    fn write(&mut self, options: WriteOptions) -> Result<Vec<u8>, CompressionError> {
        if options.compress_streams {
            self.doc.compress();
        }

        let mut buffer = Vec::new();
        let saved = if options.object_streams {
            // Compressed objects need an xref stream to be addressable. The
            // writer rewrites the trailer, so it works on a copy and a
            // failed attempt leaves the document intact for a plain write.
            let save_options = SaveOptions::builder()
                .use_object_streams(true)
                .use_xref_streams(true)
                .compression_level(9)
                .build();
            self.doc
                .clone()
                .save_with_options(&mut buffer, save_options)
        } else {
            self.doc.save_to(&mut buffer)
        };

        saved.map_err(|e| CompressionError::Serialize(e.to_string()))?;
        Ok(buffer)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::{CompressionEngine, CompressionLevel};
    use lopdf::{Stream, dictionary};

    const SIDE: u32 = 64;

    /// Smooth gradient, compresses well as JPEG.
    fn gradient_rgb() -> Vec<u8> {
        let mut pixels = Vec::with_capacity((SIDE * SIDE * 3) as usize);
        for y in 0..SIDE {
            for x in 0..SIDE {
                pixels.extend_from_slice(&[(x * 4) as u8, (y * 4) as u8, 128]);
            }
        }
        pixels
    }

    fn page_content() -> Vec<u8> {
        b"q 200 0 0 200 72 500 cm /Im1 Do Q\n"
            .iter()
            .copied()
            .cycle()
            .take(4096)
            .collect()
    }

    struct Fixture {
        bytes: Vec<u8>,
        image_id: ObjectId,
        tiny_id: ObjectId,
    }

    /// Two pages sharing one raw RGB image through inherited resources; the
    /// second page also draws a 1x1 grey image through a form XObject. One
    /// orphan object is left in the table.
    fn fixture() -> Fixture {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => SIDE as i64,
                "Height" => SIDE as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            gradient_rgb(),
        ));
        let tiny_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![200],
        ));
        let form_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![0.into(), 0.into(), 1.into(), 1.into()],
                "Resources" => dictionary! {
                    "XObject" => dictionary! { "Tiny" => tiny_id },
                },
            },
            b"/Tiny Do".to_vec(),
        ));

        let content1 = doc.add_object(Stream::new(dictionary! {}, page_content()));
        let content2 = doc.add_object(Stream::new(dictionary! {}, b"/Im1 Do /Fm1 Do".to_vec()));
        let page1 = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content1,
        });
        let page2 = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content2,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im1" => image_id, "Fm1" => form_id },
            },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page1.into(), page2.into()],
                "Count" => 2,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => dictionary! {
                    "XObject" => dictionary! { "Im1" => image_id },
                },
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.add_object(Stream::new(dictionary! {}, b"orphan".to_vec()));

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        Fixture {
            bytes,
            image_id,
            tiny_id,
        }
    }

    fn open(bytes: &[u8]) -> LopdfEditor {
        LopdfEditor::new(Document::load_mem(bytes).unwrap())
    }

    #[test]
    fn test_read_pages_finds_inherited_and_nested_images() {
        let fixture = fixture();
        let pages = open(&fixture.bytes).read_pages();

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 1);
        assert_eq!(pages[0].images, vec![fixture.image_id]);
        assert_eq!(pages[0].content_streams.len(), 1);
        assert!(pages[1].images.contains(&fixture.image_id));
        assert!(pages[1].images.contains(&fixture.tiny_id));
    }

    #[test]
    fn test_raw_image_becomes_jpeg() {
        let fixture = fixture();
        let mut editor = open(&fixture.bytes);

        let outcome = editor.recompress_image(fixture.image_id, 50).unwrap();
        let ImageOutcome::Replaced { before, after } = outcome else {
            panic!("expected replacement, got {outcome:?}");
        };
        assert_eq!(before, (SIDE * SIDE * 3) as usize);
        assert!(after < before);

        let stream = editor
            .document()
            .get_object(fixture.image_id)
            .unwrap()
            .as_stream()
            .unwrap();
        assert_eq!(name_of(&stream.dict, b"Filter").as_deref(), Some("DCTDecode"));
        let decoded = image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (SIDE, SIDE));
    }

    /// A 1-pixel image only grows as JPEG, so it is left alone.
    #[test]
    fn test_tiny_image_is_kept() {
        let fixture = fixture();
        let mut editor = open(&fixture.bytes);

        assert_eq!(
            editor.recompress_image(fixture.tiny_id, 90).unwrap(),
            ImageOutcome::Kept
        );
        let stream = editor
            .document()
            .get_object(fixture.tiny_id)
            .unwrap()
            .as_stream()
            .unwrap();
        assert_eq!(stream.content, vec![200]);
    }

    #[test]
    fn test_unsupported_colour_space_is_an_edit_error() {
        let mut doc = Document::with_version("1.5");
        let id = doc.add_object(Stream::new(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 2,
                "Height" => 2,
                "ColorSpace" => "DeviceCMYK",
                "BitsPerComponent" => 8,
            },
            vec![0; 16],
        ));
        let mut editor = LopdfEditor::new(doc);

        let err = editor.recompress_image(id, 50).unwrap_err();
        assert!(err.0.contains("DeviceCMYK"));
    }

    #[test]
    fn test_content_stream_is_deflated() {
        let fixture = fixture();
        let mut editor = open(&fixture.bytes);
        let stream_id = editor.read_pages()[0].content_streams[0];

        assert!(editor.recompress_stream(stream_id, 9).unwrap());

        let stream = editor.document().get_object(stream_id).unwrap().as_stream().unwrap();
        assert_eq!(name_of(&stream.dict, b"Filter").as_deref(), Some("FlateDecode"));
        assert!(stream.content.len() < 4096);
        assert_eq!(stream.decompressed_content().unwrap(), page_content());

        // Already deflated at the top level: re-deflating gains nothing.
        assert!(!editor.recompress_stream(stream_id, 9).unwrap());
    }

    #[test]
    fn test_remove_unreferenced_drops_orphans() {
        let fixture = fixture();
        let mut editor = open(&fixture.bytes);
        let before = editor.document().objects.len();

        let removed = editor.remove_unreferenced().unwrap();

        assert!(removed >= 1);
        assert_eq!(editor.document().objects.len(), before - removed);
        assert_eq!(editor.read_pages().len(), 2);
    }

    #[test]
    fn test_engine_round_trip_all_levels() {
        let fixture = fixture();
        let engine = CompressionEngine::lopdf();

        for level in 1..=9 {
            let level = CompressionLevel::new(level).unwrap();
            let (output, report) = engine.compress_with_report(&fixture.bytes, level).unwrap();

            let doc = Document::load_mem(&output).unwrap();
            assert_eq!(doc.get_pages().len(), 2, "level {level}");
            assert!(output.len() < fixture.bytes.len(), "level {level}");
            assert_eq!(report.images_recompressed, 1, "level {level}");
            assert_eq!(report.images_kept, 1, "level {level}");
            assert_eq!(report.images_failed, 0, "level {level}");
            assert_eq!(report.objects_removed > 0, level.optimizes_document(), "level {level}");
        }
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_object_streams_written_when_requested() {
        let fixture = fixture();

        let plain = open(&fixture.bytes).write(WriteOptions::default()).unwrap();
        assert!(!contains(&plain, b"/ObjStm"));

        let mut editor = open(&fixture.bytes);
        let packed = editor.write(WriteOptions::optimized()).unwrap();
        assert!(contains(&packed, b"/Type/ObjStm"));
        assert!(contains(&packed, b"/Type/XRef"));
        assert_eq!(Document::load_mem(&packed).unwrap().get_pages().len(), 2);

        // The packed write leaves the document fit for a plain one.
        let fallback = editor.write(WriteOptions::default()).unwrap();
        assert!(!contains(&fallback, b"/XRef"));
        assert_eq!(Document::load_mem(&fallback).unwrap().get_pages().len(), 2);
    }

    #[test]
    fn test_engine_packs_objects_only_when_optimizing() {
        let fixture = fixture();
        let engine = CompressionEngine::lopdf();

        let light = engine.compress(&fixture.bytes, CompressionLevel::new(3).unwrap()).unwrap();
        let heavy = engine.compress(&fixture.bytes, CompressionLevel::MAX).unwrap();

        assert!(!contains(&light, b"/ObjStm"));
        assert!(contains(&heavy, b"/ObjStm"));
    }

    #[test]
    fn test_engine_rejects_garbage() {
        let result = CompressionEngine::lopdf().compress(b"hello", CompressionLevel::default());
        assert!(matches!(result, Err(CompressionError::Unparseable(_))));
    }
}
