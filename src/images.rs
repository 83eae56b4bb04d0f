//! Embedded image extraction.
//!
//! Walks every page's image XObjects in resource order, decodes them with
//! the `image` crate, and re-encodes each one as PNG so the inference client
//! only ever sees one format. Images that cannot be decoded are skipped.

use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::extract::ExtractError;
use crate::models::{document_name, ImageContent, ImageFormat, ImageUnit};

/// Returns the embedded raster images of a document in page order.
///
/// A document that opens but has no decodable images yields an empty list.
/// A document that cannot be opened at all is an error.
pub trait ImageExtractor: Send + Sync {
    fn extract_images(&self, path: &Path) -> Result<Vec<ImageUnit>, ExtractError>;
}

/// lopdf-backed extractor.
#[derive(Default)]
pub struct PdfImageExtractor;

impl PdfImageExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl ImageExtractor for PdfImageExtractor {
    fn extract_images(&self, path: &Path) -> Result<Vec<ImageUnit>, ExtractError> {
        let name = document_name(path).unwrap_or_default();
        let doc = Document::load(path).map_err(|e| {
            error!(path = %path.display(), error = %e, "failed to open PDF");
            ExtractError::Pdf(e.to_string())
        })?;
        info!(path = %path.display(), pages = doc.get_pages().len(), "opened PDF");

        let mut units = Vec::new();
        for (page_number, page_id) in doc.get_pages() {
            let xobjects = page_image_xobjects(&doc, page_id);
            if !xobjects.is_empty() {
                info!(page = page_number, images = xobjects.len(), "images found");
            }
            for (index, (xobject_name, image_id)) in xobjects.into_iter().enumerate() {
                let image_index = index as u32 + 1;
                match decode_image_xobject(&doc, image_id).and_then(|img| encode_png(&img)) {
                    Ok(bytes) => {
                        debug!(
                            page = page_number,
                            image = image_index,
                            bytes = bytes.len(),
                            format = ImageFormat::Png.as_str(),
                            "extracted image"
                        );
                        units.push(ImageUnit {
                            document: name.clone(),
                            page_number,
                            image_index,
                            content: ImageContent::Encoded {
                                bytes,
                                format: ImageFormat::Png,
                            },
                        });
                    }
                    Err(e) => {
                        warn!(
                            page = page_number,
                            image = image_index,
                            xobject = %xobject_name,
                            error = %e,
                            "failed to extract image"
                        );
                    }
                }
            }
        }
        info!(path = %path.display(), total = units.len(), "image extraction finished");
        Ok(units)
    }
}

/// Follows references until a direct object is reached.
fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    doc.dereference(object).ok().map(|(_, obj)| obj)
}

/// Resources of a page, inherited from the nearest ancestor when absent.
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    // Bound the walk so a cyclic /Parent chain cannot loop forever.
    for _ in 0..64 {
        if let Ok(resources) = current.get(b"Resources") {
            return resolve(doc, resources)?.as_dict().ok();
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// `(resource name, object id)` of each image XObject on a page, in listing order.
fn page_image_xobjects(doc: &Document, page_id: ObjectId) -> Vec<(String, ObjectId)> {
    let Some(resources) = page_resources(doc, page_id) else {
        return Vec::new();
    };
    let Some(xobjects) = resources
        .get(b"XObject")
        .ok()
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_dict().ok())
    else {
        return Vec::new();
    };

    let mut images = Vec::new();
    for (name, value) in xobjects.iter() {
        let Ok(id) = value.as_reference() else {
            continue;
        };
        let is_image = doc
            .get_object(id)
            .and_then(Object::as_stream)
            .ok()
            .and_then(|stream| stream.dict.get(b"Subtype").ok())
            .and_then(|subtype| subtype.as_name().ok())
            .map(|subtype| subtype == b"Image")
            .unwrap_or(false);
        if is_image {
            images.push((String::from_utf8_lossy(name).to_string(), id));
        }
    }
    images
}

fn stream_filters(dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_name().ok().map(|n| n.to_vec()))
            .collect(),
        _ => Vec::new(),
    }
}

fn dict_i64(dict: &Dictionary, key: &[u8]) -> Option<i64> {
    dict.get(key).ok().and_then(|v| v.as_i64().ok())
}

/// Number of colour components for the colour spaces handled as raw samples.
fn color_components(doc: &Document, color_space: &Object) -> Result<u32, String> {
    let color_space = resolve(doc, color_space).ok_or("unresolvable ColorSpace")?;
    match color_space {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" => Ok(1),
            b"DeviceRGB" | b"CalRGB" => Ok(3),
            b"DeviceCMYK" => Ok(4),
            other => Err(format!(
                "unsupported colour space {}",
                String::from_utf8_lossy(other)
            )),
        },
        Object::Array(items) => {
            let family = items
                .first()
                .and_then(|f| f.as_name().ok())
                .ok_or("empty colour space array")?;
            if family == b"ICCBased" {
                let profile = items
                    .get(1)
                    .and_then(|p| resolve(doc, p))
                    .and_then(|p| p.as_stream().ok())
                    .ok_or("ICCBased without profile stream")?;
                let n = dict_i64(&profile.dict, b"N").ok_or("ICC profile without /N")?;
                Ok(n as u32)
            } else {
                Err(format!(
                    "unsupported colour space {}",
                    String::from_utf8_lossy(family)
                ))
            }
        }
        _ => Err("malformed colour space".to_string()),
    }
}

fn decode_image_xobject(doc: &Document, id: ObjectId) -> Result<DynamicImage, String> {
    let stream = doc
        .get_object(id)
        .and_then(Object::as_stream)
        .map_err(|e| e.to_string())?;
    let dict = &stream.dict;
    let filters = stream_filters(dict);

    match filters.iter().map(Vec::as_slice).collect::<Vec<_>>().as_slice() {
        [b"DCTDecode"] => {
            return image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg)
                .map_err(|e| e.to_string());
        }
        [] | [b"FlateDecode"] => {}
        other => {
            let names: Vec<String> = other
                .iter()
                .map(|n| String::from_utf8_lossy(n).to_string())
                .collect();
            return Err(format!("unsupported filter chain {:?}", names));
        }
    }

    let width = dict_i64(dict, b"Width").ok_or("missing /Width")?;
    let height = dict_i64(dict, b"Height").ok_or("missing /Height")?;
    if width <= 0 || height <= 0 {
        return Err(format!("invalid dimensions {}x{}", width, height));
    }
    let (width, height) = match (u32::try_from(width), u32::try_from(height)) {
        (Ok(w), Ok(h)) => (w, h),
        _ => return Err("image too large".to_string()),
    };

    let bits = dict_i64(dict, b"BitsPerComponent").unwrap_or(8);
    if bits != 8 {
        return Err(format!("unsupported BitsPerComponent {}", bits));
    }
    let color_space = dict.get(b"ColorSpace").map_err(|_| "missing /ColorSpace")?;
    let components = color_components(doc, color_space)?;

    let samples = if filters.is_empty() {
        stream.content.clone()
    } else {
        stream.decompressed_content().map_err(|e| e.to_string())?
    };
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(components as usize))
        .ok_or("image too large")?;
    if samples.len() < expected {
        return Err(format!(
            "sample data too short: {} bytes, expected {}",
            samples.len(),
            expected
        ));
    }
    let samples = &samples[..expected];

    let too_large = || "sample buffer does not match dimensions".to_string();
    match components {
        1 => GrayImage::from_raw(width, height, samples.to_vec())
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(too_large),
        3 => RgbImage::from_raw(width, height, samples.to_vec())
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(too_large),
        4 => RgbImage::from_raw(width, height, cmyk_to_rgb(samples))
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(too_large),
        n => Err(format!("unsupported component count {}", n)),
    }
}

fn cmyk_to_rgb(samples: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(samples.len() / 4 * 3);
    for px in samples.chunks_exact(4) {
        let k = 255 - px[3] as u32;
        for &c in &px[..3] {
            rgb.push(((255 - c as u32) * k / 255) as u8);
        }
    }
    rgb
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, String> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| e.to_string())?;
    Ok(buf)
}
