//! Page source: open a PDF with lopdf and yield its pages one at a time.
//!
//! [`PdfSource`] is a lazy, non-restartable iterator. Each [`Page`] carries
//! the page's raw text, its size, the drawables found by the content-stream
//! walk, and its URI link annotations. Nothing is cached between pages; an
//! exhausted source must be reopened to read the document again.
//!
//! The source also materialises embedded bitmaps on demand
//! ([`BitmapDecoder`]) so the image stage never holds more than the current
//! page's pixels.

use crate::error::{ExtractError, StageWarning};
use crate::geometry::Rect;
use crate::output::DocumentMetadata;
use crate::pipeline::drawables::{collect_drawables, PageSpace};
use crate::pipeline::encode::{encode_png, ImageFormatTag};
use image::{DynamicImage, GrayImage, ImageBuffer, Rgb, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, trace};

/// US Letter, used when a page has no usable MediaBox.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

// ── Page model ───────────────────────────────────────────────────────────

/// An image XObject placement on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitmapRef {
    /// Object id of the image stream.
    pub object: ObjectId,
    /// Declared pixel width (`/Width`).
    pub pixel_width: u32,
    /// Declared pixel height (`/Height`).
    pub pixel_height: u32,
}

impl BitmapRef {
    pub fn pixel_area(&self) -> u64 {
        self.pixel_width as u64 * self.pixel_height as u64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawableKind {
    Bitmap(BitmapRef),
    Vector,
}

/// Something painted on the page, in top-left-origin page points.
#[derive(Debug, Clone, PartialEq)]
pub struct Drawable {
    pub kind: DrawableKind,
    pub bbox: Rect,
}

/// One page as read from the document. Immutable once yielded.
#[derive(Debug, Clone)]
pub struct Page {
    /// 0-based page index.
    pub index: usize,
    pub raw_text: String,
    /// Page width in points.
    pub width: f32,
    /// Page height in points.
    pub height: f32,
    /// Lower-left corner of the visible box (CropBox within MediaBox) in
    /// default user space.
    pub user_origin: (f32, f32),
    /// `/Rotate` normalised to 0, 90, 180 or 270.
    pub rotation: u16,
    pub drawables: Vec<Drawable>,
    /// URIs of link annotations, in annotation order.
    pub link_uris: Vec<String>,
    /// Non-fatal problems met while reading the page.
    pub warnings: Vec<StageWarning>,
}

impl Page {
    /// 1-indexed page number.
    pub fn number(&self) -> usize {
        self.index + 1
    }

    pub fn bounds(&self) -> Rect {
        Rect::page(self.width, self.height)
    }

    /// Convert a default-user-space box (bottom-left origin) into page space.
    pub fn user_rect(&self, left: f32, bottom: f32, right: f32, top: f32) -> Rect {
        let (ox, oy) = self.user_origin;
        let page_top = oy + self.height;
        Rect::new(left - ox, page_top - top, right - ox, page_top - bottom)
    }

    pub fn bitmaps(&self) -> impl Iterator<Item = (&BitmapRef, &Rect)> {
        self.drawables.iter().filter_map(|d| match &d.kind {
            DrawableKind::Bitmap(b) => Some((b, &d.bbox)),
            DrawableKind::Vector => None,
        })
    }
}

// ── Bitmap decoding ──────────────────────────────────────────────────────

/// A bitmap ready to be written to disk.
#[derive(Debug, Clone)]
pub struct DecodedBitmap {
    pub bytes: Vec<u8>,
    pub format: ImageFormatTag,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported image encoding: {0}")]
    Unsupported(String),
    #[error("malformed image stream: {0}")]
    Malformed(String),
}

/// Turns an image placement into file bytes.
pub trait BitmapDecoder {
    fn decode_bitmap(&self, bitmap: &BitmapRef) -> Result<DecodedBitmap, DecodeError>;
}

// ── Source ───────────────────────────────────────────────────────────────

/// Lazy page iterator over a parsed PDF.
pub struct PdfSource {
    path: PathBuf,
    doc: Document,
    /// `(page number, page object)` in document order.
    pages: Vec<(u32, ObjectId)>,
    next: usize,
}

impl std::fmt::Debug for PdfSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfSource")
            .field("path", &self.path)
            .field("pages", &self.pages.len())
            .field("next", &self.next)
            .finish()
    }
}

impl PdfSource {
    /// Validate and parse the file. Fails before any output is touched.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let path = path.as_ref().to_path_buf();
        check_local_pdf(&path)?;

        let doc = Document::load(&path).map_err(|e| ExtractError::UnreadablePdf {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        if doc.is_encrypted() {
            return Err(ExtractError::UnreadablePdf {
                path,
                detail: "document is encrypted".into(),
            });
        }

        let pages: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();
        if pages.is_empty() {
            return Err(ExtractError::UnreadablePdf {
                path,
                detail: "document has no pages".into(),
            });
        }
        info!("PDF loaded: {} pages", pages.len());

        Ok(Self {
            path,
            doc,
            pages,
            next: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Document information dictionary plus structural facts.
    pub fn metadata(&self) -> DocumentMetadata {
        let info = self
            .doc
            .trailer
            .get(b"Info")
            .ok()
            .and_then(|o| resolve(&self.doc, o).as_dict().ok());
        let field = |key: &[u8]| -> Option<String> {
            let value = info?.get(key).ok()?;
            decode_text_string(resolve(&self.doc, value))
        };

        DocumentMetadata {
            title: field(b"Title"),
            author: field(b"Author"),
            subject: field(b"Subject"),
            creator: field(b"Creator"),
            producer: field(b"Producer"),
            creation_date: field(b"CreationDate"),
            modification_date: field(b"ModDate"),
            page_count: self.pages.len(),
            pdf_version: self.doc.version.clone(),
            is_encrypted: self.doc.is_encrypted(),
        }
    }

    fn read_page(&self, index: usize, page_number: u32, page_id: ObjectId) -> Page {
        let mut warnings = Vec::new();

        let raw_text = match self.doc.extract_text(&[page_number]) {
            Ok(t) => t,
            Err(e) => {
                debug!("page {}: text extraction failed: {}", page_number, e);
                warnings.push(StageWarning::TextFailed {
                    page: index + 1,
                    detail: e.to_string(),
                });
                String::new()
            }
        };

        let media = self.page_box(page_id, b"MediaBox").unwrap_or(DEFAULT_MEDIA_BOX);
        let visible = visible_box(media, self.page_box(page_id, b"CropBox"));

        let rotation = inherited(&self.doc, page_id, b"Rotate")
            .and_then(|o| o.as_i64().ok())
            .map(|r| r.rem_euclid(360) as u16 / 90 * 90)
            .unwrap_or(0);

        let resources = inherited(&self.doc, page_id, b"Resources").and_then(|o| o.as_dict().ok());
        let drawables = match self.doc.get_page_content(page_id) {
            Ok(content) => collect_drawables(
                &self.doc,
                &content,
                resources,
                PageSpace {
                    origin_x: visible[0],
                    top: visible[3],
                },
            ),
            Err(e) => {
                debug!("page {}: no content stream: {}", page_number, e);
                Vec::new()
            }
        };

        let link_uris = self.link_uris(page_id);
        trace!(
            "page {}: {} chars, {} drawables, {} links",
            page_number,
            raw_text.len(),
            drawables.len(),
            link_uris.len()
        );

        Page {
            index,
            raw_text,
            width: visible[2] - visible[0],
            height: visible[3] - visible[1],
            user_origin: (visible[0], visible[1]),
            rotation,
            drawables,
            link_uris,
            warnings,
        }
    }

    /// A normalised, non-empty page rectangle such as `/MediaBox`.
    fn page_box(&self, page_id: ObjectId, key: &[u8]) -> Option<[f32; 4]> {
        let a = inherited(&self.doc, page_id, key)?.as_array().ok()?;
        let v: Vec<f32> = a.iter().filter_map(|o| number(resolve(&self.doc, o))).collect();
        if v.len() != 4 {
            return None;
        }
        let r = [v[0].min(v[2]), v[1].min(v[3]), v[0].max(v[2]), v[1].max(v[3])];
        (r[2] - r[0] > 0.0 && r[3] - r[1] > 0.0).then_some(r)
    }

    /// `/Annots` → `/A` → `/URI` for every link annotation on the page.
    fn link_uris(&self, page_id: ObjectId) -> Vec<String> {
        let Ok(page) = self.doc.get_dictionary(page_id) else {
            return Vec::new();
        };
        let Some(annots) = page
            .get(b"Annots")
            .ok()
            .and_then(|o| resolve(&self.doc, o).as_array().ok())
        else {
            return Vec::new();
        };

        annots
            .iter()
            .filter_map(|annot| resolve(&self.doc, annot).as_dict().ok())
            .filter_map(|annot| {
                let action = resolve(&self.doc, annot.get(b"A").ok()?).as_dict().ok()?;
                let uri = resolve(&self.doc, action.get(b"URI").ok()?);
                decode_text_string(uri)
            })
            .collect()
    }

    fn image_stream(&self, bitmap: &BitmapRef) -> Result<&lopdf::Stream, DecodeError> {
        self.doc
            .get_object(bitmap.object)
            .and_then(Object::as_stream)
            .map_err(|e| DecodeError::Malformed(e.to_string()))
    }

    /// Resolve `/ColorSpace` to a component count, or why it is unsupported.
    fn components(&self, dict: &Dictionary) -> Result<u8, DecodeError> {
        let Ok(cs) = dict.get(b"ColorSpace") else {
            return Err(DecodeError::Unsupported("missing colour space".into()));
        };
        let cs = resolve(&self.doc, cs);
        let (family, params) = match cs {
            Object::Name(n) => (n.as_slice(), None),
            Object::Array(a) => (
                a.first().and_then(|o| o.as_name().ok()).unwrap_or(b""),
                a.get(1).map(|o| resolve(&self.doc, o)),
            ),
            _ => (&b""[..], None),
        };
        match family {
            b"DeviceGray" | b"CalGray" | b"G" => Ok(1),
            b"DeviceRGB" | b"CalRGB" | b"RGB" => Ok(3),
            b"DeviceCMYK" | b"CMYK" => Ok(4),
            b"ICCBased" => params
                .and_then(|p| p.as_stream().ok())
                .and_then(|s| s.dict.get(b"N").ok())
                .and_then(|n| n.as_i64().ok())
                .filter(|n| matches!(n, 1 | 3 | 4))
                .map(|n| n as u8)
                .ok_or_else(|| DecodeError::Unsupported("ICC profile without N".into())),
            other => Err(DecodeError::Unsupported(format!(
                "colour space /{}",
                String::from_utf8_lossy(other)
            ))),
        }
    }
}

impl Iterator for PdfSource {
    type Item = Page;

    fn next(&mut self) -> Option<Page> {
        let index = self.next;
        let &(page_number, page_id) = self.pages.get(index)?;
        self.next += 1;
        Some(self.read_page(index, page_number, page_id))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.pages.len() - self.next;
        (left, Some(left))
    }
}

impl BitmapDecoder for PdfSource {
    fn decode_bitmap(&self, bitmap: &BitmapRef) -> Result<DecodedBitmap, DecodeError> {
        let stream = self.image_stream(bitmap)?;
        let dict = &stream.dict;
        let filters = filter_names(dict);
        let (width, height) = (bitmap.pixel_width, bitmap.pixel_height);

        if let Some(unsupported) = filters
            .iter()
            .find(|f| matches!(f.as_slice(), b"JPXDecode" | b"JBIG2Decode" | b"CCITTFaxDecode"))
        {
            return Err(DecodeError::Unsupported(
                String::from_utf8_lossy(unsupported).into_owned(),
            ));
        }

        if filters.last().map(Vec::as_slice) == Some(&b"DCTDecode"[..]) {
            // Only a lone DCT filter leaves the raw JPEG in the stream.
            if filters.len() != 1 {
                return Err(DecodeError::Unsupported("chained DCTDecode".into()));
            }
            if self.components(dict).unwrap_or(3) == 4 {
                let img = image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg)
                    .map_err(|e| DecodeError::Malformed(e.to_string()))?;
                return to_png(&img);
            }
            return Ok(DecodedBitmap {
                bytes: stream.content.clone(),
                format: ImageFormatTag::Jpeg,
                width,
                height,
            });
        }

        let bits = dict
            .get(b"BitsPerComponent")
            .ok()
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(8);
        if bits != 8 {
            return Err(DecodeError::Unsupported(format!("{bits} bits per component")));
        }
        let components = self.components(dict)?;
        let data = if filters.is_empty() {
            stream.content.clone()
        } else {
            stream
                .decompressed_content()
                .map_err(|e| DecodeError::Malformed(e.to_string()))?
        };
        let img = raw_to_image(&data, width, height, components)?;
        to_png(&img)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Validate existence, permissions and PDF magic bytes.
fn check_local_pdf(path: &Path) -> Result<(), ExtractError> {
    if !path.exists() {
        return Err(ExtractError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(ExtractError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(ExtractError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => Err(ExtractError::FileNotFound {
            path: path.to_path_buf(),
        }),
    }
}

/// The region viewers and renderers show: the CropBox clipped to the
/// MediaBox, or the MediaBox when the two do not overlap.
fn visible_box(media: [f32; 4], crop: Option<[f32; 4]>) -> [f32; 4] {
    let Some(crop) = crop else {
        return media;
    };
    let r = [
        crop[0].max(media[0]),
        crop[1].max(media[1]),
        crop[2].min(media[2]),
        crop[3].min(media[3]),
    ];
    if r[2] - r[0] > 0.0 && r[3] - r[1] > 0.0 {
        r
    } else {
        media
    }
}

/// Follow a reference, or return the object itself.
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    doc.dereference(obj).map(|(_, o)| o).unwrap_or(obj)
}

/// Numeric value of an integer or real operand.
pub(crate) fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Look up a page attribute, walking up `/Parent` for inheritable keys.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..64 {
        if let Ok(value) = node.get(key) {
            return Some(resolve(doc, value));
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn filter_names(dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter") {
        Ok(Object::Name(n)) => vec![n.clone()],
        Ok(Object::Array(a)) => a
            .iter()
            .filter_map(|o| o.as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

/// PDF text string: UTF-16BE with BOM, otherwise a single-byte encoding.
fn decode_text_string(obj: &Object) -> Option<String> {
    let bytes = match obj {
        Object::String(bytes, _) => bytes,
        Object::Name(name) => name,
        _ => return None,
    };
    let text = if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else if let Ok(s) = std::str::from_utf8(bytes) {
        s.to_string()
    } else {
        bytes.iter().map(|&b| b as char).collect()
    };
    let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    (!text.is_empty()).then(|| text.to_string())
}

fn raw_to_image(data: &[u8], width: u32, height: u32, components: u8) -> Result<DynamicImage, DecodeError> {
    let pixels = width as usize * height as usize;
    let needed = pixels * components as usize;
    if pixels == 0 || data.len() < needed {
        return Err(DecodeError::Malformed(format!(
            "expected {} bytes for {}x{}x{}, got {}",
            needed,
            width,
            height,
            components,
            data.len()
        )));
    }
    let data = &data[..needed];
    let img = match components {
        1 => GrayImage::from_raw(width, height, data.to_vec()).map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(width, height, data.to_vec()).map(DynamicImage::ImageRgb8),
        4 => {
            let rgb: Vec<u8> = data
                .chunks_exact(4)
                .flat_map(|p| {
                    let k = 255 - p[3] as u16;
                    [0, 1, 2].map(|i| ((255 - p[i] as u16) * k / 255) as u8)
                })
                .collect();
            ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, rgb).map(DynamicImage::ImageRgb8)
        }
        n => return Err(DecodeError::Unsupported(format!("{n} colour components"))),
    };
    img.ok_or_else(|| DecodeError::Malformed("pixel buffer size mismatch".into()))
}

fn to_png(img: &DynamicImage) -> Result<DecodedBitmap, DecodeError> {
    let bytes = encode_png(img).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    Ok(DecodedBitmap {
        bytes,
        format: ImageFormatTag::Png,
        width: img.width(),
        height: img.height(),
    })
}
