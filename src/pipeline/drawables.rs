//! Content-stream walk: where does a page actually draw something?
//!
//! Tracks the current transformation matrix through `q`/`Q`/`cm`, collects
//! path construction points, and emits one [`Drawable`] per painted path and
//! per image XObject placement. Form XObjects are entered with their
//! `/Matrix` applied, up to a fixed nesting depth. Text operators are
//! ignored; glyph geometry comes from the text-geometry capability instead.
//!
//! Output boxes are in top-left-origin page points relative to the MediaBox.

use crate::geometry::Rect;
use crate::pipeline::source::{number, resolve, BitmapRef, Drawable, DrawableKind};
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object};
use tracing::{debug, trace};

const MAX_FORM_DEPTH: usize = 3;

/// Affine matrix `[a b c d e f]` in PDF row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Matrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix {
    const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn from_operands(ops: &[Object]) -> Option<Matrix> {
        if ops.len() != 6 {
            return None;
        }
        let v: Vec<f32> = ops.iter().filter_map(number).collect();
        (v.len() == 6).then(|| Matrix {
            a: v[0],
            b: v[1],
            c: v[2],
            d: v[3],
            e: v[4],
            f: v[5],
        })
    }

    /// `self` applied first, then `outer`.
    fn then(&self, outer: &Matrix) -> Matrix {
        Matrix {
            a: self.a * outer.a + self.b * outer.c,
            b: self.a * outer.b + self.b * outer.d,
            c: self.c * outer.a + self.d * outer.c,
            d: self.c * outer.b + self.d * outer.d,
            e: self.e * outer.a + self.f * outer.c + outer.e,
            f: self.e * outer.b + self.f * outer.d + outer.f,
        }
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    fn unit_square(&self) -> [(f32, f32); 4] {
        [
            self.apply(0.0, 0.0),
            self.apply(1.0, 0.0),
            self.apply(0.0, 1.0),
            self.apply(1.0, 1.0),
        ]
    }
}

/// Converts default user space into top-left page space.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PageSpace {
    pub origin_x: f32,
    pub top: f32,
}

impl PageSpace {
    fn rect(&self, points: impl IntoIterator<Item = (f32, f32)>) -> Option<Rect> {
        Rect::bounding(
            points
                .into_iter()
                .map(|(x, y)| (x - self.origin_x, self.top - y)),
        )
    }
}

struct Walker<'a> {
    doc: &'a Document,
    space: PageSpace,
    out: Vec<Drawable>,
}

/// Walk a decoded content stream and return every drawable it paints.
pub(crate) fn collect_drawables(
    doc: &Document,
    content: &[u8],
    resources: Option<&Dictionary>,
    space: PageSpace,
) -> Vec<Drawable> {
    let mut walker = Walker {
        doc,
        space,
        out: Vec::new(),
    };
    walker.walk(content, resources, Matrix::IDENTITY, 0);
    walker.out
}

impl<'a> Walker<'a> {
    fn walk(&mut self, content: &[u8], resources: Option<&Dictionary>, base: Matrix, depth: usize) {
        let content = match Content::decode(content) {
            Ok(c) => c,
            Err(e) => {
                debug!("content stream decode failed: {}", e);
                return;
            }
        };

        let mut ctm = base;
        let mut stack: Vec<Matrix> = Vec::new();
        let mut path: Vec<(f32, f32)> = Vec::new();

        for op in &content.operations {
            let args: Vec<f32> = op.operands.iter().filter_map(number).collect();
            match op.operator.as_str() {
                "q" => stack.push(ctm),
                "Q" => ctm = stack.pop().unwrap_or(base),
                "cm" => {
                    if let Some(m) = Matrix::from_operands(&op.operands) {
                        ctm = m.then(&ctm);
                    }
                }
                "m" | "l" if args.len() >= 2 => path.push(ctm.apply(args[0], args[1])),
                "c" if args.len() >= 6 => {
                    for pair in args[..6].chunks(2) {
                        path.push(ctm.apply(pair[0], pair[1]));
                    }
                }
                "v" | "y" if args.len() >= 4 => {
                    for pair in args[..4].chunks(2) {
                        path.push(ctm.apply(pair[0], pair[1]));
                    }
                }
                "re" if args.len() >= 4 => {
                    let (x, y, w, h) = (args[0], args[1], args[2], args[3]);
                    for (px, py) in [(x, y), (x + w, y), (x, y + h), (x + w, y + h)] {
                        path.push(ctm.apply(px, py));
                    }
                }
                "S" | "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" => {
                    if let Some(bbox) = self.space.rect(path.drain(..)) {
                        self.out.push(Drawable {
                            kind: DrawableKind::Vector,
                            bbox,
                        });
                    }
                }
                "n" => path.clear(),
                "BI" => {
                    if let Some(bbox) = self.space.rect(ctm.unit_square()) {
                        self.out.push(Drawable {
                            kind: DrawableKind::Vector,
                            bbox,
                        });
                    }
                }
                "Do" => {
                    if let Some(name) = op.operands.first().and_then(|o| o.as_name().ok()) {
                        self.place_xobject(name, resources, ctm, depth);
                    }
                }
                _ => {}
            }
        }
    }

    fn place_xobject(
        &mut self,
        name: &[u8],
        resources: Option<&Dictionary>,
        ctm: Matrix,
        depth: usize,
    ) {
        let doc = self.doc;
        let Some(xobjects) = resources
            .and_then(|r| r.get(b"XObject").ok())
            .and_then(|o| resolve(doc, o).as_dict().ok())
        else {
            return;
        };
        let Ok(entry) = xobjects.get(name) else {
            trace!("missing XObject /{}", String::from_utf8_lossy(name));
            return;
        };
        let Ok(object_id) = entry.as_reference() else {
            return;
        };
        let Ok(stream) = doc.get_object(object_id).and_then(Object::as_stream) else {
            return;
        };
        let dict = &stream.dict;
        let subtype = dict.get(b"Subtype").and_then(Object::as_name).unwrap_or(b"");

        match subtype {
            b"Image" => {
                let dim = |key: &[u8]| {
                    dict.get(key)
                        .ok()
                        .and_then(|o| resolve(doc, o).as_i64().ok())
                        .unwrap_or(0)
                        .max(0) as u32
                };
                if let Some(bbox) = self.space.rect(ctm.unit_square()) {
                    self.out.push(Drawable {
                        kind: DrawableKind::Bitmap(BitmapRef {
                            object: object_id,
                            pixel_width: dim(b"Width"),
                            pixel_height: dim(b"Height"),
                        }),
                        bbox,
                    });
                }
            }
            b"Form" if depth < MAX_FORM_DEPTH => {
                let matrix = dict
                    .get(b"Matrix")
                    .ok()
                    .and_then(|o| resolve(doc, o).as_array().ok())
                    .and_then(|a| Matrix::from_operands(a))
                    .unwrap_or(Matrix::IDENTITY);
                let form_resources = dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|o| resolve(doc, o).as_dict().ok())
                    .or(resources);
                let body = stream
                    .decompressed_content()
                    .unwrap_or_else(|_| stream.content.clone());
                self.walk(&body, form_resources, matrix.then(&ctm), depth + 1);
            }
            b"Form" => debug!("form XObject nesting deeper than {}; skipped", MAX_FORM_DEPTH),
            _ => {}
        }
    }
}
