//! Pipeline stages for PDF-to-artifact extraction.
//!
//! Each submodule implements one step and is testable on its own; the
//! orchestration lives in [`crate::extract`].
//!
//! ## Data Flow
//!
//! ```text
//! source ──▶ text ──▶ captions / links / availability / code_signals
//! (lopdf)    (markers)          (regex scanners over the full text)
//!    │
//!    ├──▶ tables ◀── pdfium text geometry
//!    └──▶ images ◀── pdfium rendering + embedded bitmaps
//!                        │
//!                        ▼
//!                    manifest (layout, atomic writes, gallery)
//! ```
//!
//! 1. [`source`] / [`drawables`] — parse the PDF, walk content streams for
//!    placed bitmaps and vector paths, decode image XObjects
//! 2. [`text`] — page-delimited full text with offset → page lookup
//! 3. [`captions`], [`links`], [`availability`], [`code_signals`] —
//!    rule-based scanners
//! 4. [`pdfium`] / [`tables`] — optional pdfium-backed stages
//! 5. [`images`] — render selection, caption-aware crop, hybrid merge, dedup
//! 6. [`manifest`] — where and how every artifact is written

pub mod availability;
pub mod captions;
pub mod code_signals;
pub mod drawables;
pub mod encode;
pub mod images;
pub mod links;
pub mod manifest;
pub mod pdfium;
pub mod source;
pub mod tables;
pub mod text;
