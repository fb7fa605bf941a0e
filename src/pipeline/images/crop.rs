//! Caption-aware crop planning for rendered pages.
//!
//! A plan is computed in page points before rendering:
//!
//! 1. Visual regions: placed bitmaps covering at least 0.2% of the page and
//!    clusters of vector paths (merged when within 4pt of each other)
//!    covering at least 1%. Near-full-page boxes are backgrounds and ignored.
//! 2. Caption anchors: the text line that starts with the caption, or else
//!    contains its query (`Figure 3`).
//! 3. Association: visuals sharing the anchor's column within a vertical gap
//!    of a quarter page. Figures look above first, tables below; the nearest
//!    visual seeds the region and adjacent visuals on the same side grow it.
//! 4. Padding and clamping; a crop thinner than the minimum height ratio
//!    becomes a full-page render.

use crate::capability::TextRun;
use crate::config::CropMode;
use crate::geometry::Rect;
use crate::pipeline::captions::{CaptionCandidate, CaptionDetector, CaptionKind};
use crate::pipeline::source::{DrawableKind, Page};
use serde::Serialize;
use std::cmp::Ordering;

/// Vector paths closer than this merge into one visual.
pub const OBJECT_MERGE_MARGIN: f32 = 4.0;
const SIDE_PADDING_PT: f32 = 6.0;
const MIN_BITMAP_AREA_RATIO: f32 = 0.002;
const MIN_VECTOR_AREA_RATIO: f32 = 0.01;
const BACKGROUND_AREA_RATIO: f32 = 0.9;
const MAX_ANCHOR_GAP_RATIO: f32 = 0.25;
/// Adjacent panels of one figure are at most this far apart.
const PANEL_GAP_PT: f32 = 12.0;
const TIE_EPSILON: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropSettings {
    pub mode: CropMode,
    pub top_margin_pt: f32,
    pub bottom_margin_pt: f32,
    pub min_height_ratio: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FullPageReason {
    /// Crop mode is `full`.
    CropModeFull,
    /// Rotated pages are rendered as-is.
    Rotated,
    /// The computed crop was thinner than the minimum height ratio.
    DegenerateCrop,
    /// No caption and nothing drawn to crop to.
    NoVisualContent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CropPlan {
    Crop(Rect),
    FullPage(FullPageReason),
    /// Caption page without any visual content: nothing worth rendering.
    Skip,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CropOutcome {
    pub plan: CropPlan,
    /// `(index into the page's captions, anchor line box)` for every caption
    /// that was associated with a visual.
    pub anchors: Vec<(usize, Rect)>,
}

impl CropOutcome {
    fn plan(plan: CropPlan) -> Self {
        Self {
            plan,
            anchors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Side {
    Above,
    Below,
}

/// Plan the crop of one page. `runs` is `None` without text geometry; every
/// caption is then unresolved and the crop covers all visuals.
pub fn plan_crop(
    page: &Page,
    captions: &[CaptionCandidate],
    runs: Option<&[TextRun]>,
    detector: &CaptionDetector,
    settings: &CropSettings,
) -> CropOutcome {
    if settings.mode == CropMode::Full {
        return CropOutcome::plan(CropPlan::FullPage(FullPageReason::CropModeFull));
    }
    if page.rotation != 0 {
        return CropOutcome::plan(CropPlan::FullPage(FullPageReason::Rotated));
    }

    let visuals = visual_regions(page);
    if visuals.is_empty() {
        return CropOutcome::plan(if captions.is_empty() {
            CropPlan::FullPage(FullPageReason::NoVisualContent)
        } else {
            CropPlan::Skip
        });
    }

    let lines = runs.map(group_lines).unwrap_or_default();
    let mut anchors = Vec::new();
    let mut region: Option<Rect> = None;
    for (i, caption) in captions.iter().enumerate() {
        let Some(anchor) = find_anchor(&lines, caption, detector) else {
            continue;
        };
        let Some(figure) = associate(&anchor, caption.kind, &visuals, page.height) else {
            continue;
        };
        let covered = figure.union(&anchor);
        region = Some(region.map_or(covered, |r| r.union(&covered)));
        anchors.push((i, anchor));
    }

    let Some(region) = region.or_else(|| visuals.iter().copied().reduce(|a, b| a.union(&b))) else {
        return CropOutcome::plan(CropPlan::FullPage(FullPageReason::NoVisualContent));
    };

    let h = page.height;
    let padded = Rect {
        x0: region.x0 - SIDE_PADDING_PT,
        y0: region.y0 - settings.top_margin_pt,
        x1: region.x1 + SIDE_PADDING_PT,
        y1: (region.y1 + SIDE_PADDING_PT).min(h - settings.bottom_margin_pt),
    }
    .clamp_to(&page.bounds());

    let plan = if padded.is_empty() || padded.height() / h < settings.min_height_ratio {
        CropPlan::FullPage(FullPageReason::DegenerateCrop)
    } else {
        CropPlan::Crop(padded.rounded())
    };
    CropOutcome { plan, anchors }
}

// ── Visual regions ───────────────────────────────────────────────────────

/// Bitmaps and clustered vector paths large enough to be figure content.
pub fn visual_regions(page: &Page) -> Vec<Rect> {
    let bounds = page.bounds();
    let page_area = bounds.area();
    if page_area <= 0.0 {
        return Vec::new();
    }
    let is_background = |r: &Rect| r.area() >= BACKGROUND_AREA_RATIO * page_area;

    let mut out: Vec<Rect> = Vec::new();
    let mut clusters: Vec<Rect> = Vec::new();
    for d in &page.drawables {
        let r = d.bbox.clamp_to(&bounds);
        match d.kind {
            DrawableKind::Bitmap(_) => {
                if r.area() >= MIN_BITMAP_AREA_RATIO * page_area && !is_background(&r) {
                    out.push(r);
                }
            }
            DrawableKind::Vector => {
                if r.width() <= 0.0 && r.height() <= 0.0 || is_background(&r) {
                    continue;
                }
                merge_into(&mut clusters, r);
            }
        }
    }

    // Clusters can grow into each other after the first pass.
    loop {
        let before = clusters.len();
        let mut merged: Vec<Rect> = Vec::with_capacity(before);
        for r in clusters {
            merge_into(&mut merged, r);
        }
        clusters = merged;
        if clusters.len() == before {
            break;
        }
    }

    out.extend(
        clusters
            .into_iter()
            .filter(|c| c.area() >= MIN_VECTOR_AREA_RATIO * page_area && !is_background(c)),
    );
    out
}

fn merge_into(clusters: &mut Vec<Rect>, r: Rect) {
    let close = |c: &Rect| {
        let (dx, dy) = c.gap(&r);
        dx <= OBJECT_MERGE_MARGIN && dy <= OBJECT_MERGE_MARGIN
    };
    match clusters.iter_mut().find(|c| close(c)) {
        Some(c) => *c = c.union(&r),
        None => clusters.push(r),
    }
}

// ── Anchors ──────────────────────────────────────────────────────────────

/// Merge runs sharing a baseline into lines, left to right.
pub fn group_lines(runs: &[TextRun]) -> Vec<TextRun> {
    let mut sorted: Vec<&TextRun> = runs.iter().collect();
    sorted.sort_by(|a, b| by_f32(center_y(&a.bbox), center_y(&b.bbox)));

    let mut lines: Vec<Vec<&TextRun>> = Vec::new();
    for run in sorted {
        let joins = lines.last().and_then(|l| l.first()).is_some_and(|first| {
            let tolerance = (first.bbox.height().min(run.bbox.height()) * 0.5).max(2.0);
            (center_y(&first.bbox) - center_y(&run.bbox)).abs() <= tolerance
        });
        match lines.last_mut() {
            Some(line) if joins => line.push(run),
            _ => lines.push(vec![run]),
        }
    }

    lines
        .into_iter()
        .filter_map(|mut line| {
            line.sort_by(|a, b| by_f32(a.bbox.x0, b.bbox.x0));
            let bbox = line.iter().map(|r| r.bbox).reduce(|a, b| a.union(&b))?;
            let text = line.iter().map(|r| r.text.as_str()).collect::<Vec<_>>().join(" ");
            Some(TextRun { text, bbox })
        })
        .collect()
}

fn find_anchor(lines: &[TextRun], caption: &CaptionCandidate, detector: &CaptionDetector) -> Option<Rect> {
    let starts_with_caption = lines.iter().find(|line| {
        detector
            .match_line_start(&line.text)
            .is_some_and(|m| m.kind == caption.kind && m.label.eq_ignore_ascii_case(&caption.label))
    });
    if let Some(line) = starts_with_caption {
        return Some(line.bbox);
    }
    let query = caption.query().to_lowercase();
    lines
        .iter()
        .find(|line| contains_query(&line.text.to_lowercase(), &query))
        .map(|line| line.bbox)
}

/// `query` occurs and is not followed by more label characters
/// (`figure 3` must not match `figure 30`).
fn contains_query(haystack: &str, query: &str) -> bool {
    haystack.match_indices(query).any(|(i, m)| {
        haystack[i + m.len()..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_ascii_alphanumeric())
    })
}

// ── Association ──────────────────────────────────────────────────────────

struct Candidate {
    index: usize,
    side: Side,
    distance: f32,
    overlap: f32,
    area: f32,
}

/// Region of the visuals belonging to the caption at `anchor`.
fn associate(anchor: &Rect, kind: CaptionKind, visuals: &[Rect], page_height: f32) -> Option<Rect> {
    let tolerance = (0.01 * page_height).max(6.0);
    let max_gap = MAX_ANCHOR_GAP_RATIO * page_height;

    let side_of = |v: &Rect| -> Option<(Side, f32)> {
        if v.y1 <= anchor.y0 + tolerance {
            Some((Side::Above, (anchor.y0 - v.y1).max(0.0)))
        } else if v.y0 >= anchor.y1 - tolerance {
            Some((Side::Below, (v.y0 - anchor.y1).max(0.0)))
        } else {
            None
        }
    };

    let candidates: Vec<Candidate> = visuals
        .iter()
        .enumerate()
        .filter_map(|(index, v)| {
            let overlap = v.horizontal_overlap_ratio(anchor);
            if overlap <= 0.0 {
                return None;
            }
            let (side, distance) = side_of(v)?;
            (distance <= max_gap).then_some(Candidate {
                index,
                side,
                distance,
                overlap,
                area: v.area(),
            })
        })
        .collect();

    let preferred = match kind {
        CaptionKind::Figure => Side::Above,
        CaptionKind::Table => Side::Below,
    };
    let seed = best_of(candidates.iter().filter(|c| c.side == preferred))
        .or_else(|| best_of(candidates.iter().filter(|c| c.side != preferred)))?;

    // Grow over neighbouring panels on the same side of the caption.
    let mut region = visuals[seed.index];
    let mut taken = vec![false; visuals.len()];
    taken[seed.index] = true;
    loop {
        let next = visuals.iter().enumerate().find(|(i, v)| {
            if taken[*i] || v.horizontal_overlap_ratio(anchor) <= 0.0 {
                return false;
            }
            let same_side = side_of(v).is_some_and(|(s, _)| s == seed.side);
            let (dx, dy) = region.gap(v);
            same_side && dx <= PANEL_GAP_PT && dy <= PANEL_GAP_PT
        });
        match next {
            Some((i, v)) => {
                taken[i] = true;
                region = region.union(v);
            }
            None => break,
        }
    }
    Some(region)
}

/// Nearest first; ties go above, then to more horizontal overlap, then to
/// the larger visual.
fn best_of<'a>(candidates: impl Iterator<Item = &'a Candidate>) -> Option<&'a Candidate> {
    candidates.min_by(|a, b| {
        let distance = if (a.distance - b.distance).abs() <= TIE_EPSILON {
            Ordering::Equal
        } else {
            by_f32(a.distance, b.distance)
        };
        distance
            .then(a.side.cmp(&b.side))
            .then(by_f32(b.overlap, a.overlap))
            .then(by_f32(b.area, a.area))
    })
}

fn by_f32(a: f32, b: f32) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

fn center_y(r: &Rect) -> f32 {
    (r.y0 + r.y1) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::source::{BitmapRef, Drawable};

    const SETTINGS: CropSettings = CropSettings {
        mode: CropMode::CaptionAware,
        top_margin_pt: 10.0,
        bottom_margin_pt: 8.0,
        min_height_ratio: 0.15,
    };

    fn bitmap(x0: f32, y0: f32, x1: f32, y1: f32) -> Drawable {
        Drawable {
            kind: DrawableKind::Bitmap(BitmapRef {
                object: (7, 0),
                pixel_width: 800,
                pixel_height: 600,
            }),
            bbox: Rect::new(x0, y0, x1, y1),
        }
    }

    fn vector(x0: f32, y0: f32, x1: f32, y1: f32) -> Drawable {
        Drawable {
            kind: DrawableKind::Vector,
            bbox: Rect::new(x0, y0, x1, y1),
        }
    }

    fn page(drawables: Vec<Drawable>) -> Page {
        Page {
            index: 0,
            raw_text: String::new(),
            width: 600.0,
            height: 800.0,
            user_origin: (0.0, 0.0),
            rotation: 0,
            drawables,
            link_uris: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn line(text: &str, x0: f32, y0: f32, x1: f32) -> TextRun {
        TextRun {
            text: text.to_string(),
            bbox: Rect::new(x0, y0, x1, y0 + 10.0),
        }
    }

    fn captions(text: &str) -> Vec<CaptionCandidate> {
        CaptionDetector::default().detect_page(1, text)
    }

    #[test]
    fn figure_caption_below_bitmap() {
        let p = page(vec![bitmap(100.0, 100.0, 500.0, 400.0)]);
        let caps = captions("Figure 1. Overview\n");
        let runs = [line("Figure 1.", 100.0, 410.0, 150.0), line("Overview", 155.0, 410.0, 300.0)];
        let out = plan_crop(&p, &caps, Some(&runs), &CaptionDetector::default(), &SETTINGS);
        assert_eq!(out.plan, CropPlan::Crop(Rect::new(94.0, 90.0, 506.0, 426.0)));
        assert_eq!(out.anchors, vec![(0, Rect::new(100.0, 410.0, 300.0, 420.0))]);
    }

    #[test]
    fn table_caption_looks_below() {
        let p = page(vec![
            vector(100.0, 30.0, 500.0, 90.0),
            vector(100.0, 125.0, 500.0, 300.0),
        ]);
        let caps = captions("Table 1: Results\n");
        let runs = [line("Table 1: Results", 100.0, 100.0, 300.0)];
        let out = plan_crop(&p, &caps, Some(&runs), &CaptionDetector::default(), &SETTINGS);
        assert_eq!(out.plan, CropPlan::Crop(Rect::new(94.0, 90.0, 506.0, 306.0)));
    }

    #[test]
    fn neighbouring_figure_is_left_out() {
        let p = page(vec![
            bitmap(100.0, 40.0, 500.0, 240.0),
            bitmap(100.0, 300.0, 500.0, 500.0),
        ]);
        let caps = captions("Figure 2. Second\n");
        let runs = [line("Figure 2. Second", 100.0, 510.0, 300.0)];
        let out = plan_crop(&p, &caps, Some(&runs), &CaptionDetector::default(), &SETTINGS);
        assert_eq!(out.plan, CropPlan::Crop(Rect::new(94.0, 290.0, 506.0, 526.0)));
    }

    #[test]
    fn adjacent_panels_grow_the_region() {
        let p = page(vec![
            bitmap(100.0, 200.0, 290.0, 400.0),
            bitmap(300.0, 200.0, 500.0, 400.0),
        ]);
        let caps = captions("Figure 3. Panels\n");
        let runs = [line("Figure 3. Panels", 100.0, 410.0, 500.0)];
        let out = plan_crop(&p, &caps, Some(&runs), &CaptionDetector::default(), &SETTINGS);
        assert_eq!(out.plan, CropPlan::Crop(Rect::new(94.0, 190.0, 506.0, 426.0)));
    }

    #[test]
    fn unresolved_captions_fall_back_to_all_visuals() {
        let p = page(vec![bitmap(100.0, 100.0, 300.0, 300.0), bitmap(350.0, 500.0, 500.0, 700.0)]);
        let caps = captions("Figure 4. Elsewhere\n");
        let out = plan_crop(&p, &caps, None, &CaptionDetector::default(), &SETTINGS);
        assert_eq!(out.plan, CropPlan::Crop(Rect::new(94.0, 90.0, 506.0, 706.0)));
        assert!(out.anchors.is_empty());
    }

    #[test]
    fn thin_crop_becomes_full_page() {
        // 48pt visual + 10pt top margin + 6pt padding = 64pt = 8% of 800.
        let p = page(vec![bitmap(100.0, 100.0, 500.0, 148.0)]);
        let out = plan_crop(&p, &[], None, &CaptionDetector::default(), &SETTINGS);
        assert_eq!(out.plan, CropPlan::FullPage(FullPageReason::DegenerateCrop));
    }

    #[test]
    fn bottom_margin_is_trimmed() {
        let p = page(vec![bitmap(100.0, 500.0, 500.0, 799.0)]);
        let out = plan_crop(&p, &[], None, &CaptionDetector::default(), &SETTINGS);
        assert_eq!(out.plan, CropPlan::Crop(Rect::new(94.0, 490.0, 506.0, 792.0)));
    }

    #[test]
    fn empty_pages() {
        let p = page(Vec::new());
        let d = CaptionDetector::default();
        assert_eq!(plan_crop(&p, &captions("Figure 1. x\n"), None, &d, &SETTINGS).plan, CropPlan::Skip);
        assert_eq!(
            plan_crop(&p, &[], None, &d, &SETTINGS).plan,
            CropPlan::FullPage(FullPageReason::NoVisualContent)
        );
    }

    #[test]
    fn full_mode_and_rotation_skip_planning() {
        let p = page(vec![bitmap(100.0, 100.0, 500.0, 400.0)]);
        let d = CaptionDetector::default();
        let full = CropSettings {
            mode: CropMode::Full,
            ..SETTINGS
        };
        assert_eq!(
            plan_crop(&p, &[], None, &d, &full).plan,
            CropPlan::FullPage(FullPageReason::CropModeFull)
        );
        let mut rotated = p.clone();
        rotated.rotation = 90;
        assert_eq!(
            plan_crop(&rotated, &[], None, &d, &SETTINGS).plan,
            CropPlan::FullPage(FullPageReason::Rotated)
        );
    }

    #[test]
    fn vector_paths_cluster_and_noise_is_dropped() {
        let mut drawables: Vec<Drawable> = (0..10)
            .map(|i| {
                let y = 200.0 + i as f32 * 20.0;
                vector(100.0, y, 400.0, y + 18.0)
            })
            .collect();
        drawables.push(vector(550.0, 20.0, 553.0, 23.0)); // speck
        drawables.push(vector(0.0, 0.0, 600.0, 800.0)); // background
        drawables.push(bitmap(10.0, 10.0, 12.0, 12.0)); // icon
        let regions = visual_regions(&page(drawables));
        assert_eq!(regions, vec![Rect::new(100.0, 200.0, 400.0, 398.0)]);
    }

    #[test]
    fn lines_are_joined_left_to_right() {
        let runs = [line("Overview", 160.0, 100.0, 300.0), line("Fig. 2:", 100.0, 101.0, 150.0)];
        let lines = group_lines(&runs);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "Fig. 2: Overview");
        assert!(contains_query("see figure 3 here", "figure 3"));
        assert!(!contains_query("see figure 30 here", "figure 3"));
    }
}
