//! Hybrid merge and overlap deduplication of image candidates.

use super::PendingImage;
use crate::config::ImageMode;
use crate::output::ImageSource;
use std::collections::HashSet;

/// In hybrid mode a rendered page supersedes its embedded bitmaps.
pub fn drops_embedded(mode: ImageMode, keep_embedded_on_rendered_pages: bool, page_rendered: bool) -> bool {
    mode == ImageMode::Hybrid && !keep_embedded_on_rendered_pages && page_rendered
}

/// Remove embedded entries on pages that also have a render entry.
pub fn hybrid_drop(images: Vec<PendingImage>, mode: ImageMode, keep_embedded_on_rendered_pages: bool) -> Vec<PendingImage> {
    let rendered: HashSet<usize> = images
        .iter()
        .filter(|i| i.source == ImageSource::PageRender)
        .map(|i| i.page)
        .collect();
    images
        .into_iter()
        .filter(|i| {
            i.source != ImageSource::Embedded
                || !drops_embedded(mode, keep_embedded_on_rendered_pages, rendered.contains(&i.page))
        })
        .collect()
}

/// Same-page entries overlapping above `iou_threshold` keep the larger pixel
/// area; ties keep the earlier entry. Survivors stay in input order.
pub fn dedup(images: Vec<PendingImage>, iou_threshold: f32) -> Vec<PendingImage> {
    let mut order: Vec<usize> = (0..images.len()).collect();
    order.sort_by(|&a, &b| images[b].pixel_area().cmp(&images[a].pixel_area()));

    let mut kept: Vec<usize> = Vec::new();
    for i in order {
        let duplicate = kept
            .iter()
            .any(|&k| images[k].page == images[i].page && images[k].bbox.iou(&images[i].bbox) > iou_threshold);
        if !duplicate {
            kept.push(i);
        }
    }

    let kept: HashSet<usize> = kept.into_iter().collect();
    images
        .into_iter()
        .enumerate()
        .filter(|(i, _)| kept.contains(i))
        .map(|(_, img)| img)
        .collect()
}
