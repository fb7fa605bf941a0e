//! Heuristic table extraction from positioned text runs.
//!
//! 1. Cluster runs into rows by vertical centre
//! 2. Consecutive rows with a stable cell count (±1) form a region
//! 3. Column boundaries come from clustered left edges of the region
//! 4. Each run lands in the column containing its horizontal centre
//! 5. Regions whose typical cell spans a large share of the region width are
//!    running text (two-column body prose aligns like a table) and are dropped
//!
//! Cells are plain strings; no header or type interpretation happens here.

use crate::capability::{TextGeometry, TextRun};
use crate::geometry::Rect;
use crate::pipeline::source::Page;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::debug;

/// One entry of `tables.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRecord {
    pub page: usize,
    /// 1-based position among the page's tables.
    pub table_index: usize,
    pub rows: Vec<Vec<String>>,
    pub n_rows: usize,
    pub n_cols: usize,
    pub bbox: Rect,
}

#[derive(Debug, Clone)]
pub struct TableDetectorConfig {
    /// Runs whose vertical centres are within this distance share a row (points).
    pub row_tolerance: f32,
    /// Left edges closer than this share a column (points).
    pub col_tolerance: f32,
    /// Pages with fewer runs are skipped.
    pub min_cells: usize,
    pub min_rows: usize,
    pub min_cols: usize,
    /// Median cell width above this fraction of the region width marks prose.
    pub max_cell_width_ratio: f32,
}

impl Default for TableDetectorConfig {
    fn default() -> Self {
        Self {
            row_tolerance: 5.0,
            col_tolerance: 10.0,
            min_cells: 6,
            min_rows: 2,
            min_cols: 2,
            max_cell_width_ratio: 0.35,
        }
    }
}

/// Tables on one page, via the text-geometry capability.
pub fn extract_page_tables(
    geometry: &dyn TextGeometry,
    page: &Page,
    config: &TableDetectorConfig,
) -> Result<Vec<TableRecord>, String> {
    let runs = geometry.text_runs(page)?;
    let tables = detect_tables(&runs, config);
    debug!("Page {}: {} tables from {} runs", page.number(), tables.len(), runs.len());
    Ok(tables
        .into_iter()
        .enumerate()
        .map(|(i, (rows, bbox))| TableRecord {
            page: page.number(),
            table_index: i + 1,
            n_rows: rows.len(),
            n_cols: rows.iter().map(Vec::len).max().unwrap_or(0),
            rows,
            bbox: bbox.rounded(),
        })
        .collect())
}

/// Row-major cell grids with their bounding boxes.
pub fn detect_tables(runs: &[TextRun], config: &TableDetectorConfig) -> Vec<(Vec<Vec<String>>, Rect)> {
    if runs.len() < config.min_cells {
        return Vec::new();
    }
    let mut sorted: Vec<&TextRun> = runs.iter().filter(|r| !r.text.trim().is_empty()).collect();
    sorted.sort_by(|a, b| by_f32(a.bbox.y0, b.bbox.y0).then(by_f32(a.bbox.x0, b.bbox.x0)));

    let rows = cluster_rows(&sorted, config.row_tolerance);
    find_regions(&rows, config)
        .iter()
        .filter_map(|region| build_table(region, config))
        .collect()
}

fn by_f32(a: f32, b: f32) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

fn center_y(r: &TextRun) -> f32 {
    (r.bbox.y0 + r.bbox.y1) / 2.0
}

fn center_x(r: &TextRun) -> f32 {
    (r.bbox.x0 + r.bbox.x1) / 2.0
}

fn cluster_rows<'a>(runs: &[&'a TextRun], tolerance: f32) -> Vec<Vec<&'a TextRun>> {
    let mut rows: Vec<Vec<&TextRun>> = Vec::new();
    for &run in runs {
        let existing = rows
            .iter()
            .position(|row| row.first().is_some_and(|first| (center_y(run) - center_y(first)).abs() <= tolerance));
        match existing {
            Some(i) => rows[i].push(run),
            None => rows.push(vec![run]),
        }
    }
    for row in &mut rows {
        row.sort_by(|a, b| by_f32(a.bbox.x0, b.bbox.x0));
    }
    rows.sort_by(|a, b| by_f32(a[0].bbox.y0, b[0].bbox.y0));
    rows
}

fn find_regions<'a>(rows: &[Vec<&'a TextRun>], config: &TableDetectorConfig) -> Vec<Vec<Vec<&'a TextRun>>> {
    let mut regions = Vec::new();
    let mut current: Vec<Vec<&TextRun>> = Vec::new();
    let mut expected: Option<usize> = None;

    let close = |current: &mut Vec<Vec<&'a TextRun>>, regions: &mut Vec<Vec<Vec<&'a TextRun>>>| {
        if current.len() >= config.min_rows {
            regions.push(std::mem::take(current));
        } else {
            current.clear();
        }
    };

    for row in rows {
        let n = row.len();
        if n < config.min_cols {
            close(&mut current, &mut regions);
            expected = None;
            continue;
        }
        match expected {
            Some(exp) if n.abs_diff(exp) <= 1 => current.push(row.clone()),
            _ => {
                close(&mut current, &mut regions);
                current.push(row.clone());
                expected = Some(n);
            }
        }
    }
    close(&mut current, &mut regions);
    regions
}

fn build_table(region: &[Vec<&TextRun>], config: &TableDetectorConfig) -> Option<(Vec<Vec<String>>, Rect)> {
    let boundaries = column_boundaries(region, config.col_tolerance);
    let n_cols = boundaries.len().saturating_sub(1);
    if n_cols < config.min_cols {
        return None;
    }

    let mut rows = Vec::with_capacity(region.len());
    for row in region {
        let mut cells = vec![String::new(); n_cols];
        for run in row {
            let col = column_index(center_x(run), &boundaries);
            let cell = &mut cells[col.min(n_cols - 1)];
            if !cell.is_empty() {
                cell.push(' ');
            }
            cell.push_str(run.text.trim());
        }
        rows.push(cells);
    }

    let bbox = region
        .iter()
        .flatten()
        .map(|r| r.bbox)
        .reduce(|a, b| a.union(&b))?;
    if is_prose(region, &bbox, config.max_cell_width_ratio) {
        debug!("Dropping {}x{} region of running text", rows.len(), n_cols);
        return None;
    }
    Some((rows, bbox))
}

fn is_prose(region: &[Vec<&TextRun>], bbox: &Rect, max_ratio: f32) -> bool {
    let mut widths: Vec<f32> = region.iter().flatten().map(|r| r.bbox.width()).collect();
    if widths.is_empty() || bbox.width() <= 0.0 {
        return false;
    }
    widths.sort_by(|a, b| by_f32(*a, *b));
    widths[widths.len() / 2] > bbox.width() * max_ratio
}

fn column_boundaries(region: &[Vec<&TextRun>], tolerance: f32) -> Vec<f32> {
    let mut lefts: Vec<f32> = region.iter().flatten().map(|r| r.bbox.x0).collect();
    lefts.sort_by(|a, b| by_f32(*a, *b));
    let Some(&first) = lefts.first() else {
        return Vec::new();
    };

    let mut boundaries = vec![first];
    for &x in &lefts[1..] {
        if boundaries.last().is_some_and(|&last| x - last > tolerance) {
            boundaries.push(x);
        }
    }
    if let Some(max_right) = region.iter().flatten().map(|r| r.bbox.x1).max_by(|a, b| by_f32(*a, *b)) {
        boundaries.push(max_right);
    }
    boundaries
}

fn column_index(x: f32, boundaries: &[f32]) -> usize {
    boundaries
        .windows(2)
        .position(|w| x >= w[0] && x < w[1])
        .unwrap_or(boundaries.len().saturating_sub(2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str, x: f32, y: f32, w: f32) -> TextRun {
        TextRun {
            text: text.to_string(),
            bbox: Rect::new(x, y, x + w, y + 10.0),
        }
    }

    fn grid() -> Vec<TextRun> {
        vec![
            run("Name", 100.0, 100.0, 40.0),
            run("Age", 200.0, 100.0, 30.0),
            run("City", 300.0, 100.0, 40.0),
            run("Alice", 100.0, 120.0, 40.0),
            run("30", 200.0, 121.0, 20.0),
            run("New York", 300.0, 120.0, 60.0),
            run("Bob", 100.0, 140.0, 30.0),
            run("25", 201.0, 140.0, 20.0),
            run("Boston", 300.0, 139.0, 50.0),
        ]
    }

    #[test]
    fn detects_three_by_three_grid() {
        let tables = detect_tables(&grid(), &TableDetectorConfig::default());
        assert_eq!(tables.len(), 1);
        let (rows, bbox) = &tables[0];
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], ["Name", "Age", "City"]);
        assert_eq!(rows[1], ["Alice", "30", "New York"]);
        assert_eq!(rows[2], ["Bob", "25", "Boston"]);
        assert_eq!(bbox.x0, 100.0);
        assert_eq!(bbox.x1, 360.0);
    }

    #[test]
    fn paragraph_lines_break_regions() {
        let mut runs = grid();
        runs.push(run("A long paragraph line follows the table.", 100.0, 200.0, 300.0));
        runs.push(run("x", 100.0, 220.0, 5.0));
        runs.push(run("y", 300.0, 220.0, 5.0));
        let tables = detect_tables(&runs, &TableDetectorConfig::default());
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].0.len(), 3);
    }

    #[test]
    fn two_column_body_text_is_not_a_table() {
        let runs: Vec<TextRun> = (0..30)
            .flat_map(|i| {
                let y = 60.0 + 12.0 * i as f32;
                [
                    run("left column body text line", 50.0, y, 240.0),
                    run("right column body text line", 310.0, y, 240.0),
                ]
            })
            .collect();
        assert!(detect_tables(&runs, &TableDetectorConfig::default()).is_empty());
    }

    #[test]
    fn too_few_runs_yield_nothing() {
        let runs = vec![run("a", 0.0, 0.0, 5.0), run("b", 50.0, 0.0, 5.0)];
        assert!(detect_tables(&runs, &TableDetectorConfig::default()).is_empty());
    }

    #[test]
    fn column_index_clamps_to_last() {
        let b = [0.0, 10.0, 20.0];
        assert_eq!(column_index(5.0, &b), 0);
        assert_eq!(column_index(15.0, &b), 1);
        assert_eq!(column_index(25.0, &b), 1);
    }
}
