//! Which pages get rendered.

use crate::config::FigurePages;
use crate::pipeline::captions::is_list_page;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderDecision {
    Render,
    /// No caption candidates on the page.
    NoCaptions,
    /// More candidates than the per-page limit: a figure list or index.
    ListPage,
}

impl RenderDecision {
    pub fn renders(self) -> bool {
        self == RenderDecision::Render
    }
}

/// `all` renders every page; `caption` renders pages with at least one
/// candidate unless the page looks like a list of captions.
pub fn select_page(figure_pages: FigurePages, caption_count: usize, max_captions_per_page: usize) -> RenderDecision {
    match figure_pages {
        FigurePages::All => RenderDecision::Render,
        FigurePages::Caption if caption_count == 0 => RenderDecision::NoCaptions,
        FigurePages::Caption if is_list_page(caption_count, max_captions_per_page) => RenderDecision::ListPage,
        FigurePages::Caption => RenderDecision::Render,
    }
}
