//! 高亮任务的核心类型：几何、样式、页面级文档接口和目标定位

pub mod document;
pub mod geometry;
pub mod locate;
pub mod style;

pub use document::{Document, Page, QueryHits};
pub use geometry::Rectangle;
pub use locate::{title_case, Occurrence, TextLocator, DEFAULT_MAX_HITS};
pub use style::{AnnotationKind, AnnotationStyle, Opacity, Palette, Rgb};

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("page index {0} out of range")]
    PageOutOfRange(usize),
    #[error("text extraction failed: {0}")]
    Extraction(String),
    #[error("search failed: {0}")]
    Search(String),
}
