//! 文本后端：页面文本提取和字面搜索
//!
//! 优先使用结果最准确的 PDFium。lopdf 版面后端不依赖原生库，
//! 在无法加载 PDFium 时使用。

use highlight_core::Rectangle;
use lopdf::{Document, ObjectId};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::layout::{page_layout, PageLayout};
use super::pdfium::PdfiumBackend;
use super::PdfError;

/// 批量搜索中单个查询的命中
pub type QueryResult = Result<Vec<Rectangle>, PdfError>;

pub trait TextBackend {
    fn name(&self) -> &'static str;

    /// 为重复的页面查询准备文档，每个文档在读取任何页面前调用一次
    fn open<'s>(&'s self, bytes: &[u8]) -> Result<Box<dyn PageSource + 's>, PdfError>;
}

/// 已打开文档的页面访问，`document` 是同一份字节解析出的对象图
pub trait PageSource {
    /// 单页纯文本（索引从 0 开始）
    fn page_text(&self, document: &Document, page_index: usize) -> Result<String, PdfError>;

    /// 在单页上对多个查询做区分大小写的字面搜索。
    ///
    /// 每个查询按顺序返回一项，每项最多 `max_hits` 个命中。
    fn search_page(
        &self,
        document: &Document,
        page_index: usize,
        queries: &[&str],
        max_hits: usize,
    ) -> Result<Vec<QueryResult>, PdfError>;
}

fn page_id(document: &Document, page_index: usize) -> Result<ObjectId, PdfError> {
    document
        .get_pages()
        .values()
        .nth(page_index)
        .copied()
        .ok_or(PdfError::PageNotFound(page_index))
}

/// 基于内容流版面的后端
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfBackend;

impl TextBackend for LopdfBackend {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn open<'s>(&'s self, _bytes: &[u8]) -> Result<Box<dyn PageSource + 's>, PdfError> {
        Ok(Box::<LayoutPages>::default())
    }
}

/// 单个文档的页面版面，首次使用时构建
#[derive(Default)]
pub struct LayoutPages {
    layouts: RefCell<HashMap<usize, PageLayout>>,
}

impl LayoutPages {
    fn with_layout<T>(
        &self,
        document: &Document,
        page_index: usize,
        read: impl FnOnce(&PageLayout) -> T,
    ) -> Result<T, PdfError> {
        let mut layouts = self.layouts.borrow_mut();
        if let Some(layout) = layouts.get(&page_index) {
            return Ok(read(layout));
        }
        let layout = page_layout(document, page_id(document, page_index)?)?;
        let value = read(&layout);
        layouts.insert(page_index, layout);
        Ok(value)
    }

    /// 已完成版面计算的页数
    pub fn cached_pages(&self) -> usize {
        self.layouts.borrow().len()
    }
}

impl PageSource for LayoutPages {
    fn page_text(&self, document: &Document, page_index: usize) -> Result<String, PdfError> {
        self.with_layout(document, page_index, PageLayout::text)
    }

    fn search_page(
        &self,
        document: &Document,
        page_index: usize,
        queries: &[&str],
        max_hits: usize,
    ) -> Result<Vec<QueryResult>, PdfError> {
        self.with_layout(document, page_index, |layout| {
            queries
                .iter()
                .map(|query| Ok(layout.find(query, max_hits)))
                .collect()
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// 能加载 PDFium 时使用 PDFium，否则使用 lopdf
    #[default]
    Auto,
    Pdfium,
    Lopdf,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Auto => "auto",
            BackendKind::Pdfium => "pdfium",
            BackendKind::Lopdf => "lopdf",
        })
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(BackendKind::Auto),
            "pdfium" => Ok(BackendKind::Pdfium),
            "lopdf" => Ok(BackendKind::Lopdf),
            other => Err(format!("unknown text backend '{}' (expected auto, pdfium or lopdf)", other)),
        }
    }
}

/// 构建指定的后端，`Auto` 不会失败
pub fn select_backend(kind: BackendKind) -> Result<Box<dyn TextBackend>, PdfError> {
    match kind {
        BackendKind::Lopdf => Ok(Box::new(LopdfBackend)),
        BackendKind::Pdfium => Ok(Box::new(PdfiumBackend::bind()?)),
        BackendKind::Auto => match PdfiumBackend::bind() {
            Ok(backend) => Ok(Box::new(backend)),
            Err(e) => {
                log::warn!("[Backend] {}，回退到 lopdf 文本版面", e);
                Ok(Box::new(LopdfBackend))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::test_support::{build_pdf, PageSpec};

    #[test]
    fn test_lopdf_backend_text_and_search() {
        let bytes = build_pdf(&[
            PageSpec::lines(&["Cover page"]),
            PageSpec::lines(&["Acme Inc", "Globex"]),
        ]);
        let document = Document::load_mem(&bytes).unwrap();
        let pages = LopdfBackend.open(&bytes).unwrap();

        assert_eq!(pages.page_text(&document, 1).unwrap(), "Acme Inc\nGlobex");

        let results = pages
            .search_page(&document, 1, &["Globex", "Initech"], 10)
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().len(), 1);
        assert!(results[1].as_ref().unwrap().is_empty());

        assert!(matches!(
            pages.page_text(&document, 5),
            Err(PdfError::PageNotFound(5))
        ));
    }

    #[test]
    fn test_layouts_are_built_once_per_page() {
        let bytes = build_pdf(&[PageSpec::lines(&["Acme Inc"]), PageSpec::lines(&["Globex"])]);
        let document = Document::load_mem(&bytes).unwrap();
        let pages = LayoutPages::default();

        for query in ["Acme Inc", "ACME INC", "acme inc"] {
            pages.search_page(&document, 0, &[query], 10).unwrap();
        }
        assert_eq!(pages.page_text(&document, 0).unwrap(), "Acme Inc");
        assert_eq!(pages.cached_pages(), 1);

        pages.page_text(&document, 1).unwrap();
        assert_eq!(pages.cached_pages(), 2);
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("PDFium".parse::<BackendKind>().unwrap(), BackendKind::Pdfium);
        assert_eq!(" lopdf ".parse::<BackendKind>().unwrap(), BackendKind::Lopdf);
        assert!("mupdf".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::default().to_string(), "auto");
    }

    #[test]
    fn test_select_lopdf() {
        assert_eq!(select_backend(BackendKind::Lopdf).unwrap().name(), "lopdf");
    }
}
