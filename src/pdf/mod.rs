//! PDF 文档：加载、通过后端读取文本、放置注释和增量保存

pub mod annotations;
pub mod backend;
pub mod layout;
pub mod overlay;
pub mod pdfium;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

pub use annotations::{AnnotationPlacer, Placement};
pub use backend::{select_backend, BackendKind, LopdfBackend, PageSource, TextBackend};

use highlight_core::{CoreError, QueryHits, Rectangle};
use lopdf::{Document, IncrementalDocument, Object, ObjectId};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("PDF parse error: {0}")]
    Lopdf(#[from] lopdf::Error),

    #[error("PDFium error: {0}")]
    Pdfium(String),

    #[error("PDFium library not available: {0}")]
    PdfiumUnavailable(String),

    #[error("Page {0} not found")]
    PageNotFound(usize),

    #[error("Content stream error: {0}")]
    Content(String),

    #[error("Rectangle rejected: {0}")]
    Rejected(String),

    #[error("Encrypted document: {0}")]
    Encrypted(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 查找加密字典时在文件首尾各扫描的字节数
const TRAILER_SCAN_BYTES: usize = 4096;

fn mentions_encryption(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(TRAILER_SCAN_BYTES)];
    let tail = &bytes[bytes.len().saturating_sub(TRAILER_SCAN_BYTES)..];
    [head, tail]
        .iter()
        .any(|part| part.windows(8).any(|w| w == b"/Encrypt"))
}

/// 为高亮打开的 PDF。
///
/// 原始版本保持不变，所有修改都写入保存时追加的增量更新。
pub struct PdfDocument<'b> {
    bytes: Vec<u8>,
    inner: IncrementalDocument,
    decrypted: Option<Document>,
    page_ids: Vec<ObjectId>,
    pages: Box<dyn PageSource + 'b>,
    encrypted: bool,
    writable: bool,
    pub(crate) wrapped_pages: HashSet<ObjectId>,
    placements: usize,
}

impl<'b> PdfDocument<'b> {
    pub fn load(bytes: Vec<u8>, backend: &'b dyn TextBackend) -> Result<Self, PdfError> {
        let prev = Document::load_mem(&bytes)?;
        let trailer_encrypted = prev.trailer.has(b"Encrypt");
        let encrypted = trailer_encrypted || mentions_encryption(&bytes);

        // trailer 中丢失 /Encrypt 的加密文件无法写入阅读器能一致解密的更新
        let writable = !encrypted || trailer_encrypted;
        if !writable {
            log::warn!("[Document] 加密字典不可用，文档只读");
        }

        let decrypted = if trailer_encrypted {
            let mut copy = prev.clone();
            match copy.decrypt("") {
                Ok(()) => Some(copy),
                Err(e) => {
                    log::warn!("[Document] 无法用空密码解密: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let page_ids: Vec<ObjectId> = prev.get_pages().into_values().collect();
        let pages = backend.open(&bytes)?;
        let inner = IncrementalDocument::create_from(bytes.clone(), prev);

        log::info!(
            "[Document] 已加载 {} 页，{} 字节{}",
            page_ids.len(),
            bytes.len(),
            if encrypted { "，已加密" } else { "" }
        );

        Ok(Self {
            bytes,
            inner,
            decrypted,
            page_ids,
            pages,
            encrypted,
            writable,
            wrapped_pages: HashSet::new(),
            placements: 0,
        })
    }

    /// 用于读取页面文本和几何信息的文档
    pub fn reader(&self) -> &Document {
        self.decrypted
            .as_ref()
            .unwrap_or_else(|| self.inner.get_prev_documents())
    }

    /// 加载文档时的原始字节
    pub fn original_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn page_id(&self, index: usize) -> Result<ObjectId, PdfError> {
        self.page_ids
            .get(index)
            .copied()
            .ok_or(PdfError::PageNotFound(index))
    }

    /// 目前成功放置的对象数
    pub fn placements(&self) -> usize {
        self.placements
    }

    pub(crate) fn record_placement(&mut self) {
        self.placements += 1;
    }

    /// 正在构建的增量更新
    pub(crate) fn update(&mut self) -> &mut Document {
        &mut self.inner.new_document
    }

    /// 把 `id` 复制到增量更新中（只复制一次），返回其中的字典
    pub(crate) fn editable_dictionary(&mut self, id: ObjectId) -> Result<&mut lopdf::Dictionary, PdfError> {
        self.inner.opt_clone_object_to_new_document(id)?;
        Ok(self.inner.new_document.get_dictionary_mut(id)?)
    }

    /// 先在增量更新中解析 `obj`，再在原始版本中解析
    pub(crate) fn resolve<'a>(&'a self, obj: &'a Object) -> Option<&'a Object> {
        match obj {
            Object::Reference(id) => self
                .inner
                .new_document
                .get_object(*id)
                .ok()
                .or_else(|| self.inner.get_prev_documents().get_object(*id).ok()),
            other => Some(other),
        }
    }

    /// 没有放置任何对象时返回原始字节，否则返回原始字节加增量更新
    pub fn save(self) -> Result<Vec<u8>, PdfError> {
        if self.placements == 0 {
            log::info!("[Document] 没有放置任何对象，返回原始字节");
            return Ok(self.bytes);
        }
        let mut inner = self.inner;
        let mut out = Vec::with_capacity(self.bytes.len() + 4096);
        inner.save_to(&mut out)?;
        log::info!(
            "[Document] 已保存 {} 处放置，{} -> {} 字节",
            self.placements,
            self.bytes.len(),
            out.len()
        );
        Ok(out)
    }
}

impl<'b> highlight_core::Document for PdfDocument<'b> {
    fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn page_bounds(&self, index: usize) -> highlight_core::Result<Rectangle> {
        let page_id = self
            .page_id(index)
            .map_err(|_| CoreError::PageOutOfRange(index))?;
        Ok(utils::page_bounds(self.reader(), page_id))
    }

    fn page_text(&self, index: usize) -> highlight_core::Result<String> {
        if index >= self.page_ids.len() {
            return Err(CoreError::PageOutOfRange(index));
        }
        self.pages
            .page_text(self.reader(), index)
            .map_err(|e| CoreError::Extraction(e.to_string()))
    }

    fn search_page(
        &self,
        index: usize,
        queries: &[&str],
        max_hits: usize,
    ) -> highlight_core::Result<Vec<QueryHits>> {
        if index >= self.page_ids.len() {
            return Err(CoreError::PageOutOfRange(index));
        }
        let results = self
            .pages
            .search_page(self.reader(), index, queries, max_hits)
            .map_err(|e| CoreError::Search(e.to_string()))?;
        Ok(results
            .into_iter()
            .map(|hits| hits.map_err(|e| CoreError::Search(e.to_string())))
            .collect())
    }
}
