//! 没有可用文本层时的 OCR 回退
//!
//! 用 PDFium 渲染页面，再用 Tesseract 命令行识别。

mod engine;
mod tesseract;
mod types;

pub use engine::{words_to_text, OcrEngine};
pub use tesseract::{get_tesseract_version, parse_tesseract_tsv, TesseractEngine};
pub use types::{OcrConfig, OcrWord, TesseractConfig};

use image::DynamicImage;
use pdfium_render::prelude::Pdfium;
use std::time::Duration;
use thiserror::Error;

use crate::pdf::pdfium::{bind_pdfium, render_each_page};
use crate::pdf::PdfError;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    #[error("OCR failed: {0}")]
    Failed(String),

    #[error("OCR timed out after {0} s")]
    Timeout(u64),

    #[error("Page rendering failed: {0}")]
    Render(#[from] PdfError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 从文档原始字节中恢复文本
pub trait OcrProvider {
    fn extract_text(&self, file_bytes: &[u8]) -> Result<String, OcrError>;
}

/// 逐页生成页面图片
pub trait PageRenderer {
    /// 按顺序对每页图片调用 `visit`，返回页数。
    /// `visit` 返回错误时停止渲染。
    fn render_each(
        &self,
        bytes: &[u8],
        dpi: u32,
        visit: &mut dyn FnMut(usize, DynamicImage) -> Result<(), OcrError>,
    ) -> Result<usize, OcrError>;
}

impl PageRenderer for Pdfium {
    fn render_each(
        &self,
        bytes: &[u8],
        dpi: u32,
        visit: &mut dyn FnMut(usize, DynamicImage) -> Result<(), OcrError>,
    ) -> Result<usize, OcrError> {
        render_each_page(self, bytes, dpi, |index, image| visit(index, image))
    }
}

/// 渲染每一页并交给 OCR 引擎识别，同一时间只保留一页图片。
pub struct PdfRenderOcr<R: PageRenderer, E: OcrEngine> {
    renderer: R,
    engine: E,
    dpi: u32,
}

impl<R: PageRenderer, E: OcrEngine> PdfRenderOcr<R, E> {
    pub fn new(renderer: R, engine: E, dpi: u32) -> Self {
        Self { renderer, engine, dpi }
    }
}

impl<R: PageRenderer, E: OcrEngine> OcrProvider for PdfRenderOcr<R, E> {
    fn extract_text(&self, file_bytes: &[u8]) -> Result<String, OcrError> {
        log::info!("[OCR] 以 {} dpi 识别页面", self.dpi);

        let mut pages = Vec::new();
        let count = self.renderer.render_each(file_bytes, self.dpi, &mut |index, image| {
            match self.engine.extract_text(&image) {
                Ok(text) => pages.push(text),
                Err(OcrError::Timeout(secs)) => return Err(OcrError::Timeout(secs)),
                Err(e) => log::warn!("[OCR] 跳过第 {} 页: {}", index + 1, e),
            }
            Ok(())
        })?;

        let text = pages
            .into_iter()
            .filter(|t| !t.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        log::info!("[OCR] 从 {1} 页中识别出 {0} 个字符", text.chars().count(), count);
        Ok(text)
    }
}

/// 按配置构建 OCR，禁用或缺少 PDFium、Tesseract 时返回 `None`
pub fn build_ocr(config: &OcrConfig) -> Option<Box<dyn OcrProvider>> {
    if !config.enabled {
        log::info!("[OCR] 已禁用");
        return None;
    }

    let pdfium = match bind_pdfium() {
        Ok(pdfium) => pdfium,
        Err(e) => {
            log::warn!("[OCR] 不可用，无法渲染页面: {}", e);
            return None;
        }
    };

    match TesseractEngine::new(
        config.tesseract.clone(),
        Duration::from_secs(config.timeout_secs),
    ) {
        Ok(engine) => Some(Box::new(PdfRenderOcr::new(pdfium, engine, config.dpi))),
        Err(e) => {
            log::warn!("[OCR] 不可用: {}", e);
            None
        }
    }
}
