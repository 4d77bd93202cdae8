//! PDFium 绑定、文本搜索和页面渲染

use highlight_core::Rectangle;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;

use super::backend::{PageSource, QueryResult, TextBackend};
use super::PdfError;

/// 用单个目录覆盖库搜索路径
pub const PDFIUM_DIR_ENV: &str = "HIGHLIGHTER_PDFIUM_DIR";

/// 按顺序搜索 PDFium 动态库的目录
fn get_pdfium_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(dir) = std::env::var(PDFIUM_DIR_ENV) {
        paths.push(PathBuf::from(dir));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            paths.push(exe_dir.join("libs"));
            paths.push(exe_dir.to_path_buf());

            #[cfg(target_os = "macos")]
            {
                if let Some(contents_dir) = exe_dir.parent() {
                    paths.push(contents_dir.join("Resources").join("libs"));
                }
            }
        }
    }

    paths.push(PathBuf::from("libs"));
    paths.push(PathBuf::from("./"));
    paths
}

/// 先从搜索路径加载 PDFium，再尝试系统库路径
pub fn bind_pdfium() -> Result<Pdfium, PdfError> {
    for path in get_pdfium_search_paths() {
        let lib_path = Pdfium::pdfium_platform_library_name_at_path(&path);
        log::debug!("[Pdfium] 尝试 {:?}", lib_path);

        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            log::info!("[Pdfium] 已从 {:?} 加载", path);
            return Ok(Pdfium::new(bindings));
        }
    }

    log::debug!("[Pdfium] 尝试系统库");
    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| PdfError::PdfiumUnavailable(e.to_string()))
}

fn pdfium_error(context: &str, e: PdfiumError) -> PdfError {
    PdfError::Pdfium(format!("{}: {}", context, e))
}

fn page_number(page_index: usize) -> Result<u16, PdfError> {
    u16::try_from(page_index).map_err(|_| PdfError::PageNotFound(page_index))
}

pub struct PdfiumBackend {
    pdfium: Pdfium,
}

impl PdfiumBackend {
    pub fn bind() -> Result<Self, PdfError> {
        Ok(Self {
            pdfium: bind_pdfium()?,
        })
    }
}

impl TextBackend for PdfiumBackend {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    fn open<'s>(&'s self, bytes: &[u8]) -> Result<Box<dyn PageSource + 's>, PdfError> {
        let document = self
            .pdfium
            .load_pdf_from_byte_vec(bytes.to_vec(), None)
            .map_err(|e| pdfium_error("failed to load document", e))?;
        log::debug!("[Pdfium] 已打开文档，共 {} 页", document.pages().len());
        Ok(Box::new(PdfiumPages { document }))
    }
}

/// 在一次流水线运行期间加载到 PDFium 中的文档
struct PdfiumPages<'s> {
    document: PdfDocument<'s>,
}

impl PdfiumPages<'_> {
    fn page(&self, page_index: usize) -> Result<PdfPage<'_>, PdfError> {
        self.document
            .pages()
            .get(page_number(page_index)?)
            .map_err(|_| PdfError::PageNotFound(page_index))
    }
}

impl PageSource for PdfiumPages<'_> {
    fn page_text(&self, _document: &lopdf::Document, page_index: usize) -> Result<String, PdfError> {
        let page = self.page(page_index)?;
        let text = page
            .text()
            .map_err(|e| pdfium_error("failed to read page text", e))?;
        Ok(text.all())
    }

    fn search_page(
        &self,
        _document: &lopdf::Document,
        page_index: usize,
        queries: &[&str],
        max_hits: usize,
    ) -> Result<Vec<QueryResult>, PdfError> {
        let page = self.page(page_index)?;
        let text = page
            .text()
            .map_err(|e| pdfium_error("failed to read page text", e))?;
        let options = PdfSearchOptions::new().match_case(true);

        let results = queries
            .iter()
            .map(|query| {
                let search = text
                    .search(query, &options)
                    .map_err(|e| pdfium_error("search failed", e))?;

                let mut hits = Vec::new();
                'results: for segments in search.iter(PdfSearchDirection::SearchForward) {
                    for segment in segments.iter() {
                        if hits.len() >= max_hits {
                            break 'results;
                        }
                        let bounds = segment.bounds();
                        hits.push(Rectangle::new(
                            bounds.left().value,
                            bounds.top().value,
                            bounds.right().value,
                            bounds.bottom().value,
                        ));
                    }
                }
                Ok(hits)
            })
            .collect();
        Ok(results)
    }
}

/// 按页序以 `dpi` 逐页渲染，每张图片交给 `visit` 后才渲染下一页。
/// 返回页数。
pub fn render_each_page<E, F>(pdfium: &Pdfium, bytes: &[u8], dpi: u32, mut visit: F) -> Result<usize, E>
where
    E: From<PdfError>,
    F: FnMut(usize, DynamicImage) -> Result<(), E>,
{
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| pdfium_error("failed to load document", e))?;

    let scale = dpi as f32 / 72.0;
    let mut count = 0;
    for (index, page) in document.pages().iter().enumerate() {
        let target_width = (page.width().value * scale) as i32;
        let target_height = (page.height().value * scale) as i32;

        log::debug!(
            "[Pdfium] 第 {} 页: {}x{} px，{} dpi",
            index + 1,
            target_width,
            target_height,
            dpi
        );

        let render_config = PdfRenderConfig::new()
            .set_target_width(target_width)
            .set_target_height(target_height);

        let image = page
            .render_with_config(&render_config)
            .map_err(|e| pdfium_error("failed to render page", e))?
            .as_image();
        visit(index, image)?;
        count += 1;
    }
    Ok(count)
}
