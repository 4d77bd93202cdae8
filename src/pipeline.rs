//! 上传文档的端到端处理。
//!
//! 每个文档依次经过 `Loaded → TextExtracted → (OcrFallback) →
//! OracleQueried → TargetsNormalized → Annotated → Saved`。任何终止性失败
//! 只结束当前文档，批次中其余文档照常处理。

use highlight_core::{AnnotationStyle, Document as _, TextLocator, DEFAULT_MAX_HITS};
use highlight_text::{prepare_oracle_text, OutputNormalizer, DEFAULT_MAX_CHARS};
use std::fmt;
use thiserror::Error;

use crate::ocr::OcrProvider;
use crate::oracle::Oracle;
use crate::pdf::{AnnotationPlacer, PdfDocument, Placement, TextBackend};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    Input(&'static str),
}

/// 单次运行的设置，本次所有文档共用
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub style: AnnotationStyle,
    /// 模型文本的字符上限
    pub max_text_chars: usize,
    /// 只把工作经历部分交给模型
    pub focus_section: bool,
    pub max_hits_per_page: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            style: AnnotationStyle::default(),
            max_text_chars: DEFAULT_MAX_CHARS,
            focus_section: false,
            max_hits_per_page: DEFAULT_MAX_HITS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Loaded,
    TextExtracted,
    OcrFallback,
    OracleQueried,
    TargetsNormalized,
    Annotated,
    Saved,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Loaded => "loaded",
            Stage::TextExtracted => "text extracted",
            Stage::OcrFallback => "ocr fallback",
            Stage::OracleQueried => "oracle queried",
            Stage::TargetsNormalized => "targets normalized",
            Stage::Annotated => "annotated",
            Stage::Saved => "saved",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    pub text: String,
    pub occurrences: usize,
}

/// 处理成功的文档
#[derive(Debug, Clone)]
pub struct HighlightedDocument {
    pub name: String,
    /// `highlighted_{name}`
    pub output_name: String,
    pub bytes: Vec<u8>,
    pub targets: Vec<TargetReport>,
    /// 以注释对象写入的放置数
    pub annotations: usize,
    /// 绘制到页面内容中的放置数
    pub content_draws: usize,
    /// 两种方式都失败的放置数
    pub skipped: usize,
    pub used_ocr: bool,
}

#[derive(Debug, Clone)]
pub enum DocumentOutcome {
    Saved(HighlightedDocument),
    /// 字节不是可读的 PDF
    Unreadable(String),
    /// 文本层和 OCR 都没有得到文本
    NoUsableText,
    OracleUnavailable(String),
    NoTargetsFound,
    /// 已放置高亮，但无法写出结果
    SaveFailed(String),
}

impl DocumentOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, DocumentOutcome::Saved(_))
    }
}

impl fmt::Display for DocumentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentOutcome::Saved(doc) => {
                write!(
                    f,
                    "saved as {} ({} targets, {} annotations",
                    doc.output_name,
                    doc.targets.len(),
                    doc.annotations
                )?;
                if doc.content_draws > 0 {
                    write!(f, ", {} painted", doc.content_draws)?;
                }
                if doc.skipped > 0 {
                    write!(f, ", {} skipped", doc.skipped)?;
                }
                if doc.used_ocr {
                    write!(f, ", via OCR")?;
                }
                write!(f, ")")
            }
            DocumentOutcome::Unreadable(e) => write!(f, "unreadable: {}", e),
            DocumentOutcome::NoUsableText => write!(f, "no usable text"),
            DocumentOutcome::OracleUnavailable(e) => write!(f, "oracle unavailable: {}", e),
            DocumentOutcome::NoTargetsFound => write!(f, "no targets found"),
            DocumentOutcome::SaveFailed(e) => write!(f, "save failed: {}", e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentReport {
    pub name: String,
    pub outcome: DocumentOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub documents: Vec<DocumentReport>,
}

impl BatchReport {
    pub fn saved(&self) -> impl Iterator<Item = &HighlightedDocument> {
        self.documents.iter().filter_map(|report| match &report.outcome {
            DocumentOutcome::Saved(doc) => Some(doc),
            _ => None,
        })
    }

    pub fn saved_count(&self) -> usize {
        self.saved().count()
    }
}

pub struct DocumentPipeline {
    config: PipelineConfig,
    backend: Box<dyn TextBackend>,
    oracle: Box<dyn Oracle>,
    ocr: Option<Box<dyn OcrProvider>>,
    normalizer: OutputNormalizer,
    locator: TextLocator,
    placer: AnnotationPlacer,
}

impl DocumentPipeline {
    pub fn new(
        config: PipelineConfig,
        backend: Box<dyn TextBackend>,
        oracle: Box<dyn Oracle>,
        ocr: Option<Box<dyn OcrProvider>>,
    ) -> Self {
        let locator = TextLocator::new(config.max_hits_per_page);
        Self {
            config,
            backend,
            oracle,
            ocr,
            normalizer: OutputNormalizer::default(),
            locator,
            placer: AnnotationPlacer::default(),
        }
    }

    /// 按顺序处理所有文档。输入问题在处理任何文档之前报告。
    pub fn process_batch(
        &self,
        inputs: Vec<(String, Vec<u8>)>,
        instruction: &str,
    ) -> Result<BatchReport, PipelineError> {
        if inputs.is_empty() {
            return Err(PipelineError::Input("no documents supplied"));
        }
        if instruction.trim().is_empty() {
            return Err(PipelineError::Input("instruction is blank"));
        }

        log::info!(
            "[Pipeline] {} 个文档，后端 {}，样式 {} {}，透明度 {}",
            inputs.len(),
            self.backend.name(),
            self.config.style.color,
            self.config.style.kind,
            self.config.style.opacity.value()
        );

        let mut report = BatchReport::default();
        for (name, bytes) in inputs {
            let outcome = self.process(&name, bytes, instruction);
            match &outcome {
                DocumentOutcome::Saved(_) => log::info!("[Pipeline] {}: {}", name, outcome),
                _ => log::warn!("[Pipeline] {}: {}", name, outcome),
            }
            report.documents.push(DocumentReport { name, outcome });
        }
        Ok(report)
    }

    /// 把单个文档处理到终止状态
    pub fn process(&self, name: &str, bytes: Vec<u8>, instruction: &str) -> DocumentOutcome {
        let mut doc = match PdfDocument::load(bytes, self.backend.as_ref()) {
            Ok(doc) => doc,
            Err(e) => return DocumentOutcome::Unreadable(e.to_string()),
        };
        self.stage(name, Stage::Loaded);

        let text = doc
            .get_pages()
            .into_iter()
            .map(|page| page.content)
            .filter(|content| !content.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        self.stage(name, Stage::TextExtracted);

        let mut used_ocr = false;
        let text = if text.trim().is_empty() {
            self.stage(name, Stage::OcrFallback);
            used_ocr = true;
            match self.ocr_text(name, &doc) {
                Some(text) => text,
                None => return DocumentOutcome::NoUsableText,
            }
        } else {
            text
        };

        let oracle_text = prepare_oracle_text(
            &text,
            self.config.focus_section,
            self.config.max_text_chars,
        );
        let raw = match self.oracle.classify(instruction, &oracle_text) {
            Ok(raw) => raw,
            Err(e) => return DocumentOutcome::OracleUnavailable(e.to_string()),
        };
        self.stage(name, Stage::OracleQueried);

        let targets = self.normalizer.normalize(&raw);
        if targets.is_empty() {
            return DocumentOutcome::NoTargetsFound;
        }
        self.stage(name, Stage::TargetsNormalized);
        log::info!("[Pipeline] {}: 目标 {:?}", name, targets);

        let style = self.config.style;
        let mut reports = Vec::with_capacity(targets.len());
        let (mut annotations, mut content_draws, mut skipped) = (0, 0, 0);

        for target in targets {
            let occurrences = self.locator.locate(&doc, &target);
            for occurrence in &occurrences {
                match self
                    .placer
                    .place(&mut doc, occurrence.page_index, &occurrence.rect, &style)
                {
                    Ok(Placement::Annotation(_)) => annotations += 1,
                    Ok(Placement::ContentStream) => content_draws += 1,
                    Err(e) => {
                        skipped += 1;
                        log::warn!(
                            "[Pipeline] {}: 跳过 {:?} 在第 {} 页的放置: {}",
                            name,
                            target,
                            occurrence.page_index + 1,
                            e
                        );
                    }
                }
            }
            reports.push(TargetReport {
                text: target,
                occurrences: occurrences.len(),
            });
        }
        self.stage(name, Stage::Annotated);

        let bytes = match doc.save() {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("[Pipeline] {}: 保存失败: {}", name, e);
                return DocumentOutcome::SaveFailed(e.to_string());
            }
        };
        self.stage(name, Stage::Saved);

        DocumentOutcome::Saved(HighlightedDocument {
            name: name.to_string(),
            output_name: output_name(name),
            bytes,
            targets: reports,
            annotations,
            content_draws,
            skipped,
            used_ocr,
        })
    }

    fn ocr_text(&self, name: &str, doc: &PdfDocument) -> Option<String> {
        let Some(ocr) = &self.ocr else {
            log::info!("[Pipeline] {}: 没有文本层且未配置 OCR", name);
            return None;
        };
        match ocr.extract_text(doc.original_bytes()) {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                log::warn!("[Pipeline] {}: OCR 失败: {}", name, e);
                None
            }
        }
    }

    fn stage(&self, name: &str, stage: Stage) {
        log::debug!("[Pipeline] {}: {}", name, stage);
    }
}

/// 处理后的输出文件名
pub fn output_name(name: &str) -> String {
    format!("highlighted_{}", name)
}
