//! PDF 高亮：请语言模型根据指令挑出需要标记的短语，在文档中定位，
//! 并以增量更新的方式追加半透明注释。

pub mod config;
pub mod ocr;
pub mod oracle;
pub mod pdf;
pub mod pipeline;

pub use config::{AppConfig, ConfigError};
pub use oracle::{ChatCompletionsOracle, Oracle, OracleConfig, OracleError};
pub use pdf::{select_backend, AnnotationPlacer, BackendKind, LopdfBackend, PdfDocument, PdfError, TextBackend};
pub use pipeline::{
    output_name, BatchReport, DocumentOutcome, DocumentPipeline, DocumentReport, HighlightedDocument,
    PipelineConfig, PipelineError, Stage, TargetReport,
};
