//! OCR 共用类型

use serde::{Deserialize, Serialize};

/// 识别出的单词及其 Tesseract 版面位置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrWord {
    pub text: String,
    /// 0-1
    pub confidence: f32,
    pub block: u32,
    pub paragraph: u32,
    pub line: u32,
}

impl OcrWord {
    /// 键相同的单词属于同一文本行
    pub fn line_key(&self) -> (u32, u32, u32) {
        (self.block, self.paragraph, self.line)
    }
}

/// Tesseract 配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TesseractConfig {
    /// 可执行文件路径，未设置时使用 PATH 中的 `tesseract`
    pub binary_path: Option<String>,
    /// 作为 `TESSDATA_PREFIX` 导出
    pub tessdata_path: Option<String>,
    /// 例如 "eng" 或 "eng+deu"
    pub lang: Option<String>,
    /// 页面分割模式 (0-13)
    pub psm: Option<u8>,
    /// OCR 引擎模式 (0-3)
    pub oem: Option<u8>,
}

impl TesseractConfig {
    pub fn binary_or_default(&self) -> &str {
        self.binary_path.as_deref().unwrap_or("tesseract")
    }

    pub fn lang_or_default(&self) -> &str {
        self.lang.as_deref().unwrap_or("eng")
    }

    pub fn psm_or_default(&self) -> u8 {
        self.psm.unwrap_or(3)
    }

    pub fn oem_or_default(&self) -> u8 {
        self.oem.unwrap_or(1)
    }
}

/// OCR 回退设置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OcrConfig {
    pub enabled: bool,
    /// 页面图片渲染分辨率
    pub dpi: u32,
    /// 单次 Tesseract 调用
    pub timeout_secs: u64,
    pub tesseract: TesseractConfig,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dpi: 300,
            timeout_secs: 60,
            tesseract: TesseractConfig::default(),
        }
    }
}
