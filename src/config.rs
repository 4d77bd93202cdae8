use highlight_core::{AnnotationKind, AnnotationStyle, Opacity, Palette};
use highlight_text::DEFAULT_MAX_CHARS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ocr::OcrConfig;
use crate::oracle::OracleConfig;
use crate::pdf::BackendKind;
use crate::pipeline::PipelineConfig;

/// 未指定路径时读取的配置文件
pub const DEFAULT_CONFIG_FILE: &str = "highlighter.json";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub oracle: OracleConfig,
    pub highlight: HighlightConfig,
    pub pipeline: PipelineSection,
    pub ocr: OcrConfig,
    /// 文本提取与搜索后端
    pub backend: BackendKind,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, rename_all = "camelCase")]
pub struct HighlightConfig {
    pub color: Palette,
    /// 构建流水线配置时校验
    pub opacity: f32,
    pub kind: AnnotationKind,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            color: Palette::default(),
            opacity: Opacity::default().value(),
            kind: AnnotationKind::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineSection {
    pub max_text_chars: usize,
    pub focus_section: bool,
    pub max_hits_per_page: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_text_chars: DEFAULT_MAX_CHARS,
            focus_section: false,
            max_hits_per_page: highlight_core::DEFAULT_MAX_HITS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

fn invalid(key: &'static str, message: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        key,
        message: message.to_string(),
    }
}

impl AppConfig {
    /// 读取 `path`，未指定时读取工作目录下的 `highlighter.json`。
    /// 默认文件不存在时使用默认配置。
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        if !path.exists() {
            if explicit {
                return Err(ConfigError::NotFound(path));
            }
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)?;
        let config = serde_json::from_str(&raw)?;
        log::info!("[Config] 已加载 {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// 应用 `HIGHLIGHTER_*` 环境变量覆盖
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("HIGHLIGHTER_API_KEY").or_else(|| get("GROQ_API_KEY")) {
            self.oracle.api_key = Some(key);
        }
        if let Some(url) = get("HIGHLIGHTER_BASE_URL") {
            self.oracle.base_url = url;
        }
        if let Some(model) = get("HIGHLIGHTER_MODEL") {
            self.oracle.model = model;
        }
        if let Some(color) = get("HIGHLIGHTER_COLOR") {
            self.highlight.color = color
                .parse()
                .map_err(|e| invalid("HIGHLIGHTER_COLOR", e))?;
        }
        if let Some(opacity) = get("HIGHLIGHTER_OPACITY") {
            self.highlight.opacity = opacity
                .trim()
                .parse()
                .map_err(|e| invalid("HIGHLIGHTER_OPACITY", e))?;
        }
        if let Some(dpi) = get("HIGHLIGHTER_OCR_DPI") {
            self.ocr.dpi = dpi
                .trim()
                .parse()
                .map_err(|e| invalid("HIGHLIGHTER_OCR_DPI", e))?;
        }
        Ok(())
    }

    /// 校验后的 `DocumentPipeline::new` 配置
    pub fn pipeline_config(&self) -> Result<PipelineConfig, ConfigError> {
        let opacity = Opacity::new(self.highlight.opacity).map_err(|e| invalid("highlight.opacity", e))?;
        if !opacity.is_recommended() {
            log::warn!(
                "[Config] 透明度 {} 超出推荐范围 {:?}",
                opacity.value(),
                Opacity::RECOMMENDED
            );
        }
        if self.pipeline.max_text_chars == 0 {
            return Err(invalid("pipeline.maxTextChars", "must be positive"));
        }
        if self.pipeline.max_hits_per_page == 0 {
            return Err(invalid("pipeline.maxHitsPerPage", "must be positive"));
        }
        if self.ocr.dpi == 0 {
            return Err(invalid("ocr.dpi", "must be positive"));
        }

        Ok(PipelineConfig {
            style: AnnotationStyle {
                color: self.highlight.color,
                opacity,
                kind: self.highlight.kind,
            },
            max_text_chars: self.pipeline.max_text_chars,
            focus_section: self.pipeline.focus_section,
            max_hits_per_page: self.pipeline.max_hits_per_page,
        })
    }

    /// 可安全打印的副本，API key 已遮盖
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.oracle.api_key.is_some() {
            copy.oracle.api_key = Some("***".to_string());
        }
        copy
    }
}
