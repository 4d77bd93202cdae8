//! 挑选待高亮短语的语言模型接口

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("No API key configured")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Oracle returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Oracle response has no message content")]
    EmptyResponse,
}

/// 针对文档文本回答指令，返回未解析的原始文本
pub trait Oracle {
    fn classify(&self, instruction: &str, document_text: &str) -> Result<String, OracleError>;
}

/// 每次请求发送的唯一一条用户消息
pub fn build_prompt(instruction: &str, document_text: &str) -> String {
    format!(
        "You are a document analysis agent. The user wants certain text highlighted in a PDF.\n\
         Instruction: {instruction}\n\
         Based on the PDF content below, list exact phrases or headings to highlight.\n\
         Return only a JSON list of strings to highlight, like [\"Education\", \"Experience\", \"Skills\"].\n\
         PDF Content:\n\
         {document_text}"
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OracleConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI 兼容的 `chat/completions` 客户端。温度固定为 0，
/// 失败不重试。
pub struct ChatCompletionsOracle {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ChatCompletionsOracle {
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(OracleError::MissingApiKey)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Oracle for ChatCompletionsOracle {
    fn classify(&self, instruction: &str, document_text: &str) -> Result<String, OracleError> {
        let prompt = build_prompt(instruction, document_text);
        let body = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: [ChatMessage {
                role: "user",
                content: &prompt,
            }],
        };

        let started = Instant::now();
        log::info!(
            "[Oracle] 请求 {}（提示词 {} 个字符）",
            self.model,
            prompt.chars().count()
        );
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            log::warn!("[Oracle] 请求失败，状态 {}: {}", status, body);
            return Err(OracleError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = resp.json()?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(OracleError::EmptyResponse)?;

        log::info!(
            "[Oracle] {} ms 内返回（{} 个字符）",
            started.elapsed().as_millis(),
            content.chars().count()
        );
        log::debug!("[Oracle] 原始回答: {}", content);
        Ok(content)
    }
}
