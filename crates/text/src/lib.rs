//! 与模型交互的文本处理：整理发送给模型的文档文本，
//! 并规范化模型返回的松散结构答案。

pub mod literal;
pub mod normalize;
pub mod section;

pub use normalize::{normalize, OutputNormalizer, ParseStep};
pub use section::{narrow_to_section, prepare_oracle_text, truncate_chars, DEFAULT_MAX_CHARS};
