//! 模型输入整理：可选的章节截取和长度上限

use once_cell::sync::Lazy;
use regex::Regex;

/// 发送给模型的默认字符上限
pub const DEFAULT_MAX_CHARS: usize = 8000;

/// 从单词 "experience" 到下一个位于行首的已知标题，
/// 或到文本末尾。
static EXPERIENCE_WINDOW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)\b(experience\b.*?)(?:(?m:^)[ \t]*(?:education|extra(?:curricular)?|skills?|objective)\b|\z)",
    )
    .expect("experience window regex")
});

/// `text` 中的工作经历部分，没有时返回全文
pub fn narrow_to_section(text: &str) -> &str {
    match EXPERIENCE_WINDOW.captures(text).and_then(|c| c.get(1)) {
        Some(window) if !window.as_str().trim().is_empty() => window.as_str(),
        _ => text,
    }
}

/// `text` 的前 `max_chars` 个字符，不会截断字符
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// 交给模型的文本：可选截取章节，再限制长度
pub fn prepare_oracle_text(text: &str, focus_section: bool, max_chars: usize) -> String {
    let scoped = if focus_section {
        narrow_to_section(text)
    } else {
        text
    };
    let capped = truncate_chars(scoped, max_chars);
    if capped.len() < scoped.len() {
        log::info!(
            "[Section] 模型文本截断为 {} 个字符",
            max_chars
        );
    }
    capped.to_string()
}
