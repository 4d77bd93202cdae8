//! 模型输出规范化
//!
//! 把模型返回的任意内容整理成有序、去重、非空的目标字符串列表。
//! 解析由一串可失败的解析器组成，第一个识别出输入的解析器胜出，
//! 自由文本启发式放在最后。规范化本身从不失败。

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

use crate::literal::{self, Literal};

/// 解析步骤：`None` 表示格式不符，交给下一个
pub type ParseStep = fn(&str) -> Option<Vec<String>>;

/// 出现这些通用词的片段视为描述而非名称
const DENYLIST: &[&str] = &[
    "experience",
    "company",
    "companies",
    "worked",
    "working",
    "organization",
    "organisation",
];

/// 句首大写的虚词，单独出现时不会是名称
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "at", "by", "for", "from", "he", "her", "here", "his", "i", "in",
    "is", "it", "its", "my", "of", "on", "our", "she", "that", "the", "their", "there", "these",
    "they", "this", "those", "to", "we", "with", "you", "your",
];

/// 最多四个连续的首字母大写单词
static CAPITALIZED_RUN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\p{Lu}[\p{L}\p{N}&'\-]*(?:[ \t]+\p{Lu}[\p{L}\p{N}&'\-]*){0,3}")
        .expect("capitalized run regex")
});

static FRAGMENT_DELIMITERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\r\n,.;]").expect("fragment delimiter regex"));

#[derive(Debug, Clone)]
pub struct OutputNormalizer {
    steps: Vec<(&'static str, ParseStep)>,
}

impl Default for OutputNormalizer {
    fn default() -> Self {
        Self {
            steps: vec![
                ("strict", parse_strict),
                ("bracketed", parse_bracketed),
                ("lenient", parse_lenient),
                ("lenient-bracketed", parse_lenient_bracketed),
                ("free-text", parse_free_text),
            ],
        }
    }
}

impl OutputNormalizer {
    /// 使用自定义解析链构造
    pub fn with_steps(steps: Vec<(&'static str, ParseStep)>) -> Self {
        Self { steps }
    }

    pub fn normalize(&self, raw: &str) -> Vec<String> {
        for (name, step) in &self.steps {
            if let Some(candidates) = step(raw) {
                let targets = clean(candidates);
                log::debug!("[Normalizer] {} 解析器匹配，{} 个目标", name, targets.len());
                return targets;
            }
        }
        log::debug!("[Normalizer] 没有解析器匹配");
        Vec::new()
    }
}

/// 使用默认解析链规范化
pub fn normalize(raw: &str) -> Vec<String> {
    OutputNormalizer::default().normalize(raw)
}

/// 去除首尾空白、丢弃空项，并按不区分大小写去重，
/// 保留首次出现的写法和顺序。
pub fn clean(candidates: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter_map(|c| {
            let trimmed = c.trim();
            if trimmed.is_empty() || !seen.insert(trimmed.to_lowercase()) {
                return None;
            }
            Some(trimmed.to_string())
        })
        .collect()
}

// ============================================================================
// 解析步骤
// ============================================================================

/// 整个输入是严格的 JSON 数组
pub fn parse_strict(raw: &str) -> Option<Vec<String>> {
    match serde_json::from_str::<Value>(raw.trim()).ok()? {
        Value::Array(items) => Some(items.into_iter().filter_map(json_item).collect()),
        _ => None,
    }
}

/// 文字中夹带的严格 JSON 数组
pub fn parse_bracketed(raw: &str) -> Option<Vec<String>> {
    bracket_spans(raw).into_iter().find_map(parse_strict)
}

/// 整个输入是宽松的列表字面量
pub fn parse_lenient(raw: &str) -> Option<Vec<String>> {
    literal::parse_list(raw).map(literal_items)
}

/// 文字中夹带的宽松列表字面量
pub fn parse_lenient_bracketed(raw: &str) -> Option<Vec<String>> {
    bracket_spans(raw)
        .into_iter()
        .find_map(literal::parse_list)
        .map(literal_items)
}

/// 从文字中提取连续的大写单词。总是成功，结果可能为空。
pub fn parse_free_text(raw: &str) -> Option<Vec<String>> {
    let mut found = Vec::new();
    for fragment in FRAGMENT_DELIMITERS.split(raw) {
        let lowered = fragment.to_lowercase();
        if DENYLIST.iter().any(|term| lowered.contains(term)) {
            continue;
        }
        found.extend(
            CAPITALIZED_RUN
                .find_iter(fragment)
                .map(|m| strip_stopwords(m.as_str().trim()))
                .filter(|s| s.chars().count() > 1)
                .map(str::to_string),
        );
    }
    Some(found)
}

/// 去掉大写词串开头的停用词（"The Acme" -> "Acme"）
fn strip_stopwords(run: &str) -> &str {
    let mut rest = run;
    while let Some(word) = rest.split_whitespace().next() {
        if !STOPWORDS.contains(&word.to_lowercase().as_str()) {
            break;
        }
        rest = rest[word.len()..].trim_start();
    }
    rest
}

fn json_item(item: Value) -> Option<String> {
    match item {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn literal_items(items: Vec<Literal>) -> Vec<String> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Literal::Str(s) | Literal::Num(s) => Some(s),
            Literal::Other => None,
        })
        .collect()
}

/// 候选的 `[...]` 片段，可能性高的在前：先是最左 `[` 到最右 `]`，
/// 然后是识别引号的扫描找到的每个配对片段。
pub fn bracket_spans(raw: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    if let (Some(start), Some(end)) = (raw.find('['), raw.rfind(']')) {
        if start < end {
            spans.push(&raw[start..=end]);
        }
    }

    let mut depth = 0usize;
    let mut open_at = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in raw.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' if depth > 0 => quote = Some(c),
            '[' => {
                if depth == 0 {
                    open_at = i;
                }
                depth += 1;
            }
            ']' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    let span = &raw[open_at..=i];
                    if !spans.contains(&span) {
                        spans.push(span);
                    }
                }
            }
            _ => {}
        }
    }
    spans
}
