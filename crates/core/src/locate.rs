//! 目标定位：从字面目标字符串到页面上的矩形

use crate::document::Document;
use crate::geometry::Rectangle;

/// 每页每个查询的命中上限
pub const DEFAULT_MAX_HITS: usize = 200;

/// 目标在页面上的一次出现
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Occurrence {
    /// 页索引，从 0 开始
    pub page_index: usize,
    pub rect: Rectangle,
}

/// 在文档的每一页上定位目标。
/// 底层搜索区分大小写，因此每个目标会尝试多种大小写变体并合并所有命中。
/// 不同变体得到的矩形不做比较，重叠的重复结果会保留。
#[derive(Debug, Clone, Copy)]
pub struct TextLocator {
    max_hits: usize,
}

impl Default for TextLocator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HITS)
    }
}

impl TextLocator {
    pub fn new(max_hits: usize) -> Self {
        Self {
            max_hits: max_hits.max(1),
        }
    }

    /// 按搜索顺序排列的大小写变体：原文、去空白、首字母大写、全大写、全小写。
    /// 文本相同的变体只出现一次。
    pub fn variants(target: &str) -> Vec<String> {
        let trimmed = target.trim();
        let candidates = [
            target.to_string(),
            trimmed.to_string(),
            title_case(trimmed),
            trimmed.to_uppercase(),
            trimmed.to_lowercase(),
        ];

        let mut variants: Vec<String> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if candidate.trim().is_empty() || variants.contains(&candidate) {
                continue;
            }
            variants.push(candidate);
        }
        variants
    }

    /// `target` 的所有出现位置，先按页序再按搜索顺序。
    /// 失败不会向上传递：变体搜索失败则跳过该变体，页面无法搜索则跳过该页，
    /// 完全没有匹配时返回空列表。
    pub fn locate<D: Document + ?Sized>(&self, doc: &D, target: &str) -> Vec<Occurrence> {
        if target.trim().is_empty() {
            log::debug!("[Locator] 忽略空白目标");
            return Vec::new();
        }

        let variants = Self::variants(target);
        let queries: Vec<&str> = variants.iter().map(String::as_str).collect();
        let mut occurrences = Vec::new();

        for page_index in 0..doc.page_count() {
            let bounds = match doc.page_bounds(page_index) {
                Ok(bounds) => bounds,
                Err(e) => {
                    log::warn!("[Locator] 第 {} 页没有可用边界: {}", page_index + 1, e);
                    continue;
                }
            };

            let hits = match doc.search_page(page_index, &queries, self.max_hits) {
                Ok(hits) => hits,
                Err(e) => {
                    log::warn!("[Locator] 第 {} 页搜索失败: {}", page_index + 1, e);
                    continue;
                }
            };

            for (variant, result) in queries.iter().zip(hits) {
                let rects = match result {
                    Ok(rects) => rects,
                    Err(e) => {
                        log::debug!(
                            "[Locator] 变体 {:?} 在第 {} 页搜索失败: {}",
                            variant,
                            page_index + 1,
                            e
                        );
                        continue;
                    }
                };

                for rect in rects.into_iter().take(self.max_hits) {
                    match rect.clamp_to(&bounds) {
                        Some(rect) => occurrences.push(Occurrence { page_index, rect }),
                        None => log::debug!(
                            "[Locator] 命中 {:?} 超出第 {} 页边界，已丢弃",
                            rect,
                            page_index + 1
                        ),
                    }
                }
            }
        }

        log::info!("[Locator] {:?}: 共 {} 处", target, occurrences.len());
        occurrences
    }
}

/// 每段字母的首字母大写，其余小写
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_alpha = false;
    for c in text.chars() {
        if prev_alpha {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_alpha = c.is_alphabetic();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::QueryHits;
    use crate::CoreError;

    /// 等宽文本页面，每页一行，每个字符 10 个单位宽
    struct FakeDocument {
        pages: Vec<String>,
        width: f32,
        failing_query: Option<&'static str>,
    }

    impl FakeDocument {
        fn new(pages: &[&str]) -> Self {
            Self {
                pages: pages.iter().map(|p| p.to_string()).collect(),
                width: 612.0,
                failing_query: None,
            }
        }
    }

    impl Document for FakeDocument {
        fn page_count(&self) -> usize {
            self.pages.len()
        }

        fn page_bounds(&self, _index: usize) -> crate::Result<Rectangle> {
            Ok(Rectangle::new(0.0, 792.0, self.width, 0.0))
        }

        fn page_text(&self, index: usize) -> crate::Result<String> {
            self.pages.get(index).cloned().ok_or(CoreError::PageOutOfRange(index))
        }

        fn search_page(&self, index: usize, queries: &[&str], max_hits: usize) -> crate::Result<Vec<QueryHits>> {
            let text = self.page_text(index)?;
            Ok(queries
                .iter()
                .map(|q| {
                    if Some(*q) == self.failing_query {
                        return Err(CoreError::Search(format!("cannot search {:?}", q)));
                    }
                    Ok(text
                        .match_indices(q)
                        .take(max_hits)
                        .map(|(offset, m)| {
                            let left = offset as f32 * 10.0;
                            Rectangle::new(left, 712.0, left + m.len() as f32 * 10.0, 700.0)
                        })
                        .collect())
                })
                .collect())
        }
    }

    #[test]
    fn test_variants_order_and_dedup() {
        assert_eq!(
            TextLocator::variants("  acme corp "),
            vec!["  acme corp ", "acme corp", "Acme Corp", "ACME CORP"]
        );
        assert_eq!(TextLocator::variants("Acme Inc"), vec!["Acme Inc", "ACME INC", "acme inc"]);
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("acme corp"), "Acme Corp");
        assert_eq!(title_case("ACME-CORP inc."), "Acme-Corp Inc.");
        assert_eq!(title_case("o'neil"), "O'Neil");
    }

    #[test]
    fn test_case_variants_find_literal_text() {
        let doc = FakeDocument::new(&["Worked at Acme Corp in 2020"]);
        let locator = TextLocator::default();

        let lower = locator.locate(&doc, "acme corp");
        assert_eq!(lower.len(), 1);
        assert_eq!(lower[0].rect.left, 100.0);

        let upper = locator.locate(&doc, "ACME CORP");
        assert_eq!(upper.len(), 1);
    }

    #[test]
    fn test_zero_occurrences_is_empty() {
        let doc = FakeDocument::new(&["Nothing to see", "here either"]);
        assert!(TextLocator::default().locate(&doc, "Globex").is_empty());
        assert!(TextLocator::default().locate(&doc, "   ").is_empty());
    }

    #[test]
    fn test_page_order_preserved() {
        let doc = FakeDocument::new(&["Globex", "no match", "Globex and Globex"]);
        let hits = TextLocator::default().locate(&doc, "Globex");
        let pages: Vec<usize> = hits.iter().map(|o| o.page_index).collect();
        assert_eq!(pages, vec![0, 2, 2]);
    }

    #[test]
    fn test_failing_variant_is_swallowed() {
        let mut doc = FakeDocument::new(&["ACME CORP annual report"]);
        doc.failing_query = Some("acme corp");
        let hits = TextLocator::default().locate(&doc, "acme corp");
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_distinct_variants_are_not_deduplicated() {
        // "ab" 和 "AB" 是不同变体，两者的命中都保留
        let doc = FakeDocument::new(&["ab AB"]);
        let hits = TextLocator::default().locate(&doc, "ab");
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_max_hits_cap() {
        let page = "x".repeat(500);
        let mut doc = FakeDocument::new(&[page.as_str()]);
        doc.width = 10_000.0;
        let hits = TextLocator::new(128).locate(&doc, "x");
        assert_eq!(hits.len(), 128);
    }

    #[test]
    fn test_hits_outside_page_dropped() {
        let page = format!("{}Target", " ".repeat(70));
        let doc = FakeDocument::new(&[page.as_str()]);
        // 从 x = 700 开始，超出 612 宽的页面
        assert!(TextLocator::default().locate(&doc, "Target").is_empty());
    }
}
