//! 只读文档接口
//! 定位器搜索的对象都实现 `Document`。放置注释等修改操作不在 trait 中，
//! 页面和矩形在调用方显式放置之前始终只读。

use serde::{Deserialize, Serialize};

use crate::geometry::Rectangle;
use crate::Result;

/// 单页提取出的文本
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// 页码，从 1 开始
    pub page_number: u32,
    /// 纯文本内容
    pub content: String,
}

/// 批量搜索中单个查询的命中结果
pub type QueryHits = Result<Vec<Rectangle>>;

/// 分页、基于坐标的文档
pub trait Document {
    /// 页数
    fn page_count(&self) -> usize;

    /// 页面可见区域（索引从 0 开始），页面坐标系
    fn page_bounds(&self, index: usize) -> Result<Rectangle>;

    /// 页面纯文本
    fn page_text(&self, index: usize) -> Result<String>;

    /// 在单页上做区分大小写的字面搜索
    /// 外层错误表示整页无法搜索；否则每个查询按顺序对应一项，
    /// 每项最多 `max_hits` 个命中。
    fn search_page(&self, index: usize, queries: &[&str], max_hits: usize) -> Result<Vec<QueryHits>>;

    /// 所有页面的文本，提取失败的页面记为空文本
    fn get_pages(&self) -> Vec<Page> {
        (0..self.page_count())
            .map(|index| {
                let content = self.page_text(index).unwrap_or_else(|e| {
                    log::warn!("[Document] 第 {} 页文本提取失败: {}", index + 1, e);
                    String::new()
                });
                Page {
                    page_number: index as u32 + 1,
                    content,
                }
            })
            .collect()
    }
}
