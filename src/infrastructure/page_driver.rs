//! 页面驱动能力
//!
//! 对浏览器的最小抽象：读取元素位置、注入鼠标和键盘事件。
//! 上层只依赖这个 trait，测试中可以替换为内存实现。

use async_trait::async_trait;

use crate::error::AppResult;
use crate::services::motion::{BoundingBox, Keystroke, Point};

/// 可以重新定位的目标元素：选择器 + 匹配结果中的下标
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub selector: String,
    pub index: usize,
}

impl Target {
    pub fn new(selector: impl Into<String>, index: usize) -> Self {
        Self {
            selector: selector.into(),
            index,
        }
    }

    /// 选择器匹配到的第一个元素
    pub fn first(selector: impl Into<String>) -> Self {
        Self::new(selector, 0)
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.selector, self.index)
    }
}

#[async_trait]
pub trait PageDriver: Send + Sync {
    /// 选择器匹配到的元素数量
    async fn count(&self, selector: &str) -> AppResult<usize>;

    /// 目标元素的边界框；元素不存在时返回 `None`
    async fn bounding_box(&self, target: &Target) -> AppResult<Option<BoundingBox>>;

    /// 目标元素是否仍在文档中、可见且位于视口内
    async fn is_actionable(&self, target: &Target) -> AppResult<bool>;

    async fn move_pointer(&self, to: Point) -> AppResult<()>;

    async fn click_at(&self, at: Point) -> AppResult<()>;

    async fn press_key(&self, key: Keystroke) -> AppResult<()>;
}
