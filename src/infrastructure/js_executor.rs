//! JS 执行器 - 基础设施层
//!
//! 持有唯一的 page 资源，暴露"执行 JS"和"注入输入事件"的能力

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::layout::Point as CdpPoint;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::infrastructure::page_driver::{PageDriver, Target};
use crate::services::motion::{BoundingBox, Keystroke, Point};

/// JS 执行器
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 暴露 eval() 能力和鼠标/键盘事件
/// - 不认识 Question
/// - 不处理业务流程
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> AppResult<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> AppResult<T> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)?;
        Ok(typed_value)
    }

    /// 等待当前导航完成
    pub async fn wait_for_navigation(&self) -> AppResult<()> {
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    async fn dispatch_key(&self, event: DispatchKeyEventType, key: &str, text: Option<&str>, code: Option<i64>) -> AppResult<()> {
        let mut builder = DispatchKeyEventParams::builder().r#type(event).key(key);
        if let Some(text) = text {
            builder = builder.text(text);
        }
        if let Some(code) = code {
            builder = builder.windows_virtual_key_code(code);
        }
        let params = builder.build().map_err(AppError::Dispatch)?;
        self.page.execute(params).await?;
        Ok(())
    }
}

/// 元素位置查询的返回结构
#[derive(Debug, Deserialize)]
struct RectProbe {
    found: bool,
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    #[serde(default)]
    width: f64,
    #[serde(default)]
    height: f64,
}

#[async_trait]
impl PageDriver for JsExecutor {
    async fn count(&self, selector: &str) -> AppResult<usize> {
        let js_code = format!(
            "document.querySelectorAll({}).length",
            serde_json::to_string(selector)?
        );
        self.eval_as(js_code).await
    }

    async fn bounding_box(&self, target: &Target) -> AppResult<Option<BoundingBox>> {
        let js_code = format!(
            r#"
            (() => {{
                const el = document.querySelectorAll({})[{}];
                if (!el) return {{ found: false }};
                const r = el.getBoundingClientRect();
                return {{ found: true, x: r.x, y: r.y, width: r.width, height: r.height }};
            }})()
            "#,
            serde_json::to_string(&target.selector)?,
            target.index
        );
        let rect: RectProbe = self.eval_as(js_code).await?;
        Ok(rect
            .found
            .then(|| BoundingBox::new(rect.x, rect.y, rect.width, rect.height)))
    }

    async fn is_actionable(&self, target: &Target) -> AppResult<bool> {
        let js_code = format!(
            r#"
            (() => {{
                const el = document.querySelectorAll({})[{}];
                if (!el || !el.isConnected || el.disabled) return false;
                const style = window.getComputedStyle(el);
                if (style.display === 'none' || style.visibility === 'hidden') return false;
                const r = el.getBoundingClientRect();
                if (r.width <= 0 || r.height <= 0) return false;
                return r.bottom > 0 && r.right > 0
                    && r.top < window.innerHeight && r.left < window.innerWidth;
            }})()
            "#,
            serde_json::to_string(&target.selector)?,
            target.index
        );
        self.eval_as(js_code).await
    }

    async fn move_pointer(&self, to: Point) -> AppResult<()> {
        self.page.move_mouse(CdpPoint::new(to.x, to.y)).await?;
        Ok(())
    }

    async fn click_at(&self, at: Point) -> AppResult<()> {
        debug!("点击坐标 ({:.1}, {:.1})", at.x, at.y);
        self.page.click(CdpPoint::new(at.x, at.y)).await?;
        Ok(())
    }

    async fn press_key(&self, key: Keystroke) -> AppResult<()> {
        match key {
            Keystroke::Char(c) => {
                let text = c.to_string();
                self.dispatch_key(DispatchKeyEventType::KeyDown, &text, Some(&text), None)
                    .await?;
                self.dispatch_key(DispatchKeyEventType::KeyUp, &text, None, None)
                    .await
            }
            Keystroke::Backspace => {
                self.dispatch_key(DispatchKeyEventType::RawKeyDown, "Backspace", None, Some(8))
                    .await?;
                self.dispatch_key(DispatchKeyEventType::KeyUp, "Backspace", None, Some(8))
                    .await
            }
        }
    }
}
