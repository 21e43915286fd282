//! JS 执行器 - 基础设施层
//!
//! 持有唯一的 page 资源，只暴露"导航 / 执行 JS / 读写 Cookie"的能力

use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::browser::BrowserCookie;
use crate::error::{AppError, AppResult, BrowserError};

/// 可见性轮询间隔
const VISIBLE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// JS 执行器
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 暴露 eval() 能力
/// - 不认识 Job / TextRegion
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于其他操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 导航到指定地址
    pub async fn goto(&self, url: &str) -> AppResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| AppError::navigation_failed(url, e))?;
        Ok(())
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

    /// 轮询直到元素可见（有尺寸且未被隐藏）
    pub async fn wait_until_visible(&self, selector: &str, timeout: Duration) -> AppResult<()> {
        let script = visibility_script(selector)?;
        let deadline = Instant::now() + timeout;

        loop {
            // 页面仍在加载时脚本可能失败，视为尚未可见
            if let Ok(true) = self.eval_as::<bool>(script.as_str()).await {
                debug!("元素已可见: {}", selector);
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::ElementWaitTimeout {
                    selector: selector.to_string(),
                    timeout_ms: timeout.as_millis(),
                }
                .into());
            }
            sleep(VISIBLE_POLL_INTERVAL).await;
        }
    }

    /// 读取 Cookie
    pub async fn cookies(&self) -> AppResult<Vec<BrowserCookie>> {
        let cookies = self.page.get_cookies().await?;
        Ok(cookies
            .into_iter()
            .map(|c| BrowserCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
            })
            .collect())
    }

    /// 写入 Cookie
    pub async fn set_cookies(&self, cookies: &[BrowserCookie]) -> AppResult<()> {
        let mut params = Vec::with_capacity(cookies.len());
        for c in cookies {
            let param = CookieParam::builder()
                .name(c.name.clone())
                .value(c.value.clone())
                .domain(c.domain.clone())
                .path("/")
                .secure(true)
                .build()
                .map_err(|detail| BrowserError::ScriptFailed { detail })?;
            params.push(param);
        }
        if !params.is_empty() {
            self.page.set_cookies(params).await?;
        }
        Ok(())
    }
}

fn visibility_script(selector: &str) -> AppResult<String> {
    Ok(format!(
        r#"
        (() => {{
            const el = document.querySelector({});
            if (!el) return false;
            const rect = el.getBoundingClientRect();
            const style = window.getComputedStyle(el);
            return rect.width > 0 && rect.height > 0
                && style.visibility !== "hidden" && style.display !== "none";
        }})()
        "#,
        serde_json::to_string(selector)?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_script_escapes_selector() {
        let script = visibility_script(r#"div[data-x="1"]"#).unwrap();
        assert!(script.contains(r#"document.querySelector("div[data-x=\"1\"]")"#));
    }
}
