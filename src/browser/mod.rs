//! 自动化浏览器能力
//!
//! 上层只依赖 `AutomatedBrowser` / `BrowserLauncher` 两个 trait，
//! 具体实现是 chromiumoxide 驱动的 Chrome（`headless`），
//! 也可以连接到一个已经在运行的浏览器（`connection`）。
//!
//! 唯一的共享浏览器实例由 `session::BrowserSession` 持有。

pub mod connection;
pub mod headless;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::AppResult;

pub use connection::connect_to_browser_and_page;
pub use headless::{ChromiumBrowser, ChromiumLauncher};
pub use session::{BrowserSession, SessionGuard};

/// 浏览器中的一条 Cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
}

/// 一个可操作的浏览器页面
#[async_trait]
pub trait AutomatedBrowser: Send + Sync {
    /// 导航到指定地址
    async fn navigate(&self, url: &str) -> AppResult<()>;

    /// 读取当前页面可见的 Cookie
    async fn cookies(&self) -> AppResult<Vec<BrowserCookie>>;

    /// 写入 Cookie
    async fn set_cookies(&self, cookies: &[BrowserCookie]) -> AppResult<()>;

    /// 等待选择器对应的元素可见，超时返回错误
    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> AppResult<()>;

    /// 执行 JS 并返回 JSON 结果
    async fn evaluate(&self, script: &str) -> AppResult<JsonValue>;

    /// 关闭浏览器并释放资源
    async fn close(&mut self) -> AppResult<()>;
}

/// 浏览器启动器
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> AppResult<Box<dyn AutomatedBrowser>>;
}
