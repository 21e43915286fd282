//! chromiumoxide 驱动的浏览器实现
//!
//! 自行启动时每个实例使用一次性的用户目录，关闭时删除

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde_json::Value as JsonValue;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::browser::{connect_to_browser_and_page, AutomatedBrowser, BrowserCookie, BrowserLauncher};
use crate::config::Config;
use crate::error::{AppResult, BrowserError};
use crate::infrastructure::JsExecutor;

/// Chrome 启动器
///
/// 设置了调试端口时连接已有浏览器，否则启动一个新的无头浏览器，
/// 每次启动使用独立的临时用户目录
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    executable: Option<PathBuf>,
    args: Vec<String>,
    debug_port: Option<u16>,
}

impl ChromiumLauncher {
    pub fn new(config: &Config) -> Self {
        Self {
            executable: config.chrome_binary_path.as_ref().map(PathBuf::from),
            args: config.chrome_extra_args.clone(),
            debug_port: config.chrome_debug_port,
        }
    }

    async fn launch_headless(&self) -> AppResult<ChromiumBrowser> {
        let profile_dir = make_profile_dir();
        match launch_headless_browser(self.executable.as_deref(), &self.args, &profile_dir).await {
            Ok((browser, page, events)) => Ok(ChromiumBrowser::launched(browser, page, events, profile_dir)),
            Err(e) => {
                // 用户目录被占用时会创建失败，换一个新目录重试一次
                warn!("⚠️ 启动浏览器失败: {}，使用新的用户目录重试", e);
                remove_profile_dir(&profile_dir).await;
                let retry_dir = make_profile_dir();
                let (browser, page, events) =
                    match launch_headless_browser(self.executable.as_deref(), &self.args, &retry_dir).await {
                        Ok(launched) => launched,
                        Err(e) => {
                            remove_profile_dir(&retry_dir).await;
                            return Err(e);
                        }
                    };
                Ok(ChromiumBrowser::launched(browser, page, events, retry_dir))
            }
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> AppResult<Box<dyn AutomatedBrowser>> {
        let browser = match self.debug_port {
            Some(port) => {
                let (browser, page, events) = connect_to_browser_and_page(port).await?;
                ChromiumBrowser::connected(browser, page, events)
            }
            None => self.launch_headless().await?,
        };
        Ok(Box::new(browser))
    }
}

/// 启动无头浏览器并打开空白页面
async fn launch_headless_browser(
    executable: Option<&Path>,
    args: &[String],
    profile_dir: &Path,
) -> AppResult<(Browser, Page, JoinHandle<()>)> {
    info!("🚀 启动无头浏览器...");
    debug!("用户目录: {}", profile_dir.display());

    let mut builder = BrowserConfig::builder()
        .new_headless_mode()
        .user_data_dir(profile_dir)
        .args(args.iter().map(String::as_str));
    if let Some(path) = executable {
        builder = builder.chrome_executable(path);
    }
    let config = builder.build().map_err(|e| {
        error!("配置无头浏览器失败: {}", e);
        BrowserError::LaunchFailed { detail: e }
    })?;

    let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
        error!("启动无头浏览器失败: {}", e);
        BrowserError::LaunchFailed {
            detail: e.to_string(),
        }
    })?;

    // 在后台处理浏览器事件
    let events = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(Duration::from_millis(300)).await;

    let page = match browser.new_page("about:blank").await {
        Ok(page) => page,
        Err(e) => {
            error!("创建页面失败: {}", e);
            events.abort();
            return Err(BrowserError::LaunchFailed {
                detail: e.to_string(),
            }
            .into());
        }
    };

    info!("✅ 无头浏览器已就绪");
    Ok((browser, page, events))
}

fn make_profile_dir() -> PathBuf {
    std::env::temp_dir().join(format!(
        "chrome-profile-{}-{}",
        std::process::id(),
        uuid::Uuid::new_v4().simple()
    ))
}

async fn remove_profile_dir(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        debug!("删除用户目录 {} 失败: {}", dir.display(), e);
    }
}

/// chromiumoxide 驱动的浏览器
pub struct ChromiumBrowser {
    browser: Browser,
    executor: JsExecutor,
    events: JoinHandle<()>,
    /// 自行启动时的临时用户目录；连接模式下为 None
    profile_dir: Option<PathBuf>,
}

impl ChromiumBrowser {
    fn launched(browser: Browser, page: Page, events: JoinHandle<()>, profile_dir: PathBuf) -> Self {
        Self {
            browser,
            executor: JsExecutor::new(page),
            events,
            profile_dir: Some(profile_dir),
        }
    }

    fn connected(browser: Browser, page: Page, events: JoinHandle<()>) -> Self {
        Self {
            browser,
            executor: JsExecutor::new(page),
            events,
            profile_dir: None,
        }
    }
}

#[async_trait]
impl AutomatedBrowser for ChromiumBrowser {
    async fn navigate(&self, url: &str) -> AppResult<()> {
        debug!("浏览器导航: {}", url);
        self.executor.goto(url).await
    }

    async fn cookies(&self) -> AppResult<Vec<BrowserCookie>> {
        self.executor.cookies().await
    }

    async fn set_cookies(&self, cookies: &[BrowserCookie]) -> AppResult<()> {
        self.executor.set_cookies(cookies).await
    }

    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> AppResult<()> {
        self.executor.wait_until_visible(selector, timeout).await
    }

    async fn evaluate(&self, script: &str) -> AppResult<JsonValue> {
        self.executor.eval(script).await
    }

    async fn close(&mut self) -> AppResult<()> {
        match self.profile_dir.take() {
            Some(dir) => {
                let closed = self.browser.close().await;
                if let Err(e) = self.browser.wait().await {
                    debug!("等待浏览器进程退出失败: {}", e);
                }
                self.events.abort();
                remove_profile_dir(&dir).await;
                closed?;
            }
            None => {
                // 连接模式下只关闭自己创建的页面，不关闭用户的浏览器
                let closed = self.executor.page().clone().close().await;
                self.events.abort();
                closed?;
            }
        }
        info!("♻️ 浏览器已关闭");
        Ok(())
    }
}
