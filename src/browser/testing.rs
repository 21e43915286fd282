//! 测试用的假浏览器

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;

use crate::browser::{AutomatedBrowser, BrowserCookie, BrowserLauncher};
use crate::error::{AppError, AppResult, BrowserError};

/// 所有假浏览器实例共享的状态
#[derive(Default)]
pub struct FakeBrowserState {
    launches: AtomicUsize,
    closes: AtomicUsize,
    pub launch_delay: Mutex<Option<Duration>>,
    pub launch_fails: AtomicBool,
    pub failing_navigations: AtomicUsize,
    pub wait_fails: AtomicBool,
    pub navigations: Mutex<Vec<String>>,
    pub page_cookies: Mutex<Vec<BrowserCookie>>,
    pub injected_cookies: Mutex<Vec<BrowserCookie>>,
    pub dom_nodes: Mutex<JsonValue>,
}

impl FakeBrowserState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            dom_nodes: Mutex::new(JsonValue::Array(Vec::new())),
            ..Default::default()
        })
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn set_page_cookies(&self, cookies: &[(&str, &str, &str)]) {
        *self.page_cookies.lock() = cookies
            .iter()
            .map(|(name, value, domain)| BrowserCookie {
                name: name.to_string(),
                value: value.to_string(),
                domain: domain.to_string(),
            })
            .collect();
    }
}

pub struct FakeLauncher {
    state: Arc<FakeBrowserState>,
}

impl FakeLauncher {
    pub fn new(state: Arc<FakeBrowserState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> AppResult<Box<dyn AutomatedBrowser>> {
        let delay = *self.state.launch_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        // 失败的启动也计数
        self.state.launches.fetch_add(1, Ordering::SeqCst);
        if self.state.launch_fails.load(Ordering::SeqCst) {
            return Err(BrowserError::LaunchFailed {
                detail: "fake launch failure".to_string(),
            }
            .into());
        }
        Ok(Box::new(FakeBrowser {
            state: self.state.clone(),
        }))
    }
}

pub struct FakeBrowser {
    state: Arc<FakeBrowserState>,
}

#[async_trait]
impl AutomatedBrowser for FakeBrowser {
    async fn navigate(&self, url: &str) -> AppResult<()> {
        self.state.navigations.lock().push(url.to_string());
        let failing = self.state.failing_navigations.load(Ordering::SeqCst);
        if failing > 0 {
            self.state.failing_navigations.store(failing - 1, Ordering::SeqCst);
            return Err(AppError::navigation_failed(url, "fake navigation failure"));
        }
        Ok(())
    }

    async fn cookies(&self) -> AppResult<Vec<BrowserCookie>> {
        Ok(self.state.page_cookies.lock().clone())
    }

    async fn set_cookies(&self, cookies: &[BrowserCookie]) -> AppResult<()> {
        self.state.injected_cookies.lock().extend_from_slice(cookies);
        Ok(())
    }

    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> AppResult<()> {
        if self.state.wait_fails.load(Ordering::SeqCst) {
            return Err(BrowserError::ElementWaitTimeout {
                selector: selector.to_string(),
                timeout_ms: timeout.as_millis(),
            }
            .into());
        }
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> AppResult<JsonValue> {
        Ok(self.state.dom_nodes.lock().clone())
    }

    async fn close(&mut self) -> AppResult<()> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
