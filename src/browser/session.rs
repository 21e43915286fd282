//! 共享浏览器会话
//!
//! 进程内最多只有一个浏览器实例，由 `BrowserSession` 独占持有：
//! - 所有导航 / DOM 读取都在同一把锁内串行执行
//! - 按需懒启动，空闲超过阈值且没有使用者时由后台回收
//! - 使用计数在排队等待锁之前就加一，回收器不会关闭即将被使用的实例

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::browser::{AutomatedBrowser, BrowserLauncher};
use crate::error::{AppError, AppResult};

type Slot = Option<Box<dyn AutomatedBrowser>>;

/// 使用情况
struct Usage {
    in_flight: usize,
    last_used: Instant,
}

/// 共享浏览器会话管理器
pub struct BrowserSession {
    launcher: Arc<dyn BrowserLauncher>,
    slot: Mutex<Slot>,
    usage: parking_lot::Mutex<Usage>,
    idle_timeout: Duration,
    reaper_started: AtomicBool,
}

impl BrowserSession {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, idle_timeout: Duration) -> Self {
        Self {
            launcher,
            slot: Mutex::new(None),
            usage: parking_lot::Mutex::new(Usage {
                in_flight: 0,
                last_used: Instant::now(),
            }),
            idle_timeout,
            reaper_started: AtomicBool::new(false),
        }
    }

    /// 获取独占访问权，等待期间同样计入使用者
    pub async fn acquire(&self) -> SessionGuard<'_> {
        let in_flight = InFlight::enter(&self.usage);
        let slot = self.slot.lock().await;
        SessionGuard {
            slot,
            launcher: self.launcher.as_ref(),
            fresh: false,
            _in_flight: in_flight,
        }
    }

    /// 当前使用者（含排队者）数量
    pub fn in_flight(&self) -> usize {
        self.usage.lock().in_flight
    }

    /// 浏览器实例是否存在
    pub async fn is_running(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// 空闲超时且无人使用时关闭浏览器，返回是否执行了关闭
    ///
    /// 锁被占用说明正在使用，直接跳过
    pub async fn reap_if_idle(&self) -> bool {
        let Ok(mut slot) = self.slot.try_lock() else {
            return false;
        };
        if slot.is_none() {
            return false;
        }
        let idle = {
            let usage = self.usage.lock();
            usage.in_flight == 0 && usage.last_used.elapsed() > self.idle_timeout
        };
        if !idle {
            return false;
        }

        info!("♻️ 关闭空闲浏览器");
        if let Some(mut browser) = slot.take() {
            if let Err(e) = browser.close().await {
                debug!("关闭空闲浏览器失败: {}", e);
            }
        }
        true
    }

    /// 启动后台回收任务（只会启动一次）
    ///
    /// 任务只持有弱引用，会话被释放后自动退出
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> Option<JoinHandle<()>> {
        if self.reaper_started.swap(true, Ordering::SeqCst) {
            return None;
        }
        let weak = Arc::downgrade(self);
        debug!("浏览器回收任务已启动");
        Some(tokio::spawn(async move {
            loop {
                sleep(interval).await;
                let Some(session) = weak.upgrade() else {
                    break;
                };
                session.reap_if_idle().await;
            }
        }))
    }

    /// 关闭浏览器（进程退出时调用）
    pub async fn shutdown(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(mut browser) = slot.take() {
            if let Err(e) = browser.close().await {
                warn!("⚠️ 关闭浏览器失败: {}", e);
            }
        }
    }
}

/// 使用计数守卫
struct InFlight<'a> {
    usage: &'a parking_lot::Mutex<Usage>,
}

impl<'a> InFlight<'a> {
    fn enter(usage: &'a parking_lot::Mutex<Usage>) -> Self {
        let mut u = usage.lock();
        u.in_flight += 1;
        u.last_used = Instant::now();
        Self { usage }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut u = self.usage.lock();
        u.in_flight = u.in_flight.saturating_sub(1);
        u.last_used = Instant::now();
    }
}

/// 独占访问守卫
///
/// 持有期间其他使用者和回收器都无法触碰浏览器
pub struct SessionGuard<'a> {
    slot: MutexGuard<'a, Slot>,
    launcher: &'a dyn BrowserLauncher,
    fresh: bool,
    _in_flight: InFlight<'a>,
}

impl SessionGuard<'_> {
    /// 获取浏览器，不存在时启动新实例
    pub async fn browser(&mut self) -> AppResult<&dyn AutomatedBrowser> {
        if self.slot.is_none() {
            info!("▶️ 启动共享浏览器");
            let browser = self.launcher.launch().await?;
            *self.slot = Some(browser);
            self.fresh = true;
        }
        self.slot
            .as_deref()
            .ok_or_else(|| AppError::Other("浏览器实例不可用".to_string()))
    }

    /// 本次访问中浏览器是否为新启动的实例
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// 关闭当前实例并重新启动
    pub async fn relaunch(&mut self) -> AppResult<&dyn AutomatedBrowser> {
        if let Some(mut old) = self.slot.take() {
            if let Err(e) = old.close().await {
                debug!("关闭旧浏览器失败: {}", e);
            }
        }
        self.browser().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::{FakeBrowserState, FakeLauncher};

    fn session(state: &Arc<FakeBrowserState>) -> Arc<BrowserSession> {
        Arc::new(BrowserSession::new(
            Arc::new(FakeLauncher::new(state.clone())),
            Duration::from_secs(10),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_lazy_launch_and_reuse() {
        let state = FakeBrowserState::new();
        let session = session(&state);
        assert!(!session.is_running().await);

        {
            let mut guard = session.acquire().await;
            guard.browser().await.unwrap();
            assert!(guard.is_fresh());
        }
        {
            let mut guard = session.acquire().await;
            guard.browser().await.unwrap();
            assert!(!guard.is_fresh());
        }

        assert_eq!(state.launches(), 1);
        assert_eq!(session.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_after_idle_timeout() {
        let state = FakeBrowserState::new();
        let session = session(&state);
        session.acquire().await.browser().await.unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!session.reap_if_idle().await);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(session.reap_if_idle().await);
        assert!(!session.is_running().await);
        assert_eq!(state.closes(), 1);

        // 下次使用时透明地重新启动
        session.acquire().await.browser().await.unwrap();
        assert_eq!(state.launches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_reap_while_in_use() {
        let state = FakeBrowserState::new();
        let session = session(&state);

        let mut guard = session.acquire().await;
        guard.browser().await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!session.reap_if_idle().await);
        drop(guard);

        // 有排队中的使用者时同样不回收
        let first = session.acquire().await;
        let waiter_session = session.clone();
        let waiter = tokio::spawn(async move {
            let mut guard = waiter_session.acquire().await;
            guard.browser().await.map(|_| ())
        });
        tokio::task::yield_now().await;
        assert_eq!(session.in_flight(), 2);
        drop(first);
        waiter.await.unwrap().unwrap();
        assert_eq!(state.closes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_reaper() {
        let state = FakeBrowserState::new();
        let session = session(&state);
        assert!(session.spawn_reaper(Duration::from_secs(1)).is_some());
        assert!(session.spawn_reaper(Duration::from_secs(1)).is_none());

        session.acquire().await.browser().await.unwrap();
        tokio::time::sleep(Duration::from_secs(12)).await;

        assert!(!session.is_running().await);
        assert_eq!(state.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relaunch_replaces_instance() {
        let state = FakeBrowserState::new();
        let session = session(&state);

        let mut guard = session.acquire().await;
        guard.browser().await.unwrap();
        guard.relaunch().await.unwrap();
        drop(guard);

        assert_eq!(state.launches(), 2);
        assert_eq!(state.closes(), 1);
    }
}
