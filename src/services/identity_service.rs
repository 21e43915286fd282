//! 身份服务 - 业务能力层
//!
//! 只负责"提供一份可用的 Cookie"，不关心谁在使用

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{CookieMap, Identity, IdentitySource};

/// 身份来源能力
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// 来源标签
    fn source(&self) -> IdentitySource;

    /// 获取一份 Cookie
    async fn fetch(&self) -> AppResult<CookieMap>;
}

/// 通过共享浏览器访问首页获取 Cookie
pub struct BrowserIdentityProvider {
    session: Arc<BrowserSession>,
    landing_url: String,
    cookie_domain: String,
}

impl BrowserIdentityProvider {
    pub fn new(session: Arc<BrowserSession>, config: &Config) -> Self {
        Self {
            session,
            landing_url: config.landing_url(),
            cookie_domain: config.cookie_domain.clone(),
        }
    }
}

#[async_trait]
impl IdentityProvider for BrowserIdentityProvider {
    fn source(&self) -> IdentitySource {
        IdentitySource::Browser
    }

    async fn fetch(&self) -> AppResult<CookieMap> {
        let mut guard = self.session.acquire().await;
        let browser = guard.browser().await?;
        browser.navigate(&self.landing_url).await?;

        let jar: CookieMap = browser
            .cookies()
            .await?
            .into_iter()
            .filter(|c| c.domain.ends_with(&self.cookie_domain))
            .map(|c| (c.name, c.value))
            .collect();
        debug!("浏览器获取到 {} 个 Cookie", jar.len());
        Ok(jar)
    }
}

/// 缓存的身份以及最近一次失败
#[derive(Default)]
struct IdentityCache {
    identity: Option<Identity>,
    /// (获取完成时的代数, 错误)
    failure: Option<(u64, Arc<AppError>)>,
}

/// 身份管理器
///
/// - 缓存当前身份，按来源使用不同的 TTL
/// - 过期后先尝试远程来源，失败再回落到浏览器
/// - 获取过程在缓存锁内完成，并发的缓存未命中只会触发一次获取；
///   获取失败时，在锁上等待的调用方直接拿到同一个错误
pub struct IdentityManager {
    remote: Option<Arc<dyn IdentityProvider>>,
    browser: Arc<dyn IdentityProvider>,
    cache: Mutex<IdentityCache>,
    /// 已完成的获取次数
    generation: AtomicU64,
    remote_ttl: Duration,
    browser_ttl: Duration,
}

impl IdentityManager {
    pub fn new(
        remote: Option<Arc<dyn IdentityProvider>>,
        browser: Arc<dyn IdentityProvider>,
        remote_ttl: Duration,
        browser_ttl: Duration,
    ) -> Self {
        Self {
            remote,
            browser,
            cache: Mutex::new(IdentityCache::default()),
            generation: AtomicU64::new(0),
            remote_ttl,
            browser_ttl,
        }
    }

    fn ttl_for(&self, source: IdentitySource) -> Duration {
        match source {
            IdentitySource::Remote => self.remote_ttl,
            IdentitySource::Browser => self.browser_ttl,
        }
    }

    /// 获取当前可用身份
    pub async fn get_identity(&self) -> AppResult<Identity> {
        let observed = self.generation.load(Ordering::Acquire);
        let mut cache = self.cache.lock().await;
        if let Some(identity) = cache.identity.as_ref() {
            if identity.is_fresh(self.ttl_for(identity.source)) {
                return Ok(identity.clone());
            }
            debug!("身份已过期 (来源: {})", identity.source.as_str());
        }
        // 等锁期间已有一次获取失败
        if let Some((generation, err)) = &cache.failure {
            if *generation > observed {
                debug!("复用刚刚失败的身份获取结果: {}", err);
                return Err(AppError::Shared(err.clone()));
            }
        }

        let outcome = self.acquire().await;
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        match outcome {
            Ok(identity) => {
                debug!(
                    "身份已更新 (来源: {}, 时间: {})",
                    identity.source.as_str(),
                    identity.fetched_at_utc.to_rfc3339()
                );
                cache.identity = Some(identity.clone());
                cache.failure = None;
                Ok(identity)
            }
            Err(e) => {
                let err = Arc::new(e);
                cache.failure = Some((generation, err.clone()));
                Err(AppError::Shared(err))
            }
        }
    }

    async fn acquire(&self) -> AppResult<Identity> {
        if let Some(remote) = &self.remote {
            match remote.fetch().await {
                Ok(cookies) => {
                    info!("🍪 已从远程获取 {} 个 Cookie", cookies.len());
                    return Ok(Identity::new(cookies, remote.source()));
                }
                Err(e) => {
                    warn!("⚠️ 远程 Cookie 获取失败: {}，改用浏览器获取", e);
                }
            }
        }

        let cookies = self.browser.fetch().await?;
        info!("🍪 已通过浏览器获取 {} 个 Cookie", cookies.len());
        Ok(Identity::new(cookies, self.browser.source()))
    }
}
