//! 应用生命周期 - 编排层
//!
//! 唯一持有浏览器会话的模块；其他模块只拿到 `Arc` 引用

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::api;
use crate::browser::{BrowserSession, ChromiumLauncher};
use crate::clients::{LensClient, RemoteIdentityProvider};
use crate::config::Config;
use crate::error::AppResult;
use crate::orchestrator::{DeliveryRegistry, JobEngine, ResultStore, WorkerSettings};
use crate::services::{BrowserIdentityProvider, IdentityManager, IdentityProvider};
use crate::utils::logging::log_startup;
use crate::workflow::{ImageTranslateFlow, Pipeline, TextOcrFlow};

/// 应用主结构
pub struct App {
    config: Config,
    session: Arc<BrowserSession>,
    results: Arc<ResultStore>,
    engine: Arc<JobEngine>,
}

impl App {
    /// 初始化应用（浏览器在第一次使用时才会启动）
    pub async fn initialize(config: Config) -> AppResult<Self> {
        log_startup(&config);

        let session = Arc::new(BrowserSession::new(
            Arc::new(ChromiumLauncher::new(&config)),
            config.chrome_idle(),
        ));

        let remote = RemoteIdentityProvider::from_config(&config)
            .map(|provider| Arc::new(provider) as Arc<dyn IdentityProvider>);
        if remote.is_none() {
            info!("未配置 COOKIE_JSON_URL，Cookie 将通过浏览器获取");
        }
        let identity = Arc::new(IdentityManager::new(
            remote,
            Arc::new(BrowserIdentityProvider::new(session.clone(), &config)),
            config.remote_identity_ttl(),
            config.browser_identity_ttl(),
        ));

        let pipelines: Vec<Arc<dyn Pipeline>> = vec![
            Arc::new(ImageTranslateFlow::new(
                LensClient::for_images(&config)?,
                identity.clone(),
            )),
            Arc::new(TextOcrFlow::new(
                LensClient::for_text(&config)?,
                identity,
                session.clone(),
                &config,
            )),
        ];

        let results = Arc::new(ResultStore::new(config.results_ttl()));
        let engine = Arc::new(JobEngine::new(
            pipelines,
            results.clone(),
            Arc::new(DeliveryRegistry::new()),
            WorkerSettings::from_config(&config),
        ));

        Ok(Self {
            config,
            session,
            results,
            engine,
        })
    }

    pub fn engine(&self) -> &Arc<JobEngine> {
        &self.engine
    }

    /// 运行 HTTP 服务直到收到退出信号
    pub async fn run(self) -> AppResult<()> {
        let reaper = self.session.spawn_reaper(self.config.reaper_interval());
        let sweeper = self.results.spawn_sweeper(Duration::from_secs(
            self.config.results_sweep_interval_secs,
        ));
        if self.config.enable_background_workers {
            self.engine.ensure_started();
        }

        let listener = TcpListener::bind(("0.0.0.0", self.config.port)).await?;
        info!("🚀 服务已启动: http://{}", listener.local_addr()?);
        axum::serve(listener, api::router(self.engine.clone()))
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("正在关闭...");
        if let Some(reaper) = reaper {
            reaper.abort();
        }
        sweeper.abort();
        self.session.shutdown().await;
        info!("✅ 已退出");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("⚠️ 无法监听退出信号: {}", e);
        std::future::pending::<()>().await;
    }
}
