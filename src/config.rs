use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppResult, ConfigError};

/// 程序配置
///
/// 所有阈值和 TTL 都视为可调参数，默认值与线上部署保持一致
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP 服务端口
    pub port: u16,
    /// 图片翻译模式的 worker 数量
    pub max_workers_images: usize,
    /// 文字识别模式的 worker 数量
    pub max_workers_text: usize,
    /// 结果保留时长（秒），从创建时刻起算
    pub results_ttl_secs: u64,
    /// 结果清理间隔（秒）
    pub results_sweep_interval_secs: u64,
    /// 结果中 base64 图片的最大长度，超出则丢弃图片
    pub max_base64_image_len: usize,
    /// 每个任务完成后的等待时间（毫秒）
    pub job_delay_ms: u64,
    /// 是否在启动时直接启动 worker（否则在首次提交时启动）
    pub enable_background_workers: bool,

    // --- 身份 / Cookie ---
    /// 远程 Cookie JSON 地址
    pub cookie_json_url: Option<String>,
    /// 远程 Cookie 请求超时（秒）
    pub cookie_fetch_timeout_secs: u64,
    /// 远程 Cookie 缓存时长（秒）
    pub remote_identity_ttl_secs: u64,
    /// 浏览器 Cookie 缓存时长（秒）
    pub browser_identity_ttl_secs: u64,
    /// Cookie 所属域名后缀
    pub cookie_domain: String,

    // --- 浏览器 ---
    /// 浏览器空闲多久后关闭（秒）
    pub chrome_idle_secs: u64,
    /// 空闲检查间隔（毫秒）
    pub reaper_interval_ms: u64,
    /// 额外的浏览器启动参数
    pub chrome_extra_args: Vec<String>,
    /// 浏览器可执行文件路径
    pub chrome_binary_path: Option<String>,
    /// 连接已运行浏览器的调试端口（设置后不再自行启动）
    pub chrome_debug_port: Option<u16>,
    /// 等待 OCR 元素可见的超时（秒）
    pub dom_wait_timeout_secs: u64,

    // --- 上游 ---
    /// Lens 服务根地址
    pub lens_base_url: String,
    /// 图片翻译模式的 User-Agent
    pub images_user_agent: String,
    /// 文字识别模式的 User-Agent
    pub text_user_agent: String,
    /// 获取原图超时（秒）
    pub image_fetch_timeout_secs: u64,
    /// 上传超时（秒）
    pub upload_timeout_secs: u64,
    /// 获取翻译 JSON 超时（秒）
    pub data_fetch_timeout_secs: u64,
    /// 兜底图片下载超时（秒）
    pub fallback_fetch_timeout_secs: u64,

    // --- 区域合并 ---
    /// 水平中心距离阈值（像素）
    pub merge_threshold_x: f64,
    /// 垂直方向容差（像素）
    pub merge_threshold_y: f64,

    /// 日志级别
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            max_workers_images: 8,
            max_workers_text: 3,
            results_ttl_secs: 300,
            results_sweep_interval_secs: 60,
            max_base64_image_len: 5_000_000,
            job_delay_ms: 100,
            enable_background_workers: false,
            cookie_json_url: None,
            cookie_fetch_timeout_secs: 5,
            remote_identity_ttl_secs: 600,
            browser_identity_ttl_secs: 900,
            cookie_domain: "google.com".to_string(),
            chrome_idle_secs: 10,
            reaper_interval_ms: 1000,
            chrome_extra_args: vec![
                "--disable-gpu".to_string(),
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
                "--window-size=1920,1080".to_string(),
            ],
            chrome_binary_path: None,
            chrome_debug_port: None,
            dom_wait_timeout_secs: 10,
            lens_base_url: "https://lens.google.com".to_string(),
            images_user_agent: "Mozilla/5.0 (Lens OCR Images)".to_string(),
            text_user_agent: "Mozilla/5.0 (Lens Text OCR)".to_string(),
            image_fetch_timeout_secs: 10,
            upload_timeout_secs: 10,
            data_fetch_timeout_secs: 5,
            fallback_fetch_timeout_secs: 5,
            merge_threshold_x: 10.0,
            merge_threshold_y: 15.0,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// 加载配置：默认值 → `LENS_CONFIG` 指定的 TOML 文件 → 环境变量
    pub fn load() -> AppResult<Self> {
        let base = match std::env::var("LENS_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::from_toml_file(path.trim())?,
            _ => Self::default(),
        };
        Ok(base.with_env_overrides())
    }

    /// 仅从环境变量加载（未设置的项使用默认值）
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件加载，缺失的字段使用默认值
    pub fn from_toml_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source: e,
        })?;
        let config = toml::from_str(&content).map_err(|e| ConfigError::TomlParseFailed {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(config)
    }

    fn with_env_overrides(self) -> Self {
        let d = self;
        // MAX_WORKERS 是两个池的共同默认值
        let max_workers = env_or("MAX_WORKERS", d.max_workers_images);
        Self {
            port: env_or("PORT", d.port),
            max_workers_images: env_or("MAX_WORKERS_IMAGES", max_workers),
            max_workers_text: env_or("MAX_WORKERS_TEXT", d.max_workers_text),
            results_ttl_secs: env_or("RESULTS_TTL_SECONDS", d.results_ttl_secs),
            results_sweep_interval_secs: env_or(
                "RESULTS_SWEEP_SECONDS",
                d.results_sweep_interval_secs,
            ),
            max_base64_image_len: env_or("MAX_BASE64_IMAGE_LENGTH", d.max_base64_image_len),
            job_delay_ms: job_delay_from(
                env_opt("JOB_DELAY_MS"),
                env_opt("JOB_DELAY_SECONDS"),
                d.job_delay_ms,
            ),
            enable_background_workers: std::env::var("ENABLE_BACKGROUND_WORKERS")
                .map(|v| parse_flag(&v))
                .unwrap_or(d.enable_background_workers),
            cookie_json_url: env_opt("COOKIE_JSON_URL").or(d.cookie_json_url),
            cookie_fetch_timeout_secs: env_or("COOKIE_FETCH_TIMEOUT", d.cookie_fetch_timeout_secs),
            remote_identity_ttl_secs: env_or("REMOTE_COOKIE_TTL", d.remote_identity_ttl_secs),
            browser_identity_ttl_secs: env_or("BROWSER_COOKIE_TTL", d.browser_identity_ttl_secs),
            cookie_domain: env_opt("COOKIE_DOMAIN").unwrap_or(d.cookie_domain),
            chrome_idle_secs: env_or("CHROME_IDLE_SECONDS", d.chrome_idle_secs),
            reaper_interval_ms: env_or("CHROME_REAPER_INTERVAL_MS", d.reaper_interval_ms),
            chrome_extra_args: env_opt("CHROME_EXTRA_ARGS")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or(d.chrome_extra_args),
            chrome_binary_path: env_opt("CHROME_BINARY_PATH").or(d.chrome_binary_path),
            chrome_debug_port: env_opt("CHROME_DEBUG_PORT")
                .and_then(|v| v.parse().ok())
                .or(d.chrome_debug_port),
            dom_wait_timeout_secs: env_or("DOM_WAIT_TIMEOUT", d.dom_wait_timeout_secs),
            lens_base_url: env_opt("LENS_BASE_URL").unwrap_or(d.lens_base_url),
            images_user_agent: d.images_user_agent,
            text_user_agent: d.text_user_agent,
            image_fetch_timeout_secs: d.image_fetch_timeout_secs,
            upload_timeout_secs: d.upload_timeout_secs,
            data_fetch_timeout_secs: d.data_fetch_timeout_secs,
            fallback_fetch_timeout_secs: d.fallback_fetch_timeout_secs,
            merge_threshold_x: env_or("MERGE_THRESHOLD_X", d.merge_threshold_x),
            merge_threshold_y: env_or("MERGE_THRESHOLD_Y", d.merge_threshold_y),
            log_level: env_opt("LOG_LEVEL").unwrap_or(d.log_level),
        }
    }

    pub fn results_ttl(&self) -> Duration {
        Duration::from_secs(self.results_ttl_secs)
    }

    pub fn job_delay(&self) -> Duration {
        Duration::from_millis(self.job_delay_ms)
    }

    pub fn chrome_idle(&self) -> Duration {
        Duration::from_secs(self.chrome_idle_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms)
    }

    pub fn remote_identity_ttl(&self) -> Duration {
        Duration::from_secs(self.remote_identity_ttl_secs)
    }

    pub fn browser_identity_ttl(&self) -> Duration {
        Duration::from_secs(self.browser_identity_ttl_secs)
    }

    pub fn dom_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.dom_wait_timeout_secs)
    }

    /// 服务的首页地址（浏览器获取 Cookie 时访问）
    pub fn landing_url(&self) -> String {
        format!("{}/", self.lens_base_url.trim_end_matches('/'))
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env_opt(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// `JOB_DELAY_MS` 优先，其次兼容旧的 `JOB_DELAY_SECONDS`（可带小数）
fn job_delay_from(millis: Option<String>, seconds: Option<String>, default: u64) -> u64 {
    millis
        .and_then(|v| v.parse().ok())
        .or_else(|| {
            seconds
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(|secs| (secs * 1000.0).round() as u64)
        })
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
