use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

/// 错误类别标签
///
/// Worker 根据该标签区分失败原因，写入 JobResult 的 `error_type` 字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 上游请求失败（HTTP 状态码、超时、其他 I/O）
    UpstreamFetch,
    /// 上游协议不符合预期（上传状态码、重定向、响应体）
    UpstreamProtocol,
    /// 自动化浏览器相关错误
    Browser,
    /// 任务参数校验失败
    Validation,
    /// 身份（Cookie）获取失败
    Identity,
    /// 其他内部错误
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UpstreamFetch => "upstream_fetch",
            ErrorKind::UpstreamProtocol => "upstream_protocol",
            ErrorKind::Browser => "browser",
            ErrorKind::Validation => "validation",
            ErrorKind::Identity => "identity",
            ErrorKind::Internal => "internal",
        }
    }
}

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 上游请求错误
    #[error("上游请求错误: {0}")]
    Upstream(#[from] UpstreamError),
    /// 上游协议错误
    #[error("上游协议错误: {0}")]
    Protocol(#[from] ProtocolError),
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// 任务校验错误
    #[error("校验错误: {0}")]
    Validation(#[from] ValidationError),
    /// 身份获取错误
    #[error("身份错误: {0}")]
    Identity(#[from] IdentityError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
    /// 同一次失败分发给多个等待者
    #[error("{0}")]
    Shared(Arc<AppError>),
}

/// 上游请求错误
///
/// 三种情况分别对应 `http_status` / `timeout` / `other` 标签
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("获取 {target} 失败: HTTP {code}")]
    HttpStatus { target: String, code: u16 },
    #[error("获取 {target} 失败: TIMEOUT")]
    Timeout { target: String },
    #[error("获取 {target} 失败: ERROR {detail}")]
    Other { target: String, detail: String },
}

impl UpstreamError {
    /// 根据 reqwest 错误归类
    pub fn classify(target: impl Into<String>, err: &reqwest::Error) -> Self {
        let target = target.into();
        if err.is_timeout() {
            UpstreamError::Timeout { target }
        } else if let Some(status) = err.status() {
            UpstreamError::HttpStatus {
                target,
                code: status.as_u16(),
            }
        } else {
            UpstreamError::Other {
                target,
                detail: err.to_string(),
            }
        }
    }

    /// 简短分类标签
    pub fn tag(&self) -> &'static str {
        match self {
            UpstreamError::HttpStatus { .. } => "http_status",
            UpstreamError::Timeout { .. } => "timeout",
            UpstreamError::Other { .. } => "other",
        }
    }
}

/// 上游协议错误
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Lens upload failed {status}")]
    UnexpectedUploadStatus { status: u16 },
    #[error("上传响应缺少重定向地址")]
    MissingRedirectLocation,
    #[error("重定向地址缺少参数 {name}: {location}")]
    MissingCorrelationToken { name: &'static str, location: String },
    #[error("JSON 解析失败: {source}; 响应片段: {snippet}")]
    MalformedBody {
        source: serde_json::Error,
        snippet: String,
    },
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 启动浏览器失败
    #[error("启动浏览器失败: {detail}")]
    LaunchFailed { detail: String },
    /// 连接浏览器失败
    #[error("无法连接到浏览器 (端口: {port}): {detail}")]
    ConnectionFailed { port: u16, detail: String },
    /// 导航失败
    #[error("导航到 {url} 失败: {detail}")]
    NavigationFailed { url: String, detail: String },
    /// 等待元素超时
    #[error("等待元素 {selector} 可见超时 ({timeout_ms}ms)")]
    ElementWaitTimeout { selector: String, timeout_ms: u128 },
    /// 执行脚本失败
    #[error("执行脚本失败: {detail}")]
    ScriptFailed { detail: String },
}

/// 任务校验错误
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("src missing")]
    MissingSource,
    #[error("{field} must be http(s)")]
    BlobUrl { field: &'static str },
    #[error("unsupported mode {mode}")]
    UnsupportedMode { mode: String },
    #[error("无效的 data URL")]
    InvalidDataUrl,
    #[error("无效的 URL: {url}")]
    InvalidUrl { url: String },
    #[error("无法识别图片尺寸: {0}")]
    UndecodableImage(#[from] image::ImageError),
}

/// 身份获取错误
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("未配置远程 Cookie 源")]
    RemoteNotConfigured,
    #[error("远程 Cookie 源返回的数据无法识别")]
    RemoteBadPayload,
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML 解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        source: toml::de::Error,
    },
}

impl AppError {
    /// 错误类别标签
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Upstream(_) => ErrorKind::UpstreamFetch,
            AppError::Protocol(_) => ErrorKind::UpstreamProtocol,
            AppError::Browser(_) => ErrorKind::Browser,
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Identity(_) => ErrorKind::Identity,
            AppError::Config(_) | AppError::Other(_) => ErrorKind::Internal,
            AppError::Shared(inner) => inner.kind(),
        }
    }

    /// 简短分类标签，上游请求错误细分为 `http_status` / `timeout` / `other`
    pub fn tag(&self) -> &'static str {
        match self {
            AppError::Upstream(e) => e.tag(),
            AppError::Shared(inner) => inner.tag(),
            other => other.kind().as_str(),
        }
    }

    /// 创建导航失败错误
    pub fn navigation_failed(url: impl Into<String>, detail: impl ToString) -> Self {
        AppError::Browser(BrowserError::NavigationFailed {
            url: url.into(),
            detail: detail.to_string(),
        })
    }

    /// 创建上游请求失败错误
    pub fn upstream(target: impl Into<String>, err: &reqwest::Error) -> Self {
        AppError::Upstream(UpstreamError::classify(target, err))
    }
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(BrowserError::ScriptFailed {
            detail: err.to_string(),
        })
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::upstream("request", &err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Protocol(ProtocolError::MalformedBody {
            source: err,
            snippet: String::new(),
        })
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Validation(ValidationError::UndecodableImage(err))
    }
}

impl From<regex::Error> for AppError {
    fn from(err: regex::Error) -> Self {
        AppError::Other(format!("正则表达式错误: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Other(err.to_string())
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
