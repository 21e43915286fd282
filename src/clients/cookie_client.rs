/// 远程 Cookie 客户端
///
/// 从配置的 JSON 地址拉取一份现成的 Cookie
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::error::{AppError, AppResult, IdentityError};
use crate::models::{CookieMap, IdentitySource};
use crate::services::identity_service::IdentityProvider;

/// 远程 Cookie 来源
pub struct RemoteIdentityProvider {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl RemoteIdentityProvider {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            timeout,
        }
    }

    /// 根据配置创建，未配置地址时返回 `None`
    pub fn from_config(config: &Config) -> Option<Self> {
        config.cookie_json_url.as_ref().map(|url| {
            Self::new(
                url.clone(),
                Duration::from_secs(config.cookie_fetch_timeout_secs),
            )
        })
    }
}

#[async_trait]
impl IdentityProvider for RemoteIdentityProvider {
    fn source(&self) -> IdentitySource {
        IdentitySource::Remote
    }

    async fn fetch(&self) -> AppResult<CookieMap> {
        debug!("正在获取远程 Cookie: {}", self.url);
        let body: Value = self
            .http
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::upstream("cookies", &e))?
            .json()
            .await
            .map_err(|e| AppError::upstream("cookies", &e))?;

        parse_cookie_payload(&body)
    }
}

/// 解析 Cookie JSON
///
/// 支持 `{"cookies": {...}}` 和扁平对象两种形式，`_source` 字段被忽略
pub fn parse_cookie_payload(body: &Value) -> AppResult<CookieMap> {
    let object = body
        .get("cookies")
        .and_then(Value::as_object)
        .or_else(|| body.as_object())
        .ok_or(IdentityError::RemoteBadPayload)?;

    Ok(object
        .iter()
        .filter(|(name, _)| name.as_str() != "_source")
        .map(|(name, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (name.clone(), value)
        })
        .collect())
}
