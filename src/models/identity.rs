//! 身份（Cookie）模型

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

/// Cookie 名称 → 值
pub type CookieMap = BTreeMap<String, String>;

/// 身份来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentitySource {
    /// 从远程 Cookie JSON 获取
    Remote,
    /// 由自动化浏览器访问首页获得
    Browser,
}

impl IdentitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentitySource::Remote => "remote",
            IdentitySource::Browser => "browser",
        }
    }
}

/// 一份可用于访问上游服务的身份
///
/// 刷新时整体替换，不做字段级合并
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub cookies: CookieMap,
    pub source: IdentitySource,
    /// 获取时刻（用于 TTL 判断）
    pub fetched_at: Instant,
    /// 获取时刻（用于日志展示）
    pub fetched_at_utc: DateTime<Utc>,
}

impl Identity {
    pub fn new(cookies: CookieMap, source: IdentitySource) -> Self {
        Self {
            cookies,
            source,
            fetched_at: Instant::now(),
            fetched_at_utc: Utc::now(),
        }
    }

    /// 拼接为 `Cookie` 请求头
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// 在给定 TTL 下是否仍然新鲜
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header() {
        let mut cookies = CookieMap::new();
        cookies.insert("SAPISID".to_string(), "sid".to_string());
        cookies.insert("NID".to_string(), "abc=def".to_string());
        let identity = Identity::new(cookies, IdentitySource::Remote);

        assert_eq!(identity.cookie_header(), "NID=abc=def; SAPISID=sid");
    }

    #[tokio::test(start_paused = true)]
    async fn test_freshness_follows_ttl() {
        let identity = Identity::new(CookieMap::new(), IdentitySource::Browser);
        assert!(identity.is_fresh(Duration::from_secs(900)));

        tokio::time::advance(Duration::from_secs(901)).await;
        assert!(!identity.is_fresh(Duration::from_secs(900)));
    }
}
