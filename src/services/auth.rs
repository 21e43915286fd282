//! SAPISIDHASH 认证头
//!
//! 签名只在生成时刻有效，每次请求都重新计算

use sha1::{Digest, Sha1};

/// 可用作会话标识的 Cookie 名称
const SESSION_COOKIES: [&str; 2] = ["__Secure-3PAPISID", "SAPISID"];

/// 在 Cookie 头中查找会话标识（按出现顺序取第一个）
pub fn find_session_id(cookie_header: &str) -> Option<&str> {
    cookie_header.split("; ").find_map(|part| {
        SESSION_COOKIES
            .iter()
            .find_map(|name| part.strip_prefix(name)?.strip_prefix('='))
    })
}

/// `sha1("{ts} {sid} {origin}")` 的十六进制摘要
pub fn sapisid_hash(timestamp: i64, session_id: &str, origin: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("{} {} {}", timestamp, session_id, origin).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// 根据 Cookie 头生成认证相关请求头
///
/// 没有会话标识时返回空列表（匿名请求）
pub fn auth_headers(cookie_header: &str, origin: &str, timestamp: i64) -> Vec<(&'static str, String)> {
    let Some(sid) = find_session_id(cookie_header) else {
        return Vec::new();
    };
    let signature = sapisid_hash(timestamp, sid, origin);
    vec![
        ("X-Origin", origin.to_string()),
        ("X-Goog-AuthUser", "0".to_string()),
        ("Authorization", format!("SAPISIDHASH {}_{}", timestamp, signature)),
    ]
}

/// 使用当前时间生成认证请求头
pub fn auth_headers_now(cookie_header: &str, origin: &str) -> Vec<(&'static str, String)> {
    auth_headers(cookie_header, origin, chrono::Utc::now().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "https://lens.google.com";

    #[test]
    fn test_find_session_id() {
        assert_eq!(find_session_id("NID=1; SAPISID=abc; HSID=x"), Some("abc"));
        assert_eq!(
            find_session_id("__Secure-3PAPISID=sec; SAPISID=abc"),
            Some("sec")
        );
        assert_eq!(find_session_id("NID=1; XSAPISID=abc"), None);
        assert_eq!(find_session_id(""), None);
    }

    #[test]
    fn test_anonymous_request_has_no_headers() {
        assert!(auth_headers("NID=1", ORIGIN, 1_700_000_000).is_empty());
    }

    #[test]
    fn test_signature_uses_sent_timestamp() {
        let headers = auth_headers("SAPISID=abc", ORIGIN, 1_700_000_000);

        assert_eq!(headers[0], ("X-Origin", ORIGIN.to_string()));
        assert_eq!(headers[1], ("X-Goog-AuthUser", "0".to_string()));
        assert_eq!(
            headers[2],
            (
                "Authorization",
                "SAPISIDHASH 1700000000_d851aec3618168a1ccf32a79c019d0f4e84249b9".to_string()
            )
        );
    }
}
