/// Lens 上游客户端
///
/// 封装与上游服务的全部 HTTP 交互：取原图、上传、取翻译 JSON、兜底下载。
/// 上游接口没有文档且随时可能变化，格式相关的解析都集中在这里。
use std::time::Duration;

use base64::Engine;
use reqwest::redirect::Policy;
use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::error::{AppError, AppResult, ProtocolError, ValidationError};
use crate::models::Identity;
use crate::services::auth::auth_headers_now;

/// 翻译 JSON 前缀的防劫持字符
const JSON_GUARD: &[char] = &[')', ']', '}', '\''];

/// 解析失败时保留的响应片段长度
const SNIPPET_LEN: usize = 200;

/// 各阶段请求超时
#[derive(Debug, Clone, Copy)]
pub struct LensTimeouts {
    pub image: Duration,
    pub upload: Duration,
    pub data: Duration,
    pub fallback: Duration,
}

impl LensTimeouts {
    pub fn from_config(config: &Config) -> Self {
        Self {
            image: Duration::from_secs(config.image_fetch_timeout_secs),
            upload: Duration::from_secs(config.upload_timeout_secs),
            data: Duration::from_secs(config.data_fetch_timeout_secs),
            fallback: Duration::from_secs(config.fallback_fetch_timeout_secs),
        }
    }
}

/// 上传成功后的重定向
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRedirect {
    pub status: u16,
    pub location: String,
}

/// Lens 客户端
pub struct LensClient {
    http: reqwest::Client,
    /// 上传专用，不跟随重定向
    upload_http: reqwest::Client,
    base_url: String,
    user_agent: String,
    timeouts: LensTimeouts,
}

impl LensClient {
    pub fn new(config: &Config, user_agent: impl Into<String>) -> AppResult<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            upload_http: reqwest::Client::builder().redirect(Policy::none()).build()?,
            base_url: config.lens_base_url.trim_end_matches('/').to_string(),
            user_agent: user_agent.into(),
            timeouts: LensTimeouts::from_config(config),
        })
    }

    /// 图片翻译模式的客户端
    pub fn for_images(config: &Config) -> AppResult<Self> {
        Self::new(config, config.images_user_agent.clone())
    }

    /// 文字识别模式的客户端
    pub fn for_text(config: &Config) -> AppResult<Self> {
        Self::new(config, config.text_user_agent.clone())
    }

    /// 附加身份相关请求头
    fn with_identity(&self, request: RequestBuilder, identity: &Identity) -> RequestBuilder {
        let cookie = identity.cookie_header();
        let mut request = request
            .header("User-Agent", &self.user_agent)
            .header("Referer", format!("{}/", self.base_url))
            .header("Cookie", &cookie);
        for (name, value) in auth_headers_now(&cookie, &self.base_url) {
            request = request.header(name, value);
        }
        request
    }

    /// 获取原图，返回图片字节和状态码
    ///
    /// Referer 取自图片地址自身的源
    pub async fn fetch_image(&self, image_url: &str) -> AppResult<(Vec<u8>, u16)> {
        let mut request = self
            .http
            .get(image_url)
            .timeout(self.timeouts.image)
            .header("User-Agent", &self.user_agent);
        if let Some(referer) = referer_for(image_url) {
            request = request.header("Referer", referer);
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::upstream("image", &e))?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::upstream("image", &e))?;
        debug!("原图获取成功: {} ({} 字节)", image_url, bytes.len());
        Ok((bytes.to_vec(), status))
    }

    /// 以 multipart 上传图片，只接受 302 / 303
    pub async fn upload(&self, image: Vec<u8>, identity: &Identity) -> AppResult<UploadRedirect> {
        let part = reqwest::multipart::Part::bytes(image)
            .file_name("file.jpg")
            .mime_str("image/jpeg")?;
        let form = reqwest::multipart::Form::new()
            .part("encoded_image", part)
            .text("sbisrc", "browser")
            .text("rt", "j");

        let request = self
            .upload_http
            .post(format!("{}/v3/upload", self.base_url))
            .timeout(self.timeouts.upload)
            .multipart(form);
        let response = self
            .with_identity(request, identity)
            .send()
            .await
            .map_err(|e| AppError::upstream("upload", &e))?;

        let status = response.status();
        debug!("上传响应状态: {}", status);
        if status != StatusCode::FOUND && status != StatusCode::SEE_OTHER {
            return Err(ProtocolError::UnexpectedUploadStatus {
                status: status.as_u16(),
            }
            .into());
        }

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .unwrap_or_default();
        if location.is_empty() {
            return Err(ProtocolError::MissingRedirectLocation.into());
        }

        Ok(UploadRedirect {
            status: status.as_u16(),
            location: self.resolve(location)?,
        })
    }

    /// 相对地址按服务根地址补全
    fn resolve(&self, location: &str) -> AppResult<String> {
        let invalid = || ValidationError::InvalidUrl {
            url: location.to_string(),
        };
        match Url::parse(location) {
            Ok(url) => Ok(url.to_string()),
            Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(&self.base_url)
                .and_then(|base| base.join(location))
                .map(|url| url.to_string())
                .map_err(|_| invalid().into()),
            Err(_) => Err(invalid().into()),
        }
    }

    /// 根据重定向地址构造翻译 JSON 地址
    pub fn translated_image_url(&self, location: &str, lang: &str) -> AppResult<String> {
        let parsed = Url::parse(location).map_err(|_| ValidationError::InvalidUrl {
            url: location.to_string(),
        })?;
        let token = |name: &'static str| -> AppResult<String> {
            parsed
                .query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    ProtocolError::MissingCorrelationToken {
                        name,
                        location: location.to_string(),
                    }
                    .into()
                })
        };
        let vsrid = token("vsrid")?;
        let gsessionid = token("gsessionid")?;

        let url = Url::parse_with_params(
            &format!("{}/translatedimage", self.base_url),
            &[
                ("vsrid", vsrid.as_str()),
                ("gsessionid", gsessionid.as_str()),
                ("sl", "auto"),
                ("tl", lang),
                ("sf", "1.07"),
                ("ib", "1"),
            ],
        )
        .map_err(|_| ValidationError::InvalidUrl {
            url: self.base_url.clone(),
        })?;
        Ok(url.to_string())
    }

    /// 获取翻译 JSON 原文（含前缀）
    pub async fn fetch_translation_body(&self, json_url: &str, identity: &Identity) -> AppResult<String> {
        let request = self.http.get(json_url).timeout(self.timeouts.data);
        self.with_identity(request, identity)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::upstream("translation", &e))?
            .text()
            .await
            .map_err(|e| AppError::upstream("translation", &e))
    }

    /// 下载兜底图片并编码为 data URL
    pub async fn fetch_fallback_image(&self, image_url: &str) -> AppResult<String> {
        let bytes = self
            .http
            .get(image_url)
            .timeout(self.timeouts.fallback)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::upstream("fallback image", &e))?
            .bytes()
            .await
            .map_err(|e| AppError::upstream("fallback image", &e))?;
        Ok(format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        ))
    }
}

/// 图片地址的源，作为 Referer 使用
pub fn referer_for(image_url: &str) -> Option<String> {
    let url = Url::parse(image_url).ok()?;
    if !url.has_host() {
        return None;
    }
    Some(format!("{}/", url.origin().ascii_serialization()))
}

/// 去掉响应体前缀的防劫持字符
pub fn strip_guard(body: &str) -> &str {
    body.trim_start_matches(JSON_GUARD)
}

/// 去掉前缀后解析 JSON
pub fn parse_guarded_json(body: &str) -> AppResult<Value> {
    let stripped = strip_guard(body);
    serde_json::from_str(stripped).map_err(|source| {
        ProtocolError::MalformedBody {
            source,
            snippet: stripped.chars().take(SNIPPET_LEN).collect(),
        }
        .into()
    })
}
