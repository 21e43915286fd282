//! 文字识别流程
//!
//! 取图 → 识别尺寸 → 上传 → 在共享浏览器中打开结果页 → 提取并合并文字区域

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use tracing::{info, warn};

use crate::browser::{BrowserCookie, BrowserSession, SessionGuard};
use crate::clients::LensClient;
use crate::config::Config;
use crate::error::{AppResult, ValidationError};
use crate::models::{Identity, JobMode, TextRegion};
use crate::services::dom_regions::extract_regions;
use crate::services::{full_text, merge_regions, IdentityManager, MergeThresholds};
use crate::workflow::{to_object, ImageSource, Pipeline};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullText {
    pub text: String,
}

/// 文字识别结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRecognition {
    /// 合并后的区域
    pub text_annotations: Vec<TextRegion>,
    /// 页面上的原始区域
    pub raw_text_annotations: Vec<TextRegion>,
    pub full_text_annotation: FullText,
    pub loc: String,
}

/// 文字识别流程
pub struct TextOcrFlow {
    client: LensClient,
    identity: Arc<IdentityManager>,
    session: Arc<BrowserSession>,
    cookie_domain: String,
    dom_timeout: Duration,
    thresholds: MergeThresholds,
}

impl TextOcrFlow {
    pub fn new(
        client: LensClient,
        identity: Arc<IdentityManager>,
        session: Arc<BrowserSession>,
        config: &Config,
    ) -> Self {
        Self {
            client,
            identity,
            session,
            cookie_domain: config.cookie_domain.clone(),
            dom_timeout: config.dom_wait_timeout(),
            thresholds: MergeThresholds {
                x: config.merge_threshold_x,
                y: config.merge_threshold_y,
            },
        }
    }

    pub async fn recognize(&self, source: ImageSource) -> AppResult<TextRecognition> {
        let image = match source {
            ImageSource::Url(url) => self.client.fetch_image(&url).await?.0,
            ImageSource::Inline(bytes) => bytes,
        };
        let (width, height) = image_dimensions(&image)?;

        // 先拿身份再占用浏览器，避免身份刷新时与浏览器锁互相等待
        let identity = self.identity.get_identity().await?;
        let redirect = self.client.upload(image, &identity).await?;
        let cookies = self.browser_cookies(&identity);

        let mut guard = self.session.acquire().await;
        if let Err(e) = open_result_page(&mut guard, &cookies, &redirect.location).await {
            warn!("⚠️ 打开结果页失败，重启浏览器后重试: {}", e);
            let browser = guard.relaunch().await?;
            browser.set_cookies(&cookies).await?;
            browser.navigate(&redirect.location).await?;
        }
        let raw = extract_regions(guard.browser().await?, width, height, self.dom_timeout).await?;
        drop(guard);

        let merged = merge_regions(&raw, self.thresholds);
        info!("✅ 识别到 {} 行文字，合并为 {} 个区域", raw.len(), merged.len());
        Ok(TextRecognition {
            text_annotations: merged,
            full_text_annotation: FullText {
                text: full_text(&raw),
            },
            raw_text_annotations: raw,
            loc: redirect.location,
        })
    }

    fn browser_cookies(&self, identity: &Identity) -> Vec<BrowserCookie> {
        let domain = format!(".{}", self.cookie_domain.trim_start_matches('.'));
        identity
            .cookies
            .iter()
            .map(|(name, value)| BrowserCookie {
                name: name.clone(),
                value: value.clone(),
                domain: domain.clone(),
            })
            .collect()
    }
}

/// 新启动的浏览器先写入身份 Cookie，再导航到结果页
async fn open_result_page(
    guard: &mut SessionGuard<'_>,
    cookies: &[BrowserCookie],
    location: &str,
) -> AppResult<()> {
    guard.browser().await?;
    if guard.is_fresh() {
        guard.browser().await?.set_cookies(cookies).await?;
    }
    guard.browser().await?.navigate(location).await
}

/// 读取图片尺寸（只解析文件头）
pub fn image_dimensions(bytes: &[u8]) -> AppResult<(u32, u32)> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ValidationError::UndecodableImage(image::ImageError::IoError(e)))?;
    Ok(reader.into_dimensions()?)
}

#[async_trait]
impl Pipeline for TextOcrFlow {
    fn mode(&self) -> JobMode {
        JobMode::LensText
    }

    async fn run(&self, src: &str, _lang: &str) -> AppResult<Map<String, JsonValue>> {
        let result = self.recognize(ImageSource::parse(src)?).await?;
        to_object(&result)
    }
}
