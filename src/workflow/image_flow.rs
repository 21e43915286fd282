//! 图片翻译流程
//!
//! 取原图 → 上传 → 根据重定向取翻译 JSON → 还原翻译后的图片

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use tracing::info;

use crate::clients::lens_client::parse_guarded_json;
use crate::clients::LensClient;
use crate::error::{AppError, AppResult};
use crate::models::JobMode;
use crate::services::IdentityManager;
use crate::workflow::{to_object, ImageSource, Pipeline, Trace};

/// 内嵌图片的匹配模式
const EMBEDDED_IMAGE_PATTERN: &str = r"data:image/[a-zA-Z]+;base64,[A-Za-z0-9+/=]+";

/// 图片翻译结果
#[derive(Debug, Clone, Serialize)]
pub struct ImageTranslation {
    /// 翻译后的图片（data URL），取不到时为空
    pub image: String,
    pub text: String,
    pub loc: String,
    pub json_url: String,
    pub raw_info: JsonValue,
    pub debug: Trace,
}

/// 图片翻译流程
pub struct ImageTranslateFlow {
    client: LensClient,
    identity: Arc<IdentityManager>,
}

impl ImageTranslateFlow {
    pub fn new(client: LensClient, identity: Arc<IdentityManager>) -> Self {
        Self { client, identity }
    }

    pub async fn translate(&self, source: ImageSource, lang: &str) -> AppResult<ImageTranslation> {
        let mut trace = Trace::start();
        let identity = self.identity.get_identity().await?;

        let image = match source {
            ImageSource::Url(url) => {
                let (bytes, status) = self.client.fetch_image(&url).await?;
                trace.step(format!("fetched original image {} status={}", url, status));
                bytes
            }
            ImageSource::Inline(bytes) => {
                trace.step(format!("using inline image ({} bytes)", bytes.len()));
                bytes
            }
        };

        let redirect = self.client.upload(image, &identity).await?;
        trace.step(format!("upload response status={}", redirect.status));
        trace.step(format!("got redirect location: {}", redirect.location));

        let json_url = self.client.translated_image_url(&redirect.location, lang)?;
        trace.step(format!("constructed json_url: {}", json_url));

        let body = self.client.fetch_translation_body(&json_url, &identity).await?;
        trace.step("fetched translation JSON");
        let info = parse_guarded_json(&body)?;

        let image = match info.get("imageUrl").and_then(JsonValue::as_str) {
            Some(reference) if !reference.is_empty() => {
                self.resolve_image(reference, &mut trace).await
            }
            _ => String::new(),
        };
        let text = translated_text(&info);

        Ok(ImageTranslation {
            image,
            text,
            loc: redirect.location,
            json_url,
            raw_info: info,
            debug: trace.finish(),
        })
    }

    /// 将 `imageUrl` 还原为 data URL，失败只记录到轨迹
    async fn resolve_image(&self, reference: &str, trace: &mut Trace) -> String {
        if reference.starts_with("data:image/") {
            trace.step("imageUrl already data URL");
            return reference.to_string();
        }

        match extract_embedded_image(reference) {
            Ok(Some(found)) => {
                trace.step("extracted embedded data:image from base64 HTML");
                return found;
            }
            Ok(None) => trace.step("no embedded data:image found inside decoded HTML"),
            Err(e) => trace.error(format!("error decoding imageUrl: {}", e)),
        }

        if reference.starts_with("http://") || reference.starts_with("https://") {
            match self.client.fetch_fallback_image(reference).await {
                Ok(data_url) => {
                    trace.step("fetched fallback image URL and encoded to data URL");
                    return data_url;
                }
                Err(e) => trace.error(format!("fallback fetch of imageUrl failed: {}", e)),
            }
        }
        String::new()
    }
}

#[async_trait]
impl Pipeline for ImageTranslateFlow {
    fn mode(&self) -> JobMode {
        JobMode::LensImages
    }

    async fn run(&self, src: &str, lang: &str) -> AppResult<Map<String, JsonValue>> {
        let result = self.translate(ImageSource::parse(src)?, lang).await?;
        info!(
            "✅ 图片翻译完成 (图片 {} 字符, 文本 {} 字符)",
            result.image.len(),
            result.text.chars().count()
        );
        to_object(&result)
    }
}

/// 把 `imageUrl` 当作 base64 编码的 HTML，扫描其中的内嵌图片
fn extract_embedded_image(reference: &str) -> AppResult<Option<String>> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(reference)
        .map_err(|e| AppError::Other(e.to_string()))?;
    let html = String::from_utf8_lossy(&decoded);
    let pattern = Regex::new(EMBEDDED_IMAGE_PATTERN)?;
    Ok(pattern.find(&html).map(|m| m.as_str().to_string()))
}

/// 优先取完整译文
fn translated_text(info: &JsonValue) -> String {
    ["translatedTextFull", "translatedText"]
        .iter()
        .filter_map(|key| info.get(*key).and_then(JsonValue::as_str))
        .find(|text| !text.is_empty())
        .unwrap_or_default()
        .to_string()
}
