//! 请求流程 - 流程层
//!
//! 每种模式一个流程，负责编排"身份 → 上游交互 → 后处理"的顺序。
//! 流程不持有任务状态，只接收图片来源和目标语言，返回结果对象。

pub mod image_flow;
pub mod job_ctx;
pub mod text_flow;
pub mod trace;

use async_trait::async_trait;
use base64::Engine;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::error::{AppError, AppResult, ValidationError};
use crate::models::JobMode;

pub use image_flow::{ImageTranslateFlow, ImageTranslation};
pub use job_ctx::JobCtx;
pub use text_flow::{TextOcrFlow, TextRecognition};
pub use trace::Trace;

/// 某一模式的处理流程
#[async_trait]
pub trait Pipeline: Send + Sync {
    fn mode(&self) -> JobMode;

    /// 处理一张图片，返回结果对象
    async fn run(&self, src: &str, lang: &str) -> AppResult<Map<String, JsonValue>>;
}

/// 图片来源
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    /// 需要下载的地址
    Url(String),
    /// 已有的图片字节
    Inline(Vec<u8>),
}

impl ImageSource {
    /// 解析任务中的 `src`：`data:` 开头视为内联图片，其余视为地址
    pub fn parse(src: &str) -> AppResult<Self> {
        if !src.starts_with("data:") {
            return Ok(ImageSource::Url(src.to_string()));
        }
        let (_, payload) = src.split_once(',').ok_or(ValidationError::InvalidDataUrl)?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|_| ValidationError::InvalidDataUrl)?;
        Ok(ImageSource::Inline(bytes))
    }
}

/// 结果结构体转为 JSON 对象
pub(crate) fn to_object<T: Serialize>(value: &T) -> AppResult<Map<String, JsonValue>> {
    match serde_json::to_value(value)? {
        JsonValue::Object(map) => Ok(map),
        other => Err(AppError::Other(format!("结果不是对象: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_source_parse() {
        assert_eq!(
            ImageSource::parse("https://example.com/a.png").unwrap(),
            ImageSource::Url("https://example.com/a.png".to_string())
        );
        assert_eq!(
            ImageSource::parse("data:image/png;base64,AAEC").unwrap(),
            ImageSource::Inline(vec![0, 1, 2])
        );
        assert!(ImageSource::parse("data:image/png;base64").is_err());
        assert!(ImageSource::parse("data:image/png;base64,***").is_err());
    }
}
