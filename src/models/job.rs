//! 任务模型
//!
//! `Job` 是调用方提交的原始数据，`JobResult` 是按 id 存放的终态记录

use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use tokio::time::Instant;

use crate::error::{AppError, AppResult, ErrorKind, ValidationError};

/// 处理模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobMode {
    /// 返回合成后的翻译图片
    LensImages,
    /// 返回带坐标的文字区域
    LensText,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobMode::LensImages => "lens_images",
            JobMode::LensText => "lens_text",
        }
    }

    pub fn parse(mode: &str) -> AppResult<Self> {
        match mode {
            "lens_images" => Ok(JobMode::LensImages),
            "lens_text" => Ok(JobMode::LensText),
            other => Err(ValidationError::UnsupportedMode {
                mode: other.to_string(),
            }
            .into()),
        }
    }
}

impl Display for JobMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 图片在页面中的位置（调用方提供，原样回传）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
    pub viewport_width: i64,
    pub viewport_height: i64,
    pub scroll_x: f64,
    pub scroll_y: f64,
}

/// 流水线事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub stage: String,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// 页面上下文
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobContext {
    #[serde(default)]
    pub page_url: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// 调用方元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub image_id: String,
    #[serde(default)]
    pub original_image_url: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub pipeline: Vec<PipelineEvent>,
    #[serde(default)]
    pub ocr_image: Option<String>,
    #[serde(default)]
    pub extra: Option<Map<String, JsonValue>>,
}

/// 一个待处理任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default = "default_type", rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub menu: Option<String>,
    #[serde(default)]
    pub context: Option<JobContext>,
    pub metadata: JobMetadata,
}

fn default_mode() -> String {
    JobMode::LensImages.as_str().to_string()
}

fn default_lang() -> String {
    "en".to_string()
}

fn default_type() -> String {
    "image".to_string()
}

impl Job {
    /// 创建最简任务
    pub fn new(mode: JobMode, src: impl Into<String>, image_id: impl Into<String>) -> Self {
        Self {
            mode: mode.as_str().to_string(),
            lang: default_lang(),
            kind: default_type(),
            src: Some(src.into()),
            menu: None,
            context: None,
            metadata: JobMetadata {
                image_id: image_id.into(),
                ..Default::default()
            },
        }
    }

    /// 校验任务并返回处理模式
    ///
    /// 空字符串的地址视为未提供；`blob:` 地址无法在服务端访问，直接拒绝
    pub fn validate(&mut self) -> AppResult<JobMode> {
        normalize_url(&mut self.src, "src")?;
        normalize_url(&mut self.metadata.original_image_url, "original_image_url")?;
        JobMode::parse(&self.mode)
    }

    /// 追加一条流水线事件
    pub fn record(&mut self, stage: impl Into<String>) {
        self.metadata.pipeline.push(PipelineEvent {
            stage: stage.into(),
            at: Utc::now(),
            target: None,
        });
    }

    /// 在 `metadata.extra[mode][key]` 下写入标记
    pub fn flag_extra(&mut self, mode: JobMode, key: &str) {
        let extra = self.metadata.extra.get_or_insert_with(Map::new);
        let section = extra
            .entry(mode.as_str().to_string())
            .or_insert_with(|| JsonValue::Object(Map::new()));
        if !section.is_object() {
            *section = JsonValue::Object(Map::new());
        }
        if let Some(obj) = section.as_object_mut() {
            obj.insert(key.to_string(), JsonValue::Bool(true));
        }
    }
}

fn normalize_url(url: &mut Option<String>, field: &'static str) -> AppResult<()> {
    if url.as_deref().map(str::trim).is_some_and(str::is_empty) {
        *url = None;
    }
    if url.as_deref().is_some_and(|u| u.starts_with("blob:")) {
        return Err(ValidationError::BlobUrl { field }.into());
    }
    Ok(())
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Done,
    Error,
}

/// 任务结果
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// 排队中，尚无结果
    Queued,
    /// 成功，附带结果
    Done(JsonValue),
    /// 失败，附带错误信息、类别和细分标签
    Error {
        message: String,
        kind: ErrorKind,
        tag: &'static str,
    },
}

impl JobOutcome {
    pub fn failed(err: &AppError) -> Self {
        JobOutcome::Error {
            message: err.to_string(),
            kind: err.kind(),
            tag: err.tag(),
        }
    }
}

/// 按 id 存放的结果记录
///
/// 状态只允许 queued → done / error 单次变化
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub outcome: JobOutcome,
    pub created_at: Instant,
}

impl JobResult {
    pub fn queued() -> Self {
        Self {
            outcome: JobOutcome::Queued,
            created_at: Instant::now(),
        }
    }

    pub fn status(&self) -> JobStatus {
        match self.outcome {
            JobOutcome::Queued => JobStatus::Queued,
            JobOutcome::Done(_) => JobStatus::Done,
            JobOutcome::Error { .. } => JobStatus::Error,
        }
    }

    /// 轮询接口返回的 JSON
    pub fn to_response(&self, id: &str) -> JsonValue {
        match &self.outcome {
            JobOutcome::Queued => json!({ "id": id, "status": JobStatus::Queued }),
            JobOutcome::Done(payload) => json!({
                "id": id,
                "status": JobStatus::Done,
                "result": payload,
            }),
            JobOutcome::Error { message, kind, tag } => json!({
                "id": id,
                "status": JobStatus::Error,
                "result": message,
                "error_type": kind,
                "error_tag": tag,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_defaults() {
        let job: Job = serde_json::from_value(json!({
            "src": "https://example.com/a.png",
            "metadata": { "image_id": "img-1" }
        }))
        .unwrap();

        assert_eq!(job.mode, "lens_images");
        assert_eq!(job.lang, "en");
        assert_eq!(job.kind, "image");
        assert!(job.metadata.pipeline.is_empty());
    }

    #[test]
    fn test_validate_rejects_blob_and_unknown_mode() {
        let mut job = Job::new(JobMode::LensText, "blob:https://example.com/x", "a");
        assert!(job.validate().is_err());

        let mut job = Job::new(JobMode::LensText, "https://example.com/x.png", "a");
        job.mode = "lens_video".to_string();
        let err = job.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_validate_treats_empty_src_as_missing() {
        let mut job = Job::new(JobMode::LensImages, "  ", "a");
        assert_eq!(job.validate().unwrap(), JobMode::LensImages);
        assert!(job.src.is_none());
    }

    #[test]
    fn test_flag_extra() {
        let mut job = Job::new(JobMode::LensImages, "https://example.com/x.png", "a");
        job.flag_extra(JobMode::LensImages, "dropped_ocr_image_due_to_size");

        let extra = job.metadata.extra.unwrap();
        assert_eq!(
            extra["lens_images"]["dropped_ocr_image_due_to_size"],
            JsonValue::Bool(true)
        );
    }

    #[test]
    fn test_result_responses() {
        let queued = JobResult::queued();
        assert_eq!(
            queued.to_response("j1"),
            json!({ "id": "j1", "status": "queued" })
        );

        let failed = JobResult {
            outcome: JobOutcome::failed(&ValidationError::MissingSource.into()),
            created_at: Instant::now(),
        };
        assert_eq!(
            failed.to_response("j1"),
            json!({
                "id": "j1",
                "status": "error",
                "result": "校验错误: src missing",
                "error_type": "validation",
                "error_tag": "validation"
            })
        );

        let timeout = JobResult {
            outcome: JobOutcome::failed(
                &crate::error::UpstreamError::Timeout {
                    target: "image".to_string(),
                }
                .into(),
            ),
            created_at: Instant::now(),
        };
        let response = timeout.to_response("j2");
        assert_eq!(response["error_type"], "upstream_fetch");
        assert_eq!(response["error_tag"], "timeout");
    }
}
