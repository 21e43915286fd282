//! 单个 worker 的处理循环
//!
//! worker 从所属模式的队列中逐个取任务，任务失败（包括 panic）只会写入错误结果，
//! 不会让 worker 退出。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value as JsonValue;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, ValidationError};
use crate::models::{Job, JobMode, JobOutcome};
use crate::orchestrator::delivery::{DeliveryMessage, DeliveryRegistry};
use crate::orchestrator::result_store::ResultStore;
use crate::workflow::{JobCtx, Pipeline};

/// 结果中超长图片被丢弃时写入的标记
pub const DROPPED_IMAGE_FLAG: &str = "dropped_ocr_image_due_to_size";

/// 队列中的任务
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: String,
    pub mode: JobMode,
    pub job: Job,
}

/// 同一模式的所有 worker 共享一个接收端
pub type SharedQueue = Arc<Mutex<UnboundedReceiver<QueuedJob>>>;

/// worker 参数
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub images_workers: usize,
    pub text_workers: usize,
    /// 结果中 `image` 字段的最大长度
    pub max_image_len: usize,
    /// 每个任务之后的等待时间
    pub delay: Duration,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            images_workers: config.max_workers_images,
            text_workers: config.max_workers_text,
            max_image_len: config.max_base64_image_len,
            delay: config.job_delay(),
        }
    }

    pub fn workers_for(&self, mode: JobMode) -> usize {
        match mode {
            JobMode::LensImages => self.images_workers,
            JobMode::LensText => self.text_workers,
        }
    }
}

pub struct Worker {
    pub index: usize,
    pub queue: SharedQueue,
    pub pipeline: Arc<dyn Pipeline>,
    pub results: Arc<ResultStore>,
    pub delivery: Arc<DeliveryRegistry>,
    pub settings: WorkerSettings,
}

impl Worker {
    /// 处理循环，只有队列关闭时才会返回
    pub async fn run(self) {
        loop {
            let next = self.queue.lock().await.recv().await;
            let Some(queued) = next else {
                warn!("⚠️ {} 队列已关闭，worker#{} 退出", self.pipeline.mode(), self.index);
                break;
            };
            self.process(queued).await;
            if !self.settings.delay.is_zero() {
                tokio::time::sleep(self.settings.delay).await;
            }
        }
    }

    /// 处理一个任务：写入终态结果，然后尝试推送
    pub async fn process(&self, queued: QueuedJob) {
        let QueuedJob { id, mode, mut job } = queued;
        let ctx = JobCtx::new(&id, mode, self.index);
        info!("{} ▶️ 开始处理", ctx);
        job.record("worker_start");

        let result = AssertUnwindSafe(self.execute(&mut job, mode))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(AppError::Other(format!(
                    "worker panic: {}",
                    panic_message(panic.as_ref())
                )))
            });

        let message = match result {
            Ok(payload) => {
                info!("{} ✅ 处理完成", ctx);
                self.results.complete(&id, JobOutcome::Done(payload.clone()));
                DeliveryMessage::Result {
                    id: id.clone(),
                    result: payload,
                }
            }
            Err(e) => {
                error!("{} ❌ 处理失败 [{}]: {}", ctx, e.tag(), e);
                self.results.complete(&id, JobOutcome::failed(&e));
                DeliveryMessage::failure(id.clone(), &e)
            }
        };
        self.delivery.deliver(&id, message).await;
    }

    async fn execute(&self, job: &mut Job, mode: JobMode) -> AppResult<JsonValue> {
        let src = job.src.clone().ok_or(ValidationError::MissingSource)?;
        let mut output = self.pipeline.run(&src, &job.lang).await?;

        let oversize = output
            .get("image")
            .and_then(JsonValue::as_str)
            .is_some_and(|image| image.len() > self.settings.max_image_len);
        if oversize {
            warn!("⚠️ 结果图片超过 {} 字符，已丢弃", self.settings.max_image_len);
            output.remove("image");
            job.flag_extra(mode, DROPPED_IMAGE_FLAG);
        }

        job.record("translated");
        output.insert("metadata".to_string(), serde_json::to_value(&job.metadata)?);
        Ok(JsonValue::Object(output))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown".to_string())
}
