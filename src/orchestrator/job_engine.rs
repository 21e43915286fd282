//! 任务引擎
//!
//! 每种模式一个无界 FIFO 队列和一组固定数量的 worker。
//! 提交时先写入排队中的结果记录，再入队，轮询方不会看到"不存在"的已提交任务。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{AppError, AppResult, ValidationError};
use crate::models::{Job, JobMode, JobResult};
use crate::orchestrator::delivery::{DeliveryChannel, DeliveryRegistry};
use crate::orchestrator::result_store::ResultStore;
use crate::orchestrator::worker::{QueuedJob, SharedQueue, Worker, WorkerSettings};
use crate::workflow::Pipeline;

/// 提交来源对应的流水线阶段
pub const STAGE_RECEIVED_REST: &str = "received_rest";
pub const STAGE_RECEIVED_WS: &str = "received_ws";

struct Lane {
    sender: UnboundedSender<QueuedJob>,
    queue: SharedQueue,
    pipeline: Arc<dyn Pipeline>,
}

pub struct JobEngine {
    lanes: HashMap<JobMode, Lane>,
    results: Arc<ResultStore>,
    delivery: Arc<DeliveryRegistry>,
    settings: WorkerSettings,
    started: AtomicBool,
}

impl JobEngine {
    pub fn new(
        pipelines: Vec<Arc<dyn Pipeline>>,
        results: Arc<ResultStore>,
        delivery: Arc<DeliveryRegistry>,
        settings: WorkerSettings,
    ) -> Self {
        let lanes = pipelines
            .into_iter()
            .map(|pipeline| {
                let (sender, receiver) = mpsc::unbounded_channel();
                let lane = Lane {
                    sender,
                    queue: Arc::new(Mutex::new(receiver)),
                    pipeline: pipeline.clone(),
                };
                (pipeline.mode(), lane)
            })
            .collect();
        Self {
            lanes,
            results,
            delivery,
            settings,
            started: AtomicBool::new(false),
        }
    }

    /// 校验并提交任务，返回任务 id
    ///
    /// 未提供 id 时自动生成
    pub fn submit(&self, mut job: Job, id: Option<String>, stage: &str) -> AppResult<String> {
        let mode = job.validate()?;
        let lane = self.lanes.get(&mode).ok_or_else(|| ValidationError::UnsupportedMode {
            mode: mode.to_string(),
        })?;

        let id = id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        job.record(stage);

        self.results.insert_queued(&id);
        lane.sender
            .send(QueuedJob {
                id: id.clone(),
                mode,
                job,
            })
            .map_err(|_| AppError::Other(format!("{} 队列已关闭", mode)))?;
        Ok(id)
    }

    /// 启动所有 worker，重复调用无效果
    pub fn ensure_started(&self) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            return false;
        }
        for (mode, lane) in &self.lanes {
            let count = self.settings.workers_for(*mode);
            info!("🚀 启动 {} 个 {} worker", count, mode);
            for index in 0..count {
                let worker = Worker {
                    index,
                    queue: lane.queue.clone(),
                    pipeline: lane.pipeline.clone(),
                    results: self.results.clone(),
                    delivery: self.delivery.clone(),
                    settings: self.settings,
                };
                tokio::spawn(worker.run());
            }
        }
        true
    }

    pub fn result(&self, id: &str) -> Option<JobResult> {
        self.results.get(id)
    }

    pub fn register_channel(&self, job_id: &str, channel: Arc<dyn DeliveryChannel>) {
        self.delivery.register(job_id, channel);
    }

    pub fn delivery(&self) -> &Arc<DeliveryRegistry> {
        &self.delivery
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::{JobOutcome, JobStatus};
    use crate::orchestrator::delivery::testing::RecordingChannel;
    use crate::orchestrator::delivery::DeliveryMessage;
    use crate::orchestrator::worker::DROPPED_IMAGE_FLAG;
    use async_trait::async_trait;
    use serde_json::{json, Map, Value as JsonValue};
    use std::time::Duration;

    /// 根据 src 决定行为的假流程
    struct FakePipeline {
        mode: JobMode,
    }

    #[async_trait]
    impl Pipeline for FakePipeline {
        fn mode(&self) -> JobMode {
            self.mode
        }

        async fn run(&self, src: &str, lang: &str) -> AppResult<Map<String, JsonValue>> {
            match src {
                "panic" => panic!("pipeline exploded"),
                "upload-500" => {
                    Err(crate::error::ProtocolError::UnexpectedUploadStatus { status: 500 }.into())
                }
                "huge" => Ok(json!({ "image": "x".repeat(64), "text": "big" })
                    .as_object()
                    .cloned()
                    .unwrap_or_default()),
                _ => Ok(json!({ "image": "data:image/png;base64,AAA", "text": format!("{}:{}", src, lang) })
                    .as_object()
                    .cloned()
                    .unwrap_or_default()),
            }
        }
    }

    fn engine(workers: usize) -> Arc<JobEngine> {
        Arc::new(JobEngine::new(
            vec![
                Arc::new(FakePipeline {
                    mode: JobMode::LensImages,
                }) as Arc<dyn Pipeline>,
                Arc::new(FakePipeline {
                    mode: JobMode::LensText,
                }),
            ],
            Arc::new(ResultStore::new(Duration::from_secs(300))),
            Arc::new(DeliveryRegistry::new()),
            WorkerSettings {
                images_workers: workers,
                text_workers: workers,
                max_image_len: 32,
                delay: Duration::ZERO,
            },
        ))
    }

    async fn wait_terminal(engine: &JobEngine, id: &str) -> JobResult {
        for _ in 0..200 {
            if let Some(result) = engine.result(id) {
                if result.status() != JobStatus::Queued {
                    return result;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not finish", id);
    }

    #[tokio::test]
    async fn test_queued_before_processing_then_done() {
        let engine = engine(1);
        let id = engine
            .submit(
                Job::new(JobMode::LensImages, "https://example.com/a.png", "img"),
                Some("j1".to_string()),
                STAGE_RECEIVED_REST,
            )
            .unwrap();
        assert_eq!(id, "j1");
        assert_eq!(
            engine.result("j1").unwrap().to_response("j1"),
            json!({ "id": "j1", "status": "queued" })
        );

        assert!(engine.ensure_started());
        assert!(!engine.ensure_started());

        let result = wait_terminal(&engine, "j1").await;
        let JobOutcome::Done(payload) = result.outcome else {
            panic!("expected done");
        };
        assert_eq!(payload["text"], "https://example.com/a.png:en");
        let stages: Vec<&str> = payload["metadata"]["pipeline"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["stage"].as_str().unwrap())
            .collect();
        assert_eq!(stages, ["received_rest", "worker_start", "translated"]);
    }

    #[tokio::test]
    async fn test_missing_src_is_validation_error() {
        let engine = engine(1);
        engine.ensure_started();
        let mut job = Job::new(JobMode::LensText, "", "img");
        job.src = None;
        let id = engine.submit(job, None, STAGE_RECEIVED_WS).unwrap();
        assert!(!id.is_empty());

        let result = wait_terminal(&engine, &id).await;
        match result.outcome {
            JobOutcome::Error { message, kind, .. } => {
                assert_eq!(kind, ErrorKind::Validation);
                assert!(message.contains("src missing"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_rejects_unsupported_mode() {
        let engine = engine(1);
        let mut job = Job::new(JobMode::LensText, "https://example.com/a.png", "img");
        job.mode = "lens_video".to_string();

        let err = engine.submit(job, Some("bad".to_string()), STAGE_RECEIVED_REST).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(engine.result("bad").is_none());
    }

    #[tokio::test]
    async fn test_oversize_image_is_stripped_and_flagged() {
        let engine = engine(1);
        engine.ensure_started();
        let id = engine
            .submit(Job::new(JobMode::LensImages, "huge", "img"), None, STAGE_RECEIVED_REST)
            .unwrap();

        let JobOutcome::Done(payload) = wait_terminal(&engine, &id).await.outcome else {
            panic!("expected done");
        };
        assert!(payload.get("image").is_none());
        assert_eq!(payload["text"], "big");
        assert_eq!(
            payload["metadata"]["extra"]["lens_images"][DROPPED_IMAGE_FLAG],
            JsonValue::Bool(true)
        );
    }

    #[tokio::test]
    async fn test_worker_survives_panic_and_protocol_errors() {
        let engine = engine(1);
        engine.ensure_started();
        let panicked = engine
            .submit(Job::new(JobMode::LensText, "panic", "a"), None, STAGE_RECEIVED_REST)
            .unwrap();
        let rejected = engine
            .submit(Job::new(JobMode::LensText, "upload-500", "b"), None, STAGE_RECEIVED_REST)
            .unwrap();
        let fine = engine
            .submit(Job::new(JobMode::LensText, "ok", "c"), None, STAGE_RECEIVED_REST)
            .unwrap();

        assert_eq!(wait_terminal(&engine, &panicked).await.status(), JobStatus::Error);
        match wait_terminal(&engine, &rejected).await.outcome {
            JobOutcome::Error { kind, message, .. } => {
                assert_eq!(kind, ErrorKind::UpstreamProtocol);
                assert!(message.contains("Lens upload failed 500"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(wait_terminal(&engine, &fine).await.status(), JobStatus::Done);
    }

    #[tokio::test]
    async fn test_pushed_payload_matches_polled_payload() {
        let engine = engine(2);
        let channel = RecordingChannel::new("ws-1");
        engine.register_channel("j-push", channel.clone());
        engine
            .submit(
                Job::new(JobMode::LensImages, "https://example.com/p.png", "img"),
                Some("j-push".to_string()),
                STAGE_RECEIVED_WS,
            )
            .unwrap();
        engine.ensure_started();

        let JobOutcome::Done(polled) = wait_terminal(&engine, "j-push").await.outcome else {
            panic!("expected done");
        };
        // 推送发生在写入结果之后
        for _ in 0..100 {
            if !channel.received.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let received = channel.received.lock().clone();
        assert_eq!(
            received,
            vec![DeliveryMessage::Result {
                id: "j-push".to_string(),
                result: polled,
            }]
        );
        assert!(!engine.delivery().is_registered("j-push"));
    }

    #[tokio::test]
    async fn test_failed_push_keeps_polled_result() {
        let engine = engine(1);
        engine.register_channel("j-dead", RecordingChannel::failing("ws-dead"));
        engine
            .submit(
                Job::new(JobMode::LensText, "https://example.com/p.png", "img"),
                Some("j-dead".to_string()),
                STAGE_RECEIVED_WS,
            )
            .unwrap();
        engine.ensure_started();

        assert_eq!(wait_terminal(&engine, "j-dead").await.status(), JobStatus::Done);
    }
}
