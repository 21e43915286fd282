//! 推送投递
//!
//! 每个任务 id 最多登记一个推送通道，投递一次后立即移除，
//! 无论发送是否成功；失效的通道只在发送时才会被发现。

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult, ErrorKind};

/// 推送给调用方的终态消息
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeliveryMessage {
    Result {
        id: String,
        result: JsonValue,
    },
    Error {
        id: String,
        error: String,
        error_type: ErrorKind,
        /// 细分标签，上游请求错误为 `http_status` / `timeout` / `other`
        error_tag: &'static str,
    },
}

impl DeliveryMessage {
    pub fn failure(id: impl Into<String>, err: &AppError) -> Self {
        DeliveryMessage::Error {
            id: id.into(),
            error: err.to_string(),
            error_type: err.kind(),
            error_tag: err.tag(),
        }
    }
}

/// 一个推送通道（例如某个 WebSocket 连接）
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// 通道标识，同一连接上登记的多个任务共享同一标识
    fn channel_id(&self) -> &str;

    async fn send(&self, message: &DeliveryMessage) -> AppResult<()>;
}

/// 任务 id → 推送通道
#[derive(Default)]
pub struct DeliveryRegistry {
    channels: DashMap<String, Arc<dyn DeliveryChannel>>,
}

impl DeliveryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, job_id: &str, channel: Arc<dyn DeliveryChannel>) {
        self.channels.insert(job_id.to_string(), channel);
    }

    pub fn unregister(&self, job_id: &str) {
        self.channels.remove(job_id);
    }

    /// 连接断开时移除该连接登记的所有任务
    pub fn unregister_channel(&self, channel_id: &str) -> usize {
        let before = self.channels.len();
        self.channels.retain(|_, ch| ch.channel_id() != channel_id);
        before.saturating_sub(self.channels.len())
    }

    pub fn is_registered(&self, job_id: &str) -> bool {
        self.channels.contains_key(job_id)
    }

    /// 投递终态消息，返回是否发送成功
    pub async fn deliver(&self, job_id: &str, message: DeliveryMessage) -> bool {
        let Some((_, channel)) = self.channels.remove(job_id) else {
            return false;
        };
        match channel.send(&message).await {
            Ok(()) => {
                debug!("任务 {} 的结果已推送", job_id);
                true
            }
            Err(e) => {
                warn!("⚠️ 推送任务 {} 失败: {}", job_id, e);
                false
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingChannel;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_format() {
        let ok = DeliveryMessage::Result {
            id: "j1".to_string(),
            result: json!({ "text": "hi" }),
        };
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({ "type": "result", "id": "j1", "result": { "text": "hi" } })
        );

        let err = DeliveryMessage::failure(
            "j1",
            &crate::error::UpstreamError::HttpStatus {
                target: "image".to_string(),
                code: 404,
            }
            .into(),
        );
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({
                "type": "error",
                "id": "j1",
                "error": "上游请求错误: 获取 image 失败: HTTP 404",
                "error_type": "upstream_fetch",
                "error_tag": "http_status"
            })
        );
    }

    #[tokio::test]
    async fn test_delivers_at_most_once() {
        let registry = DeliveryRegistry::new();
        let channel = RecordingChannel::new("ws-1");
        registry.register("j1", channel.clone());

        let message = DeliveryMessage::Result {
            id: "j1".to_string(),
            result: json!({}),
        };
        assert!(registry.deliver("j1", message.clone()).await);
        assert!(!registry.deliver("j1", message).await);
        assert_eq!(channel.received.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_send_still_removes_channel() {
        let registry = DeliveryRegistry::new();
        registry.register("j1", RecordingChannel::failing("ws-1"));

        let message = DeliveryMessage::Result {
            id: "j1".to_string(),
            result: json!({}),
        };
        assert!(!registry.deliver("j1", message).await);
        assert!(!registry.is_registered("j1"));
    }

    #[test]
    fn test_unregister_channel_on_disconnect() {
        let registry = DeliveryRegistry::new();
        let a = RecordingChannel::new("ws-a");
        let b = RecordingChannel::new("ws-b");
        registry.register("j1", a.clone());
        registry.register("j2", a);
        registry.register("j3", b);

        assert_eq!(registry.unregister_channel("ws-a"), 2);
        assert!(registry.is_registered("j3"));
        registry.unregister("j3");
        assert!(!registry.is_registered("j3"));
    }
}
