//! WebSocket 接口
//!
//! 同一连接上可以提交多个任务，每个任务的终态结果通过该连接推送一次。
//! 连接断开时移除它登记的全部通道。

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::error::{AppError, AppResult, ValidationError};
use crate::models::Job;
use crate::orchestrator::delivery::{DeliveryChannel, DeliveryMessage};
use crate::orchestrator::job_engine::STAGE_RECEIVED_WS;
use crate::orchestrator::JobEngine;

/// 客户端消息
#[derive(Debug, Deserialize)]
struct ClientMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    payload: Option<Job>,
}

/// 以连接为单位的推送通道，消息经由发送队列写出
struct WsChannel {
    id: String,
    outbound: UnboundedSender<String>,
}

#[async_trait]
impl DeliveryChannel for WsChannel {
    fn channel_id(&self) -> &str {
        &self.id
    }

    async fn send(&self, message: &DeliveryMessage) -> AppResult<()> {
        let text = serde_json::to_string(message)?;
        self.outbound
            .send(text)
            .map_err(|_| AppError::Other(format!("连接 {} 已关闭", self.id)))
    }
}

pub async fn upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.engine))
}

async fn handle_socket(socket: WebSocket, engine: Arc<JobEngine>) {
    engine.ensure_started();
    let channel_id = uuid::Uuid::new_v4().to_string();
    let (mut sink, mut stream) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    info!("🔌 WebSocket 已连接: {}", channel_id);

    let writer = tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let channel = Arc::new(WsChannel {
        id: channel_id.clone(),
        outbound: outbound.clone(),
    });

    while let Some(Ok(message)) = stream.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let reply = handle_text(&engine, &channel, &text);
        for message in reply {
            if outbound.send(message.to_string()).is_err() {
                break;
            }
        }
    }

    let removed = engine.delivery().unregister_channel(&channel_id);
    info!("🔌 WebSocket 已断开: {} (移除 {} 个待推送任务)", channel_id, removed);
    drop(channel);
    drop(outbound);
    if let Err(e) = writer.await {
        debug!("WebSocket 写任务异常结束: {}", e);
    }
}

/// 处理一条客户端消息，返回需要立即回复的内容
///
/// 确认消息先于任务入队写出，推送结果一定在确认之后
fn handle_text(engine: &JobEngine, channel: &Arc<WsChannel>, text: &str) -> Vec<JsonValue> {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => return vec![error_reply(e.to_string())],
    };
    if message.kind != "job" {
        return vec![error_reply("unknown_type")];
    }
    let Some(mut job) = message.payload else {
        return vec![error_reply("payload missing")];
    };
    if let Err(e) = job.validate() {
        return vec![match e {
            AppError::Validation(ValidationError::UnsupportedMode { .. }) => {
                error_reply("unsupported_mode")
            }
            other => error_reply(other.to_string()),
        }];
    }

    let id = message
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    if channel
        .outbound
        .send(json!({ "type": "ack", "id": id }).to_string())
        .is_err()
    {
        return Vec::new();
    }

    engine.register_channel(&id, channel.clone());
    match engine.submit(job, Some(id.clone()), STAGE_RECEIVED_WS) {
        Ok(_) => {
            debug!("WebSocket 任务已入队: {}", id);
            Vec::new()
        }
        Err(e) => {
            warn!("⚠️ WebSocket 任务提交失败: {}", e);
            engine.delivery().unregister(&id);
            vec![error_reply(e.to_string())]
        }
    }
}

fn error_reply(detail: impl Into<String>) -> JsonValue {
    json!({ "type": "error", "detail": detail.into() })
}
