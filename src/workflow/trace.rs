//! 流程轨迹
//!
//! 记录每一步做了什么以及非致命错误，随结果返回，便于排查上游格式变化

use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    pub steps: Vec<String>,
    pub errors: Vec<String>,
    pub duration_sec: f64,
    #[serde(skip)]
    started: Instant,
}

impl Trace {
    pub fn start() -> Self {
        Self {
            steps: Vec::new(),
            errors: Vec::new(),
            duration_sec: 0.0,
            started: Instant::now(),
        }
    }

    pub fn step(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!("  · {}", message);
        self.steps.push(message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!("  ✗ {}", message);
        self.errors.push(message);
    }

    /// 记录总耗时
    pub fn finish(mut self) -> Self {
        self.duration_sec = self.started.elapsed().as_secs_f64();
        self
    }
}
