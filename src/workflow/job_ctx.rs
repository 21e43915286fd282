//! 任务处理上下文
//!
//! 封装"我正在处理哪个任务"这一信息，只用于日志

use std::fmt::Display;

use crate::models::JobMode;

#[derive(Debug, Clone)]
pub struct JobCtx {
    pub job_id: String,
    pub mode: JobMode,
    /// 处理该任务的 worker 编号
    pub worker: usize,
}

impl JobCtx {
    pub fn new(job_id: impl Into<String>, mode: JobMode, worker: usize) -> Self {
        Self {
            job_id: job_id.into(),
            mode,
            worker,
        }
    }
}

impl Display for JobCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} worker#{} 任务#{}]",
            self.mode, self.worker, self.job_id
        )
    }
}
