//! 结果存储
//!
//! 按任务 id 保存 `JobResult`，保留时长从创建时刻起算，与状态无关

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::models::{JobOutcome, JobResult, JobStatus};

pub struct ResultStore {
    records: DashMap<String, JobResult>,
    ttl: Duration,
}

impl ResultStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: DashMap::new(),
            ttl,
        }
    }

    fn is_expired(&self, record: &JobResult) -> bool {
        record.created_at.elapsed() > self.ttl
    }

    /// 入队时写入排队中记录；同一 id 重复提交时覆盖旧记录
    pub fn insert_queued(&self, id: &str) {
        self.records.insert(id.to_string(), JobResult::queued());
    }

    /// 写入终态
    ///
    /// 记录已是终态时忽略并返回 `false`；记录不存在或已过期时按新记录写入
    pub fn complete(&self, id: &str, outcome: JobOutcome) -> bool {
        let fresh = |outcome| JobResult {
            outcome,
            created_at: Instant::now(),
        };
        match self.records.entry(id.to_string()) {
            Entry::Occupied(mut entry) => {
                if self.is_expired(entry.get()) {
                    entry.insert(fresh(outcome));
                    return true;
                }
                let record = entry.get_mut();
                if record.status() != JobStatus::Queued {
                    warn!("⚠️ 任务 {} 已是终态 {:?}，忽略重复结果", id, record.status());
                    return false;
                }
                record.outcome = outcome;
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(fresh(outcome));
                true
            }
        }
    }

    /// 读取结果，过期视为不存在
    pub fn get(&self, id: &str) -> Option<JobResult> {
        self.records
            .get(id)
            .filter(|r| !self.is_expired(r))
            .map(|r| r.value().clone())
    }

    /// 删除所有过期记录，返回删除数量
    pub fn purge_expired(&self) -> usize {
        let before = self.records.len();
        self.records.retain(|_, r| r.created_at.elapsed() <= self.ttl);
        before.saturating_sub(self.records.len())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 启动后台清理任务，只持有弱引用
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                sleep(interval).await;
                let Some(store) = weak.upgrade() else {
                    break;
                };
                let purged = store.purge_expired();
                if purged > 0 {
                    debug!("清理了 {} 条过期结果，剩余 {}", purged, store.len());
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn store() -> ResultStore {
        ResultStore::new(Duration::from_secs(300))
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_is_monotone() {
        let store = store();
        store.insert_queued("j1");
        assert_eq!(store.get("j1").unwrap().status(), JobStatus::Queued);

        assert!(store.complete("j1", JobOutcome::Done(json!({ "text": "hi" }))));
        assert!(!store.complete(
            "j1",
            JobOutcome::Error {
                message: "late".to_string(),
                kind: ErrorKind::Internal,
                tag: "internal",
            }
        ));

        let record = store.get("j1").unwrap();
        assert_eq!(record.outcome, JobOutcome::Done(json!({ "text": "hi" })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retention_measured_from_creation() {
        let store = store();
        store.insert_queued("j1");
        tokio::time::advance(Duration::from_secs(200)).await;
        store.complete("j1", JobOutcome::Done(json!({})));

        tokio::time::advance(Duration::from_secs(99)).await;
        assert!(store.get("j1").is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("j1").is_none());
        assert_eq!(store.purge_expired(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_after_expiry_creates_fresh_record() {
        let store = store();
        store.insert_queued("slow");
        tokio::time::advance(Duration::from_secs(400)).await;

        assert!(store.complete("slow", JobOutcome::Done(json!({}))));
        assert_eq!(store.get("slow").unwrap().status(), JobStatus::Done);
        assert!(store.complete("unknown", JobOutcome::Done(json!({}))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_in_background() {
        let store = Arc::new(store());
        store.insert_queued("j1");
        let handle = store.spawn_sweeper(Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(361)).await;
        assert!(store.is_empty());
        handle.abort();
    }
}
