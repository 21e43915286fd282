//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责任务调度和资源装配，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用生命周期
//! - 装配浏览器会话、身份管理器、两条流程和任务引擎
//! - 启动后台任务（浏览器回收、结果清理、worker）
//! - 运行 HTTP 服务，退出时关闭浏览器
//!
//! ### `job_engine` - 任务引擎
//! - 每种模式一个 FIFO 队列
//! - 提交校验、生成 id、写入排队中记录
//! - worker 只启动一次
//!
//! ### `worker` - 单个 worker
//! - 逐个处理任务，错误和 panic 都转为错误结果
//!
//! ### `result_store` / `delivery` - 结果的两种取法
//! - 轮询：按 id 读取，带保留时长
//! - 推送：每个 id 最多投递一次
//!
//! ## 层次关系
//!
//! ```text
//! app (装配 + 生命周期)
//!     ↓
//! job_engine → worker (处理单个 Job)
//!     ↓
//! workflow::Pipeline (图片翻译 / 文字识别)
//!     ↓
//! services / clients (身份、区域合并、上游请求)
//!     ↓
//! browser / infrastructure (共享浏览器、JsExecutor)
//! ```

pub mod app;
pub mod delivery;
pub mod job_engine;
pub mod result_store;
pub mod worker;

pub use app::App;
pub use delivery::{DeliveryChannel, DeliveryMessage, DeliveryRegistry};
pub use job_engine::JobEngine;
pub use result_store::ResultStore;
pub use worker::WorkerSettings;
