//! # Lens OCR Service
//!
//! 把图片交给 Google Lens 处理，返回翻译后的图片或带坐标的文字区域
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `browser/` - 共享浏览器会话，懒启动、空闲回收、互斥访问
//! - `infrastructure/` - `JsExecutor`，唯一的 page owner
//! - `clients/` - 上游 HTTP 交互（Lens、远程 Cookie）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `IdentityManager` - 身份缓存与刷新
//! - `dom_regions` - 从结果页提取文字区域
//! - `region_merge` - 合并同一段落的文字行
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一张图片"的完整处理流程
//! - `ImageTranslateFlow` - 上传 → 翻译 JSON → 图片还原
//! - `TextOcrFlow` - 上传 → 结果页 → 区域提取与合并
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/` - 队列、worker、结果存储与推送、应用生命周期
//! - `api/` - HTTP / WebSocket 接口
//!
//! ## 模块结构

pub mod api;
pub mod browser;
pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, ErrorKind};
pub use models::{Job, JobMode, JobResult, TextRegion};
pub use orchestrator::{App, JobEngine};
pub use workflow::{ImageTranslateFlow, Pipeline, TextOcrFlow};
