//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`：数据模型（FileGroup / RunResult / SelectionOutcome）
//! - `plan`：链接分组与选择后的展开
//! - `progress`：进度条与滚动日志
//! - `worker_pool`：带重试的下载工作池
//! - `downloader`：下载主流程编排

pub mod downloader;
pub mod models;
pub mod plan;
pub mod progress;
pub mod worker_pool;
