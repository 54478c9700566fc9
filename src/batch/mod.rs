//! 批次检测模块
//!
//! 包含批次选择、检测运行和检测日志

pub mod run_log;
pub mod runner;
pub mod selector;

// 重新导出主要类型
pub use run_log::{RunLog, LOG_SEPARATOR, MAX_LOG_ENTRIES};
pub use runner::{BatchRunner, RunReport};
pub use selector::BatchSelector;
