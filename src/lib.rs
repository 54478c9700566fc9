//! Teaser Link Checker - 条目外链定时检测工具
//!
//! 周期性地检测内容条目上的teaser链接：
//! - 两级公平的批次选择，从未检测的条目优先
//! - HEAD优先、405时回退GET的链接探测
//! - 404标记失效，恢复后自动清除标记
//! - 开发环境下的有界检测日志

pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod probe;
pub mod scheduler;
pub mod store;

// 重新导出主要类型
pub use batch::{BatchRunner, BatchSelector, RunLog, RunReport};
pub use config::{Config, Environment, GlobalConfig};
pub use error::LinkCheckerError;
pub use probe::{CheckOutcome, CheckResult, HttpUrlProber, UrlProber};
pub use scheduler::{IntervalScheduler, Scheduler};
pub use store::{Item, ItemId, JsonFileStore, MemoryStore, MetadataStore};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
