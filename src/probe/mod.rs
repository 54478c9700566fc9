//! 链接探测模块
//!
//! 提供链接校验、SSRF防护、HTTP探测和检测结果类型

pub mod guard;
pub mod prober;
pub mod result;

// 重新导出主要类型
pub use guard::{is_public_ip, validate_url, GuardedResolver};
pub use prober::{HttpUrlProber, UrlProber};
pub use result::{CheckOutcome, CheckResult, ProbeMethod, ProbeResult};
