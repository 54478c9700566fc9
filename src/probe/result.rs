//! 链接检测结果数据结构
//!
//! 定义检测结论枚举、单次探测结果和单个条目的检测记录

use crate::store::ItemId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 检测结论
///
/// 只有收到完整HTTP响应的结论才携带状态码。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "status_code", rename_all = "snake_case")]
pub enum CheckOutcome {
    /// 链接可用（非404响应）
    Ok(u16),
    /// 链接失效（404响应）
    Broken(u16),
    /// 网络层失败，结论不确定
    NetworkError,
    /// 链接缺失或格式无效，未发起请求
    Skipped,
}

impl CheckOutcome {
    /// 根据HTTP状态码判定结论
    pub fn from_status(status_code: u16) -> Self {
        if status_code == 404 {
            CheckOutcome::Broken(status_code)
        } else {
            CheckOutcome::Ok(status_code)
        }
    }

    /// HTTP状态码（如果有）
    pub fn status_code(&self) -> Option<u16> {
        match self {
            CheckOutcome::Ok(code) | CheckOutcome::Broken(code) => Some(*code),
            CheckOutcome::NetworkError | CheckOutcome::Skipped => None,
        }
    }

    /// 检测日志中的标签
    pub fn label(&self) -> String {
        match self {
            CheckOutcome::Ok(code) => format!("{code} OK"),
            CheckOutcome::Broken(code) => format!("{code} BROKEN"),
            CheckOutcome::NetworkError => "NETWORK ERROR".to_string(),
            CheckOutcome::Skipped => "SKIPPED".to_string(),
        }
    }
}

impl std::fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

/// 发起探测所用的请求方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProbeMethod {
    /// 未发起请求
    None,
    /// HEAD请求
    Head,
    /// GET回退请求
    Get,
}

/// 单次URL探测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// 检测结论
    pub outcome: CheckOutcome,
    /// 最终使用的请求方法
    pub method: ProbeMethod,
    /// 探测耗时
    #[serde(with = "duration_serde")]
    pub response_time: Duration,
    /// 网络错误描述（如果有）
    pub error_message: Option<String>,
}

impl ProbeResult {
    /// 创建新的探测结果
    pub fn new(outcome: CheckOutcome, method: ProbeMethod) -> Self {
        Self {
            outcome,
            method,
            response_time: Duration::ZERO,
            error_message: None,
        }
    }

    /// 未发起请求的跳过结果
    pub fn skipped() -> Self {
        Self::new(CheckOutcome::Skipped, ProbeMethod::None)
    }

    /// 设置探测耗时
    pub fn with_response_time(mut self, response_time: Duration) -> Self {
        self.response_time = response_time;
        self
    }

    /// 设置错误信息
    pub fn with_error(mut self, error_message: String) -> Self {
        self.error_message = Some(error_message);
        self
    }

    /// 获取探测耗时（毫秒）
    pub fn response_time_ms(&self) -> u64 {
        self.response_time.as_millis() as u64
    }
}

/// 单个条目的检测记录，仅用于检测日志和运行报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// 条目ID
    pub item_id: ItemId,
    /// 检测的链接（可能为空）
    pub url: String,
    /// 检测结论
    pub outcome: CheckOutcome,
    /// 检测时间
    pub checked_at: DateTime<Utc>,
}

impl CheckResult {
    /// 创建检测记录
    pub fn new(
        item_id: ItemId,
        url: impl Into<String>,
        outcome: CheckOutcome,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            item_id,
            url: url.into(),
            outcome,
            checked_at,
        }
    }

    /// HTTP状态码（如果有）
    pub fn status_code(&self) -> Option<u16> {
        self.outcome.status_code()
    }
}

/// Duration序列化模块
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
