//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use thiserror::Error;

/// Teaser Link Checker 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum LinkCheckerError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 元数据存储相关错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),

    /// 链接探测相关错误
    #[error("探测错误: {0}")]
    Probe(#[from] ProbeError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

impl LinkCheckerError {
    /// 是否为需要中止整轮检测的基础设施错误
    pub fn is_fatal(&self) -> bool {
        matches!(self, LinkCheckerError::Store(e) if e.is_unavailable())
    }
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 元数据存储错误类型
#[derive(Error, Debug)]
pub enum StoreError {
    /// 存储整体不可用，本轮检测必须中止
    #[error("存储不可用: {0}")]
    Unavailable(String),

    /// 条目不存在
    #[error("条目不存在: {id}")]
    ItemNotFound { id: u64 },

    /// 读写失败（仅影响当前条目）
    #[error("存储读写失败: {0}")]
    Backend(String),
}

impl StoreError {
    /// 判断是否为存储不可用
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// 链接探测错误类型
#[derive(Error, Debug)]
pub enum ProbeError {
    /// HTTP客户端构建失败
    #[error("HTTP客户端初始化失败: {0}")]
    ClientBuild(#[from] reqwest::Error),

    /// 目标地址被SSRF防护拒绝
    #[error("拒绝访问内网地址: {host}")]
    UnsafeTarget { host: String },

    /// 重定向次数超过上限
    #[error("超过最大重定向次数: {max}")]
    TooManyRedirects { max: usize },
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, LinkCheckerError>;
