//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 主配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    /// 全局配置项
    #[serde(default)]
    pub global: GlobalConfig,
    /// 链接探测配置
    #[serde(default)]
    pub probe: ProbeConfig,
    /// 元数据存储配置
    #[serde(default)]
    pub store: StoreConfig,
}

/// 运行环境
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// 生产环境，不写检测日志
    #[default]
    Production,
    /// 开发环境，启用检测日志
    Development,
}

impl Environment {
    /// 是否为开发环境
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" => Ok(Environment::Production),
            "development" => Ok(Environment::Development),
            other => Err(format!("无效的运行环境: {other}")),
        }
    }
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 检测间隔（秒）
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    /// 每轮检测的条目数
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 运行环境
    #[serde(default)]
    pub environment: Environment,
    /// 检测日志文件路径
    #[serde(default = "default_run_log_path")]
    pub run_log_path: PathBuf,
}

/// 链接探测配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeConfig {
    /// 连接/读取超时（秒）
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// 最大重定向次数
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// 是否允许访问内网地址（仅用于测试环境）
    #[serde(default)]
    pub allow_private_networks: bool,
    /// 自定义User-Agent
    pub user_agent: Option<String>,
}

/// 元数据存储配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// 存储文件路径
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// 监控的条目类型
    #[serde(default = "default_item_type")]
    pub item_type: String,
    /// 监控的条目状态
    #[serde(default = "default_item_status")]
    pub item_status: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: default_check_interval(),
            batch_size: default_batch_size(),
            log_level: default_log_level(),
            environment: Environment::default(),
            run_log_path: default_run_log_path(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            max_redirects: default_max_redirects(),
            allow_private_networks: false,
            user_agent: None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            item_type: default_item_type(),
            item_status: default_item_status(),
        }
    }
}

impl GlobalConfig {
    /// 检测间隔
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }
}

impl ProbeConfig {
    /// 请求超时
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

// 默认值函数
fn default_check_interval() -> u64 {
    600
}
fn default_batch_size() -> usize {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_run_log_path() -> PathBuf {
    PathBuf::from("teaser-link-checker.log")
}
fn default_timeout() -> u64 {
    10
}
fn default_max_redirects() -> usize {
    5
}
fn default_store_path() -> PathBuf {
    PathBuf::from("items.json")
}
fn default_item_type() -> String {
    "jie".to_string()
}
fn default_item_status() -> String {
    "publish".to_string()
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    if config.global.check_interval_seconds == 0 {
        return Err("检测间隔不能为0".to_string());
    }

    let valid_log_levels = ["debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.global.log_level, valid_log_levels
        ));
    }

    if config.global.run_log_path.as_os_str().is_empty() {
        return Err("检测日志路径不能为空".to_string());
    }

    if config.probe.timeout_seconds == 0 {
        return Err("请求超时时间不能为0".to_string());
    }

    if config.store.item_type.trim().is_empty() {
        return Err("监控的条目类型不能为空".to_string());
    }

    if config.store.item_status.trim().is_empty() {
        return Err("监控的条目状态不能为空".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();

        assert_eq!(config.global.check_interval_seconds, 600);
        assert_eq!(config.global.batch_size, 10);
        assert_eq!(config.global.environment, Environment::Production);
        assert_eq!(config.probe.timeout_seconds, 10);
        assert_eq!(config.probe.max_redirects, 5);
        assert!(!config.probe.allow_private_networks);
        assert_eq!(config.store.item_type, "jie");
        assert_eq!(config.store.item_status, "publish");
    }

    #[test]
    fn test_config_validation() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_batch_size_is_allowed() {
        let mut config = Config::default();
        config.global.batch_size = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_config_validation_zero_interval() {
        let mut config = Config::default();
        config.global.check_interval_seconds = 0;

        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("检测间隔"));
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = Config::default();
        config.global.log_level = "verbose".to_string();

        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("日志级别"));
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!(
            "Development".parse::<Environment>().unwrap(),
            Environment::Development
        );
        assert_eq!(
            " production ".parse::<Environment>().unwrap(),
            Environment::Production
        );
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.global.environment = Environment::Development;

        let serialized = toml::to_string(&config).expect("序列化失败");
        assert!(serialized.contains("environment = \"development\""));

        let deserialized: Config = toml::from_str(&serialized).expect("反序列化失败");
        assert_eq!(config, deserialized);
    }
}
