//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use crate::config::{Config, Environment};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Teaser Link Checker - 周期性检测条目外链并标记失效链接
#[derive(Parser, Debug, Clone)]
#[command(
    name = "teaser-link-checker",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径",
        env = "TEASER_LINK_CHECKER_CONFIG"
    )]
    pub config: Option<PathBuf>,

    /// 日志级别，未指定时使用配置文件中的级别
    #[arg(
        short,
        long,
        value_enum,
        help = "日志级别",
        env = "TEASER_LINK_CHECKER_LOG_LEVEL"
    )]
    pub log_level: Option<LogLevel>,

    /// 运行环境
    #[arg(
        short,
        long,
        value_name = "ENV",
        help = "运行环境（production / development）",
        env = "TEASER_LINK_CHECKER_ENV"
    )]
    pub environment: Option<Environment>,

    /// 日志文件路径
    #[arg(long, value_name = "FILE", help = "写入日志文件而不是控制台")]
    pub log_file: Option<PathBuf>,

    /// 是否输出JSON格式日志
    #[arg(long, help = "输出JSON格式日志")]
    pub log_json: bool,

    /// 是否启用详细输出
    #[arg(short, long, help = "启用详细输出")]
    pub verbose: bool,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum LogLevel {
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 启动定时检测，直到收到Ctrl-C
    Start {
        /// 检测间隔（秒）
        #[arg(
            short,
            long,
            value_name = "SECONDS",
            help = "检测间隔（秒）",
            env = "TEASER_LINK_CHECKER_INTERVAL"
        )]
        interval: Option<u64>,

        /// 每轮检测的条目数
        #[arg(
            short,
            long,
            value_name = "COUNT",
            help = "每轮检测的条目数",
            env = "TEASER_LINK_CHECKER_BATCH_SIZE"
        )]
        batch_size: Option<usize>,
    },

    /// 立即执行一轮检测
    Run {
        /// 每轮检测的条目数
        #[arg(
            short,
            long,
            value_name = "COUNT",
            help = "每轮检测的条目数",
            env = "TEASER_LINK_CHECKER_BATCH_SIZE"
        )]
        batch_size: Option<usize>,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 检测单个链接，不修改任何条目
    Check {
        /// 待检测的链接
        #[arg(value_name = "URL", help = "待检测的链接")]
        url: String,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 列出已标记失效的条目
    Broken {
        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 初始化配置文件
    Init {
        /// 配置文件路径
        #[arg(
            value_name = "FILE",
            help = "配置文件路径",
            default_value = "config.toml"
        )]
        config_path: PathBuf,

        /// 是否覆盖现有文件
        #[arg(short, long, help = "覆盖现有文件")]
        force: bool,
    },

    /// 验证配置文件
    Validate {
        /// 配置文件路径
        #[arg(value_name = "FILE", help = "配置文件路径")]
        config_path: Option<PathBuf>,

        /// 是否显示详细信息
        #[arg(short, long, help = "显示详细信息")]
        verbose: bool,
    },

    /// 清除所有条目的检测元数据
    Purge {
        /// 跳过确认
        #[arg(short, long, help = "确认清除")]
        yes: bool,
    },

    /// 显示版本信息
    Version {
        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },
}

/// 输出格式枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum OutputFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
}

impl Args {
    /// 解析命令行参数
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// 获取配置文件路径
    pub fn get_config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::get_default_config_path)
    }

    /// 是否启用详细输出
    pub fn is_verbose(&self) -> bool {
        self.verbose || matches!(self.log_level, Some(LogLevel::Debug))
    }

    /// 最终使用的日志级别
    ///
    /// 命令行优先，其次是配置文件。
    pub fn effective_log_level(&self, config: &Config) -> log::LevelFilter {
        match self.log_level {
            Some(level) => level.into(),
            None if self.verbose => log::LevelFilter::Debug,
            None => config.global.log_level.parse().unwrap_or(log::LevelFilter::Info),
        }
    }

    /// 把命令行覆盖项应用到配置上
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(environment) = self.environment {
            config.global.environment = environment;
        }
        if let Some(level) = self.log_level {
            config.global.log_level = level.to_string();
        }

        match &self.command {
            Commands::Start {
                interval,
                batch_size,
            } => {
                if let Some(interval) = interval {
                    config.global.check_interval_seconds = *interval;
                }
                if let Some(batch_size) = batch_size {
                    config.global.batch_size = *batch_size;
                }
            }
            Commands::Run {
                batch_size: Some(batch_size),
                ..
            } => config.global.batch_size = *batch_size,
            _ => {}
        }
    }
}
