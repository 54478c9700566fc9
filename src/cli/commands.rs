//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::batch::{BatchRunner, BatchSelector, RunLog, RunReport};
use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{Config, ConfigLoader, TomlConfigLoader, SAMPLE_CONFIG};
use crate::error::{ConfigError, Result, StoreError};
use crate::probe::{CheckOutcome, HttpUrlProber, ProbeResult, UrlProber};
use crate::scheduler::{IntervalScheduler, Scheduler};
use crate::store::{
    ItemId, ItemQuery, JsonFileStore, MetaFilter, MetadataStore, META_BROKEN, META_CHECKED,
    META_TEASER_URL,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 加载命令使用的配置
///
/// 显式指定的配置文件必须存在；默认路径不存在时使用内置默认配置。
pub async fn load_config(args: &Args) -> Result<Config> {
    let path = args.get_config_path();
    let loader = TomlConfigLoader::default();

    let mut config = match loader.load_from_file(&path).await {
        Ok(config) => config,
        Err(crate::error::LinkCheckerError::Config(ConfigError::FileNotFound { .. }))
            if args.config.is_none() =>
        {
            info!("未找到配置文件 {}，使用默认配置", path.display());
            Config::default()
        }
        Err(e) => return Err(e),
    };

    args.apply_overrides(&mut config);
    loader.validate(&config)?;
    Ok(config)
}

/// 命令运行时依赖的组件
pub struct AppContext {
    /// 生效的配置
    pub config: Config,
    /// 元数据存储
    pub store: Arc<dyn MetadataStore>,
    /// 链接探测器
    pub prober: Arc<dyn UrlProber>,
}

impl AppContext {
    /// 按配置创建运行时组件
    pub async fn from_config(config: Config) -> Result<Self> {
        let store = JsonFileStore::open(&config.store.path).await?;
        let prober = HttpUrlProber::new(&config.probe)?;

        Ok(Self {
            config,
            store: Arc::new(store),
            prober: Arc::new(prober),
        })
    }

    /// 使用已有组件创建上下文
    pub fn with_components(
        config: Config,
        store: Arc<dyn MetadataStore>,
        prober: Arc<dyn UrlProber>,
    ) -> Self {
        Self {
            config,
            store,
            prober,
        }
    }

    /// 监控范围内全部条目的查询条件
    pub fn monitored_query(&self) -> ItemQuery {
        ItemQuery::new(&self.config.store.item_type, &self.config.store.item_status)
    }

    /// 创建批次检测运行器
    pub fn build_runner(&self) -> BatchRunner {
        let selector = BatchSelector::new(
            Arc::clone(&self.store),
            &self.config.store.item_type,
            &self.config.store.item_status,
        );
        let run_log = RunLog::new(
            &self.config.global.run_log_path,
            self.config.global.environment,
        );

        BatchRunner::new(
            Arc::clone(&self.store),
            Arc::clone(&self.prober),
            selector,
            run_log,
            self.config.global.batch_size,
        )
    }
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Version { format } = &args.command {
            match format {
                OutputFormat::Json => {
                    let version_info = serde_json::json!({
                        "name": crate::APP_NAME,
                        "version": crate::VERSION,
                        "description": crate::APP_DESCRIPTION
                    });
                    println!("{}", serde_json::to_string_pretty(&version_info)?);
                }
                OutputFormat::Text => {
                    println!("{} v{}", crate::APP_NAME, crate::VERSION);
                    println!("{}", crate::APP_DESCRIPTION);
                }
            }
        }
        Ok(())
    }
}

/// 初始化命令
pub struct InitCommand;

#[async_trait]
impl Command for InitCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Init { config_path, force } = &args.command {
            if write_sample_config(config_path, *force).await? {
                println!("配置文件已创建: {}", config_path.display());
                println!("请编辑配置文件中的存储路径和监控范围");
            } else {
                eprintln!("配置文件已存在: {}", config_path.display());
                eprintln!("使用 --force 参数覆盖现有文件");
            }
        }
        Ok(())
    }
}

/// 写入示例配置文件
///
/// # 返回
/// * `Result<bool>` - 是否写入了文件，文件已存在且未强制覆盖时为 `false`
pub async fn write_sample_config(config_path: &Path, force: bool) -> Result<bool> {
    if config_path.exists() && !force {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    tokio::fs::write(config_path, SAMPLE_CONFIG).await?;
    Ok(true)
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate {
            config_path,
            verbose,
        } = &args.command
        {
            let config_file = config_path
                .clone()
                .unwrap_or_else(|| args.get_config_path());

            println!("验证配置文件: {}", config_file.display());

            let loader = TomlConfigLoader::default();
            let config = loader.load_from_file(&config_file).await?;

            if *verbose {
                println!("配置验证通过！");
                println!("全局配置:");
                println!("  检测间隔: {}秒", config.global.check_interval_seconds);
                println!("  批次大小: {}", config.global.batch_size);
                println!("  日志级别: {}", config.global.log_level);
                println!("  运行环境: {:?}", config.global.environment);
                println!("  检测日志: {}", config.global.run_log_path.display());
                println!("探测配置:");
                println!("  请求超时: {}秒", config.probe.timeout_seconds);
                println!("  最大重定向: {}", config.probe.max_redirects);
                println!("  允许内网地址: {}", config.probe.allow_private_networks);
                println!("存储配置:");
                println!("  存储文件: {}", config.store.path.display());
                println!(
                    "  监控范围: {} / {}",
                    config.store.item_type, config.store.item_status
                );
            } else {
                println!("✓ 配置文件验证通过");
            }
        }
        Ok(())
    }
}

/// 单链接检测命令
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Check { url, format } = &args.command {
            let config = load_config(args).await?;
            let prober = HttpUrlProber::new(&config.probe)?;
            let result = prober.check(url).await;

            match format {
                OutputFormat::Json => {
                    let output = serde_json::json!({
                        "url": url,
                        "result": result,
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Text => println!("{}", format_probe_text(url, &result)),
            }
        }
        Ok(())
    }
}

/// 格式化单次探测结果
pub fn format_probe_text(url: &str, result: &ProbeResult) -> String {
    let icon = match result.outcome {
        CheckOutcome::Ok(_) => "✓",
        CheckOutcome::Broken(_) => "✗",
        CheckOutcome::NetworkError => "!",
        CheckOutcome::Skipped => "-",
    };

    let mut line = format!(
        "{} {} - {} - {}ms",
        icon,
        url,
        result.outcome.label(),
        result.response_time_ms()
    );
    if let Some(error) = &result.error_message {
        line.push_str(&format!("\n  错误: {error}"));
    }
    line
}

/// 单轮检测命令
pub struct RunCommand;

#[async_trait]
impl Command for RunCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Run { format, .. } = &args.command {
            let config = load_config(args).await?;
            let context = AppContext::from_config(config).await?;
            let report = context.build_runner().try_run_batch().await?;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => println!("{}", format_report_text(&report)),
            }
        }
        Ok(())
    }
}

/// 格式化运行报告
pub fn format_report_text(report: &RunReport) -> String {
    let mut lines = vec![format!(
        "检测批次 {} ({} 个条目)",
        report.run_id,
        report.batch.len()
    )];

    for result in &report.results {
        let url = if result.url.is_empty() {
            "(无链接)"
        } else {
            result.url.as_str()
        };
        lines.push(format!(
            "  #{:<8} {:<14} {}",
            result.item_id,
            result.outcome.label(),
            url
        ));
    }

    for id in &report.failed_items {
        lines.push(format!("  #{id:<8} 存储错误"));
    }

    lines.push(format!(
        "正常 {}，失效 {}，网络错误 {}，跳过 {}",
        report.ok_count(),
        report.broken_count(),
        report.network_error_count(),
        report.skipped_count()
    ));
    lines.join("\n")
}

/// 已失效条目
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrokenItem {
    /// 条目ID
    pub item_id: ItemId,
    /// teaser链接
    pub url: String,
    /// 最后检测时间
    pub checked_at: Option<DateTime<Utc>>,
}

/// 列出监控范围内已标记失效的条目
pub async fn list_broken(
    store: &dyn MetadataStore,
    monitored: ItemQuery,
) -> std::result::Result<Vec<BrokenItem>, StoreError> {
    let ids = store
        .query(&monitored.filter(MetaFilter::KeyExists(META_BROKEN.to_string())))
        .await?;

    let mut items = Vec::with_capacity(ids.len());
    for item_id in ids {
        let url = store
            .get_meta(item_id, META_TEASER_URL)
            .await?
            .unwrap_or_default();
        let checked_at = store
            .get_meta(item_id, META_CHECKED)
            .await?
            .and_then(|v| v.trim().parse::<i64>().ok())
            .and_then(|ts| DateTime::from_timestamp(ts, 0));

        items.push(BrokenItem {
            item_id,
            url,
            checked_at,
        });
    }

    Ok(items)
}

/// 失效条目列表命令
pub struct BrokenCommand;

#[async_trait]
impl Command for BrokenCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Broken { format } = &args.command {
            let config = load_config(args).await?;
            let context = AppContext::from_config(config).await?;
            let items = list_broken(context.store.as_ref(), context.monitored_query()).await?;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&items)?),
                OutputFormat::Text => {
                    if items.is_empty() {
                        println!("没有已失效的条目");
                    }
                    for item in &items {
                        let checked = item
                            .checked_at
                            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                            .unwrap_or_else(|| "N/A".to_string());
                        println!("#{:<8} {}  (检测于 {})", item.item_id, item.url, checked);
                    }
                }
            }
        }
        Ok(())
    }
}

/// 清除监控范围内所有条目的检测元数据
///
/// # 返回
/// * `Result<usize, StoreError>` - 处理的条目数
pub async fn purge_checker_meta(
    store: &dyn MetadataStore,
    monitored: ItemQuery,
) -> std::result::Result<usize, StoreError> {
    let ids = store.query(&monitored.filter(MetaFilter::Any)).await?;

    for &item_id in &ids {
        store.delete_meta(item_id, META_CHECKED).await?;
        store.delete_meta(item_id, META_BROKEN).await?;
    }

    Ok(ids.len())
}

/// 清除命令
pub struct PurgeCommand;

#[async_trait]
impl Command for PurgeCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Purge { yes } = &args.command {
            if !*yes {
                eprintln!("该操作会删除所有条目的检测时间和失效标记");
                eprintln!("使用 --yes 参数确认执行");
                return Ok(());
            }

            let config = load_config(args).await?;
            let context = AppContext::from_config(config).await?;
            let purged = purge_checker_meta(context.store.as_ref(), context.monitored_query())
                .await?;

            info!("已清除 {} 个条目的检测元数据", purged);
            println!("✓ 已清除 {purged} 个条目的检测元数据");
        }
        Ok(())
    }
}

/// 启动命令
pub struct StartCommand;

#[async_trait]
impl Command for StartCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let config = load_config(args).await?;
        let context = AppContext::from_config(config).await?;
        let runner = Arc::new(context.build_runner());

        let scheduler = IntervalScheduler::new(runner, context.config.global.check_interval());
        scheduler.activate().await;
        info!(
            "链接检测已启动: {}，每轮 {} 个条目",
            scheduler.description(),
            context.config.global.batch_size
        );

        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("收到中断信号，正在停止..."),
            Err(e) => error!("监听中断信号失败: {}", e),
        }

        if !scheduler.deactivate().await {
            warn!("调度任务已提前结束");
        }

        let status = scheduler.get_status().await;
        info!("链接检测已停止，共完成 {} 轮", status.runs_completed);
        Ok(())
    }
}
