//! Teaser Link Checker 主程序入口
//!
//! 条目外链定时检测工具

use anyhow::{Context, Result};
use teaser_link_checker::cli::args::{Args, Commands};
use teaser_link_checker::cli::commands::{
    load_config, BrokenCommand, CheckCommand, Command, InitCommand, PurgeCommand, RunCommand,
    StartCommand, ValidateCommand, VersionCommand,
};
use teaser_link_checker::logging::{LogConfig, LoggingSystem};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    // 配置文件中的日志级别只在能读取时生效，读取失败留给具体命令报告
    let log_level = match load_config(&args).await {
        Ok(config) => args.effective_log_level(&config),
        Err(_) => args.effective_log_level(&Default::default()),
    };

    let log_config = LogConfig {
        level: log_level,
        console: args.log_file.is_none(),
        file_path: args.log_file.clone(),
        json_format: args.log_json,
        ..Default::default()
    };
    let logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    debug!(
        "{} v{} 启动，日志级别: {}",
        teaser_link_checker::APP_NAME,
        teaser_link_checker::VERSION,
        logging_system.config().level
    );

    if let Err(e) = execute_command(&args).await {
        error!("命令执行失败: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 执行CLI命令
async fn execute_command(args: &Args) -> Result<()> {
    let command: Box<dyn Command> = match &args.command {
        Commands::Start { .. } => {
            info!("启动链接检测服务...");
            Box::new(StartCommand)
        }
        Commands::Run { .. } => Box::new(RunCommand),
        Commands::Check { .. } => Box::new(CheckCommand),
        Commands::Broken { .. } => Box::new(BrokenCommand),
        Commands::Init { .. } => Box::new(InitCommand),
        Commands::Validate { .. } => Box::new(ValidateCommand),
        Commands::Purge { .. } => Box::new(PurgeCommand),
        Commands::Version { .. } => Box::new(VersionCommand),
    };

    command
        .execute(args)
        .await
        .with_context(|| format!("执行命令失败: {}", command_name(&args.command)))
}

/// 子命令名称
fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Start { .. } => "start",
        Commands::Run { .. } => "run",
        Commands::Check { .. } => "check",
        Commands::Broken { .. } => "broken",
        Commands::Init { .. } => "init",
        Commands::Validate { .. } => "validate",
        Commands::Purge { .. } => "purge",
        Commands::Version { .. } => "version",
    }
}
