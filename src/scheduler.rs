//! 任务调度器模块
//!
//! 按固定间隔触发批次检测。同一时刻最多只有一个调度任务，
//! 每轮检测完成后才会等待下一次触发，错过的触发直接跳过。

use crate::batch::BatchRunner;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// 可被调度的任务
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    /// 执行一次任务，错误由任务自身处理
    async fn run(&self);
}

#[async_trait]
impl ScheduledJob for BatchRunner {
    async fn run(&self) {
        self.run_batch().await;
    }
}

/// 调度器状态
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    /// 是否已注册调度任务
    pub is_active: bool,
    /// 调度间隔
    pub interval: Duration,
    /// 已完成的运行次数
    pub runs_completed: u64,
    /// 最后一次运行完成的时间
    pub last_run: Option<DateTime<Utc>>,
}

/// 任务调度器trait，定义调度接口
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// 注册调度任务
    ///
    /// # 返回
    /// * `bool` - 本次是否新注册了任务，已注册时返回 `false`
    async fn activate(&self) -> bool;

    /// 取消调度任务
    ///
    /// # 返回
    /// * `bool` - 本次是否取消了任务，未注册时返回 `false`
    async fn deactivate(&self) -> bool;

    /// 是否已注册调度任务
    async fn is_active(&self) -> bool;

    /// 获取调度器状态
    async fn get_status(&self) -> SchedulerStatus;
}

/// 固定间隔调度器
pub struct IntervalScheduler {
    /// 被调度的任务
    job: Arc<dyn ScheduledJob>,
    /// 调度间隔
    interval: Duration,
    /// 运行中的调度任务
    task: Mutex<Option<JoinHandle<()>>>,
    /// 调度器状态
    status: Arc<RwLock<SchedulerStatus>>,
}

impl IntervalScheduler {
    /// 创建新的调度器
    ///
    /// # 参数
    /// * `job` - 被调度的任务
    /// * `interval` - 调度间隔，为零时按1秒处理
    pub fn new(job: Arc<dyn ScheduledJob>, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_secs(1));
        let status = SchedulerStatus {
            is_active: false,
            interval,
            runs_completed: 0,
            last_run: None,
        };

        Self {
            job,
            interval,
            task: Mutex::new(None),
            status: Arc::new(RwLock::new(status)),
        }
    }

    /// 调度描述
    pub fn description(&self) -> String {
        format!("Every {} seconds", self.interval.as_secs())
    }

    fn spawn_loop(&self) -> JoinHandle<()> {
        let job = Arc::clone(&self.job);
        let status = Arc::clone(&self.status);
        let period = self.interval;

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                debug!("调度触发批次检测");

                job.run().await;

                let mut status = status.write().await;
                status.runs_completed += 1;
                status.last_run = Some(Utc::now());
            }
        })
    }
}

#[async_trait]
impl Scheduler for IntervalScheduler {
    async fn activate(&self) -> bool {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("调度任务已存在，跳过注册");
            return false;
        }

        *task = Some(self.spawn_loop());
        self.status.write().await.is_active = true;
        info!("已注册调度任务: {}", self.description());
        true
    }

    async fn deactivate(&self) -> bool {
        let mut task = self.task.lock().await;
        let Some(handle) = task.take() else {
            debug!("没有已注册的调度任务");
            return false;
        };

        handle.abort();
        self.status.write().await.is_active = false;
        info!("已取消调度任务");
        true
    }

    async fn is_active(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    async fn get_status(&self) -> SchedulerStatus {
        let mut status = self.status.read().await.clone();
        status.is_active = self.is_active().await;
        status
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}
