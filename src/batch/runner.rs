//! 批次检测运行器
//!
//! 驱动一轮检测：选择条目 → 探测链接 → 写回元数据 → 记录检测日志。
//! 条目严格按选择顺序逐个处理，每个条目的写回都是幂等的，
//! 重复检测同一条目得到相同的最终状态。

use crate::batch::run_log::RunLog;
use crate::batch::selector::BatchSelector;
use crate::error::{LinkCheckerError, Result, StoreError};
use crate::probe::{validate_url, CheckOutcome, CheckResult, ProbeResult, UrlProber};
use crate::store::{ItemId, MetadataStore, META_BROKEN, META_CHECKED, META_TEASER_URL};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// 失效标记的取值
const BROKEN_FLAG: &str = "1";

/// 一轮检测的运行报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// 运行ID
    pub run_id: Uuid,
    /// 开始时间
    pub started_at: DateTime<Utc>,
    /// 结束时间
    pub finished_at: DateTime<Utc>,
    /// 本轮选中的条目
    pub batch: Vec<ItemId>,
    /// 各条目的检测记录
    pub results: Vec<CheckResult>,
    /// 因存储错误未能完成的条目
    pub failed_items: Vec<ItemId>,
}

impl RunReport {
    /// 可用链接数
    pub fn ok_count(&self) -> usize {
        self.count(|o| matches!(o, CheckOutcome::Ok(_)))
    }

    /// 失效链接数
    pub fn broken_count(&self) -> usize {
        self.count(|o| matches!(o, CheckOutcome::Broken(_)))
    }

    /// 网络错误数
    pub fn network_error_count(&self) -> usize {
        self.count(|o| matches!(o, CheckOutcome::NetworkError))
    }

    /// 跳过数
    pub fn skipped_count(&self) -> usize {
        self.count(|o| matches!(o, CheckOutcome::Skipped))
    }

    fn count(&self, predicate: impl Fn(&CheckOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| predicate(&r.outcome)).count()
    }
}

/// 批次检测运行器
pub struct BatchRunner {
    /// 元数据存储
    store: Arc<dyn MetadataStore>,
    /// 链接探测器
    prober: Arc<dyn UrlProber>,
    /// 批次选择器
    selector: BatchSelector,
    /// 检测日志
    run_log: RunLog,
    /// 每轮检测的条目数
    batch_size: usize,
}

impl BatchRunner {
    /// 创建新的批次检测运行器
    ///
    /// # 参数
    /// * `store` - 元数据存储
    /// * `prober` - 链接探测器
    /// * `selector` - 批次选择器，需与 `store` 指向同一存储
    /// * `run_log` - 检测日志
    /// * `batch_size` - 每轮检测的条目数
    pub fn new(
        store: Arc<dyn MetadataStore>,
        prober: Arc<dyn UrlProber>,
        selector: BatchSelector,
        run_log: RunLog,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            prober,
            selector,
            run_log,
            batch_size,
        }
    }

    /// 每轮检测的条目数
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// 执行一轮检测，所有错误都在内部记录，不向调用方返回
    pub async fn run_batch(&self) {
        if let Err(e) = self.try_run_batch().await {
            error!("本轮链接检测中止，将在下次调度时重试: {}", e);
        }
    }

    /// 执行一轮检测并返回运行报告
    ///
    /// 存储不可用时返回错误；单个条目的存储错误只影响该条目。
    pub async fn try_run_batch(&self) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("batch_run", %run_id);
        self.execute(run_id).instrument(span).await
    }

    async fn execute(&self, run_id: Uuid) -> Result<RunReport> {
        let started_at = Utc::now();
        let batch = self.selector.select(self.batch_size).await?;
        info!("开始链接检测，条目数量: {}", batch.len());

        let mut results = Vec::with_capacity(batch.len());
        let mut failed_items = Vec::new();

        for &item_id in &batch {
            match self.check_item(item_id).await {
                Ok(result) => results.push(result),
                Err(e) if e.is_unavailable() => {
                    return Err(LinkCheckerError::Store(e));
                }
                Err(e) => {
                    error!("条目 {} 检测失败: {}", item_id, e);
                    failed_items.push(item_id);
                }
            }
        }

        if let Err(e) = self.run_log.append(&batch, &results).await {
            warn!("写入检测日志失败 {}: {}", self.run_log.path().display(), e);
        }

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            batch,
            results,
            failed_items,
        };

        info!(
            "链接检测完成: 正常 {}，失效 {}，网络错误 {}，跳过 {}",
            report.ok_count(),
            report.broken_count(),
            report.network_error_count(),
            report.skipped_count()
        );

        Ok(report)
    }

    /// 检测单个条目并写回元数据
    ///
    /// # 参数
    /// * `item_id` - 条目ID
    ///
    /// # 返回
    /// * `Result<CheckResult, StoreError>` - 检测记录
    pub async fn check_item(&self, item_id: ItemId) -> std::result::Result<CheckResult, StoreError> {
        let url = self
            .store
            .get_meta(item_id, META_TEASER_URL)
            .await?
            .unwrap_or_default();

        let probe = if validate_url(&url).is_some() {
            self.prober.check(&url).await
        } else {
            ProbeResult::skipped()
        };

        let checked_at = self.persist(item_id, probe.outcome).await?;

        match probe.outcome {
            CheckOutcome::NetworkError => warn!(
                "条目 {} 链接网络错误: {} - {}",
                item_id,
                url,
                probe.error_message.as_deref().unwrap_or("N/A")
            ),
            CheckOutcome::Broken(code) => warn!("条目 {} 链接失效({}): {}", item_id, code, url),
            CheckOutcome::Ok(code) => {
                debug!("条目 {} 链接正常({}) {}ms", item_id, code, probe.response_time_ms())
            }
            CheckOutcome::Skipped => debug!("条目 {} 无有效链接，跳过", item_id),
        }

        Ok(CheckResult::new(item_id, url, probe.outcome, checked_at))
    }

    /// 按检测结论写回元数据
    ///
    /// - 始终更新检测时间
    /// - 404：设置失效标记
    /// - 其他HTTP响应：清除失效标记
    /// - 网络错误或跳过：不改动失效标记
    async fn persist(
        &self,
        item_id: ItemId,
        outcome: CheckOutcome,
    ) -> std::result::Result<DateTime<Utc>, StoreError> {
        match outcome {
            CheckOutcome::Broken(_) => {
                self.store.set_meta(item_id, META_BROKEN, BROKEN_FLAG).await?
            }
            CheckOutcome::Ok(_) => self.store.delete_meta(item_id, META_BROKEN).await?,
            CheckOutcome::NetworkError | CheckOutcome::Skipped => {}
        }

        let now = Utc::now();
        let previous = self
            .store
            .get_meta(item_id, META_CHECKED)
            .await?
            .and_then(|v| v.trim().parse::<i64>().ok());
        // 时钟回拨时保持检测时间不减
        let stamp = previous.map_or(now.timestamp(), |p| p.max(now.timestamp()));

        self.store
            .set_meta(item_id, META_CHECKED, &stamp.to_string())
            .await?;

        Ok(DateTime::from_timestamp(stamp, 0).unwrap_or(now))
    }
}
