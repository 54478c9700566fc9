//! 批次选择器
//!
//! 两级公平选择：
//! - A级：从未检测过的条目，按创建时间升序
//! - B级：A级不足时，用最久未检测的条目补足，按检测时间升序

use crate::error::StoreError;
use crate::store::{ItemId, ItemQuery, MetaFilter, MetadataStore, OrderBy, META_CHECKED};
use std::sync::Arc;
use tracing::debug;

/// 批次选择器
pub struct BatchSelector {
    /// 元数据存储
    store: Arc<dyn MetadataStore>,
    /// 监控的条目类型
    item_type: String,
    /// 监控的条目状态
    item_status: String,
}

impl BatchSelector {
    /// 创建新的批次选择器
    ///
    /// # 参数
    /// * `store` - 元数据存储
    /// * `item_type` - 监控的条目类型
    /// * `item_status` - 监控的条目状态
    pub fn new(
        store: Arc<dyn MetadataStore>,
        item_type: impl Into<String>,
        item_status: impl Into<String>,
    ) -> Self {
        Self {
            store,
            item_type: item_type.into(),
            item_status: item_status.into(),
        }
    }

    /// 选择本轮待检测的条目
    ///
    /// # 参数
    /// * `batch_size` - 批次上限
    ///
    /// # 返回
    /// * `Result<Vec<ItemId>, StoreError>` - 有序且不重复的条目ID，长度不超过 `batch_size`
    pub async fn select(&self, batch_size: usize) -> Result<Vec<ItemId>, StoreError> {
        if batch_size == 0 {
            return Ok(Vec::new());
        }

        let never_checked = ItemQuery::new(&self.item_type, &self.item_status)
            .filter(MetaFilter::KeyMissing(META_CHECKED.to_string()))
            .order_by(OrderBy::CreatedAsc)
            .limit(batch_size);

        let mut ids = self.store.query(&never_checked).await?;
        ids.truncate(batch_size);

        let remaining = batch_size - ids.len();
        if remaining == 0 {
            debug!("A级条目已填满批次: {}", ids.len());
            return Ok(ids);
        }

        let least_recent = ItemQuery::new(&self.item_type, &self.item_status)
            .filter(MetaFilter::KeyExists(META_CHECKED.to_string()))
            .order_by(OrderBy::MetaNumAsc(META_CHECKED.to_string()))
            .limit(remaining)
            .exclude(&ids);

        let backfill = self.store.query(&least_recent).await?;
        debug!("A级条目 {} 个，B级补充 {} 个", ids.len(), backfill.len());

        for id in backfill {
            if ids.len() >= batch_size {
                break;
            }
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        Ok(ids)
    }
}
