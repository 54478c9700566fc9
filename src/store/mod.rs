//! 元数据存储模块
//!
//! 定义条目元数据的存取接口、查询条件以及内存/JSON文件两种实现

pub mod json_file;
pub mod memory;

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

/// 条目ID
pub type ItemId = u64;

/// teaser链接所在的元数据键
pub const META_TEASER_URL: &str = "teaserUrl";
/// 最近检测时间（Unix秒）
pub const META_CHECKED: &str = "jie-link-checker-checked";
/// 失效标记，仅在确认404时存在
pub const META_BROKEN: &str = "jie-link-checker-broken";

/// 内容条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// 条目ID
    pub id: ItemId,
    /// 条目类型
    pub item_type: String,
    /// 发布状态
    pub status: String,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 元数据
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl Item {
    /// 创建新的条目
    pub fn new(
        id: ItemId,
        item_type: impl Into<String>,
        status: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            item_type: item_type.into(),
            status: status.into(),
            created_at,
            meta: BTreeMap::new(),
        }
    }

    /// 设置元数据
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// 设置teaser链接
    pub fn with_teaser_url(self, url: impl Into<String>) -> Self {
        self.with_meta(META_TEASER_URL, url)
    }
}

/// 元数据过滤条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaFilter {
    /// 不过滤
    Any,
    /// 指定键不存在
    KeyMissing(String),
    /// 指定键存在
    KeyExists(String),
}

/// 排序方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderBy {
    /// 按创建时间升序
    CreatedAsc,
    /// 按元数据数值升序，缺少该键的条目不参与结果
    MetaNumAsc(String),
}

/// 条目查询条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemQuery {
    /// 条目类型
    pub item_type: String,
    /// 发布状态
    pub status: String,
    /// 元数据过滤
    pub filter: MetaFilter,
    /// 排序
    pub order_by: OrderBy,
    /// 返回数量上限，None表示不限
    pub limit: Option<usize>,
    /// 排除的条目ID
    pub exclude_ids: Vec<ItemId>,
}

impl ItemQuery {
    /// 创建查询指定类型和状态的条件
    pub fn new(item_type: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            item_type: item_type.into(),
            status: status.into(),
            filter: MetaFilter::Any,
            order_by: OrderBy::CreatedAsc,
            limit: None,
            exclude_ids: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: MetaFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn exclude(mut self, ids: &[ItemId]) -> Self {
        self.exclude_ids = ids.to_vec();
        self
    }
}

/// 元数据存储trait
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// 读取元数据
    async fn get_meta(&self, id: ItemId, key: &str) -> Result<Option<String>, StoreError>;

    /// 写入元数据
    async fn set_meta(&self, id: ItemId, key: &str, value: &str) -> Result<(), StoreError>;

    /// 删除元数据，键不存在时视为成功
    async fn delete_meta(&self, id: ItemId, key: &str) -> Result<(), StoreError>;

    /// 按条件查询条目ID
    async fn query(&self, query: &ItemQuery) -> Result<Vec<ItemId>, StoreError>;
}

/// 在内存中的条目集合上执行查询
///
/// 两种存储实现共用此函数，保证查询语义一致。数值排序时无法解析的值按0处理，
/// 相同排序键按ID升序。
pub(crate) fn run_query<'a, I>(items: I, query: &ItemQuery) -> Vec<ItemId>
where
    I: IntoIterator<Item = &'a Item>,
{
    if query.limit == Some(0) {
        return Vec::new();
    }

    let excluded: HashSet<ItemId> = query.exclude_ids.iter().copied().collect();

    let mut matched: Vec<&Item> = items
        .into_iter()
        .filter(|item| item.item_type == query.item_type && item.status == query.status)
        .filter(|item| !excluded.contains(&item.id))
        .filter(|item| match &query.filter {
            MetaFilter::Any => true,
            MetaFilter::KeyMissing(key) => !item.meta.contains_key(key),
            MetaFilter::KeyExists(key) => item.meta.contains_key(key),
        })
        .filter(|item| match &query.order_by {
            OrderBy::CreatedAsc => true,
            OrderBy::MetaNumAsc(key) => item.meta.contains_key(key),
        })
        .collect();

    match &query.order_by {
        OrderBy::CreatedAsc => {
            matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
        }
        OrderBy::MetaNumAsc(key) => matched.sort_by(|a, b| {
            compare_numeric(a.meta.get(key), b.meta.get(key)).then(a.id.cmp(&b.id))
        }),
    }

    let ids = matched.into_iter().map(|item| item.id);
    match query.limit {
        Some(limit) => ids.take(limit).collect(),
        None => ids.collect(),
    }
}

fn compare_numeric(a: Option<&String>, b: Option<&String>) -> Ordering {
    let parse = |v: Option<&String>| v.and_then(|s| s.trim().parse::<i64>().ok()).unwrap_or(0);
    parse(a).cmp(&parse(b))
}
