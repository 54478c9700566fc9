//! 内存元数据存储

use crate::error::StoreError;
use crate::store::{run_query, Item, ItemId, ItemQuery, MetadataStore};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// 基于内存的元数据存储，进程退出后数据丢失
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<BTreeMap<ItemId, Item>>,
}

impl MemoryStore {
    /// 创建空的内存存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用给定条目创建内存存储
    pub fn with_items(items: impl IntoIterator<Item = Item>) -> Self {
        Self {
            items: RwLock::new(items.into_iter().map(|item| (item.id, item)).collect()),
        }
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn get_meta(&self, id: ItemId, key: &str) -> Result<Option<String>, StoreError> {
        let items = self.items.read().await;
        let item = items.get(&id).ok_or(StoreError::ItemNotFound { id })?;
        Ok(item.meta.get(key).cloned())
    }

    async fn set_meta(&self, id: ItemId, key: &str, value: &str) -> Result<(), StoreError> {
        let mut items = self.items.write().await;
        let item = items.get_mut(&id).ok_or(StoreError::ItemNotFound { id })?;
        item.meta.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete_meta(&self, id: ItemId, key: &str) -> Result<(), StoreError> {
        let mut items = self.items.write().await;
        let item = items.get_mut(&id).ok_or(StoreError::ItemNotFound { id })?;
        item.meta.remove(key);
        Ok(())
    }

    async fn query(&self, query: &ItemQuery) -> Result<Vec<ItemId>, StoreError> {
        let items = self.items.read().await;
        Ok(run_query(items.values(), query))
    }
}
