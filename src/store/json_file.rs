//! JSON文件元数据存储
//!
//! 整个条目集合保存在单个JSON文档中。文件本身就是唯一的数据来源，
//! 每次读取都重新加载文档；每次修改都在旁路锁文件的排他锁下
//! 重新读取文档、只改动目标条目，再通过临时文件+重命名原子写回。
//! 多个句柄或多个进程同时操作同一文件时，彼此的修改不会被覆盖。

use crate::error::StoreError;
use crate::store::{run_query, Item, ItemId, ItemQuery, MetadataStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 存储文件的文档结构
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    items: Vec<Item>,
}

impl StoreDocument {
    fn item_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.items.iter_mut().find(|item| item.id == id)
    }
}

/// 基于JSON文件的元数据存储
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    /// 存储文件路径
    path: PathBuf,
}

impl JsonFileStore {
    /// 打开存储文件，文件不存在时视为空存储
    ///
    /// # 参数
    /// * `path` - 存储文件路径
    ///
    /// # 返回
    /// * `Result<Self, StoreError>` - 文件无法读取或解析时返回 `Unavailable`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            info!("存储文件不存在，使用空存储: {}", path.display());
        }

        let check_path = path.clone();
        let document = blocking(move || read_document(&check_path)).await?;
        debug!("加载条目数量: {}", document.items.len());

        Ok(Self { path })
    }

    /// 插入或替换条目并写回文件
    pub async fn insert(&self, item: Item) -> Result<(), StoreError> {
        let path = self.path.clone();
        blocking(move || {
            with_exclusive_lock(&path, || {
                let mut document = read_document(&path)?;
                match document.item_mut(item.id) {
                    Some(existing) => *existing = item,
                    None => document.items.push(item),
                }
                write_document(&path, &document)
            })
        })
        .await
    }

    /// 在锁内重新读取文档并修改单个条目的元数据
    ///
    /// `f` 返回 `false` 表示没有实际变化，此时不写回文件。
    async fn mutate<F>(&self, id: ItemId, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool + Send + 'static,
    {
        let path = self.path.clone();
        blocking(move || {
            with_exclusive_lock(&path, || {
                let mut document = read_document(&path)?;
                let item = document
                    .item_mut(id)
                    .ok_or(StoreError::ItemNotFound { id })?;

                if !f(&mut item.meta) {
                    return Ok(());
                }
                write_document(&path, &document)
            })
        })
        .await
    }

    async fn load(&self) -> Result<StoreDocument, StoreError> {
        let path = self.path.clone();
        blocking(move || read_document(&path)).await
    }
}

/// 在阻塞线程池中执行文件操作
async fn blocking<T, F>(f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Backend(format!("存储任务执行失败: {e}")))?
}

/// 与存储文件相邻的锁文件路径
///
/// 写回时存储文件会被重命名替换，锁必须加在不会被替换的文件上。
fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// 读取并解析存储文件，文件不存在或为空时返回空文档
fn read_document(path: &Path) -> Result<StoreDocument, StoreError> {
    match std::fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(StoreDocument::default()),
        Ok(content) => serde_json::from_str::<StoreDocument>(&content).map_err(|e| {
            StoreError::Unavailable(format!("解析存储文件失败 {}: {e}", path.display()))
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(StoreDocument::default()),
        Err(e) => Err(StoreError::Unavailable(format!(
            "读取存储文件失败 {}: {e}",
            path.display()
        ))),
    }
}

/// 将文档写入临时文件后重命名覆盖存储文件
fn write_document(path: &Path, document: &StoreDocument) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(document)
        .map_err(|e| StoreError::Backend(format!("序列化存储数据失败: {e}")))?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    std::fs::write(&tmp_path, json)
        .map_err(|e| StoreError::Backend(format!("写入存储文件失败: {e}")))?;
    std::fs::rename(&tmp_path, path)
        .map_err(|e| StoreError::Backend(format!("替换存储文件失败: {e}")))?;

    Ok(())
}

/// 持有锁文件的排他锁执行 `f`，返回时释放锁
fn with_exclusive_lock<T>(
    path: &Path,
    f: impl FnOnce() -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| StoreError::Backend(format!("创建存储目录失败: {e}")))?;
    }

    let file = open_lock_file(path)
        .map_err(|e| StoreError::Backend(format!("打开锁文件失败: {e}")))?;

    #[cfg(unix)]
    let _guard = nix::fcntl::Flock::lock(file, nix::fcntl::FlockArg::LockExclusive)
        .map_err(|(_, errno)| StoreError::Backend(format!("获取存储文件锁失败: {errno}")))?;
    #[cfg(not(unix))]
    let _guard = file;

    f()
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path(path))
}

#[async_trait]
impl MetadataStore for JsonFileStore {
    async fn get_meta(&self, id: ItemId, key: &str) -> Result<Option<String>, StoreError> {
        let document = self.load().await?;
        let item = document
            .items
            .iter()
            .find(|item| item.id == id)
            .ok_or(StoreError::ItemNotFound { id })?;
        Ok(item.meta.get(key).cloned())
    }

    async fn set_meta(&self, id: ItemId, key: &str, value: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        let value = value.to_string();
        self.mutate(id, move |meta| {
            meta.insert(key, value.clone()).as_deref() != Some(value.as_str())
        })
        .await
    }

    async fn delete_meta(&self, id: ItemId, key: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        self.mutate(id, move |meta| meta.remove(&key).is_some()).await
    }

    async fn query(&self, query: &ItemQuery) -> Result<Vec<ItemId>, StoreError> {
        let document = self.load().await?;
        Ok(run_query(&document.items, query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{META_BROKEN, META_CHECKED, META_TEASER_URL};
    use chrono::Utc;

    fn item(id: ItemId) -> Item {
        Item::new(id, "jie", "publish", Utc::now()).with_teaser_url("https://a.example")
    }

    #[tokio::test]
    async fn test_open_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("items.json"))
            .await
            .unwrap();

        let ids = store.query(&ItemQuery::new("jie", "publish")).await.unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_changes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");

        {
            let store = JsonFileStore::open(&path).await.unwrap();
            store.insert(item(1)).await.unwrap();
            store.set_meta(1, META_CHECKED, "1700000000").await.unwrap();
            store.set_meta(1, META_BROKEN, "1").await.unwrap();
            store.delete_meta(1, META_BROKEN).await.unwrap();
        }

        let store = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(
            store.get_meta(1, META_CHECKED).await.unwrap().as_deref(),
            Some("1700000000")
        );
        assert_eq!(store.get_meta(1, META_BROKEN).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_two_handles_keep_each_others_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");

        let seed = JsonFileStore::open(&path).await.unwrap();
        seed.insert(item(1)).await.unwrap();
        seed.insert(item(2)).await.unwrap();

        let first = JsonFileStore::open(&path).await.unwrap();
        let second = JsonFileStore::open(&path).await.unwrap();

        first.set_meta(1, META_CHECKED, "100").await.unwrap();
        second.set_meta(2, META_CHECKED, "200").await.unwrap();
        second.set_meta(1, META_BROKEN, "1").await.unwrap();

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get_meta(1, META_CHECKED).await.unwrap().as_deref(),
            Some("100")
        );
        assert_eq!(
            reopened.get_meta(2, META_CHECKED).await.unwrap().as_deref(),
            Some("200")
        );
        assert_eq!(
            reopened.get_meta(1, META_BROKEN).await.unwrap().as_deref(),
            Some("1")
        );
    }

    #[tokio::test]
    async fn test_concurrent_writers_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");

        let seed = JsonFileStore::open(&path).await.unwrap();
        for id in 1..=8 {
            seed.insert(item(id)).await.unwrap();
        }

        let mut handles = Vec::new();
        for id in 1..=8 {
            let store = JsonFileStore::open(&path).await.unwrap();
            handles.push(tokio::spawn(async move {
                store.set_meta(id, META_CHECKED, &id.to_string()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let reopened = JsonFileStore::open(&path).await.unwrap();
        for id in 1..=8 {
            assert_eq!(
                reopened.get_meta(id, META_CHECKED).await.unwrap(),
                Some(id.to_string())
            );
        }
    }

    #[tokio::test]
    async fn test_external_edit_survives_flag_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");

        let store = JsonFileStore::open(&path).await.unwrap();
        store.insert(item(1)).await.unwrap();

        // 其他程序直接改写文件中的链接
        let mut edited = item(1);
        edited
            .meta
            .insert(META_TEASER_URL.to_string(), "https://new.example".to_string());
        let document = StoreDocument { items: vec![edited] };
        std::fs::write(&path, serde_json::to_string(&document).unwrap()).unwrap();

        assert_eq!(
            store.get_meta(1, META_TEASER_URL).await.unwrap().as_deref(),
            Some("https://new.example")
        );

        store.set_meta(1, META_BROKEN, "1").await.unwrap();

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get_meta(1, META_TEASER_URL).await.unwrap().as_deref(),
            Some("https://new.example")
        );
        assert_eq!(
            reopened.get_meta(1, META_BROKEN).await.unwrap().as_deref(),
            Some("1")
        );
    }

    #[tokio::test]
    async fn test_corrupt_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let err = JsonFileStore::open(&path).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_file_corrupted_after_open_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");

        let store = JsonFileStore::open(&path).await.unwrap();
        store.insert(item(1)).await.unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let err = store.set_meta(1, META_BROKEN, "1").await.unwrap_err();
        assert!(err.is_unavailable());
        let err = store.query(&ItemQuery::new("jie", "publish")).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_unknown_item_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("items.json"))
            .await
            .unwrap();

        let err = store.get_meta(3, META_CHECKED).await.unwrap_err();
        assert!(matches!(err, StoreError::ItemNotFound { id: 3 }));
    }
}
