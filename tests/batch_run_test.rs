//! 批次检测端到端测试
//!
//! 使用内存存储和本地mock服务器驱动完整的检测流程

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use teaser_link_checker::batch::run_log::{count_entries, LOG_SEPARATOR};
use teaser_link_checker::config::ProbeConfig;
use teaser_link_checker::store::{META_BROKEN, META_CHECKED};
use teaser_link_checker::{
    BatchRunner, BatchSelector, CheckOutcome, Environment, HttpUrlProber, Item, ItemId,
    JsonFileStore, MemoryStore, MetadataStore, RunLog,
};

fn local_prober() -> Arc<HttpUrlProber> {
    Arc::new(
        HttpUrlProber::new(&ProbeConfig {
            timeout_seconds: 5,
            max_redirects: 5,
            allow_private_networks: true,
            user_agent: None,
        })
        .unwrap(),
    )
}

fn runner(store: Arc<dyn MetadataStore>, run_log: RunLog, batch_size: usize) -> BatchRunner {
    let selector = BatchSelector::new(store.clone(), "jie", "publish");
    BatchRunner::new(store, local_prober(), selector, run_log, batch_size)
}

fn item(id: ItemId, created_day: u32, url: &str) -> Item {
    Item::new(
        id,
        "jie",
        "publish",
        Utc.with_ymd_and_hms(2024, 1, created_day, 0, 0, 0).unwrap(),
    )
    .with_teaser_url(url)
}

async fn meta(store: &dyn MetadataStore, id: ItemId, key: &str) -> Option<String> {
    store.get_meta(id, key).await.unwrap()
}

#[tokio::test]
async fn test_full_run_flags_and_heals() {
    let mut server = mockito::Server::new_async().await;
    server.mock("HEAD", "/ok").with_status(200).create_async().await;
    server.mock("HEAD", "/gone").with_status(404).create_async().await;
    server.mock("HEAD", "/moved").with_status(405).create_async().await;
    server.mock("GET", "/moved").with_status(200).create_async().await;

    let base = server.url();
    let store = Arc::new(MemoryStore::with_items(vec![
        item(1, 1, &format!("{base}/ok")),
        item(2, 2, &format!("{base}/gone")),
        item(3, 3, &format!("{base}/moved")).with_meta(META_BROKEN, "1"),
        item(4, 4, "javascript:void(0)"),
    ]));
    let runner = runner(store.clone(), RunLog::disabled(), 10);

    let report = runner.try_run_batch().await.unwrap();

    assert_eq!(report.batch, vec![1, 2, 3, 4]);
    let outcomes: Vec<CheckOutcome> = report.results.iter().map(|r| r.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            CheckOutcome::Ok(200),
            CheckOutcome::Broken(404),
            CheckOutcome::Ok(200),
            CheckOutcome::Skipped,
        ]
    );

    assert_eq!(meta(store.as_ref(), 1, META_BROKEN).await, None);
    assert_eq!(meta(store.as_ref(), 2, META_BROKEN).await.as_deref(), Some("1"));
    assert_eq!(meta(store.as_ref(), 3, META_BROKEN).await, None);
    for id in 1..=4 {
        assert!(meta(store.as_ref(), id, META_CHECKED).await.is_some());
    }
}

#[tokio::test]
async fn test_rotation_across_runs() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("HEAD", mockito::Matcher::Any)
        .with_status(200)
        .create_async()
        .await;
    let base = server.url();

    let now = Utc::now();
    let store = Arc::new(MemoryStore::with_items(vec![
        item(10, 1, &format!("{base}/a")),
        item(20, 2, &format!("{base}/b"))
            .with_meta(META_CHECKED, (now - Duration::days(3)).timestamp().to_string()),
        item(30, 3, &format!("{base}/c"))
            .with_meta(META_CHECKED, (now - Duration::hours(1)).timestamp().to_string()),
    ]));
    let runner = runner(store.clone(), RunLog::disabled(), 2);

    // 从未检测的条目优先，其次是最久未检测的条目
    let first = runner.try_run_batch().await.unwrap();
    assert_eq!(first.batch, vec![10, 20]);

    // 第二轮只剩30的检测时间最早
    let second = runner.try_run_batch().await.unwrap();
    assert_eq!(second.batch[0], 30);
    assert_eq!(second.batch.len(), 2);
}

#[tokio::test]
async fn test_network_error_keeps_previous_verdict() {
    let store = Arc::new(MemoryStore::with_items(vec![
        item(1, 1, "http://127.0.0.1:1/down").with_meta(META_BROKEN, "1")
    ]));
    let runner = runner(store.clone(), RunLog::disabled(), 10);

    let report = runner.try_run_batch().await.unwrap();

    assert_eq!(report.network_error_count(), 1);
    assert_eq!(report.results[0].status_code(), None);
    assert_eq!(meta(store.as_ref(), 1, META_BROKEN).await.as_deref(), Some("1"));
    assert!(meta(store.as_ref(), 1, META_CHECKED).await.is_some());
}

#[tokio::test]
async fn test_run_log_stays_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("checker.log");
    let old: Vec<String> = (0..100).map(|i| format!("[old] block {i}")).collect();
    std::fs::write(&log_path, old.join(LOG_SEPARATOR)).unwrap();

    let store = Arc::new(MemoryStore::with_items(vec![item(1, 1, "")]));
    let runner = runner(
        store,
        RunLog::new(&log_path, Environment::Development),
        10,
    );

    runner.try_run_batch().await.unwrap();
    runner.try_run_batch().await.unwrap();

    let content = std::fs::read_to_string(&log_path).unwrap();
    assert_eq!(count_entries(&content), 100);
    assert!(!content.contains("[old] block 0\n"));
    assert!(!content.contains("[old] block 1\n"));
    assert!(content.contains("[old] block 99"));
    assert!(content.contains("(no valid teaserUrl)"));
}

#[tokio::test]
async fn test_json_store_persists_between_opens() {
    let mut server = mockito::Server::new_async().await;
    server.mock("HEAD", "/gone").with_status(404).create_async().await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("items.json");

    {
        let store = JsonFileStore::open(&path).await.unwrap();
        store
            .insert(item(7, 1, &format!("{}/gone", server.url())))
            .await
            .unwrap();
        let runner = runner(Arc::new(store), RunLog::disabled(), 10);
        runner.run_batch().await;
    }

    let reopened = JsonFileStore::open(&path).await.unwrap();
    assert_eq!(meta(&reopened, 7, META_BROKEN).await.as_deref(), Some("1"));
    assert!(meta(&reopened, 7, META_CHECKED).await.is_some());
}

#[tokio::test]
async fn test_overlapping_runs_on_one_json_file() {
    let mut server = mockito::Server::new_async().await;
    server.mock("HEAD", "/ok").with_status(200).create_async().await;
    server.mock("HEAD", "/gone").with_status(404).create_async().await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("items.json");
    let base = server.url();

    let seed = JsonFileStore::open(&path).await.unwrap();
    for id in 1..=6 {
        let target = if id % 2 == 0 { "gone" } else { "ok" };
        seed.insert(item(id, id as u32, &format!("{base}/{target}")))
            .await
            .unwrap();
    }

    // 两个独立句柄模拟两个进程同时执行检测
    let first = runner(
        Arc::new(JsonFileStore::open(&path).await.unwrap()),
        RunLog::disabled(),
        6,
    );
    let second = runner(
        Arc::new(JsonFileStore::open(&path).await.unwrap()),
        RunLog::disabled(),
        6,
    );
    let (a, b) = tokio::join!(first.try_run_batch(), second.try_run_batch());
    assert!(a.unwrap().failed_items.is_empty());
    assert!(b.unwrap().failed_items.is_empty());

    let reopened = JsonFileStore::open(&path).await.unwrap();
    for id in 1..=6 {
        assert!(meta(&reopened, id, META_CHECKED).await.is_some(), "{id}");
        let expected = if id % 2 == 0 { Some("1") } else { None };
        assert_eq!(meta(&reopened, id, META_BROKEN).await.as_deref(), expected, "{id}");
    }
}
