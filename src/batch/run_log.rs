//! 检测日志
//!
//! 仅在开发环境启用。每轮检测追加一个日志块，块之间以分隔行隔开；
//! 已有块数达到上限时只保留最新的 `max_entries - 1` 块，再追加新块。
//! 整个读-改-写过程持有文件的排他锁。

use crate::config::Environment;
use crate::probe::CheckResult;
use crate::store::ItemId;
use chrono::{DateTime, Utc};
use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 日志块分隔符
pub const LOG_SEPARATOR: &str = "\n---\n";

/// 最多保留的日志块数
pub const MAX_LOG_ENTRIES: usize = 100;

/// 链接缺失时的占位文本
const MISSING_URL_PLACEHOLDER: &str = "(no valid teaserUrl)";

/// 检测日志
#[derive(Debug, Clone)]
pub struct RunLog {
    /// 日志文件路径
    path: PathBuf,
    /// 是否启用
    enabled: bool,
    /// 最多保留的日志块数
    max_entries: usize,
}

impl RunLog {
    /// 根据运行环境创建检测日志，仅开发环境启用
    pub fn new(path: impl Into<PathBuf>, environment: Environment) -> Self {
        Self {
            path: path.into(),
            enabled: environment.is_development(),
            max_entries: MAX_LOG_ENTRIES,
        }
    }

    /// 创建禁用的检测日志
    pub fn disabled() -> Self {
        Self::new(PathBuf::new(), Environment::Production)
    }

    /// 是否启用
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 日志文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一轮检测的日志块，未启用时不做任何操作
    ///
    /// # 参数
    /// * `ids` - 本轮选中的条目ID
    /// * `results` - 各条目的检测记录
    pub async fn append(&self, ids: &[ItemId], results: &[CheckResult]) -> io::Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let entry = render_entry(ids, results, Utc::now());
        let path = self.path.clone();
        let max_entries = self.max_entries;

        tokio::task::spawn_blocking(move || write_locked(&path, &entry, max_entries))
            .await
            .map_err(io::Error::other)??;

        debug!("检测日志已写入: {}", self.path.display());
        Ok(())
    }
}

/// 渲染单个日志块
pub fn render_entry(ids: &[ItemId], results: &[CheckResult], now: DateTime<Utc>) -> String {
    let id_list = if ids.is_empty() {
        "(none)".to_string()
    } else {
        ids.iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut lines = vec![format!(
        "[{} UTC]  Batch: {} item(s)  [{}]",
        now.format("%Y-%m-%d %H:%M:%S"),
        ids.len(),
        id_list
    )];

    for result in results {
        // 链接中的换行会伪造出新的日志行或分隔符
        let url_part = if result.url.trim().is_empty() {
            MISSING_URL_PLACEHOLDER.to_string()
        } else {
            result.url.replace(['\r', '\n'], " ")
        };
        lines.push(format!(
            "  Item {:<8}  {:<18}  {}",
            result.item_id,
            result.outcome.label(),
            url_part
        ));
    }

    lines.join("\n")
}

/// 合并已有日志内容和新日志块
pub fn merge_entries(existing: &str, new_entry: &str, max_entries: usize) -> String {
    let existing = existing.trim();
    if existing.is_empty() {
        return new_entry.to_string();
    }

    let mut entries: Vec<&str> = existing.split(LOG_SEPARATOR).collect();
    let keep = max_entries.saturating_sub(1);
    if entries.len() >= max_entries {
        entries.drain(..entries.len() - keep);
    }

    entries.push(new_entry);
    entries.join(LOG_SEPARATOR)
}

/// 统计日志内容中的块数
pub fn count_entries(content: &str) -> usize {
    let content = content.trim();
    if content.is_empty() {
        0
    } else {
        content.split(LOG_SEPARATOR).count()
    }
}

/// 在排他锁下完成读-改-写
fn write_locked(path: &Path, entry: &str, max_entries: usize) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    #[cfg(unix)]
    let mut file = nix::fcntl::Flock::lock(file, nix::fcntl::FlockArg::LockExclusive)
        .map_err(|(_, errno)| io::Error::from(errno))?;
    #[cfg(not(unix))]
    let mut file = file;

    let mut raw = Vec::new();
    file.read_to_end(&mut raw)?;
    let existing = String::from_utf8_lossy(&raw);

    let content = merge_entries(&existing, entry, max_entries);

    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(content.as_bytes())?;
    file.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::CheckOutcome;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap()
    }

    fn result(id: ItemId, url: &str, outcome: CheckOutcome) -> CheckResult {
        CheckResult::new(id, url, outcome, at())
    }

    #[test]
    fn test_render_entry() {
        let results = vec![
            result(12, "https://a.example/x", CheckOutcome::Ok(200)),
            result(7, "https://b.example/y", CheckOutcome::Broken(404)),
            result(9, "https://c.example", CheckOutcome::NetworkError),
            result(3, "", CheckOutcome::Skipped),
        ];

        let entry = render_entry(&[12, 7, 9, 3], &results, at());
        let lines: Vec<&str> = entry.lines().collect();

        assert_eq!(
            lines[0],
            "[2025-03-04 05:06:07 UTC]  Batch: 4 item(s)  [12, 7, 9, 3]"
        );
        assert_eq!(
            lines[1],
            "  Item 12        200 OK              https://a.example/x"
        );
        assert_eq!(
            lines[2],
            "  Item 7         404 BROKEN          https://b.example/y"
        );
        assert!(lines[3].contains("NETWORK ERROR"));
        assert!(lines[4].contains("SKIPPED"));
        assert!(lines[4].ends_with("(no valid teaserUrl)"));
    }

    #[test]
    fn test_newlines_in_url_stay_on_one_line() {
        let results = vec![
            result(1, "https://a.example/x\n---\n[forged]", CheckOutcome::Broken(404)),
            result(2, "https://b.example/\r\n  Item 99  200 OK", CheckOutcome::Ok(200)),
        ];

        let entry = render_entry(&[1, 2], &results, at());

        assert_eq!(entry.lines().count(), 3);
        assert_eq!(count_entries(&entry), 1);
        assert_eq!(count_entries(&merge_entries(&entry, "next", 100)), 2);
        assert!(entry.contains("https://a.example/x --- [forged]"));
    }

    #[test]
    fn test_render_empty_batch() {
        let entry = render_entry(&[], &[], at());
        assert_eq!(entry, "[2025-03-04 05:06:07 UTC]  Batch: 0 item(s)  [(none)]");
    }

    #[test]
    fn test_merge_first_entry() {
        assert_eq!(merge_entries("", "new", 100), "new");
        assert_eq!(merge_entries("  \n", "new", 100), "new");
    }

    #[test]
    fn test_merge_appends_with_separator() {
        let merged = merge_entries("one\n---\ntwo\n", "three", 100);
        assert_eq!(merged, "one\n---\ntwo\n---\nthree");
    }

    #[test]
    fn test_merge_evicts_oldest_at_capacity() {
        let existing: Vec<String> = (0..100).map(|i| format!("entry {i}")).collect();
        let merged = merge_entries(&existing.join(LOG_SEPARATOR), "entry new", 100);

        assert_eq!(count_entries(&merged), 100);
        assert!(!merged.contains("entry 0\n"));
        assert!(merged.starts_with("entry 1\n"));
        assert!(merged.ends_with("entry new"));
    }

    #[test]
    fn test_merge_below_capacity_keeps_everything() {
        let existing: Vec<String> = (0..50).map(|i| format!("entry {i}")).collect();
        let merged = merge_entries(&existing.join(LOG_SEPARATOR), "entry new", 100);
        assert_eq!(count_entries(&merged), 51);
    }

    #[tokio::test]
    async fn test_disabled_log_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let log = RunLog::new(&path, Environment::Production);

        log.append(&[1], &[result(1, "https://a.example", CheckOutcome::Ok(200))])
            .await
            .unwrap();

        assert!(!log.is_enabled());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_append_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("run.log");
        let log = RunLog::new(&path, Environment::Development);

        log.append(&[1], &[result(1, "https://a.example", CheckOutcome::Ok(200))])
            .await
            .unwrap();
        log.append(&[], &[]).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(count_entries(&content), 2);
        assert!(content.contains("200 OK"));
        assert!(content.contains("[(none)]"));
    }

    #[tokio::test]
    async fn test_file_bounded_at_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let existing: Vec<String> = (0..100).map(|i| format!("old block {i}")).collect();
        std::fs::write(&path, existing.join(LOG_SEPARATOR)).unwrap();

        let log = RunLog::new(&path, Environment::Development);
        log.append(&[5], &[result(5, "", CheckOutcome::Skipped)])
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(count_entries(&content), 100);
        assert!(!content.contains("old block 0\n"));
        assert!(content.contains("old block 99"));
        assert!(content.trim_end().ends_with("(no valid teaserUrl)"));
    }
}
