use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::fs;

use crate::model::ChangeLogEntry;
use crate::store::{file_stem_for, write_bytes_atomic};

/// Upper bound on entries removed per delete pass.
const CLEANUP_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct CleanupStats {
    pub deleted: usize,
    pub kept: usize,
}

/// Append-only change log. Entries are removed only by retention cleanup,
/// which never drops a resource below its floor count.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends an entry, stamping the current time if the entry carries no
    /// timestamp. Returns the entry as stored.
    async fn append(&self, entry: ChangeLogEntry) -> anyhow::Result<ChangeLogEntry>;

    async fn latest(&self, resource_id: &str) -> anyhow::Result<Option<ChangeLogEntry>>;

    /// Entries for one resource, newest first. Appends may arrive out of
    /// timestamp order, so reads sort in memory before applying the limit.
    async fn history(
        &self,
        resource_id: &str,
        limit: Option<usize>,
    ) -> anyhow::Result<Vec<ChangeLogEntry>>;

    async fn count_for(&self, resource_id: &str) -> anyhow::Result<usize>;

    async fn delete_all_for(&self, resource_id: &str) -> anyhow::Result<()>;

    /// Per resource: the `keep_per_resource` newest entries survive
    /// unconditionally; of the remainder, entries at or newer than the age
    /// cutoff survive and the rest are deleted. A failure on one resource
    /// is logged and skipped so the batch continues.
    async fn cleanup(
        &self,
        max_age_days: u32,
        keep_per_resource: usize,
    ) -> anyhow::Result<CleanupStats>;
}

/// One JSONL append log per resource under `<base>/history/`.
#[derive(Debug, Clone)]
pub struct LocalFsHistoryStore {
    base_dir: PathBuf,
}

impl LocalFsHistoryStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn history_dir(&self) -> PathBuf {
        self.base_dir.join("history")
    }

    fn log_path(&self, resource_id: &str) -> PathBuf {
        self.history_dir()
            .join(format!("{}.jsonl", file_stem_for(resource_id)))
    }

    async fn read_entries(&self, path: &Path) -> anyhow::Result<Vec<ChangeLogEntry>> {
        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("read history log: {}", path.display()));
            }
        };

        let mut entries = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: ChangeLogEntry = serde_json::from_str(line)
                .with_context(|| format!("parse history entry: {}", path.display()))?;
            entries.push(entry);
        }
        Ok(entries)
    }

    async fn sorted_entries(&self, resource_id: &str) -> anyhow::Result<Vec<ChangeLogEntry>> {
        let mut entries = self.read_entries(&self.log_path(resource_id)).await?;
        sort_newest_first(&mut entries);
        Ok(entries)
    }

    async fn cleanup_log(
        &self,
        path: &Path,
        cutoff: DateTime<Utc>,
        keep_per_resource: usize,
    ) -> anyhow::Result<CleanupStats> {
        let mut entries = self.read_entries(path).await?;
        sort_newest_first(&mut entries);

        // Newest-first index order makes the floor a simple prefix.
        let mut flagged: Vec<(ChangeLogEntry, bool)> = entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                let keep = index < keep_per_resource
                    || entry.timestamp.is_some_and(|t| t >= cutoff);
                (entry, keep)
            })
            .collect();

        let kept = flagged.iter().filter(|(_, keep)| *keep).count();
        let mut deleted = 0usize;

        while flagged.iter().any(|(_, keep)| !keep) {
            let mut removed_this_pass = 0usize;
            flagged.retain(|(_, keep)| {
                if *keep || removed_this_pass >= CLEANUP_BATCH_SIZE {
                    true
                } else {
                    removed_this_pass += 1;
                    false
                }
            });
            deleted += removed_this_pass;
            write_log_atomic(path, &flagged).await?;
        }

        Ok(CleanupStats { deleted, kept })
    }
}

fn sort_newest_first(entries: &mut [ChangeLogEntry]) {
    // Unstamped entries sort last (oldest).
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

async fn write_log_atomic(path: &Path, flagged: &[(ChangeLogEntry, bool)]) -> anyhow::Result<()> {
    // Logs are stored oldest-first so appends stay cheap.
    let mut data = Vec::new();
    for (entry, _) in flagged.iter().rev() {
        serde_json::to_writer(&mut data, entry).context("serialize history entry")?;
        data.push(b'\n');
    }
    write_bytes_atomic(path, &data).await
}

#[async_trait]
impl HistoryStore for LocalFsHistoryStore {
    async fn append(&self, mut entry: ChangeLogEntry) -> anyhow::Result<ChangeLogEntry> {
        if entry.timestamp.is_none() {
            entry.timestamp = Some(Utc::now());
        }

        let path = self.log_path(&entry.resource_id);
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("history path has no parent: {}", path.display()))?;
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create history dir: {}", parent.display()))?;

        let mut line = serde_json::to_vec(&entry).context("serialize history entry")?;
        line.push(b'\n');

        let mut options = fs::OpenOptions::new();
        options.create(true).append(true);
        let mut file = options
            .open(&path)
            .await
            .with_context(|| format!("open history log: {}", path.display()))?;
        use tokio::io::AsyncWriteExt as _;
        file.write_all(&line)
            .await
            .with_context(|| format!("append history entry: {}", path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flush history log: {}", path.display()))?;

        Ok(entry)
    }

    async fn latest(&self, resource_id: &str) -> anyhow::Result<Option<ChangeLogEntry>> {
        let entries = self.sorted_entries(resource_id).await?;
        Ok(entries.into_iter().next())
    }

    async fn history(
        &self,
        resource_id: &str,
        limit: Option<usize>,
    ) -> anyhow::Result<Vec<ChangeLogEntry>> {
        let mut entries = self.sorted_entries(resource_id).await?;
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    async fn count_for(&self, resource_id: &str) -> anyhow::Result<usize> {
        Ok(self.read_entries(&self.log_path(resource_id)).await?.len())
    }

    async fn delete_all_for(&self, resource_id: &str) -> anyhow::Result<()> {
        let path = self.log_path(resource_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("delete history log: {}", path.display()))
            }
        }
    }

    async fn cleanup(
        &self,
        max_age_days: u32,
        keep_per_resource: usize,
    ) -> anyhow::Result<CleanupStats> {
        let cutoff = Utc::now() - Duration::days(i64::from(max_age_days));

        let mut read_dir = match fs::read_dir(self.history_dir()).await {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CleanupStats::default());
            }
            Err(err) => return Err(err).context("read history dir"),
        };

        let mut stats = CleanupStats::default();
        while let Some(dir_entry) = read_dir.next_entry().await.context("iterate history dir")? {
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }

            match self.cleanup_log(&path, cutoff, keep_per_resource).await {
                Ok(log_stats) => {
                    stats.deleted += log_stats.deleted;
                    stats.kept += log_stats.kept;
                }
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %format!("{err:#}"),
                        "history cleanup failed for resource; continuing"
                    );
                }
            }
        }

        Ok(stats)
    }
}
