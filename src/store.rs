use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::fs;

use crate::model::AuditRecord;

/// Durable "current state" per resource: the compacted audit record from
/// the most recent scan. Last-write-wins; callers serialize writes to the
/// same resource.
#[async_trait]
pub trait CurrentStateStore: Send + Sync {
    async fn put(&self, record: &AuditRecord) -> anyhow::Result<()>;
    async fn get(&self, resource_id: &str) -> anyhow::Result<Option<AuditRecord>>;
}

#[derive(Debug, Clone)]
pub struct LocalFsCurrentStateStore {
    base_dir: PathBuf,
}

impl LocalFsCurrentStateStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn current_json_path(&self, resource_id: &str) -> PathBuf {
        self.base_dir
            .join("resources")
            .join(file_stem_for(resource_id))
            .join("current.json")
    }
}

#[async_trait]
impl CurrentStateStore for LocalFsCurrentStateStore {
    async fn put(&self, record: &AuditRecord) -> anyhow::Result<()> {
        let path = self.current_json_path(&record.resource_id);
        write_json_atomic(&path, record)
            .await
            .with_context(|| format!("write current state: {}", path.display()))
    }

    async fn get(&self, resource_id: &str) -> anyhow::Result<Option<AuditRecord>> {
        let path = self.current_json_path(resource_id);
        read_json(&path)
            .await
            .with_context(|| format!("read current state: {}", path.display()))
    }
}

/// Resource ids become file names; anything outside a conservative set is
/// replaced so ids can never escape the store directory.
pub(crate) fn file_stem_for(resource_id: &str) -> String {
    resource_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_slice(&bytes).context("parse json")?;
    Ok(Some(value))
}

pub(crate) async fn write_json_atomic<T: serde::Serialize>(
    path: &Path,
    value: &T,
) -> anyhow::Result<()> {
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    write_bytes_atomic(path, &data).await
}

pub(crate) async fn write_bytes_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    fs::write(&tmp_path, data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChangeStatus;
    use chrono::Utc;

    fn record(resource_id: &str) -> AuditRecord {
        AuditRecord {
            resource_id: resource_id.to_owned(),
            url: Some("https://example.com/".to_owned()),
            snapshot: None,
            checks: None,
            screenshots: None,
            field_changes: Vec::new(),
            diff_summary: Some("no changes detected".to_owned()),
            diff_patch: None,
            hashes: None,
            change_status: ChangeStatus::NoChange,
            scanned_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsCurrentStateStore::new(dir.path());

        let record = record("r_1");
        store.put(&record).await.unwrap();

        let loaded = store.get("r_1").await.unwrap().unwrap();
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn get_missing_resource_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsCurrentStateStore::new(dir.path());
        assert!(store.get("r_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_overwrites_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsCurrentStateStore::new(dir.path());

        store.put(&record("r_1")).await.unwrap();
        let mut updated = record("r_1");
        updated.change_status = ChangeStatus::ContentChanged;
        store.put(&updated).await.unwrap();

        let loaded = store.get("r_1").await.unwrap().unwrap();
        assert_eq!(loaded.change_status, ChangeStatus::ContentChanged);
    }

    #[test]
    fn file_stem_replaces_path_characters() {
        assert_eq!(file_stem_for("r_abc123"), "r_abc123");
        assert_eq!(file_stem_for("../evil"), ".._evil");
        assert_eq!(file_stem_for("a/b\\c"), "a_b_c");
    }
}
