use std::panic::{AssertUnwindSafe, catch_unwind};

use anyhow::Context as _;
use chrono::Utc;
use serde::Serialize;
use url::Url;

use crate::classify::classify;
use crate::compact::compact;
use crate::field_diff;
use crate::history::HistoryStore;
use crate::model::{
    AuditRecord, ChangeLogEntry, ChangeStatus, ChangedField, Checks, FieldChange, HashPair,
    Screenshots, Snapshot, resource_id_from_url,
};
use crate::patch;
use crate::store::CurrentStateStore;

const SCORE_CAP: u32 = 100;
const FALLBACK_SUMMARY: &str = "diff unavailable";

/// Scanner output for one scan attempt. Fetching and hashing happen in the
/// external page scanner; this engine only consumes the result.
#[derive(Debug)]
pub enum ScanInput {
    Fetched {
        snapshot: Snapshot,
        hashes: HashPair,
        raw_html: Option<String>,
        /// Raw HTML of the previous scan, when the caller still has it.
        previous_raw_html: Option<String>,
        checks: Option<Checks>,
        screenshots: Option<Screenshots>,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub resource_id: String,
    pub status: ChangeStatus,
    pub baseline: bool,
    pub logged_to_history: bool,
    /// Compacted record written as the resource's current state.
    pub record: AuditRecord,
}

/// Runs one scan through classify → diff → compact → persist.
///
/// Writes for the same resource must be serialized by the caller; the
/// current-state write is last-write-wins and history reads re-sort, so
/// independent resources can run fully in parallel.
pub async fn run_scan(
    state: &dyn CurrentStateStore,
    history: &dyn HistoryStore,
    url: &Url,
    input: ScanInput,
) -> anyhow::Result<ScanReport> {
    let resource_id = resource_id_from_url(url);
    let previous = state
        .get(&resource_id)
        .await
        .context("load current state")?;

    match input {
        ScanInput::Failed { error } => {
            run_failed_scan(state, &resource_id, url, previous, &error).await
        }
        ScanInput::Fetched {
            snapshot,
            hashes,
            raw_html,
            previous_raw_html,
            checks,
            screenshots,
        } => {
            let baseline = previous.is_none();
            let prev_hashes = previous.as_ref().and_then(|p| p.hashes.as_ref());
            let status = classify(&hashes, prev_hashes);

            let (field_changes, diff_summary, diff_patch) = if status == ChangeStatus::NoChange {
                (Vec::new(), Some(field_diff::summarize(&[])), None)
            } else {
                let prev_snapshot =
                    previous_snapshot_for_diff(history, &resource_id, previous.as_ref())
                        .await
                        .context("load previous snapshot")?;
                generate_diffs(
                    &snapshot,
                    prev_snapshot.as_ref(),
                    previous_raw_html.as_deref(),
                    raw_html.as_deref(),
                )
            };

            let scanned_at = Utc::now();
            let score = change_score(&field_changes);

            let record = AuditRecord {
                resource_id: resource_id.clone(),
                url: Some(url.to_string()),
                snapshot: Some(snapshot.clone()),
                checks,
                screenshots,
                field_changes: field_changes.clone(),
                diff_summary: diff_summary.clone(),
                diff_patch,
                hashes: Some(hashes.clone()),
                change_status: status,
                scanned_at,
            };

            let logged_to_history = status != ChangeStatus::NoChange;
            if logged_to_history {
                let entry = ChangeLogEntry {
                    resource_id: resource_id.clone(),
                    timestamp: Some(scanned_at),
                    change_type: status,
                    field_changes,
                    summary: diff_summary,
                    snapshot: Some(snapshot),
                    hashes: Some(hashes),
                    diff_patch: record.diff_patch.clone(),
                    score,
                };
                history.append(entry).await.context("append history")?;
            }

            let compacted = compact(record);
            state
                .put(&compacted)
                .await
                .context("write current state")?;

            tracing::info!(
                resource_id,
                status = ?status,
                baseline,
                logged_to_history,
                "scan processed"
            );

            Ok(ScanReport {
                resource_id,
                status,
                baseline,
                logged_to_history,
                record: compacted,
            })
        }
    }
}

/// A failed fetch updates the current state only. The previous snapshot and
/// hashes are carried forward so the next successful scan classifies
/// against the last good scan instead of re-baselining.
async fn run_failed_scan(
    state: &dyn CurrentStateStore,
    resource_id: &str,
    url: &Url,
    previous: Option<AuditRecord>,
    error: &str,
) -> anyhow::Result<ScanReport> {
    let (snapshot, hashes) = match previous {
        Some(previous) => (previous.snapshot, previous.hashes),
        None => (None, None),
    };

    let record = AuditRecord {
        resource_id: resource_id.to_owned(),
        url: Some(url.to_string()),
        snapshot,
        checks: None,
        screenshots: None,
        field_changes: Vec::new(),
        diff_summary: Some(format!("scan failed: {error}")),
        diff_patch: None,
        hashes,
        change_status: ChangeStatus::ScanFailed,
        scanned_at: Utc::now(),
    };

    let compacted = compact(record);
    state
        .put(&compacted)
        .await
        .context("write current state")?;

    tracing::warn!(resource_id, error, "scan failed; state updated, not logged");

    Ok(ScanReport {
        resource_id: resource_id.to_owned(),
        status: ChangeStatus::ScanFailed,
        baseline: false,
        logged_to_history: false,
        record: compacted,
    })
}

/// The compacted current state drops simplified content, so the full
/// snapshot from the latest history entry is preferred for diffing. History
/// gets an entry on every real or technical change, so its snapshot always
/// matches the page as of the last content movement.
async fn previous_snapshot_for_diff(
    history: &dyn HistoryStore,
    resource_id: &str,
    previous: Option<&AuditRecord>,
) -> anyhow::Result<Option<Snapshot>> {
    if previous.is_none() {
        return Ok(None);
    }

    let from_history = history
        .latest(resource_id)
        .await
        .context("read latest history entry")?
        .and_then(|entry| entry.snapshot);

    Ok(from_history.or_else(|| previous.and_then(|p| p.snapshot.clone())))
}

/// Diff generation must never take the scan down with it: a failure is
/// caught locally, the diff fields are omitted and a fallback summary is
/// stored instead.
fn generate_diffs(
    snapshot: &Snapshot,
    prev_snapshot: Option<&Snapshot>,
    previous_raw_html: Option<&str>,
    raw_html: Option<&str>,
) -> (Vec<FieldChange>, Option<String>, Option<String>) {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let field_changes = field_diff::diff_fields(Some(snapshot), prev_snapshot);
        let summary = field_diff::summarize(&field_changes);
        let diff_patch = patch::diff_raw_html(previous_raw_html, raw_html);
        (field_changes, summary, diff_patch)
    }));

    match outcome {
        Ok((field_changes, summary, diff_patch)) => {
            (field_changes, Some(summary), diff_patch)
        }
        Err(_) => {
            tracing::warn!("diff generation failed; saving record without diffs");
            (Vec::new(), Some(FALLBACK_SUMMARY.to_owned()), None)
        }
    }
}

fn change_score(changes: &[FieldChange]) -> u32 {
    let mut score = 0u32;
    for change in changes {
        score += match change.field {
            ChangedField::Title | ChangedField::H1 | ChangedField::MetaDescription => 3,
            ChangedField::WordCount => 1,
            ChangedField::Content(_) => 2,
        };
    }
    score.min(SCORE_CAP)
}
