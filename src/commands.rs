use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;
use url::Url;

use crate::classify::classify;
use crate::cli::{
    ClassifyArgs, CompactArgs, DiffFieldsArgs, DiffHtmlArgs, HistoryCleanupArgs, HistoryListArgs,
    ScanArgs, StructuralDiffArgs,
};
use crate::compact::compact;
use crate::field_diff;
use crate::history::{HistoryStore as _, LocalFsHistoryStore};
use crate::model::{
    AuditRecord, Checks, HashPair, Screenshots, Snapshot, resource_id_from_url,
};
use crate::patch;
use crate::pipeline::{self, ScanInput};
use crate::store::LocalFsCurrentStateStore;
use crate::structural;

pub fn classify_cmd(args: ClassifyArgs) -> anyhow::Result<()> {
    let new = HashPair {
        full_hash: args.new_full,
        content_hash: args.new_content,
    };
    let prev = match (args.prev_full, args.prev_content) {
        (Some(full_hash), Some(content_hash)) => Some(HashPair {
            full_hash,
            content_hash,
        }),
        (None, None) => None,
        _ => anyhow::bail!("--prev-full and --prev-content must be given together"),
    };

    let status = classify(&new, prev.as_ref());
    println!("{}", serde_json::to_string(&status).context("serialize status")?);
    Ok(())
}

pub fn diff_fields_cmd(args: DiffFieldsArgs) -> anyhow::Result<()> {
    let prev: Option<Snapshot> = read_optional_json(args.prev.as_deref())?;
    let curr: Option<Snapshot> = read_optional_json(args.curr.as_deref())?;

    let changes = field_diff::diff_fields(curr.as_ref(), prev.as_ref());
    println!(
        "{}",
        serde_json::to_string_pretty(&changes).context("serialize field changes")?
    );
    Ok(())
}

pub fn diff_html_cmd(args: DiffHtmlArgs) -> anyhow::Result<()> {
    let prev = read_optional_text(args.prev.as_deref())?;
    let curr = read_optional_text(args.curr.as_deref())?;

    match patch::diff_raw_html(prev.as_deref(), curr.as_deref()) {
        Some(patch) => print!("{patch}"),
        None => println!("no difference available"),
    }
    Ok(())
}

pub fn structural_diff_cmd(args: StructuralDiffArgs) -> anyhow::Result<()> {
    let prev = read_optional_text(args.prev.as_deref())?;
    let curr = read_optional_text(args.curr.as_deref())?;
    let base_url = args
        .base_url
        .as_deref()
        .map(Url::parse)
        .transpose()
        .context("parse --base-url")?;

    let diff = structural::structural_diff(prev.as_deref(), curr.as_deref(), base_url.as_ref());

    if let Some(out) = args.out.as_deref() {
        std::fs::write(out, &diff.document).with_context(|| format!("write diff document: {out}"))?;
        tracing::info!(out, "wrote structural diff document");
    }

    let stats = serde_json::json!({
        "additions": diff.additions,
        "deletions": diff.deletions,
        "stylesheets": diff.stylesheets.len(),
    });
    println!("{}", serde_json::to_string_pretty(&stats).context("serialize stats")?);
    Ok(())
}

pub fn compact_cmd(args: CompactArgs) -> anyhow::Result<()> {
    let record: AuditRecord = read_json(Path::new(&args.record))?;
    let compacted = compact(record);
    println!(
        "{}",
        serde_json::to_string_pretty(&compacted).context("serialize compacted record")?
    );
    Ok(())
}

/// Scanner result file: either a fetched page (snapshot + hashes) or a
/// fetch error.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScanResultFile {
    snapshot: Option<Snapshot>,
    hashes: Option<HashPair>,
    raw_html: Option<String>,
    previous_raw_html: Option<String>,
    checks: Option<Checks>,
    screenshots: Option<Screenshots>,
    error: Option<String>,
}

pub async fn scan_cmd(args: ScanArgs) -> anyhow::Result<()> {
    let url = Url::parse(&args.url).context("parse --url")?;
    let input_file: ScanResultFile = read_json(Path::new(&args.input))?;

    let input = match input_file.error {
        Some(error) => ScanInput::Failed { error },
        None => {
            let snapshot = input_file
                .snapshot
                .ok_or_else(|| anyhow::anyhow!("scan input needs a snapshot or an error"))?;
            let hashes = input_file
                .hashes
                .ok_or_else(|| anyhow::anyhow!("scan input needs hashes or an error"))?;
            ScanInput::Fetched {
                snapshot,
                hashes,
                raw_html: input_file.raw_html,
                previous_raw_html: input_file.previous_raw_html,
                checks: input_file.checks,
                screenshots: input_file.screenshots,
            }
        }
    };

    let store_dir = PathBuf::from(&args.store_dir);
    let state = LocalFsCurrentStateStore::new(&store_dir);
    let history = LocalFsHistoryStore::new(&store_dir);

    let report = pipeline::run_scan(&state, &history, &url, input)
        .await
        .context("run scan")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("serialize scan report")?
    );
    Ok(())
}

pub async fn history_list_cmd(args: HistoryListArgs) -> anyhow::Result<()> {
    let url = Url::parse(&args.url).context("parse --url")?;
    let history = LocalFsHistoryStore::new(&args.store_dir);

    let entries = history
        .history(&resource_id_from_url(&url), args.limit)
        .await
        .context("read history")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&entries).context("serialize history entries")?
    );
    Ok(())
}

pub async fn history_cleanup_cmd(args: HistoryCleanupArgs) -> anyhow::Result<()> {
    let history = LocalFsHistoryStore::new(&args.store_dir);

    let stats = history
        .cleanup(args.max_age_days, args.keep_per_resource)
        .await
        .context("history cleanup")?;
    println!(
        "{}",
        serde_json::to_string(&stats).context("serialize cleanup stats")?
    );
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("read: {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse json: {}", path.display()))
}

fn read_optional_json<T: serde::de::DeserializeOwned>(
    path: Option<&str>,
) -> anyhow::Result<Option<T>> {
    path.map(|p| read_json(Path::new(p))).transpose()
}

fn read_optional_text(path: Option<&str>) -> anyhow::Result<Option<String>> {
    path.map(|p| std::fs::read_to_string(p).with_context(|| format!("read: {p}")))
        .transpose()
}
