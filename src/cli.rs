use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Classify the change between two hash pairs.
    Classify(ClassifyArgs),
    /// Field-level diff between two snapshot JSON files.
    DiffFields(DiffFieldsArgs),
    /// Unified diff between two raw HTML files, noise stripped.
    DiffHtml(DiffHtmlArgs),
    /// Visual merged-HTML diff between two raw HTML files.
    StructuralDiff(StructuralDiffArgs),
    /// Compact an audit record JSON file to its current-state form.
    Compact(CompactArgs),
    /// Run one scanner result through the full pipeline.
    Scan(ScanArgs),
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },
}

#[derive(Debug, Args)]
pub struct ClassifyArgs {
    /// Full hash of the new scan.
    #[arg(long)]
    pub new_full: String,

    /// Content hash of the new scan.
    #[arg(long)]
    pub new_content: String,

    /// Full hash of the previous scan (omit for a baseline scan).
    #[arg(long)]
    pub prev_full: Option<String>,

    /// Content hash of the previous scan.
    #[arg(long)]
    pub prev_content: Option<String>,
}

#[derive(Debug, Args)]
pub struct DiffFieldsArgs {
    /// Previous snapshot JSON file (omit for a baseline diff).
    #[arg(long)]
    pub prev: Option<String>,

    /// Current snapshot JSON file.
    #[arg(long)]
    pub curr: Option<String>,
}

#[derive(Debug, Args)]
pub struct DiffHtmlArgs {
    /// Previous raw HTML file.
    #[arg(long)]
    pub prev: Option<String>,

    /// Current raw HTML file.
    #[arg(long)]
    pub curr: Option<String>,
}

#[derive(Debug, Args)]
pub struct StructuralDiffArgs {
    /// Previous raw HTML file.
    #[arg(long)]
    pub prev: Option<String>,

    /// Current raw HTML file.
    #[arg(long)]
    pub curr: Option<String>,

    /// Base URL for resolving relative references.
    #[arg(long)]
    pub base_url: Option<String>,

    /// Output path for the standalone diff document.
    #[arg(long)]
    pub out: Option<String>,
}

#[derive(Debug, Args)]
pub struct CompactArgs {
    /// Audit record JSON file.
    #[arg(long)]
    pub record: String,
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Resource URL the scan belongs to.
    #[arg(long)]
    pub url: String,

    /// Store directory for current state and history.
    #[arg(long)]
    pub store_dir: String,

    /// Scanner result JSON file (snapshot + hashes, or an error).
    #[arg(long)]
    pub input: String,
}

#[derive(Debug, Subcommand)]
pub enum HistoryCommand {
    List(HistoryListArgs),
    Cleanup(HistoryCleanupArgs),
}

#[derive(Debug, Args)]
pub struct HistoryListArgs {
    /// Resource URL to list history for.
    #[arg(long)]
    pub url: String,

    /// Store directory for current state and history.
    #[arg(long)]
    pub store_dir: String,

    /// Maximum entries to print, newest first.
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Args)]
pub struct HistoryCleanupArgs {
    /// Store directory for current state and history.
    #[arg(long)]
    pub store_dir: String,

    /// Entries older than this survive only inside the per-resource floor.
    #[arg(long, default_value_t = 30)]
    pub max_age_days: u32,

    /// Newest entries kept per resource regardless of age.
    #[arg(long, default_value_t = 2)]
    pub keep_per_resource: usize,
}
