use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    sitewatch::logging::init().context("init logging")?;

    let cli = sitewatch::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        sitewatch::cli::Command::Classify(args) => {
            sitewatch::commands::classify_cmd(args).context("classify")?;
        }
        sitewatch::cli::Command::DiffFields(args) => {
            sitewatch::commands::diff_fields_cmd(args).context("diff fields")?;
        }
        sitewatch::cli::Command::DiffHtml(args) => {
            sitewatch::commands::diff_html_cmd(args).context("diff html")?;
        }
        sitewatch::cli::Command::StructuralDiff(args) => {
            sitewatch::commands::structural_diff_cmd(args).context("structural diff")?;
        }
        sitewatch::cli::Command::Compact(args) => {
            sitewatch::commands::compact_cmd(args).context("compact")?;
        }
        sitewatch::cli::Command::Scan(args) => {
            sitewatch::commands::scan_cmd(args).await.context("scan")?;
        }
        sitewatch::cli::Command::History {
            command: sitewatch::cli::HistoryCommand::List(args),
        } => {
            sitewatch::commands::history_list_cmd(args)
                .await
                .context("history list")?;
        }
        sitewatch::cli::Command::History {
            command: sitewatch::cli::HistoryCommand::Cleanup(args),
        } => {
            sitewatch::commands::history_cleanup_cmd(args)
                .await
                .context("history cleanup")?;
        }
    }

    Ok(())
}
