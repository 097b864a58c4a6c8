// src/main.rs

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use vanguard_scan_engine::core::knowledge_base::{findings_in, FindingCategory};
use vanguard_scan_engine::logging::initialize_logging;
use vanguard_scan_engine::{EngineConfig, Principal, ScanEngine, ScanId, ScanRequest};

/// Submit targets for security scanning and manage the stored results.
#[derive(Debug, Parser)]
#[command(name = "vanguard-scan", version, about)]
struct Cli {
    /// Identity of the authenticated caller.
    #[arg(long, global = true, env = "VANGUARD_OWNER")]
    owner: Option<String>,

    /// Config file to use instead of the per-user one.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Echo warnings to stderr as well as the log file.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register the caller as an owner.
    Register,
    /// Remove the caller and every scan it owns.
    Unregister,
    /// Scan a target and store the result.
    Scan {
        /// Address to scan, e.g. https://example.com
        target: String,
        /// Human-readable name for the target.
        #[arg(long)]
        label: String,
        /// "Web Application" or "API".
        #[arg(long, default_value = "Web Application")]
        kind: String,
    },
    /// List the caller's scans, newest first.
    List,
    /// Show one scan.
    Show { scan_id: ScanId },
    /// Attach a report file to a scan.
    Attach {
        scan_id: ScanId,
        file: PathBuf,
        #[arg(long, default_value = "application/pdf")]
        content_type: String,
    },
    /// Write a scan's report to a directory.
    Export {
        scan_id: ScanId,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Delete scans; ids the caller does not own are ignored.
    Delete {
        #[arg(required = true)]
        scan_ids: Vec<ScanId>,
    },
    /// Print the catalog of findings the checkers can report.
    Catalog,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn principal(cli: &Cli) -> Result<Principal> {
    cli.owner
        .as_deref()
        .filter(|o| !o.trim().is_empty())
        .map(Principal::new)
        .ok_or_else(|| eyre!("no owner given, use --owner or VANGUARD_OWNER"))
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let config = EngineConfig::load(cli.config.as_deref()).wrap_err("could not load configuration")?;
    initialize_logging(&config.data_dir, cli.verbose)?;

    if let Command::Catalog = cli.command {
        for category in [FindingCategory::Http, FindingCategory::Transport] {
            println!("{}", category);
            for finding in findings_in(category) {
                println!("  [{}] {} ({})", finding.severity, finding.title, finding.code);
            }
        }
        return Ok(());
    }

    let engine = ScanEngine::open(&config).await?;
    let principal = principal(&cli)?;
    info!(owner = %principal.owner_id(), command = ?cli.command, "Running command.");

    match &cli.command {
        Command::Register => print_json(&engine.register_owner(principal.owner_id().clone()).await?)?,
        Command::Unregister => print_json(&engine.remove_owner(principal.owner_id()).await?)?,
        Command::Scan { target, label, kind } => {
            let summary = engine
                .submit(&principal, ScanRequest::new(target.as_str(), label.as_str(), kind.as_str()))
                .await?;
            print_json(&summary)?;
        }
        Command::List => print_json(&engine.list(&principal).await?)?,
        Command::Show { scan_id } => print_json(&engine.show(&principal, *scan_id).await?)?,
        Command::Attach { scan_id, file, content_type } => {
            let bytes = tokio::fs::read(file)
                .await
                .wrap_err_with(|| format!("could not read {}", file.display()))?;
            engine.attach_report(&principal, *scan_id, bytes, content_type).await?;
            println!("Report attached to scan {}.", scan_id);
        }
        Command::Export { scan_id, out } => {
            let download = engine.download_report(&principal, *scan_id).await?;
            tokio::fs::create_dir_all(out).await?;
            let path = out.join(&download.filename);
            tokio::fs::write(&path, &download.bytes)
                .await
                .wrap_err_with(|| format!("could not write {}", path.display()))?;
            println!("{}", path.display());
        }
        Command::Delete { scan_ids } => print_json(&engine.delete(&principal, scan_ids).await?)?,
        Command::Catalog => {}
    }

    Ok(())
}
