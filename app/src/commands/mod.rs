//! Command implementations.

pub mod codes;
pub mod documents;

use crate::progress::Spinner;
use anyhow::Context;
use markpull_acquire::{ProgressListener, RunReport, RunStatus, SilentListener};
use markpull_core::AppConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How results are presented.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    /// No spinner
    pub quiet: bool,
    /// JSON summary instead of text
    pub json: bool,
}

impl Output {
    fn listener(self) -> Arc<dyn ProgressListener> {
        if self.quiet {
            Arc::new(SilentListener)
        } else {
            Arc::new(Spinner::new())
        }
    }
}

/// Token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupt received, keeping what was fetched so far...");
            token.cancel();
        }
    });
    cancel
}

/// Print the outcome of a run and turn failures into an exit error.
fn finish<R>(report: RunReport<R>, output: Output) -> anyhow::Result<()> {
    if output.json {
        let summary = serde_json::json!({
            "run_id": report.run_id.to_string(),
            "flow": report.flow,
            "status": report.status.label(),
            "partial": report.is_partial(),
            "output": report.output_path.as_ref().map(|p| p.display().to_string()),
            "stats": report.stats,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Run {} {}", report.run_id, report.status.label());
        println!("  Records:  {}", report.stats.records);
        println!("  Products: {}", report.stats.distinct_keys);
        println!(
            "  Pages:    {} ({} failed, {} retries)",
            report.stats.pages_completed, report.stats.pages_failed, report.stats.retries
        );
        if report.stats.units_scanned > 0 {
            println!(
                "  Documents: {} found, {} already exported, {} fetched, {} failed",
                report.stats.units_scanned,
                report.stats.units_skipped,
                report.stats.units_processed,
                report.stats.units_failed
            );
        }
        if let Some(path) = &report.output_path {
            println!("  Output:   {}", path.display());
        }
        if report.is_partial() {
            println!("  Result is partial.");
        }
    }

    if let Some(e) = report.sink_error {
        return Err(e).context("export failed");
    }
    match report.status {
        RunStatus::Aborted(e) => Err(e).context("run aborted"),
        _ => Ok(()),
    }
}

/// Print the effective configuration as TOML.
pub fn show_config(config: &AppConfig) -> anyhow::Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Write the effective configuration to the config file, once.
pub fn init_config(config: &AppConfig) -> anyhow::Result<()> {
    config.validate().context("refusing to save an invalid configuration")?;
    let path = AppConfig::config_path()?;
    if path.exists() {
        anyhow::bail!("{} already exists, edit it directly", path.display());
    }
    let written = config.save()?;
    println!("Wrote {}", written.display());
    Ok(())
}
