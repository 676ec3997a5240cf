//! Per-invocation state: configuration, registry session and orchestrator.

use crate::RunArgs;
use anyhow::Context;
use markpull_acquire::{AcquisitionOrchestrator, CsvSink};
use markpull_core::AppConfig;
use markpull_registry::Session;

/// Everything an acquisition command needs.
pub struct AppState {
    /// Effective configuration, command-line overrides applied
    pub config: AppConfig,
    /// Authenticated registry session
    pub session: Session,
    /// Engine configured with the effective settings
    pub orchestrator: AcquisitionOrchestrator,
}

impl AppState {
    /// Build state for one run. The token is never validated here; a bad
    /// token surfaces as a fatal registry answer on the first request.
    pub fn new(mut config: AppConfig, token: Option<&str>, args: &RunArgs) -> anyhow::Result<Self> {
        apply_run_args(&mut config, args);

        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .context("no registry token: set MARKPULL_TOKEN or pass --token")?;

        let session = Session::new(&config.registry, token)?;
        let export_dir = config.output_dir()?;
        let sink = CsvSink::from_config(&config.output, &export_dir)?;
        let orchestrator = AcquisitionOrchestrator::new(&config.acquisition, sink)?;

        tracing::info!("Export directory: {}", export_dir.display());

        Ok(Self {
            config,
            session,
            orchestrator,
        })
    }
}

/// Layer command-line options over the loaded configuration.
fn apply_run_args(config: &mut AppConfig, args: &RunArgs) {
    if let Some(concurrency) = args.concurrency {
        config.acquisition.concurrency = concurrency;
    }
    if let Some(dir) = &args.output_dir {
        config.output.directory = Some(dir.clone());
    }
}
