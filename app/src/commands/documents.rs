//! `markpull documents`

use super::Output;
use crate::state::AppState;
use crate::RunArgs;
use anyhow::Context;
use markpull_acquire::Ledger;
use markpull_registry::{DocumentDetailClient, DocumentListClient, SearchFilter};
use std::sync::Arc;

pub async fn run(state: &AppState, args: &RunArgs, output: Output) -> anyhow::Result<()> {
    let filter = SearchFilter::from_json(&args.filter).context("--filter must be a JSON object")?;
    let list = Arc::new(DocumentListClient::new(state.session.clone(), filter));
    let detail = Arc::new(DocumentDetailClient::new(state.session.clone()));

    let ledger_path = state.config.ledger_path()?;
    let ledger = tokio::task::spawn_blocking(move || Ledger::open(ledger_path)).await?;
    tracing::info!(
        "Ledger {} holds {} processed documents",
        ledger.path().display(),
        ledger.len()
    );

    let report = state
        .orchestrator
        .run_documents(
            list,
            detail,
            Arc::new(ledger),
            output.listener(),
            super::cancel_on_ctrl_c(),
        )
        .await?;

    super::finish(report, output)
}
