//! `markpull codes`

use super::Output;
use crate::state::AppState;
use crate::RunArgs;
use anyhow::Context;
use markpull_acquire::Flow;
use markpull_registry::{CodeSearchClient, SearchFilter};
use std::sync::Arc;

pub async fn run(state: &AppState, args: &RunArgs, output: Output) -> anyhow::Result<()> {
    let filter = SearchFilter::from_json(&args.filter).context("--filter must be a JSON object")?;
    let client = Arc::new(CodeSearchClient::new(state.session.clone(), filter));

    let report = state
        .orchestrator
        .run_paged(Flow::Codes, client, output.listener(), super::cancel_on_ctrl_c())
        .await?;

    super::finish(report, output)
}
