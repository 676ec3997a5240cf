//! Terminal progress display.

use indicatif::{ProgressBar, ProgressStyle};
use markpull_acquire::{ProgressListener, ProgressSnapshot};
use std::time::Duration;

/// Spinner fed by the engine's progress snapshots.
pub struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    /// Start a spinner on stderr.
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_message("Connecting to registry...");
        Self { bar }
    }
}

impl ProgressListener for Spinner {
    fn on_progress(&self, snapshot: ProgressSnapshot) {
        let msg = message(&snapshot);
        if snapshot.done {
            self.bar.finish_with_message(msg);
        } else {
            self.bar.set_message(msg);
        }
    }
}

fn message(snapshot: &ProgressSnapshot) -> String {
    let mut msg = format!(
        "Records: {} | Products: {} | Pages: {}",
        snapshot.records_so_far, snapshot.distinct_keys, snapshot.pages_so_far
    );
    if snapshot.units_scanned > 0 {
        msg.push_str(&format!(" | Documents: {}", snapshot.units_scanned));
    }
    msg
}
