use std::collections::BTreeMap;
use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};
use photokeeper_core::{Reporter, TargetSummary};

/// Renders pipeline output on stderr with indicatif.
#[derive(Default)]
pub struct ConsoleReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn finish_bar(&self) {
        if let Ok(mut bar) = self.bar.lock() {
            if let Some(b) = bar.take() {
                b.finish_and_clear();
            }
        }
    }
}

impl Reporter for ConsoleReporter {
    fn on_examine_start(&self, total_files: u64) {
        eprintln!("Examining {} files", total_files);
        let bar = ProgressBar::new(total_files);
        bar.set_style(
            ProgressStyle::with_template("{bar:60} {pos}/{len} files [{elapsed_precise}]")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(bar);
        }
    }

    fn on_file_examined(&self, _current: u64) {
        if let Ok(bar) = self.bar.lock() {
            if let Some(b) = bar.as_ref() {
                b.inc(1);
            }
        }
    }

    fn on_examine_complete(&self, buckets: &BTreeMap<String, usize>, total: usize) {
        self.finish_bar();
        eprintln!("Found images from {} days", buckets.len());
        for (day, count) in buckets {
            eprintln!("    {}: {}", day, count);
        }
        eprintln!("Total images: {}", total);
    }

    fn on_stage_start(&self, stage: &str, total: u64) {
        eprintln!("[{}] Checking {} images for duplicates", stage, total);
    }

    fn on_duplicates_found(&self, target: &str, duplicates: usize, total: usize) {
        eprintln!("[{}] Found {} duplicates out of {} images", target, duplicates, total);
    }

    fn on_target_complete(&self, target: &str, summary: &TargetSummary) {
        eprintln!("[{}] Skipped {} duplicate files", target, summary.skipped);
        eprintln!("[{}] Transferred {} files", target, summary.transferred);
    }

    fn on_target_failed(&self, target: &str, error: &str) {
        eprintln!("[{}] Aborted: {}", target, error);
    }
}
