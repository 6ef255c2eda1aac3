use std::collections::BTreeMap;

use crate::target::TargetSummary;

/// Sink for operator-facing output.
///
/// The CLI renders this with progress bars; tests and embedders use
/// [`SilentReporter`]. All methods default to no-ops.
pub trait Reporter: Send + Sync {
    fn on_examine_start(&self, _total_files: u64) {}
    fn on_file_examined(&self, _current: u64) {}
    fn on_examine_complete(&self, _buckets: &BTreeMap<String, usize>, _total: usize) {}
    fn on_stage_start(&self, _stage: &str, _total: u64) {}
    fn on_duplicates_found(&self, _target: &str, _duplicates: usize, _total: usize) {}
    fn on_target_complete(&self, _target: &str, _summary: &TargetSummary) {}
    fn on_target_failed(&self, _target: &str, _error: &str) {}
}

/// No-op reporter for silent operation.
pub struct SilentReporter;

impl Reporter for SilentReporter {}
