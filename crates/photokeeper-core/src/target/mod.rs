pub mod local;
pub mod remote;

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, DuplicateMarker};
use crate::media::Backend;
use crate::Result;

pub use local::LocalTarget;
pub use remote::RemoteTarget;

/// Counts reported by a target after its passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSummary {
    /// Records flagged by the duplicate pass
    pub duplicates: u64,
    /// Records skipped by the copy pass because they were flagged
    pub skipped: u64,
    pub transferred: u64,
    /// Records whose transfer failed and were left behind
    pub failed: u64,
}

/// A destination the catalog can be synced to.
///
/// The pipeline calls [`check_duplicates`](SyncTarget::check_duplicates)
/// (when deduping) to completion before
/// [`execute_copy`](SyncTarget::execute_copy).
pub trait SyncTarget {
    fn name(&self) -> &str;

    /// Which duplicate flag this target owns.
    fn backend(&self) -> Backend;

    /// Flag every record that already exists at this destination.
    /// Returns the number of flagged records.
    fn check_duplicates(&mut self, images: DuplicateMarker<'_>) -> Result<u64>;

    /// Transfer every record not flagged for this target's backend.
    fn execute_copy(&mut self, images: &Catalog) -> Result<TargetSummary>;
}
