pub mod exif;

use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDateTime, Timelike};
use tracing::debug;

pub use self::exif::{extract_tags, TagMap};

/// Format used for date buckets (directory names and album titles).
pub const BUCKET_FORMAT: &str = "%Y-%m-%d";

/// Result of timestamp resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub taken_at: NaiveDateTime,
    /// True when no embedded date was found and the modification time was used.
    pub metadata_missing: bool,
}

/// Resolve the taken date of `path`: the embedded tag date if one parses,
/// else the file's modification time. Returns `None` only when the
/// modification time itself cannot be read.
pub fn resolve(path: &Path, tags: Option<&TagMap>) -> Option<Resolved> {
    if let Some(taken_at) = tags.and_then(TagMap::taken_date) {
        return Some(Resolved {
            taken_at: truncate_to_second(taken_at),
            metadata_missing: false,
        });
    }

    let modified = match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(t) => t,
        Err(e) => {
            debug!("No modification time for {}: {}", path.display(), e);
            return None;
        }
    };
    debug!("No embedded date in {}, using modification time", path.display());
    Some(resolve_with_mtime(tags, modified))
}

/// Same as [`resolve`] with the modification time supplied by the caller.
pub fn resolve_with_mtime(tags: Option<&TagMap>, modified: SystemTime) -> Resolved {
    match tags.and_then(TagMap::taken_date) {
        Some(taken_at) => Resolved {
            taken_at: truncate_to_second(taken_at),
            metadata_missing: false,
        },
        None => Resolved {
            taken_at: truncate_to_second(DateTime::<Local>::from(modified).naive_local()),
            metadata_missing: true,
        },
    }
}

/// The one formatting rule for date buckets.
pub fn date_bucket(taken_at: &NaiveDateTime) -> String {
    taken_at.format(BUCKET_FORMAT).to_string()
}

fn truncate_to_second(dt: NaiveDateTime) -> NaiveDateTime {
    dt.with_nanosecond(0).unwrap_or(dt)
}
