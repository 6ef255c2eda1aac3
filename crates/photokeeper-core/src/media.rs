use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::date::{self, Resolved};

/// Which kind of destination a duplicate flag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Local,
    Remote,
}

/// One discovered source file and what the pipeline knows about it.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    source_dir: PathBuf,
    file_name: OsString,
    /// Destination root, `None` when no file target is configured
    target_base_dir: Option<PathBuf>,
    date_bucket: String,
    taken_at: NaiveDateTime,
    metadata_missing: bool,
    local_duplicate: bool,
    remote_duplicate: bool,
}

impl ImageRecord {
    pub fn new(
        source_dir: PathBuf,
        file_name: impl Into<OsString>,
        target_base_dir: Option<PathBuf>,
        resolved: Resolved,
    ) -> Self {
        Self {
            source_dir,
            file_name: file_name.into(),
            target_base_dir,
            date_bucket: date::date_bucket(&resolved.taken_at),
            taken_at: resolved.taken_at,
            metadata_missing: resolved.metadata_missing,
            local_duplicate: false,
            remote_duplicate: false,
        }
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn file_name(&self) -> &OsStr {
        &self.file_name
    }

    /// File name for photo hosts and logs. Lossy for non-UTF-8 names.
    pub fn title(&self) -> Cow<'_, str> {
        self.file_name.to_string_lossy()
    }

    pub fn source_path(&self) -> PathBuf {
        self.source_dir.join(&self.file_name)
    }

    pub fn target_base_dir(&self) -> Option<&Path> {
        self.target_base_dir.as_deref()
    }

    /// `<target_base_dir>/<date_bucket>/<file_name>`, if a target is configured.
    pub fn target_path(&self) -> Option<PathBuf> {
        self.target_base_dir.as_deref().map(|base| self.destination_in(base))
    }

    /// Where this record lands under an arbitrary destination root.
    pub fn destination_in(&self, root: &Path) -> PathBuf {
        root.join(&self.date_bucket).join(&self.file_name)
    }

    pub fn date_bucket(&self) -> &str {
        &self.date_bucket
    }

    pub fn taken_at(&self) -> NaiveDateTime {
        self.taken_at
    }

    pub fn metadata_missing(&self) -> bool {
        self.metadata_missing
    }

    pub fn is_video(&self) -> bool {
        mime_guess::from_path(&self.file_name)
            .first()
            .map_or(false, |mime| mime.type_() == mime_guess::mime::VIDEO)
    }

    pub fn is_duplicate(&self, backend: Backend) -> bool {
        match backend {
            Backend::Local => self.local_duplicate,
            Backend::Remote => self.remote_duplicate,
        }
    }

    pub(crate) fn mark_duplicate(&mut self, backend: Backend) {
        match backend {
            Backend::Local => self.local_duplicate = true,
            Backend::Remote => self.remote_duplicate = true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(name: &str) -> ImageRecord {
        let taken_at = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(9, 0, 0).unwrap();
        ImageRecord::new(
            PathBuf::from("/src/trip"),
            name.to_string(),
            Some(PathBuf::from("/dst")),
            Resolved { taken_at, metadata_missing: false },
        )
    }

    #[test]
    fn test_paths() {
        let r = record("a.jpg");
        assert_eq!(r.source_path(), PathBuf::from("/src/trip/a.jpg"));
        assert_eq!(r.target_path(), Some(PathBuf::from("/dst/2020-01-01/a.jpg")));
        assert_eq!(r.date_bucket(), "2020-01-01");
    }

    #[test]
    fn test_flags_are_independent() {
        let mut r = record("a.jpg");
        r.mark_duplicate(Backend::Remote);
        assert!(r.is_duplicate(Backend::Remote));
        assert!(!r.is_duplicate(Backend::Local));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_name_keeps_exact_path() {
        use std::os::unix::ffi::OsStrExt;

        let name = OsStr::from_bytes(b"caf\xe9.jpg");
        let taken_at = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(9, 0, 0).unwrap();
        let r = ImageRecord::new(
            PathBuf::from("/src"),
            name,
            None,
            Resolved { taken_at, metadata_missing: false },
        );
        assert_eq!(r.source_path(), Path::new("/src").join(name));
        assert_eq!(r.title(), "caf\u{fffd}.jpg");
    }

    #[test]
    fn test_video_detection() {
        assert!(record("clip.mp4").is_video());
        assert!(record("clip.MOV").is_video());
        assert!(!record("a.jpg").is_video());
    }
}
