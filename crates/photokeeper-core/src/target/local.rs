use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, DuplicateMarker};
use crate::media::{Backend, ImageRecord};
use crate::target::{SyncTarget, TargetSummary};
use crate::{Error, Result};

/// Copies images into `<root>/<YYYY-MM-DD>/<name>` on a local or mounted
/// filesystem.
///
/// Duplicates are detected by size only: a same-named file of equal size
/// at the destination counts as already copied. Same-size files with
/// different content are therefore not told apart; full comparison is too
/// slow over network shares.
pub struct LocalTarget {
    root: PathBuf,
}

impl LocalTarget {
    /// Fails if `root` is not an existing directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::TargetUnreachable(root));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_duplicate(&self, img: &ImageRecord) -> bool {
        let dest = img.destination_in(&self.root);
        let Ok(dest_meta) = fs::metadata(&dest) else {
            return false;
        };
        match fs::metadata(img.source_path()) {
            Ok(src_meta) => src_meta.len() == dest_meta.len(),
            Err(e) => {
                warn!("Cannot stat {}: {}", img.source_path().display(), e);
                false
            }
        }
    }

    /// Pick a destination per record. Runs sequentially so that two records
    /// never resolve to the same suffixed name.
    fn assign_destinations<'a>(&self, images: &'a Catalog) -> (Vec<(&'a ImageRecord, PathBuf)>, u64, u64) {
        let mut used_paths: HashSet<PathBuf> = HashSet::new();
        let mut created_dirs: HashSet<PathBuf> = HashSet::new();
        let mut work = Vec::with_capacity(images.len());
        let mut skipped = 0u64;
        let mut failed = 0u64;

        for img in images {
            if img.is_duplicate(Backend::Local) {
                skipped += 1;
                continue;
            }

            let sub_dir = self.root.join(img.date_bucket());
            if !created_dirs.contains(&sub_dir) {
                if !sub_dir.is_dir() {
                    info!("Creating directory {}", sub_dir.display());
                }
                if let Err(e) = fs::create_dir_all(&sub_dir) {
                    warn!("Cannot create {}: {}", sub_dir.display(), e);
                    failed += 1;
                    continue;
                }
                created_dirs.insert(sub_dir.clone());
            }

            let dest = unique_destination(&sub_dir, img.file_name(), &used_paths);
            used_paths.insert(dest.clone());
            work.push((img, dest));
        }

        (work, skipped, failed)
    }
}

impl SyncTarget for LocalTarget {
    fn name(&self) -> &str {
        "file"
    }

    fn backend(&self) -> Backend {
        Backend::Local
    }

    fn check_duplicates(&mut self, mut images: DuplicateMarker<'_>) -> Result<u64> {
        info!("Checking for duplicates in {}", self.root.display());
        let total = images.len();
        let found = images.mark_where(|img| self.is_duplicate(img));
        info!("Found {} duplicates out of {} images", found, total);
        Ok(found as u64)
    }

    fn execute_copy(&mut self, images: &Catalog) -> Result<TargetSummary> {
        if !self.root.is_dir() {
            return Err(Error::TargetUnreachable(self.root.clone()));
        }
        info!("Copying and sorting files into {}", self.root.display());

        let (work, skipped, assign_failed) = self.assign_destinations(images);

        let copied = AtomicU64::new(0);
        let failed = AtomicU64::new(assign_failed);
        work.par_iter().for_each(|(img, dest)| match copy_one(img, dest) {
            Ok(()) => {
                copied.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!("{:#}", e);
                failed.fetch_add(1, Ordering::Relaxed);
            }
        });

        let summary = TargetSummary {
            duplicates: 0,
            skipped,
            transferred: copied.into_inner(),
            failed: failed.into_inner(),
        };
        info!("Skipped {} duplicate files", summary.skipped);
        info!("Copied {} files", summary.transferred);
        Ok(summary)
    }
}

fn copy_one(img: &ImageRecord, dest: &Path) -> anyhow::Result<()> {
    let src = img.source_path();
    debug!("Copying {} to {}", src.display(), dest.display());
    fs::copy(&src, dest)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dest.display()))?;

    if let Some(local) = img.taken_at().and_local_timezone(chrono::Local).single() {
        let ft = filetime::FileTime::from_unix_time(local.timestamp(), 0);
        if let Err(e) = filetime::set_file_mtime(dest, ft) {
            warn!("Cannot set modification time of {}: {}", dest.display(), e);
        }
    }
    Ok(())
}

/// `dir/name` if free, else `dir/<stem>_<n>.<ext>` with the lowest free `n`.
/// A path counts as taken if it exists on disk or is in `reserved`.
pub fn unique_destination(dir: &Path, file_name: &OsStr, reserved: &HashSet<PathBuf>) -> PathBuf {
    let taken = |p: &Path| reserved.contains(p) || p.exists();

    let base = dir.join(file_name);
    if !taken(&base) {
        return base;
    }

    let name = Path::new(file_name);
    let stem = name.file_stem().unwrap_or(file_name);
    let ext = name.extension().filter(|e| !e.is_empty());

    let mut suffix = 1u32;
    loop {
        let mut candidate = stem.to_os_string();
        candidate.push(format!("_{}", suffix));
        if let Some(ext) = ext {
            candidate.push(".");
            candidate.push(ext);
        }
        let candidate = dir.join(candidate);
        if !taken(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::Resolved;
    use chrono::NaiveDate;

    fn record(src_dir: &Path, name: &str, dest_root: &Path) -> ImageRecord {
        let taken_at = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(10, 0, 0).unwrap();
        ImageRecord::new(
            src_dir.to_path_buf(),
            name.to_string(),
            Some(dest_root.to_path_buf()),
            Resolved { taken_at, metadata_missing: false },
        )
    }

    #[test]
    fn test_unique_destination_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let d = dir.path();
        let none = HashSet::new();
        let name = OsStr::new("a.jpg");
        assert_eq!(unique_destination(d, name, &none), d.join("a.jpg"));

        fs::write(d.join("a.jpg"), b"1").unwrap();
        assert_eq!(unique_destination(d, name, &none), d.join("a_1.jpg"));

        fs::write(d.join("a_1.jpg"), b"2").unwrap();
        let reserved: HashSet<PathBuf> = [d.join("a_2.jpg")].into_iter().collect();
        assert_eq!(unique_destination(d, name, &reserved), d.join("a_3.jpg"));
    }

    #[test]
    fn test_unique_destination_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README"), b"x").unwrap();
        assert_eq!(
            unique_destination(dir.path(), OsStr::new("README"), &HashSet::new()),
            dir.path().join("README_1")
        );
    }

    #[test]
    fn test_open_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            LocalTarget::open(dir.path().join("missing")),
            Err(Error::TargetUnreachable(_))
        ));
        assert!(LocalTarget::open(dir.path()).is_ok());
    }

    #[test]
    fn test_size_decides_duplicate() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("same.jpg"), b"12345").unwrap();
        fs::write(src.path().join("diff.jpg"), b"12345").unwrap();
        fs::write(src.path().join("new.jpg"), b"12345").unwrap();
        let bucket = dst.path().join("2020-01-01");
        fs::create_dir_all(&bucket).unwrap();
        fs::write(bucket.join("same.jpg"), b"abcde").unwrap();
        fs::write(bucket.join("diff.jpg"), b"abc").unwrap();

        let mut catalog = Catalog::from_records(vec![
            record(src.path(), "same.jpg", dst.path()),
            record(src.path(), "diff.jpg", dst.path()),
            record(src.path(), "new.jpg", dst.path()),
        ]);
        let mut target = LocalTarget::open(dst.path()).unwrap();
        let found = target.check_duplicates(catalog.marker(Backend::Local)).unwrap();
        assert_eq!(found, 1);

        let flags: Vec<bool> = catalog.iter().map(|i| i.is_duplicate(Backend::Local)).collect();
        assert_eq!(flags, vec![true, false, false]);
    }

    #[test]
    fn test_copy_never_overwrites() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let other = src.path().join("other");
        fs::create_dir_all(&other).unwrap();
        fs::write(src.path().join("a.jpg"), b"first").unwrap();
        fs::write(other.join("a.jpg"), b"second!").unwrap();

        let catalog = Catalog::from_records(vec![
            record(src.path(), "a.jpg", dst.path()),
            record(&other, "a.jpg", dst.path()),
        ]);
        let mut target = LocalTarget::open(dst.path()).unwrap();
        let summary = target.execute_copy(&catalog).unwrap();
        assert_eq!(summary.transferred, 2);
        assert_eq!(summary.skipped, 0);

        let bucket = dst.path().join("2020-01-01");
        assert_eq!(fs::read(bucket.join("a.jpg")).unwrap(), b"first");
        assert_eq!(fs::read(bucket.join("a_1.jpg")).unwrap(), b"second!");
    }

    #[test]
    fn test_copy_skips_flagged_and_counts_failures() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("a.jpg"), b"aaaa").unwrap();
        fs::write(src.path().join("b.jpg"), b"bbbb").unwrap();

        let mut catalog = Catalog::from_records(vec![
            record(src.path(), "a.jpg", dst.path()),
            record(src.path(), "b.jpg", dst.path()),
            record(src.path(), "vanished.jpg", dst.path()),
        ]);
        catalog.marker(Backend::Local).mark_where(|i| i.file_name() == "a.jpg");

        let mut target = LocalTarget::open(dst.path()).unwrap();
        let summary = target.execute_copy(&catalog).unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.transferred, 1);
        assert_eq!(summary.failed, 1);
        assert!(!dst.path().join("2020-01-01/a.jpg").exists());
        assert!(dst.path().join("2020-01-01/b.jpg").exists());
    }

    #[test]
    fn test_copied_file_carries_taken_date() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("a.jpg"), b"aaaa").unwrap();
        let catalog = Catalog::from_records(vec![record(src.path(), "a.jpg", dst.path())]);

        LocalTarget::open(dst.path()).unwrap().execute_copy(&catalog).unwrap();

        let meta = fs::metadata(dst.path().join("2020-01-01/a.jpg")).unwrap();
        let mtime = filetime::FileTime::from_last_modification_time(&meta);
        let expected = catalog.iter().next().unwrap().taken_at()
            .and_local_timezone(chrono::Local).single().unwrap().timestamp();
        assert_eq!(mtime.unix_seconds(), expected);
    }
}
