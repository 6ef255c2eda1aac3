use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::date;
use crate::media::{Backend, ImageRecord};
use crate::report::Reporter;
use crate::Result;

/// Ordered collection of every file found by one walk of the source tree.
///
/// Owned by the pipeline. Targets read it through [`Catalog::iter`] as many
/// times as they like and write only their own flag through
/// [`DuplicateMarker`].
#[derive(Debug, Default)]
pub struct Catalog {
    images: Vec<ImageRecord>,
}

impl Catalog {
    pub fn from_records(images: Vec<ImageRecord>) -> Self {
        Self { images }
    }

    /// Walk `source` and resolve the taken date of every non-hidden file.
    pub fn build(source: &Path, target: Option<&Path>, reporter: &dyn Reporter) -> Result<Self> {
        let files = collect_files(source, target)?;
        let total = files.len() as u64;
        info!("Examining {} files in {}", total, source.display());
        reporter.on_examine_start(total);

        let counter = AtomicU64::new(0);
        let resolved: Vec<Option<ImageRecord>> = files
            .par_iter()
            .map(|path| {
                let record = examine_file(path, target);
                let current = counter.fetch_add(1, Ordering::Relaxed);
                reporter.on_file_examined(current);
                record
            })
            .collect();

        let catalog = Self {
            images: resolved.into_iter().flatten().collect(),
        };
        let buckets = catalog.histogram();
        info!("Found images from {} days", buckets.len());
        reporter.on_examine_complete(&buckets, catalog.len());
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Records in walk order. Each call is an independent traversal.
    pub fn iter(&self) -> std::slice::Iter<'_, ImageRecord> {
        self.images.iter()
    }

    /// Count of images per date bucket.
    pub fn histogram(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for img in &self.images {
            *counts.entry(img.date_bucket().to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn duplicate_count(&self, backend: Backend) -> usize {
        self.images.iter().filter(|i| i.is_duplicate(backend)).count()
    }

    /// Write access limited to the duplicate flag of one backend.
    pub fn marker(&mut self, backend: Backend) -> DuplicateMarker<'_> {
        DuplicateMarker { catalog: self, backend }
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a ImageRecord;
    type IntoIter = std::slice::Iter<'a, ImageRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Borrowed view handed to a target's duplicate pass.
pub struct DuplicateMarker<'a> {
    catalog: &'a mut Catalog,
    backend: Backend,
}

impl DuplicateMarker<'_> {
    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    /// Visit every record in order and flag those for which `is_duplicate`
    /// returns true. Returns the number of flagged records.
    pub fn mark_where<F>(&mut self, mut is_duplicate: F) -> usize
    where
        F: FnMut(&ImageRecord) -> bool,
    {
        let backend = self.backend;
        let mut marked = 0;
        for img in self.catalog.images.iter_mut() {
            if is_duplicate(img) {
                img.mark_duplicate(backend);
                marked += 1;
            }
        }
        marked
    }
}

/// Regular, non-hidden files under `source`, sorted by name within each
/// directory. The target tree is pruned when it is nested in the source.
fn collect_files(source: &Path, target: Option<&Path>) -> Result<Vec<PathBuf>> {
    let target = target.and_then(|t| t.canonicalize().ok());
    let mut files = Vec::new();

    let walker = WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| match &target {
            Some(t) if e.file_type().is_dir() => {
                e.path().canonicalize().map_or(true, |p| &p != t)
            }
            _ => true,
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                if e.depth() == 0 {
                    return Err(e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("walk failed"))
                        .into());
                }
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            // Only links to regular files; directory links are not descended.
            if !entry.path().is_file() {
                debug!("Skipping symlink {}", entry.path().display());
                continue;
            }
        } else if !file_type.is_file() {
            continue;
        }
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden {
            continue;
        }
        files.push(entry.into_path());
    }

    Ok(files)
}

fn examine_file(path: &Path, target: Option<&Path>) -> Option<ImageRecord> {
    let tags = date::extract_tags(path);
    if tags.is_none() {
        debug!("IGNORED: {} has no readable EXIF", path.display());
    }

    let Some(resolved) = date::resolve(path, tags.as_ref()) else {
        warn!("Skipping {}: cannot read modification time", path.display());
        return None;
    };

    let source_dir = path.parent()?.to_path_buf();
    let file_name = path.file_name()?.to_os_string();
    debug!(
        "{} taken {} ({})",
        path.display(),
        resolved.taken_at,
        if resolved.metadata_missing { "mtime" } else { "exif" }
    );
    Some(ImageRecord::new(
        source_dir,
        file_name,
        target.map(Path::to_path_buf),
        resolved,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::SilentReporter;
    use std::fs;

    #[test]
    fn test_walk_skips_hidden_and_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("b_dir")).unwrap();
        fs::write(root.join("c.jpg"), b"c").unwrap();
        fs::write(root.join("a.jpg"), b"a").unwrap();
        fs::write(root.join(".DS_Store"), b"x").unwrap();
        fs::write(root.join("b_dir/z.png"), b"z").unwrap();

        let catalog = Catalog::build(root, None, &SilentReporter).unwrap();
        let names: Vec<String> = catalog.iter().map(|i| i.title().into_owned()).collect();
        assert_eq!(names, vec!["a.jpg", "z.png", "c.jpg"]);
        assert!(catalog.iter().all(|i| i.metadata_missing()));
        assert!(catalog.iter().all(|i| i.target_base_dir().is_none()));
    }

    #[test]
    fn test_nested_target_is_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let out = root.join("sorted");
        fs::create_dir_all(out.join("2020-01-01")).unwrap();
        fs::write(out.join("2020-01-01/old.jpg"), b"old").unwrap();
        fs::write(root.join("new.jpg"), b"new").unwrap();

        let catalog = Catalog::build(root, Some(&out), &SilentReporter).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.iter().next().unwrap().file_name(), "new.jpg");
    }

    #[test]
    fn test_missing_source_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Catalog::build(&dir.path().join("nope"), None, &SilentReporter).is_err());
    }

    #[test]
    fn test_marker_sets_only_its_flag() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), b"a").unwrap();
        fs::write(dir.path().join("b.jpg"), b"bb").unwrap();
        let mut catalog = Catalog::build(dir.path(), None, &SilentReporter).unwrap();

        let marked = catalog.marker(Backend::Local).mark_where(|i| i.file_name() == "b.jpg");
        assert_eq!(marked, 1);
        assert_eq!(catalog.duplicate_count(Backend::Local), 1);
        assert_eq!(catalog.duplicate_count(Backend::Remote), 0);

        // A second traversal observes the same state.
        let flagged: Vec<String> = catalog
            .iter()
            .filter(|i| i.is_duplicate(Backend::Local))
            .map(|i| i.title().into_owned())
            .collect();
        assert_eq!(flagged, vec!["b.jpg"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_symlinks_are_followed() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("src");
        let elsewhere = dir.path().join("elsewhere");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(elsewhere.join("nested")).unwrap();
        fs::write(elsewhere.join("real.jpg"), b"r").unwrap();
        std::os::unix::fs::symlink(elsewhere.join("real.jpg"), root.join("link.jpg")).unwrap();
        std::os::unix::fs::symlink(elsewhere.join("nested"), root.join("dir_link")).unwrap();

        let catalog = Catalog::build(&root, None, &SilentReporter).unwrap();
        assert_eq!(catalog.len(), 1);
        let img = catalog.iter().next().unwrap();
        assert_eq!(img.file_name(), "link.jpg");
        assert_eq!(fs::read(img.source_path()).unwrap(), b"r");
    }
}
