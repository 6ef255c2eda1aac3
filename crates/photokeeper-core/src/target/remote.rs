use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, DuplicateMarker};
use crate::host::{Album, PhotoHost, RemotePhoto};
use crate::media::{Backend, ImageRecord};
use crate::target::{SyncTarget, TargetSummary};
use crate::Result;

/// Photo listing of one album keyed by title, fetched at most once per run.
/// A title may map to several photos.
#[derive(Debug, Clone, Default)]
pub enum AlbumPhotos {
    #[default]
    Absent,
    Loaded(HashMap<String, Vec<RemotePhoto>>),
}

#[derive(Debug, Clone)]
struct AlbumState {
    album: Album,
    photos: AlbumPhotos,
}

/// Counts from [`RemoteTarget::mirror`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorSummary {
    pub downloaded: u64,
    pub cached: u64,
    pub deleted: u64,
    pub failed: u64,
}

/// Uploads images to a photo host, one album per date bucket.
///
/// A photo counts as already uploaded when the bucket's album holds a photo
/// with the same title and exactly the same taken date. Albums sharing a
/// title are treated as one; the first listed wins.
pub struct RemoteTarget<H> {
    host: H,
    albums: HashMap<String, AlbumState>,
    /// Cache mirror refreshed after the copy pass, and whether to clean it
    mirror_dir: Option<(PathBuf, bool)>,
}

impl<H: PhotoHost> RemoteTarget<H> {
    /// Load the album directory. Fails if the host cannot list albums.
    pub fn connect(mut host: H) -> Result<Self> {
        info!("Getting albums from remote host");
        let mut albums = HashMap::new();
        for album in host.list_albums()? {
            if albums.contains_key(&album.title) {
                debug!("Ignoring second album titled {}", album.title);
                continue;
            }
            albums.insert(
                album.title.clone(),
                AlbumState {
                    album,
                    photos: AlbumPhotos::Absent,
                },
            );
        }
        Ok(Self {
            host,
            albums,
            mirror_dir: None,
        })
    }

    /// Refresh a local cache mirror at the end of every copy pass.
    pub fn with_mirror(mut self, dir: impl Into<PathBuf>, clean_up: bool) -> Self {
        self.mirror_dir = Some((dir.into(), clean_up));
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    pub fn album_titles(&self) -> impl Iterator<Item = &str> {
        self.albums.keys().map(String::as_str)
    }

    /// Photos of the album titled `title`, listing them on first access.
    fn photos_in_album(
        &mut self,
        title: &str,
    ) -> Result<Option<&HashMap<String, Vec<RemotePhoto>>>> {
        let Some(state) = self.albums.get_mut(title) else {
            return Ok(None);
        };
        if let AlbumPhotos::Absent = state.photos {
            let listing = self.host.list_photos_in_album(&state.album.id)?;
            let mut photos: HashMap<String, Vec<RemotePhoto>> = HashMap::new();
            for p in listing {
                photos.entry(p.title.clone()).or_default().push(p);
            }
            state.photos = AlbumPhotos::Loaded(photos);
        }
        match &state.photos {
            AlbumPhotos::Loaded(photos) => Ok(Some(photos)),
            AlbumPhotos::Absent => Ok(None),
        }
    }

    fn is_duplicate(&mut self, img: &ImageRecord) -> bool {
        match self.photos_in_album(img.date_bucket()) {
            Ok(Some(photos)) => photos
                .get(img.title().as_ref())
                .map_or(false, |same| same.iter().any(|p| p.taken_at == img.taken_at())),
            Ok(None) => false,
            Err(e) => {
                warn!("Cannot list album {}: {}", img.date_bucket(), e);
                false
            }
        }
    }

    fn upload_one(&mut self, img: &ImageRecord) -> Result<()> {
        let bucket = img.date_bucket();
        let photo_id = match self.albums.get(bucket) {
            None => {
                info!("Creating new album {}", bucket);
                let photo_id = self.host.upload_photo(&img.source_path())?;
                let album = self.host.create_album(bucket, &photo_id)?;
                self.albums.insert(
                    album.title.clone(),
                    AlbumState {
                        album,
                        photos: AlbumPhotos::Loaded(HashMap::new()),
                    },
                );
                photo_id
            }
            Some(state) => {
                let album_id = state.album.id.clone();
                let photo_id = self.host.upload_photo(&img.source_path())?;
                self.host.add_photo_to_album(&photo_id, &album_id)?;
                photo_id
            }
        };
        let title = img.title().into_owned();
        info!("Adding {} to {}", title, bucket);

        if needs_explicit_date(img) {
            debug!("Setting taken date of {} to {}", title, img.taken_at());
            if let Err(e) = self.host.set_taken_date(&photo_id, img.taken_at()) {
                warn!("Cannot set taken date on {}: {}", title, e);
            }
        }

        if let Some(AlbumState {
            photos: AlbumPhotos::Loaded(photos),
            ..
        }) = self.albums.get_mut(bucket)
        {
            photos.entry(title.clone()).or_default().push(RemotePhoto {
                id: photo_id,
                title,
                taken_at: img.taken_at(),
            });
        }
        Ok(())
    }

    /// Download every photo of every known album into `dir/<id>.<ext>`,
    /// keeping files already present. With `clean_up`, regular files in
    /// `dir` that match no remote photo are deleted.
    pub fn mirror(&mut self, dir: &Path, clean_up: bool) -> Result<MirrorSummary> {
        fs::create_dir_all(dir)?;
        let mut summary = MirrorSummary::default();

        let titles: Vec<String> = self.albums.keys().cloned().collect();
        let mut remote: Vec<RemotePhoto> = Vec::new();
        for title in &titles {
            match self.photos_in_album(title) {
                Ok(Some(photos)) => remote.extend(photos.values().flatten().cloned()),
                Ok(None) => {}
                Err(e) => {
                    warn!("Cannot list album {}: {}", title, e);
                    summary.failed += 1;
                }
            }
        }

        let mut keep: HashSet<String> = HashSet::with_capacity(remote.len());
        let total = remote.len();
        for (i, photo) in remote.iter().enumerate() {
            let file_name = mirror_file_name(photo);
            let dest = dir.join(&file_name);
            keep.insert(file_name);
            if dest.is_file() {
                summary.cached += 1;
                continue;
            }
            debug!("[{}/{}] Downloading {}", i + 1, total, photo.id);
            match self.host.download_photo(&photo.id, &dest) {
                Ok(()) => summary.downloaded += 1,
                Err(e) => {
                    warn!("Cannot download {}: {}", photo.id, e);
                    summary.failed += 1;
                }
            }
        }

        if clean_up {
            // Clean-up needs a complete listing.
            if summary.failed > 0 {
                warn!("Skipping mirror clean-up after errors");
            } else {
                for entry in fs::read_dir(dir)?.flatten() {
                    let path = entry.path();
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if path.is_file() && !keep.contains(&name) {
                        info!("Mirror sync: deleting file {}", name);
                        match fs::remove_file(&path) {
                            Ok(()) => summary.deleted += 1,
                            Err(e) => warn!("Cannot delete {}: {}", path.display(), e),
                        }
                    }
                }
            }
        }

        Ok(summary)
    }
}

impl<H: PhotoHost> SyncTarget for RemoteTarget<H> {
    fn name(&self) -> &str {
        "remote"
    }

    fn backend(&self) -> Backend {
        Backend::Remote
    }

    fn check_duplicates(&mut self, mut images: DuplicateMarker<'_>) -> Result<u64> {
        info!("Checking for duplicates on remote host");
        let total = images.len();
        let found = images.mark_where(|img| self.is_duplicate(img));
        info!("Found {} duplicates out of {} images", found, total);
        Ok(found as u64)
    }

    fn execute_copy(&mut self, images: &Catalog) -> Result<TargetSummary> {
        let mut summary = TargetSummary::default();
        for img in images {
            if img.is_duplicate(Backend::Remote) {
                summary.skipped += 1;
                continue;
            }
            match self.upload_one(img) {
                Ok(()) => summary.transferred += 1,
                Err(e) => {
                    warn!("Failed to upload {}: {}", img.source_path().display(), e);
                    summary.failed += 1;
                }
            }
        }
        info!("Skipped {} duplicate files", summary.skipped);
        info!("Uploaded {} files", summary.transferred);

        if let Some((dir, clean_up)) = self.mirror_dir.clone() {
            match self.mirror(&dir, clean_up) {
                Ok(m) => info!(
                    "Mirror {}: {} downloaded, {} cached, {} deleted, {} failed",
                    dir.display(),
                    m.downloaded,
                    m.cached,
                    m.deleted,
                    m.failed
                ),
                Err(e) => warn!("Cannot refresh mirror {}: {}", dir.display(), e),
            }
        }
        Ok(summary)
    }
}

/// Hosts take the capture date from embedded metadata only, so videos and
/// files dated by modification time must be told explicitly.
fn needs_explicit_date(img: &ImageRecord) -> bool {
    img.is_video() || img.metadata_missing()
}

fn mirror_file_name(photo: &RemotePhoto) -> String {
    match Path::new(&photo.title).extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}.{}", photo.id, ext.to_lowercase()),
        None => photo.id.clone(),
    }
}
