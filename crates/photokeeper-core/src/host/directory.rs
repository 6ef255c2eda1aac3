use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{Album, PhotoHost, RemotePhoto};
use crate::date;
use crate::{Error, Result};

/// Current manifest format version
const MANIFEST_VERSION: u32 = 1;

/// Manifest filename inside the library root
pub const MANIFEST_FILENAME: &str = "library.json";

const MEDIA_DIR: &str = "media";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AlbumEntry {
    id: String,
    title: String,
    photo_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PhotoEntry {
    title: String,
    taken_at: NaiveDateTime,
    /// File name under `media/`
    file: String,
    /// SHA-256 of the uploaded bytes
    checksum: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    next_seq: u64,
    albums: Vec<AlbumEntry>,
    photos: BTreeMap<String, PhotoEntry>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            next_seq: 1,
            albums: Vec::new(),
            photos: BTreeMap::new(),
        }
    }
}

/// A photo library kept in a plain directory: `library.json` plus
/// `media/<id>.<ext>`.
///
/// Like hosted services, it records the EXIF capture date on upload and
/// falls back to the upload time otherwise; it never looks at the file's
/// modification time.
pub struct DirectoryHost {
    root: PathBuf,
    manifest: Manifest,
}

impl DirectoryHost {
    /// Open the library at `root`. The directory must exist; a missing
    /// manifest means an empty library.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::TargetUnreachable(root));
        }

        let path = root.join(MANIFEST_FILENAME);
        let manifest = if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            let manifest: Manifest = serde_json::from_reader(reader)?;
            if manifest.version != MANIFEST_VERSION {
                return Err(Error::Host(format!(
                    "unsupported library version {} in {}",
                    manifest.version,
                    path.display()
                )));
            }
            manifest
        } else {
            Manifest::default()
        };

        Ok(Self { root, manifest })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write to temp file first, then rename for atomicity.
    fn save(&self) -> Result<()> {
        let path = self.root.join(MANIFEST_FILENAME);
        let temp_path = self.root.join(".library.tmp");
        {
            let writer = BufWriter::new(File::create(&temp_path)?);
            serde_json::to_writer_pretty(writer, &self.manifest)?;
        }
        fs::rename(&temp_path, &path)?;
        Ok(())
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.manifest.next_seq;
        self.manifest.next_seq += 1;
        seq
    }

    fn album_mut(&mut self, album_id: &str) -> Result<&mut AlbumEntry> {
        self.manifest
            .albums
            .iter_mut()
            .find(|a| a.id == album_id)
            .ok_or_else(|| Error::UnknownAlbum(album_id.to_string()))
    }

    fn photo(&self, photo_id: &str) -> Result<&PhotoEntry> {
        self.manifest
            .photos
            .get(photo_id)
            .ok_or_else(|| Error::Host(format!("unknown photo {}", photo_id)))
    }
}

impl PhotoHost for DirectoryHost {
    fn list_albums(&mut self) -> Result<Vec<Album>> {
        Ok(self
            .manifest
            .albums
            .iter()
            .map(|a| Album {
                id: a.id.clone(),
                title: a.title.clone(),
            })
            .collect())
    }

    fn list_photos_in_album(&mut self, album_id: &str) -> Result<Vec<RemotePhoto>> {
        let album = self
            .manifest
            .albums
            .iter()
            .find(|a| a.id == album_id)
            .ok_or_else(|| Error::UnknownAlbum(album_id.to_string()))?;

        album
            .photo_ids
            .iter()
            .map(|id| {
                let p = self.photo(id)?;
                Ok(RemotePhoto {
                    id: id.clone(),
                    title: p.title.clone(),
                    taken_at: p.taken_at,
                })
            })
            .collect()
    }

    fn upload_photo(&mut self, path: &Path) -> Result<String> {
        let bytes = fs::read(path)?;
        let checksum = hex::encode(Sha256::digest(&bytes));

        let seq = self.next_seq();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        hasher.update(seq.to_le_bytes());
        let id = hex::encode(hasher.finalize())[..16].to_string();

        let title = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| id.clone());
        let file = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}.{}", id, ext),
            None => id.clone(),
        };

        let media_dir = self.root.join(MEDIA_DIR);
        fs::create_dir_all(&media_dir)?;
        fs::write(media_dir.join(&file), &bytes)?;

        let taken_at = date::extract_tags(path)
            .and_then(|tags| tags.taken_date())
            .unwrap_or_else(|| {
                let now = Local::now().naive_local();
                now.with_nanosecond(0).unwrap_or(now)
            });

        debug!("Stored {} as {}", path.display(), id);
        self.manifest.photos.insert(
            id.clone(),
            PhotoEntry {
                title,
                taken_at,
                file,
                checksum,
            },
        );
        self.save()?;
        Ok(id)
    }

    fn create_album(&mut self, title: &str, seed_photo_id: &str) -> Result<Album> {
        self.photo(seed_photo_id)?;
        let id = format!("album-{}", self.next_seq());
        self.manifest.albums.push(AlbumEntry {
            id: id.clone(),
            title: title.to_string(),
            photo_ids: vec![seed_photo_id.to_string()],
        });
        self.save()?;
        Ok(Album {
            id,
            title: title.to_string(),
        })
    }

    fn add_photo_to_album(&mut self, photo_id: &str, album_id: &str) -> Result<()> {
        self.photo(photo_id)?;
        let album = self.album_mut(album_id)?;
        if !album.photo_ids.iter().any(|id| id == photo_id) {
            album.photo_ids.push(photo_id.to_string());
        }
        self.save()
    }

    fn set_taken_date(&mut self, photo_id: &str, taken_at: NaiveDateTime) -> Result<()> {
        let photo = self
            .manifest
            .photos
            .get_mut(photo_id)
            .ok_or_else(|| Error::Host(format!("unknown photo {}", photo_id)))?;
        photo.taken_at = taken_at;
        self.save()
    }

    fn download_photo(&mut self, photo_id: &str, dest: &Path) -> Result<()> {
        let src = self.root.join(MEDIA_DIR).join(&self.photo(photo_id)?.file);
        fs::copy(&src, dest)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_open_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DirectoryHost::open(dir.path().join("gone")),
            Err(Error::TargetUnreachable(_))
        ));
    }

    #[test]
    fn test_upload_album_roundtrip_persists() {
        let lib = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();
        let photo = src.path().join("a.jpg");
        fs::write(&photo, b"jpeg-ish").unwrap();

        let mut host = DirectoryHost::open(lib.path()).unwrap();
        let id = host.upload_photo(&photo).unwrap();
        let album = host.create_album("2020-01-01", &id).unwrap();
        let taken = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(7, 0, 0).unwrap();
        host.set_taken_date(&id, taken).unwrap();

        let mut reopened = DirectoryHost::open(lib.path()).unwrap();
        let albums = reopened.list_albums().unwrap();
        assert_eq!(albums, vec![album.clone()]);
        let photos = reopened.list_photos_in_album(&album.id).unwrap();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].title, "a.jpg");
        assert_eq!(photos[0].taken_at, taken);

        let out = src.path().join("copy.jpg");
        reopened.download_photo(&id, &out).unwrap();
        assert_eq!(fs::read(out).unwrap(), b"jpeg-ish");
    }

    #[test]
    fn test_same_content_gets_distinct_ids() {
        let lib = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();
        let photo = src.path().join("a.jpg");
        fs::write(&photo, b"same").unwrap();

        let mut host = DirectoryHost::open(lib.path()).unwrap();
        let first = host.upload_photo(&photo).unwrap();
        let second = host.upload_photo(&photo).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_unknown_album() {
        let lib = tempfile::tempdir().unwrap();
        let mut host = DirectoryHost::open(lib.path()).unwrap();
        assert!(matches!(
            host.list_photos_in_album("album-9"),
            Err(Error::UnknownAlbum(_))
        ));
    }
}
