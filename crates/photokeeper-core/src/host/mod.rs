//! Capabilities of a remote photo host, as seen by [`RemoteTarget`](crate::target::RemoteTarget).

pub mod directory;

use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::Result;

pub use directory::DirectoryHost;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub title: String,
}

/// What the host knows about one stored photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePhoto {
    pub id: String,
    pub title: String,
    pub taken_at: NaiveDateTime,
}

/// Operations a photo host must provide. Transport and authentication are
/// the implementor's business.
pub trait PhotoHost {
    fn list_albums(&mut self) -> Result<Vec<Album>>;

    fn list_photos_in_album(&mut self, album_id: &str) -> Result<Vec<RemotePhoto>>;

    /// Upload a file, returning the new photo id.
    fn upload_photo(&mut self, path: &Path) -> Result<String>;

    /// Create an album whose first (cover) photo is `seed_photo_id`.
    fn create_album(&mut self, title: &str, seed_photo_id: &str) -> Result<Album>;

    fn add_photo_to_album(&mut self, photo_id: &str, album_id: &str) -> Result<()>;

    fn set_taken_date(&mut self, photo_id: &str, taken_at: NaiveDateTime) -> Result<()>;

    /// Fetch the stored bytes of a photo into `dest`.
    fn download_photo(&mut self, photo_id: &str, dest: &Path) -> Result<()>;
}
