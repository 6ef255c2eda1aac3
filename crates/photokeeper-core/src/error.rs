use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Library manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("No source directory given")]
    MissingSource,

    #[error("Source directory does not exist: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("Destination directory is unreachable: {}", .0.display())]
    TargetUnreachable(PathBuf),

    #[error("Target and source directories cannot be the same: {}", .0.display())]
    SameSourceAndTarget(PathBuf),

    #[error("The file step needs a target directory")]
    MissingTarget,

    #[error("The remote step needs a library directory")]
    MissingLibrary,

    #[error("Remote host error: {0}")]
    Host(String),

    #[error("Unknown album: {0}")]
    UnknownAlbum(String),
}

pub type Result<T> = std::result::Result<T, Error>;
