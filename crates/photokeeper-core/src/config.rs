use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A step of the flow. Examining always happens; the others are opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    /// Examine EXIF tags
    Examine,
    /// Only select files not already present in the target
    Dedupe,
    /// Copy files into the target directory
    File,
    /// Upload to the remote library
    Remote,
    /// Every step above
    All,
}

/// Options as read from a config file or the command line; every field
/// may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialOptions {
    pub source: Option<PathBuf>,
    pub target: Option<PathBuf>,
    pub library: Option<PathBuf>,
    pub steps: Vec<Step>,
    pub mirror: Option<PathBuf>,
    pub mirror_clean_up: Option<bool>,
}

impl PartialOptions {
    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Values set in `over` win; its steps replace ours when non-empty.
    pub fn merge(self, over: PartialOptions) -> Self {
        Self {
            source: over.source.or(self.source),
            target: over.target.or(self.target),
            library: over.library.or(self.library),
            steps: if over.steps.is_empty() { self.steps } else { over.steps },
            mirror: over.mirror.or(self.mirror),
            mirror_clean_up: over.mirror_clean_up.or(self.mirror_clean_up),
        }
    }

    pub fn into_options(self) -> Result<RunOptions> {
        Ok(RunOptions {
            source: self.source.ok_or(Error::MissingSource)?,
            target: self.target,
            library: self.library,
            steps: self.steps,
            mirror: self.mirror,
            mirror_clean_up: self.mirror_clean_up.unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    pub source: PathBuf,
    /// Destination root for the file step
    #[serde(default)]
    pub target: Option<PathBuf>,
    /// Library root for the remote step
    #[serde(default)]
    pub library: Option<PathBuf>,
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Local cache mirror refreshed after the remote step
    #[serde(default)]
    pub mirror: Option<PathBuf>,
    #[serde(default)]
    pub mirror_clean_up: bool,
}

impl RunOptions {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: None,
            library: None,
            steps: Vec::new(),
            mirror: None,
            mirror_clean_up: false,
        }
    }

    pub fn with_target(mut self, target: impl Into<PathBuf>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_library(mut self, library: impl Into<PathBuf>) -> Self {
        self.library = Some(library.into());
        self
    }

    pub fn with_steps(mut self, steps: &[Step]) -> Self {
        self.steps = steps.to_vec();
        self
    }

    /// Whether `step` was requested, directly or through `all`.
    pub fn wants(&self, step: Step) -> bool {
        step == Step::Examine || self.steps.iter().any(|s| *s == step || *s == Step::All)
    }

    /// Check the options before anything touches the filesystem.
    pub fn validate(&self) -> Result<()> {
        if !self.source.is_dir() {
            return Err(Error::SourceMissing(self.source.clone()));
        }

        if let Some(target) = &self.target {
            if !target.is_dir() {
                return Err(Error::TargetUnreachable(target.clone()));
            }
            let src = self.source.canonicalize()?;
            if src == target.canonicalize()? {
                return Err(Error::SameSourceAndTarget(src));
            }
        }

        if self.wants(Step::File) && self.target.is_none() {
            return Err(Error::MissingTarget);
        }
        if self.wants(Step::Remote) && self.library.is_none() {
            return Err(Error::MissingLibrary);
        }
        Ok(())
    }
}
