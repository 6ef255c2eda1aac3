pub mod catalog;
pub mod config;
pub mod date;
pub mod error;
pub mod host;
pub mod media;
pub mod report;
pub mod target;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use catalog::Catalog;
pub use config::{PartialOptions, RunOptions, Step};
pub use error::{Error, Result};
pub use media::{Backend, ImageRecord};
pub use report::{Reporter, SilentReporter};
pub use target::{LocalTarget, RemoteTarget, SyncTarget, TargetSummary};

/// What the examine step found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamineSummary {
    pub total: u64,
    /// Image count per date bucket
    pub buckets: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetOutcome {
    Completed(TargetSummary),
    /// The target could not start or aborted; carries the cause
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetReport {
    pub name: String,
    pub outcome: TargetOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub examined: ExamineSummary,
    pub targets: Vec<TargetReport>,
}

impl RunSummary {
    /// True when every requested target completed.
    pub fn succeeded(&self) -> bool {
        self.targets
            .iter()
            .all(|t| matches!(t.outcome, TargetOutcome::Completed(_)))
    }

    pub fn target(&self, name: &str) -> Option<&TargetSummary> {
        self.targets.iter().find(|t| t.name == name).and_then(|t| match &t.outcome {
            TargetOutcome::Completed(s) => Some(s),
            TargetOutcome::Failed(_) => None,
        })
    }
}

/// Deferred construction of a target. Opening may fail (unreachable
/// destination, album listing unavailable); that failure ends only this
/// target.
pub type OpenTarget<'a> = Box<dyn FnOnce() -> Result<Box<dyn SyncTarget + 'a>> + 'a>;

/// Targets requested by `options`, file before remote.
pub fn requested_targets(options: &RunOptions) -> Vec<(String, OpenTarget<'static>)> {
    let mut targets: Vec<(String, OpenTarget<'static>)> = Vec::new();

    if options.wants(Step::File) {
        let root = options.target.clone();
        targets.push((
            "file".to_string(),
            Box::new(move || {
                let root = root.ok_or(Error::MissingTarget)?;
                Ok(Box::new(LocalTarget::open(root)?) as Box<dyn SyncTarget>)
            }),
        ));
    }

    if options.wants(Step::Remote) {
        let library = options.library.clone();
        let mirror = options.mirror.clone();
        let clean_up = options.mirror_clean_up;
        targets.push((
            "remote".to_string(),
            Box::new(move || {
                let library = library.ok_or(Error::MissingLibrary)?;
                let host = host::DirectoryHost::open(library)?;
                let mut target = RemoteTarget::connect(host)?;
                if let Some(dir) = mirror {
                    target = target.with_mirror(dir, clean_up);
                }
                Ok(Box::new(target) as Box<dyn SyncTarget>)
            }),
        ));
    }

    targets
}

/// Validate `options`, examine the source tree, then sync every requested
/// target.
pub fn run(options: &RunOptions, reporter: &dyn Reporter) -> Result<RunSummary> {
    options.validate()?;
    run_with_targets(options, requested_targets(options), reporter)
}

/// Examine the source tree, then for each target in order: check
/// duplicates (if the dedupe step was requested) and copy.
///
/// `options` is not validated here.
pub fn run_with_targets<'a>(
    options: &RunOptions,
    targets: Vec<(String, OpenTarget<'a>)>,
    reporter: &dyn Reporter,
) -> Result<RunSummary> {
    let mut catalog = Catalog::build(&options.source, options.target.as_deref(), reporter)?;
    let examined = ExamineSummary {
        total: catalog.len() as u64,
        buckets: catalog.histogram(),
    };
    info!("Total images: {}", examined.total);

    let dedupe = options.wants(Step::Dedupe);
    let mut reports = Vec::with_capacity(targets.len());

    for (name, open) in targets {
        let result = open().and_then(|mut target| {
            sync_target(target.as_mut(), &mut catalog, dedupe, reporter)
        });
        let outcome = match result {
            Ok(summary) => {
                reporter.on_target_complete(&name, &summary);
                TargetOutcome::Completed(summary)
            }
            Err(e) => {
                warn!("Target {} failed: {}", name, e);
                reporter.on_target_failed(&name, &e.to_string());
                TargetOutcome::Failed(e.to_string())
            }
        };
        reports.push(TargetReport { name, outcome });
    }

    Ok(RunSummary {
        examined,
        targets: reports,
    })
}

fn sync_target(
    target: &mut dyn SyncTarget,
    catalog: &mut Catalog,
    dedupe: bool,
    reporter: &dyn Reporter,
) -> Result<TargetSummary> {
    let mut duplicates = 0;
    if dedupe {
        let backend = target.backend();
        reporter.on_stage_start(target.name(), catalog.len() as u64);
        duplicates = target.check_duplicates(catalog.marker(backend))?;
        reporter.on_duplicates_found(target.name(), duplicates as usize, catalog.len());
    }

    let mut summary = target.execute_copy(catalog)?;
    summary.duplicates = duplicates;
    Ok(summary)
}
