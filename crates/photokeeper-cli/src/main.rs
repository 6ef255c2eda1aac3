mod progress;

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use photokeeper_core::{PartialOptions, Step, TargetOutcome};
use tracing::level_filters::LevelFilter;

use crate::progress::ConsoleReporter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StepArg {
    /// Examine EXIF tags
    Examine,
    /// Only select files not already present in the target
    Dedupe,
    /// Copy files into TARGET
    File,
    /// Upload to the remote library
    Remote,
    /// Run all steps in the flow
    All,
}

impl From<StepArg> for Step {
    fn from(s: StepArg) -> Self {
        match s {
            StepArg::Examine => Step::Examine,
            StepArg::Dedupe => Step::Dedupe,
            StepArg::File => Step::File,
            StepArg::Remote => Step::Remote,
            StepArg::All => Step::All,
        }
    }
}

#[derive(Parser)]
#[command(name = "photokeeper", version, about = "Sort photos into date folders and sync them to a file target or photo library")]
struct Cli {
    /// Source directory of photos
    source: Option<PathBuf>,

    /// Flow steps to run
    #[arg(value_enum)]
    steps: Vec<StepArg>,

    /// Where to copy the image files
    #[arg(short, long)]
    target: Option<PathBuf>,

    /// Remote library directory
    #[arg(short, long)]
    library: Option<PathBuf>,

    /// Local mirror of the remote library, refreshed after upload
    #[arg(long)]
    mirror: Option<PathBuf>,

    /// Delete mirror files no longer present in the library
    #[arg(long)]
    clean_up: bool,

    /// Load options from a TOML file
    #[arg(short, long, value_name = "FILE")]
    conf: Option<PathBuf>,

    /// Show more information
    #[arg(short, long)]
    verbose: bool,

    /// Show even more information
    #[arg(short, long)]
    debug: bool,
}

impl Cli {
    fn options(&self) -> PartialOptions {
        PartialOptions {
            source: self.source.clone(),
            target: self.target.clone(),
            library: self.library.clone(),
            steps: self.steps.iter().copied().map(Step::from).collect(),
            mirror: self.mirror.clone(),
            mirror_clean_up: self.clean_up.then_some(true),
        }
    }

    fn level(&self) -> LevelFilter {
        if self.debug {
            LevelFilter::DEBUG
        } else if self.verbose {
            LevelFilter::INFO
        } else {
            LevelFilter::WARN
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let t_total = std::time::Instant::now();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(cli.level())
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();

    let summary = tracing::subscriber::with_default(subscriber, || -> anyhow::Result<_> {
        let defaults = match &cli.conf {
            Some(path) => PartialOptions::from_file(path)?,
            None => PartialOptions::default(),
        };
        let options = defaults.merge(cli.options()).into_options()?;
        tracing::debug!("{:?}", options);

        let reporter = ConsoleReporter::new();
        Ok(photokeeper_core::run(&options, &reporter)?)
    })?;

    for t in &summary.targets {
        match &t.outcome {
            TargetOutcome::Completed(s) => eprintln!(
                "[{}] {} duplicates found, {} skipped, {} transferred, {} failed",
                t.name, s.duplicates, s.skipped, s.transferred, s.failed
            ),
            TargetOutcome::Failed(e) => eprintln!("[{}] failed: {}", t.name, e),
        }
    }
    eprintln!(
        "Done! {} images from {} days ({:.2}s)",
        summary.examined.total,
        summary.examined.buckets.len(),
        t_total.elapsed().as_secs_f64()
    );

    if !summary.succeeded() {
        std::process::exit(1);
    }
    Ok(())
}
