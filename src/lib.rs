//! Labelprep: batch preparation of detection datasets.
//!
//! Labelprep reconciles the category and class IDs of many independently
//! exported datasets against one canonical schema, and carries the plumbing
//! jobs around that: train/val splitting, archive extraction and image
//! download.
//!
//! # Modules
//!
//! - [`schema`]: Canonical categories/classes, remap tables and policies
//! - [`reconcile`]: COCO and YOLO reconcilers and their reports
//! - [`layout`]: Which files under a dataset tree each job touches
//! - [`split`], [`archive`], [`download`]: Dataset plumbing jobs
//! - [`textio`]: Label text reading with a Latin-1 fallback
//! - [`error`]: Error types for labelprep operations

pub mod archive;
pub mod download;
pub mod error;
pub mod layout;
pub mod reconcile;
pub mod schema;
pub mod split;
pub mod textio;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub use error::PrepError;

use download::{DownloadOptions, HttpFetcher, RetryPolicy};
use reconcile::ReconcileOptions;
use schema::{CanonicalCategories, ClassMapping, DamageSet, UnmappedPolicy};

/// The labelprep CLI application.
#[derive(Parser)]
#[command(name = "labelprep")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Log debug details to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Remap COCO category IDs in every annotations.json to a canonical list.
    CocoNormalize(CocoNormalizeArgs),
    /// Remap YOLO class IDs in every data.yaml and its label files.
    YoloNormalize(YoloNormalizeArgs),
    /// Move listed images and their labels from train to val.
    Split(SplitArgs),
    /// Extract every .zip archive under a directory next to itself.
    Unzip(UnzipArgs),
    /// Download images listed in images.json files and copy their labels.
    Download(DownloadArgs),
}

/// Report output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Flags shared by the reconcilers.
#[derive(clap::Args)]
struct ReconcileArgs {
    /// Root directory to search recursively.
    #[arg(long, env = "LABELPREP_ROOT")]
    root: PathBuf,

    /// Report what would change without writing any file.
    #[arg(long)]
    dry_run: bool,

    /// Only process datasets whose path contains this substring.
    #[arg(long)]
    dataset: Option<String>,

    /// What to do with references to names missing from the canonical schema.
    #[arg(long, value_enum, default_value_t = UnmappedPolicy::Keep)]
    unmapped: UnmappedPolicy,

    /// Output format for the report.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

impl ReconcileArgs {
    fn options(&self) -> ReconcileOptions {
        ReconcileOptions {
            dry_run: self.dry_run,
            unmapped: self.unmapped,
            dataset_filter: self.dataset.clone(),
        }
    }
}

/// Arguments for the coco-normalize subcommand.
#[derive(clap::Args)]
struct CocoNormalizeArgs {
    /// Canonical category list (JSON array of {id, name, ...}).
    #[arg(long, env = "LABELPREP_CATEGORIES")]
    categories: PathBuf,

    #[command(flatten)]
    common: ReconcileArgs,
}

/// Arguments for the yolo-normalize subcommand.
#[derive(clap::Args)]
struct YoloNormalizeArgs {
    /// Reference data.yaml holding the canonical `names` mapping.
    #[arg(long, env = "LABELPREP_REFERENCE_YAML")]
    reference: PathBuf,

    /// Damage class to remove (repeatable). Replaces the built-in set.
    #[arg(long = "damage-class", value_name = "NAME")]
    damage_classes: Vec<String>,

    /// Remove no damage classes at all.
    #[arg(long, conflicts_with = "damage_classes")]
    no_damage_filter: bool,

    #[command(flatten)]
    common: ReconcileArgs,
}

impl YoloNormalizeArgs {
    fn damage_set(&self) -> DamageSet {
        if self.no_damage_filter {
            DamageSet::empty()
        } else if self.damage_classes.is_empty() {
            DamageSet::default()
        } else {
            DamageSet::from_names(&self.damage_classes)
        }
    }
}

/// Arguments for the split subcommand.
#[derive(clap::Args)]
struct SplitArgs {
    /// Text file listing validation image names, one per line.
    #[arg(long)]
    val_list: PathBuf,

    /// Dataset directory containing images/train and labels/train.
    #[arg(long)]
    data_dir: PathBuf,

    /// Report what would move without moving anything.
    #[arg(long)]
    dry_run: bool,

    /// Output format for the report.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

/// Arguments for the unzip subcommand.
#[derive(clap::Args)]
struct UnzipArgs {
    /// Directory to search for .zip files.
    #[arg(long, env = "LABELPREP_ROOT")]
    root: PathBuf,

    /// Report what would be extracted without extracting.
    #[arg(long)]
    dry_run: bool,

    /// Output format for the report.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

/// Arguments for the download subcommand.
#[derive(clap::Args)]
struct DownloadArgs {
    /// Directory containing the raw datasets (searched for images.json).
    #[arg(long, env = "LABELPREP_ROOT")]
    raw_dir: PathBuf,

    /// Output directory; images and labels go under images/train and labels/train.
    #[arg(long)]
    output_dir: PathBuf,

    /// Number of parallel download workers.
    #[arg(long, default_value_t = 50)]
    max_workers: usize,

    /// Only process datasets whose path contains this substring.
    #[arg(long)]
    dataset_filter: Option<String>,

    /// Attempts per image before giving up.
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Timeout in seconds for connecting and receiving response headers.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Output format for the report.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

/// Run the labelprep CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), PrepError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Some(Commands::CocoNormalize(args)) => run_coco_normalize(args),
        Some(Commands::YoloNormalize(args)) => run_yolo_normalize(args),
        Some(Commands::Split(args)) => run_split(args),
        Some(Commands::Unzip(args)) => run_unzip(args),
        Some(Commands::Download(args)) => run_download(args),
        None => {
            println!("labelprep {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Batch preparation of detection datasets.");
            println!();
            println!("Run 'labelprep --help' for usage information.");
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    // RUST_LOG, when set, wins over --verbose.
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        let _ = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .try_init();
        return;
    }

    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let _ = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

fn emit<R: Serialize + fmt::Display>(report: &R, format: OutputFormat) -> Result<(), PrepError> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(report).map_err(PrepError::ReportRender)?;
            println!("{json}");
        }
        OutputFormat::Text => print!("{report}"),
    }
    Ok(())
}

fn run_coco_normalize(args: CocoNormalizeArgs) -> Result<(), PrepError> {
    let canonical = CanonicalCategories::load(&args.categories)?;
    let report =
        reconcile::coco::run_coco_normalize(&args.common.root, &canonical, &args.common.options())?;
    emit(&report, args.common.output)
}

fn run_yolo_normalize(args: YoloNormalizeArgs) -> Result<(), PrepError> {
    let canonical = ClassMapping::load(&args.reference)?;
    let damage = args.damage_set();
    info!("{} damage classes will be removed", damage.len());

    let report = reconcile::yolo::run_yolo_normalize(
        &args.common.root,
        &canonical,
        &damage,
        &args.common.options(),
    )?;
    emit(&report, args.common.output)
}

fn run_split(args: SplitArgs) -> Result<(), PrepError> {
    let report = split::split_train_val(&args.val_list, &args.data_dir, args.dry_run)?;
    emit(&report, args.output)
}

fn run_unzip(args: UnzipArgs) -> Result<(), PrepError> {
    let report = archive::run_unzip(&args.root, args.dry_run)?;
    emit(&report, args.output)
}

fn run_download(args: DownloadArgs) -> Result<(), PrepError> {
    let opts = DownloadOptions {
        max_workers: args.max_workers,
        dataset_filter: args.dataset_filter,
        retry: RetryPolicy {
            max_attempts: args.retries,
            ..RetryPolicy::default()
        },
    };
    let fetcher = HttpFetcher::new(Duration::from_secs(args.timeout_secs));

    let report = download::run_download(&args.raw_dir, &args.output_dir, &opts, &fetcher)?;
    emit(&report, args.output)
}
