use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tilebundle_core::metadata::{decode_manifest, to_json};
use tilebundle_core::packer::strip::DEFAULT_STRIP_WIDTH;
use tilebundle_core::prelude::*;
use tracing::{error, info, warn};
use walkdir::WalkDir;

const DESCRIPTOR_SUFFIX: &str = ".bundle.json";

#[derive(Parser, Debug)]
#[command(
    name = "tilebundle",
    about = "Build trimmed tile set bundles",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Show progress bars (disable with --progress false or --quiet)
    #[arg(long, default_value_t = true, action=ArgAction::Set, global=true, help_heading = "Logging/UX")]
    progress: bool,
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action=ArgAction::Count, global=true, help_heading = "Logging/UX")]
    verbose: u8,
    /// Quiet mode (overrides verbose)
    #[arg(
        short,
        long,
        default_value_t = false,
        global = true,
        help_heading = "Logging/UX"
    )]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build one bundle per bundle description
    Build(BuildArgs),
    /// Print the manifest of a built bundle
    Inspect(InspectArgs),
}

#[derive(Parser, Debug, Clone)]
struct BuildArgs {
    // Input/Output
    /// Bundle description file, or a directory searched for *.bundle.json
    #[arg(help_heading = "Input/Output")]
    input: PathBuf,
    /// Output directory; each bundle is written to <out_dir>/<bundle name>
    #[arg(short, long, default_value = "out", help_heading = "Input/Output")]
    out_dir: PathBuf,
    /// Tile set id table (JSON); defaults to <out_dir>/tileset-ids.json
    #[arg(long, help_heading = "Input/Output")]
    ids: Option<PathBuf>,
    /// YAML config file path (overrides build options)
    #[arg(long, help_heading = "Input/Output")]
    config: Option<PathBuf>,
    /// Include patterns (glob). If set, only descriptions matching any pattern are built
    #[arg(long, help_heading = "Input/Output")]
    include: Vec<String>,
    /// Exclude patterns (glob). Descriptions matching any pattern are ignored
    #[arg(long, help_heading = "Input/Output")]
    exclude: Vec<String>,
    /// Directory image paths are resolved against (default: the description's directory)
    #[arg(long, help_heading = "Input/Output")]
    image_base: Option<PathBuf>,

    // Build
    /// Trim object tile sets to their opaque bounds
    #[arg(long, default_value_t = true, action=ArgAction::Set, help_heading = "Build")]
    trim: bool,
    /// Write images in the raw format when they convert losslessly
    #[arg(long, default_value_t = true, action=ArgAction::Set, help_heading = "Build")]
    raw_images: bool,
    /// Maximum strip width of the trimmed atlas packer
    #[arg(long, default_value_t = DEFAULT_STRIP_WIDTH, help_heading = "Build")]
    strip_width: u32,
    /// Metadata format: binary | json
    #[arg(long, default_value = "binary", value_parser = ["binary", "json"], help_heading = "Build")]
    metadata: String,
    /// Process tile sets in parallel (requires core feature `parallel`)
    #[arg(long, default_value_t = false, help_heading = "Build")]
    parallel: bool,

    // Export
    /// Print the merged configuration (after CLI/YAML) and exit
    #[arg(long, default_value_t = false, help_heading = "Export")]
    print_config: bool,
    /// Output format for --print-config: json|yaml
    #[arg(long, default_value = "json", value_parser = ["json", "yaml"], help_heading = "Export")]
    print_config_format: String,
    /// Dry run: build in memory and report, but write nothing
    #[arg(long, default_value_t = false, help_heading = "Export")]
    dry_run: bool,
}

#[derive(Parser, Debug, Clone)]
struct InspectArgs {
    /// Bundle directory
    bundle: PathBuf,
    /// Dump the manifest as JSON instead of a summary
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing_with_level(cli.quiet, cli.verbose);
    match &cli.command {
        Commands::Build(args) => run_build(args, cli.progress && !cli.quiet),
        Commands::Inspect(args) => run_inspect(args),
    }
}

/// Build options after merging flags and the YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BuildSettings {
    trim_images: bool,
    use_raw_images: bool,
    strip_width: u32,
    metadata_format: MetadataFormat,
    image_base: Option<PathBuf>,
    parallel: bool,
}

impl BuildSettings {
    fn from_args(args: &BuildArgs) -> anyhow::Result<Self> {
        Ok(Self {
            trim_images: args.trim,
            use_raw_images: args.raw_images,
            strip_width: args.strip_width,
            metadata_format: parse_metadata_format(&args.metadata)?,
            image_base: args.image_base.clone(),
            parallel: args.parallel,
        })
    }

    fn into_build_config(self) -> anyhow::Result<BuildConfig> {
        if self.strip_width == 0 {
            anyhow::bail!("strip_width must be > 0");
        }
        let mut b = BuildConfig::builder()
            .trim_images(self.trim_images)
            .use_raw_images(self.use_raw_images)
            .packer(StripPacker::new(self.strip_width))
            .metadata_format(self.metadata_format)
            .parallel(self.parallel);
        if let Some(base) = self.image_base {
            b = b.image_base(base);
        }
        Ok(b.build())
    }
}

fn run_build(args: &BuildArgs, show_progress: bool) -> anyhow::Result<()> {
    // Config file overrides flags field by field
    let settings = {
        let base = BuildSettings::from_args(args)?;
        if let Some(path) = &args.config {
            let file = fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            let y: YamlConfig = serde_yaml::from_str(&file)
                .with_context(|| format!("parse config {}", path.display()))?;
            y.apply(base)?
        } else {
            base
        }
    };

    if args.print_config {
        match args.print_config_format.as_str() {
            "yaml" => println!("{}", serde_yaml::to_string(&settings)?),
            _ => println!("{}", serde_json::to_string_pretty(&settings)?),
        }
        return Ok(());
    }

    let bundler = TileSetBundler::new(settings.into_build_config()?);
    let descriptors = gather_paths(&args.input, &args.include, &args.exclude)?;
    if descriptors.is_empty() {
        warn!(input = %args.input.display(), "no bundle descriptions found");
        return Ok(());
    }
    info!(count = descriptors.len(), "found bundle descriptions");

    let mut broker: Box<dyn TileSetIdBroker> = if args.dry_run {
        Box::new(MemoryIdBroker::new())
    } else {
        let ids = args
            .ids
            .clone()
            .unwrap_or_else(|| args.out_dir.join("tileset-ids.json"));
        Box::new(
            FileIdBroker::open(&ids)
                .with_context(|| format!("open id table {}", ids.display()))?,
        )
    };

    let bar = progress_bar(descriptors.len(), show_progress)?;
    let mut failed = 0usize;
    for desc in &descriptors {
        let name = bundle_name(desc);
        if let Some(b) = &bar {
            b.set_message(name.clone());
        }
        match build_one(&bundler, desc, &name, args, broker.as_mut()) {
            Ok(report) => log_report(&name, &report),
            Err(e) => {
                failed += 1;
                error!(bundle = %name, error = format!("{e:#}"), "bundle failed");
            }
        }
        if let Some(b) = &bar {
            b.inc(1);
        }
    }
    if let Some(b) = &bar {
        b.finish_and_clear();
    }

    if failed > 0 {
        anyhow::bail!("{} of {} bundles failed", failed, descriptors.len());
    }
    Ok(())
}

fn build_one(
    bundler: &TileSetBundler,
    desc: &Path,
    name: &str,
    args: &BuildArgs,
    broker: &mut dyn TileSetIdBroker,
) -> anyhow::Result<BuildReport> {
    let mut parsed =
        load_bundle(desc).with_context(|| format!("load bundle description {}", desc.display()))?;
    // a changed config makes every bundle stale
    if let Some(config) = &args.config {
        parsed
            .touch(config)
            .with_context(|| format!("stat config {}", config.display()))?;
    }
    let job = bundler.prepare(parsed, broker);

    let report = if args.dry_run {
        bundler.build(job, MemoryBundleWriter::new())?
    } else {
        let target = args.out_dir.join(name);
        let writer = DirBundleWriter::new(&target)
            .with_context(|| format!("create bundle dir {}", target.display()))?;
        bundler.build(job, writer)?
    };
    Ok(report)
}

fn log_report(name: &str, report: &BuildReport) {
    if report.up_to_date {
        info!(bundle = %name, "up to date");
        return;
    }
    for item in &report.items {
        if let Some(stats) = &item.stats {
            info!(
                bundle = %name,
                tile_set = item.name.as_deref().unwrap_or("<unnamed>"),
                saved = format!("{:.2}%", stats.saved_percentage()),
                occupancy = format!("{:.2}%", stats.occupancy() * 100.0),
                "trimmed"
            );
        }
    }
    info!(
        bundle = %name,
        trimmed = report.count(ItemStatus::Trimmed),
        reencoded = report.count(ItemStatus::Reencoded),
        copied = report.count(ItemStatus::RawCopied),
        up_to_date = report.count(ItemStatus::SkippedUpToDate),
        skipped = report.items.iter().filter(|i| i.status.is_excluded()).count(),
        metadata = report.metadata_written,
        time = fmt_dur(report.duration),
        "bundle built"
    );
}

fn run_inspect(args: &InspectArgs) -> anyhow::Result<()> {
    let (path, format) = [MetadataFormat::Binary, MetadataFormat::Json]
        .into_iter()
        .map(|f| (args.bundle.join(f.path()), f))
        .find(|(p, _)| p.is_file())
        .with_context(|| format!("no bundle metadata in {}", args.bundle.display()))?;
    let bytes = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
    let manifest = decode_manifest(&bytes, format)
        .with_context(|| format!("decode {}", path.display()))?;

    if args.json {
        println!("{}", String::from_utf8_lossy(&to_json(&manifest)?));
        return Ok(());
    }
    println!("{} tile sets in {}", manifest.len(), path.display());
    for (id, set) in manifest.iter() {
        let name = set.name().unwrap_or("<unnamed>");
        match set {
            BundleTileSet::Trimmed(ts) => {
                println!("{id:>6}  {name:<24} trimmed  {:>4} tiles  {}", ts.tile_count(), ts.image_path);
            }
            BundleTileSet::Source(ts) => {
                let kind = if ts.is_object() { "object" } else { "plain" };
                println!("{id:>6}  {name:<24} {kind:<8} {:>4} tiles  {}", ts.sprites().len(), ts.image_path);
            }
        }
    }
    Ok(())
}

fn progress_bar(len: usize, show: bool) -> anyhow::Result<Option<indicatif::ProgressBar>> {
    use indicatif::{ProgressBar, ProgressStyle};
    if !show {
        return Ok(None);
    }
    let b = ProgressBar::new(len as u64);
    b.set_style(ProgressStyle::with_template(
        "{spinner:.green} building {pos}/{len} [{elapsed_precise}] {wide_msg}",
    )?);
    Ok(Some(b))
}

fn fmt_dur(d: Duration) -> String {
    let ms = d.as_secs_f64() * 1000.0;
    if ms < 1000.0 {
        format!("{:.1}ms", ms)
    } else {
        format!("{:.2}s", ms / 1000.0)
    }
}

/// `items.bundle.json` -> `items`.
fn bundle_name(desc: &Path) -> String {
    let file = desc.file_name().and_then(|s| s.to_str()).unwrap_or("bundle");
    file.strip_suffix(DESCRIPTOR_SUFFIX)
        .or_else(|| file.strip_suffix(".json"))
        .unwrap_or(file)
        .to_string()
}

fn build_globset(patterns: &[String]) -> anyhow::Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut b = GlobSetBuilder::new();
    for pat in patterns {
        b.add(Glob::new(pat).with_context(|| format!("bad glob '{pat}'"))?);
    }
    Ok(Some(b.build()?))
}

fn gather_paths(path: &Path, include: &[String], exclude: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let inc_set = build_globset(include)?;
    let exc_set = build_globset(exclude)?;
    let mut list: Vec<PathBuf> = Vec::new();
    if path.is_file() {
        // an explicitly named file is taken whatever its suffix
        if !should_skip(path, inc_set.as_ref(), exc_set.as_ref()) {
            list.push(path.to_path_buf());
        }
    } else {
        for entry in WalkDir::new(path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && is_descriptor(p) && !should_skip(p, inc_set.as_ref(), exc_set.as_ref()) {
                list.push(p.to_path_buf());
            }
        }
    }
    Ok(list)
}

fn should_skip(p: &Path, inc: Option<&GlobSet>, exc: Option<&GlobSet>) -> bool {
    if inc.is_some_and(|inc| !inc.is_match(p)) {
        return true;
    }
    exc.is_some_and(|exc| exc.is_match(p))
}

fn is_descriptor(p: &Path) -> bool {
    p.file_name()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.ends_with(DESCRIPTOR_SUFFIX))
}

fn init_tracing_with_level(quiet: bool, verbose: u8) {
    let level = if quiet {
        "error".to_string()
    } else {
        match verbose {
            0 => "info".into(),
            1 => "debug".into(),
            _ => "trace".into(),
        }
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_target(false)
        .try_init();
}

fn parse_metadata_format(s: &str) -> anyhow::Result<MetadataFormat> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("unknown metadata format: {}", s))
}

#[derive(Debug, Deserialize, Default)]
struct YamlConfig {
    trim_images: Option<bool>,
    use_raw_images: Option<bool>,
    strip_width: Option<u32>,
    metadata_format: Option<String>,
    image_base: Option<PathBuf>,
    parallel: Option<bool>,
}

impl YamlConfig {
    fn apply(self, mut base: BuildSettings) -> anyhow::Result<BuildSettings> {
        if let Some(v) = self.trim_images {
            base.trim_images = v;
        }
        if let Some(v) = self.use_raw_images {
            base.use_raw_images = v;
        }
        if let Some(v) = self.strip_width {
            base.strip_width = v;
        }
        if let Some(v) = self.metadata_format {
            base.metadata_format = parse_metadata_format(&v)?;
        }
        if let Some(v) = self.image_base {
            base.image_base = Some(v);
        }
        if let Some(v) = self.parallel {
            base.parallel = v;
        }
        Ok(base)
    }
}
