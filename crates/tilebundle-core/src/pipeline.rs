use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, error, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::archive::{BundleWriter, start_new_file};
use crate::codec::{ImageFormat, adjust_image_path, can_write_raw, encode_image, load_image, output_image_path};
use crate::config::BuildConfig;
use crate::descriptor::{ParsedBundle, load_bundle};
use crate::error::{BundleError, Result};
use crate::idbroker::TileSetIdBroker;
use crate::metadata::encode_manifest;
use crate::metrics::trim_object_tile_set;
use crate::model::{BundleManifest, BundleTileSet, TileSet, TrimStats};
use crate::trimmer::Trimmer;

/// Replacement tile sets produced during a build, applied to the manifest in one step.
pub type StagedTileSets = BTreeMap<u32, BundleTileSet>;

/// Final state of one declared tile set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    /// Image file not found; the tile set is left out of the bundle.
    SkippedMissingImage,
    /// Tile set has no name; left out of the bundle.
    SkippedUnnamed,
    /// No id could be assigned; left out of the bundle.
    SkippedNoId,
    /// Output already newer than every source.
    SkippedUpToDate,
    /// Source image bytes copied unchanged.
    RawCopied,
    /// Source image re-encoded into the raw format.
    Reencoded,
    /// Object tile set trimmed into a new atlas.
    Trimmed,
}

impl ItemStatus {
    /// Item never made it into the manifest.
    pub fn is_excluded(&self) -> bool {
        matches!(
            self,
            ItemStatus::SkippedMissingImage | ItemStatus::SkippedUnnamed | ItemStatus::SkippedNoId
        )
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ItemStatus::SkippedMissingImage => "skipped (missing image)",
            ItemStatus::SkippedUnnamed => "skipped (unnamed)",
            ItemStatus::SkippedNoId => "skipped (no id)",
            ItemStatus::SkippedUpToDate => "up to date",
            ItemStatus::RawCopied => "copied",
            ItemStatus::Reencoded => "re-encoded",
            ItemStatus::Trimmed => "trimmed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct ItemReport {
    pub id: Option<u32>,
    pub name: Option<String>,
    pub image_path: String,
    pub status: ItemStatus,
    /// Present for trimmed tile sets.
    pub stats: Option<TrimStats>,
}

impl ItemReport {
    fn new(id: Option<u32>, set: &TileSet, status: ItemStatus) -> Self {
        Self {
            id,
            name: set.name().map(str::to_string),
            image_path: set.image_path.clone(),
            status,
            stats: None,
        }
    }
}

/// Outcome of a bundle build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Location of the bundle.
    pub target: String,
    pub items: Vec<ItemReport>,
    /// Item-level problems that were skipped over.
    pub warnings: Vec<String>,
    pub metadata_written: bool,
    /// The bundle was newer than every source and left untouched.
    pub up_to_date: bool,
    pub duration: Duration,
}

impl BuildReport {
    pub fn count(&self, status: ItemStatus) -> usize {
        self.items.iter().filter(|i| i.status == status).count()
    }

    pub fn status_of(&self, name: &str) -> Option<ItemStatus> {
        self.items
            .iter()
            .find(|i| i.name.as_deref() == Some(name))
            .map(|i| i.status)
    }

    /// Tile sets actually written to the bundle by this build.
    pub fn written_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| {
                matches!(
                    i.status,
                    ItemStatus::RawCopied | ItemStatus::Reencoded | ItemStatus::Trimmed
                )
            })
            .count()
    }
}

/// Manifest plus the item-level outcomes of preparing it.
#[derive(Debug, Clone)]
pub struct BundleJob {
    pub manifest: BundleManifest,
    /// Directory image paths are resolved against.
    pub image_base: PathBuf,
    skipped: Vec<ItemReport>,
    warnings: Vec<String>,
}

impl BundleJob {
    pub fn new(manifest: BundleManifest, image_base: impl Into<PathBuf>) -> Self {
        Self {
            manifest,
            image_base: image_base.into(),
            skipped: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    fn skip(&mut self, set: &TileSet, status: ItemStatus, err: BundleError) {
        warn!(error = %err, "skipping tile set");
        self.warnings.push(err.to_string());
        self.skipped.push(ItemReport::new(None, set, status));
    }
}

struct ItemContext<'a> {
    config: &'a BuildConfig,
    image_base: &'a Path,
    writer: &'a dyn BundleWriter,
    newest_source: SystemTime,
    metadata_stale: bool,
}

struct ItemOutcome {
    id: u32,
    report: ItemReport,
    replacement: Option<BundleTileSet>,
}

/// Builds tile set bundles from parsed bundle descriptions.
pub struct TileSetBundler {
    config: BuildConfig,
}

impl TileSetBundler {
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Loads `descriptor`, prepares the manifest and builds it into `writer`.
    pub fn create<W: BundleWriter>(
        &self,
        descriptor: &Path,
        broker: &mut dyn TileSetIdBroker,
        writer: W,
    ) -> Result<BuildReport> {
        let parsed = match load_bundle(descriptor) {
            Ok(parsed) => parsed,
            Err(err) => {
                let target = writer.location();
                if !writer.delete() {
                    warn!(bundle = %target, "failed to remove bundle after descriptor error");
                }
                return Err(err);
            }
        };
        let job = self.prepare(parsed, broker);
        self.build(job, writer)
    }

    /// Resolves images, assigns ids and collects the manifest.
    ///
    /// Unnamed tile sets, missing images and id failures skip the tile set with a
    /// warning. Newly assigned ids are committed whatever happens to the build.
    #[instrument(skip_all, fields(tile_sets = parsed.tile_sets.len()))]
    pub fn prepare(&self, parsed: ParsedBundle, broker: &mut dyn TileSetIdBroker) -> BundleJob {
        let image_base = self
            .config
            .image_base
            .clone()
            .unwrap_or_else(|| parsed.descriptor_dir.clone());
        let mut job = BundleJob::new(BundleManifest::new(parsed.newest_source), image_base);

        for set in parsed.tile_sets {
            let Some(name) = set.name().map(str::to_string) else {
                let err = BundleError::UnnamedTileSet {
                    image_path: set.image_path.clone(),
                };
                job.skip(&set, ItemStatus::SkippedUnnamed, err);
                continue;
            };

            let image_file = job.image_base.join(&set.image_path);
            let modified = match fs::metadata(&image_file).and_then(|m| m.modified()) {
                Ok(m) => m,
                Err(_) => {
                    let err = BundleError::MissingImage {
                        name,
                        path: image_file,
                    };
                    job.skip(&set, ItemStatus::SkippedMissingImage, err);
                    continue;
                }
            };
            job.manifest.note_source_time(modified);

            match broker.tile_set_id(&name) {
                Ok(id) => {
                    if job.manifest.get(id).is_some() {
                        warn!(id, name = %name, "duplicate tile set name, later declaration wins");
                    }
                    job.manifest.insert(id, BundleTileSet::Source(set));
                }
                Err(e) => {
                    let err = match e {
                        e @ BundleError::IdAssignment { .. } => e,
                        other => BundleError::IdAssignment {
                            name,
                            reason: other.to_string(),
                        },
                    };
                    job.skip(&set, ItemStatus::SkippedNoId, err);
                }
            }
        }

        if let Err(err) = broker.commit() {
            warn!(error = %err, "failure committing brokered tile set ids");
            job.warnings.push(format!("failed to commit tile set ids: {err}"));
        }
        debug!(entries = job.manifest.len(), "prepared bundle manifest");
        job
    }

    /// Writes every tile set and the manifest, then commits `writer`.
    ///
    /// Any fatal error removes the bundle and is returned wrapped in
    /// [`BundleError::BuildFailed`]. A failing commit is returned as-is.
    #[instrument(skip_all, fields(bundle = %writer.location()))]
    pub fn build<W: BundleWriter>(&self, job: BundleJob, writer: W) -> Result<BuildReport> {
        let start = Instant::now();
        let BundleJob {
            mut manifest,
            image_base,
            skipped,
            warnings,
        } = job;
        let mut report = BuildReport {
            target: writer.location(),
            items: skipped,
            warnings,
            metadata_written: false,
            up_to_date: false,
            duration: Duration::ZERO,
        };

        // A bundle missing its metadata entry is never up to date, however fresh the rest is.
        let newest_source = manifest.newest_source();
        let meta_path = self.config.metadata_format.path();
        if writer.is_newer_than(newest_source)
            && writer.is_path_newer_than(meta_path, newest_source)
        {
            for (id, set) in manifest.iter() {
                report.items.push(ItemReport {
                    id: Some(id),
                    name: set.name().map(str::to_string),
                    image_path: set.image_path().to_string(),
                    status: ItemStatus::SkippedUpToDate,
                    stats: None,
                });
            }
            report.up_to_date = true;
            finalize(writer)?;
            report.duration = start.elapsed();
            info!("bundle is up to date");
            return Ok(report);
        }

        match self.write_bundle(&mut manifest, &image_base, &writer, &mut report) {
            Ok(()) => {
                finalize(writer)?;
                report.duration = start.elapsed();
                info!(
                    tile_sets = manifest.len(),
                    written = report.written_count(),
                    up_to_date = report.count(ItemStatus::SkippedUpToDate),
                    warnings = report.warnings.len(),
                    "bundle written"
                );
                Ok(report)
            }
            Err(err) => {
                error!(error = %err, "bundle build failed, rolling back");
                let target = report.target.clone();
                if !writer.delete() {
                    warn!(bundle = %target, "failed to remove botched bundle");
                }
                Err(BundleError::BuildFailed {
                    target,
                    source: Box::new(err),
                })
            }
        }
    }

    fn write_bundle(
        &self,
        manifest: &mut BundleManifest,
        image_base: &Path,
        writer: &dyn BundleWriter,
        report: &mut BuildReport,
    ) -> Result<()> {
        let newest_source = manifest.newest_source();
        let meta_path = self.config.metadata_format.path();
        let metadata_stale = !writer.is_path_newer_than(meta_path, newest_source);
        let ctx = ItemContext {
            config: &self.config,
            image_base,
            writer,
            newest_source,
            metadata_stale,
        };

        let entries: Vec<(u32, &BundleTileSet)> = manifest.iter().collect();
        let outcomes = self.run_items(&ctx, &entries)?;

        // The live manifest changes only once every tile set has been processed.
        let mut staged = StagedTileSets::new();
        for outcome in outcomes {
            if let Some(replacement) = outcome.replacement {
                staged.insert(outcome.id, replacement);
            }
            report.items.push(outcome.report);
        }
        manifest.merge(staged);

        if metadata_stale {
            let wrap = |source: BundleError| BundleError::MetadataWrite {
                path: meta_path.to_string(),
                source: Box::new(source),
            };
            let bytes = encode_manifest(manifest, self.config.metadata_format).map_err(wrap)?;
            writer
                .put_entry(meta_path, &bytes)
                .map_err(|e| wrap(BundleError::Io(e)))?;
            report.metadata_written = true;
            debug!(path = meta_path, bytes = bytes.len(), "wrote bundle metadata");
        } else {
            debug!(path = meta_path, "metadata up to date");
        }
        Ok(())
    }

    fn run_items(
        &self,
        ctx: &ItemContext<'_>,
        entries: &[(u32, &BundleTileSet)],
    ) -> Result<Vec<ItemOutcome>> {
        let run = |(id, set): &(u32, &BundleTileSet)| process_item(ctx, *id, set);
        #[cfg(feature = "parallel")]
        {
            if self.config.parallel {
                return entries.par_iter().map(&run).collect();
            }
        }
        entries.iter().map(&run).collect()
    }
}

fn finalize<W: BundleWriter>(writer: W) -> Result<()> {
    writer.close().map_err(|e| match e {
        e @ BundleError::ArchiveFinalize(_) => e,
        other => BundleError::ArchiveFinalize(other.to_string()),
    })
}

fn process_item(ctx: &ItemContext<'_>, id: u32, set: &BundleTileSet) -> Result<ItemOutcome> {
    let set = match set {
        BundleTileSet::Source(set) => set,
        BundleTileSet::Trimmed(trimmed) => {
            // trimmed by an earlier build; its atlas must already be in the bundle
            if ctx.writer.entry_modified(&trimmed.image_path).is_none() {
                return Err(BundleError::InvalidInput(format!(
                    "trimmed tile set '{}' has no image '{}' in the bundle",
                    trimmed.name, trimmed.image_path
                )));
            }
            return Ok(ItemOutcome {
                id,
                report: ItemReport {
                    id: Some(id),
                    name: Some(trimmed.name.clone()),
                    image_path: trimmed.image_path.clone(),
                    status: ItemStatus::SkippedUpToDate,
                    stats: None,
                },
                replacement: None,
            });
        }
    };
    let image_file = ctx.image_base.join(&set.image_path);
    let image_time = fs::metadata(&image_file)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let source_time = ctx.newest_source.max(image_time);

    if ctx.config.trim_images && set.is_object() {
        trim_item(ctx, id, set, &image_file, source_time)
    } else {
        copy_item(ctx, id, set, &image_file, source_time)
    }
}

fn trim_item(
    ctx: &ItemContext<'_>,
    id: u32,
    set: &TileSet,
    image_file: &Path,
    source_time: SystemTime,
) -> Result<ItemOutcome> {
    let format = ctx.config.image_format();
    let out_path = output_image_path(&set.image_path, format);

    // A rewritten manifest needs the trimmed metrics, so only skip when it is fresh too.
    if !ctx.metadata_stale && ctx.writer.is_path_newer_than(&out_path, source_time) {
        debug!(id, path = %out_path, "trimmed image up to date");
        return Ok(ItemOutcome {
            id,
            report: ItemReport::new(Some(id), set, ItemStatus::SkippedUpToDate),
            replacement: None,
        });
    }

    let name = set.name().unwrap_or_default().to_string();
    let trim_err = |source: BundleError| BundleError::Trim {
        tile_set: name.clone(),
        source: Box::new(source),
    };
    let image = load_image(image_file)?.to_rgba8();
    let trimmer = Trimmer::new(ctx.config.packer.as_ref()).parallel(ctx.config.parallel);
    let (trimmed, atlas) = trim_object_tile_set(set, &image, &trimmer, &out_path).map_err(trim_err)?;
    let bytes = atlas.encode(format).map_err(trim_err)?;
    ctx.writer
        .put_entry(&out_path, &bytes)
        .map_err(|source| BundleError::Write {
            path: out_path.clone(),
            source,
        })?;
    info!(id, name = %name, path = %out_path, summary = %atlas.stats.summary(), "trimmed tile set");

    let mut report = ItemReport::new(Some(id), set, ItemStatus::Trimmed);
    report.image_path = out_path;
    report.stats = Some(atlas.stats);
    Ok(ItemOutcome {
        id,
        report,
        replacement: Some(BundleTileSet::Trimmed(trimmed)),
    })
}

fn copy_item(
    ctx: &ItemContext<'_>,
    id: u32,
    set: &TileSet,
    image_file: &Path,
    source_time: SystemTime,
) -> Result<ItemOutcome> {
    if ctx.config.use_raw_images {
        let raw_path = adjust_image_path(&set.image_path);
        let replacement = Some(BundleTileSet::Source(set.with_image_path(raw_path.clone())));
        if ctx.writer.is_path_newer_than(&raw_path, source_time) {
            debug!(id, path = %raw_path, "raw image up to date");
            return Ok(ItemOutcome {
                id,
                report: ItemReport::new(Some(id), set, ItemStatus::SkippedUpToDate),
                replacement,
            });
        }
        let image = load_image(image_file)?;
        if can_write_raw(&image) {
            let bytes = encode_image(&image.to_rgba8(), ImageFormat::Raw)?;
            ctx.writer
                .put_entry(&raw_path, &bytes)
                .map_err(|source| BundleError::Write {
                    path: raw_path.clone(),
                    source,
                })?;
            debug!(id, path = %raw_path, "re-encoded image");
            let mut report = ItemReport::new(Some(id), set, ItemStatus::Reencoded);
            report.image_path = raw_path;
            return Ok(ItemOutcome {
                id,
                report,
                replacement,
            });
        }
        debug!(id, color = ?image.color(), "image not convertible to raw, copying");
    }

    let path = set.image_path.as_str();
    if ctx.writer.is_path_newer_than(path, source_time) {
        return Ok(ItemOutcome {
            id,
            report: ItemReport::new(Some(id), set, ItemStatus::SkippedUpToDate),
            replacement: None,
        });
    }
    let write_err = |source: io::Error| BundleError::Write {
        path: path.to_string(),
        source,
    };
    let mut input = File::open(image_file)?;
    let mut sink = start_new_file(ctx.writer, path);
    io::copy(&mut input, &mut sink).map_err(write_err)?;
    sink.commit().map_err(write_err)?;
    debug!(id, path, "copied image");
    Ok(ItemOutcome {
        id,
        report: ItemReport::new(Some(id), set, ItemStatus::RawCopied),
        replacement: None,
    })
}
