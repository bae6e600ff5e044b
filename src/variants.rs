//! Image variant generation.
//!
//! Renders the configured variant list for every distinct image a course
//! references, into the shared image root:
//!
//! ```text
//! static/images/
//! ├── .coursec-jp.json          # ledger: which files belong to course "jp"
//! ├── jp_neko.jpg               # base variant (512px)
//! ├── jp_neko_tiny.jpg          # 256px
//! ├── jp_neko_tinier.jpg        # 128px
//! └── logo.png                  # hand-authored, never touched
//! ```
//!
//! ## Skipping
//!
//! A variant is left alone when its file exists and the
//! [ledger](crate::ledger) records the same source content hash and
//! parameter hash. Only stale or missing variants reach the backend.
//!
//! ## Failures
//!
//! A source that cannot be read or decoded produces a [`MediaFailure`] for
//! that image only; every other image is still processed. The failed image's
//! previously generated variants stay in the ledger and on disk. Failures
//! are returned together once the pool has finished.
//!
//! ## Parallelism
//!
//! One job per image on a local rayon pool sized by
//! [`effective_threads`](crate::config::effective_threads). Each job owns its
//! source/output files exclusively; results are gathered once, after the pool
//! completes. Progress goes through an optional channel so the CLI can print
//! while the pool works.

use crate::config::ImagesConfig;
use crate::ident::ImageAsset;
use crate::imaging::{
    BackendError, ImageBackend, get_dimensions, plan_variants, render_variant, variant_file_name,
};
use crate::ledger::{LedgerEntry, VariantLedger, VariantStats, hash_file, hash_variant_params};
use rayon::prelude::*;
use crate::spec::ValidationReport;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VariantError {
    #[error("cannot write variant {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot start image worker pool: {0}")]
    ThreadPool(String),
}

/// A source image that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFailure {
    pub image: String,
    pub source: PathBuf,
    pub message: String,
}

impl fmt::Display for MediaFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.image, self.source.display(), self.message)
    }
}

/// What happened to one variant this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantStatus {
    UpToDate,
    Rendered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantInfo {
    pub file: String,
    pub status: VariantStatus,
}

/// Progress events emitted while the pool runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantEvent {
    Started {
        image_count: usize,
    },
    ImageProcessed {
        index: usize,
        name: String,
        source: PathBuf,
        variants: Vec<VariantInfo>,
    },
    ImageFailed {
        index: usize,
        failure: MediaFailure,
    },
}

/// Everything the rest of the pipeline needs from this stage.
#[derive(Debug, Clone)]
pub struct VariantOutcome {
    /// Variant files (relative to the image root) the course owns after this
    /// run: fresh, rendered, and those retained for failed images.
    pub owned: BTreeSet<String>,
    /// Ledger describing `owned`.
    pub ledger: VariantLedger,
    pub failures: Vec<MediaFailure>,
    pub stats: VariantStats,
}

impl VariantOutcome {
    /// Absolute paths of every owned variant.
    pub fn owned_paths(&self, images_root: &Path) -> BTreeSet<PathBuf> {
        self.owned.iter().map(|f| images_root.join(f)).collect()
    }
}

/// Per-variant result of a successful job.
struct Rendered {
    file: String,
    entry: LedgerEntry,
    status: VariantStatus,
}

enum JobError {
    Media(MediaFailure),
    Io(VariantError),
}

/// Process one image: identify, plan, skip fresh variants, render the rest.
fn process_image(
    backend: &impl ImageBackend,
    asset: &ImageAsset,
    images_root: &Path,
    config: &ImagesConfig,
    previous: &VariantLedger,
) -> Result<Vec<Rendered>, JobError> {
    let media_failure = |message: String| {
        JobError::Media(MediaFailure {
            image: asset.name.clone(),
            source: asset.source.clone(),
            message,
        })
    };

    let source_hash =
        hash_file(&asset.source).map_err(|e| media_failure(format!("cannot read source: {e}")))?;
    let dims = get_dimensions(backend, &asset.source).map_err(|e| media_failure(e.to_string()))?;

    let mut results = Vec::new();
    for params in plan_variants(&asset.source, images_root, &asset.name, dims, config) {
        let file = params
            .output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let params_hash = hash_variant_params(&params, config.version);

        let fresh = params.output.is_file() && previous.matches(&file, &source_hash, &params_hash);

        let status = if fresh {
            tracing::debug!(file = %file, "variant up to date");
            VariantStatus::UpToDate
        } else {
            match render_variant(backend, &params) {
                Ok(()) => {}
                Err(BackendError::Io(source)) => {
                    return Err(JobError::Io(VariantError::Io {
                        path: params.output.clone(),
                        source,
                    }));
                }
                Err(e) => return Err(media_failure(e.to_string())),
            }
            tracing::info!(file = %file, width = params.width, height = params.height, "rendered variant");
            VariantStatus::Rendered
        };

        results.push(Rendered {
            file,
            entry: LedgerEntry {
                image: asset.name.clone(),
                source_hash: source_hash.clone(),
                params_hash,
            },
            status,
        });
    }
    Ok(results)
}

/// Refuse image names whose variant files would overlap, e.g. image `a`'s
/// `tiny` variant and image `a_tiny`'s base variant.
///
/// Two images sharing an output file would overwrite each other on every
/// run, so this is reported before anything is rendered.
pub fn check_variant_names(
    assets: &[&ImageAsset],
    config: &ImagesConfig,
) -> Result<(), ValidationReport> {
    let mut owners: HashMap<String, &ImageAsset> = HashMap::new();
    let mut report = ValidationReport::default();
    for asset in assets {
        for variant in &config.variants {
            let file = variant_file_name(&asset.name, &variant.suffix, variant.format);
            match owners.get(&file) {
                Some(first) => report.push(
                    &format!("image {:?} ({})", asset.name, asset.source.display()),
                    format!(
                        "variant file {file:?} is also produced by image {:?} ({})",
                        first.name,
                        first.source.display()
                    ),
                ),
                None => {
                    owners.insert(file, *asset);
                }
            }
        }
    }
    if report.is_empty() { Ok(()) } else { Err(report) }
}

/// Render every variant of `assets` that is missing or stale.
///
/// `previous` is the ledger from the last run; the returned outcome carries
/// the ledger for this run. Nothing is deleted here.
#[allow(clippy::too_many_arguments)]
pub fn generate_variants(
    backend: &impl ImageBackend,
    assets: &[&ImageAsset],
    images_root: &Path,
    course_slug: &str,
    config: &ImagesConfig,
    threads: usize,
    previous: &VariantLedger,
    events: Option<Sender<VariantEvent>>,
) -> Result<VariantOutcome, VariantError> {
    fs::create_dir_all(images_root).map_err(|source| VariantError::Io {
        path: images_root.to_path_buf(),
        source,
    })?;

    if let Some(tx) = &events {
        let _ = tx.send(VariantEvent::Started {
            image_count: assets.len(),
        });
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .map_err(|e| VariantError::ThreadPool(e.to_string()))?;

    let results: Vec<Result<Vec<Rendered>, JobError>> = pool.install(|| {
        assets
            .par_iter()
            .enumerate()
            .map(|(index, asset)| {
                let result = process_image(backend, asset, images_root, config, previous);
                if let Some(tx) = &events {
                    let event = match &result {
                        Ok(rendered) => Some(VariantEvent::ImageProcessed {
                            index,
                            name: asset.name.clone(),
                            source: asset.source.clone(),
                            variants: rendered
                                .iter()
                                .map(|r| VariantInfo {
                                    file: r.file.clone(),
                                    status: r.status,
                                })
                                .collect(),
                        }),
                        Err(JobError::Media(failure)) => Some(VariantEvent::ImageFailed {
                            index,
                            failure: failure.clone(),
                        }),
                        Err(JobError::Io(_)) => None,
                    };
                    if let Some(event) = event {
                        let _ = tx.send(event);
                    }
                }
                result
            })
            .collect()
    });

    let mut outcome = VariantOutcome {
        owned: BTreeSet::new(),
        ledger: VariantLedger::empty(course_slug),
        failures: Vec::new(),
        stats: VariantStats::default(),
    };

    for (asset, result) in assets.iter().zip(results) {
        match result {
            Ok(rendered) => {
                for r in rendered {
                    match r.status {
                        VariantStatus::UpToDate => outcome.stats.fresh += 1,
                        VariantStatus::Rendered => outcome.stats.rendered += 1,
                    }
                    outcome.owned.insert(r.file.clone());
                    outcome.ledger.insert(r.file, r.entry);
                }
            }
            Err(JobError::Media(failure)) => {
                tracing::error!(image = %failure.image, source = %failure.source.display(), error = %failure.message, "image failed");
                outcome.stats.failed += 1;
                for file in previous.files_of(&asset.name) {
                    if let Some(entry) = previous.entries.get(file) {
                        outcome.owned.insert(file.to_string());
                        outcome.ledger.entries.insert(file.to_string(), entry.clone());
                    }
                }
                outcome.failures.push(failure);
            }
            Err(JobError::Io(e)) => return Err(e),
        }
    }

    Ok(outcome)
}
