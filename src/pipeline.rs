//! Run orchestration for `generate`, `check`, and `export`.
//!
//! ```text
//! Idle → Loading → Validating ─┬─ fail ──────────────────────────→ Reported
//!                              └─ ok → Transforming → Emitting → Pruning → Done
//! ```
//!
//! Each transition is logged. Validation happens before anything is written,
//! so a rejected specification leaves every output root untouched. A run that
//! fails later leaves earlier stages' output as it is; re-running from scratch
//! is always safe since every writer skips unchanged bytes.
//!
//! During `Emitting` the image variant generator and the Course Tree emitter
//! run side by side: they write disjoint roots and only share the read-only
//! compiled course.
//!
//! Pruning runs under a [`Cancellation`] guard. A run aborted by a timeout
//! never starts pruning. If the timeout fires while a prune is running, the
//! caller gets [`PipelineError::Timeout`] straight away, marked
//! [`PruneProgress::InProgress`].

use crate::config::{CompilerConfig, ConfigError, RepoLayout, effective_threads};
use crate::emit::{EmitOutcome, emit_course};
use crate::export::{ExportError, ExportReport, build_bundle, load_course_tree, write_bundle};
use crate::ident::{CompiledCourse, assign};
use crate::imaging::ImageBackend;
use crate::ledger::{VariantLedger, VariantStats};
use crate::prune::{PruneError, PruneInput, PruneReport, execute_prune, plan_prune};
use crate::spec::{CourseSpec, SpecError, ValidationReport, Violation, load_spec, parse_spec};
use crate::variants::{
    MediaFailure, VariantEvent, VariantOutcome, check_variant_names, generate_variants,
};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread;
use std::time::Duration;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Validation(ValidationReport),
    #[error("{} image(s) could not be processed:\n  {}", .0.len(), format_failures(.0))]
    Media(Vec<MediaFailure>),
    #[error("{stage} failed: {source}")]
    Io { stage: Stage, source: BoxError },
    #[error("prune refused, nothing was deleted:\n  {}", .0.join("\n  "))]
    PruneSafety(Vec<String>),
    #[error(transparent)]
    Export(ExportError),
    #[error("run aborted")]
    Aborted,
    #[error("run timed out after {}s; {prune}", .limit.as_secs())]
    Timeout { limit: Duration, prune: PruneProgress },
    #[error("pipeline worker stopped without a result")]
    WorkerLost,
}

fn format_failures(failures: &[MediaFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n  ")
}

fn io_error(stage: Stage, source: impl Into<BoxError>) -> PipelineError {
    PipelineError::Io {
        stage,
        source: source.into(),
    }
}

// ============================================================================
// Run state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Loading,
    Validating,
    Transforming,
    Emitting,
    Pruning,
    Done,
    Reported,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Idle => "idle",
            Stage::Loading => "loading",
            Stage::Validating => "validating",
            Stage::Transforming => "transforming",
            Stage::Emitting => "emitting",
            Stage::Pruning => "pruning",
            Stage::Done => "done",
            Stage::Reported => "reported",
        })
    }
}

/// Tracks the current stage of one run.
#[derive(Debug)]
struct Run<'a> {
    stage: Stage,
    cancel: &'a Cancellation,
}

impl<'a> Run<'a> {
    fn new(cancel: &'a Cancellation) -> Self {
        Self {
            stage: Stage::Idle,
            cancel,
        }
    }

    /// Move to `next`, unless the run has been aborted.
    fn advance(&mut self, next: Stage) -> Result<(), PipelineError> {
        if self.cancel.is_aborted() {
            tracing::warn!(stage = %self.stage, "run aborted");
            return Err(PipelineError::Aborted);
        }
        tracing::info!(from = %self.stage, to = %next, "stage");
        self.stage = next;
        Ok(())
    }

    /// Record a failure as reported and hand the error back.
    fn fail(&mut self, err: PipelineError) -> PipelineError {
        tracing::error!(stage = %self.stage, error = %err, "run failed");
        self.stage = Stage::Reported;
        err
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Where the guarded prune was when a run was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneProgress {
    NotStarted,
    InProgress,
    Finished,
}

impl fmt::Display for PruneProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PruneProgress::NotStarted => "nothing was pruned",
            PruneProgress::InProgress => "a prune was still running and may be incomplete",
            PruneProgress::Finished => "pruning had already completed",
        })
    }
}

const GUARD_IDLE: u8 = 0;
const GUARD_RUNNING: u8 = 1;
const GUARD_DONE: u8 = 2;

#[derive(Debug, Default)]
struct Flags {
    aborted: AtomicBool,
    guard: AtomicU8,
}

/// Shared abort flag. Neither side ever blocks: [`Cancellation::abort`]
/// returns at once and reports whether a guarded section was running.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flags: Arc<Flags>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the run aborted and report how far the guarded prune got.
    pub fn abort(&self) -> PruneProgress {
        self.flags.aborted.store(true, Ordering::SeqCst);
        self.progress()
    }

    pub fn is_aborted(&self) -> bool {
        self.flags.aborted.load(Ordering::SeqCst)
    }

    pub fn progress(&self) -> PruneProgress {
        match self.flags.guard.load(Ordering::SeqCst) {
            GUARD_RUNNING => PruneProgress::InProgress,
            GUARD_DONE => PruneProgress::Finished,
            _ => PruneProgress::NotStarted,
        }
    }

    /// Run `f` unless the run was already aborted.
    ///
    /// The section is marked running before the abort flag is read, so an
    /// abort racing with the start either skips `f` or sees it in progress.
    pub fn guarded<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        self.flags.guard.store(GUARD_RUNNING, Ordering::SeqCst);
        if self.is_aborted() {
            self.flags.guard.store(GUARD_IDLE, Ordering::SeqCst);
            return None;
        }
        let out = f();
        self.flags.guard.store(GUARD_DONE, Ordering::SeqCst);
        Some(out)
    }
}

/// Run `job` on a worker thread, giving up after `timeout`.
///
/// On expiry the shared [`Cancellation`] is aborted and
/// [`PipelineError::Timeout`] is returned at once, recording whether a prune
/// was running. The worker notices the abort at its next stage transition.
pub fn run_with_timeout<T, F>(
    timeout: Option<Duration>,
    cancel: &Cancellation,
    job: F,
) -> Result<T, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
{
    let Some(limit) = timeout else {
        return job();
    };
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(job());
    });
    match rx.recv_timeout(limit) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            let prune = cancel.abort();
            tracing::error!(seconds = limit.as_secs(), %prune, "run timed out");
            Err(PipelineError::Timeout { limit, prune })
        }
        Err(RecvTimeoutError::Disconnected) => Err(PipelineError::WorkerLost),
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Size of a compiled course.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseSummary {
    pub course: String,
    pub categories: usize,
    pub lessons: usize,
    pub items: usize,
    pub images: usize,
}

impl CourseSummary {
    fn of(course: &CompiledCourse) -> Self {
        Self {
            course: course.meta.slug.clone(),
            categories: course.categories.len(),
            lessons: course.lesson_count(),
            items: course.item_count(),
            images: course.images().len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: CourseSummary,
    pub course_dir: PathBuf,
    pub files_changed: usize,
    pub files_unchanged: usize,
    pub variants: VariantStats,
    pub ledger_written: bool,
    pub failures: Vec<MediaFailure>,
    /// `None` when pruning was turned off.
    pub prune: Option<PruneReport>,
}

impl RunReport {
    /// Filesystem writes and deletions this run performed.
    pub fn writes(&self) -> usize {
        let deleted = match &self.prune {
            Some(p) if !p.dry_run => p.deleted.len(),
            _ => 0,
        };
        self.files_changed + self.variants.rendered as usize + usize::from(self.ledger_written) + deleted
    }

    /// Turn collected media failures into an error, once the report has been
    /// shown.
    pub fn media_result(&self) -> Result<(), PipelineError> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Media(self.failures.clone()))
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub prune: bool,
    pub dry_run: bool,
    /// Overrides the course's `repository` in the emitted metadata.
    pub repository_url: Option<String>,
}

// ============================================================================
// Stages
// ============================================================================

fn load_and_validate(run: &mut Run<'_>, layout: &RepoLayout) -> Result<CourseSpec, PipelineError> {
    run.advance(Stage::Loading)?;
    tracing::info!(path = %layout.spec.display(), "loading specification");
    let content = fs::read_to_string(&layout.spec).map_err(|e| {
        let err = io_error(
            Stage::Loading,
            SpecError::Io {
                path: layout.spec.clone(),
                source: e,
            },
        );
        run.fail(err)
    })?;

    run.advance(Stage::Validating)?;
    parse_spec(&content, &layout.media_root).map_err(|e| run.fail(spec_failure(&layout.spec, e)))
}

fn spec_failure(path: &Path, err: SpecError) -> PipelineError {
    match err {
        SpecError::Invalid(report) => PipelineError::Validation(report),
        SpecError::Parse { source, .. } => PipelineError::Validation(ValidationReport {
            violations: vec![Violation {
                location: path.display().to_string(),
                message: source.to_string(),
            }],
        }),
        other => io_error(Stage::Loading, other),
    }
}

fn emit_and_render(
    course: &CompiledCourse,
    layout: &RepoLayout,
    config: &CompilerConfig,
    backend: &impl ImageBackend,
    previous: &VariantLedger,
    events: Option<Sender<VariantEvent>>,
) -> Result<(EmitOutcome, VariantOutcome), PipelineError> {
    let course_dir = layout.course_dir(&course.meta.slug);
    let assets = course.images();
    let threads = effective_threads(&config.processing);

    thread::scope(|s| {
        let emitter = s.spawn(|| emit_course(course, &course_dir, &config.images));
        let variants = generate_variants(
            backend,
            &assets,
            &layout.images_root,
            &course.meta.slug,
            &config.images,
            threads,
            previous,
            events,
        );
        let emitted = emitter.join().map_err(|_| PipelineError::WorkerLost)?;
        let emitted = emitted.map_err(|e| io_error(Stage::Emitting, e))?;
        let variants = variants.map_err(|e| io_error(Stage::Emitting, e))?;
        Ok((emitted, variants))
    })
}

/// Files the course no longer owns but an earlier run recorded.
fn stale_variants(previous: &VariantLedger, outcome: &VariantOutcome) -> Vec<String> {
    previous
        .entries
        .keys()
        .filter(|f| !outcome.owned.contains(*f))
        .cloned()
        .collect()
}

/// This run's ledger plus earlier entries whose files are still on disk,
/// so a skipped or partial prune can be finished by a later run.
fn final_ledger(previous: &VariantLedger, outcome: &VariantOutcome, images_root: &Path) -> VariantLedger {
    let mut ledger = outcome.ledger.clone();
    for (file, entry) in &previous.entries {
        if !outcome.owned.contains(file) && images_root.join(file).exists() {
            ledger.entries.insert(file.clone(), entry.clone());
        }
    }
    ledger
}

fn prune(
    course: &CompiledCourse,
    layout: &RepoLayout,
    written: &BTreeSet<PathBuf>,
    stale: Vec<String>,
    dry_run: bool,
) -> Result<PruneReport, PruneError> {
    let course_dir = layout.course_dir(&course.meta.slug);
    let mut protected = vec![layout.spec.clone(), layout.media_root.clone()];
    protected.extend(course.images().into_iter().map(|a| a.source.clone()));

    let plan = plan_prune(&PruneInput {
        course_dir: &course_dir,
        written,
        images_root: &layout.images_root,
        stale_variants: stale,
        protected,
    })?;
    tracing::info!(deletions = plan.len(), dry_run, "prune planned");
    execute_prune(&plan, dry_run)
}

/// Compile the specification at `layout.spec` into the Course Tree and image
/// variants, then prune what the specification no longer produces.
///
/// Media failures do not fail the run: they are returned in the report, and
/// [`RunReport::media_result`] turns them into an error.
pub fn generate(
    layout: &RepoLayout,
    config: &CompilerConfig,
    backend: &impl ImageBackend,
    options: &GenerateOptions,
    events: Option<Sender<VariantEvent>>,
    cancel: &Cancellation,
) -> Result<RunReport, PipelineError> {
    let mut run = Run::new(cancel);
    let spec = load_and_validate(&mut run, layout)?;

    run.advance(Stage::Transforming)?;
    let mut course = assign(spec);
    if let Some(url) = &options.repository_url {
        course.meta.repository = Some(url.clone());
    }
    check_variant_names(&course.images(), &config.images)
        .map_err(|report| run.fail(PipelineError::Validation(report)))?;
    let summary = CourseSummary::of(&course);
    tracing::info!(
        course = %summary.course,
        lessons = summary.lessons,
        items = summary.items,
        images = summary.images,
        "course compiled"
    );
    let previous = VariantLedger::load(&layout.images_root, &course.meta.slug);

    run.advance(Stage::Emitting)?;
    let (emitted, variants) = emit_and_render(&course, layout, config, backend, &previous, events)
        .map_err(|e| run.fail(e))?;

    run.advance(Stage::Pruning)?;
    let prune_report = if options.prune {
        let stale = stale_variants(&previous, &variants);
        let result = cancel
            .guarded(|| prune(&course, layout, &emitted.written, stale, options.dry_run))
            .ok_or(PipelineError::Aborted)
            .map_err(|e| run.fail(e))?;
        let report = result.map_err(|e| {
            run.fail(match e {
                PruneError::Safety(violations) => PipelineError::PruneSafety(violations),
                other => io_error(Stage::Pruning, other),
            })
        })?;
        Some(report)
    } else {
        tracing::info!("pruning disabled");
        None
    };

    let ledger = final_ledger(&previous, &variants, &layout.images_root);
    let ledger_written = ledger
        .save(&layout.images_root)
        .map_err(|e| run.fail(io_error(Stage::Pruning, e)))?;

    run.advance(Stage::Done)?;
    Ok(RunReport {
        summary,
        course_dir: layout.course_dir(&course.meta.slug),
        files_changed: emitted.changed,
        files_unchanged: emitted.unchanged,
        variants: variants.stats,
        ledger_written,
        failures: variants.failures,
        prune: prune_report,
    })
}

/// Load and validate only. Writes nothing.
pub fn check(layout: &RepoLayout, config: &CompilerConfig) -> Result<CourseSummary, PipelineError> {
    let spec = load_spec(&layout.spec, &layout.media_root)
        .map_err(|e| spec_failure(&layout.spec, e))?;
    let course = assign(spec);
    check_variant_names(&course.images(), &config.images).map_err(PipelineError::Validation)?;
    Ok(CourseSummary::of(&course))
}

/// Export the Course Tree of `course_slug` into its bundle directory.
pub fn export(layout: &RepoLayout, course_slug: &str) -> Result<ExportReport, PipelineError> {
    let cancel = Cancellation::new();
    let mut run = Run::new(&cancel);

    run.advance(Stage::Loading)?;
    let tree = load_course_tree(&layout.course_dir(course_slug), course_slug)
        .map_err(|e| run.fail(PipelineError::Export(e)))?;

    run.advance(Stage::Transforming)?;
    let bundle = build_bundle(&tree).map_err(|e| run.fail(PipelineError::Export(e)))?;

    run.advance(Stage::Emitting)?;
    let bundle_dir = layout.bundle_dir(course_slug);
    write_bundle(&bundle, &bundle_dir).map_err(|e| run.fail(PipelineError::Export(e)))?;

    run.advance(Stage::Done)?;
    Ok(ExportReport::new(course_slug, bundle_dir, bundle))
}
