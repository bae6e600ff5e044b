//! Stale-artifact pruning.
//!
//! After a run has emitted the Course Tree and rendered variants, anything
//! left over from earlier runs that the current specification no longer
//! produces is deleted, so the generated output is always a function of the
//! current specification alone.
//!
//! ## What is considered
//!
//! - **Course root** (`<courses>/<course-slug>/`): the whole directory is
//!   generated, so every file or directory under it that was not written
//!   this run is a candidate.
//! - **Image root**: shared with hand-authored files and other courses, so
//!   only files recorded in this course's ledger and no longer owned are
//!   candidates. Nothing else in the image root is ever looked at.
//!
//! ## Safety
//!
//! Deletions are computed as a set difference, then every candidate is
//! checked before anything is touched:
//!
//! 1. it lies strictly inside its designated root,
//! 2. its path relative to that root has only normal components (no `..`,
//!    no root or prefix),
//! 3. no protected path (the specification, the media root, any source
//!    image) is the candidate or lies inside it.
//!
//! A single violation fails the whole plan with [`PruneError::Safety`] and
//! nothing is deleted. The checks are lexical and run on absolute paths.
//!
//! ## Execution
//!
//! The full plan is logged before the first deletion. Files go first, then
//! directories deepest-first. With `dry_run` the plan is only logged.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum PruneError {
    #[error("prune refused, nothing was deleted:\n  {}", .0.join("\n  "))]
    Safety(Vec<String>),
    #[error("cannot prune {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryKind {
    File,
    Dir,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deletion {
    pub path: PathBuf,
    pub kind: EntryKind,
}

/// Ordered, safety-checked list of deletions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrunePlan {
    pub deletions: Vec<Deletion>,
}

impl PrunePlan {
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.deletions.len()
    }
}

/// Inputs to [`plan_prune`].
#[derive(Debug, Clone)]
pub struct PruneInput<'a> {
    /// The course's generated root.
    pub course_dir: &'a Path,
    /// Every path (file or directory) written to the course root this run.
    pub written: &'a BTreeSet<PathBuf>,
    pub images_root: &'a Path,
    /// Ledger file names (relative to `images_root`) no longer owned.
    pub stale_variants: Vec<String>,
    /// Paths that must survive no matter what.
    pub protected: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub deleted: Vec<PathBuf>,
    pub dry_run: bool,
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Drop `.` components and resolve nothing else; keeps `..` for the check.
fn lexical(path: &Path) -> PathBuf {
    absolute(path)
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Why `candidate` may not be deleted, if anything.
fn check_candidate(candidate: &Path, root: &Path, protected: &[PathBuf]) -> Option<String> {
    let Ok(rel) = candidate.strip_prefix(root) else {
        return Some(format!(
            "{} is outside generated root {}",
            candidate.display(),
            root.display()
        ));
    };
    if rel.as_os_str().is_empty() {
        return Some(format!("{} is the generated root itself", candidate.display()));
    }
    if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
        return Some(format!(
            "{} escapes generated root {}",
            candidate.display(),
            root.display()
        ));
    }
    protected
        .iter()
        .find(|p| p.starts_with(candidate))
        .map(|p| format!("{} would delete protected {}", candidate.display(), p.display()))
}

/// Compute and safety-check the deletions for one course.
pub fn plan_prune(input: &PruneInput<'_>) -> Result<PrunePlan, PruneError> {
    let course_dir = lexical(input.course_dir);
    let images_root = lexical(input.images_root);
    let written: BTreeSet<PathBuf> = input.written.iter().map(|p| lexical(p)).collect();
    let protected: Vec<PathBuf> = input.protected.iter().map(|p| lexical(p)).collect();

    let mut candidates: Vec<(Deletion, &Path)> = Vec::new();

    if course_dir.is_dir() {
        for entry in WalkDir::new(&course_dir).min_depth(1).follow_links(false) {
            let entry = entry.map_err(|e| PruneError::Io {
                path: e.path().map(Path::to_path_buf).unwrap_or_else(|| course_dir.clone()),
                source: e.into_io_error().unwrap_or_else(|| io::Error::other("walk failed")),
            })?;
            let path = entry.path().to_path_buf();
            if written.contains(&path) {
                continue;
            }
            let kind = if entry.file_type().is_dir() {
                EntryKind::Dir
            } else {
                EntryKind::File
            };
            candidates.push((Deletion { path, kind }, course_dir.as_path()));
        }
    }

    for file in &input.stale_variants {
        let path = images_root.join(file);
        if path.symlink_metadata().is_ok() {
            candidates.push((
                Deletion {
                    path,
                    kind: EntryKind::File,
                },
                images_root.as_path(),
            ));
        }
    }

    let violations: Vec<String> = candidates
        .iter()
        .filter_map(|(d, root)| check_candidate(&d.path, root, &protected))
        .collect();
    if !violations.is_empty() {
        return Err(PruneError::Safety(violations));
    }

    let mut deletions: Vec<Deletion> = candidates.into_iter().map(|(d, _)| d).collect();
    deletions.sort_by(|a, b| {
        a.kind.cmp(&b.kind).then_with(|| match a.kind {
            EntryKind::File => a.path.cmp(&b.path),
            EntryKind::Dir => b
                .path
                .components()
                .count()
                .cmp(&a.path.components().count())
                .then_with(|| a.path.cmp(&b.path)),
        })
    });
    Ok(PrunePlan { deletions })
}

/// Log the whole plan, then (unless `dry_run`) delete it in order.
pub fn execute_prune(plan: &PrunePlan, dry_run: bool) -> Result<PruneReport, PruneError> {
    for d in &plan.deletions {
        if dry_run {
            tracing::info!(path = %d.path.display(), kind = ?d.kind, "would delete");
        } else {
            tracing::warn!(path = %d.path.display(), kind = ?d.kind, "deleting");
        }
    }

    let mut report = PruneReport {
        deleted: Vec::new(),
        dry_run,
    };
    if dry_run {
        report.deleted = plan.deletions.iter().map(|d| d.path.clone()).collect();
        return Ok(report);
    }

    for d in &plan.deletions {
        let result = match d.kind {
            EntryKind::File => fs::remove_file(&d.path),
            EntryKind::Dir => fs::remove_dir(&d.path),
        };
        match result {
            Ok(()) => report.deleted.push(d.path.clone()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(PruneError::Io {
                    path: d.path.clone(),
                    source,
                });
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        tmp: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tmp: TempDir::new().unwrap(),
            }
        }

        fn course(&self) -> PathBuf {
            self.tmp.path().join("courses/jp")
        }

        fn images(&self) -> PathBuf {
            self.tmp.path().join("images")
        }

        fn touch(&self, path: &Path) {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "x").unwrap();
        }

        fn input<'a>(&'a self, course: &'a Path, images: &'a Path, written: &'a BTreeSet<PathBuf>) -> PruneInput<'a> {
            PruneInput {
                course_dir: course,
                written,
                images_root: images,
                stale_variants: Vec::new(),
                protected: vec![self.tmp.path().join("course.json")],
            }
        }
    }

    fn set(paths: &[PathBuf]) -> BTreeSet<PathBuf> {
        paths.iter().cloned().collect()
    }

    #[test]
    fn removed_lesson_directory_planned_deepest_first() {
        let fx = Fixture::new();
        let course = fx.course();
        let images = fx.images();
        let keep = course.join("greetings/hello/_lesson.yaml");
        let stale = course.join("greetings/bye/_lesson.yaml");
        let stale_item = course.join("greetings/bye/sayonara.yaml");
        fx.touch(&keep);
        fx.touch(&stale);
        fx.touch(&stale_item);

        let written = set(&[
            course.join("greetings"),
            course.join("greetings/hello"),
            keep.clone(),
        ]);
        let plan = plan_prune(&fx.input(&course, &images, &written)).unwrap();

        let paths: Vec<&Path> = plan.deletions.iter().map(|d| d.path.as_path()).collect();
        assert_eq!(
            paths,
            [
                lexical(&stale).as_path(),
                lexical(&stale_item).as_path(),
                lexical(&course.join("greetings/bye")).as_path(),
            ]
        );
    }

    #[test]
    fn nested_stale_directories_removed_children_first() {
        let fx = Fixture::new();
        let course = fx.course();
        let images = fx.images();
        fx.touch(&course.join("old/deeper/x.yaml"));
        let written = BTreeSet::new();
        let plan = plan_prune(&fx.input(&course, &images, &written)).unwrap();
        let dirs: Vec<&Path> = plan
            .deletions
            .iter()
            .filter(|d| d.kind == EntryKind::Dir)
            .map(|d| d.path.as_path())
            .collect();
        assert_eq!(
            dirs,
            [
                lexical(&course.join("old/deeper")).as_path(),
                lexical(&course.join("old")).as_path()
            ]
        );

        execute_prune(&plan, false).unwrap();
        assert!(course.exists());
        assert!(!course.join("old").exists());
    }

    #[test]
    fn only_ledger_files_considered_in_image_root() {
        let fx = Fixture::new();
        let course = fx.course();
        let images = fx.images();
        fx.touch(&images.join("jp_old.jpg"));
        fx.touch(&images.join("logo.png"));
        fx.touch(&images.join("it_other.jpg"));

        let written = BTreeSet::new();
        let mut input = fx.input(&course, &images, &written);
        input.stale_variants = vec!["jp_old.jpg".into(), "jp_already_gone.jpg".into()];
        let plan = plan_prune(&input).unwrap();
        assert_eq!(plan.len(), 1);

        let report = execute_prune(&plan, false).unwrap();
        assert_eq!(report.deleted.len(), 1);
        assert!(!images.join("jp_old.jpg").exists());
        assert!(images.join("logo.png").exists());
        assert!(images.join("it_other.jpg").exists());
    }

    #[test]
    fn traversal_in_ledger_is_refused() {
        let fx = Fixture::new();
        let course = fx.course();
        let images = fx.images();
        fx.touch(&fx.tmp.path().join("precious.txt"));
        fs::create_dir_all(&images).unwrap();

        let written = BTreeSet::new();
        let mut input = fx.input(&course, &images, &written);
        input.stale_variants = vec!["../precious.txt".into()];
        let err = plan_prune(&input).unwrap_err();
        assert!(matches!(err, PruneError::Safety(ref v) if v.len() == 1), "{err}");
        assert!(fx.tmp.path().join("precious.txt").exists());
    }

    #[test]
    fn protected_path_inside_candidate_is_refused() {
        let fx = Fixture::new();
        let course = fx.course();
        let images = fx.images();
        let media = course.join("media");
        fx.touch(&media.join("cat.png"));

        let written = BTreeSet::new();
        let mut input = fx.input(&course, &images, &written);
        input.protected.push(media.clone());
        let err = plan_prune(&input).unwrap_err();
        assert!(matches!(err, PruneError::Safety(_)));
        assert!(media.join("cat.png").exists());
    }

    #[test]
    fn dry_run_deletes_nothing() {
        let fx = Fixture::new();
        let course = fx.course();
        let images = fx.images();
        let stale = course.join("stale.yaml");
        fx.touch(&stale);

        let written = BTreeSet::new();
        let plan = plan_prune(&fx.input(&course, &images, &written)).unwrap();
        let report = execute_prune(&plan, true).unwrap();
        assert!(report.dry_run);
        assert_eq!(report.deleted, vec![lexical(&stale)]);
        assert!(stale.exists());
    }

    #[test]
    fn missing_course_dir_plans_nothing() {
        let fx = Fixture::new();
        let course = fx.course();
        let images = fx.images();
        let written = BTreeSet::new();
        assert!(plan_prune(&fx.input(&course, &images, &written)).unwrap().is_empty());
    }

    #[test]
    fn check_candidate_rules() {
        let root = Path::new("/r/courses/jp");
        let protected = vec![PathBuf::from("/r/course.json")];
        assert!(check_candidate(Path::new("/r/courses/jp/a.yaml"), root, &protected).is_none());
        assert!(check_candidate(root, root, &protected).is_some());
        assert!(check_candidate(Path::new("/r/other"), root, &protected).is_some());
        assert!(check_candidate(Path::new("/r/courses/jp/../../x"), root, &protected).is_some());
        assert!(check_candidate(Path::new("/r/courses/jp/a"), root, &[PathBuf::from("/r/courses/jp/a/b.png")]).is_some());
    }
}
