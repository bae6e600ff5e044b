//! Bundle export.
//!
//! Reads a Course Tree back from disk and flattens it into the layout the
//! presentation layer loads:
//!
//! ```text
//! export/jp/
//! ├── manifest.json                 # course summary + categories → lessons
//! ├── challenges/hello.json         # {id, slug, title, challenges: [...]}
//! └── introductions/hello.json      # {id, slug, title, body}, lessons with an intro
//! ```
//!
//! Lessons are addressed by slug in one flat namespace, so two lessons with
//! the same slug (in different categories) fail the export. Identifiers and
//! challenge records are copied verbatim from the tree, never re-derived.
//!
//! Export is a clean regenerate: the bundle is assembled in a staging
//! directory beside the target and swapped in only when complete, so the
//! previous bundle either stays as it was or is replaced entirely.

use crate::emit::is_safe_component;
use crate::types::{
    CATEGORY_FILE, COURSE_FILE, CategoryRecord, ChallengeRecord, CourseRecord, EntryRef,
    ImageRecord, LESSON_FILE, Language, LessonRecord, License, RECORD_EXT,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const CHALLENGES_DIR: &str = "challenges";
pub const INTRODUCTIONS_DIR: &str = "introductions";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Course Tree file missing: {0}")]
    Missing(PathBuf),
    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid record {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("inconsistent record {path}: {message}")]
    Inconsistent { path: PathBuf, message: String },
    #[error("lesson slug {slug:?} used in both {first:?} and {second:?}")]
    DuplicateLesson {
        slug: String,
        first: String,
        second: String,
    },
    #[error("cannot serialize {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("cannot write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

// ============================================================================
// Course Tree, as read back from disk
// ============================================================================

#[derive(Debug, Clone)]
pub struct TreeLesson {
    pub record: LessonRecord,
    pub challenges: Vec<ChallengeRecord>,
}

#[derive(Debug, Clone)]
pub struct TreeCategory {
    pub record: CategoryRecord,
    pub lessons: Vec<TreeLesson>,
}

#[derive(Debug, Clone)]
pub struct CourseTree {
    pub course: CourseRecord,
    pub categories: Vec<TreeCategory>,
}

fn read_record<T: DeserializeOwned>(path: &Path) -> Result<T, ExportError> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ExportError::Missing(path.to_path_buf()));
        }
        Err(source) => {
            return Err(ExportError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_yaml::from_str(&content).map_err(|source| ExportError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve a child reference to a directory, refusing unsafe slugs.
fn child(dir: &Path, entry: &EntryRef, parent_file: &Path) -> Result<PathBuf, ExportError> {
    if !is_safe_component(&entry.slug) {
        return Err(ExportError::Inconsistent {
            path: parent_file.to_path_buf(),
            message: format!("unsafe slug {:?}", entry.slug),
        });
    }
    Ok(dir.join(&entry.slug))
}

fn check_ref(path: &Path, entry: &EntryRef, id: &str, slug: &str) -> Result<(), ExportError> {
    if entry.id != id || entry.slug != slug {
        return Err(ExportError::Inconsistent {
            path: path.to_path_buf(),
            message: format!(
                "referenced as {}/{} but record says {id}/{slug}",
                entry.id, entry.slug
            ),
        });
    }
    Ok(())
}

fn in_order(refs: &[EntryRef]) -> Vec<&EntryRef> {
    let mut sorted: Vec<&EntryRef> = refs.iter().collect();
    sorted.sort_by_key(|r| r.order);
    sorted
}

fn read_lesson(dir: &Path, entry: &EntryRef) -> Result<TreeLesson, ExportError> {
    let path = dir.join(LESSON_FILE);
    let record: LessonRecord = read_record(&path)?;
    check_ref(&path, entry, &record.id, &record.slug)?;

    let mut challenges = Vec::with_capacity(record.challenges.len());
    for c in in_order(&record.challenges) {
        if !is_safe_component(&c.slug) {
            return Err(ExportError::Inconsistent {
                path: path.clone(),
                message: format!("unsafe slug {:?}", c.slug),
            });
        }
        let file = dir.join(format!("{}.{}", c.slug, RECORD_EXT));
        let challenge: ChallengeRecord = read_record(&file)?;
        check_ref(&file, c, &challenge.id, &challenge.slug)?;
        challenges.push(challenge);
    }
    Ok(TreeLesson { record, challenges })
}

/// Read the full Course Tree rooted at `course_dir`, following references
/// from `_course.yaml` down. Every referenced file must exist and parse.
pub fn read_course_tree(course_dir: &Path) -> Result<CourseTree, ExportError> {
    let course_file = course_dir.join(COURSE_FILE);
    let course: CourseRecord = read_record(&course_file)?;

    let mut categories = Vec::with_capacity(course.categories.len());
    for cat_ref in in_order(&course.categories) {
        let cat_dir = child(course_dir, cat_ref, &course_file)?;
        let cat_file = cat_dir.join(CATEGORY_FILE);
        let record: CategoryRecord = read_record(&cat_file)?;
        check_ref(&cat_file, cat_ref, &record.id, &record.slug)?;

        let mut lessons = Vec::with_capacity(record.lessons.len());
        for lesson_ref in in_order(&record.lessons) {
            let lesson_dir = child(&cat_dir, lesson_ref, &cat_file)?;
            lessons.push(read_lesson(&lesson_dir, lesson_ref)?);
        }
        categories.push(TreeCategory { record, lessons });
    }
    Ok(CourseTree { course, categories })
}

// ============================================================================
// Bundle
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestCourse {
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub language: Language,
    pub from: Language,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub special_characters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestLesson {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub challenge_count: usize,
    pub has_introduction: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thumbnails: Vec<ImageRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestCategory {
    pub id: String,
    pub slug: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intro: Option<String>,
    pub lessons: Vec<ManifestLesson>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub course: ManifestCourse,
    pub categories: Vec<ManifestCategory>,
}

impl Manifest {
    /// `(category slug, lesson slug, lesson title)` in display order.
    pub fn lessons(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.categories.iter().flat_map(|c| {
            c.lessons
                .iter()
                .map(move |l| (c.slug.as_str(), l.slug.as_str(), l.title.as_str()))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonChallenges {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub challenges: Vec<ChallengeRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Introduction {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub body: String,
}

/// A fully assembled bundle: the manifest plus every file, relative to the
/// bundle directory.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub manifest: Manifest,
    pub files: Vec<(PathBuf, String)>,
}

fn to_json<T: Serialize>(path: PathBuf, value: &T) -> Result<(PathBuf, String), ExportError> {
    let mut json = serde_json::to_string_pretty(value).map_err(|source| ExportError::Json {
        path: path.clone(),
        source,
    })?;
    json.push('\n');
    Ok((path, json))
}

/// Flatten a Course Tree into a bundle. Pure: no filesystem access.
pub fn build_bundle(tree: &CourseTree) -> Result<Bundle, ExportError> {
    let course = &tree.course;
    let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
    let mut files = Vec::new();
    let mut categories = Vec::with_capacity(tree.categories.len());

    for category in &tree.categories {
        let mut lessons = Vec::with_capacity(category.lessons.len());
        for lesson in &category.lessons {
            let r = &lesson.record;
            if let Some(first) = seen.insert(&r.slug, &category.record.slug) {
                return Err(ExportError::DuplicateLesson {
                    slug: r.slug.clone(),
                    first: first.to_string(),
                    second: category.record.slug.clone(),
                });
            }

            files.push(to_json(
                Path::new(CHALLENGES_DIR).join(format!("{}.json", r.slug)),
                &LessonChallenges {
                    id: r.id.clone(),
                    slug: r.slug.clone(),
                    title: r.title.clone(),
                    challenges: lesson.challenges.clone(),
                },
            )?);
            if let Some(body) = &r.intro {
                files.push(to_json(
                    Path::new(INTRODUCTIONS_DIR).join(format!("{}.json", r.slug)),
                    &Introduction {
                        id: r.id.clone(),
                        slug: r.slug.clone(),
                        title: r.title.clone(),
                        body: body.clone(),
                    },
                )?);
            }

            lessons.push(ManifestLesson {
                id: r.id.clone(),
                slug: r.slug.clone(),
                title: r.title.clone(),
                challenge_count: lesson.challenges.len(),
                has_introduction: r.intro.is_some(),
                thumbnails: r.thumbnails.clone(),
            });
        }
        categories.push(ManifestCategory {
            id: category.record.id.clone(),
            slug: category.record.slug.clone(),
            title: category.record.title.clone(),
            intro: category.record.intro.clone(),
            lessons,
        });
    }

    let manifest = Manifest {
        course: ManifestCourse {
            slug: course.slug.clone(),
            title: course.title.clone(),
            description: course.description.clone(),
            language: course.language.clone(),
            from: course.from.clone(),
            license: course.license.clone(),
            repository: course.repository.clone(),
            special_characters: course.special_characters.clone(),
        },
        categories,
    };
    files.insert(0, to_json(PathBuf::from(MANIFEST_FILE), &manifest)?);
    Ok(Bundle { manifest, files })
}

/// Summary of a finished export.
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub course: String,
    pub bundle_dir: PathBuf,
    pub manifest: Manifest,
    pub files: usize,
}

impl ExportReport {
    pub fn new(course: &str, bundle_dir: PathBuf, bundle: Bundle) -> Self {
        Self {
            course: course.to_string(),
            bundle_dir,
            files: bundle.files.len(),
            manifest: bundle.manifest,
        }
    }

    pub fn lesson_count(&self) -> usize {
        self.manifest.categories.iter().map(|c| c.lessons.len()).sum()
    }

    pub fn challenge_count(&self) -> usize {
        self.manifest
            .categories
            .iter()
            .flat_map(|c| &c.lessons)
            .map(|l| l.challenge_count)
            .sum()
    }
}

fn write_err(path: &Path) -> impl FnOnce(io::Error) -> ExportError + '_ {
    move |source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    }
}

fn remove_if_exists(path: &Path) -> Result<(), ExportError> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(write_err(path)(e)),
        _ => Ok(()),
    }
}

/// Write `bundle` to `bundle_dir`, replacing any previous bundle.
///
/// Files are staged in a sibling `.<name>.staging` directory, which is then
/// swapped in, so a failed write leaves the previous bundle intact.
pub fn write_bundle(bundle: &Bundle, bundle_dir: &Path) -> Result<(), ExportError> {
    let (Some(parent), Some(name)) = (bundle_dir.parent(), bundle_dir.file_name()) else {
        return Err(ExportError::Inconsistent {
            path: bundle_dir.to_path_buf(),
            message: "bundle directory needs a parent".to_string(),
        });
    };
    let name = name.to_string_lossy();
    let staging = parent.join(format!(".{name}.staging"));
    let retired = parent.join(format!(".{name}.old"));

    remove_if_exists(&staging)?;
    for (rel, content) in &bundle.files {
        let path = staging.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err(parent))?;
        }
        fs::write(&path, content).map_err(write_err(&path))?;
    }
    tracing::debug!(path = %staging.display(), files = bundle.files.len(), "staged bundle");

    remove_if_exists(&retired)?;
    if bundle_dir.exists() {
        fs::rename(bundle_dir, &retired).map_err(write_err(bundle_dir))?;
    }
    fs::rename(&staging, bundle_dir).map_err(write_err(bundle_dir))?;
    remove_if_exists(&retired)?;
    tracing::info!(path = %bundle_dir.display(), files = bundle.files.len(), "exported bundle");
    Ok(())
}

/// Read the Course Tree of course `slug`, checking that it is the course
/// it claims to be.
pub fn load_course_tree(course_dir: &Path, slug: &str) -> Result<CourseTree, ExportError> {
    if !is_safe_component(slug) {
        return Err(ExportError::Inconsistent {
            path: course_dir.to_path_buf(),
            message: format!("unsafe course slug {slug:?}"),
        });
    }
    tracing::info!(course = slug, path = %course_dir.display(), "reading Course Tree");
    let tree = read_course_tree(course_dir)?;
    if tree.course.slug != slug {
        return Err(ExportError::Inconsistent {
            path: course_dir.join(COURSE_FILE),
            message: format!("course slug is {:?}, expected {slug:?}", tree.course.slug),
        });
    }
    Ok(tree)
}

/// Read a previously written manifest.
pub fn read_manifest(bundle_dir: &Path) -> Result<Manifest, ExportError> {
    let path = bundle_dir.join(MANIFEST_FILE);
    let content = fs::read_to_string(&path).map_err(|source| ExportError::Read {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ExportError::Json { path, source })
}
