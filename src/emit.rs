//! Course Tree emission.
//!
//! Renders a compiled course into the canonical YAML tree:
//!
//! ```text
//! courses/jp/
//! ├── _course.yaml              # course metadata + category refs
//! └── greetings/
//!     ├── _category.yaml        # id, slug, order, title, lesson refs
//!     └── hello/
//!         ├── _lesson.yaml      # id, slug, order, title, thumbnails, challenge refs
//!         └── konnichiha.yaml   # one challenge record per item
//! ```
//!
//! Rendering is split from writing: [`render_tree`] is a pure function from
//! the compiled course to `(relative path, bytes)` pairs, and
//! [`emit_course`] writes each file only if its bytes differ from what is
//! already on disk. Unrelated files under the course root are left alone;
//! removing them is the pruner's job.

use crate::config::ImagesConfig;
use crate::ident::{CompiledCourse, CompiledItem, CompiledLesson, ImageAsset};
use crate::imaging::variant_file_name;
use crate::types::{
    CATEGORY_FILE, COURSE_FILE, CategoryRecord, ChallengeRecord, CourseRecord, EntryRef,
    ImageRecord, LESSON_FILE, LessonRecord, RECORD_EXT,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmitError {
    #[error("cannot write {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("cannot serialize {path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("refusing to use {0:?} as a path component")]
    UnsafeName(String),
}

/// One rendered file, relative to the course root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub path: PathBuf,
    pub content: String,
}

/// Result of writing the tree.
#[derive(Debug, Clone, Default)]
pub struct EmitOutcome {
    /// Every file and directory the tree consists of, absolute.
    pub written: BTreeSet<PathBuf>,
    /// Files whose bytes actually changed on disk.
    pub changed: usize,
    pub unchanged: usize,
}

/// A slug is safe as a single path component when it is non-empty, made of
/// `[A-Za-z0-9_-]`, and does not start with `_` (reserved for metadata files).
pub fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('_')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn component(name: &str) -> Result<&str, EmitError> {
    if is_safe_component(name) {
        Ok(name)
    } else {
        Err(EmitError::UnsafeName(name.to_string()))
    }
}

fn entry_ref(assigned: &crate::ident::Assigned) -> EntryRef {
    EntryRef {
        id: assigned.id.clone(),
        slug: assigned.slug.clone(),
        order: assigned.order,
    }
}

fn image_record(asset: &ImageAsset, images: &ImagesConfig) -> ImageRecord {
    ImageRecord {
        name: asset.name.clone(),
        files: images
            .variants
            .iter()
            .map(|v| variant_file_name(&asset.name, &v.suffix, v.format))
            .collect(),
    }
}

fn to_yaml<T: Serialize>(path: &Path, value: &T) -> Result<RenderedFile, EmitError> {
    let content = serde_yaml::to_string(value).map_err(|source| EmitError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(RenderedFile {
        path: path.to_path_buf(),
        content,
    })
}

fn challenge_record(item: &CompiledItem, images: &ImagesConfig) -> ChallengeRecord {
    ChallengeRecord {
        id: item.assigned.id.clone(),
        slug: item.assigned.slug.clone(),
        order: item.assigned.order,
        kind: item.kind,
        prompt: item.prompt.clone(),
        answer: item.answer.clone(),
        alternatives: item.alternatives.clone(),
        image: item.image.as_ref().map(|a| image_record(a, images)),
    }
}

fn render_lesson(
    dir: &Path,
    lesson: &CompiledLesson,
    images: &ImagesConfig,
    out: &mut Vec<RenderedFile>,
) -> Result<(), EmitError> {
    let record = LessonRecord {
        id: lesson.assigned.id.clone(),
        slug: lesson.assigned.slug.clone(),
        order: lesson.assigned.order,
        title: lesson.title.clone(),
        intro: lesson.intro.clone(),
        thumbnails: lesson
            .thumbnails
            .iter()
            .map(|a| image_record(a, images))
            .collect(),
        challenges: lesson.items.iter().map(|i| entry_ref(&i.assigned)).collect(),
    };
    out.push(to_yaml(&dir.join(LESSON_FILE), &record)?);

    for item in &lesson.items {
        let name = format!("{}.{}", component(&item.assigned.slug)?, RECORD_EXT);
        out.push(to_yaml(&dir.join(name), &challenge_record(item, images))?);
    }
    Ok(())
}

/// Render the whole tree, in document order. Pure: no filesystem access.
pub fn render_tree(
    course: &CompiledCourse,
    images: &ImagesConfig,
) -> Result<Vec<RenderedFile>, EmitError> {
    let meta = &course.meta;
    let mut out = Vec::new();

    let record = CourseRecord {
        slug: meta.slug.clone(),
        title: meta.title.clone(),
        description: meta.description.clone(),
        language: meta.language.clone(),
        from: meta.from.clone(),
        license: meta.license.clone(),
        repository: meta.repository.clone(),
        special_characters: meta.special_characters.clone(),
        categories: course
            .categories
            .iter()
            .map(|c| entry_ref(&c.assigned))
            .collect(),
    };
    out.push(to_yaml(Path::new(COURSE_FILE), &record)?);

    for category in &course.categories {
        let cat_dir = PathBuf::from(component(&category.assigned.slug)?);
        let record = CategoryRecord {
            id: category.assigned.id.clone(),
            slug: category.assigned.slug.clone(),
            order: category.assigned.order,
            title: category.title.clone(),
            intro: category.intro.clone(),
            lessons: category
                .lessons
                .iter()
                .map(|l| entry_ref(&l.assigned))
                .collect(),
        };
        out.push(to_yaml(&cat_dir.join(CATEGORY_FILE), &record)?);

        for lesson in &category.lessons {
            let lesson_dir = cat_dir.join(component(&lesson.assigned.slug)?);
            render_lesson(&lesson_dir, lesson, images, &mut out)?;
        }
    }

    Ok(out)
}

/// Write `content` to `path` unless the file already holds exactly these
/// bytes. Returns whether a write happened.
pub fn write_if_changed(path: &Path, content: &[u8]) -> io::Result<bool> {
    if fs::read(path).is_ok_and(|existing| existing == content) {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(true)
}

/// Render the course and write it under `course_dir`.
pub fn emit_course(
    course: &CompiledCourse,
    course_dir: &Path,
    images: &ImagesConfig,
) -> Result<EmitOutcome, EmitError> {
    let files = render_tree(course, images)?;
    let mut outcome = EmitOutcome::default();
    outcome.written.insert(course_dir.to_path_buf());

    for file in files {
        let path = course_dir.join(&file.path);
        let changed = write_if_changed(&path, file.content.as_bytes()).map_err(|source| {
            EmitError::Io {
                path: path.clone(),
                source,
            }
        })?;
        if changed {
            tracing::info!(path = %path.display(), "wrote");
            outcome.changed += 1;
        } else {
            tracing::debug!(path = %path.display(), "unchanged");
            outcome.unchanged += 1;
        }
        // Record the file and every directory between it and the root.
        let mut dir = path.parent();
        while let Some(d) = dir {
            if d == course_dir || !outcome.written.insert(d.to_path_buf()) {
                break;
            }
            dir = d.parent();
        }
        outcome.written.insert(path);
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::assign;
    use crate::spec::parse_spec;
    use crate::types::ItemKind;
    use tempfile::TempDir;

    fn compiled(media: &Path) -> CompiledCourse {
        fs::write(media.join("hello.png"), b"x").unwrap();
        let doc = r#"{
            "course": {
                "slug": "jp", "title": "Japanese",
                "language": {"name": "Japanese", "bcp47": "ja"},
                "from": {"name": "English", "bcp47": "en"}
            },
            "categories": [{
                "title": "Greetings",
                "lessons": [{
                    "title": "Hello", "intro": "Say hi.",
                    "items": [
                        {"prompt": "こんにちは", "answer": "hello", "image": "hello.png", "image_id": "hello"},
                        {"prompt": "おはよう ございます", "answer": "good morning", "alternatives": ["morning"]}
                    ]
                }]
            }]
        }"#;
        assign(parse_spec(doc, media).unwrap())
    }

    #[test]
    fn render_tree_layout() {
        let tmp = TempDir::new().unwrap();
        let files = render_tree(&compiled(tmp.path()), &ImagesConfig::default()).unwrap();
        let paths: Vec<String> = files
            .iter()
            .map(|f| f.path.to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(paths.len(), 5);
        assert_eq!(paths[0], "_course.yaml");
        assert_eq!(paths[1], "greetings/_category.yaml");
        assert_eq!(paths[2], "greetings/hello/_lesson.yaml");
        assert!(paths[3].starts_with("greetings/hello/") && paths[3].ends_with(".yaml"));
        assert!(paths[4].starts_with("greetings/hello/"));
    }

    #[test]
    fn challenge_record_has_exact_fields() {
        let tmp = TempDir::new().unwrap();
        let files = render_tree(&compiled(tmp.path()), &ImagesConfig::default()).unwrap();
        let record: ChallengeRecord = serde_yaml::from_str(&files[3].content).unwrap();
        assert_eq!(record.prompt, "こんにちは");
        assert_eq!(record.answer, "hello");
        assert_eq!(record.kind, ItemKind::Word);
        assert_eq!(record.order, 0);
        let image = record.image.unwrap();
        assert_eq!(image.name, "jp_hello");
        assert_eq!(image.files, ["jp_hello.jpg", "jp_hello_tiny.jpg", "jp_hello_tinier.jpg"]);

        let phrase: ChallengeRecord = serde_yaml::from_str(&files[4].content).unwrap();
        assert_eq!(phrase.kind, ItemKind::Phrase);
        assert_eq!(phrase.alternatives, ["morning"]);
    }

    #[test]
    fn lesson_record_refs_in_order() {
        let tmp = TempDir::new().unwrap();
        let course = compiled(tmp.path());
        let files = render_tree(&course, &ImagesConfig::default()).unwrap();
        let lesson: LessonRecord = serde_yaml::from_str(&files[2].content).unwrap();
        assert_eq!(lesson.title, "Hello");
        assert_eq!(lesson.intro.as_deref(), Some("Say hi."));
        assert_eq!(lesson.challenges.len(), 2);
        assert_eq!(lesson.challenges[1].order, 1);
        assert_eq!(lesson.thumbnails.len(), 3);
        let items = &course.categories[0].lessons[0].items;
        assert_eq!(lesson.challenges[0].id, items[0].assigned.id);
    }

    #[test]
    fn render_is_deterministic() {
        let tmp = TempDir::new().unwrap();
        let course = compiled(tmp.path());
        let a = render_tree(&course, &ImagesConfig::default()).unwrap();
        let b = render_tree(&course, &ImagesConfig::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn emit_second_run_changes_nothing() {
        let tmp = TempDir::new().unwrap();
        let course = compiled(tmp.path());
        let root = tmp.path().join("courses/jp");

        let first = emit_course(&course, &root, &ImagesConfig::default()).unwrap();
        assert_eq!(first.changed, 5);
        let second = emit_course(&course, &root, &ImagesConfig::default()).unwrap();
        assert_eq!(second.changed, 0);
        assert_eq!(second.unchanged, 5);
        assert_eq!(first.written, second.written);
    }

    #[test]
    fn emit_records_files_and_directories() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("courses/jp");
        let outcome = emit_course(&compiled(tmp.path()), &root, &ImagesConfig::default()).unwrap();
        assert!(outcome.written.contains(&root));
        assert!(outcome.written.contains(&root.join("greetings")));
        assert!(outcome.written.contains(&root.join("greetings/hello")));
        assert!(outcome.written.contains(&root.join("greetings/hello/_lesson.yaml")));
        // root + 2 dirs + 5 files
        assert_eq!(outcome.written.len(), 8);
    }

    #[test]
    fn emit_leaves_unrelated_files() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("courses/jp");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("notes.txt"), "keep").unwrap();
        emit_course(&compiled(tmp.path()), &root, &ImagesConfig::default()).unwrap();
        assert_eq!(fs::read_to_string(root.join("notes.txt")).unwrap(), "keep");
    }

    #[test]
    fn write_if_changed_compares_bytes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a/b.yaml");
        assert!(write_if_changed(&path, b"one").unwrap());
        assert!(!write_if_changed(&path, b"one").unwrap());
        assert!(write_if_changed(&path, b"two").unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"two");
    }

    #[test]
    fn unsafe_components_rejected() {
        assert!(is_safe_component("hello-2"));
        assert!(!is_safe_component(""));
        assert!(!is_safe_component(".."));
        assert!(!is_safe_component("a/b"));
        assert!(!is_safe_component("_course"));
        assert!(matches!(component("../x"), Err(EmitError::UnsafeName(_))));
    }
}
