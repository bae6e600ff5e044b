//! Specification document loading and validation.
//!
//! The specification is a single JSON document authored by hand (or by the
//! course editor). Loading happens in two steps:
//!
//! 1. **Parse** into loosely-typed `Raw*` structs where every field is
//!    optional. A document that is not well-formed JSON, or whose values have
//!    the wrong JSON type, fails here with the parser's line and column.
//! 2. **Validate** the raw tree into a [`CourseSpec`]. This pass is total: it
//!    walks the whole document and collects every violation (missing fields,
//!    unresolvable images, duplicate siblings) into one [`ValidationReport`]
//!    instead of stopping at the first, so an author can fix everything in a
//!    single edit cycle.
//!
//! Nothing is written to disk by this module.
//!
//! ## Field aliases
//!
//! Documents written by the existing editor use `name`/`notes`/`ja`/`it`.
//! These are accepted as aliases for `title`/`intro`/`prompt`/`answer`.

use crate::types::{Language, License};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpecError {
    #[error("cannot read specification {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("specification {path} is not well-formed: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{0}")]
    Invalid(ValidationReport),
}

// ============================================================================
// Raw document (as authored)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct RawDocument {
    #[serde(default)]
    course: Option<RawCourse>,
    #[serde(default)]
    categories: Option<Vec<RawCategory>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCourse {
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    language: Option<RawLanguage>,
    #[serde(default)]
    from: Option<RawLanguage>,
    #[serde(default)]
    license: Option<RawLicense>,
    #[serde(default)]
    repository: Option<String>,
    #[serde(default)]
    special_characters: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLanguage {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    bcp47: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLicense {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    short: Option<String>,
    #[serde(default)]
    link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCategory {
    #[serde(default, alias = "name")]
    title: Option<String>,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default, alias = "notes")]
    intro: Option<String>,
    #[serde(default)]
    lessons: Option<Vec<RawLesson>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLesson {
    #[serde(default, alias = "name")]
    title: Option<String>,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default, alias = "notes")]
    intro: Option<String>,
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    items: Option<Vec<RawItem>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawItem {
    #[serde(default, alias = "ja")]
    prompt: Option<String>,
    #[serde(default, alias = "it")]
    answer: Option<String>,
    #[serde(default)]
    alternatives: Vec<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    image_id: Option<String>,
    #[serde(default)]
    key: Option<String>,
}

// ============================================================================
// Validated specification
// ============================================================================

/// A fully validated specification. Every image reference carries an
/// absolute path to a readable source file.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseSpec {
    pub meta: CourseMeta,
    pub categories: Vec<CategorySpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CourseMeta {
    pub slug: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub language: Language,
    pub from: Language,
    pub license: Option<License>,
    pub repository: Option<String>,
    pub special_characters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategorySpec {
    pub title: String,
    pub key: Option<String>,
    pub slug: Option<String>,
    pub intro: Option<String>,
    pub lessons: Vec<LessonSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LessonSpec {
    pub title: String,
    pub key: Option<String>,
    pub slug: Option<String>,
    pub intro: Option<String>,
    pub images: Vec<MediaRef>,
    pub items: Vec<ItemSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemSpec {
    pub prompt: String,
    pub answer: String,
    pub alternatives: Vec<String>,
    pub image: Option<MediaRef>,
    pub key: Option<String>,
}

/// A resolved reference to a source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    /// The reference exactly as written in the document (trimmed).
    pub reference: String,
    /// Explicit output name component, if the author chose one.
    pub image_id: Option<String>,
    /// Absolute path of the source image.
    pub source: PathBuf,
}

impl CategorySpec {
    /// The identity-bearing field: explicit key, else title.
    pub fn identity(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.title)
    }
}

impl LessonSpec {
    pub fn identity(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.title)
    }
}

impl ItemSpec {
    pub fn identity(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.prompt)
    }
}

// ============================================================================
// Validation report
// ============================================================================

/// A single broken rule, located in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Human-readable location, e.g. `categories[0] "Greetings" > lessons[1] "Hello"`.
    pub location: String,
    pub message: String,
}

/// Every violation found in one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub(crate) fn push(&mut self, location: &str, message: impl Into<String>) {
        self.violations.push(Violation {
            location: location.to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "specification has {} validation error(s)",
            self.violations.len()
        )?;
        for v in &self.violations {
            write!(f, "\n  {}: {}", v.location, v.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationReport {}

// ============================================================================
// Loading
// ============================================================================

/// Load and validate the specification at `path`, resolving relative image
/// references against `media_root`.
pub fn load_spec(path: &Path, media_root: &Path) -> Result<CourseSpec, SpecError> {
    let content = fs::read_to_string(path).map_err(|source| SpecError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_spec(&content, media_root).map_err(|e| match e {
        SpecError::Parse { source, .. } => SpecError::Parse {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })
}

/// Parse and validate a specification held in memory.
pub fn parse_spec(content: &str, media_root: &Path) -> Result<CourseSpec, SpecError> {
    let raw: RawDocument = serde_json::from_str(content).map_err(|source| SpecError::Parse {
        path: PathBuf::new(),
        source,
    })?;
    let mut report = ValidationReport::default();
    let spec = validate(raw, media_root, &mut report);
    check_duplicates(&spec, &mut report);
    if report.is_empty() {
        Ok(spec)
    } else {
        Err(SpecError::Invalid(report))
    }
}

/// Lowercase slug form accepted for explicit course and entity slugs.
pub fn is_slug(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

fn is_image_id(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Trimmed, non-empty string or `None`.
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn label(title: Option<&str>) -> String {
    match title {
        Some(t) => format!(" {t:?}"),
        None => String::new(),
    }
}

fn validate(raw: RawDocument, media_root: &Path, report: &mut ValidationReport) -> CourseSpec {
    let meta = validate_course(raw.course, report);

    let raw_categories = raw.categories.unwrap_or_default();
    if raw_categories.is_empty() {
        report.push("categories", "at least one category is required");
    }

    let categories = raw_categories
        .into_iter()
        .enumerate()
        .map(|(ci, cat)| validate_category(ci, cat, media_root, report))
        .collect();

    CourseSpec { meta, categories }
}

fn validate_course(raw: Option<RawCourse>, report: &mut ValidationReport) -> CourseMeta {
    let raw = raw.unwrap_or_else(|| {
        report.push("course", "the course object is required");
        RawCourse::default()
    });

    let slug = non_empty(raw.slug).unwrap_or_default();
    if slug.is_empty() {
        report.push("course.slug", "required");
    } else if !is_slug(&slug) {
        report.push(
            "course.slug",
            format!("must be lowercase slug form [a-z0-9][a-z0-9_-]*, got {slug:?}"),
        );
    }

    let language = validate_language("course.language", raw.language, report);
    let from = validate_language("course.from", raw.from, report);

    let license = raw.license.map(|l| {
        let name = non_empty(l.name);
        let short = non_empty(l.short);
        let link = non_empty(l.link);
        for (field, value) in [("name", &name), ("short", &short), ("link", &link)] {
            if value.is_none() {
                report.push(&format!("course.license.{field}"), "required");
            }
        }
        License {
            name: name.unwrap_or_default(),
            short: short.unwrap_or_default(),
            link: link.unwrap_or_default(),
        }
    });

    CourseMeta {
        slug,
        title: non_empty(raw.title),
        description: non_empty(raw.description),
        language,
        from,
        license,
        repository: non_empty(raw.repository),
        special_characters: raw.special_characters,
    }
}

fn validate_language(
    location: &str,
    raw: Option<RawLanguage>,
    report: &mut ValidationReport,
) -> Language {
    let Some(raw) = raw else {
        report.push(location, "required");
        return Language::default();
    };
    let name = non_empty(raw.name);
    let bcp47 = non_empty(raw.bcp47);
    if name.is_none() {
        report.push(&format!("{location}.name"), "required");
    }
    if bcp47.is_none() {
        report.push(&format!("{location}.bcp47"), "required");
    }
    Language {
        name: name.unwrap_or_default(),
        bcp47: bcp47.unwrap_or_default(),
    }
}

fn validate_explicit_slug(location: &str, slug: &Option<String>, report: &mut ValidationReport) {
    if let Some(slug) = slug
        && !is_slug(slug)
    {
        report.push(
            location,
            format!("slug must be lowercase slug form, got {slug:?}"),
        );
    }
}

fn validate_category(
    ci: usize,
    raw: RawCategory,
    media_root: &Path,
    report: &mut ValidationReport,
) -> CategorySpec {
    let title = non_empty(raw.title);
    let location = format!("categories[{ci}]{}", label(title.as_deref()));
    if title.is_none() {
        report.push(&location, "title is required");
    }
    let slug = non_empty(raw.slug);
    validate_explicit_slug(&location, &slug, report);

    let raw_lessons = raw.lessons.unwrap_or_default();
    if raw_lessons.is_empty() {
        report.push(&location, "at least one lesson is required");
    }
    let lessons = raw_lessons
        .into_iter()
        .enumerate()
        .map(|(li, lesson)| validate_lesson(&location, li, lesson, media_root, report))
        .collect();

    CategorySpec {
        title: title.unwrap_or_default(),
        key: non_empty(raw.key),
        slug,
        intro: non_empty(raw.intro),
        lessons,
    }
}

fn validate_lesson(
    parent: &str,
    li: usize,
    raw: RawLesson,
    media_root: &Path,
    report: &mut ValidationReport,
) -> LessonSpec {
    let title = non_empty(raw.title);
    let location = format!("{parent} > lessons[{li}]{}", label(title.as_deref()));
    if title.is_none() {
        report.push(&location, "title is required");
    }
    let slug = non_empty(raw.slug);
    validate_explicit_slug(&location, &slug, report);

    let images = raw
        .images
        .into_iter()
        .filter_map(|reference| resolve_media(&location, reference, None, media_root, report))
        .collect();

    let raw_items = raw.items.unwrap_or_default();
    if raw_items.is_empty() {
        report.push(&location, "at least one item is required");
    }
    let items = raw_items
        .into_iter()
        .enumerate()
        .map(|(ii, item)| validate_item(&location, ii, item, media_root, report))
        .collect();

    LessonSpec {
        title: title.unwrap_or_default(),
        key: non_empty(raw.key),
        slug,
        intro: non_empty(raw.intro),
        images,
        items,
    }
}

fn validate_item(
    parent: &str,
    ii: usize,
    raw: RawItem,
    media_root: &Path,
    report: &mut ValidationReport,
) -> ItemSpec {
    let prompt = non_empty(raw.prompt);
    let location = format!("{parent} > items[{ii}]{}", label(prompt.as_deref()));
    if prompt.is_none() {
        report.push(&location, "prompt is required");
    }
    let answer = non_empty(raw.answer);
    if answer.is_none() {
        report.push(&location, "answer is required");
    }

    let image_id = non_empty(raw.image_id);
    if let Some(id) = &image_id
        && !is_image_id(id)
    {
        report.push(
            &location,
            format!("image_id {id:?} may only contain letters, digits, '_' and '-'"),
        );
    }
    let image = non_empty(raw.image).and_then(|reference| {
        resolve_media(&location, reference, image_id.clone(), media_root, report)
    });

    ItemSpec {
        prompt: prompt.unwrap_or_default(),
        answer: answer.unwrap_or_default(),
        alternatives: raw
            .alternatives
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect(),
        image,
        key: non_empty(raw.key),
    }
}

/// Resolve an image reference to a readable source file.
///
/// Absolute references are used as-is; relative ones are joined onto
/// `media_root`. A reference that does not name a readable regular file is a
/// validation error.
fn resolve_media(
    location: &str,
    reference: String,
    image_id: Option<String>,
    media_root: &Path,
    report: &mut ValidationReport,
) -> Option<MediaRef> {
    let reference = reference.trim().to_string();
    if reference.is_empty() {
        return None;
    }
    let candidate = Path::new(&reference);
    let path = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        media_root.join(candidate)
    };

    let readable = fs::metadata(&path).map(|m| m.is_file()).unwrap_or(false)
        && fs::File::open(&path).is_ok();
    if !readable {
        report.push(
            location,
            format!(
                "image {reference:?} does not resolve to a readable file ({})",
                path.display()
            ),
        );
        return None;
    }

    let source = std::path::absolute(&path).unwrap_or(path);
    Some(MediaRef {
        reference,
        image_id,
        source,
    })
}

/// Flag siblings whose identity-bearing fields are byte-identical, and
/// explicit `image_id`s reused for different source files.
fn check_duplicates(spec: &CourseSpec, report: &mut ValidationReport) {
    let mut image_ids: HashMap<&str, &Path> = HashMap::new();
    let mut categories: HashMap<&str, usize> = HashMap::new();
    for (ci, cat) in spec.categories.iter().enumerate() {
        let location = format!("categories[{ci}]{}", label(Some(&cat.title)));
        if let Some(first) = categories.insert(cat.identity(), ci) {
            report.push(
                &location,
                format!(
                    "duplicates categories[{first}] (identity {:?})",
                    cat.identity()
                ),
            );
        }

        let mut lessons: HashMap<&str, usize> = HashMap::new();
        for (li, lesson) in cat.lessons.iter().enumerate() {
            let lesson_location = format!("{location} > lessons[{li}]{}", label(Some(&lesson.title)));
            if let Some(first) = lessons.insert(lesson.identity(), li) {
                report.push(
                    &lesson_location,
                    format!(
                        "duplicates lessons[{first}] (identity {:?})",
                        lesson.identity()
                    ),
                );
            }

            let mut items: HashMap<&str, usize> = HashMap::new();
            for (ii, item) in lesson.items.iter().enumerate() {
                let item_location =
                    format!("{lesson_location} > items[{ii}]{}", label(Some(&item.prompt)));
                if let Some(first) = items.insert(item.identity(), ii) {
                    report.push(
                        &item_location,
                        format!(
                            "duplicates items[{first}] (identity {:?})",
                            item.identity()
                        ),
                    );
                }
                if let Some(image) = &item.image
                    && let Some(id) = image.image_id.as_deref()
                {
                    match image_ids.get(id) {
                        Some(source) if *source != image.source.as_path() => report.push(
                            &item_location,
                            format!(
                                "image_id {id:?} is already used for {}",
                                source.display()
                            ),
                        ),
                        Some(_) => {}
                        None => {
                            image_ids.insert(id, &image.source);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn media_dir() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("hello.png"), b"not decoded here").unwrap();
        tmp
    }

    const MINIMAL: &str = r#"{
        "course": {
            "slug": "jp",
            "language": {"name": "Japanese", "bcp47": "ja"},
            "from": {"name": "English", "bcp47": "en"}
        },
        "categories": [{
            "title": "Greetings",
            "lessons": [{
                "title": "Hello",
                "items": [{"prompt": "こんにちは", "answer": "hello", "image": "hello.png"}]
            }]
        }]
    }"#;

    fn violations(err: SpecError) -> Vec<Violation> {
        match err {
            SpecError::Invalid(report) => report.violations,
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn minimal_document_validates() {
        let media = media_dir();
        let spec = parse_spec(MINIMAL, media.path()).unwrap();
        assert_eq!(spec.meta.slug, "jp");
        assert_eq!(spec.categories.len(), 1);
        let item = &spec.categories[0].lessons[0].items[0];
        assert_eq!(item.prompt, "こんにちは");
        assert_eq!(item.answer, "hello");
        let image = item.image.as_ref().unwrap();
        assert_eq!(image.reference, "hello.png");
        assert!(image.source.is_absolute());
        assert!(image.source.ends_with("hello.png"));
    }

    #[test]
    fn editor_aliases_accepted() {
        let media = media_dir();
        let doc = r#"{
            "course": {
                "slug": "jp-it",
                "language": {"name": "Japanese", "bcp47": "ja"},
                "from": {"name": "Italian", "bcp47": "it"}
            },
            "categories": [{
                "name": "Saluti", "slug": "saluti",
                "lessons": [{
                    "name": "Ciao", "notes": "Basic greetings",
                    "items": [{"ja": "おはよう", "it": "buongiorno"}]
                }]
            }]
        }"#;
        let spec = parse_spec(doc, media.path()).unwrap();
        let lesson = &spec.categories[0].lessons[0];
        assert_eq!(spec.categories[0].title, "Saluti");
        assert_eq!(lesson.title, "Ciao");
        assert_eq!(lesson.intro.as_deref(), Some("Basic greetings"));
        assert_eq!(lesson.items[0].answer, "buongiorno");
        assert!(lesson.items[0].image.is_none());
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let media = media_dir();
        let err = parse_spec("{ \"course\": ", media.path()).unwrap_err();
        assert!(matches!(err, SpecError::Parse { .. }));
    }

    #[test]
    fn missing_image_names_item_and_path() {
        let media = media_dir();
        let doc = MINIMAL.replace("hello.png", "missing.png");
        let v = violations(parse_spec(&doc, media.path()).unwrap_err());
        assert_eq!(v.len(), 1);
        assert!(v[0].location.contains("items[0]"), "{:?}", v[0]);
        assert!(v[0].location.contains("こんにちは"), "{:?}", v[0]);
        assert!(v[0].message.contains("missing.png"), "{:?}", v[0]);
    }

    #[test]
    fn directory_is_not_a_readable_image() {
        let media = media_dir();
        fs::create_dir(media.path().join("dir.png")).unwrap();
        let doc = MINIMAL.replace("hello.png", "dir.png");
        let v = violations(parse_spec(&doc, media.path()).unwrap_err());
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn validation_reports_every_violation() {
        let media = media_dir();
        let doc = r#"{
            "course": {"slug": "Bad Slug", "language": {"name": "Japanese"}},
            "categories": [{
                "title": "A",
                "lessons": [
                    {"title": "L1", "items": [{"prompt": "x"}, {"answer": "y", "image": "nope.png"}]},
                    {"title": "", "items": []}
                ]
            }, {"lessons": []}]
        }"#;
        let v = violations(parse_spec(doc, media.path()).unwrap_err());
        let rendered: Vec<String> = v
            .iter()
            .map(|v| format!("{}: {}", v.location, v.message))
            .collect();

        let expect = [
            "course.slug: must be lowercase",
            "course.language.bcp47: required",
            "course.from: required",
            "items[0] \"x\": answer is required",
            "items[1]: prompt is required",
            "nope.png",
            "lessons[1]: title is required",
            "lessons[1]: at least one item is required",
            "categories[1]: title is required",
            "categories[1]: at least one lesson is required",
        ];
        for needle in expect {
            assert!(
                rendered.iter().any(|r| r.contains(needle)),
                "missing {needle:?} in {rendered:#?}"
            );
        }
    }

    #[test]
    fn duplicate_siblings_flagged() {
        let media = media_dir();
        let doc = r#"{
            "course": {
                "slug": "jp",
                "language": {"name": "Japanese", "bcp47": "ja"},
                "from": {"name": "English", "bcp47": "en"}
            },
            "categories": [{
                "title": "Greetings",
                "lessons": [
                    {"title": "Hello", "items": [
                        {"prompt": "はい", "answer": "yes"},
                        {"prompt": "はい", "answer": "yes"}
                    ]},
                    {"title": "Hello", "items": [{"prompt": "a", "answer": "b"}]}
                ]
            }, {
                "title": "Greetings",
                "lessons": [{"title": "Other", "items": [{"prompt": "a", "answer": "b"}]}]
            }]
        }"#;
        let v = violations(parse_spec(doc, media.path()).unwrap_err());
        assert_eq!(v.len(), 3, "{v:#?}");
        assert!(v.iter().any(|v| v.message.contains("duplicates items[0]")));
        assert!(v.iter().any(|v| v.message.contains("duplicates lessons[0]")));
        assert!(v.iter().any(|v| v.message.contains("duplicates categories[0]")));
    }

    #[test]
    fn same_title_allowed_with_distinct_keys() {
        let media = media_dir();
        let doc = r#"{
            "course": {
                "slug": "jp",
                "language": {"name": "Japanese", "bcp47": "ja"},
                "from": {"name": "English", "bcp47": "en"}
            },
            "categories": [{
                "title": "Review",
                "lessons": [
                    {"title": "Review", "key": "r1", "items": [{"prompt": "a", "answer": "b"}]},
                    {"title": "Review", "key": "r2", "items": [{"prompt": "a", "answer": "b"}]}
                ]
            }]
        }"#;
        assert!(parse_spec(doc, media.path()).is_ok());
    }

    #[test]
    fn invalid_explicit_slug_and_image_id() {
        let media = media_dir();
        let doc = MINIMAL
            .replace("\"title\": \"Hello\"", "\"title\": \"Hello\", \"slug\": \"../etc\"")
            .replace("\"image\": \"hello.png\"", "\"image\": \"hello.png\", \"image_id\": \"a/b\"");
        let v = violations(parse_spec(&doc, media.path()).unwrap_err());
        assert_eq!(v.len(), 2, "{v:#?}");
    }

    #[test]
    fn license_requires_all_fields_when_present() {
        let media = media_dir();
        let doc = MINIMAL.replace(
            "\"slug\": \"jp\",",
            "\"slug\": \"jp\", \"license\": {\"name\": \"CC BY 4.0\"},",
        );
        let v = violations(parse_spec(&doc, media.path()).unwrap_err());
        assert_eq!(v.len(), 2);
        assert!(v.iter().all(|v| v.location.starts_with("course.license.")));
    }

    #[test]
    fn report_display_lists_each_violation() {
        let mut report = ValidationReport::default();
        report.push("a", "first");
        report.push("b", "second");
        let text = report.to_string();
        assert!(text.starts_with("specification has 2 validation error(s)"));
        assert!(text.contains("\n  a: first"));
        assert!(text.contains("\n  b: second"));
    }

    #[test]
    fn image_id_reused_for_different_file_flagged() {
        let media = media_dir();
        fs::write(media.path().join("other.png"), b"x").unwrap();
        let doc = MINIMAL.replace(
            r#"[{"prompt": "こんにちは", "answer": "hello", "image": "hello.png"}]"#,
            r#"[{"prompt": "a", "answer": "b", "image": "hello.png", "image_id": "pic"},
                {"prompt": "c", "answer": "d", "image": "other.png", "image_id": "pic"},
                {"prompt": "e", "answer": "f", "image": "hello.png", "image_id": "pic"}]"#,
        );
        let v = violations(parse_spec(&doc, media.path()).unwrap_err());
        assert_eq!(v.len(), 1, "{v:#?}");
        assert!(v[0].location.contains("items[1]"));
    }

    #[test]
    fn is_slug_accepts_and_rejects() {
        assert!(is_slug("jp-it"));
        assert!(is_slug("a_1"));
        assert!(!is_slug(""));
        assert!(!is_slug("-a"));
        assert!(!is_slug("A"));
        assert!(!is_slug("a/b"));
        assert!(!is_slug(".."));
    }
}
