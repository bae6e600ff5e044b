//! Course Tree records shared by the emitter and the bundle exporter.
//!
//! These types are serialized to YAML by `generate` and read back by
//! `export`, so the Course Tree is the only contract between the two
//! invocations. Every record carries its own `id`, `slug`, and `order`;
//! nothing refers back to the specification document.

use serde::{Deserialize, Serialize};

/// Course metadata file at the course root.
pub const COURSE_FILE: &str = "_course.yaml";
/// Category metadata file inside each category directory.
pub const CATEGORY_FILE: &str = "_category.yaml";
/// Lesson metadata file inside each lesson directory.
pub const LESSON_FILE: &str = "_lesson.yaml";
/// Extension of challenge record files.
pub const RECORD_EXT: &str = "yaml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub name: String,
    pub bcp47: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub name: String,
    pub short: String,
    pub link: String,
}

/// Pointer from a parent record to a child, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRef {
    pub id: String,
    pub slug: String,
    pub order: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseRecord {
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
    pub categories: Vec<EntryRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: String,
    pub slug: String,
    pub order: usize,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intro: Option<String>,
    pub lessons: Vec<EntryRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonRecord {
    pub id: String,
    pub slug: String,
    pub order: usize,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intro: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thumbnails: Vec<ImageRecord>,
    pub challenges: Vec<EntryRef>,
}

/// A single challenge (one item of a lesson).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeRecord {
    pub id: String,
    pub slug: String,
    pub order: usize,
    pub kind: ItemKind,
    pub prompt: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRecord>,
}

/// Single words and multi-word phrases are presented differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Word,
    Phrase,
}

/// A generated image: its name plus the variant file names, relative to
/// the image variant root. The first file is the full-size variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub name: String,
    pub files: Vec<String>,
}
