//! Shared test utilities for the coursec test suite.
//!
//! Builds throwaway course repositories in a temp directory: a specification
//! document, real PNG source images, and a `coursec.toml` that points the
//! media root at `media/`.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let repo = FixtureRepo::two_lessons();
//! let report = generate(&repo.layout(), &repo.config(), ...);
//!
//! repo.write_spec(&greetings_spec(false));   // drop the "Goodbye" lesson
//! let before = snapshot(&repo.path().join("courses"));
//! ```

use crate::config::{CompilerConfig, RepoLayout, load_config};
use image::{Rgb, RgbImage};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::TempDir;
use walkdir::WalkDir;

// =========================================================================
// Specification documents
// =========================================================================

/// One lesson in the "Greetings" category: `(title, prompt, answer, image)`.
pub type LessonFixture<'a> = (&'a str, &'a str, &'a str, Option<&'a str>);

/// A `jp` course with a single "Greetings" category holding `lessons`.
/// Each image reference `x.png` gets `image_id` `x`.
pub fn spec_json(lessons: &[LessonFixture<'_>]) -> String {
    let lessons: Vec<serde_json::Value> = lessons
        .iter()
        .map(|(title, prompt, answer, image)| {
            let mut item = serde_json::json!({"prompt": prompt, "answer": answer});
            if let Some(image) = image {
                item["image"] = (*image).into();
                item["image_id"] = image.trim_end_matches(".png").into();
            }
            serde_json::json!({"title": title, "items": [item]})
        })
        .collect();
    serde_json::json!({
        "course": {
            "slug": "jp",
            "title": "Japanese for beginners",
            "language": {"name": "Japanese", "bcp47": "ja"},
            "from": {"name": "English", "bcp47": "en"}
        },
        "categories": [{"title": "Greetings", "lessons": lessons}]
    })
    .to_string()
}

/// "Greetings" > "Hello" (こんにちは → hello), optionally followed by
/// "Goodbye" (さようなら → goodbye).
pub fn greetings_spec(with_goodbye: bool) -> String {
    let mut lessons = vec![("Hello", "こんにちは", "hello", Some("hello.png"))];
    if with_goodbye {
        lessons.push(("Goodbye", "さようなら", "goodbye", Some("bye.png")));
    }
    spec_json(&lessons)
}

// =========================================================================
// Fixture repository
// =========================================================================

const CONFIG: &str = r#"[paths]
media_root = "media"

[processing]
max_processes = 2
"#;

pub struct FixtureRepo {
    tmp: TempDir,
}

impl FixtureRepo {
    /// A repo holding `spec` as `course.json` and a small PNG for each name
    /// in `images` under `media/`.
    pub fn new(spec: &str, images: &[&str]) -> Self {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("coursec.toml"), CONFIG).unwrap();
        fs::create_dir_all(tmp.path().join("media")).unwrap();
        for (i, name) in images.iter().enumerate() {
            write_png(&tmp.path().join("media").join(name), 640 + 10 * i as u32, 480);
        }
        let repo = Self { tmp };
        repo.write_spec(spec);
        repo
    }

    pub fn greetings() -> Self {
        Self::new(&greetings_spec(false), &["hello.png"])
    }

    pub fn two_lessons() -> Self {
        Self::new(&greetings_spec(true), &["hello.png", "bye.png"])
    }

    pub fn path(&self) -> &Path {
        self.tmp.path()
    }

    pub fn write_spec(&self, spec: &str) {
        fs::write(self.path().join("course.json"), spec).unwrap();
    }

    pub fn config(&self) -> CompilerConfig {
        load_config(self.path()).unwrap()
    }

    pub fn layout(&self) -> RepoLayout {
        RepoLayout::resolve(self.path(), &self.config().paths, None)
    }
}

/// Write a gradient PNG of the given size.
pub fn write_png(path: &Path, width: u32, height: u32) {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    img.save(path).unwrap();
}

// =========================================================================
// Assertions
// =========================================================================

/// Every file under `dir` with its bytes and modification time.
pub fn snapshot(dir: &Path) -> BTreeMap<PathBuf, (Vec<u8>, SystemTime)> {
    WalkDir::new(dir)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let path = e.path().to_path_buf();
            let bytes = fs::read(&path).unwrap();
            let mtime = e.metadata().unwrap().modified().unwrap();
            (path, (bytes, mtime))
        })
        .collect()
}
