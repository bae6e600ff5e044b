//! Ledger of generated image variants.
//!
//! The image variant root is shared: it can hold hand-authored files and the
//! variants of other courses. The ledger is how a course knows which files in
//! there are its own, so the pruner can remove stale variants without ever
//! looking at anything else.
//!
//! ## Freshness
//!
//! Each entry maps a variant file name (relative to the image root) to the
//! image it was rendered from, a `source_hash` over the source file's bytes,
//! and a `params_hash` over everything that shapes the output: dimensions,
//! format, quality, square mode, and the configured variant-list `version`.
//! A variant is up to date when the output file exists and the ledger holds
//! the same `source_hash` and `params_hash`.
//!
//! Pointing an image at a different file re-renders it whatever that file's
//! timestamps. Bumping `images.version` in `coursec.toml` re-renders every
//! variant on the next run.
//!
//! ## Storage
//!
//! `<images>/.coursec-<course-slug>.json`, pretty-printed with sorted keys so
//! that an unchanged ledger serializes to identical bytes. It is only
//! rewritten when its content changes.

use crate::imaging::VariantParams;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Version of the ledger format. Bump this to discard all existing ledgers
/// when the format or key computation changes.
const LEDGER_VERSION: u32 = 2;

/// A single generated variant.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Image name the variant belongs to.
    pub image: String,
    pub source_hash: String,
    pub params_hash: String,
}

/// On-disk ledger mapping variant file names to their entries.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct VariantLedger {
    pub version: u32,
    pub course: String,
    pub entries: BTreeMap<String, LedgerEntry>,
}

/// Ledger path for one course inside the image root.
pub fn ledger_path(images_root: &Path, course_slug: &str) -> PathBuf {
    images_root.join(format!(".coursec-{course_slug}.json"))
}

impl VariantLedger {
    pub fn empty(course_slug: &str) -> Self {
        Self {
            version: LEDGER_VERSION,
            course: course_slug.to_string(),
            entries: BTreeMap::new(),
        }
    }

    /// Load the course's ledger. Returns an empty ledger if the file doesn't
    /// exist or can't be parsed (version mismatch, corruption, another course).
    pub fn load(images_root: &Path, course_slug: &str) -> Self {
        let path = ledger_path(images_root, course_slug);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::empty(course_slug),
        };
        let ledger: Self = match serde_json::from_str(&content) {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable variant ledger");
                return Self::empty(course_slug);
            }
        };
        if ledger.version != LEDGER_VERSION || ledger.course != course_slug {
            return Self::empty(course_slug);
        }
        ledger
    }

    /// Write the ledger unless the file already holds identical bytes.
    /// Returns whether a write happened.
    pub fn save(&self, images_root: &Path) -> io::Result<bool> {
        let path = ledger_path(images_root, &self.course);
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        if fs::read(&path).is_ok_and(|existing| existing == json.as_bytes()) {
            return Ok(false);
        }
        fs::create_dir_all(images_root)?;
        fs::write(&path, json)?;
        Ok(true)
    }

    /// True when `file` is recorded with exactly these hashes.
    pub fn matches(&self, file: &str, source_hash: &str, params_hash: &str) -> bool {
        self.entries
            .get(file)
            .is_some_and(|e| e.source_hash == source_hash && e.params_hash == params_hash)
    }

    pub fn insert(&mut self, file: String, entry: LedgerEntry) {
        self.entries.insert(file, entry);
    }

    /// Variant files recorded for `image`.
    pub fn files_of<'a>(&'a self, image: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(_, e)| e.image == image)
            .map(|(file, _)| file.as_str())
    }
}

/// SHA-256 of a file's contents, hex-encoded.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// SHA-256 over everything that shapes a rendered variant.
pub fn hash_variant_params(params: &VariantParams, version: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"variant\0");
    hasher.update(version.to_le_bytes());
    hasher.update(params.width.to_le_bytes());
    hasher.update(params.height.to_le_bytes());
    hasher.update(params.format.extension().as_bytes());
    hasher.update(b"\0");
    hasher.update(params.quality.value().to_le_bytes());
    hasher.update(format!("{:?}", params.square).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Per-run variant counts.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VariantStats {
    pub fresh: u32,
    pub rendered: u32,
    pub failed: u32,
}

impl VariantStats {
    pub fn total(&self) -> u32 {
        self.fresh + self.rendered + self.failed
    }
}

impl fmt::Display for VariantStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failed > 0 {
            write!(
                f,
                "{} up to date, {} rendered, {} failed ({} total)",
                self.fresh,
                self.rendered,
                self.failed,
                self.total()
            )
        } else if self.fresh > 0 {
            write!(
                f,
                "{} up to date, {} rendered ({} total)",
                self.fresh,
                self.rendered,
                self.total()
            )
        } else {
            write!(f, "{} rendered", self.rendered)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SquareMode, VariantFormat};
    use crate::imaging::Quality;
    use tempfile::TempDir;

    fn entry(image: &str, source_hash: &str) -> LedgerEntry {
        LedgerEntry {
            image: image.into(),
            source_hash: source_hash.into(),
            params_hash: "p".into(),
        }
    }

    fn params(width: u32, quality: u32) -> VariantParams {
        VariantParams {
            source: "/s.png".into(),
            output: "/o/x.jpg".into(),
            width,
            height: width / 2,
            format: VariantFormat::Jpeg,
            quality: Quality::new(quality),
            square: SquareMode::None,
        }
    }

    // =========================================================================
    // Ledger basics
    // =========================================================================

    #[test]
    fn empty_ledger_has_no_entries() {
        let l = VariantLedger::empty("jp");
        assert_eq!(l.version, LEDGER_VERSION);
        assert_eq!(l.course, "jp");
        assert!(l.entries.is_empty());
    }

    #[test]
    fn matches_requires_same_hashes() {
        let mut l = VariantLedger::empty("jp");
        l.insert("jp_a.jpg".into(), entry("jp_a", "s1"));
        assert!(l.matches("jp_a.jpg", "s1", "p"));
        assert!(!l.matches("jp_a.jpg", "s2", "p"));
        assert!(!l.matches("jp_a.jpg", "s1", "q"));
        assert!(!l.matches("jp_b.jpg", "s1", "p"));
    }

    #[test]
    fn files_of_filters_by_image() {
        let mut l = VariantLedger::empty("jp");
        l.insert("jp_a.jpg".into(), entry("jp_a", "s"));
        l.insert("jp_a_tiny.jpg".into(), entry("jp_a", "s"));
        l.insert("jp_b.jpg".into(), entry("jp_b", "s"));
        let files: Vec<&str> = l.files_of("jp_a").collect();
        assert_eq!(files, ["jp_a.jpg", "jp_a_tiny.jpg"]);
    }

    // =========================================================================
    // Save / Load
    // =========================================================================

    #[test]
    fn save_and_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let mut l = VariantLedger::empty("jp");
        l.insert("jp_a.jpg".into(), entry("jp_a", "s"));
        assert!(l.save(tmp.path()).unwrap());

        let loaded = VariantLedger::load(tmp.path(), "jp");
        assert_eq!(loaded, l);
    }

    #[test]
    fn save_skips_identical_content() {
        let tmp = TempDir::new().unwrap();
        let mut l = VariantLedger::empty("jp");
        l.insert("jp_a.jpg".into(), entry("jp_a", "s"));
        assert!(l.save(tmp.path()).unwrap());
        assert!(!l.save(tmp.path()).unwrap());

        l.insert("jp_b.jpg".into(), entry("jp_b", "s"));
        assert!(l.save(tmp.path()).unwrap());
    }

    #[test]
    fn save_creates_image_root() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("static/images");
        VariantLedger::empty("jp").save(&root).unwrap();
        assert!(ledger_path(&root, "jp").exists());
    }

    #[test]
    fn load_missing_file_returns_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(VariantLedger::load(tmp.path(), "jp").entries.is_empty());
    }

    #[test]
    fn load_corrupt_json_returns_empty() {
        let tmp = TempDir::new().unwrap();
        fs::write(ledger_path(tmp.path(), "jp"), "not json").unwrap();
        assert!(VariantLedger::load(tmp.path(), "jp").entries.is_empty());
    }

    #[test]
    fn load_wrong_version_returns_empty() {
        let tmp = TempDir::new().unwrap();
        let json = format!(
            r#"{{"version": {}, "course": "jp", "entries": {{"a.jpg": {{"image":"a","source_hash":"s","params_hash":"p"}}}}}}"#,
            LEDGER_VERSION + 1
        );
        fs::write(ledger_path(tmp.path(), "jp"), json).unwrap();
        assert!(VariantLedger::load(tmp.path(), "jp").entries.is_empty());
    }

    #[test]
    fn ledgers_are_per_course() {
        let tmp = TempDir::new().unwrap();
        let mut l = VariantLedger::empty("jp");
        l.insert("jp_a.jpg".into(), entry("jp_a", "s"));
        l.save(tmp.path()).unwrap();
        assert!(VariantLedger::load(tmp.path(), "it").entries.is_empty());
    }

    // =========================================================================
    // Params hash
    // =========================================================================

    #[test]
    fn hash_params_deterministic() {
        assert_eq!(hash_variant_params(&params(512, 90), 1), hash_variant_params(&params(512, 90), 1));
    }

    #[test]
    fn hash_params_varies_with_each_input() {
        let base = hash_variant_params(&params(512, 90), 1);
        assert_ne!(base, hash_variant_params(&params(256, 90), 1));
        assert_ne!(base, hash_variant_params(&params(512, 80), 1));
        assert_ne!(base, hash_variant_params(&params(512, 90), 2));

        let mut png = params(512, 90);
        png.format = VariantFormat::Png;
        assert_ne!(base, hash_variant_params(&png, 1));

        let mut square = params(512, 90);
        square.square = SquareMode::Pad;
        assert_ne!(base, hash_variant_params(&square, 1));
    }

    #[test]
    fn hash_params_ignores_paths() {
        let mut moved = params(512, 90);
        moved.source = "/elsewhere.png".into();
        assert_eq!(hash_variant_params(&moved, 1), hash_variant_params(&params(512, 90), 1));
    }

    #[test]
    fn hash_file_follows_content() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.png");
        let b = tmp.path().join("b.png");
        fs::write(&a, b"one").unwrap();
        fs::write(&b, b"one").unwrap();
        assert_eq!(hash_file(&a).unwrap(), hash_file(&b).unwrap());
        fs::write(&b, b"two").unwrap();
        assert_ne!(hash_file(&a).unwrap(), hash_file(&b).unwrap());
        assert!(hash_file(&tmp.path().join("missing.png")).is_err());
    }

    // =========================================================================
    // VariantStats
    // =========================================================================

    #[test]
    fn stats_display_variants() {
        let mut s = VariantStats::default();
        s.rendered = 3;
        assert_eq!(s.to_string(), "3 rendered");
        s.fresh = 5;
        assert_eq!(s.to_string(), "5 up to date, 3 rendered (8 total)");
        s.failed = 1;
        assert_eq!(s.to_string(), "5 up to date, 3 rendered, 1 failed (9 total)");
    }
}
