//! Compiler configuration.
//!
//! Handles loading, validating, and merging `coursec.toml`. The file lives at
//! the repository root and is entirely optional: stock defaults are serialized
//! to a TOML table, the user file is merged on top of it key by key, and the
//! result is deserialized and validated.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [paths]
//! spec = "course.json"        # Specification document, relative to the repo root
//! media_root = ""             # Source image directory ("" = next to the spec file)
//! courses = "courses"         # Course tree root
//! images = "static/images"    # Image variant root
//! export = "export"           # Bundle root
//!
//! [images]
//! version = 1                 # Bump to regenerate every variant
//! quality = 90                # Lossy encoding quality (1-100)
//! square = "none"             # none | crop | pad
//!
//! [[images.variants]]
//! suffix = ""
//! width = 512
//! format = "jpeg"
//!
//! [processing]
//! max_processes = 4           # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early. The loaded value is passed
//! explicitly into every pipeline stage; nothing reads configuration ambiently.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Name of the config file looked up in the repository root.
pub const CONFIG_FILENAME: &str = "coursec.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Compiler configuration loaded from `coursec.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Input and output locations, relative to the repository root.
    pub paths: PathsConfig,
    /// Image variant descriptors and encoding settings.
    pub images: ImagesConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl CompilerConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.images.quality == 0 || self.images.quality > 100 {
            return Err(ConfigError::Validation(
                "images.quality must be 1-100".into(),
            ));
        }
        if self.images.variants.is_empty() {
            return Err(ConfigError::Validation(
                "images.variants must not be empty".into(),
            ));
        }
        let mut suffixes = HashSet::new();
        for variant in &self.images.variants {
            if variant.width == 0 {
                return Err(ConfigError::Validation(format!(
                    "images.variants: width must be non-zero (suffix {:?})",
                    variant.suffix
                )));
            }
            if !variant
                .suffix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
            {
                return Err(ConfigError::Validation(format!(
                    "images.variants: suffix {:?} may only contain [A-Za-z0-9-]",
                    variant.suffix
                )));
            }
            if !suffixes.insert(variant.suffix.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "images.variants: duplicate suffix {:?}",
                    variant.suffix
                )));
            }
        }
        for (key, value) in [
            ("paths.courses", &self.paths.courses),
            ("paths.images", &self.paths.images),
            ("paths.export", &self.paths.export),
        ] {
            if value.as_os_str().is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
            // Generated roots are pruned; hand-authored images must stay out of them.
            if !self.paths.media_root.as_os_str().is_empty()
                && without_cur_dir(value).starts_with(without_cur_dir(&self.paths.media_root))
            {
                return Err(ConfigError::Validation(format!(
                    "{key} {:?} must not lie inside paths.media_root {:?}",
                    value, self.paths.media_root
                )));
            }
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn without_cur_dir(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Input and output locations.
///
/// Relative paths are resolved against the repository root by [`RepoLayout`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub spec: PathBuf,
    /// Directory image references are resolved against. Empty means the
    /// directory containing the specification document.
    pub media_root: PathBuf,
    pub courses: PathBuf,
    pub images: PathBuf,
    pub export: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            spec: PathBuf::from("course.json"),
            media_root: PathBuf::new(),
            courses: PathBuf::from("courses"),
            images: PathBuf::from("static/images"),
            export: PathBuf::from("export"),
        }
    }
}

/// Output raster format of a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantFormat {
    Jpeg,
    Png,
    Webp,
}

impl VariantFormat {
    pub fn extension(self) -> &'static str {
        match self {
            VariantFormat::Jpeg => "jpg",
            VariantFormat::Png => "png",
            VariantFormat::Webp => "webp",
        }
    }
}

/// How a source image is shaped before resampling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SquareMode {
    /// Keep the source aspect ratio.
    #[default]
    None,
    /// Center-crop to a square on the short edge.
    Crop,
    /// Pad to a square on the long edge with a white background.
    Pad,
}

/// One entry of the fixed variant list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariantSpec {
    /// File name suffix; empty for the base variant.
    #[serde(default)]
    pub suffix: String,
    /// Maximum output width in pixels. Narrower sources are never upscaled.
    pub width: u32,
    pub format: VariantFormat,
}

/// Image variant generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Version of the variant list. Part of every variant's parameter hash.
    pub version: u32,
    /// Encoding quality for lossy formats.
    pub quality: u32,
    pub square: SquareMode,
    pub variants: Vec<VariantSpec>,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            version: 1,
            quality: 90,
            square: SquareMode::None,
            variants: vec![
                VariantSpec {
                    suffix: String::new(),
                    width: 512,
                    format: VariantFormat::Jpeg,
                },
                VariantSpec {
                    suffix: "tiny".to_string(),
                    width: 256,
                    format: VariantFormat::Jpeg,
                },
                VariantSpec {
                    suffix: "tinier".to_string(),
                    width: 128,
                    format: VariantFormat::Jpeg,
                },
            ],
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective worker count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Absolute locations of every input and output of one compiler run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLayout {
    pub repo: PathBuf,
    pub spec: PathBuf,
    pub media_root: PathBuf,
    pub courses_root: PathBuf,
    pub images_root: PathBuf,
    pub export_root: PathBuf,
}

impl RepoLayout {
    /// Resolve configured paths against `repo`. `spec_override` wins over
    /// `paths.spec` and is taken as-is (relative to the working directory).
    pub fn resolve(repo: &Path, paths: &PathsConfig, spec_override: Option<&Path>) -> Self {
        let spec = match spec_override {
            Some(path) => path.to_path_buf(),
            None => repo.join(&paths.spec),
        };
        let media_root = if paths.media_root.as_os_str().is_empty() {
            spec.parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| repo.to_path_buf())
        } else {
            repo.join(&paths.media_root)
        };
        Self {
            repo: repo.to_path_buf(),
            spec,
            media_root,
            courses_root: repo.join(&paths.courses),
            images_root: repo.join(&paths.images),
            export_root: repo.join(&paths.export),
        }
    }

    /// Course tree directory for one course.
    pub fn course_dir(&self, course_slug: &str) -> PathBuf {
        self.courses_root.join(course_slug)
    }

    /// Bundle directory for one course.
    pub fn bundle_dir(&self, course_slug: &str) -> PathBuf {
        self.export_root.join(course_slug)
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(CompilerConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely, so an
///   `[[images.variants]]` list in a user file replaces the stock list.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `coursec.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if no config file exists in the directory.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Load config for a repository root: stock defaults, overlaid with the
/// repository's `coursec.toml` if present, then validated.
pub fn load_config(repo: &Path) -> Result<CompilerConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match load_raw_config(repo)? {
        Some(overlay) => merge_toml(base, overlay),
        None => base,
    };
    let config: CompilerConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `coursec.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# coursec configuration
# =====================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Paths (relative to the repository root)
# ---------------------------------------------------------------------------
[paths]
# Hand-authored specification document.
spec = "course.json"

# Directory that image references in the specification are resolved against.
# Leave empty to resolve them next to the specification document.
media_root = ""

# Course tree root. Each course is emitted to <courses>/<course-slug>/.
courses = "courses"

# Image variant root. Shared by all courses; hand-authored files here are
# never touched.
images = "static/images"

# Bundle root. Each course is exported to <export>/<course-slug>/.
export = "export"

# ---------------------------------------------------------------------------
# Image variants
# ---------------------------------------------------------------------------
[images]
# Bump to force every variant to be regenerated.
version = 1

# Encoding quality for lossy formats (1 = worst, 100 = best).
quality = 90

# Shape before resampling: "none" keeps the aspect ratio, "crop" center-crops
# to a square, "pad" pads to a square on white.
square = "none"

# One entry per generated variant. Output name: <image>[_<suffix>].<ext>
[[images.variants]]
suffix = ""
width = 512
format = "jpeg"

[[images.variants]]
suffix = "tiny"
width = 256
format = "jpeg"

[[images.variants]]
suffix = "tinier"
width = 128
format = "jpeg"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel image workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
