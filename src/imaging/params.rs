//! Parameter types for image operations.
//!
//! These structs describe *what* to render, not *how*. They are the interface
//! between [`operations`](super::operations) (which decides which variants a
//! source needs) and the [`backend`](super::backend) (which does the pixel
//! work), so tests can swap in a mock backend without touching the planning
//! logic.

use crate::config::{SquareMode, VariantFormat};
use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Everything needed to render one variant file.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantParams {
    pub source: PathBuf,
    pub output: PathBuf,
    /// Final output dimensions (already capped at the source size).
    pub width: u32,
    pub height: u32,
    pub format: VariantFormat,
    pub quality: Quality,
    pub square: SquareMode,
}
