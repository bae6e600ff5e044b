//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations the variant
//! generator needs: identify a source and render one variant.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate. Tests use the `MockBackend` below, which records operations.

use super::params::VariantParams;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
///
/// Implementations must never modify `params.source`, and must leave either
/// a complete file or nothing at `params.output`.
pub trait ImageBackend: Sync {
    /// Get image dimensions. Fails on unreadable or undecodable sources.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Decode the source, reshape and resample it, and encode the variant.
    fn render(&self, params: &VariantParams) -> Result<(), BackendError>;
}
