//! High-level image operations.
//!
//! These functions combine calculations with backend execution. They take
//! the images config, compute per-variant parameters, and call the backend.

use super::backend::{BackendError, ImageBackend};
use super::calculations::variant_dimensions;
use super::params::{Quality, VariantParams};
use crate::config::{ImagesConfig, VariantFormat};
use std::path::Path;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Get image dimensions using the backend.
pub fn get_dimensions(backend: &impl ImageBackend, path: &Path) -> Result<(u32, u32)> {
    let dims = backend.identify(path)?;
    Ok((dims.width, dims.height))
}

/// File name of one variant: `<name>[_<suffix>].<ext>`.
pub fn variant_file_name(image_name: &str, suffix: &str, format: VariantFormat) -> String {
    if suffix.is_empty() {
        format!("{}.{}", image_name, format.extension())
    } else {
        format!("{}_{}.{}", image_name, suffix, format.extension())
    }
}

/// Plan every configured variant of one source, in config order.
///
/// Does not touch the filesystem; `source_dims` comes from a prior identify.
pub fn plan_variants(
    source: &Path,
    output_dir: &Path,
    image_name: &str,
    source_dims: (u32, u32),
    config: &ImagesConfig,
) -> Vec<VariantParams> {
    config
        .variants
        .iter()
        .map(|variant| {
            let (width, height) = variant_dimensions(source_dims, variant.width, config.square);
            VariantParams {
                source: source.to_path_buf(),
                output: output_dir.join(variant_file_name(
                    image_name,
                    &variant.suffix,
                    variant.format,
                )),
                width,
                height,
                format: variant.format,
                quality: Quality::new(config.quality),
                square: config.square,
            }
        })
        .collect()
}

/// Render one planned variant.
pub fn render_variant(backend: &impl ImageBackend, params: &VariantParams) -> Result<()> {
    backend.render(params)
}
