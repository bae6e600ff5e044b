//! Image processing — pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader::into_dimensions` |
//! | **Square** | `crop_imm` / white canvas + `overlay` |
//! | **Resize** | Lanczos3, never upscaling |
//! | **Encode** | JPEG, PNG, lossless WebP |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{fit_width, variant_dimensions};
pub use operations::{get_dimensions, plan_variants, render_variant, variant_file_name};
pub use params::{Quality, VariantParams};
pub use rust_backend::RustBackend;
