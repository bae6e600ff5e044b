//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image` crate (pure Rust decoders) |
//! | Square crop | `DynamicImage::crop_imm` |
//! | Square pad | white `RgbaImage` canvas + `imageops::overlay` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` filter |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (alpha flattened onto white) |
//! | Encode → PNG | `image::codecs::png::PngEncoder` |
//! | Encode → WebP | `image::codecs::webp::WebPEncoder` (lossless) |
//!
//! Output is encoded to a hidden temporary sibling and renamed into place, so
//! an interrupted run never leaves a truncated variant behind.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::calculations::square_region;
use super::params::VariantParams;
use crate::config::{SquareMode, VariantFormat};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, Rgb, RgbImage, Rgba, RgbaImage};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Load and decode an image from disk, sniffing the format from content.
fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)
        .map_err(BackendError::Io)?
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
        })
}

/// Center-crop or pad to a square, per `mode`.
fn make_square(img: DynamicImage, mode: SquareMode) -> DynamicImage {
    let Some(region) = square_region((img.width(), img.height()), mode) else {
        return img;
    };
    match mode {
        SquareMode::None => img,
        SquareMode::Crop => img.crop_imm(region.x, region.y, region.side, region.side),
        SquareMode::Pad => {
            let mut canvas =
                RgbaImage::from_pixel(region.side, region.side, Rgba([255, 255, 255, 255]));
            image::imageops::overlay(
                &mut canvas,
                &img.to_rgba8(),
                i64::from(region.x),
                i64::from(region.y),
            );
            DynamicImage::ImageRgba8(canvas)
        }
    }
}

/// Composite onto an opaque white background.
fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let a = u32::from(a);
        let blend = |c: u8| ((u32::from(c) * a + 255 * (255 - a) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Hidden sibling used while encoding: `dir/.name.jpg.tmp`.
fn temp_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!(".{name}.tmp"))
}

fn encode(
    img: &DynamicImage,
    format: VariantFormat,
    quality: u32,
    writer: &mut impl Write,
) -> Result<(), image::ImageError> {
    match format {
        VariantFormat::Jpeg => {
            let rgb = flatten_onto_white(img);
            let encoder = JpegEncoder::new_with_quality(writer, quality as u8);
            DynamicImage::ImageRgb8(rgb).write_with_encoder(encoder)
        }
        VariantFormat::Png => img.write_with_encoder(PngEncoder::new(writer)),
        VariantFormat::Webp => {
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            rgba.write_with_encoder(WebPEncoder::new_lossless(writer))
        }
    }
}

/// Encode to a temporary sibling, then rename over `path`.
fn save_image(
    img: &DynamicImage,
    path: &Path,
    format: VariantFormat,
    quality: u32,
) -> Result<(), BackendError> {
    let tmp = temp_path(path);
    let result = (|| -> Result<(), BackendError> {
        let file = fs::File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        encode(img, format, quality, &mut writer).map_err(|e| {
            BackendError::ProcessingFailed(format!(
                "{} encode failed for {}: {}",
                format.extension(),
                path.display(),
                e
            ))
        })?;
        writer.flush()?;
        drop(writer);
        fs::rename(&tmp, path)?;
        Ok(())
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = ImageReader::open(path)
            .map_err(BackendError::Io)?
            .with_guessed_format()
            .map_err(BackendError::Io)?
            .into_dimensions()
            .map_err(|e| {
                BackendError::ProcessingFailed(format!(
                    "Failed to read dimensions of {}: {}",
                    path.display(),
                    e
                ))
            })?;
        Ok(Dimensions { width, height })
    }

    fn render(&self, params: &VariantParams) -> Result<(), BackendError> {
        let img = make_square(load_image(&params.source)?, params.square);
        let resized = if (img.width(), img.height()) == (params.width, params.height) {
            img
        } else {
            img.resize_exact(params.width, params.height, FilterType::Lanczos3)
        };
        save_image(
            &resized,
            &params.output,
            params.format,
            params.quality.value(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::params::Quality;

    /// Create a small PNG with a gradient and a transparent left half.
    fn create_test_png(path: &Path, width: u32, height: u32) {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            let alpha = if x < width / 2 { 0 } else { 255 };
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, alpha])
        });
        img.save(path).unwrap();
    }

    fn params(source: PathBuf, output: PathBuf, w: u32, h: u32, format: VariantFormat) -> VariantParams {
        VariantParams {
            source,
            output,
            width: w,
            height: h,
            format,
            quality: Quality::new(85),
            square: SquareMode::None,
        }
    }

    #[test]
    fn identify_synthetic_png() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("test.png");
        create_test_png(&path, 200, 150);

        let dims = RustBackend::new().identify(&path).unwrap();
        assert_eq!(dims, Dimensions { width: 200, height: 150 });
    }

    #[test]
    fn identify_nonexistent_file_errors() {
        let result = RustBackend::new().identify(Path::new("/nonexistent/image.jpg"));
        assert!(result.is_err());
    }

    #[test]
    fn identify_corrupt_file_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("broken.png");
        fs::write(&path, b"definitely not a png").unwrap();
        assert!(RustBackend::new().identify(&path).is_err());
    }

    #[test]
    fn render_jpeg_flattens_alpha() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("source.png");
        create_test_png(&source, 400, 300);
        let output = tmp.path().join("out.jpg");

        RustBackend::new()
            .render(&params(source, output.clone(), 200, 150, VariantFormat::Jpeg))
            .unwrap();

        let decoded = image::open(&output).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (200, 150));
        // Transparent half became (near) white.
        let px = decoded.to_rgb8().get_pixel(5, 75).0;
        assert!(px.iter().all(|&c| c > 235), "{px:?}");
        assert!(!temp_path(&output).exists());
    }

    #[test]
    fn render_png_and_webp() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("source.png");
        create_test_png(&source, 64, 48);

        for format in [VariantFormat::Png, VariantFormat::Webp] {
            let output = tmp.path().join(format!("out.{}", format.extension()));
            RustBackend::new()
                .render(&params(source.clone(), output.clone(), 32, 24, format))
                .unwrap();
            let decoded = image::open(&output).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (32, 24));
        }
    }

    #[test]
    fn render_square_crop() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("source.png");
        create_test_png(&source, 120, 80);
        let output = tmp.path().join("square.png");

        let mut p = params(source, output.clone(), 40, 40, VariantFormat::Png);
        p.square = SquareMode::Crop;
        RustBackend::new().render(&p).unwrap();

        let decoded = image::open(&output).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 40));
    }

    #[test]
    fn make_square_pad_fills_white() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 4, Rgb([0, 0, 0])));
        let padded = make_square(img, SquareMode::Pad).to_rgba8();
        assert_eq!(padded.dimensions(), (10, 10));
        assert_eq!(padded.get_pixel(0, 0).0, [255, 255, 255, 255]);
        assert_eq!(padded.get_pixel(5, 5).0, [0, 0, 0, 255]);
    }

    #[test]
    fn render_corrupt_source_leaves_no_output() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("broken.png");
        fs::write(&source, b"garbage").unwrap();
        let output = tmp.path().join("out.jpg");

        let result =
            RustBackend::new().render(&params(source, output.clone(), 10, 10, VariantFormat::Jpeg));
        assert!(result.is_err());
        assert!(!output.exists());
        assert!(!temp_path(&output).exists());
    }

    #[test]
    fn flatten_blends_partial_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128])));
        let px = flatten_onto_white(&img).get_pixel(0, 0).0;
        // 255 * 127/255 ≈ 127
        assert_eq!(px, [127, 127, 127]);
    }
}
