//! Pure calculation functions for variant dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use crate::config::SquareMode;

/// A square region of the source, or of the padded canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SquareRegion {
    /// Offset of the source within the canvas (pad) or of the crop within
    /// the source (crop).
    pub x: u32,
    pub y: u32,
    pub side: u32,
}

/// Centered square for the given mode, or `None` when the aspect ratio is kept.
///
/// - `Crop`: the largest centered square inside the source (short edge).
/// - `Pad`: a canvas on the long edge, with the source's offset inside it.
pub fn square_region(source: (u32, u32), mode: SquareMode) -> Option<SquareRegion> {
    let (w, h) = source;
    match mode {
        SquareMode::None => None,
        SquareMode::Crop => {
            let side = w.min(h);
            Some(SquareRegion {
                x: (w - side) / 2,
                y: (h - side) / 2,
                side,
            })
        }
        SquareMode::Pad => {
            let side = w.max(h);
            Some(SquareRegion {
                x: (side - w) / 2,
                y: (side - h) / 2,
                side,
            })
        }
    }
}

/// Scale `source` down to at most `max_width` wide, preserving aspect ratio.
///
/// Sources already narrower than `max_width` keep their size: variants are
/// never upscaled. Neither dimension drops below 1.
///
/// ```text
/// fit_width((1024, 768), 512) == (512, 384)
/// fit_width((300, 200), 512)  == (300, 200)
/// ```
pub fn fit_width(source: (u32, u32), max_width: u32) -> (u32, u32) {
    let (w, h) = source;
    if w <= max_width {
        return (w.max(1), h.max(1));
    }
    let ratio = max_width as f64 / w as f64;
    let height = (h as f64 * ratio).round() as u32;
    (max_width.max(1), height.max(1))
}

/// Final output dimensions for one variant.
pub fn variant_dimensions(source: (u32, u32), max_width: u32, mode: SquareMode) -> (u32, u32) {
    match square_region(source, mode) {
        Some(region) => fit_width((region.side, region.side), max_width),
        None => fit_width(source, max_width),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_width_downscales_landscape() {
        assert_eq!(fit_width((1024, 768), 512), (512, 384));
    }

    #[test]
    fn fit_width_downscales_portrait() {
        assert_eq!(fit_width((600, 800), 300), (300, 400));
    }

    #[test]
    fn fit_width_never_upscales() {
        assert_eq!(fit_width((300, 200), 512), (300, 200));
        assert_eq!(fit_width((512, 10), 512), (512, 10));
    }

    #[test]
    fn fit_width_keeps_at_least_one_pixel() {
        assert_eq!(fit_width((4000, 1), 100), (100, 1));
    }

    #[test]
    fn fit_width_rounds() {
        assert_eq!(fit_width((1000, 333), 100), (100, 33));
        assert_eq!(fit_width((1000, 337), 100), (100, 34));
    }

    #[test]
    fn square_none_keeps_aspect() {
        assert_eq!(square_region((800, 600), SquareMode::None), None);
        assert_eq!(variant_dimensions((800, 600), 400, SquareMode::None), (400, 300));
    }

    #[test]
    fn square_crop_centers_on_short_edge() {
        let r = square_region((800, 600), SquareMode::Crop).unwrap();
        assert_eq!(r, SquareRegion { x: 100, y: 0, side: 600 });
        let r = square_region((600, 800), SquareMode::Crop).unwrap();
        assert_eq!(r, SquareRegion { x: 0, y: 100, side: 600 });
        assert_eq!(variant_dimensions((800, 600), 256, SquareMode::Crop), (256, 256));
    }

    #[test]
    fn square_pad_centers_on_long_edge() {
        let r = square_region((800, 600), SquareMode::Pad).unwrap();
        assert_eq!(r, SquareRegion { x: 0, y: 100, side: 800 });
        assert_eq!(variant_dimensions((800, 600), 1024, SquareMode::Pad), (800, 800));
    }

    #[test]
    fn square_of_square_is_identity() {
        let r = square_region((500, 500), SquareMode::Crop).unwrap();
        assert_eq!(r, SquareRegion { x: 0, y: 0, side: 500 });
        let r = square_region((500, 500), SquareMode::Pad).unwrap();
        assert_eq!(r, SquareRegion { x: 0, y: 0, side: 500 });
    }
}
