//! Compression utility.
//!
//! Produces a downscaled, re-encoded substitute for an image that exceeds
//! the destination's photo upload budget. Pure function of the input file:
//! flatten to RGB, bound the dimensions, then walk the JPEG quality down
//! until the encoded size fits or the quality floor is reached. The
//! substitute is used only for the preview upload; the original file on disk
//! is never touched.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;
use std::path::Path;

/// Photo upload budget of the destination
pub const PHOTO_BYTE_LIMIT: u64 = 10 * 1024 * 1024;

/// The destination rejects photos whose width + height exceeds this
pub const MAX_DIMENSION_SUM: u32 = 10_000;

/// Resize target cap on the long edge
pub const MAX_WIDTH: u32 = 2560;

const QUALITY_FLOOR: u8 = 10;
const QUALITY_STEP: u8 = 5;

/// Whether the local file can go out as a photo without re-encoding.
pub fn within_upload_limit(path: &Path, width: Option<i64>, height: Option<i64>) -> bool {
    let size_ok = std::fs::metadata(path)
        .map(|meta| meta.len() <= PHOTO_BYTE_LIMIT)
        .unwrap_or(false);
    let dims_ok = match (width, height) {
        (Some(width), Some(height)) => width + height <= MAX_DIMENSION_SUM as i64,
        _ => true,
    };
    size_ok && dims_ok
}

/// Reduced dimensions for an oversized image, `None` when the input already
/// fits. The aspect ratio is preserved and the output never exceeds the
/// input on either axis.
pub fn bounded_dimensions(width: u32, height: u32) -> Option<(u32, u32)> {
    if width + height <= MAX_DIMENSION_SUM && width <= MAX_WIDTH {
        return None;
    }
    let aspect = width as f64 / height as f64;
    let new_width = (MAX_DIMENSION_SUM as f64 / (aspect + 1.0)).min(MAX_WIDTH as f64);
    let new_height = new_width / aspect;
    Some(((new_width as u32).max(1), (new_height as u32).max(1)))
}

/// Re-encode `input` into a JPEG at `output` no larger than `target_bytes`,
/// unless the quality floor is reached first.
pub fn compress_image(input: &Path, output: &Path, target_bytes: u64) -> Result<()> {
    let img = image::open(input)
        .with_context(|| format!("cannot open image {}", input.display()))?;
    // Alpha flattens away; the substitute is always JPEG
    let rgb = img.to_rgb8();

    let (width, height) = rgb.dimensions();
    let rgb = match bounded_dimensions(width, height) {
        Some((new_width, new_height)) => {
            tracing::debug!(
                from = %format!("{width}x{height}"),
                to = %format!("{new_width}x{new_height}"),
                "resizing oversized image"
            );
            image::imageops::resize(&rgb, new_width, new_height, FilterType::Lanczos3)
        }
        None => rgb,
    };

    let mut quality: u8 = 100;
    let mut buffer = encode_jpeg(&rgb, quality)?;
    while buffer.len() as u64 > target_bytes && quality > QUALITY_FLOOR {
        quality -= QUALITY_STEP;
        buffer = encode_jpeg(&rgb, quality)?;
    }

    std::fs::write(output, &buffer)
        .with_context(|| format!("cannot write {}", output.display()))?;
    Ok(())
}

fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    encoder.encode_image(img).context("jpeg encode failed")?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn noisy_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let v = ((x * x + 7 * y * y) ^ (x * y)) as u8;
            image::Rgb([v, v.wrapping_mul(31), v.wrapping_add(97)])
        })
    }

    #[test]
    fn small_images_keep_their_dimensions() {
        assert_eq!(bounded_dimensions(1920, 1080), None);
        assert_eq!(bounded_dimensions(2560, 7440), None);
    }

    #[test]
    fn oversized_images_shrink_within_bounds() {
        for (w, h) in [(8000, 4000), (3000, 500), (2561, 1), (5000, 6000)] {
            let (nw, nh) = bounded_dimensions(w, h).unwrap();
            assert!(nw <= w && nh <= h, "{w}x{h} grew to {nw}x{nh}");
            assert!(nw + nh <= MAX_DIMENSION_SUM + 1, "{w}x{h} → {nw}x{nh}");
            assert!(nw <= MAX_WIDTH);
            // Aspect ratio roughly preserved
            let before = w as f64 / h as f64;
            let after = nw as f64 / nh as f64;
            assert!((before - after).abs() / before < 0.05);
        }
    }

    #[test]
    fn compresses_under_generous_target() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.jpg");
        noisy_image(320, 200).save(&input).unwrap();

        compress_image(&input, &output, 1024 * 1024).unwrap();

        let out = image::open(&output).unwrap();
        assert!(out.dimensions().0 <= 320 && out.dimensions().1 <= 200);
        assert!(std::fs::metadata(&output).unwrap().len() <= 1024 * 1024);
    }

    #[test]
    fn quality_floor_stops_the_walk() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.jpg");
        noisy_image(320, 200).save(&input).unwrap();

        // Impossible 1-byte target: the floor is reached, output still lands
        compress_image(&input, &output, 1).unwrap();

        let out = image::open(&output).unwrap();
        assert!(out.dimensions().0 <= 320 && out.dimensions().1 <= 200);
    }

    #[test]
    fn upload_limit_checks_size_and_dimension_sum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.png");
        noisy_image(64, 64).save(&path).unwrap();

        assert!(within_upload_limit(&path, Some(64), Some(64)));
        assert!(!within_upload_limit(&path, Some(9000), Some(2000)));
        assert!(within_upload_limit(&path, None, None));
        assert!(!within_upload_limit(&dir.path().join("missing.png"), None, None));
    }
}
