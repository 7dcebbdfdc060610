//! Watermark compositor: decode, place, blend, encode.
//!
//! This module turns raw image bytes into watermarked JPEG bytes. It is pure
//! CPU work with no I/O; callers fetch and store the bytes.
//!
//! # Placement
//!
//! The watermark is scaled to 15% of the base image width (aspect ratio
//! preserved) and anchored at the bottom-right corner, inset by 1% of the
//! base image height. All dimension arithmetic truncates toward zero, so
//! placement is deterministic for a given input size.
//!
//! # Blending
//!
//! Every watermark pixel is blended source-over at a constant 128/255 alpha.
//! The watermark's own alpha channel is not consulted.
//!
//! # Example
//!
//! ```ignore
//! use rakkan::compositor;
//!
//! let jpeg = compositor::composite(&base_bytes, Some(&watermark_bytes))?;
//! ```

mod error;

pub use error::CompositeError;

use crate::constants::{
    OUTPUT_JPEG_QUALITY, WATERMARK_ALPHA, WATERMARK_PADDING_RATIO, WATERMARK_SCALE_RATIO,
};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::io::Reader as ImageReader;
use image::{DynamicImage, Rgba, RgbaImage};
use std::io::Cursor;

/// Computed watermark placement on a base image.
///
/// `x`/`y` are signed: a watermark wider than the padding allows can start
/// left of the origin and is clipped during blending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Scaled watermark width.
    pub width: u32,
    /// Scaled watermark height.
    pub height: u32,
    /// Left edge of the watermark on the base image.
    pub x: i64,
    /// Top edge of the watermark on the base image.
    pub y: i64,
}

/// Compute where a watermark of the given original size lands on a base image.
///
/// Returns `None` when the base image is too small for a visible watermark
/// (scaled width truncates to zero) or the watermark has no area.
pub fn placement(
    base_width: u32,
    base_height: u32,
    watermark_width: u32,
    watermark_height: u32,
) -> Option<Placement> {
    if watermark_width == 0 || watermark_height == 0 {
        return None;
    }

    let target_width = (base_width as f64 * WATERMARK_SCALE_RATIO) as i64;
    if target_width <= 0 {
        return None;
    }

    let scale = target_width as f64 / watermark_width as f64;
    let target_height = (watermark_height as f64 * scale) as i64;
    let padding = (base_height as f64 * WATERMARK_PADDING_RATIO) as i64;

    Some(Placement {
        width: target_width as u32,
        height: target_height as u32,
        x: base_width as i64 - target_width - padding,
        y: base_height as i64 - target_height - padding,
    })
}

/// Produce watermarked JPEG bytes from raw image bytes.
///
/// Decodes `base` (JPEG or PNG), optionally decodes and places `watermark`,
/// and encodes the result as JPEG at the fixed output quality. The input
/// buffers are never mutated; the base is copied into a fresh working buffer
/// before any blending.
pub fn composite(base: &[u8], watermark: Option<&[u8]>) -> Result<Vec<u8>, CompositeError> {
    let base_image = decode(base).map_err(CompositeError::Decode)?;

    let watermark_image = match watermark {
        Some(data) => Some(decode(data).map_err(CompositeError::WatermarkDecode)?),
        None => None,
    };

    let mut canvas = base_image.to_rgba8();

    if let Some(wm) = watermark_image {
        if let Some(place) = placement(canvas.width(), canvas.height(), wm.width(), wm.height()) {
            let resized = wm
                .resize_exact(place.width, place.height, FilterType::Triangle)
                .to_rgba8();
            blend_at(&mut canvas, &resized, place.x, place.y);
        }
    }

    encode_jpeg(&canvas)
}

fn decode(data: &[u8]) -> Result<DynamicImage, String> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| e.to_string())?
        .decode()
        .map_err(|e| e.to_string())
}

/// Blend a watermark onto the target at the given origin, clipping to the
/// target bounds.
fn blend_at(target: &mut RgbaImage, watermark: &RgbaImage, x: i64, y: i64) {
    let target_width = target.width() as i64;
    let target_height = target.height() as i64;

    let x_start = x.max(0);
    let y_start = y.max(0);
    let x_end = (x + watermark.width() as i64).min(target_width);
    let y_end = (y + watermark.height() as i64).min(target_height);

    for ty in y_start..y_end {
        for tx in x_start..x_end {
            let wx = (tx - x) as u32;
            let wy = (ty - y) as u32;

            let wm_pixel = *watermark.get_pixel(wx, wy);
            let target_pixel = *target.get_pixel(tx as u32, ty as u32);

            let blended = blend_pixel(target_pixel, wm_pixel);
            target.put_pixel(tx as u32, ty as u32, blended);
        }
    }
}

/// Source-over blend at the fixed watermark opacity.
///
/// The foreground alpha is the constant mask, not the watermark pixel's own
/// alpha channel.
fn blend_pixel(background: Rgba<u8>, foreground: Rgba<u8>) -> Rgba<u8> {
    let fg_alpha = WATERMARK_ALPHA as f32 / 255.0;
    let bg_alpha = background[3] as f32 / 255.0;

    let out_alpha = fg_alpha + bg_alpha * (1.0 - fg_alpha);

    let blend_channel = |fg: u8, bg: u8| -> u8 {
        let fg_f = fg as f32 / 255.0;
        let bg_f = bg as f32 / 255.0;
        let result = (fg_f * fg_alpha + bg_f * bg_alpha * (1.0 - fg_alpha)) / out_alpha;
        (result * 255.0).clamp(0.0, 255.0) as u8
    };

    Rgba([
        blend_channel(foreground[0], background[0]),
        blend_channel(foreground[1], background[1]),
        blend_channel(foreground[2], background[2]),
        (out_alpha * 255.0) as u8,
    ])
}

fn encode_jpeg(canvas: &RgbaImage) -> Result<Vec<u8>, CompositeError> {
    let rgb_data = rgba_to_rgb(canvas.as_raw());

    let mut output = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut output, OUTPUT_JPEG_QUALITY);
    encoder
        .write_image(
            &rgb_data,
            canvas.width(),
            canvas.height(),
            image::ColorType::Rgb8,
        )
        .map_err(|e| CompositeError::Encode(e.to_string()))?;

    Ok(output)
}

/// Drop the alpha channel; JPEG has no transparency.
fn rgba_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(data.len() / 4 * 3);
    for pixel in data.chunks_exact(4) {
        rgb.push(pixel[0]);
        rgb.push(pixel[1]);
        rgb.push(pixel[2]);
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;
    use rstest::rstest;

    fn png_bytes(width: u32, height: u32, color: Rgba<u8>) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, color);
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    fn jpeg_bytes(width: u32, height: u32, color: Rgba<u8>) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, color)).to_rgb8();
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Jpeg).unwrap();
        buffer.into_inner()
    }

    fn decode_output(jpeg: &[u8]) -> RgbaImage {
        image::load_from_memory(jpeg).unwrap().to_rgba8()
    }

    // Test: Placement geometry truncates toward zero at every step
    #[rstest]
    #[case(1000, 800, 200, 100, 150, 75, 842, 717)]
    #[case(100, 100, 50, 25, 15, 7, 84, 92)]
    #[case(10, 10, 100, 100, 1, 1, 9, 9)]
    #[case(640, 480, 320, 320, 96, 96, 540, 380)]
    fn test_placement_geometry(
        #[case] base_w: u32,
        #[case] base_h: u32,
        #[case] wm_w: u32,
        #[case] wm_h: u32,
        #[case] width: u32,
        #[case] height: u32,
        #[case] x: i64,
        #[case] y: i64,
    ) {
        let place = placement(base_w, base_h, wm_w, wm_h).unwrap();
        assert_eq!(place.width, width);
        assert_eq!(place.height, height);
        assert_eq!(place.x, x);
        assert_eq!(place.y, y);
    }

    // Test: Bases too small for a visible watermark skip placement
    #[rstest]
    #[case(6, 6)]
    #[case(1, 1)]
    #[case(0, 0)]
    fn test_placement_skipped_for_tiny_base(#[case] base_w: u32, #[case] base_h: u32) {
        assert!(placement(base_w, base_h, 100, 100).is_none());
    }

    #[test]
    fn test_placement_skipped_for_empty_watermark() {
        assert!(placement(1000, 1000, 0, 100).is_none());
        assert!(placement(1000, 1000, 100, 0).is_none());
    }

    // Test: No watermark yields a JPEG with the base dimensions
    #[test]
    fn test_composite_without_watermark_preserves_dimensions() {
        let base = png_bytes(64, 48, Rgba([10, 200, 30, 255]));

        let output = composite(&base, None).unwrap();

        assert_eq!(&output[0..2], &[0xFF, 0xD8], "output should be JPEG");
        let decoded = decode_output(&output);
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 48);
    }

    #[test]
    fn test_composite_accepts_jpeg_base() {
        let base = jpeg_bytes(80, 60, Rgba([255, 255, 255, 255]));

        let output = composite(&base, None).unwrap();

        let decoded = decode_output(&output);
        assert_eq!(decoded.width(), 80);
        assert_eq!(decoded.height(), 60);
    }

    // Test: Watermark lands bottom-right at half opacity
    #[test]
    fn test_composite_places_watermark_bottom_right() {
        // 200x100 white base; 40x20 red watermark scales to 30x15 with
        // padding 1, so it covers x in [169, 199) and y in [84, 99)
        let base = png_bytes(200, 100, Rgba([255, 255, 255, 255]));
        let watermark = png_bytes(40, 20, Rgba([255, 0, 0, 255]));

        let output = composite(&base, Some(&watermark)).unwrap();
        let decoded = decode_output(&output);

        // Inside the watermark: red over white at 50% leaves red high and
        // pulls green down. JPEG at quality 50 is noisy, so assert ranges.
        let inside = decoded.get_pixel(184, 91);
        assert!(inside[0] > 180, "red channel too low: {:?}", inside);
        assert!(inside[1] < 200, "green channel too high: {:?}", inside);

        // Far from the watermark the base is untouched white.
        let outside = decoded.get_pixel(20, 20);
        assert!(outside[0] > 230 && outside[1] > 230 && outside[2] > 230);
    }

    // Test: The watermark's own alpha channel is ignored
    #[test]
    fn test_composite_ignores_watermark_alpha() {
        let base = png_bytes(200, 100, Rgba([255, 255, 255, 255]));
        // Fully transparent red watermark still blends at the constant mask
        let watermark = png_bytes(40, 20, Rgba([255, 0, 0, 0]));

        let output = composite(&base, Some(&watermark)).unwrap();
        let decoded = decode_output(&output);

        let inside = decoded.get_pixel(184, 91);
        assert!(
            inside[1] < 200,
            "transparent watermark should still darken green: {:?}",
            inside
        );
    }

    // Test: A base too small for a watermark is returned unwatermarked
    #[test]
    fn test_composite_skips_watermark_on_tiny_base() {
        let base = png_bytes(5, 5, Rgba([0, 0, 255, 255]));
        let watermark = png_bytes(40, 20, Rgba([255, 0, 0, 255]));

        let output = composite(&base, Some(&watermark)).unwrap();

        let decoded = decode_output(&output);
        assert_eq!(decoded.width(), 5);
        assert_eq!(decoded.height(), 5);
    }

    #[test]
    fn test_corrupt_base_is_decode_error() {
        let result = composite(b"definitely not an image", None);
        assert!(matches!(result, Err(CompositeError::Decode(_))));
    }

    #[test]
    fn test_corrupt_watermark_is_watermark_decode_error() {
        let base = png_bytes(100, 100, Rgba([255, 255, 255, 255]));

        let result = composite(&base, Some(b"garbage watermark"));
        assert!(matches!(result, Err(CompositeError::WatermarkDecode(_))));
    }

    // Test: Formats outside the JPEG/PNG contract fail to decode
    #[test]
    fn test_gif_input_is_decode_error() {
        // Valid GIF header; the GIF codec is not compiled in
        let gif = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;";

        let result = composite(gif, None);
        assert!(matches!(result, Err(CompositeError::Decode(_))));
    }

    // Test: Blend math at the constant mask over opaque white
    #[test]
    fn test_blend_pixel_half_red_over_white() {
        let bg = Rgba([255, 255, 255, 255]);
        let fg = Rgba([255, 0, 0, 255]);

        let result = blend_pixel(bg, fg);

        assert_eq!(result[0], 255);
        assert!(result[1] > 120 && result[1] < 132, "got {:?}", result);
        assert!(result[2] > 120 && result[2] < 132, "got {:?}", result);
        assert_eq!(result[3], 255);
    }

    #[test]
    fn test_blend_pixel_constant_mask_ignores_foreground_alpha() {
        let bg = Rgba([0, 0, 0, 255]);
        let opaque = blend_pixel(bg, Rgba([255, 255, 255, 255]));
        let transparent = blend_pixel(bg, Rgba([255, 255, 255, 0]));

        assert_eq!(opaque, transparent);
        assert!(opaque[0] > 120 && opaque[0] < 132);
    }

    #[test]
    fn test_rgba_to_rgb_drops_alpha() {
        let data = [1, 2, 3, 255, 4, 5, 6, 0];
        assert_eq!(rgba_to_rgb(&data), vec![1, 2, 3, 4, 5, 6]);
    }
}
