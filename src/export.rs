//! Image export
//!
//! Readback of an accumulation surface arrives in a staging buffer whose rows
//! are padded to the copy alignment. [`unpad_rows`] strips that padding, the
//! linear radiance is tone mapped exactly like `shaders/present.wgsl`, and the
//! result is encoded as PNG.

use crate::error::{ExportError, ExportResult};
use glam::Vec3;
use image::{ImageOutputFormat, RgbaImage};
use std::io::Cursor;
use web_time::{SystemTime, UNIX_EPOCH};

/// Bytes per texel of the `Rgba32Float` accumulation surfaces
pub const ACCUMULATION_BYTES_PER_PIXEL: u32 = 16;

/// Row geometry of a texture-to-buffer copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadbackLayout {
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: u32,
    /// Bytes of real pixel data per row
    pub unpadded_bytes_per_row: u32,
    /// Row stride in the staging buffer, a multiple of the alignment
    pub padded_bytes_per_row: u32,
}

impl ReadbackLayout {
    pub fn new(width: u32, height: u32, bytes_per_pixel: u32, alignment: u32) -> Self {
        let unpadded_bytes_per_row = width * bytes_per_pixel;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(alignment) * alignment;
        Self {
            width,
            height,
            bytes_per_pixel,
            unpadded_bytes_per_row,
            padded_bytes_per_row,
        }
    }

    /// Staging buffer size needed for the copy
    pub fn buffer_size(&self) -> u64 {
        u64::from(self.padded_bytes_per_row) * u64::from(self.height)
    }

    pub fn is_padded(&self) -> bool {
        self.padded_bytes_per_row != self.unpadded_bytes_per_row
    }
}

/// Copy `height` rows of `unpadded_bytes_per_row` bytes out of a buffer with
/// a row stride of `padded_bytes_per_row`, dropping the padding.
pub fn unpad_rows(
    data: &[u8],
    padded_bytes_per_row: usize,
    unpadded_bytes_per_row: usize,
    height: usize,
) -> ExportResult<Vec<u8>> {
    if height == 0 {
        return Ok(Vec::new());
    }
    let required = padded_bytes_per_row * (height - 1) + unpadded_bytes_per_row;
    if data.len() < required || unpadded_bytes_per_row > padded_bytes_per_row {
        return Err(ExportError::ShortReadback {
            expected: required,
            actual: data.len(),
        });
    }

    let mut out = Vec::with_capacity(unpadded_bytes_per_row * height);
    for row in 0..height {
        let start = row * padded_bytes_per_row;
        out.extend_from_slice(&data[start..start + unpadded_bytes_per_row]);
    }
    Ok(out)
}

/// ACES filmic curve (Narkowicz fit)
fn aces(x: Vec3) -> Vec3 {
    let a = 2.51;
    let b = 0.03;
    let c = 2.43;
    let d = 0.59;
    let e = 0.14;
    ((x * (a * x + b)) / (x * (c * x + d) + e)).clamp(Vec3::ZERO, Vec3::ONE)
}

/// Map linear radiance to display-encoded [0, 1] color.
pub fn tonemap(radiance: Vec3) -> Vec3 {
    let mapped = aces(radiance.max(Vec3::ZERO));
    mapped.powf(1.0 / 2.2)
}

/// Tone map tightly packed RGBA32F texels into an 8-bit image.
pub fn radiance_to_rgba8(texels: &[u8], width: u32, height: u32) -> ExportResult<RgbaImage> {
    let pixel_count = width as usize * height as usize;
    let expected = pixel_count * ACCUMULATION_BYTES_PER_PIXEL as usize;
    if texels.len() < expected {
        return Err(ExportError::ShortReadback {
            expected,
            actual: texels.len(),
        });
    }

    let mut pixels = Vec::with_capacity(pixel_count * 4);
    for texel in texels[..expected].chunks_exact(ACCUMULATION_BYTES_PER_PIXEL as usize) {
        let rgba: [f32; 4] = bytemuck::pod_read_unaligned(texel);
        let color = tonemap(Vec3::new(rgba[0], rgba[1], rgba[2]));
        // NaN maps to 0 through the saturating float cast
        pixels.extend(color.to_array().map(|c| (c * 255.0 + 0.5) as u8));
        pixels.push(u8::MAX);
    }

    RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| ExportError::Delivery("pixel buffer does not match image size".into()))
}

pub fn encode_png(image: &RgbaImage) -> ExportResult<Vec<u8>> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)?;
    Ok(bytes)
}

/// `raytrace-<unix millis>.png`
pub fn export_file_name(timestamp_millis: u128) -> String {
    format!("raytrace-{}.png", timestamp_millis)
}

pub fn timestamped_file_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    export_file_name(millis)
}

/// Write encoded PNG bytes into `dir`, returning the file path.
#[cfg(not(target_arch = "wasm32"))]
pub fn save_png(png: &[u8], dir: &std::path::Path) -> ExportResult<std::path::PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(timestamped_file_name());
    std::fs::write(&path, png)?;
    log::info!("Exported {} ({} bytes)", path.display(), png.len());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_rows_are_stripped() {
        // 50 px at 4 bytes: 200 bytes of data in a 256 byte stride
        let layout = ReadbackLayout::new(50, 3, 4, 256);
        assert_eq!(layout.unpadded_bytes_per_row, 200);
        assert_eq!(layout.padded_bytes_per_row, 256);
        assert!(layout.is_padded());

        let mut data = vec![0xEEu8; layout.buffer_size() as usize];
        for row in 0..3 {
            for i in 0..200 {
                data[row * 256 + i] = row as u8;
            }
        }

        let out = unpad_rows(&data, 256, 200, 3).unwrap();
        assert_eq!(out.len(), 3 * 200);
        for row in 0..3 {
            assert!(out[row * 200..(row + 1) * 200].iter().all(|&b| b == row as u8));
        }
        assert!(!out.contains(&0xEE));
    }

    #[test]
    fn test_exact_stride_needs_no_padding() {
        let layout = ReadbackLayout::new(64, 2, 4, 256);
        assert!(!layout.is_padded());
        let data: Vec<u8> = (0..512).map(|i| (i % 251) as u8).collect();
        assert_eq!(unpad_rows(&data, 256, 256, 2).unwrap(), data);
    }

    #[test]
    fn test_float_surface_rows() {
        let layout = ReadbackLayout::new(50, 4, ACCUMULATION_BYTES_PER_PIXEL, 256);
        assert_eq!(layout.unpadded_bytes_per_row, 800);
        assert_eq!(layout.padded_bytes_per_row, 1024);
        assert_eq!(layout.buffer_size(), 4096);
    }

    #[test]
    fn test_last_row_may_be_unpadded() {
        let data = vec![1u8; 256 + 200];
        assert_eq!(unpad_rows(&data, 256, 200, 2).unwrap().len(), 400);
        assert!(matches!(
            unpad_rows(&data[..300], 256, 200, 2),
            Err(ExportError::ShortReadback { expected: 456, actual: 300 })
        ));
    }

    #[test]
    fn test_tonemap_range() {
        assert_eq!(tonemap(Vec3::ZERO), Vec3::ZERO);
        let hot = tonemap(Vec3::splat(1000.0));
        assert!(hot.cmple(Vec3::ONE).all() && hot.x > 0.99);
        assert_eq!(tonemap(Vec3::splat(-1.0)), Vec3::ZERO);
    }

    #[test]
    fn test_radiance_to_png() {
        let texels: Vec<f32> = vec![
            0.0, 0.0, 0.0, 1.0, //
            100.0, 100.0, 100.0, 1.0, //
            f32::NAN, 0.5, 0.0, 1.0, //
            0.2, 0.2, 0.2, 1.0,
        ];
        let image = radiance_to_rgba8(bytemuck::cast_slice(&texels), 2, 2).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert!(image.get_pixel(1, 0).0[0] >= 254);
        assert_eq!(image.get_pixel(0, 1).0[2], 0);

        let png = encode_png(&image).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_large_surface_size_does_not_wrap() {
        // 16384 x 16384 x 16 bytes is 4 GiB, past u32::MAX
        let result = radiance_to_rgba8(&[0u8; 64], 16384, 16384);
        assert!(matches!(
            result,
            Err(ExportError::ShortReadback { expected: 4_294_967_296, actual: 64 })
        ));
    }

    #[test]
    fn test_file_name() {
        assert_eq!(export_file_name(1_700_000_000_123), "raytrace-1700000000123.png");
        assert!(timestamped_file_name().starts_with("raytrace-"));
    }
}
