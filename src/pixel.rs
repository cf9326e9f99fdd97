//! Pixel conversion into the panel's native RGB565.
//!
//! Decoders hand over raw bytes at 16, 24 or 32 bits per pixel. Conversion is
//! plain truncation: no rounding, no dithering, alpha is read and dropped.

use embedded_graphics::pixelcolor::{
    Rgb565,
    raw::RawU16,
};

/// Packs an 8-bit-per-channel colour as `((R & 0xF8) << 8) | ((G & 0xFC) << 3) | (B >> 3)`.
#[inline]
#[must_use]
pub const fn rgb888_to_rgb565(r: u8, g: u8, b: u8) -> Rgb565 {
    Rgb565::new(r >> 3, g >> 2, b >> 3)
}

/// Bytes one source pixel occupies, or `None` for depths the panel path
/// does not handle.
#[inline]
#[must_use]
pub const fn bytes_per_pixel(bpp: u8) -> Option<usize> {
    match bpp {
        16 => Some(2),
        24 => Some(3),
        32 => Some(4),
        _ => None,
    }
}

/// Converts `out.len()` pixels of `bpp`-bit source data into `out`.
///
/// * 16 bpp is little-endian RGB565 and is passed through.
/// * 24 bpp is `R, G, B`.
/// * 32 bpp is `R, G, B, A`; alpha is ignored.
///
/// Returns the number of pixels written, bounded by `out.len()` and by the
/// whole pixels present in `pixels`. For any other depth `out` is left
/// untouched and `0` is returned.
pub fn convert(pixels: &[u8], bpp: u8, out: &mut [Rgb565]) -> usize {
    let Some(stride) = bytes_per_pixel(bpp) else {
        return 0;
    };

    let count = out.len().min(pixels.len() / stride);
    let src = pixels.chunks_exact(stride).take(count);

    match bpp {
        16 => {
            for (dst, px) in out.iter_mut().zip(src) {
                *dst = RawU16::new(u16::from_le_bytes([px[0], px[1]])).into();
            }
        }
        _ => {
            for (dst, px) in out.iter_mut().zip(src) {
                *dst = rgb888_to_rgb565(px[0], px[1], px[2]);
            }
        }
    }

    count
}
