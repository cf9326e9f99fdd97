//! JPEG adapter over `zune-jpeg`.
//!
//! The compressed file is read into memory during `open` so the header can be
//! validated up front. `decode` runs the decompressor to RGB and then hands
//! the frame out as square tiles in raster order, the same shape a block
//! based decoder produces. Tiles along the right and bottom edges are cut to
//! the image size.

use alloc::vec::Vec;

use zune_jpeg::{
    JpegDecoder as Decompressor,
    zune_core::{
        colorspace::ColorSpace,
        options::DecoderOptions,
    },
};

use super::{
    Block,
    Completion,
    DecodeError,
    ImageDecoder,
    ImageInfo,
    Sink,
    alloc_buffer,
    check_dimensions,
};
use crate::{
    config::JPEG_TILE_SIZE,
    source::ImageSource,
};

const SOI: [u8; 2] = [0xFF, 0xD8];

/// Tiles are emitted as 8-bit RGB.
const OUT_BPP: u8 = 24;

fn options() -> DecoderOptions {
    DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGB)
}

/// JPEG decoder emitting [`JPEG_TILE_SIZE`] tiles.
pub struct JpegDecoder {
    data: Vec<u8>,
    info: Option<ImageInfo>,
    tile: u32,
}

impl Default for JpegDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl JpegDecoder {
    #[must_use]
    pub const fn new() -> Self {
        Self::with_tile_size(JPEG_TILE_SIZE)
    }

    /// Decoder emitting `tile` x `tile` blocks.
    #[must_use]
    pub const fn with_tile_size(tile: u32) -> Self {
        Self {
            data: Vec::new(),
            info: None,
            tile: if tile == 0 { 1 } else { tile },
        }
    }
}

impl ImageDecoder for JpegDecoder {
    fn open<S: ImageSource>(&mut self, source: &mut S) -> Result<ImageInfo, DecodeError> {
        self.close();
        source.rewind().map_err(DecodeError::storage)?;

        let mut data = alloc_buffer(source.size() as usize)?;
        source.read_exact(&mut data)?;
        if !data.starts_with(&SOI) {
            return Err(DecodeError::InvalidSignature);
        }

        let (width, height) = {
            let mut decompressor = Decompressor::new_with_options(data.as_slice(), options());
            if decompressor.decode_headers().is_err() {
                warn!("jpeg: header rejected");
                return Err(DecodeError::InvalidHeader);
            }
            decompressor
                .dimensions()
                .ok_or(DecodeError::InvalidHeader)?
        };
        let (width, height) = (width as u32, height as u32);
        check_dimensions(width, height)?;

        let info = ImageInfo {
            width,
            height,
            bpp: OUT_BPP,
        };
        debug!("jpeg: {}x{}, {} bytes", width, height, data.len());

        self.data = data;
        self.info = Some(info);
        Ok(info)
    }

    fn decode<S: ImageSource>(
        &mut self,
        _source: &mut S,
        sink: &mut Sink<'_>,
    ) -> Result<Completion, DecodeError> {
        let info = self.info.ok_or(DecodeError::NotOpen)?;
        let row_bytes = info.width as usize * 3;

        let frame = Decompressor::new_with_options(self.data.as_slice(), options())
            .decode()
            .map_err(|_| DecodeError::Corrupt("jpeg bitstream"))?;
        if frame.len() < row_bytes * info.height as usize {
            return Err(DecodeError::Corrupt("short jpeg frame"));
        }

        let mut tile = alloc_buffer(self.tile as usize * self.tile as usize * 3)?;
        for y in (0..info.height).step_by(self.tile as usize) {
            let height = self.tile.min(info.height - y);
            for x in (0..info.width).step_by(self.tile as usize) {
                let width = self.tile.min(info.width - x);
                let tile_row = width as usize * 3;

                for row in 0..height as usize {
                    let start = (y as usize + row) * row_bytes + x as usize * 3;
                    tile[row * tile_row..(row + 1) * tile_row]
                        .copy_from_slice(&frame[start..start + tile_row]);
                }

                let block = Block {
                    x,
                    y,
                    width,
                    height,
                    bpp: OUT_BPP,
                    pixels: &tile[..tile_row * height as usize],
                };
                if !sink(&block) {
                    debug!("jpeg: stopped at tile {},{}", x, y);
                    return Ok(Completion::Stopped);
                }
            }
        }

        Ok(Completion::Finished)
    }

    fn close(&mut self) {
        self.data = Vec::new();
        self.info = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{
        ImageStore,
        MemoryStore,
    };

    /// 40x24 baseline JPEG made of solid 8x8 blocks: columns 0..16 red,
    /// 16..32 green, 32..40 blue, and the bottom band 16..24 white.
    const BLOCKS: &[u8] = include_bytes!("../../tests/fixtures/blocks.jpg");

    fn close_to(pixel: &[u8], rgb: [u8; 3]) -> bool {
        pixel.iter().zip(rgb).all(|(&a, b)| a.abs_diff(b) <= 12)
    }

    fn expected(x: u32, y: u32) -> [u8; 3] {
        match (x, y) {
            (_, 16..) => [255, 255, 255],
            (0..16, _) => [255, 0, 0],
            (16..32, _) => [0, 255, 0],
            _ => [0, 0, 255],
        }
    }

    #[test]
    fn tiles_cover_image_in_raster_order() {
        let mut store = MemoryStore::new(1 << 16);
        store.write("blocks.jpg", BLOCKS).unwrap();
        let mut source = store.open("blocks.jpg").unwrap();

        let mut decoder = JpegDecoder::new();
        let info = decoder.open(&mut source).unwrap();
        assert_eq!(info, ImageInfo { width: 40, height: 24, bpp: 24 });

        let mut tiles = Vec::new();
        let done = decoder
            .decode(&mut source, &mut |block| {
                assert_eq!(block.pixels.len(), block.len() * 3);
                for (i, px) in block.pixels.chunks_exact(3).enumerate() {
                    let x = block.x + i as u32 % block.width;
                    let y = block.y + i as u32 / block.width;
                    assert!(close_to(px, expected(x, y)), "pixel {x},{y} is {px:?}");
                }
                tiles.push((block.x, block.y, block.width, block.height));
                true
            })
            .unwrap();

        assert_eq!(done, Completion::Finished);
        assert_eq!(
            tiles,
            [
                (0, 0, 16, 16),
                (16, 0, 16, 16),
                (32, 0, 8, 16),
                (0, 16, 16, 8),
                (16, 16, 16, 8),
                (32, 16, 8, 8),
            ]
        );
    }

    #[test]
    fn smaller_tiles_and_early_stop() {
        let mut store = MemoryStore::new(1 << 16);
        store.write("blocks.jpg", BLOCKS).unwrap();
        let mut source = store.open("blocks.jpg").unwrap();

        let mut decoder = JpegDecoder::with_tile_size(8);
        decoder.open(&mut source).unwrap();
        let mut count = 0;
        let done = decoder
            .decode(&mut source, &mut |block| {
                assert_eq!((block.width, block.height), (8, 8));
                count += 1;
                count < 7
            })
            .unwrap();
        assert_eq!(done, Completion::Stopped);
        assert_eq!(count, 7);
    }

    #[test]
    fn rejects_non_jpeg_data() {
        let mut store = MemoryStore::new(1 << 10);
        store.write("fake.jpg", b"\x89PNG\r\n\x1a\n").unwrap();
        store.write("cut.jpg", &BLOCKS[..4]).unwrap();

        let mut decoder = JpegDecoder::new();
        let mut source = store.open("fake.jpg").unwrap();
        assert_eq!(decoder.open(&mut source), Err(DecodeError::InvalidSignature));
        assert_eq!(
            decoder.decode(&mut source, &mut |_| true),
            Err(DecodeError::NotOpen)
        );

        let mut source = store.open("cut.jpg").unwrap();
        assert_eq!(decoder.open(&mut source), Err(DecodeError::InvalidHeader));
    }
}
