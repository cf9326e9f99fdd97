//! Test doubles: a recording framebuffer, a scripted decoder and NOR flash.

use alloc::vec::Vec;

use embedded_graphics::{
    Pixel,
    pixelcolor::Rgb565,
    prelude::*,
    primitives::Rectangle,
};

use embedded_storage::nor_flash::{
    NorFlash,
    NorFlashErrorKind,
    ReadNorFlash,
    check_erase,
    check_read,
    check_write,
};

use crate::{
    config::PANEL_SIZE,
    decoder::{
        Block,
        Completion,
        DecodeError,
        ImageDecoder,
        ImageInfo,
        Sink,
    },
    source::ImageSource,
};

/// Surface call, as seen by the framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Clear(Rgb565),
    Fill(Rectangle, Rgb565),
    Blit(Rectangle),
}

/// The framebuffer refused a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceFault;

/// In-memory 240x320 panel that records every bulk operation.
pub struct Framebuffer {
    pixels: Vec<Rgb565>,
    ops: Vec<Op>,
    blits_left: Option<usize>,
}

impl Framebuffer {
    pub fn new() -> Self {
        Self {
            pixels: vec![Rgb565::new(1, 2, 3); (PANEL_SIZE.width * PANEL_SIZE.height) as usize],
            ops: Vec::new(),
            blits_left: None,
        }
    }

    /// Framebuffer whose blits start failing after `n` succeed.
    pub fn failing_after(n: usize) -> Self {
        Self {
            blits_left: Some(n),
            ..Self::new()
        }
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn blits(&self) -> impl Iterator<Item = Rectangle> + '_ {
        self.ops.iter().filter_map(|op| match op {
            Op::Blit(area) => Some(*area),
            _ => None,
        })
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<Rgb565> {
        self.index(Point::new(x, y)).map(|i| self.pixels[i])
    }

    /// Pixels of `color` inside `area`.
    pub fn count(&self, area: Rectangle, color: Rgb565) -> usize {
        area.points()
            .filter(|&p| self.index(p).is_some_and(|i| self.pixels[i] == color))
            .count()
    }

    pub fn snapshot(&self) -> Vec<Rgb565> {
        self.pixels.clone()
    }

    fn index(&self, p: Point) -> Option<usize> {
        let size = PANEL_SIZE;
        (p.x >= 0 && p.y >= 0 && (p.x as u32) < size.width && (p.y as u32) < size.height)
            .then(|| p.y as usize * size.width as usize + p.x as usize)
    }
}

impl OriginDimensions for Framebuffer {
    fn size(&self) -> Size {
        PANEL_SIZE
    }
}

impl DrawTarget for Framebuffer {
    type Color = Rgb565;
    type Error = SurfaceFault;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), SurfaceFault>
    where
        I: IntoIterator<Item = Pixel<Rgb565>>,
    {
        for Pixel(p, color) in pixels {
            if let Some(i) = self.index(p) {
                self.pixels[i] = color;
            }
        }
        Ok(())
    }

    fn fill_contiguous<I>(&mut self, area: &Rectangle, colors: I) -> Result<(), SurfaceFault>
    where
        I: IntoIterator<Item = Rgb565>,
    {
        if let Some(left) = self.blits_left.as_mut() {
            if *left == 0 {
                return Err(SurfaceFault);
            }
            *left -= 1;
        }
        self.ops.push(Op::Blit(*area));
        self.draw_iter(area.points().zip(colors).map(|(p, c)| Pixel(p, c)))
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Rgb565) -> Result<(), SurfaceFault> {
        self.ops.push(Op::Fill(*area, color));
        self.draw_iter(area.points().map(|p| Pixel(p, color)))
    }

    fn clear(&mut self, color: Rgb565) -> Result<(), SurfaceFault> {
        self.ops.push(Op::Clear(color));
        self.pixels.fill(color);
        Ok(())
    }
}

/// Decoder that replays fixed blocks, then reports a fixed result.
pub struct ScriptedDecoder {
    pub info: ImageInfo,
    /// `(x, y, width, height, rgb)` solid blocks at 24 bpp.
    pub blocks: Vec<(u32, u32, u32, u32, [u8; 3])>,
    pub open_result: Result<(), DecodeError>,
    pub decode_result: Result<Completion, DecodeError>,
    pub opens: usize,
    pub decodes: usize,
    pub closes: usize,
}

impl ScriptedDecoder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            info: ImageInfo {
                width,
                height,
                bpp: 24,
            },
            blocks: Vec::new(),
            open_result: Ok(()),
            decode_result: Ok(Completion::Finished),
            opens: 0,
            decodes: 0,
            closes: 0,
        }
    }

    pub fn block(mut self, x: u32, y: u32, width: u32, height: u32, rgb: [u8; 3]) -> Self {
        self.blocks.push((x, y, width, height, rgb));
        self
    }

    pub fn ending_with(mut self, result: Result<Completion, DecodeError>) -> Self {
        self.decode_result = result;
        self
    }

    pub fn touched(&self) -> bool {
        self.opens + self.decodes > 0
    }
}

impl ImageDecoder for ScriptedDecoder {
    fn open<S: ImageSource>(&mut self, _source: &mut S) -> Result<ImageInfo, DecodeError> {
        self.opens += 1;
        self.open_result.map(|()| self.info)
    }

    fn decode<S: ImageSource>(
        &mut self,
        _source: &mut S,
        sink: &mut Sink<'_>,
    ) -> Result<Completion, DecodeError> {
        self.decodes += 1;
        for &(x, y, width, height, rgb) in &self.blocks {
            let pixels: Vec<u8> = rgb.repeat((width * height) as usize);
            let block = Block {
                x,
                y,
                width,
                height,
                bpp: self.info.bpp,
                pixels: &pixels,
            };
            if !sink(&block) {
                return Ok(Completion::Stopped);
            }
        }
        self.decode_result
    }

    fn close(&mut self) {
        self.closes += 1;
    }
}

/// RAM-backed NOR flash with 4-byte reads and writes and 4 KiB sectors.
///
/// Writes can only clear bits, like the real part.
pub struct MemFlash {
    bytes: Vec<u8>,
    pub erases: usize,
}

impl MemFlash {
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![0xFF; len],
            erases: 0,
        }
    }
}

impl embedded_storage::nor_flash::ErrorType for MemFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for MemFlash {
    const READ_SIZE: usize = 4;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), NorFlashErrorKind> {
        check_read(self, offset, bytes.len())?;
        let start = offset as usize;
        bytes.copy_from_slice(&self.bytes[start..start + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.bytes.len()
    }
}

impl NorFlash for MemFlash {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = 4096;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), NorFlashErrorKind> {
        check_erase(self, from, to)?;
        self.bytes[from as usize..to as usize].fill(0xFF);
        self.erases += 1;
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), NorFlashErrorKind> {
        check_write(self, offset, bytes.len())?;
        let start = offset as usize;
        for (cell, byte) in self.bytes[start..start + bytes.len()].iter_mut().zip(bytes) {
            *cell &= byte;
        }
        Ok(())
    }
}
