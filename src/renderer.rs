//! Renderer: turns "display this file" into pixels on the panel.
//!
//! One call runs the whole pipeline synchronously: resolve the name in the
//! store, clear the surface, pick a decoder from the extension, stream blocks
//! through the pixel converter onto the surface, and put a diagnostic panel up
//! when anything goes wrong. Nothing is cached between calls.

use alloc::vec::Vec;

use embedded_graphics::{
    pixelcolor::Rgb565,
    prelude::*,
    primitives::Rectangle,
};

use crate::{
    config::BACKGROUND,
    decoder::{
        Block,
        Completion,
        DecodeError,
        ImageDecoder,
        ImageFormat,
        JpegDecoder,
        PngDecoder,
    },
    diagnostic::Diagnostic,
    pixel,
    source::{
        ImageSource,
        ImageStore,
    },
    surface,
};

/// Terminal state of one display request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    Displayed,
    NotFound,
    Unsupported,
    DecodeFailed,
}

impl Outcome {
    pub const fn is_displayed(self) -> bool {
        matches!(self, Self::Displayed)
    }
}

/// Per-call drawing state handed to the decoder's sink.
struct DrawContext<'t, D> {
    target: &'t mut D,
    origin: Point,
    panel: Rectangle,
    pixels: &'t mut Vec<Rgb565>,
    blocks: usize,
    surface_failed: bool,
    warned_depth: bool,
}

impl<D> DrawContext<'_, D>
where
    D: DrawTarget<Color = Rgb565>,
{
    /// Draws one decoded block. Returns `false` when decoding should stop.
    fn draw(&mut self, block: &Block<'_>) -> bool {
        let region = block.region().translate(self.origin);
        if surface::clip_to_panel(region, self.panel).is_none() {
            // Blocks arrive top to bottom, so once one starts below the
            // panel nothing later can be visible.
            return region.top_left.y < self.panel.top_left.y + self.panel.size.height as i32;
        }

        let len = block.len();
        if self.pixels.len() < len {
            self.pixels.resize(len, BACKGROUND);
        }
        let converted = pixel::convert(block.pixels, block.bpp, &mut self.pixels[..len]);
        if converted == 0 {
            if !self.warned_depth {
                warn!("display: skipping blocks at {} bpp", block.bpp);
                self.warned_depth = true;
            }
            return true;
        }

        match surface::blit_clipped(&mut *self.target, region, &self.pixels[..len]) {
            Ok(_) => {
                self.blocks += 1;
                true
            }
            Err(_) => {
                error!("display: surface write failed at {},{}", block.x, block.y);
                self.surface_failed = true;
                false
            }
        }
    }
}

/// Displays stored images on a draw target.
pub struct Renderer<St, P = PngDecoder, J = JpegDecoder> {
    store: St,
    png: P,
    jpeg: J,
    pixels: Vec<Rgb565>,
}

impl<St: ImageStore> Renderer<St> {
    /// Renderer using the built-in PNG and JPEG decoders.
    pub fn new(store: St) -> Self {
        Self::with_decoders(store, PngDecoder::new(), JpegDecoder::new())
    }
}

impl<St, P, J> Renderer<St, P, J>
where
    St: ImageStore,
    P: ImageDecoder,
    J: ImageDecoder,
{
    pub fn with_decoders(store: St, png: P, jpeg: J) -> Self {
        Self {
            store,
            png,
            jpeg,
            pixels: Vec::new(),
        }
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut St {
        &mut self.store
    }

    pub fn png_decoder(&self) -> &P {
        &self.png
    }

    pub fn jpeg_decoder(&self) -> &J {
        &self.jpeg
    }

    /// Shows `filename` from the store, or a diagnostic panel explaining why
    /// it could not be shown.
    pub fn display<D>(&mut self, target: &mut D, filename: &str) -> Outcome
    where
        D: DrawTarget<Color = Rgb565>,
    {
        self.display_with_scaling(target, filename, true)
    }

    /// Like [`display`](Self::display). Images are expected to be sized for
    /// the panel already, so `center` is accepted but the image is always
    /// drawn at the top-left corner.
    pub fn display_with_scaling<D>(&mut self, target: &mut D, filename: &str, center: bool) -> Outcome
    where
        D: DrawTarget<Color = Rgb565>,
    {
        info!("display: request for {}", filename);

        if !self.store.exists(filename) {
            error!("display: file not found: {}", filename);
            clear(target);
            show(target, Diagnostic::NotFound(filename));
            return Outcome::NotFound;
        }

        clear(target);
        debug!("display: cleared, center={} ignored", center);

        let format = ImageFormat::from_filename(filename);
        let origin = Point::zero();
        let result = match format {
            ImageFormat::Png => {
                debug!("display: PNG");
                self.draw_png(target, filename, origin)
            }
            ImageFormat::Jpeg => {
                debug!("display: JPEG");
                self.draw_jpeg(target, filename, origin)
            }
            ImageFormat::Unsupported => {
                warn!("display: unsupported format: {}", filename);
                show(target, Diagnostic::Unsupported(filename));
                return Outcome::Unsupported;
            }
        };

        match result {
            Ok(()) => {
                info!("display: shown {}", filename);
                Outcome::Displayed
            }
            Err(failure) => {
                error!("display: failed to show {}: {:?}", filename, failure);
                show(target, Diagnostic::DecodeFailed(filename));
                Outcome::DecodeFailed
            }
        }
    }

    fn draw_png<D>(&mut self, target: &mut D, filename: &str, origin: Point) -> Result<(), DrawFailure>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        let mut source = self.store.open(filename).map_err(|e| {
            error!("display: open failed: {:?}", e);
            DrawFailure::Storage
        })?;

        let info = self.png.open(&mut source).map_err(|e| {
            error!("display: PNG open failed: {:?}", e);
            self.png.close();
            DrawFailure::Decode
        })?;
        info!("display: PNG {}x{} at {} bpp", info.width, info.height, info.bpp);

        let painted = paint(&mut self.png, &mut source, target, origin, &mut self.pixels);
        self.png.close();

        match painted.result {
            _ if painted.surface_failed => Err(DrawFailure::Surface),
            Ok(completion) => {
                debug!("display: PNG {:?} after {} rows", completion, painted.blocks);
                Ok(())
            }
            Err(e) => {
                error!("display: PNG decode failed after {} rows: {:?}", painted.blocks, e);
                Err(DrawFailure::Decode)
            }
        }
    }

    /// JPEG failures short of a surface error are reported as shown: the
    /// decoder may already have painted tiles when it gives up.
    fn draw_jpeg<D>(&mut self, target: &mut D, filename: &str, origin: Point) -> Result<(), DrawFailure>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        let mut source = match self.store.open(filename) {
            Ok(source) => source,
            Err(e) => {
                warn!("display: JPEG open reported {:?}, treating as shown", e);
                return Ok(());
            }
        };

        let info = match self.jpeg.open(&mut source) {
            Ok(info) => info,
            Err(e) => {
                warn!("display: JPEG header reported {:?}, treating as shown", e);
                self.jpeg.close();
                return Ok(());
            }
        };
        info!("display: JPEG {}x{}", info.width, info.height);

        let painted = paint(&mut self.jpeg, &mut source, target, origin, &mut self.pixels);
        self.jpeg.close();

        match painted.result {
            _ if painted.surface_failed => return Err(DrawFailure::Surface),
            Ok(completion) => {
                debug!("display: JPEG {:?} after {} tiles", completion, painted.blocks);
            }
            Err(e) => warn!(
                "display: JPEG decoder reported {:?} after {} tiles, keeping the image",
                e, painted.blocks
            ),
        }
        Ok(())
    }
}

/// Why a decode did not make it onto the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum DrawFailure {
    Storage,
    Decode,
    Surface,
}

/// How one decode pass went.
struct Painted {
    result: Result<Completion, DecodeError>,
    blocks: usize,
    surface_failed: bool,
}

/// Decodes an opened `source` onto `target` with the image's top-left corner
/// at `origin`.
fn paint<Dec, S, D>(
    decoder: &mut Dec,
    source: &mut S,
    target: &mut D,
    origin: Point,
    pixels: &mut Vec<Rgb565>,
) -> Painted
where
    Dec: ImageDecoder,
    S: ImageSource,
    D: DrawTarget<Color = Rgb565>,
{
    let panel = target.bounding_box();
    let mut ctx = DrawContext {
        target,
        origin,
        panel,
        pixels,
        blocks: 0,
        surface_failed: false,
        warned_depth: false,
    };
    let result = decoder.decode(source, &mut |block: &Block<'_>| ctx.draw(block));

    Painted {
        result,
        blocks: ctx.blocks,
        surface_failed: ctx.surface_failed,
    }
}

fn clear<D>(target: &mut D)
where
    D: DrawTarget<Color = Rgb565>,
{
    if surface::clear(target, BACKGROUND).is_err() {
        warn!("display: clear failed");
    }
}

fn show<D>(target: &mut D, panel: Diagnostic<'_>)
where
    D: DrawTarget<Color = Rgb565>,
{
    if panel.draw(target).is_err() {
        warn!("display: could not draw diagnostic panel");
    }
}
