//! Decoder Adapters.
//!
//! Each adapter pulls compressed bytes from an [`ImageSource`] and pushes
//! decoded pixel [`Block`]s into a sink closure. PNG produces one scanline per
//! block, JPEG produces fixed-size tiles. The sink returns `false` to stop the
//! decode early; that is reported as [`Completion::Stopped`], not an error.
//!
//! The lifecycle is `open` (header only), `decode`, then `close`. The same
//! source handle is passed to `open` and `decode`.

mod jpeg;
mod png;

use alloc::vec::Vec;
use core::fmt;

use embedded_graphics::{
    prelude::*,
    primitives::Rectangle,
};
use embedded_io::{
    Error as _,
    ErrorKind,
    ReadExactError,
};

pub use self::{
    jpeg::JpegDecoder,
    png::PngDecoder,
};
use crate::{
    config::MAX_IMAGE_PIXELS,
    source::ImageSource,
};

/// Image container formats, picked by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ImageFormat {
    Png,
    Jpeg,
    Unsupported,
}

impl ImageFormat {
    /// Classifies `name` by its extension, case-insensitively.
    ///
    /// `.png` is PNG, `.jpg` and `.jpeg` are JPEG. Everything else, including a
    /// name without a dot, is unsupported.
    #[must_use]
    pub fn from_filename(name: &str) -> Self {
        let Some((_, ext)) = name.rsplit_once('.') else {
            return Self::Unsupported;
        };

        if ext.eq_ignore_ascii_case("png") {
            Self::Png
        } else if ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg") {
            Self::Jpeg
        } else {
            Self::Unsupported
        }
    }
}

/// Header facts known after `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    /// Depth of the blocks `decode` will emit.
    pub bpp: u8,
}

/// A rectangle of decoded pixels in image coordinates.
///
/// `pixels` is row-major with no padding between rows.
#[derive(Debug, Clone, Copy)]
pub struct Block<'a> {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub bpp: u8,
    pub pixels: &'a [u8],
}

impl Block<'_> {
    /// Area the block covers, in image coordinates.
    #[must_use]
    pub fn region(&self) -> Rectangle {
        Rectangle::new(
            Point::new(self.x as i32, self.y as i32),
            Size::new(self.width, self.height),
        )
    }

    /// Number of pixels in the block.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How a decode that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Completion {
    /// Every block was emitted.
    Finished,
    /// The sink asked to stop.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// The source failed to read or seek.
    Storage(ErrorKind),
    /// The file ended before the decoder was done with it.
    UnexpectedEof,
    /// `decode` without a successful `open`.
    NotOpen,
    InvalidSignature,
    InvalidHeader,
    /// Valid file using a feature this decoder leaves out.
    Unsupported(&'static str),
    Corrupt(&'static str),
    /// More pixels than [`MAX_IMAGE_PIXELS`].
    TooLarge,
    OutOfMemory,
}

impl DecodeError {
    pub(crate) fn storage<E: embedded_io::Error>(err: E) -> Self {
        Self::Storage(err.kind())
    }
}

impl<E: embedded_io::Error> From<ReadExactError<E>> for DecodeError {
    fn from(err: ReadExactError<E>) -> Self {
        match err {
            ReadExactError::UnexpectedEof => Self::UnexpectedEof,
            ReadExactError::Other(e) => Self::storage(e),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(kind) => write!(f, "storage error: {kind:?}"),
            Self::UnexpectedEof => f.write_str("unexpected end of file"),
            Self::NotOpen => f.write_str("decoder not open"),
            Self::InvalidSignature => f.write_str("bad file signature"),
            Self::InvalidHeader => f.write_str("bad image header"),
            Self::Unsupported(what) => write!(f, "unsupported: {what}"),
            Self::Corrupt(what) => write!(f, "corrupt data: {what}"),
            Self::TooLarge => f.write_str("image too large"),
            Self::OutOfMemory => f.write_str("out of memory"),
        }
    }
}

/// Receives decoded blocks. Returning `false` stops the decode.
pub type Sink<'s> = dyn FnMut(&Block<'_>) -> bool + 's;

/// A streaming image decoder.
pub trait ImageDecoder {
    /// Reads the header from `source` and prepares to decode.
    fn open<S: ImageSource>(&mut self, source: &mut S) -> Result<ImageInfo, DecodeError>;

    /// Decodes the image opened from `source`, feeding `sink` block by block.
    fn decode<S: ImageSource>(
        &mut self,
        source: &mut S,
        sink: &mut Sink<'_>,
    ) -> Result<Completion, DecodeError>;

    /// Releases per-image state. Safe to call when nothing is open.
    fn close(&mut self);
}

// ── Helpers shared by the adapters ──────────────────────────────────────────

pub(crate) fn check_dimensions(width: u32, height: u32) -> Result<(), DecodeError> {
    if width == 0 || height == 0 {
        return Err(DecodeError::InvalidHeader);
    }
    match width.checked_mul(height) {
        Some(pixels) if pixels <= MAX_IMAGE_PIXELS => Ok(()),
        _ => Err(DecodeError::TooLarge),
    }
}

/// Zeroed buffer of `len` bytes, or [`DecodeError::OutOfMemory`].
pub(crate) fn alloc_buffer(len: usize) -> Result<Vec<u8>, DecodeError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| DecodeError::OutOfMemory)?;
    buf.resize(len, 0);
    Ok(buf)
}
