//! Streaming PNG adapter.
//!
//! Chunks are pulled from the source on demand and IDAT data is inflated
//! straight into a single scanline buffer, so memory use is a few rows plus
//! the inflate window regardless of image height. Every colour type and bit
//! depth of non-interlaced PNG is normalised to 8-bit RGB, or RGBA when the
//! image carries alpha. Chunk CRCs are not checked.

use alloc::{
    boxed::Box,
    vec::Vec,
};

use embedded_io::SeekFrom;
use miniz_oxide::{
    DataFormat,
    MZError,
    MZFlush,
    MZStatus,
    inflate::stream::{
        InflateState,
        inflate,
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
use crate::source::ImageSource;

const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Compressed bytes pulled from the source per refill.
const READ_CHUNK: usize = 1024;

const FILTER_NONE: u8 = 0;
const FILTER_SUB: u8 = 1;
const FILTER_UP: u8 = 2;
const FILTER_AVERAGE: u8 = 3;
const FILTER_PAETH: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorType {
    Grey,
    Rgb,
    Indexed,
    GreyAlpha,
    Rgba,
}

impl ColorType {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Grey),
            2 => Some(Self::Rgb),
            3 => Some(Self::Indexed),
            4 => Some(Self::GreyAlpha),
            6 => Some(Self::Rgba),
            _ => None,
        }
    }

    const fn channels(self) -> usize {
        match self {
            Self::Grey | Self::Indexed => 1,
            Self::GreyAlpha => 2,
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }

    const fn allows_depth(self, depth: u8) -> bool {
        match self {
            Self::Grey => matches!(depth, 1 | 2 | 4 | 8 | 16),
            Self::Indexed => matches!(depth, 1 | 2 | 4 | 8),
            Self::Rgb | Self::GreyAlpha | Self::Rgba => matches!(depth, 8 | 16),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Header {
    width: u32,
    height: u32,
    depth: u8,
    color_type: ColorType,
}

impl Header {
    fn parse(ihdr: &[u8; 13]) -> Result<Self, DecodeError> {
        let width = u32::from_be_bytes([ihdr[0], ihdr[1], ihdr[2], ihdr[3]]);
        let height = u32::from_be_bytes([ihdr[4], ihdr[5], ihdr[6], ihdr[7]]);
        let depth = ihdr[8];
        let color_type = ColorType::from_byte(ihdr[9]).ok_or(DecodeError::InvalidHeader)?;

        if !color_type.allows_depth(depth) || ihdr[10] != 0 || ihdr[11] != 0 {
            return Err(DecodeError::InvalidHeader);
        }
        match ihdr[12] {
            0 => {}
            1 => return Err(DecodeError::Unsupported("interlaced PNG")),
            _ => return Err(DecodeError::InvalidHeader),
        }
        check_dimensions(width, height)?;

        Ok(Self {
            width,
            height,
            depth,
            color_type,
        })
    }

    /// Bytes of one unfiltered scanline, without the filter byte.
    fn line_bytes(&self) -> usize {
        (self.width as usize * self.color_type.channels() * usize::from(self.depth)).div_ceil(8)
    }

    /// Distance in bytes to the "left" pixel used by the filters.
    fn filter_stride(&self) -> usize {
        (self.color_type.channels() * usize::from(self.depth) / 8).max(1)
    }
}

/// Everything `open` learnt about the current image.
struct Image {
    header: Header,
    /// RGBA entries; alpha comes from tRNS.
    palette: Vec<[u8; 4]>,
    /// Colour key from tRNS for greyscale and RGB images, in raw samples.
    color_key: Option<[u16; 3]>,
    has_alpha: bool,
    /// File offset of the first IDAT chunk.
    data_offset: u64,
}

impl Image {
    const fn out_bytes(&self) -> usize {
        if self.has_alpha { 4 } else { 3 }
    }

    const fn out_bpp(&self) -> u8 {
        if self.has_alpha { 32 } else { 24 }
    }

    /// Expands an unfiltered scanline to 8-bit RGB or RGBA.
    fn expand(&self, raw: &[u8], out: &mut [u8]) -> Result<(), DecodeError> {
        let depth = self.header.depth;
        let channels = self.header.color_type.channels();

        for (x, px) in out.chunks_exact_mut(self.out_bytes()).enumerate() {
            let at = |c: usize| sample(raw, x * channels + c, depth);
            let rgba = match self.header.color_type {
                ColorType::Grey => {
                    let v = at(0);
                    let g = to_u8(v, depth);
                    [g, g, g, self.key_alpha([v, v, v])]
                }
                ColorType::Rgb => {
                    let rgb = [at(0), at(1), at(2)];
                    [
                        to_u8(rgb[0], depth),
                        to_u8(rgb[1], depth),
                        to_u8(rgb[2], depth),
                        self.key_alpha(rgb),
                    ]
                }
                ColorType::Indexed => *self
                    .palette
                    .get(usize::from(at(0)))
                    .ok_or(DecodeError::Corrupt("palette index out of range"))?,
                ColorType::GreyAlpha => {
                    let g = to_u8(at(0), depth);
                    [g, g, g, to_u8(at(1), depth)]
                }
                ColorType::Rgba => [
                    to_u8(at(0), depth),
                    to_u8(at(1), depth),
                    to_u8(at(2), depth),
                    to_u8(at(3), depth),
                ],
            };
            px.copy_from_slice(&rgba[..px.len()]);
        }

        Ok(())
    }

    fn key_alpha(&self, samples: [u16; 3]) -> u8 {
        match self.color_key {
            Some(key) if key == samples => 0,
            _ => 0xFF,
        }
    }
}

/// Reads the `index`-th sample of a scanline at `depth` bits.
#[inline]
fn sample(raw: &[u8], index: usize, depth: u8) -> u16 {
    match depth {
        16 => u16::from_be_bytes([raw[index * 2], raw[index * 2 + 1]]),
        8 => u16::from(raw[index]),
        _ => {
            let bits = usize::from(depth);
            let per_byte = 8 / bits;
            let shift = (per_byte - 1 - index % per_byte) * bits;
            let mask = (1u8 << bits) - 1;
            u16::from((raw[index / per_byte] >> shift) & mask)
        }
    }
}

/// Scales a sample to 8 bits. 16-bit samples keep their high byte.
#[inline]
fn to_u8(value: u16, depth: u8) -> u8 {
    match depth {
        16 => (value >> 8) as u8,
        8 => value as u8,
        _ => (value * 255 / ((1u16 << depth) - 1)) as u8,
    }
}

fn read_chunk_header<S: ImageSource>(source: &mut S) -> Result<(u32, [u8; 4]), DecodeError> {
    let mut buf = [0u8; 8];
    source.read_exact(&mut buf)?;
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if len > 0x7FFF_FFFF {
        return Err(DecodeError::Corrupt("chunk length"));
    }
    Ok((len, [buf[4], buf[5], buf[6], buf[7]]))
}

fn skip<S: ImageSource>(source: &mut S, bytes: u32) -> Result<(), DecodeError> {
    source
        .seek(SeekFrom::Current(i64::from(bytes)))
        .map_err(DecodeError::storage)?;
    Ok(())
}

/// Reads a small chunk body plus its CRC.
fn read_body<S: ImageSource>(source: &mut S, len: u32, max: u32) -> Result<Vec<u8>, DecodeError> {
    if len > max {
        return Err(DecodeError::Corrupt("oversized chunk"));
    }
    let mut body = alloc_buffer(len as usize)?;
    source.read_exact(&mut body)?;
    skip(source, 4)?;
    Ok(body)
}

/// Walks consecutive IDAT chunks as one byte stream.
struct IdatReader {
    remaining: u32,
    started: bool,
    done: bool,
}

impl IdatReader {
    const fn new() -> Self {
        Self {
            remaining: 0,
            started: false,
            done: false,
        }
    }

    fn next_chunk<S: ImageSource>(&mut self, source: &mut S) -> Result<(), DecodeError> {
        if self.started {
            skip(source, 4)?;
        }
        self.started = true;

        let (len, kind) = read_chunk_header(source)?;
        if &kind == b"IDAT" {
            trace!("png: IDAT chunk of {} bytes", len);
            self.remaining = len;
        } else {
            self.done = true;
        }
        Ok(())
    }

    fn read<S: ImageSource>(&mut self, source: &mut S, buf: &mut [u8]) -> Result<usize, DecodeError> {
        while self.remaining == 0 && !self.done {
            self.next_chunk(source)?;
        }
        if self.done {
            return Ok(0);
        }

        let want = buf.len().min(self.remaining as usize);
        let n = source.read(&mut buf[..want]).map_err(DecodeError::storage)?;
        if n == 0 {
            return Err(DecodeError::UnexpectedEof);
        }
        self.remaining -= n as u32;
        Ok(n)
    }
}

/// Reverses a scanline filter in place.
pub(crate) fn unfilter(
    filter: u8,
    row: &mut [u8],
    prev: &[u8],
    stride: usize,
) -> Result<(), DecodeError> {
    match filter {
        FILTER_NONE => {}
        FILTER_SUB => {
            for i in stride..row.len() {
                row[i] = row[i].wrapping_add(row[i - stride]);
            }
        }
        FILTER_UP => {
            for (byte, up) in row.iter_mut().zip(prev) {
                *byte = byte.wrapping_add(*up);
            }
        }
        FILTER_AVERAGE => {
            for i in 0..row.len() {
                let left = if i >= stride { u16::from(row[i - stride]) } else { 0 };
                let up = u16::from(prev[i]);
                row[i] = row[i].wrapping_add(((left + up) / 2) as u8);
            }
        }
        FILTER_PAETH => {
            for i in 0..row.len() {
                let (left, corner) = if i >= stride {
                    (row[i - stride], prev[i - stride])
                } else {
                    (0, 0)
                };
                row[i] = row[i].wrapping_add(paeth(left, prev[i], corner));
            }
        }
        _ => return Err(DecodeError::Corrupt("unknown filter type")),
    }
    Ok(())
}

#[inline]
fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let (a16, b16, c16) = (i16::from(a), i16::from(b), i16::from(c));
    let p = a16 + b16 - c16;
    let pa = (p - a16).unsigned_abs();
    let pb = (p - b16).unsigned_abs();
    let pc = (p - c16).unsigned_abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// PNG decoder emitting one scanline per block.
#[derive(Default)]
pub struct PngDecoder {
    image: Option<Image>,
}

impl PngDecoder {
    #[must_use]
    pub const fn new() -> Self {
        Self { image: None }
    }
}

impl ImageDecoder for PngDecoder {
    fn open<S: ImageSource>(&mut self, source: &mut S) -> Result<ImageInfo, DecodeError> {
        self.close();
        source.rewind().map_err(DecodeError::storage)?;

        let mut signature = [0u8; 8];
        source.read_exact(&mut signature)?;
        if signature != SIGNATURE {
            return Err(DecodeError::InvalidSignature);
        }

        let (len, kind) = read_chunk_header(source)?;
        if &kind != b"IHDR" || len != 13 {
            return Err(DecodeError::InvalidHeader);
        }
        let mut ihdr = [0u8; 13];
        source.read_exact(&mut ihdr)?;
        skip(source, 4)?;
        let header = Header::parse(&ihdr)?;

        let mut palette = Vec::new();
        let mut color_key = None;
        let mut trns = false;

        let data_offset = loop {
            let offset = source.stream_position().map_err(DecodeError::storage)?;
            let (len, kind) = read_chunk_header(source)?;
            match &kind {
                b"IDAT" => break offset,
                b"PLTE" => {
                    let body = read_body(source, len, 256 * 3)?;
                    if body.len() % 3 != 0 {
                        return Err(DecodeError::Corrupt("palette length"));
                    }
                    palette = body.chunks_exact(3).map(|c| [c[0], c[1], c[2], 0xFF]).collect();
                }
                b"tRNS" => {
                    let body = read_body(source, len, 256)?;
                    trns = true;
                    match header.color_type {
                        ColorType::Indexed => {
                            for (entry, alpha) in palette.iter_mut().zip(&body) {
                                entry[3] = *alpha;
                            }
                        }
                        ColorType::Grey if body.len() >= 2 => {
                            let v = u16::from_be_bytes([body[0], body[1]]);
                            color_key = Some([v; 3]);
                        }
                        ColorType::Rgb if body.len() >= 6 => {
                            color_key = Some([
                                u16::from_be_bytes([body[0], body[1]]),
                                u16::from_be_bytes([body[2], body[3]]),
                                u16::from_be_bytes([body[4], body[5]]),
                            ]);
                        }
                        _ => trns = false,
                    }
                }
                b"IEND" => return Err(DecodeError::Corrupt("no image data")),
                _ => {
                    trace!("png: skipping chunk of {} bytes", len);
                    skip(source, len + 4)?;
                }
            }
        };

        if header.color_type == ColorType::Indexed && palette.is_empty() {
            return Err(DecodeError::Corrupt("missing palette"));
        }

        let has_alpha = trns || matches!(header.color_type, ColorType::GreyAlpha | ColorType::Rgba);
        let image = Image {
            header,
            palette,
            color_key,
            has_alpha,
            data_offset,
        };
        let info = ImageInfo {
            width: header.width,
            height: header.height,
            bpp: image.out_bpp(),
        };
        debug!(
            "png: {}x{} depth {} -> {} bpp",
            info.width, info.height, header.depth, info.bpp
        );

        self.image = Some(image);
        Ok(info)
    }

    fn decode<S: ImageSource>(
        &mut self,
        source: &mut S,
        sink: &mut Sink<'_>,
    ) -> Result<Completion, DecodeError> {
        let image = self.image.as_ref().ok_or(DecodeError::NotOpen)?;
        let header = image.header;
        source
            .seek(SeekFrom::Start(image.data_offset))
            .map_err(DecodeError::storage)?;

        let line_bytes = header.line_bytes();
        let stride = header.filter_stride();

        let mut input = alloc_buffer(READ_CHUNK)?;
        let mut row = alloc_buffer(line_bytes + 1)?;
        let mut prev = alloc_buffer(line_bytes)?;
        let mut line = alloc_buffer(header.width as usize * image.out_bytes())?;
        let mut inflater: Box<InflateState> = InflateState::new_boxed(DataFormat::Zlib);
        let mut idat = IdatReader::new();

        let (mut in_pos, mut in_len) = (0, 0);
        let mut filled = 0;
        let mut y = 0;

        while y < header.height {
            if in_pos == in_len && !idat.done {
                in_len = idat.read(source, &mut input)?;
                in_pos = 0;
            }

            let result = inflate(
                &mut inflater,
                &input[in_pos..in_len],
                &mut row[filled..],
                MZFlush::None,
            );
            in_pos += result.bytes_consumed;
            filled += result.bytes_written;

            if filled == row.len() {
                let (filter, data) = row.split_at_mut(1);
                unfilter(filter[0], data, &prev, stride)?;
                image.expand(data, &mut line)?;

                let block = Block {
                    x: 0,
                    y,
                    width: header.width,
                    height: 1,
                    bpp: image.out_bpp(),
                    pixels: &line,
                };
                if !sink(&block) {
                    debug!("png: stopped at row {}", y);
                    return Ok(Completion::Stopped);
                }

                prev.copy_from_slice(data);
                filled = 0;
                y += 1;
                continue;
            }

            let starved = in_pos == in_len && idat.done;
            match result.status {
                Ok(MZStatus::StreamEnd) => return Err(DecodeError::UnexpectedEof),
                Ok(_) | Err(MZError::Buf) => {}
                Err(_) => return Err(DecodeError::Corrupt("zlib stream")),
            }
            if result.bytes_consumed == 0 && result.bytes_written == 0 {
                if starved {
                    return Err(DecodeError::UnexpectedEof);
                }
                if in_pos < in_len {
                    return Err(DecodeError::Corrupt("zlib stream stalled"));
                }
            }
        }

        Ok(Completion::Finished)
    }

    fn close(&mut self) {
        self.image = None;
    }
}
