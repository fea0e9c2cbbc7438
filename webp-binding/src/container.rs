//! Inspection of the WebP RIFF container.
//!
//! Reports the bitstream kind, canvas dimensions, alpha, metadata chunks and
//! animation frame layout without decoding any pixels, and can re-wrap a
//! single animation frame as a still image. Layout reference:
//! <https://developers.google.com/speed/webp/docs/riff_container>.

use crate::error::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::{debug, trace};

pub const CHUNK_VP8: [u8; 4] = *b"VP8 ";
pub const CHUNK_VP8L: [u8; 4] = *b"VP8L";
pub const CHUNK_VP8X: [u8; 4] = *b"VP8X";
pub const CHUNK_ALPH: [u8; 4] = *b"ALPH";
pub const CHUNK_ANIM: [u8; 4] = *b"ANIM";
pub const CHUNK_ANMF: [u8; 4] = *b"ANMF";
pub const CHUNK_ICCP: [u8; 4] = *b"ICCP";
pub const CHUNK_EXIF: [u8; 4] = *b"EXIF";
pub const CHUNK_XMP: [u8; 4] = *b"XMP ";

const VP8L_SIGNATURE: u8 = 0x2f;

const FLAG_ICC: u8 = 0b0010_0000;
const FLAG_ALPHA: u8 = 0b0001_0000;
const FLAG_EXIF: u8 = 0b0000_1000;
const FLAG_XMP: u8 = 0b0000_0100;
const FLAG_ANIMATION: u8 = 0b0000_0010;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// Simple format, `VP8 ` bitstream.
    Lossy,
    /// Simple format, `VP8L` bitstream.
    Lossless,
    /// `VP8X` header with optional alpha, metadata or animation.
    Extended,
}

impl ImageKind {
    pub fn label(self) -> &'static str {
        match self {
            ImageKind::Lossy => "lossy (VP8)",
            ImageKind::Lossless => "lossless (VP8L)",
            ImageKind::Extended => "extended (VP8X)",
        }
    }
}

/// Feature bits declared by a `VP8X` chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtendedFlags {
    pub icc: bool,
    pub alpha: bool,
    pub exif: bool,
    pub xmp: bool,
    pub animation: bool,
}

impl ExtendedFlags {
    fn from_bits(bits: u8) -> Self {
        Self {
            icc: bits & FLAG_ICC != 0,
            alpha: bits & FLAG_ALPHA != 0,
            exif: bits & FLAG_EXIF != 0,
            xmp: bits & FLAG_XMP != 0,
            animation: bits & FLAG_ANIMATION != 0,
        }
    }

    pub fn bits(self) -> u8 {
        let mut bits = 0;
        for (set, flag) in [
            (self.icc, FLAG_ICC),
            (self.alpha, FLAG_ALPHA),
            (self.exif, FLAG_EXIF),
            (self.xmp, FLAG_XMP),
            (self.animation, FLAG_ANIMATION),
        ] {
            if set {
                bits |= flag;
            }
        }
        bits
    }
}

/// Payload of a `VP8X` chunk for a `width` x `height` canvas.
pub fn vp8x_payload(flags: ExtendedFlags, width: u32, height: u32) -> [u8; 10] {
    let mut out = [0u8; 10];
    out[0] = flags.bits();
    out[4..7].copy_from_slice(&width.saturating_sub(1).to_le_bytes()[..3]);
    out[7..10].copy_from_slice(&height.saturating_sub(1).to_le_bytes()[..3]);
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Animation {
    /// Canvas background, converted from the stored BGRA to RGBA.
    pub background: [u8; 4],
    /// 0 means loop forever.
    pub loop_count: u16,
    pub frames: Vec<FrameInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    /// Offset on the canvas in pixels.
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub duration_ms: u32,
    /// Alpha-blend onto the previous canvas (otherwise overwrite).
    pub blend: bool,
    /// Dispose to background color after display.
    pub dispose: bool,
    /// `Lossy` or `Lossless` depending on the frame bitstream, if present.
    pub kind: Option<ImageKind>,
    pub has_alpha: bool,
    /// The frame's `ALPH`/`VP8 `/`VP8L` chunks as stored, headers included.
    pub bitstream: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub kind: ImageKind,
    pub width: u32,
    pub height: u32,
    pub has_alpha: bool,
    /// Present for extended files only.
    pub flags: Option<ExtendedFlags>,
    pub animation: Option<Animation>,
    pub iccp: Option<Bytes>,
    pub exif: Option<Bytes>,
    pub xmp: Option<Bytes>,
}

impl ImageInfo {
    pub fn is_animated(&self) -> bool {
        self.flags.is_some_and(|f| f.animation)
    }

    /// Number of frames; 0 for still images.
    pub fn frame_count(&self) -> usize {
        if !self.is_animated() {
            return 0;
        }
        self.animation.as_ref().map_or(0, |a| a.frames.len())
    }
}

struct Chunk<'a> {
    id: [u8; 4],
    payload: &'a [u8],
}

/// Pull the next chunk off `buf`, consuming its pad byte. `None` at the end.
fn next_chunk<'a>(buf: &mut &'a [u8]) -> Result<Option<Chunk<'a>>> {
    if !buf.has_remaining() {
        return Ok(None);
    }
    if buf.remaining() < 8 {
        return Err(Error::container("truncated chunk header"));
    }
    let mut id = [0u8; 4];
    buf.copy_to_slice(&mut id);
    let size = buf.get_u32_le() as usize;
    if size > buf.remaining() {
        return Err(Error::container(format!(
            "{} chunk claims {size} bytes, {} available",
            fourcc(&id),
            buf.remaining()
        )));
    }
    let rest: &'a [u8] = *buf;
    let payload = &rest[..size];
    *buf = &rest[size..];
    if size & 1 == 1 && buf.has_remaining() {
        buf.advance(1);
    }
    trace!("chunk {} ({size} bytes)", fourcc(&id));
    Ok(Some(Chunk { id, payload }))
}

fn fourcc(id: &[u8; 4]) -> String {
    String::from_utf8_lossy(id).into_owned()
}

fn vp8_dimensions(payload: &[u8]) -> Result<(u32, u32)> {
    if payload.len() < 10 {
        return Err(Error::container("VP8 chunk too short"));
    }
    let mut buf = &payload[6..10];
    let width = (buf.get_u16_le() & 0x3fff) as u32;
    let height = (buf.get_u16_le() & 0x3fff) as u32;
    Ok((width, height))
}

/// Width, height and alpha hint of a `VP8L` bitstream.
fn vp8l_header(payload: &[u8]) -> Result<(u32, u32, bool)> {
    if payload.len() < 5 {
        return Err(Error::container("VP8L chunk too short"));
    }
    if payload[0] != VP8L_SIGNATURE {
        return Err(Error::container("bad VP8L signature"));
    }
    let bits = (&payload[1..5]).get_u32_le();
    let width = (bits & 0x3fff) + 1;
    let height = ((bits >> 14) & 0x3fff) + 1;
    let alpha = (bits >> 28) & 1 == 1;
    Ok((width, height, alpha))
}

fn get_u24_le(buf: &mut &[u8]) -> u32 {
    buf.get_uint_le(3) as u32
}

fn parse_anim(payload: &[u8]) -> Result<Animation> {
    if payload.len() < 6 {
        return Err(Error::container("ANIM chunk too short"));
    }
    let [b, g, r, a] = [payload[0], payload[1], payload[2], payload[3]];
    let loop_count = (&payload[4..6]).get_u16_le();
    Ok(Animation {
        background: [r, g, b, a],
        loop_count,
        frames: Vec::new(),
    })
}

fn parse_anmf(payload: &[u8]) -> Result<FrameInfo> {
    if payload.len() < 16 {
        return Err(Error::container("ANMF chunk too short"));
    }
    let mut buf = payload;
    let x = get_u24_le(&mut buf) * 2;
    let y = get_u24_le(&mut buf) * 2;
    let width = get_u24_le(&mut buf) + 1;
    let height = get_u24_le(&mut buf) + 1;
    let duration_ms = get_u24_le(&mut buf);
    let flags = buf.get_u8();

    let mut frame = FrameInfo {
        x,
        y,
        width,
        height,
        duration_ms,
        blend: flags & 0b10 == 0,
        dispose: flags & 0b01 != 0,
        kind: None,
        has_alpha: false,
        bitstream: Bytes::copy_from_slice(buf),
    };
    while let Some(chunk) = next_chunk(&mut buf)? {
        match chunk.id {
            CHUNK_ALPH => frame.has_alpha = true,
            CHUNK_VP8 if frame.kind.is_none() => frame.kind = Some(ImageKind::Lossy),
            CHUNK_VP8L if frame.kind.is_none() => {
                let (_, _, alpha) = vp8l_header(chunk.payload)?;
                frame.kind = Some(ImageKind::Lossless);
                frame.has_alpha |= alpha;
            }
            _ => {}
        }
    }
    Ok(frame)
}

/// Parse the container structure of `data`.
///
/// Bytes past the RIFF size are ignored. The first occurrence of each
/// metadata chunk wins.
pub fn inspect(data: &[u8]) -> Result<ImageInfo> {
    if data.len() < 12 {
        return Err(Error::container("shorter than a RIFF header"));
    }
    let mut header = &data[..12];
    let mut tag = [0u8; 4];
    header.copy_to_slice(&mut tag);
    if &tag != b"RIFF" {
        return Err(Error::container("missing RIFF tag"));
    }
    let riff_size = header.get_u32_le() as usize;
    header.copy_to_slice(&mut tag);
    if &tag != b"WEBP" {
        return Err(Error::container("missing WEBP form type"));
    }
    if riff_size < 4 {
        return Err(Error::container(format!("RIFF size {riff_size} below form type")));
    }
    // riff_size counts the form type plus chunks.
    let end = riff_size.saturating_add(8).min(data.len());
    let mut buf = &data[12..end];

    let first = next_chunk(&mut buf)?.ok_or_else(|| Error::container("no chunks"))?;
    let mut info = match first.id {
        CHUNK_VP8 => {
            let (width, height) = vp8_dimensions(first.payload)?;
            return Ok(simple(ImageKind::Lossy, width, height, false));
        }
        CHUNK_VP8L => {
            let (width, height, alpha) = vp8l_header(first.payload)?;
            return Ok(simple(ImageKind::Lossless, width, height, alpha));
        }
        CHUNK_VP8X => {
            if first.payload.len() < 10 {
                return Err(Error::container("VP8X chunk too short"));
            }
            let flags = ExtendedFlags::from_bits(first.payload[0]);
            let mut dims = &first.payload[4..10];
            let width = get_u24_le(&mut dims) + 1;
            let height = get_u24_le(&mut dims) + 1;
            ImageInfo {
                kind: ImageKind::Extended,
                width,
                height,
                has_alpha: flags.alpha,
                flags: Some(flags),
                animation: None,
                iccp: None,
                exif: None,
                xmp: None,
            }
        }
        other => {
            return Err(Error::container(format!(
                "unexpected first chunk {}",
                fourcc(&other)
            )));
        }
    };

    // Metadata only counts when the header announces it.
    let flags = info.flags.unwrap_or_default();
    while let Some(chunk) = next_chunk(&mut buf)? {
        match chunk.id {
            CHUNK_ANIM if info.animation.is_none() => {
                info.animation = Some(parse_anim(chunk.payload)?);
            }
            CHUNK_ANMF => {
                let frame = parse_anmf(chunk.payload)?;
                info.animation
                    .as_mut()
                    .ok_or_else(|| Error::container("ANMF chunk before ANIM"))?
                    .frames
                    .push(frame);
            }
            CHUNK_ICCP if flags.icc && info.iccp.is_none() => {
                info.iccp = Some(Bytes::copy_from_slice(chunk.payload));
            }
            CHUNK_EXIF if flags.exif && info.exif.is_none() => {
                info.exif = Some(Bytes::copy_from_slice(chunk.payload));
            }
            CHUNK_XMP if flags.xmp && info.xmp.is_none() => {
                info.xmp = Some(Bytes::copy_from_slice(chunk.payload));
            }
            _ => {}
        }
    }
    Ok(info)
}

/// Re-wrap frame `index` of an animation as a standalone still WebP.
///
/// The result has the frame's own dimensions and keeps the file's ICC, EXIF
/// and XMP chunks. A `VP8X` header is written only when metadata or a lossy
/// frame's `ALPH` chunk requires one.
pub fn extract_frame(data: &[u8], index: usize) -> Result<Bytes> {
    let info = inspect(data)?;
    let frames = match &info.animation {
        Some(anim) if info.is_animated() => &anim.frames,
        _ => return Err(Error::container("not an animation")),
    };
    let frame = frames.get(index).ok_or_else(|| {
        Error::container(format!("frame {index} out of range (0..{})", frames.len()))
    })?;
    let kind = frame
        .kind
        .ok_or_else(|| Error::container(format!("frame {index} has no VP8/VP8L bitstream")))?;

    let mut body = BytesMut::new();
    let needs_alph = kind == ImageKind::Lossy && frame.has_alpha;
    if needs_alph || info.iccp.is_some() || info.exif.is_some() || info.xmp.is_some() {
        let flags = ExtendedFlags {
            icc: info.iccp.is_some(),
            alpha: frame.has_alpha,
            exif: info.exif.is_some(),
            xmp: info.xmp.is_some(),
            animation: false,
        };
        put_chunk(&mut body, CHUNK_VP8X, &vp8x_payload(flags, frame.width, frame.height));
    }
    if let Some(icc) = &info.iccp {
        put_chunk(&mut body, CHUNK_ICCP, icc);
    }
    let mut buf = &frame.bitstream[..];
    while let Some(chunk) = next_chunk(&mut buf)? {
        match chunk.id {
            CHUNK_ALPH if needs_alph => put_chunk(&mut body, chunk.id, chunk.payload),
            CHUNK_VP8 | CHUNK_VP8L => {
                put_chunk(&mut body, chunk.id, chunk.payload);
                break;
            }
            _ => {}
        }
    }
    if let Some(exif) = &info.exif {
        put_chunk(&mut body, CHUNK_EXIF, exif);
    }
    if let Some(xmp) = &info.xmp {
        put_chunk(&mut body, CHUNK_XMP, xmp);
    }

    let riff_size = u32::try_from(body.len() + 4)
        .map_err(|_| Error::container("frame does not fit a RIFF file"))?;
    let mut out = BytesMut::with_capacity(body.len() + 12);
    out.put_slice(b"RIFF");
    out.put_u32_le(riff_size);
    out.put_slice(b"WEBP");
    out.put(body);
    debug!("extracted frame {index}: {}x{} {}", frame.width, frame.height, kind.label());
    Ok(out.freeze())
}

fn put_chunk(out: &mut BytesMut, id: [u8; 4], payload: &[u8]) {
    out.put_slice(&id);
    out.put_u32_le(payload.len() as u32);
    out.put_slice(payload);
    if payload.len() & 1 == 1 {
        out.put_u8(0);
    }
}

fn simple(kind: ImageKind, width: u32, height: u32, has_alpha: bool) -> ImageInfo {
    ImageInfo {
        kind,
        width,
        height,
        has_alpha,
        flags: None,
        animation: None,
        iccp: None,
        exif: None,
        xmp: None,
    }
}
