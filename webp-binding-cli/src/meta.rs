use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use img_parts::riff::{RiffChunk, RiffContent};
use img_parts::webp::WebP;
use log::debug;
use webp_binding::container::{
    CHUNK_EXIF, CHUNK_ICCP, CHUNK_VP8X, CHUNK_XMP, ExtendedFlags, vp8x_payload,
};
use webp_binding::{ImageInfo, ImageKind, inspect};

use crate::cli::{GetCommand, Metadata};

impl Metadata {
    fn label(self) -> &'static str {
        match self {
            Metadata::Icc => "ICC profile",
            Metadata::Exif => "EXIF",
            Metadata::Xmp => "XMP",
        }
    }

    fn chunk_id(self) -> [u8; 4] {
        match self {
            Metadata::Icc => CHUNK_ICCP,
            Metadata::Exif => CHUNK_EXIF,
            Metadata::Xmp => CHUNK_XMP,
        }
    }
}

fn read_info(path: &Path) -> Result<(Vec<u8>, ImageInfo)> {
    let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let info = inspect(&data).with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok((data, info))
}

pub fn print_info(path: &Path) -> Result<()> {
    let (data, info) = read_info(path)?;
    println!("{}: {} bytes", path.display(), data.len());
    for line in describe(&info) {
        println!("  {line}");
    }
    Ok(())
}

pub fn describe(info: &ImageInfo) -> Vec<String> {
    let mut lines = vec![
        format!("kind: {}", info.kind.label()),
        format!("canvas: {}x{}", info.width, info.height),
        format!("alpha: {}", if info.has_alpha { "yes" } else { "no" }),
    ];
    for (name, chunk) in [("ICC", &info.iccp), ("EXIF", &info.exif), ("XMP", &info.xmp)] {
        if let Some(chunk) = chunk {
            lines.push(format!("{name}: {} bytes", chunk.len()));
        }
    }
    if let Some(anim) = info.animation.as_ref().filter(|_| info.is_animated()) {
        let [r, g, b, a] = anim.background;
        let loops = match anim.loop_count {
            0 => "forever".to_string(),
            n => n.to_string(),
        };
        lines.push(format!(
            "animation: {} frames, loop {loops}, background rgba({r}, {g}, {b}, {a})",
            anim.frames.len()
        ));
        for (i, f) in anim.frames.iter().enumerate() {
            lines.push(format!(
                "  frame {i}: {}x{} at ({}, {}), {} ms, {}{}{}",
                f.width,
                f.height,
                f.x,
                f.y,
                f.duration_ms,
                f.kind.map_or("empty", |k| k.label()),
                if f.blend { ", blend" } else { "" },
                if f.dispose { ", dispose" } else { "" },
            ));
        }
    }
    lines
}

pub fn get(cmd: GetCommand) -> Result<()> {
    match cmd {
        GetCommand::Icc(io) => extract(Metadata::Icc, &io.input, &io.out),
        GetCommand::Exif(io) => extract(Metadata::Exif, &io.input, &io.out),
        GetCommand::Xmp(io) => extract(Metadata::Xmp, &io.input, &io.out),
        GetCommand::Frame { index, io } => extract_frame(index, &io.input, &io.out),
    }
}

pub fn extract(what: Metadata, input: &Path, out: &Path) -> Result<()> {
    let (_, info) = read_info(input)?;
    let chunk = match what {
        Metadata::Icc => info.iccp,
        Metadata::Exif => info.exif,
        Metadata::Xmp => info.xmp,
    };
    let name = what.label();
    let Some(chunk) = chunk else {
        bail!("{} has no {name} chunk", input.display());
    };
    fs::write(out, &chunk).with_context(|| format!("Failed to write {}", out.display()))?;
    println!("Wrote {name} ({} bytes) to {}", chunk.len(), out.display());
    Ok(())
}

pub fn extract_frame(index: usize, input: &Path, out: &Path) -> Result<()> {
    let data = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let frame = webp_binding::extract_frame(&data, index)
        .with_context(|| format!("Failed to extract frame {index} of {}", input.display()))?;
    fs::write(out, &frame).with_context(|| format!("Failed to write {}", out.display()))?;
    println!("Wrote frame {index} ({} bytes) to {}", frame.len(), out.display());
    Ok(())
}

pub fn embed(what: Metadata, input: &Path, payload: &Path, out: &Path) -> Result<()> {
    let payload = fs::read(payload)
        .with_context(|| format!("Failed to read payload {}", payload.display()))?;
    debug!("embedding {} into {}", what.label(), input.display());
    rewrite(input, out, |webp| put_metadata(webp, what, Some(Bytes::from(payload))))?;
    println!("Wrote {} with {}", out.display(), what.label());
    Ok(())
}

pub fn strip(what: Metadata, input: &Path, out: &Path) -> Result<()> {
    rewrite(input, out, |webp| put_metadata(webp, what, None))?;
    println!("Wrote {} without {}", out.display(), what.label());
    Ok(())
}

/// Edit the chunk list of `input`, rebuild its `VP8X` header and write `out`.
fn rewrite(input: &Path, out: &Path, edit: impl FnOnce(&mut WebP)) -> Result<()> {
    // Reject anything our own reader cannot parse before img-parts rewrites it.
    let (data, info) = read_info(input)?;
    let mut webp = WebP::from_bytes(Bytes::from(data))
        .with_context(|| format!("Failed to load {} as WebP", input.display()))?;
    edit(&mut webp);
    sync_header(&mut webp, &info);

    let file = File::create(out).with_context(|| format!("Failed to create {}", out.display()))?;
    webp.encoder()
        .write_to(BufWriter::new(file))
        .with_context(|| format!("Failed to write {}", out.display()))?;
    Ok(())
}

/// Replace (or with `None`, remove) one metadata chunk, keeping container order:
/// ICCP right after the header, EXIF ahead of XMP at the end.
fn put_metadata(webp: &mut WebP, what: Metadata, payload: Option<Bytes>) {
    let id = what.chunk_id();
    webp.remove_chunks_by_id(id);
    let Some(payload) = payload else {
        return;
    };
    let chunks = webp.chunks();
    let pos = match what {
        Metadata::Icc => chunks
            .iter()
            .position(|c| c.id() == CHUNK_VP8X)
            .map_or(0, |p| p + 1),
        Metadata::Exif => chunks
            .iter()
            .position(|c| c.id() == CHUNK_XMP)
            .unwrap_or(chunks.len()),
        Metadata::Xmp => chunks.len(),
    };
    webp.chunks_mut()
        .insert(pos, RiffChunk::new(id, RiffContent::Data(payload)));
}

/// img-parts only tracks ICC and EXIF in the flags and drops `VP8X` once both
/// are gone, so the header is rebuilt here from what the file now holds.
/// Extended files stay extended.
fn sync_header(webp: &mut WebP, info: &ImageInfo) {
    let flags = ExtendedFlags {
        icc: webp.has_chunk(CHUNK_ICCP),
        alpha: info.has_alpha,
        exif: webp.has_chunk(CHUNK_EXIF),
        xmp: webp.has_chunk(CHUNK_XMP),
        animation: info.is_animated(),
    };
    webp.remove_chunks_by_id(CHUNK_VP8X);
    if info.kind == ImageKind::Extended || flags.icc || flags.exif || flags.xmp {
        let header = vp8x_payload(flags, info.width, info.height);
        let chunk = RiffChunk::new(
            CHUNK_VP8X,
            RiffContent::Data(Bytes::copy_from_slice(&header)),
        );
        webp.chunks_mut().insert(0, chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::tests::scratch;
    use webp_binding::{EncodeOptions, decode_rgba, encode_rgba};

    fn opaque(width: u32, height: u32) -> Vec<u8> {
        (0..width * height)
            .flat_map(|i| [(i * 13) as u8, 90, 200, 255])
            .collect()
    }

    fn chunk(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = id.to_vec();
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        if payload.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    fn riff(chunks: &[Vec<u8>]) -> Vec<u8> {
        let body = chunks.concat();
        let mut out = b"RIFF".to_vec();
        out.extend_from_slice(&(body.len() as u32 + 4).to_le_bytes());
        out.extend_from_slice(b"WEBP");
        out.extend_from_slice(&body);
        out
    }

    /// Two-frame animation whose second frame is a real lossless bitstream.
    fn animation(frame: &[u8], width: u32, height: u32) -> Vec<u8> {
        let still = encode_rgba(frame, width, height, &EncodeOptions::lossless(1)).unwrap();
        let mut anmf = vec![0; 6];
        anmf.extend_from_slice(&(width - 1).to_le_bytes()[..3]);
        anmf.extend_from_slice(&(height - 1).to_le_bytes()[..3]);
        anmf.extend_from_slice(&[50, 0, 0, 0]);
        anmf.extend_from_slice(&still[12..]);
        let flags = ExtendedFlags {
            animation: true,
            ..Default::default()
        };
        riff(&[
            chunk(b"VP8X", &vp8x_payload(flags, width, height)),
            chunk(b"ANIM", &[0, 0, 0, 0, 0, 0]),
            chunk(b"ANMF", &anmf),
            chunk(b"ANMF", &anmf),
        ])
    }

    #[test]
    fn describes_a_still_image() {
        let px: Vec<u8> = (0..6 * 4).flat_map(|_| [9u8, 9, 9, 255]).collect();
        let webp = encode_rgba(&px, 6, 4, &EncodeOptions::lossless(1)).unwrap();
        let lines = describe(&inspect(&webp).unwrap());
        assert_eq!(lines[0], "kind: lossless (VP8L)");
        assert_eq!(lines[1], "canvas: 6x4");
        assert!(!lines.iter().any(|l| l.starts_with("animation")));
    }

    #[test]
    fn embedding_icc_converts_simple_file_to_extended() {
        let dir = scratch("embed-icc");
        let still = encode_rgba(&opaque(12, 6), 12, 6, &EncodeOptions::lossy(80.0)).unwrap();
        let input = dir.join("in.webp");
        fs::write(&input, &still).unwrap();
        let profile = dir.join("p.icc");
        fs::write(&profile, b"not really an icc profile").unwrap();
        let out = dir.join("out.webp");

        embed(Metadata::Icc, &input, &profile, &out).unwrap();

        let data = fs::read(&out).unwrap();
        assert_eq!(&data[12..16], b"VP8X");
        let info = inspect(&data).unwrap();
        assert_eq!(info.kind, ImageKind::Extended);
        assert_eq!((info.width, info.height), (12, 6));
        assert!(info.flags.unwrap().icc);
        assert_eq!(info.iccp.as_deref(), Some(&b"not really an icc profile"[..]));
        let decoded = decode_rgba(&data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (12, 6));
    }

    #[test]
    fn exif_and_xmp_round_trip_through_files() {
        let dir = scratch("exif-xmp");
        let still = encode_rgba(&opaque(5, 5), 5, 5, &EncodeOptions::lossless(2)).unwrap();
        let input = dir.join("in.webp");
        fs::write(&input, &still).unwrap();
        let exif = dir.join("exif.bin");
        fs::write(&exif, b"Exif\0\0II*\0").unwrap();
        let xmp = dir.join("x.xml");
        fs::write(&xmp, b"<x:xmpmeta/>").unwrap();

        let with_xmp = dir.join("xmp.webp");
        embed(Metadata::Xmp, &input, &xmp, &with_xmp).unwrap();
        let with_both = dir.join("both.webp");
        embed(Metadata::Exif, &with_xmp, &exif, &with_both).unwrap();

        let exif_out = dir.join("exif.out");
        extract(Metadata::Exif, &with_both, &exif_out).unwrap();
        assert_eq!(fs::read(&exif_out).unwrap(), b"Exif\0\0II*\0");
        let xmp_out = dir.join("xmp.out");
        extract(Metadata::Xmp, &with_both, &xmp_out).unwrap();
        assert_eq!(fs::read(&xmp_out).unwrap(), b"<x:xmpmeta/>");

        let data = fs::read(&with_both).unwrap();
        let exif_at = data.windows(4).position(|w| w == b"EXIF").unwrap();
        let xmp_at = data.windows(4).position(|w| w == b"XMP ").unwrap();
        assert!(exif_at < xmp_at);
        assert!(decode_rgba(&data).is_ok());

        assert!(extract(Metadata::Icc, &with_both, &dir.join("none.icc")).is_err());
    }

    #[test]
    fn strip_removes_only_the_named_chunk() {
        let dir = scratch("strip");
        let still = encode_rgba(&opaque(4, 4), 4, 4, &EncodeOptions::lossy(60.0)).unwrap();
        let input = dir.join("in.webp");
        fs::write(&input, &still).unwrap();
        let payload = dir.join("payload");
        fs::write(&payload, b"abc").unwrap();
        let icc = dir.join("icc.webp");
        embed(Metadata::Icc, &input, &payload, &icc).unwrap();
        let both = dir.join("both.webp");
        embed(Metadata::Exif, &icc, &payload, &both).unwrap();

        let out = dir.join("out.webp");
        strip(Metadata::Icc, &both, &out).unwrap();
        let info = inspect(&fs::read(&out).unwrap()).unwrap();
        assert_eq!(info.iccp, None);
        assert_eq!(info.exif.as_deref(), Some(&b"abc"[..]));
        let flags = info.flags.unwrap();
        assert!(!flags.icc && flags.exif);
    }

    #[test]
    fn strip_keeps_animation_header() {
        let dir = scratch("strip-anim");
        let input = dir.join("anim.webp");
        fs::write(&input, animation(&opaque(3, 2), 3, 2)).unwrap();
        let out = dir.join("out.webp");
        strip(Metadata::Exif, &input, &out).unwrap();
        let info = inspect(&fs::read(&out).unwrap()).unwrap();
        assert!(info.is_animated());
        assert_eq!(info.frame_count(), 2);
    }

    #[test]
    fn frame_is_written_as_standalone_webp() {
        let dir = scratch("frame");
        let px = opaque(7, 3);
        let input = dir.join("anim.webp");
        fs::write(&input, animation(&px, 7, 3)).unwrap();

        let out = dir.join("frame1.webp");
        get(GetCommand::Frame {
            index: 1,
            io: crate::cli::ExtractArgs {
                input: input.clone(),
                out: out.clone(),
            },
        })
        .unwrap();
        let decoded = decode_rgba(&fs::read(&out).unwrap()).unwrap();
        assert_eq!(&decoded[..], &px[..]);

        assert!(extract_frame(2, &input, &dir.join("missing.webp")).is_err());
    }
}
