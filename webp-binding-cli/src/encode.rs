use std::fs;

use anyhow::{Context, Result, ensure};
use log::info;
use webp_binding::{Encoder, decode_rgba, rgba_len};

use crate::cli::{DecodeArgs, EncodeArgs};

pub fn run_encoding(args: &EncodeArgs) -> Result<()> {
    let pixels = fs::read(&args.input)
        .with_context(|| format!("Failed to read raw RGBA {}", args.input.display()))?;
    let expected = rgba_len(args.width, args.height)?;
    ensure!(
        pixels.len() >= expected,
        "{} holds {} bytes but {}x{} RGBA needs {}",
        args.input.display(),
        pixels.len(),
        args.width,
        args.height,
        expected
    );

    // Same order as the host wrapper: lossless replaces the whole config, so it goes first.
    let mut enc = Encoder::new();
    enc.init()?;
    if let Some(level) = args.lossless {
        enc.set_lossless(level)?;
    }
    if let Some(quality) = args.quality {
        enc.set_quality(quality)?;
    }
    if let Some(method) = args.method {
        enc.set_method(method)?;
    }
    enc.set_exact(args.exact)?;
    enc.load_rgba(&pixels, args.width, args.height)?;
    if let Some(cfg) = enc.config() {
        info!("Encoding with {cfg:?}");
    }
    enc.encode()
        .with_context(|| format!("Failed to encode {}", args.input.display()))?;

    fs::write(&args.out, enc.output())
        .with_context(|| format!("Failed to write output {}", args.out.display()))?;
    println!(
        "Wrote {} ({} bytes, {}x{})",
        args.out.display(),
        enc.output_len(),
        args.width,
        args.height
    );
    Ok(())
}

pub fn run_decoding(args: &DecodeArgs) -> Result<()> {
    let data = fs::read(&args.input)
        .with_context(|| format!("Failed to read WebP {}", args.input.display()))?;
    let decoded = decode_rgba(&data)
        .with_context(|| format!("Failed to decode {}", args.input.display()))?;
    fs::write(&args.out, &decoded[..])
        .with_context(|| format!("Failed to write output {}", args.out.display()))?;
    println!(
        "Wrote {} ({}x{} RGBA, {} bytes)",
        args.out.display(),
        decoded.width(),
        decoded.height(),
        decoded.len()
    );
    Ok(())
}
