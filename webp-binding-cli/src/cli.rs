use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, builder::ValueHint};
use log::Level;

/// Command-line arguments for webp-tool.
#[derive(Parser, Debug)]
#[command(
    name = "webp-tool",
    about = "Encode raw RGBA to WebP, decode WebP to raw RGBA, and inspect WebP containers.",
    author,
    version,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::Warn,
            1 => Level::Info,
            2 => Level::Debug,
            _ => Level::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode packed RGBA8888 pixels into a WebP file
    Encode(EncodeArgs),
    /// Decode a WebP file into packed RGBA8888 pixels
    Decode(DecodeArgs),
    /// Print container structure: kind, dimensions, alpha, frames, metadata
    Info {
        #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
        input: PathBuf,
    },
    /// Extract a metadata chunk or one animation frame
    #[command(subcommand)]
    Get(GetCommand),
    /// Embed an ICC profile, EXIF or XMP block, converting to the extended format if needed
    Set {
        #[arg(value_enum)]
        what: Metadata,
        #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
        input: PathBuf,
        /// File holding the payload to embed
        #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
        data: PathBuf,
        /// Output WebP path
        #[arg(long, short = 'o', value_name = "FILE", value_hint = ValueHint::FilePath)]
        out: PathBuf,
    },
    /// Remove a metadata chunk
    Strip {
        #[arg(value_enum)]
        what: Metadata,
        #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
        input: PathBuf,
        /// Output WebP path
        #[arg(long, short = 'o', value_name = "FILE", value_hint = ValueHint::FilePath)]
        out: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum GetCommand {
    /// ICC profile
    #[command(alias = "iccp")]
    Icc(ExtractArgs),
    Exif(ExtractArgs),
    Xmp(ExtractArgs),
    /// One animation frame as a standalone WebP
    Frame {
        /// Zero-based frame index
        index: usize,
        #[command(flatten)]
        io: ExtractArgs,
    },
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub input: PathBuf,
    /// Where to write the extracted data
    #[arg(long, short = 'o', value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub out: PathBuf,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Raw RGBA8888 input (width * height * 4 bytes, no padding)
    #[arg(long, short = 'i', value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    #[arg(long)]
    pub width: u32,

    #[arg(long)]
    pub height: u32,

    /// Output WebP path
    #[arg(long, short = 'o', value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub out: PathBuf,

    /// Quality (0-100); for lossless, the compression effort
    #[arg(long, short = 'q', value_parser = parse_quality)]
    pub quality: Option<f32>,

    /// Compression method (0 fast - 6 slow)
    #[arg(long, short = 'm', value_parser = clap::value_parser!(i32).range(0..=6))]
    pub method: Option<i32>,

    /// Lossless preset level (1-9); 0 restores lossy defaults
    #[arg(long, value_parser = clap::value_parser!(i32).range(0..=9))]
    pub lossless: Option<i32>,

    /// Preserve RGB under fully transparent pixels
    #[arg(long)]
    pub exact: bool,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    #[arg(long, short = 'i', value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    /// Output raw RGBA8888 path
    #[arg(long, short = 'o', value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub out: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Metadata {
    #[value(alias = "iccp")]
    Icc,
    Exif,
    Xmp,
}

fn parse_quality(s: &str) -> Result<f32, String> {
    let q: f32 = s.parse().map_err(|_| format!("`{s}` is not a number"))?;
    if (0.0..=100.0).contains(&q) {
        Ok(q)
    } else {
        Err(format!("quality {q} is outside 0-100"))
    }
}
