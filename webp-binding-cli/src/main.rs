use anyhow::{Context, Result};
use clap::Parser;
use log::info;

mod cli;
mod encode;
mod meta;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    simple_logger::init_with_level(args.log_level()).context("Failed to initialize logger")?;
    info!("Log level: {}", args.log_level());
    run(args.command)
}

fn run(cmd: cli::Command) -> Result<()> {
    match cmd {
        cli::Command::Encode(args) => encode::run_encoding(&args),
        cli::Command::Decode(args) => encode::run_decoding(&args),
        cli::Command::Info { input } => meta::print_info(&input),
        cli::Command::Get(get) => meta::get(get),
        cli::Command::Set {
            what,
            input,
            data,
            out,
        } => meta::embed(what, &input, &data, &out),
        cli::Command::Strip { what, input, out } => meta::strip(what, &input, &out),
    }
}
