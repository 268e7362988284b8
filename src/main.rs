use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::EnvFilter;

use ihex_uf2::{hex::uf2, read_file, Image, Record};

// -- Data types for command-line options -- //
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Verbosity of generated output?
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a UF2 file from an IHEX file
    Uf2 {
        #[arg(value_name = "IHEX")]
        input: PathBuf,

        #[arg(short, long, value_name = "UF2", default_value = "out.uf2")]
        out: PathBuf,

        /// UF2 family id
        #[arg(short, long, value_name = "FAMILY", default_value = "0xE48BFF56", value_parser = parse_u32)]
        family: u32,

        /// Target address of the first block (default: load address of the image)
        #[arg(long, value_name = "ADDR", value_parser = parse_u32)]
        base: Option<u32>,

        /// Do not embed the RP2040 boot CRC
        #[arg(long)]
        no_crc: bool,
    },

    /// Create a micro:bit universal IHEX file
    Universal {
        /// micro:bit V1 file
        #[arg(short = '1', long = "in-v1", value_name = "IHEX")]
        in_v1: Option<PathBuf>,

        /// micro:bit V2 file
        #[arg(short = '2', long = "in-v2", value_name = "IHEX")]
        in_v2: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long, value_name = "IHEX")]
        out: Option<PathBuf>,
    },

    /// Summarise an IHEX file
    Info {
        #[arg(value_name = "IHEX")]
        input: PathBuf,
    },
}

fn parse_u32(text: &str) -> Result<u32, std::num::ParseIntError> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install logger: {}", e);
    }
}

fn read_records(path: &Path) -> Result<Vec<Record>> {
    let records = read_file(path).with_context(|| format!("Failed to read {}", path.display()))?;
    debug!("Read {} records from {}", records.len(), path.display());
    Ok(records)
}

fn to_uf2(input: &Path, out: &Path, family: u32, base: Option<u32>, no_crc: bool) -> Result<()> {
    let records = read_records(input)?;
    let mut image = Image::assemble(&records);

    if !no_crc {
        if let Ok(true) = image.boot_crc_valid() {
            debug!("Input already carries a valid boot CRC");
        }
        let crc = image
            .patch_boot_crc()
            .with_context(|| format!("Cannot add boot CRC to {}", input.display()))?;
        info!("CRC = {:08x}", crc);
    }
    if image.is_empty() {
        warn!("{} contains no data records", input.display());
    }

    let addr = base.unwrap_or(image.address());
    let file = File::create(out).with_context(|| format!("Failed to create {}", out.display()))?;
    let blocks = uf2::write_uf2(BufWriter::new(file), image.as_bytes(), family, addr)
        .with_context(|| format!("Failed to write {}", out.display()))?;

    info!(
        "Wrote {} UF2 blocks to {} (ADDR = {:08x}, FAMILY = {:08x})",
        blocks,
        out.display(),
        addr,
        family
    );
    Ok(())
}

fn to_universal(in_v1: Option<&Path>, in_v2: Option<&Path>, out: Option<&Path>) -> Result<()> {
    let v1 = match in_v1 {
        Some(path) => read_records(path)?,
        None => Vec::new(),
    };
    let v2 = match in_v2 {
        Some(path) => read_records(path)?,
        None => Vec::new(),
    };

    let records = ihex_uf2::merge(v1, v2);
    match out {
        Some(path) => {
            ihex_uf2::write_file(path, &records).with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {} records to {}", records.len() + 1, path.display());
        }
        None => ihex_uf2::encode_records(&records, io::stdout().lock()).context("Failed to write stdout")?,
    }
    Ok(())
}

fn summarise(input: &Path) -> Result<()> {
    let records = read_records(input)?;
    let image = Image::assemble(&records);

    println!("\nFound {} HEX records", records.len());
    println!(" - Image: ADDR = {:08x}, SIZE = {}", image.address(), image.len());
    match image.boot_crc_valid() {
        Ok(valid) => println!(" - Boot CRC: {}", if valid { "valid" } else { "invalid" }),
        Err(e) => println!(" - Boot CRC: n/a ({})", e),
    }
    println!();
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Uf2 {
            input,
            out,
            family,
            base,
            no_crc,
        } => to_uf2(&input, &out, family, base, no_crc),
        Command::Universal { in_v1, in_v2, out } => {
            to_universal(in_v1.as_deref(), in_v2.as_deref(), out.as_deref())
        }
        Command::Info { input } => summarise(&input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn numbers_parse_as_hex_or_decimal() {
        assert_eq!(parse_u32("0xE48BFF56"), Ok(0xE48B_FF56));
        assert_eq!(parse_u32("0X10"), Ok(16));
        assert_eq!(parse_u32("4096"), Ok(4096));
        assert!(parse_u32("0xZZ").is_err());
    }

    #[test]
    fn uf2_defaults_to_rp2040() {
        let args = Args::try_parse_from(["ihex-uf2", "uf2", "blink.hex"]).unwrap();
        match args.command {
            Command::Uf2 { family, out, base, no_crc, .. } => {
                assert_eq!(family, uf2::FAMILY_RP2040);
                assert_eq!(out, PathBuf::from("out.uf2"));
                assert_eq!(base, None);
                assert!(!no_crc);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn universal_inputs_are_optional() {
        let args = Args::try_parse_from(["ihex-uf2", "-v", "universal", "-2", "v2.hex"]).unwrap();
        assert_eq!(args.verbose, 1);
        match args.command {
            Command::Universal { in_v1, in_v2, out } => {
                assert_eq!(in_v1, None);
                assert_eq!(in_v2, Some(PathBuf::from("v2.hex")));
                assert_eq!(out, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
