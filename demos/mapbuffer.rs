use clap::{Parser, Subcommand};
use mapbuffer::{Compression, MapBuffer, MapBufferBuilder};
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, Error, ErrorKind, Result, Write};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Info(args) => run_info(args),
        Command::Convert(args) => run_convert(args),
    }
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "mapbuffer utility for inspecting and creating map buffer files",
    subcommand_required = true,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect a map buffer file and print basic information
    Info(InfoArgs),
    /// Convert a JSON key-value file into a map buffer binary file
    Convert(ConvertArgs),
}

#[derive(clap::Args)]
struct InfoArgs {
    /// Path to the map buffer binary file
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Optional key to look up
    #[arg(short, long)]
    key: Option<u64>,

    /// Run the full validator, including the CRC32C trailer
    #[arg(long)]
    validate: bool,
}

#[derive(clap::Args)]
struct ConvertArgs {
    /// Path to the source JSON object of key-value pairs
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Path to the map buffer binary file to produce
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Compression scheme: none, gzip, br, zstd or lzma
    #[arg(short, long, value_name = "SCHEME", default_value = "none")]
    compress: String,

    /// Format version to emit (1 appends a CRC32C trailer)
    #[arg(long, value_name = "VERSION", default_value_t = 1)]
    format_version: u8,
}

fn run_info(args: InfoArgs) -> Result<()> {
    let map = MapBuffer::open_path(&args.input).map_err(into_io)?;

    if args.validate {
        map.validate().map_err(into_io)?;
        println!("checksum and structure verified");
    }

    let json = serde_json::to_string_pretty(&map.info())
        .map_err(|e| Error::other(format!("Failed to format JSON: {e}")))?;
    println!("{}", json);

    if let Some(key) = args.key {
        match map.get(key).map_err(into_io)? {
            Some(value) => println!("{}: {:?}", key, String::from_utf8_lossy(&value)),
            None => println!("{}: <not found>", key),
        }
    }

    Ok(())
}

fn run_convert(args: ConvertArgs) -> Result<()> {
    let entries = load_entries_from_json(&args.input)?;
    let compression = Compression::from_name(&args.compress).map_err(into_io)?;

    let bytes = MapBufferBuilder::new()
        .with_compression(compression)
        .with_format_version(args.format_version)
        .build(entries)
        .map_err(into_io)?;

    File::create(&args.output)?.write_all(&bytes)?;

    let map = MapBuffer::from_bytes(bytes).map_err(into_io)?;
    let json = serde_json::to_string_pretty(&map.info())
        .map_err(|e| Error::other(format!("Failed to format JSON: {e}")))?;
    println!("{}", json);

    Ok(())
}

fn load_entries_from_json(path: &Path) -> Result<Vec<(u64, Vec<u8>)>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let value: Value = serde_json::from_reader(reader)
        .map_err(|e| invalid_json(format!("Failed to parse JSON input: {e}")))?;

    let Value::Object(map) = value else {
        return Err(invalid_json(
            "expected a JSON object of key-value pairs".to_string(),
        ));
    };

    let mut entries = Vec::with_capacity(map.len());
    for (key, value) in map {
        let key: u64 = key
            .parse()
            .map_err(|e| invalid_json(format!("key {key:?} is not a u64: {e}")))?;
        let bytes = match value {
            Value::String(s) => s.into_bytes(),
            other => {
                return Err(invalid_json(format!(
                    "value for key {key} must be a string, found {other}"
                )));
            }
        };
        entries.push((key, bytes));
    }
    Ok(entries)
}

fn invalid_json(message: String) -> Error {
    Error::new(ErrorKind::InvalidData, message)
}

fn into_io(error: mapbuffer::MapBufferError) -> Error {
    Error::new(ErrorKind::InvalidData, error.to_string())
}
