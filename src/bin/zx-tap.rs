//! zx-tap CLI
//!
//! Wrap a machine-code binary into a ZX Spectrum .tap file, or list a tape's contents.

use anyhow::{Context, Result};
use base64::Engine;
use clap::{Parser, Subcommand};
use zx_tap::{parse_program, Decoder, Encoder, EncoderConfig, HeaderType, NamePolicy, TapeEntry};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "zx-tap")]
#[command(version)]
#[command(about = "ZX Spectrum .tap file tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a .tap file from a raw machine-code binary
    Create {
        /// Machine-code binary to wrap
        input: PathBuf,

        /// Output tape file (default: stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Tape file name (default: input file stem)
        #[arg(short = 'n', long)]
        name: Option<String>,

        /// Load and start address, decimal or hex (0x8000 / $8000)
        #[arg(short = 's', long, default_value = "0x8000", value_parser = parse_address)]
        start: u32,

        /// Only write the code blocks, without a BASIC loader
        #[arg(long)]
        no_loader: bool,

        /// Fail instead of truncating names longer than 10 characters
        #[arg(long)]
        strict_name: bool,

        /// Write the tape as base64 text
        #[arg(long)]
        base64: bool,

        /// Verbose output
        #[arg(short, long, action = clap::ArgAction::Count)]
        verbose: u8,
    },

    /// List the contents of a .tap file
    #[command(name = "t")]
    List {
        /// Tape file to list (default: stdin)
        #[arg(short = 'i', long)]
        input: Option<PathBuf>,

        /// Input is base64 text
        #[arg(long)]
        base64: bool,

        /// Verbose output
        #[arg(short, long, action = clap::ArgAction::Count)]
        verbose: u8,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Create { input, output, name, start, no_loader, strict_name, base64, verbose } => {
            let options = CreateOptions { name, start, no_loader, strict_name, base64, verbose };
            create_tape(&input, output, options)?;
        }
        Commands::List { input, base64, verbose } => {
            list_tape(input, base64, verbose)?;
        }
    }

    Ok(())
}

struct CreateOptions {
    name: Option<String>,
    start: u32,
    no_loader: bool,
    strict_name: bool,
    base64: bool,
    verbose: u8,
}

/// Accepts `32768`, `0x8000` or `$8000`
fn parse_address(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else if let Some(hex) = s.strip_prefix('$') {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse::<u32>()
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", s, e))
}

fn create_tape(input: &Path, output: Option<PathBuf>, options: CreateOptions) -> Result<()> {
    let code = fs::read(input)
        .with_context(|| format!("Failed to read file: {}", input.display()))?;

    let name = match options.name {
        Some(name) => name,
        None => input
            .file_stem()
            .ok_or_else(|| anyhow::anyhow!("Invalid filename"))?
            .to_string_lossy()
            .to_string(),
    };

    let config = EncoderConfig {
        name_policy: if options.strict_name { NamePolicy::Strict } else { NamePolicy::Truncate },
        ..EncoderConfig::default()
    };
    let encoder = Encoder::new().with_config(config).with_verbose(options.verbose);
    let (tape, summary) = encoder
        .encode_with_summary(&code, &name, options.start, !options.no_loader)
        .with_context(|| format!("Failed to encode: {}", input.display()))?;

    let bytes = if options.base64 {
        let mut text = base64::engine::general_purpose::STANDARD.encode(&tape);
        text.push('\n');
        text.into_bytes()
    } else {
        tape
    };

    match &output {
        Some(output_path) => {
            fs::write(output_path, &bytes)
                .with_context(|| format!("Failed to write: {}", output_path.display()))?;
        }
        None => {
            io::stdout().write_all(&bytes)?;
        }
    }

    // Keep stdout clean when the tape itself goes there
    if options.verbose > 0 {
        let report = |line: String| {
            if output.is_some() {
                println!("{}", line);
            } else {
                eprintln!("{}", line);
            }
        };
        match &output {
            Some(path) => report(format!("Created {}", path.display())),
            None => report("Created tape on stdout".to_string()),
        }
        if let (Some(len), Some(line)) = (summary.loader_len, summary.autostart_line) {
            report(format!("  BASIC loader: {} bytes (autostart line {})", len, line));
        }
        report(format!(
            "  Machine code: {} bytes at ${:04X}",
            summary.code_len, summary.start_address
        ));
        report(format!("  Total TAP size: {} bytes", summary.total_len));
    }

    Ok(())
}

fn read_input(input: Option<PathBuf>, base64: bool) -> Result<Vec<u8>> {
    let raw = if let Some(input_path) = input {
        fs::read(&input_path)
            .with_context(|| format!("Failed to read: {}", input_path.display()))?
    } else {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        buffer
    };

    if !base64 {
        return Ok(raw);
    }
    let text: Vec<u8> = raw.into_iter().filter(|c| !c.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(&text)
        .map_err(|e| anyhow::anyhow!("Failed to decode base64 input: {}", e))
}

fn list_tape(input: Option<PathBuf>, base64: bool, verbose: u8) -> Result<()> {
    let tape = read_input(input, base64)?;
    let decoder = Decoder::new().with_verbose(verbose);
    let entries = decoder.describe(&tape)?;

    if verbose > 0 {
        println!("Entries: {}  Size: {} bytes", entries.len(), tape.len());
    }

    for entry in &entries {
        match entry {
            TapeEntry::File { header, data } => {
                match header.kind {
                    HeaderType::Program => {
                        println!(
                            "{}: \"{}\"  {} bytes  LINE {}",
                            header.kind.label(),
                            header.name_str(),
                            header.data_len(),
                            header.param1
                        );
                        if verbose > 0 {
                            match parse_program(data.payload()) {
                                Ok(lines) => {
                                    for line in &lines {
                                        println!("    {}", line.to_text());
                                    }
                                }
                                Err(e) => println!("    ({})", e),
                            }
                        }
                    }
                    HeaderType::Code => {
                        println!(
                            "{}: \"{}\"  {} bytes  CODE {},{}",
                            header.kind.label(),
                            header.name_str(),
                            header.data_len(),
                            header.param1,
                            header.data_len()
                        );
                    }
                    HeaderType::NumberArray | HeaderType::CharacterArray => {
                        println!(
                            "{}: \"{}\"  {} bytes",
                            header.kind.label(),
                            header.name_str(),
                            header.data_len()
                        );
                    }
                }
                if verbose > 1 {
                    println!("    checksum {:#04x}", data.checksum());
                }
            }
            TapeEntry::Orphan(header) => {
                println!("{}: \"{}\"  (no data block)", header.kind.label(), header.name_str());
            }
            TapeEntry::Headerless(block) => {
                println!(
                    "Headerless: flag {:#04x}  {} bytes",
                    block.flag(),
                    block.payload().len()
                );
            }
        }
    }

    Ok(())
}
