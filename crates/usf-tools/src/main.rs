use clap::{Parser, Subcommand};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

mod commands;

use commands::{CompressionArg, OutputFormat};

#[derive(Parser)]
#[command(
    name = "usf",
    about = "Inspect and convert USF memory-access trace files",
    version,
    author
)]
struct Cli {
    /// Set the logging level
    #[arg(short, long, value_enum, default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the header and every event of a file
    Dump {
        /// File to read
        file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Copy a file, optionally changing its compression backend
    Convert {
        /// Source file
        input: PathBuf,

        /// Destination file
        output: PathBuf,

        /// Compression of the destination (defaults to the source's)
        #[arg(short, long, value_enum)]
        compression: Option<CompressionArg>,

        /// Decode the source with this backend regardless of its header
        #[arg(long = "override", value_enum)]
        compression_override: Option<CompressionArg>,

        /// bzip2 block size (1-9)
        #[arg(long, default_value_t = 9)]
        block_size: u32,
    },

    /// Summarize the events of a file
    Stats {
        /// File to read
        file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level; logs go to stderr so dumps stay pipeable
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(cli.log_level.into()).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match cli.command {
        Commands::Dump { file, format } => commands::dump(&file, format, &mut out)?,
        Commands::Convert {
            input,
            output,
            compression,
            compression_override,
            block_size,
        } => {
            let summary = commands::convert(
                &input,
                &output,
                compression.map(Into::into),
                compression_override.map(Into::into),
                block_size,
            )?;
            writeln!(out, "{summary}")?;
        }
        Commands::Stats { file, format } => commands::stats(&file, format, &mut out)?,
    }

    out.flush()?;
    Ok(())
}
