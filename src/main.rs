//! CLI entry point for `mailhdr`.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use mailhdr::config::{Config, DecoderKind};
use mailhdr::header::header_block;
use mailhdr::{FieldValue, Header, HeaderParser};

#[derive(Parser)]
#[command(name = "mailhdr", version, about = "Parse and decode email headers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Date used when the Date header cannot be parsed
    #[arg(long, value_name = "DATE", env = "MAILHDR_FALLBACK_DATE", global = true)]
    fallback_date: Option<String>,

    /// Use the built-in RFC 2047 decoder instead of mail-parser's
    #[arg(long, global = true)]
    generic: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the decoded header fields of a message or header file
    Parse {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Print the multipart boundary of a message or header file
    Boundary { path: PathBuf },
    /// Print the effective configuration as TOML
    Config {
        /// Write it to the config file instead
        #[arg(long)]
        save: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = mailhdr::config::load_config();
    if let Some(date) = cli.fallback_date {
        config.parsing.fallback_date = Some(date);
    }
    if cli.generic {
        config.decoder.message = DecoderKind::Generic;
    }

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Parse { path, json } => {
            cmd_parse(&HeaderParser::new(config.options())?, &path, json)
        }
        Commands::Boundary { path } => cmd_boundary(&HeaderParser::new(config.options())?, &path),
        Commands::Config { save } => cmd_config(&config, save),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = mailhdr::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailhdr.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Read a file and parse its header block.
fn read_header(parser: &HeaderParser, path: &Path) -> anyhow::Result<Header> {
    let data = std::fs::read(path).map_err(|e| mailhdr::error::HeaderError::io(path, e))?;
    tracing::info!(path = %path.display(), bytes = data.len(), "Parsing header");
    Ok(parser.parse_bytes(header_block(&data)))
}

fn cmd_parse(parser: &HeaderParser, path: &Path, json: bool) -> anyhow::Result<()> {
    let header = read_header(parser, path)?;

    if json {
        let fields: serde_json::Map<String, serde_json::Value> = header
            .fields()
            .iter()
            .map(|(key, value)| serde_json::to_value(value).map(|v| (key.clone(), v)))
            .collect::<Result<_, serde_json::Error>>()?;
        let out = serde_json::json!({
            "file": path.to_string_lossy(),
            "boundary": header.boundary(),
            "priority": header.priority().code(),
            "fields": fields,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    for (key, value) in header.fields().iter().filter(|(_, v)| !v.is_empty()) {
        match value {
            FieldValue::Addresses(list) => {
                for (i, address) in list.iter().enumerate() {
                    let label = if i == 0 { key.as_str() } else { "" };
                    println!("  {:<20} {}", label, address);
                }
            }
            FieldValue::List(list) => {
                for (i, item) in list.iter().enumerate() {
                    let label = if i == 0 { key.as_str() } else { "" };
                    println!("  {:<20} {}", label, item);
                }
            }
            other => println!("  {:<20} {}", key, other),
        }
    }
    if let Some(boundary) = header.boundary() {
        println!("  {:<20} {}", "(boundary)", boundary);
    }
    println!();
    Ok(())
}

fn cmd_boundary(parser: &HeaderParser, path: &Path) -> anyhow::Result<()> {
    let header = read_header(parser, path)?;
    match header.boundary() {
        Some(boundary) => {
            println!("{boundary}");
            Ok(())
        }
        None => anyhow::bail!("No boundary found in {}", path.display()),
    }
}

fn cmd_config(config: &Config, save: bool) -> anyhow::Result<()> {
    if !save {
        print!("{}", toml::to_string_pretty(config)?);
        return Ok(());
    }
    mailhdr::config::save_config(config)?;
    if let Some(path) = mailhdr::config::config_file_path() {
        println!("Saved {}", path.display());
    }
    Ok(())
}
