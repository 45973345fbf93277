//! Cascette resolver binary entry point.
//!
//! Thin wrapper around the cascette-resolver library that opens a local
//! installation and resolves paths through its Root, Encoding and Index
//! tables. Payloads are written still framed; no BLTE decoding happens here.

use anyhow::{Context, Result, bail};
use cascette_resolver::resolver::{filename_hash, normalize_path};
use cascette_resolver::{RawPayload, StorageConfig, StorageContext};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(
    name = "cascette-resolve",
    about = "Resolve asset paths in a local CASC installation",
    version
)]
struct Cli {
    /// JSON configuration file
    #[arg(long, env = "CASCETTE_RESOLVE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Installation root (overrides the config file)
    #[arg(long, env = "CASCETTE_WOW_PATH", global = true)]
    install: Option<PathBuf>,

    /// Encoding table file key, hex (overrides the config file)
    #[arg(long, env = "CASCETTE_ENCODING_KEY", global = true)]
    encoding_key: Option<String>,

    /// Root table content checksum, hex (overrides the config file)
    #[arg(long, env = "CASCETTE_ROOT_CHECKSUM", global = true)]
    root_checksum: Option<String>,

    /// Read shards through file handles instead of memory maps
    #[arg(long, global = true)]
    no_mmap: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve a path and write its framed payload
    Resolve {
        /// Logical asset path
        path: String,
        /// Output file; prints the payload size when omitted
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Print the normalized path and filename hash
    Hash {
        /// Logical asset path
        path: String,
    },
    /// List root entries for a path or filename hash
    Checksums {
        /// Logical asset path
        path: Option<String>,
        /// Filename hash, hex
        #[arg(long, conflicts_with = "path")]
        hash: Option<String>,
    },
    /// Load every table and print their sizes
    Stats,
}

impl Cli {
    fn storage_config(&self) -> Result<StorageConfig> {
        let mut config = match &self.config {
            Some(path) => StorageConfig::from_json_file(path)?,
            None => StorageConfig::default(),
        };
        if let Some(install) = &self.install {
            config = config.with_install_path(install);
        }
        if let Some(key) = &self.encoding_key {
            config = config.with_encoding_key(key.clone());
        }
        if let Some(key) = &self.root_checksum {
            config = config.with_root_checksum(key.clone());
        }
        if self.no_mmap {
            config = config.with_mmap(false);
        }
        config.validate()?;
        Ok(config)
    }

    fn open(&self) -> Result<StorageContext> {
        let config = self.storage_config()?;
        Ok(StorageContext::open(config, Arc::new(RawPayload))?)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Command::Hash { path } => {
            println!("{}", normalize_path(path));
            println!("{:016x}", filename_hash(path));
        }
        Command::Resolve { path, out } => {
            let context = cli.open()?;
            let Some(block) = context.resolve(path)? else {
                bail!("{path} not found");
            };
            match out {
                Some(out) => {
                    std::fs::write(out, block.into_bytes())
                        .with_context(|| format!("writing {}", out.display()))?;
                    tracing::info!("Wrote {} to {}", path, out.display());
                }
                None => println!("{path}: {} bytes", block.len()),
            }
        }
        Command::Checksums { path, hash } => {
            let name_hash = match (path, hash) {
                (Some(path), _) => filename_hash(path),
                (None, Some(hex)) => u64::from_str_radix(hex.trim_start_matches("0x"), 16)
                    .with_context(|| format!("invalid filename hash {hex}"))?,
                (None, None) => bail!("either a path or --hash is required"),
            };
            let context = cli.open()?;
            let root = context.root()?;
            let encoding = context.encoding()?;
            for entry in root.entries_for(name_hash) {
                let file_key = encoding
                    .get_file_key(&entry.checksum)
                    .map_or_else(|| "-".to_string(), ToString::to_string);
                println!("{}  {}  {}", entry.checksum, entry.flags, file_key);
            }
        }
        Command::Stats => {
            let context = cli.open()?;
            context.initialise()?;
            println!("{}", serde_json::to_string_pretty(&context.stats())?);
        }
    }

    Ok(())
}
