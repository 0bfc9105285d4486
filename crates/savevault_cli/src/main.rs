//! savevault CLI
//!
//! Maintenance tools for savevault stores.
//!
//! # Commands
//!
//! - `list` - List live records
//! - `inspect` - Display the raw index, tombstones included
//! - `verify` - Decrypt and verify every live record
//! - `defrag` - Compact the store, reclaiming dead space

mod commands;

use clap::{Parser, Subcommand};
use savevault_core::EncryptionKey;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// savevault command-line store tools.
#[derive(Parser)]
#[command(name = "savevault")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base path of the store (without the .idx/.dat extension)
    #[arg(global = true, short, long)]
    base: Option<PathBuf>,

    /// File holding the raw 32-byte encryption key
    #[arg(global = true, long)]
    key_file: Option<PathBuf>,

    /// Passphrase to derive the encryption key from
    #[arg(global = true, long, conflicts_with = "key_file")]
    passphrase: Option<String>,

    /// Salt for passphrase derivation
    #[arg(global = true, long, default_value = "savevault")]
    salt: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List live records
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Display the raw index, tombstones included
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Decrypt and verify every live record
    Verify,

    /// Compact the store, reclaiming dead space
    Defrag {
        /// Dry run - report what would be reclaimed without rewriting
        #[arg(short, long)]
        dry_run: bool,
    },
}

impl Cli {
    /// Resolves the encryption key from `--key-file` or `--passphrase`.
    fn load_key(&self) -> Result<EncryptionKey, Box<dyn std::error::Error>> {
        if let Some(path) = &self.key_file {
            let bytes = std::fs::read(path)?;
            return Ok(EncryptionKey::from_bytes(&bytes)?);
        }
        if let Some(passphrase) = &self.passphrase {
            return Ok(EncryptionKey::derive_from_passphrase(
                passphrase.as_bytes(),
                self.salt.as_bytes(),
            )?);
        }
        Err("a key is required: pass --key-file or --passphrase".into())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::List { format } => {
            let base = cli.base.clone().ok_or("Store base path required for list")?;
            commands::list::run(&base, format)?;
        }
        Commands::Inspect { format } => {
            let base = cli
                .base
                .clone()
                .ok_or("Store base path required for inspect")?;
            commands::inspect::run(&base, format)?;
        }
        Commands::Verify => {
            let base = cli
                .base
                .clone()
                .ok_or("Store base path required for verify")?;
            let key = cli.load_key()?;
            commands::verify::run(&base, key)?;
        }
        Commands::Defrag { dry_run } => {
            let base = cli
                .base
                .clone()
                .ok_or("Store base path required for defrag")?;
            if *dry_run {
                commands::defrag::dry_run(&base)?;
            } else {
                let key = cli.load_key()?;
                commands::defrag::run(&base, key)?;
            }
        }
    }

    Ok(())
}
