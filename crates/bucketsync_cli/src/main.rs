//! bucketsync CLI
//!
//! Command-line tools for bucketsync bucket management.
//!
//! # Commands
//!
//! - `keygen` - Generate a bucket keypair
//! - `id` - Show the bucket id for a key file
//! - `status` - Show pending local changes against the manifest
//! - `compile` - Run the compiler pipeline over one file
//! - `push` - Publish a directory into a local store

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// bucketsync command-line tools.
#[derive(Parser)]
#[command(name = "bucketsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a bucket keypair and write it to a key file
    Keygen {
        /// Where to write the private key (hex)
        #[arg(short, long, default_value = "bucket.key")]
        out: PathBuf,

        /// Overwrite an existing key file
        #[arg(short, long)]
        force: bool,
    },

    /// Show the bucket id and public key for a key file
    Id {
        /// Path to the key file
        #[arg(short, long, default_value = "bucket.key")]
        key: PathBuf,
    },

    /// Show pending local changes against the last-synced manifest
    Status {
        /// Sync root to scan
        path: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run the compiler pipeline over one file and show the artifacts
    Compile {
        /// Source file to compile
        file: PathBuf,

        /// Excerpt length limit in characters
        #[arg(short, long)]
        excerpt_limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Publish a directory into a local blob store via an embedded server
    Push {
        /// Sync root to publish
        path: PathBuf,

        /// Store directory for blobs
        #[arg(short, long)]
        store: PathBuf,

        /// Path to the key file
        #[arg(short, long, default_value = "bucket.key")]
        key: PathBuf,

        /// Encrypt payloads with the bucket secret before storing
        #[arg(short, long)]
        encrypt: bool,
    },

    /// Show version information
    Version,
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

    match cli.command {
        Commands::Keygen { out, force } => {
            commands::keygen::run(&out, force)?;
        }
        Commands::Id { key } => {
            commands::keygen::show_id(&key)?;
        }
        Commands::Status { path, format } => {
            commands::status::run(&path, &format)?;
        }
        Commands::Compile {
            file,
            excerpt_limit,
            format,
        } => {
            commands::compile::run(&file, excerpt_limit, &format)?;
        }
        Commands::Push {
            path,
            store,
            key,
            encrypt,
        } => {
            commands::push::run(&path, &store, &key, encrypt)?;
        }
        Commands::Version => {
            println!("bucketsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
