//! Command-line arguments

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use ind_client::Config;
use std::path::PathBuf;

#[derive(Debug, Parser)]
pub struct Cli {
    /// Location of client config file.
    /// Only the data commands work without one.
    #[clap(long)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Encrypt the fields of an encrypt data request and print the response
    Encrypt {
        /// JSON request file, or `-` for standard input
        #[clap(long)]
        request: PathBuf,
    },
    /// Decrypt the fields of a decrypt data request and print the response
    Decrypt {
        /// JSON request file, or `-` for standard input
        #[clap(long)]
        request: PathBuf,
    },
    /// Request the one-time address of a trade from the wallet service
    Address {
        #[clap(long)]
        guid: String,
        #[clap(long)]
        company: String,
        #[clap(long)]
        signer: String,
    },
    /// Register a company with the relay
    Register {
        #[clap(long)]
        company: String,
        #[clap(long)]
        url: String,
        /// Signature over the registration message
        #[clap(long)]
        signature: String,
    },
    /// Unregister a company from the relay
    Unregister {
        #[clap(long)]
        company: String,
        /// Signature over the unregistration message
        #[clap(long)]
        signature: String,
    },
}

impl Cli {
    pub fn client_config(&self) -> anyhow::Result<Option<Config>> {
        match &self.config {
            Some(path) => Ok(Some(Config::from_file(path)?)),
            None => Ok(None),
        }
    }
}

/// The config needed by commands that talk to the wallet or the relay.
pub fn require_config(config: Option<Config>) -> anyhow::Result<Config> {
    config.ok_or_else(|| anyhow!("This command needs the `--config` argument"))
}
