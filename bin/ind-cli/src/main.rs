mod cli;
mod logging;

use anyhow::Context;
use clap::Parser;
use cli::{require_config, Cli, Command};
use ind_client::TradeClient;
use ind_protocol::{
    endpoints::{handle_decrypt_data, handle_encrypt_data},
    types::{messages::DataRequest, Guid},
};
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;
use std::{io::Read, path::Path};
use tracing::info;

#[tokio::main]
pub async fn main() {
    if let Err(e) = run_main().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.client_config()?;

    // Keep `_logging` around until we exit so that file logs are flushed.
    let logging_config = config
        .as_ref()
        .map(|config| config.logging.clone())
        .unwrap_or_default();
    let _logging = logging::init_logging(&logging_config)?;

    match cli.command {
        Command::Encrypt { request } => {
            let request = read_request(&request)?;
            let mut rng = StdRng::from_entropy();
            print_json(&handle_encrypt_data(&mut rng, &request))?;
        }
        Command::Decrypt { request } => {
            let request = read_request(&request)?;
            print_json(&handle_decrypt_data(&request))?;
        }
        Command::Address {
            guid,
            company,
            signer,
        } => {
            let client = TradeClient::connect(&require_config(config)?);
            let guid = Guid::new(guid)?;
            let address = client.one_time_address(&guid, &company, &signer).await?;
            info!("One-time address issued for trade {}", guid);
            print_json(&address)?;
        }
        Command::Register {
            company,
            url,
            signature,
        } => {
            let client = TradeClient::connect(&require_config(config)?);
            client.register_company(&company, &url, &signature).await?;
            info!("Registered {}", company);
        }
        Command::Unregister { company, signature } => {
            let client = TradeClient::connect(&require_config(config)?);
            client.unregister_company(&company, &signature).await?;
            info!("Unregistered {}", company);
        }
    }
    Ok(())
}

fn read_request(path: &Path) -> anyhow::Result<DataRequest> {
    let mut json = String::new();
    if path == Path::new("-") {
        let _ = std::io::stdin().read_to_string(&mut json)?;
    } else {
        json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
    }
    Ok(serde_json::from_str(&json)?)
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
