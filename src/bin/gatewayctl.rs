use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{json, Value};

use sec_gateway::auth::credentials::issue_key;
use sec_gateway::auth::{CredentialStore, Role};

#[derive(Parser)]
#[command(name = "gatewayctl")]
#[command(about = "Management CLI for the security-operations gateway", long_about = None)]
struct Cli {
    #[arg(short, long, env = "GATEWAY_URL", default_value = "http://localhost:8888")]
    url: String,

    /// Admin API key, sent as X-API-Key.
    #[arg(short, long, env = "GATEWAY_API_KEY")]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a key offline and print its token and keys-file record
    Keygen {
        #[arg(long, default_value = "viewer")]
        role: Role,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        rate_limit: Option<u32>,
        /// Add the record to this keys file instead of only printing it
        #[arg(long)]
        keys_file: Option<PathBuf>,
    },
    /// Check gateway status (admin)
    Status,
    /// Manage API keys through the admin API
    Keys {
        #[command(subcommand)]
        command: KeyCommands,
    },
    /// Check gateway health
    Health,
}

#[derive(Subcommand)]
enum KeyCommands {
    /// List key metadata
    List,
    /// Create a key; the token is printed once
    Create {
        #[arg(long)]
        role: Role,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        rate_limit: Option<u32>,
    },
    /// Revoke a key by id
    Revoke { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let client = reqwest::Client::new();
    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert("x-api-key", HeaderValue::from_str(key).context("API key is not a valid header value")?);
    }
    let base = cli.url.trim_end_matches('/');

    let request = match cli.command {
        Commands::Keygen { role, label, rate_limit, keys_file } => {
            return keygen(role, label, rate_limit, keys_file);
        }
        Commands::Status => client.get(format!("{}/admin/status", base)),
        Commands::Health => client.get(format!("{}/health", base)),
        Commands::Keys { command: KeyCommands::List } => client.get(format!("{}/admin/keys", base)),
        Commands::Keys { command: KeyCommands::Create { role, label, rate_limit } } => client
            .post(format!("{}/admin/keys", base))
            .json(&json!({ "role": role, "label": label, "rate_limit_per_minute": rate_limit })),
        Commands::Keys { command: KeyCommands::Revoke { id } } => {
            client.post(format!("{}/admin/keys/{}/revoke", base, id))
        }
    };

    let res = request.headers(headers).send().await.context("request to gateway failed")?;
    print_response(res).await
}

fn keygen(role: Role, label: Option<String>, rate_limit: Option<u32>, keys_file: Option<PathBuf>) -> anyhow::Result<()> {
    let issued = issue_key(role, label, rate_limit);

    if let Some(path) = keys_file {
        let store = CredentialStore::load_from_file(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        store.merge(vec![issued.key.clone()]);
        store
            .save_to_file()
            .with_context(|| format!("failed to write {}", path.display()))?;
        eprintln!("Added key {} to {}", issued.key.id, path.display());
    } else {
        println!("{}", serde_json::to_string_pretty(&issued.key)?);
    }

    eprintln!("Token (shown once, store it now):");
    println!("{}", issued.token);
    Ok(())
}

async fn print_response(res: reqwest::Response) -> anyhow::Result<()> {
    let status = res.status();
    if !status.is_success() {
        let text = res.text().await.unwrap_or_default();
        bail!("gateway returned status {}: {}", status, text);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
