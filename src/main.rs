//! sec-gateway server binary.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;

use sec_gateway::auth::{CredentialStore, Role};
use sec_gateway::config::load_config;
use sec_gateway::config::watcher::{apply_key_updates, KeysWatcher};
use sec_gateway::lifecycle::signals::shutdown_on_signal;
use sec_gateway::net::tls::load_tls_config;
use sec_gateway::observability::{logging, metrics};
use sec_gateway::{GatewayServer, Shutdown};

#[derive(Parser)]
#[command(name = "sec-gateway", version, about = "Security-operations API gateway")]
struct Args {
    /// TOML configuration file. Environment variables override it.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let config = load_config(args.config.as_deref()).context("failed to load configuration")?;
    logging::init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.environment,
        bind_address = %config.listener.bind_address,
        files_root = %config.files.root,
        "sec-gateway starting"
    );
    if !config.auth.enabled {
        tracing::warn!("API authentication is DISABLED; non-admin routes are open to anyone");
    }
    if !config.upstream.verify_tls {
        tracing::warn!("Upstream TLS certificate verification is DISABLED");
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = match &config.auth.keys_file {
        Some(path) => CredentialStore::load_from_file(Path::new(path))
            .with_context(|| format!("failed to load keys file {}", path))?,
        None => CredentialStore::new(None),
    };
    if let Some(token) = &config.auth.bootstrap_key {
        let key = store
            .register_token(token, Role::Admin, Some("bootstrap".to_string()))
            .context("invalid bootstrap key")?;
        tracing::info!(target: "audit", key_id = %key.id, "Bootstrap admin key registered");
    }
    if let Some(path) = store.persistence_path() {
        if !path.exists() {
            store.save_to_file().context("failed to create keys file")?;
        }
    }
    if config.auth.enabled && store.is_empty() {
        tracing::warn!("No API keys configured; every protected route will answer 401");
    }

    let shutdown = Shutdown::new();

    // Held for the life of the process; dropping it stops the watcher.
    let _keys_watcher = match (&config.auth.keys_file, config.auth.watch_keys_file) {
        (Some(path), true) => {
            let (watcher, updates) = KeysWatcher::new(Path::new(path));
            match watcher.run() {
                Ok(handle) => {
                    tokio::spawn(apply_key_updates(store.clone(), updates, shutdown.subscribe()));
                    Some(handle)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to start keys watcher; hot reload disabled");
                    None
                }
            }
        }
        _ => None,
    };

    let tls = config.listener.tls.clone();
    let bind_address = config.listener.bind_address.clone();
    let server = GatewayServer::new(config, store.clone()).context("failed to build gateway")?;

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move { shutdown_on_signal(&signal_shutdown).await });

    let served = match tls {
        Some(tls) => {
            let rustls = load_tls_config(&tls).await.context("failed to load TLS configuration")?;
            let addr: SocketAddr = bind_address.parse().context("invalid bind address")?;
            server.run_tls(addr, rustls, &shutdown).await
        }
        None => {
            let listener = TcpListener::bind(&bind_address)
                .await
                .with_context(|| format!("failed to bind {}", bind_address))?;
            server.run(listener, &shutdown).await
        }
    };

    // Stop background tasks even if the server exited on its own.
    shutdown.trigger();
    if let Err(e) = store.save_to_file() {
        tracing::error!(error = %e, "Failed to save keys file on shutdown");
    }

    served.context("server error")?;
    tracing::info!("Shutdown complete");
    Ok(())
}
