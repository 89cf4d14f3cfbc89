// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `sokoni serve` command implementation.
//!
//! Wires the SQLite store, the WhatsApp gateway client, the order service,
//! the dialogue engine, and the abandoned-cart scanner, then serves the
//! webhook + admin HTTP API until a shutdown signal arrives.

use std::path::Path;
use std::sync::Arc;

use sokoni_config::SokoniConfig;
use sokoni_core::{OutboundGateway, SokoniError};
use sokoni_cron::AbandonedCartScanner;
use sokoni_dialogue::DialogueEngine;
use sokoni_gateway::{start_server, AppState, ServerConfig};
use sokoni_orders::OrderService;
use sokoni_storage::Database;
use sokoni_whatsapp::WhatsAppClient;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Initializes the tracing subscriber from the configured log level.
///
/// `RUST_LOG` overrides the config value when set.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Runs the `sokoni serve` command.
pub async fn run_serve(config: SokoniConfig) -> Result<(), SokoniError> {
    init_tracing(&config.agent.log_level);
    info!("starting sokoni serve");

    // Make sure the data directory exists before SQLite opens the file.
    if let Some(parent) = Path::new(&config.storage.database_path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            SokoniError::Config(format!(
                "cannot create data directory {}: {e}",
                parent.display()
            ))
        })?;
    }

    let db = Arc::new(Database::open(&config.storage.database_path).await?);
    info!(path = %config.storage.database_path, "storage ready");

    let gateway: Arc<dyn OutboundGateway> = Arc::new(WhatsAppClient::new(&config.whatsapp)?);
    let orders = Arc::new(OrderService::new(
        Arc::clone(&db),
        Arc::clone(&gateway),
        config.orders.number_prefix.clone(),
    ));
    let engine = Arc::new(DialogueEngine::new(
        Arc::clone(&db),
        Arc::clone(&gateway),
        Arc::clone(&orders),
        config.whatsapp.business_phone.clone(),
    ));

    let scanner = AbandonedCartScanner::new(
        Arc::clone(&db),
        Arc::clone(&gateway),
        &config.reminders,
    )?;
    let cancel = CancellationToken::new();
    let scanner_handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { scanner.run(cancel).await }
    });

    let state = AppState {
        engine,
        orders,
        verify_token: config.whatsapp.verify_token.clone(),
        app_secret: config.whatsapp.app_secret.clone(),
    };
    let server_config = ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
    };

    tokio::select! {
        result = start_server(&server_config, state) => {
            if let Err(e) = result {
                error!(error = %e, "server exited with error");
                cancel.cancel();
                let _ = scanner_handle.await;
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    cancel.cancel();
    let _ = scanner_handle.await;
    info!("sokoni stopped");
    Ok(())
}
