//! `fieldcrypt-svc`: HTTP front end for the field encryption library.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (JSON logs, optional OTLP).
//! 3. Decode the master key; a missing or malformed key is fatal.
//! 4. Load the classifier rule table (built-in unless a file is configured).
//! 5. Build the Axum router and start the server.

mod config;
mod server;
mod telemetry;

use std::sync::Arc;

use anyhow::{Context, Result};
use fieldcrypt::{HexKeyProvider, RotationPolicy, RuleTable};
use tracing::info;

use config::Config;
use server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        otlp = cfg.otel_exporter_otlp_endpoint.is_some(),
        "fieldcrypt-svc starting"
    );

    // -----------------------------------------------------------------------
    // 3. Master key
    // -----------------------------------------------------------------------
    let keys = HexKeyProvider::from_hex(&cfg.encryption_key)
        .context("ENCRYPTION_KEY is invalid")?
        .with_key_version(cfg.key_version);
    info!(key_version = cfg.key_version, "master key loaded");

    // -----------------------------------------------------------------------
    // 4. Classifier rules
    // -----------------------------------------------------------------------
    let rules = match &cfg.classifier_rules_path {
        Some(path) => {
            let rules = RuleTable::load(path)?;
            info!(path = %path, record_types = rules.record_type_count(), "rule table loaded");
            rules
        }
        None => RuleTable::builtin(),
    };

    // -----------------------------------------------------------------------
    // 5. HTTP server
    // -----------------------------------------------------------------------
    let state = AppState::new(
        Arc::new(keys),
        Arc::new(rules),
        RotationPolicy::from_days(cfg.rotation_max_age_days),
    );
    let router = server::router::build(state);

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, router).await;

    telemetry::shutdown_telemetry();
    served?;
    Ok(())
}
