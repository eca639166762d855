//! `pii-gateway`: binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (redacted JSON logs, optional OTLP).
//! 3. Initialise AWS SDK clients, when the configuration needs them.
//! 4. Build the key service and the process-wide [`FieldEncryptor`].
//! 5. Resolve the search-hash secret and load record policies.
//! 6. Build the Axum router and serve HTTP or HTTPS until SIGINT/SIGTERM.
//!
//! [`FieldEncryptor`]: fieldcrypt::FieldEncryptor

mod aws;
mod config;
mod keys;
mod policy;
mod server;
mod telemetry;

use anyhow::{Context, Result};
use fieldcrypt::SearchHasher;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use config::Config;
use policy::PolicyRegistry;
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
        backend = cfg.key_service_backend.as_str(),
        "pii-gateway starting"
    );

    // Several dependencies pull in rustls; pin the process-wide provider.
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("rustls crypto provider already installed");
    }

    // -----------------------------------------------------------------------
    // 3. AWS clients
    // -----------------------------------------------------------------------
    let aws = if keys::needs_aws(&cfg) {
        let kms_endpoint = match cfg.key_service_backend {
            config::Backend::Kms => cfg.key_service_addr.as_deref(),
            _ => None,
        };
        Some(aws::AwsClients::init(kms_endpoint).await?)
    } else {
        None
    };

    // -----------------------------------------------------------------------
    // 4. Key service + encryptor
    // -----------------------------------------------------------------------
    let key_service = keys::build_key_service(&cfg, aws.as_ref())?;
    let encryptor = keys::build_encryptor(&cfg, key_service)?;

    // -----------------------------------------------------------------------
    // 5. Search secret + record policies
    // -----------------------------------------------------------------------
    let search_secret = aws::secrets::load_search_secret(&cfg, aws.as_ref()).await?;
    let hasher = SearchHasher::new(search_secret);

    let policies = match &cfg.policy_file {
        Some(path) => PolicyRegistry::load(path).await?,
        None => PolicyRegistry::default(),
    };
    if policies.is_empty() {
        warn!("no record policies loaded; record routes will return 404");
    }

    // -----------------------------------------------------------------------
    // 6. HTTP server
    // -----------------------------------------------------------------------
    let tls = match cfg.tls_paths() {
        Some((cert, key)) => Some(server::tls::load_server_config(cert, key).await?),
        None => None,
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let state = AppState::new(
        encryptor,
        hasher,
        policies,
        cfg.key_service_timeout(),
        shutdown.clone(),
    );
    let router = server::router::build(state);

    let result = server::serve(router, cfg.listen_port, tls, shutdown).await;
    info!("pii-gateway stopped");
    telemetry::shutdown_telemetry();
    result
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
async fn shutdown_on_signal(shutdown: CancellationToken) -> Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
        _ = sigterm.recv() => info!("SIGTERM received"),
    }
    shutdown.cancel();
    Ok(())
}
