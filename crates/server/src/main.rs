//! filegate server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use filegate_core::config::AppConfig;
use filegate_server::{AppState, create_router};
use filegate_signer::TokenCodec;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// filegate - signed-link gateway for upstream blobs
#[derive(Parser, Debug)]
#[command(name = "filegate-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "FILEGATE_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Load configuration from an optional TOML file overlaid with `FILEGATE_` env vars.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if std::path::Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", path);
        let has_env_config = std::env::vars()
            .any(|(key, _)| key.starts_with("FILEGATE_") && key != "FILEGATE_CONFIG");
        if !has_env_config {
            anyhow::bail!(
                "No configuration provided.\n\n\
                 Provide configuration via one of:\n  \
                 1. Config file: filegate-server --config /path/to/config.toml\n  \
                 2. Environment variables: FILEGATE_UPSTREAM__TYPE=telegram \
                 FILEGATE_UPSTREAM__BOT_TOKEN=... FILEGATE_UPSTREAM__CONTAINER_ID=... filegate-server\n\n\
                 See config/server.example.toml for example configuration."
            );
        }
        tracing::info!("Using environment variables for configuration");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("FILEGATE_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,filegate=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("filegate v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    filegate_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let upstream = filegate_upstream::from_config(&config.upstream)
        .await
        .context("failed to initialize upstream")?;

    // Fail fast on bad credentials or an unreachable upstream.
    upstream
        .health_check()
        .await
        .context("upstream health check failed")?;
    tracing::info!(backend = upstream.backend_name(), "Upstream connectivity verified");

    let metadata = filegate_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    let codec = TokenCodec::from_config(&config.token).context("failed to load token secret")?;

    let state = AppState::new(config.clone(), codec, upstream, metadata);
    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use filegate_core::config::UpstreamConfig;

    #[test]
    fn load_config_from_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("server.toml");
        std::fs::write(
            &path,
            r#"
[server]
bind = "0.0.0.0:9000"

[upstream]
type = "filesystem"
path = "/tmp/filegate-blobs"

[token.secret]
type = "value"
secret = "file-config-secret-0123456789"

[cache]
ttl_secs = 120
capacity = 10
"#,
        )
        .unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.cache.capacity, 10);
        assert_eq!(config.cache.ttl_secs, 120);
        assert!(matches!(config.upstream, UpstreamConfig::Filesystem { .. }));
    }

    #[test]
    fn load_config_rejects_invalid_values() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("server.toml");
        std::fs::write(&path, "[cache]\ncapacity = 0\n").unwrap();

        let err = load_config(path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("cache.capacity"));
    }
}
