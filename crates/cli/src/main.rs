//! Operator CLI for filegate.

mod api_client;

use anyhow::{Context, Result};
use api_client::ApiClient;
use clap::{Args, Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use filegate_core::config::{AppConfig, SecretConfig};
use filegate_metadata::{FileRow, MetadataStore, UserRow};
use filegate_signer::{TokenCodec, TokenError};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

const KINDS: [&str; 4] = ["document", "audio", "video", "photo"];

#[derive(Parser)]
#[command(name = "filegatectl")]
#[command(about = "Operator CLI for the filegate gateway")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ConfigArgs {
    /// Server configuration file (token secret, metadata store, public URL)
    #[arg(
        long,
        env = "FILEGATE_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[derive(Args, Clone)]
struct ApiArgs {
    /// Gateway base URL (defaults to server.public_base_url from config)
    #[arg(long, env = "FILEGATE_SERVER")]
    server: Option<String>,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue a fresh link for a resource identifier
    Link {
        resource_id: String,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Check a token and print the resource identifier it carries
    Verify {
        token: String,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Record an uploaded resource and print its links
    Publish {
        resource_id: String,
        /// Owner of the upload
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        file_name: Option<String>,
        /// Size in bytes
        #[arg(long, default_value_t = 0)]
        size: u64,
        /// document, audio, video or photo
        #[arg(long, default_value = "document")]
        kind: String,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Delete a resource record, invalidating every link issued for it
    Revoke {
        resource_id: String,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// List a user's most recent records
    List {
        #[arg(long)]
        user_id: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Check gateway health and version
    Health {
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Show aggregate counters
    Stats {
        #[command(flatten)]
        api: ApiArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let Cli { command } = Cli::parse();

    match command {
        Commands::Link {
            resource_id,
            config,
        } => handle_link_command(&resource_id, &config),
        Commands::Verify { token, config } => handle_verify_command(&token, &config),
        Commands::Publish {
            resource_id,
            user_id,
            username,
            file_name,
            size,
            kind,
            config,
        } => {
            let request = PublishRequest {
                resource_id,
                user_id,
                username,
                file_name,
                size,
                kind,
            };
            handle_publish_command(request, &config).await
        }
        Commands::Revoke {
            resource_id,
            config,
        } => handle_revoke_command(&resource_id, &config).await,
        Commands::List {
            user_id,
            limit,
            config,
        } => handle_list_command(&user_id, limit, &config).await,
        Commands::Health { api } => handle_health_command(&api).await,
        Commands::Stats { api } => handle_stats_command(&api).await,
    }
}

/// Load server configuration from an optional TOML file overlaid with `FILEGATE_` env vars.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if std::path::Path::new(path).exists() {
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", path);
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

/// Build the codec the gateway uses. A generated secret would produce links
/// no running gateway accepts, so it is refused here.
fn codec_for_links(config: &AppConfig) -> Result<TokenCodec> {
    if matches!(config.token.secret, SecretConfig::Generate) {
        anyhow::bail!(
            "token.secret is 'generate'; configure a file, env or value secret shared with the gateway"
        );
    }
    TokenCodec::from_config(&config.token).context("failed to load token secret")
}

/// Path-form links for a token: `(stream, download)`.
fn share_links(base_url: &str, token: &str) -> (String, String) {
    let base = base_url.trim_end_matches('/');
    (format!("{base}/stream/{token}"), format!("{base}/dl/{token}"))
}

fn print_links(config: &AppConfig, token: &str) {
    let (stream, download) = share_links(&config.server.public_base_url, token);
    println!("Token:    {token}");
    println!("Stream:   {stream}");
    println!("Download: {download}");
}

async fn open_store(config: &AppConfig) -> Result<Arc<dyn MetadataStore>> {
    filegate_metadata::from_config(&config.metadata)
        .await
        .context("failed to open metadata store")
}

fn handle_link_command(resource_id: &str, args: &ConfigArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let codec = codec_for_links(&config)?;
    let token = codec.encode(resource_id)?;
    print_links(&config, &token);
    Ok(())
}

fn handle_verify_command(token: &str, args: &ConfigArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let codec = codec_for_links(&config)?;
    match codec.decode(token.trim()) {
        Ok(resource_id) => {
            println!("Valid token for resource {resource_id}");
            Ok(())
        }
        Err(TokenError::SignatureMismatch) => {
            anyhow::bail!("signature does not match; the token was altered or issued with another secret")
        }
        Err(e) => Err(e.into()),
    }
}

struct PublishRequest {
    resource_id: String,
    user_id: String,
    username: Option<String>,
    file_name: Option<String>,
    size: u64,
    kind: String,
}

/// Insert the file record and count it against the owner.
async fn publish(
    store: &dyn MetadataStore,
    codec: &TokenCodec,
    config: &AppConfig,
    request: PublishRequest,
) -> Result<FileRow> {
    if !KINDS.contains(&request.kind.as_str()) {
        anyhow::bail!(
            "unknown kind '{}', expected one of {}",
            request.kind,
            KINDS.join(", ")
        );
    }
    if request.size > config.limits.ingestion_ceiling {
        anyhow::bail!(
            "size {} exceeds the ingestion ceiling of {} bytes",
            request.size,
            config.limits.ingestion_ceiling
        );
    }
    if request.size > config.limits.stream_ceiling {
        tracing::warn!(
            size = request.size,
            ceiling = config.limits.stream_ceiling,
            "resource is larger than the stream ceiling and only servable in stream mode"
        );
    }

    let token = codec.encode(&request.resource_id)?;
    let now = OffsetDateTime::now_utc();
    let row = FileRow {
        file_id: record_id(&request.resource_id, now),
        message_id: request.resource_id,
        user_id: request.user_id.clone(),
        username: request.username.clone(),
        file_name: request.file_name,
        file_size: i64::try_from(request.size).context("size out of range")?,
        file_type: Some(request.kind),
        secret_token: token,
        created_at: now,
        downloads: 0,
    };
    store.create_file(&row).await?;

    store
        .register_user(&UserRow {
            user_id: request.user_id,
            username: request.username,
            first_name: None,
            last_name: None,
            first_used: now,
            total_files: 0,
            last_activity: now,
        })
        .await?;

    Ok(row)
}

/// Record identifier derived from the resource and publish time.
fn record_id(resource_id: &str, at: OffsetDateTime) -> String {
    format!("{resource_id}-{}", at.unix_timestamp_nanos())
}

async fn handle_publish_command(request: PublishRequest, args: &ConfigArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let codec = codec_for_links(&config)?;
    let store = open_store(&config).await?;

    let row = publish(store.as_ref(), &codec, &config, request).await?;
    println!("Published resource {}", row.message_id);
    print_links(&config, &row.secret_token);
    Ok(())
}

async fn handle_revoke_command(resource_id: &str, args: &ConfigArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let store = open_store(&config).await?;

    if store.delete_file(resource_id).await? {
        println!("Revoked resource {resource_id}");
        Ok(())
    } else {
        anyhow::bail!("no record for resource {resource_id}")
    }
}

async fn handle_list_command(user_id: &str, limit: u32, args: &ConfigArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let store = open_store(&config).await?;

    let rows = store.list_user_files(user_id, limit).await?;
    if rows.is_empty() {
        println!("No records for user {user_id}");
        return Ok(());
    }

    println!(
        "{:<20} {:<30} {:>12} {:>9}  CREATED",
        "RESOURCE", "NAME", "SIZE", "DOWNLOADS"
    );
    for row in rows {
        println!(
            "{:<20} {:<30} {:>12} {:>9}  {}",
            row.message_id,
            row.file_name.as_deref().unwrap_or("-"),
            row.file_size,
            row.downloads,
            row.created_at.date()
        );
    }
    Ok(())
}

fn api_client(api: &ApiArgs) -> Result<ApiClient> {
    let server = match &api.server {
        Some(server) => server.clone(),
        None => load_config(&api.config.config)?.server.public_base_url,
    };
    ApiClient::new(&server)
}

async fn handle_health_command(api: &ApiArgs) -> Result<()> {
    let client = api_client(api)?;
    let health = client.health().await?;

    println!("Status: {}", health.status);
    println!("Upstream: {}", health.upstream);
    println!("Metadata: {}", health.metadata);
    println!("Cached descriptors: {}", health.cache_entries);
    println!("Server version: {}", health.version);
    println!("Client version: {}", env!("CARGO_PKG_VERSION"));

    if health.version != env!("CARGO_PKG_VERSION") {
        eprintln!(
            "Warning: version mismatch (server: {}, client: {})",
            health.version,
            env!("CARGO_PKG_VERSION")
        );
    }
    if health.status != "ok" {
        anyhow::bail!("gateway is {}", health.status);
    }
    Ok(())
}

async fn handle_stats_command(api: &ApiArgs) -> Result<()> {
    let client = api_client(api)?;
    let stats = client.stats().await?;

    println!("Files:     {}", stats.total_files);
    println!("Users:     {}", stats.total_users);
    println!("Downloads: {}", stats.total_downloads);
    println!("Bytes:     {}", stats.total_bytes);
    Ok(())
}
