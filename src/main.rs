//! Service host
//!
//! Runs an axum application behind an application listener and an admin
//! listener, registers it in a service registry when discovery is enabled,
//! and stops it on `/stop?secret=...` or SIGTERM/SIGINT.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────┐
//!                     │                  SERVICE HOST                     │
//!                     │                                                   │
//!   Application       │  ┌──────────────┐       ┌────────────────────┐   │
//!   traffic ──────────┼─▶│ application  │──────▶│ hosted application │   │
//!                     │  │  listener    │       └────────────────────┘   │
//!                     │  └──────────────┘                                 │
//!                     │                                                   │
//!   Operator ─────────┼─▶┌──────────────┐       ┌────────────────────┐   │
//!   /stop, /metrics   │  │    admin     │──────▶│ stop handler       │   │
//!                     │  │  listener    │       └─────────┬──────────┘   │
//!                     │  └──────────────┘                 ▼              │
//!                     │                         ┌────────────────────┐   │
//!   SIGTERM ──────────┼────────────────────────▶│ shutdown           │   │
//!                     │                         │ coordinator        │   │
//!                     │                         └─────────┬──────────┘   │
//!                     │                                   ▼              │
//!                     │  ┌──────────────┐  events ┌────────────────────┐  │     Service
//!                     │  │    server    │────────▶│ discovery          │──┼───▶ registry
//!                     │  │  lifecycle   │         │ lifecycle          │  │
//!                     │  └──────────────┘         └────────────────────┘  │
//!                     └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use axum::{routing::get, Json, Router};
use clap::{CommandFactory, Parser};
use serde_json::json;

use service_host::config::{read_config, validate_config, ServiceConfig};
use service_host::discovery::ProjectMetadata;
use service_host::observability::logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "service-host", version)]
#[command(about = "Hosts a service behind application and admin listeners", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host name advertised to the registry
    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    http_port: Option<u16>,

    #[arg(long)]
    http_admin_port: Option<u16>,

    /// Port advertised to the registry, when it differs from the bound one
    #[arg(long)]
    external_port: Option<u16>,

    /// Secret required by the admin /stop endpoint
    #[arg(long)]
    stop_secret: Option<String>,

    /// Register the service in the registry while it runs
    #[arg(long)]
    discoverable: bool,

    /// Registry connect string (comma separated host:port list)
    #[arg(long)]
    registry: Option<String>,

    /// Registry namespace
    #[arg(long)]
    namespace: Option<String>,

    /// Configuration file of the hosted application
    #[arg(long)]
    conf: Option<PathBuf>,
}

impl Cli {
    fn apply(self, config: &mut ServiceConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.http_port {
            config.server.http_port = port;
        }
        if let Some(port) = self.http_admin_port {
            config.server.http_admin_port = port;
        }
        if let Some(port) = self.external_port {
            config.server.external_port = Some(port);
        }
        if let Some(secret) = self.stop_secret {
            config.server.stop_secret = secret;
        }
        if self.discoverable {
            config.discovery.enabled = true;
        }
        if let Some(registry) = self.registry {
            config.discovery.connect_string = registry;
        }
        if let Some(namespace) = self.namespace {
            config.discovery.namespace = namespace;
        }
        if let Some(conf) = self.conf {
            config.conf = Some(conf);
        }
    }
}

/// Placeholder application: reports what is being hosted.
fn default_app(metadata: ProjectMetadata) -> Router {
    Router::new().route(
        "/",
        get(move || {
            let metadata = metadata.clone();
            async move {
                Json(json!({
                    "name": metadata.name,
                    "version": metadata.version,
                    "fullName": metadata.full_name(),
                }))
            }
        }),
    )
}

/// Print `errors` followed by the usage text and exit with status 2.
fn usage_error<E: std::fmt::Display>(errors: &[E]) -> ! {
    for error in errors {
        eprintln!("error: {error}");
    }
    eprintln!();
    eprintln!("{}", Cli::command().render_usage());
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match read_config(path) {
            Ok(config) => config,
            Err(e) => usage_error(&[format!("{}: {e}", path.display())]),
        },
        None => ServiceConfig::default(),
    };
    cli.apply(&mut config);

    if let Err(errors) = validate_config(&config) {
        usage_error(errors.as_slice());
    }

    init_logging(&config.observability)?;

    let metadata = ProjectMetadata::from_cargo().with_overrides(&config.service);
    tracing::info!(
        service = %metadata.full_name(),
        http_port = config.server.http_port,
        http_admin_port = config.server.http_admin_port,
        discovery = config.discovery.enabled,
        "{} starting",
        env!("CARGO_PKG_NAME")
    );

    service_host::lifecycle::run(&config, default_app(metadata)).await?;
    Ok(())
}
