#![deny(unsafe_code)]

//! localsock CLI: send HTTP requests to a daemon over its local socket.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use localsock_config::AppConfig;
use localsock_core::Transport;
use localsock_core::build_info;
use localsock_core::hyper::body::Bytes;
use localsock_core::hyper::{Method, Response};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Talk HTTP to a local daemon through a Unix socket or named pipe.
#[derive(Parser)]
#[command(name = "localsock", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "localsock.toml")]
    config: PathBuf,

    /// Socket path or pipe name, overriding the configuration.
    #[arg(short, long)]
    address: Option<String>,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the daemon answers `GET /_ping`.
    Ping,

    /// Send a single request and print the response body.
    Request {
        /// HTTP method (GET, POST, ...).
        method: String,

        /// Request path, e.g. `/v1.47/containers/json`.
        path: String,

        /// Request body.
        #[arg(short, long)]
        data: Option<String>,

        /// Content type of the request body.
        #[arg(long, default_value = "application/json")]
        content_type: String,

        /// Print the status line and headers before the body.
        #[arg(short, long)]
        include: bool,

        /// Pretty-print JSON response bodies.
        #[arg(long)]
        pretty: bool,
    },

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },

    /// Print version and build information.
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, loaded) = load_config(&cli.config, cli.address.as_deref()).await?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_filter(cli.verbose, &config))),
        )
        .with_writer(std::io::stderr)
        .init();

    if !loaded {
        info!(path = %cli.config.display(), "Config file not found, using defaults");
    }

    match cli.command {
        Commands::Ping => cmd_ping(&config).await?,
        Commands::Request {
            method,
            path,
            data,
            content_type,
            include,
            pretty,
        } => {
            let method = parse_method(&method)?;
            let transport = Transport::from_config(&config.transport)?;
            let response = match data {
                Some(data) => match method {
                    Method::POST => transport.post(&path, &content_type, data).await?,
                    Method::PUT => transport.put(&path, &content_type, data).await?,
                    other => bail!("--data is only accepted with POST or PUT, not {other}"),
                },
                None => send_empty(&transport, method, &path).await?,
            };
            print_response(&response, include, pretty)?;
            if !response.status().is_success() {
                bail!("daemon answered {}", response.status());
            }
        }
        Commands::Config { show } => cmd_config(&cli.config, &config, show)?,
        Commands::Version => println!("localsock {}", build_info::version_string()),
    }

    Ok(())
}

async fn cmd_ping(config: &AppConfig) -> Result<()> {
    let transport = Transport::from_config(&config.transport)?;
    debug!(address = %transport.address(), "Pinging daemon");

    let response = transport
        .get("/_ping")
        .await
        .with_context(|| format!("no daemon reachable at {}", transport.address()))?;
    if !response.status().is_success() {
        bail!("daemon answered {}", response.status());
    }

    let body = String::from_utf8_lossy(response.body());
    match response
        .headers()
        .get("api-version")
        .and_then(|v| v.to_str().ok())
    {
        Some(version) => println!("{} (API {version})", body.trim()),
        None => println!("{}", body.trim()),
    }
    Ok(())
}

async fn send_empty(
    transport: &Transport,
    method: Method,
    path: &str,
) -> Result<Response<Bytes>> {
    let response = match method {
        Method::GET => transport.get(path).await?,
        Method::HEAD => transport.head(path).await?,
        Method::DELETE => transport.delete(path).await?,
        Method::POST => transport.post(path, "text/plain", Bytes::new()).await?,
        Method::PUT => transport.put(path, "text/plain", Bytes::new()).await?,
        other => {
            let request = localsock_core::hyper::Request::builder()
                .method(other)
                .uri(path)
                .body(localsock_core::http_body_util::Full::new(Bytes::new()))?;
            transport.execute(request).await?
        }
    };
    Ok(response)
}

fn cmd_config(config_path: &Path, config: &AppConfig, show: bool) -> Result<()> {
    if show {
        let toml_str = toml::to_string_pretty(config).context("failed to render configuration")?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

/// Load the config file if present, then apply the `--address` override.
///
/// Returns the config and whether the file existed.
async fn load_config(path: &Path, address: Option<&str>) -> Result<(AppConfig, bool)> {
    let loaded = path.exists();
    let mut config = if loaded {
        AppConfig::load(path)
            .await
            .with_context(|| format!("failed to load {}", path.display()))?
    } else {
        AppConfig::default()
    };

    if let Some(address) = address {
        config.transport.address = address.to_string();
        config.validate()?;
    }
    Ok((config, loaded))
}

/// Pick the log filter: `-v` flags win over the configured level.
fn log_filter(verbose: u8, config: &AppConfig) -> String {
    match verbose {
        0 => config.logging.level.to_ascii_lowercase(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

fn parse_method(method: &str) -> Result<Method> {
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method {method:?}"))
}

fn print_response(response: &Response<Bytes>, include: bool, pretty: bool) -> Result<()> {
    let mut out = std::io::stdout().lock();
    if include {
        writeln!(out, "{:?} {}", response.version(), response.status())?;
        for (name, value) in response.headers() {
            writeln!(out, "{name}: {}", String::from_utf8_lossy(value.as_bytes()))?;
        }
        writeln!(out)?;
    }
    out.write_all(&render_body(response.body(), pretty))?;
    out.flush()?;
    Ok(())
}

/// The body as printed: re-indented when `pretty` and it parses as JSON.
fn render_body(body: &Bytes, pretty: bool) -> Vec<u8> {
    if pretty {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
            if let Ok(mut text) = serde_json::to_string_pretty(&value) {
                text.push('\n');
                return text.into_bytes();
            }
        }
    }
    body.to_vec()
}
