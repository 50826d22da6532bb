use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ratewarden::config::RatewardenConfig;
use ratewarden::http::HttpServer;
use ratewarden::ratelimit::{ExpirySweeper, LimitRule, LimiterStore};

/// Command line arguments. Values given here override the configuration file.
#[derive(Parser, Debug)]
#[command(name = "ratewarden", version)]
#[command(about = "Sliding-window rate limiter with an administrative API")]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Default maximum requests per window
    #[arg(long)]
    default_limit: Option<i64>,

    /// Default window length in milliseconds
    #[arg(long)]
    default_window_ms: Option<i64>,

    /// Seconds between two expiry sweeps
    #[arg(long)]
    sweep_interval_secs: Option<u64>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn load_config(&self) -> anyhow::Result<RatewardenConfig> {
        let mut config = match &self.config {
            Some(path) => RatewardenConfig::from_file(path)?,
            None => RatewardenConfig::default(),
        };

        if let Some(port) = self.port {
            config.server.http_addr.set_port(port);
        }

        if self.default_limit.is_some() || self.default_window_ms.is_some() {
            let current = config.rate_limiting.default_rule;
            config.rate_limiting.default_rule = LimitRule::new(
                self.default_limit.unwrap_or(current.limit() as i64),
                self.default_window_ms.unwrap_or(current.window_ms() as i64),
            )?;
        }

        if let Some(secs) = self.sweep_interval_secs {
            config.rate_limiting.sweep_interval_secs = secs;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!("Starting Ratewarden rate limiting service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = args.load_config()?;
    info!(
        http_addr = %config.server.http_addr,
        default_rule = %config.rate_limiting.default_rule,
        overrides = config.rate_limiting.overrides.len(),
        "Configuration loaded"
    );

    let store = Arc::new(LimiterStore::with_overrides(
        config.rate_limiting.default_rule,
        config.rate_limiting.overrides.clone().into_iter().collect(),
    ));
    info!("Rate limiter initialized");

    let sweeper = ExpirySweeper::new(store.clone(), config.rate_limiting.sweep_interval()).spawn();

    let server = HttpServer::new(
        config.server.http_addr,
        store,
        config.server.body_limit_bytes,
    );

    // Stop the sweeper whether the server exits cleanly or not
    let result = server.serve_with_shutdown(shutdown_signal()).await;
    sweeper.shutdown().await;
    result?;

    info!("Ratewarden stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
