mod api;
mod config;
mod error;
mod oauth;
mod routes;
mod session;
#[cfg(test)]
mod test_support;

use clap::Parser;
use std::path::PathBuf;

/// Top Tracks: log in with a music streaming account (OAuth2 + PKCE) and
/// browse your most played tracks.
#[derive(Parser, Debug)]
#[command(name = "toptracks-web", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Port to listen on (overrides config file)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut cfg = match config::load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    // CLI --port overrides config
    if let Some(port) = cli.port {
        cfg.server.port = port;
    }

    tracing::info!(
        client_id = %cfg.provider.client_id,
        redirect_uri = %cfg.redirect_uri(),
        scopes = %cfg.provider.scopes.join(" "),
        secure_cookies = cfg.secure_cookies(),
        "Configuration loaded successfully"
    );

    let state = match routes::AppState::from_config(&cfg) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Configuration error: {e}");
            std::process::exit(1);
        }
    };
    let app = routes::router(state);

    let bind_addr = format!("{}:{}", cfg.server.host, cfg.server.port);
    tracing::info!("Listening on {bind_addr}");
    tracing::info!("Public URL: {}", cfg.server.public_url);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind to {bind_addr}: {e}");
            std::process::exit(1);
        });

    axum::serve(listener, app).await.unwrap_or_else(|e| {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    });
}
