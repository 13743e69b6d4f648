use std::sync::Arc;

use clap::Parser;
use tracing::info;

mod app;
mod http;
mod ws;

#[derive(Parser)]
#[command(name = "senseboard-gateway", about = "SenseBoard room coordinator")]
struct Args {
    /// Path to senseboard.toml (default: ./senseboard.toml, then
    /// ~/.senseboard/senseboard.toml).
    #[arg(long)]
    config: Option<String>,
    /// Override server.port from the command line.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match senseboard_core::config::SenseConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            // Unrecoverable config parse is fatal by design.
            eprintln!("fatal: {e}");
            std::process::exit(1);
        }
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{},tower_http=warn", config.logging.level).into()
            }),
        )
        .init();

    let state = Arc::new(app::AppState::new(config)?);
    let router = app::build_router(Arc::clone(&state));

    let listener = bind_with_scan(&state.config.server).await?;
    info!(
        addr = %listener.local_addr()?,
        instance = %state.instance_id,
        "SenseBoard gateway listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}

/// Bind the preferred port, walking forward through the scan span when the
/// address is taken. Exhausting the span aborts startup.
async fn bind_with_scan(
    server: &senseboard_core::config::ServerConfig,
) -> anyhow::Result<tokio::net::TcpListener> {
    let span = server.port_scan_span.max(1);
    for offset in 0..span {
        let port = server.port.saturating_add(offset);
        let addr = format!("{}:{}", server.bind, port);
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => {
                if offset > 0 {
                    info!(port, preferred = server.port, "preferred port busy, fell forward");
                }
                return Ok(listener);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => continue,
            Err(e) => return Err(e.into()),
        }
    }
    anyhow::bail!(
        "no free port in {}..{} on {}",
        server.port,
        server.port + span - 1,
        server.bind
    )
}
