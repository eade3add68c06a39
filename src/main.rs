use anyhow::Context;
use clap::Parser;
use docquest::{api, config, logging, processing::DocQuestService};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

/// DocQuest HTTP server.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Port to listen on. Overrides SERVER_PORT.
    #[arg(long)]
    port: Option<u16>,

    /// Environment file to load before reading configuration.
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init_tracing();
    if let Some(path) = &args.env_file {
        dotenvy::from_path(path)
            .with_context(|| format!("failed to load env file {}", path.display()))?;
    }
    let config = config::init_config().context("invalid configuration")?;

    let service = DocQuestService::from_config(config).context("failed to initialize service")?;
    let app = api::create_router(Arc::new(service), config.max_upload_bytes);

    let (listener, port) = bind_listener(args.port.or(config.server_port))
        .await
        .context("failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn bind_listener(port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 5000..=5099;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 5000-5099",
    ))
}
