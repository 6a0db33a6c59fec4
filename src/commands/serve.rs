use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::http::router;
use crate::storage::file::FileStore;

/// Run the HTTP service
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// The port to listen on
    #[arg(long, short)]
    port: Option<u16>,

    /// The address to bind to
    #[arg(long)]
    host: Option<String>,

    /// The directory of the chunk store
    #[arg(long, short)]
    store: Option<PathBuf>,
}

/// Run the `serve` command
pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(store) = args.store {
        config.store = store;
    }

    info!("Launching geoshard ...");

    let store = Arc::new(FileStore::new(&config.store).await?);
    let app = router(store);

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("unable to bind to {}:{}", config.host, config.port))?;
    info!("Listening on {}:{}", config.host, config.port);
    axum::serve(listener, app).await?;

    Ok(())
}
