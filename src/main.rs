use clap::{Parser, Subcommand};
use geoshard::commands::import::{run_import, ImportArgs};
use geoshard::commands::serve::{run_serve, ServeArgs};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP service
    Serve(ServeArgs),

    /// Import one or more files into a store
    Import(ImportArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Import(args) => run_import(args).await,
    }
}
