use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::config::Config;
use crate::ingest::ingest;
use crate::storage::file::FileStore;

/// Import one or more XML files into a geoshard store
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// One or more files to import
    #[arg(name = "FILE", required = true)]
    files: Vec<String>,

    /// The path of the store to import into
    #[arg(long, short)]
    destination: Option<PathBuf>,
}

/// Run the `import` command
pub async fn run_import(args: ImportArgs) -> Result<()> {
    // detect file types before touching the store
    for path in &args.files {
        let mime = mime_guess::from_path(path);
        match mime.first() {
            Some(t)
                if t.subtype() == "xml"
                    || t.subtype() == "gml"
                    || t.suffix().is_some_and(|s| s == "xml") => {}
            Some(t) => bail!("Unsupported file type: `{path}' -> `{t}'"),
            None => bail!("Unable to detect file type: `{path}'"),
        }
    }

    let mut config = Config::load()?;
    if let Some(destination) = args.destination {
        config.store = destination;
    }
    let store = FileStore::new(&config.store).await?;

    for path in args.files {
        let file = File::open(&path).await?;
        let summary = ingest(ReaderStream::new(file), &store).await?;
        info!(
            "Imported `{path}': {} chunks, {} bytes",
            summary.chunks, summary.bytes
        );
    }

    Ok(())
}
