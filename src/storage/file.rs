use std::io;
use std::path::PathBuf;

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use ulid::Ulid;

use super::{ChunkReadStream, Store, StoreError};

/// An implementation of the [`Store`] trait that keeps every chunk in its
/// own file below a base directory, named by the chunk's ID
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Creates a new file store at the given location. The directory is
    /// created if it does not exist.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }
}

/// Chunk names are ULIDs. Everything else never names a stored chunk and,
/// more importantly, must not escape the store directory.
fn validate_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

impl Store for FileStore {
    async fn add(&self, id: Ulid, chunk: String) -> Result<(), StoreError> {
        let path = self.dir.join(id.to_string());
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)
            .await?;
        file.write_all(chunk.as_bytes()).await?;
        file.flush().await?;
        debug!("added chunk `{id}' ({} bytes)", chunk.len());
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<ChunkReadStream, StoreError> {
        validate_name(name)?;
        let file = match fs::File::open(self.dir.join(name)).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let size = file.metadata().await?.len();
        Ok(ChunkReadStream::new(size, file))
    }
}
