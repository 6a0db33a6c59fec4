pub mod file;

use std::io;
use std::pin::Pin;

use thiserror::Error;
use tokio::io::AsyncRead;
use ulid::Ulid;

/// Errors produced by a chunk store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no chunk named `{0}'")]
    NotFound(String),

    #[error("invalid chunk name `{0}'")]
    InvalidName(String),

    #[error("transient store failure")]
    Transient(#[source] io::Error),

    #[error("permanent store failure")]
    Permanent(#[source] io::Error),
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => {
                StoreError::Transient(err)
            }
            _ => StoreError::Permanent(err),
        }
    }
}

/// A readable chunk together with its exact size in bytes
pub struct ChunkReadStream {
    size: u64,
    reader: Pin<Box<dyn AsyncRead + Send>>,
}

impl std::fmt::Debug for ChunkReadStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkReadStream")
            .field("size", &self.size)
            .finish()
    }
}

impl ChunkReadStream {
    pub fn new(size: u64, reader: impl AsyncRead + Send + 'static) -> Self {
        Self {
            size,
            reader: Box::pin(reader),
        }
    }

    /// The total number of bytes the reader will yield
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn into_reader(self) -> Pin<Box<dyn AsyncRead + Send>> {
        self.reader
    }
}

/// A store for chunks
pub trait Store {
    /// Add a chunk with the given ID to the store. When this method returns
    /// successfully the chunk can be retrieved with [`Store::get`].
    async fn add(&self, id: Ulid, chunk: String) -> Result<(), StoreError>;

    /// Retrieve a chunk by name
    async fn get(&self, name: &str) -> Result<ChunkReadStream, StoreError>;
}
