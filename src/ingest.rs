use bytes::Bytes;
use futures::{Stream, StreamExt};
use quick_xml::events::Event;
use thiserror::Error;
use tracing::{debug, info};
use ulid::Ulid;

use crate::input::xml::{AsyncXmlParser, FirstLevelSplitter, ParseError};
use crate::input::Splitter;
use crate::storage::{Store, StoreError};
use crate::util::window::Window;

/// Errors that can terminate an ingest
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed XML")]
    Parse(#[from] ParseError),

    #[error("unable to store chunk")]
    Store(#[from] StoreError),

    #[error("unable to read input")]
    Read(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IngestError {
    /// The most specific description of what went wrong, suitable for an
    /// error response
    pub fn cause(&self) -> String {
        match self {
            IngestError::Parse(e) => e.to_string(),
            IngestError::Store(e) => e.to_string(),
            IngestError::Read(e) => e.to_string(),
            IngestError::Internal(e) => format!("{e:#}"),
        }
    }
}

/// Outcome of a successful ingest
#[derive(Debug, Default)]
pub struct IngestSummary {
    /// Number of chunks added to the store
    pub chunks: usize,

    /// Total number of bytes read from the input
    pub bytes: usize,
}

/// Read an XML document from `body`, split it into standalone chunks at the
/// first nesting level and add every chunk to `store`.
///
/// The input is consumed strictly alternating with the parser: a piece of
/// the body is pulled, fed to the parser, and all tokens it completes are
/// drained before the next piece is pulled. While a chunk is being stored
/// the drain is suspended, so at most one store operation is in flight and
/// the retained input is bounded regardless of how fast the body arrives.
///
/// Dropping the returned future cancels the ingest; chunks that were
/// already acknowledged by the store remain stored.
pub async fn ingest<S, B, E>(mut body: B, store: &S) -> Result<IngestSummary, IngestError>
where
    S: Store,
    B: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let mut window = Window::default();
    let mut parser = AsyncXmlParser::new();
    let mut splitter = FirstLevelSplitter::default();
    let mut summary = IngestSummary::default();

    while let Some(buf) = body.next().await {
        let buf = buf.map_err(|e| IngestError::Read(e.into()))?;
        summary.bytes += buf.len();
        window.extend(&buf);
        parser.feed(&buf);
        drain(&mut parser, &mut splitter, &mut window, store, &mut summary).await?;
    }

    parser.end_of_input();
    drain(&mut parser, &mut splitter, &mut window, store, &mut summary).await?;
    parser.close();

    info!(
        chunks = summary.chunks,
        bytes = summary.bytes,
        "ingest complete"
    );
    Ok(summary)
}

/// Pull tokens from the parser until it runs out of input or the document
/// ends. Every chunk is stored before the next token is pulled.
async fn drain<S: Store>(
    parser: &mut AsyncXmlParser,
    splitter: &mut FirstLevelSplitter,
    window: &mut Window,
    store: &S,
    summary: &mut IngestSummary,
) -> Result<(), IngestError> {
    while let Some((event, pos)) = parser.next()? {
        if event == Event::Eof {
            break;
        }
        if let Some(r) = splitter.on_event(&event, pos, window)? {
            let id = Ulid::new();
            debug!("storing chunk `{id}' ({} bytes)", r.chunk.len());
            store.add(id, r.chunk).await?;
            summary.chunks += 1;
        }
    }
    Ok(())
}
