use std::ops::Range;

use anyhow::Result;

use crate::util::window::Window;

pub mod xml;

/// Result of the [`Splitter::on_event`] method: a self-contained chunk cut
/// from the input stream
#[derive(Debug)]
pub struct SplitterResult {
    /// The chunk text, a standalone XML document
    pub chunk: String,
}

/// Splits input tokens and returns chunks
pub trait Splitter<E> {
    /// Will be called on every stream event. `pos` is the event's absolute
    /// byte range in the input stream; `window` holds the retained input
    /// bytes. Returns a new [`SplitterResult`] or [`None`] if no chunk was
    /// produced.
    fn on_event(
        &mut self,
        event: &E,
        pos: Range<usize>,
        window: &mut Window,
    ) -> Result<Option<SplitterResult>>;
}
