use std::ops::Range;
use std::str::from_utf8;

use anyhow::{Context, Result};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::PrefixDeclaration;

use crate::input::{Splitter, SplitterResult};
use crate::util::window::Window;

const DEFAULT_DECLARATION: &str = r#"<?xml version="1.0"?>"#;

/// An XML namespace prefix declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prefix {
    Default,
    Named(String),
}

/// Splits incoming XML tokens whenever an element in the first level (i.e. a
/// child of the XML document's root node) is closed. Every chunk is a
/// standalone XML document: the source's declaration, a synthetic copy of
/// the root start tag carrying all namespace bindings in scope, the
/// first-level element copied verbatim from the window, and a closing root
/// tag.
///
/// The splitter also moves the window forward past everything that can no
/// longer end up in a chunk, so the retained bytes are bounded by the size
/// of a single chunk.
#[derive(Default)]
pub struct FirstLevelSplitter {
    /// The current depth in the XML DOM
    depth: usize,

    /// The byte position of the current chunk's opening tag. [`None`] if no
    /// first-level element is open.
    mark: Option<usize>,

    /// The document's XML declaration, verbatim. [`None`] if the document
    /// has none.
    declaration: Option<String>,

    /// The qualified name of the document's root element. [`None`] if the
    /// root has not been found yet.
    root_name: Option<String>,

    /// Namespace bindings, one frame per open element, root first
    namespaces: Vec<Vec<(Prefix, String)>>,
}

/// Extract the namespace bindings declared on a start tag
fn bindings_of(tag: &BytesStart) -> Result<Vec<(Prefix, String)>> {
    let mut bindings = Vec::new();
    for attr in tag.attributes() {
        let attr = attr?;
        if let Some(decl) = attr.key.as_namespace_binding() {
            let prefix = match decl {
                PrefixDeclaration::Default => Prefix::Default,
                PrefixDeclaration::Named(b"") => Prefix::Default,
                PrefixDeclaration::Named(n) => Prefix::Named(from_utf8(n)?.to_string()),
            };
            bindings.push((prefix, attr.unescape_value()?.into_owned()));
        }
    }
    Ok(bindings)
}

impl FirstLevelSplitter {
    /// All bindings currently in scope, frames applied root-down so that a
    /// binding on a deeper element overrides an ancestor's binding for the
    /// same prefix
    fn bindings_in_scope(&self) -> Vec<(&Prefix, &str)> {
        let mut scope: Vec<(&Prefix, &str)> = Vec::new();
        for frame in &self.namespaces {
            for (prefix, uri) in frame {
                if let Some(bound) = scope.iter_mut().find(|(p, _)| p == &prefix) {
                    bound.1 = uri.as_str();
                } else {
                    scope.push((prefix, uri.as_str()));
                }
            }
        }
        scope
    }

    /// Cut the given byte range out of the window and wrap it up as a
    /// standalone document. Advances the window past the range.
    fn emit(&self, window: &mut Window, range: Range<usize>) -> Result<SplitterResult> {
        let root = self
            .root_name
            .as_deref()
            .context("chunk emitted before the root element")?;
        let body = window.text(range.clone())?;

        let mut chunk = String::with_capacity(body.len() + 2 * root.len() + 64);
        chunk.push_str(self.declaration.as_deref().unwrap_or(DEFAULT_DECLARATION));
        chunk.push('\n');
        chunk.push('<');
        chunk.push_str(root);
        for (prefix, uri) in self.bindings_in_scope() {
            match prefix {
                Prefix::Default => chunk.push_str(&format!(r#" xmlns="{}""#, escape(uri))),
                Prefix::Named(p) => chunk.push_str(&format!(r#" xmlns:{}="{}""#, p, escape(uri))),
            }
        }
        chunk.push_str(">\n");
        chunk.push_str(&body);
        chunk.push_str("\n</");
        chunk.push_str(root);
        chunk.push_str(">\n");

        window.advance_to(range.end)?;

        Ok(SplitterResult { chunk })
    }
}

impl<'a> Splitter<Event<'a>> for FirstLevelSplitter {
    fn on_event(
        &mut self,
        e: &Event,
        pos: Range<usize>,
        window: &mut Window,
    ) -> Result<Option<SplitterResult>> {
        let mut result = None;

        match e {
            Event::Decl(_) if self.depth == 0 => {
                self.declaration = Some(window.text(pos.clone())?);
                window.advance_to(pos.end)?;
            }

            Event::Start(s) => {
                self.namespaces.push(bindings_of(s)?);
                match self.depth {
                    0 => {
                        // save the root element and drop its bytes, the
                        // wrapper is synthesized at emission time
                        self.root_name = Some(from_utf8(s.name().0)?.to_string());
                        window.advance_to(pos.end)?;
                    }
                    1 => self.mark = Some(pos.start),
                    _ => {}
                }
                self.depth += 1;
            }

            Event::Empty(s) => match self.depth {
                0 => {
                    // a childless root, no chunks will be emitted
                    self.root_name = Some(from_utf8(s.name().0)?.to_string());
                    window.advance_to(pos.end)?;
                }
                1 => result = Some(self.emit(window, pos)?),
                _ => {}
            },

            Event::End(_) => {
                self.depth -= 1;
                self.namespaces.pop();
                if self.depth == 1 {
                    let mark = self
                        .mark
                        .take()
                        .context("closing a first-level element that was never opened")?;
                    result = Some(self.emit(window, mark..pos.end)?);
                } else if self.depth == 0 {
                    window.advance_to(pos.end)?;
                }
            }

            // prolog, epilog, and filler between first-level elements take
            // no part in any chunk
            _ if self.depth <= 1 => window.advance_to(pos.end)?,

            _ => {}
        }

        Ok(result)
    }
}
