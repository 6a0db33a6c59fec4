use std::ops::Range;
use std::str::from_utf8;

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Errors produced while tokenizing an XML stream. All variants carry the
/// absolute byte offset at which the problem was detected.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed XML at byte {offset}")]
    Syntax {
        offset: usize,
        #[source]
        source: quick_xml::Error,
    },

    #[error("invalid UTF-8 in token starting at byte {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("end tag `{found}' does not match start tag `{expected}' at byte {offset}")]
    MismatchedEndTag {
        expected: String,
        found: String,
        offset: usize,
    },

    #[error("end tag `{found}' without matching start tag at byte {offset}")]
    UnexpectedEndTag { found: String, offset: usize },

    #[error("content outside the root element at byte {offset}")]
    TrailingContent { offset: usize },

    #[error("unexpected end of input at byte {offset}")]
    UnexpectedEof { offset: usize },
}

/// A non-blocking XML tokenizer. Input is pushed in with [`feed`] as it
/// arrives; [`next`] yields complete tokens and returns `None` when more
/// input is required. Once [`end_of_input`] has been called, `next` never
/// returns `None` again: it drains the remaining tokens and finishes with
/// [`Event::Eof`].
///
/// Every token comes with its absolute byte range in the input stream, the
/// end being one past the token's last byte. Ranges are contiguous and
/// monotonically increasing.
///
/// [`feed`]: AsyncXmlParser::feed
/// [`next`]: AsyncXmlParser::next
/// [`end_of_input`]: AsyncXmlParser::end_of_input
#[derive(Default)]
pub struct AsyncXmlParser {
    /// Fed but not yet tokenized bytes
    buf: Vec<u8>,

    /// Absolute position of `buf[0]` in the input stream
    offset: usize,

    /// Names of the currently open elements
    open: Vec<Vec<u8>>,

    /// Whether a root element has been seen
    seen_root: bool,

    /// Whether the root element has been closed
    root_closed: bool,

    /// Whether a leading byte order mark has been checked for
    bom_checked: bool,

    eof: bool,
}

impl AsyncXmlParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the given bytes available for tokenization. The bytes are copied
    /// into an internal buffer; the caller's buffer is not referenced after
    /// this method returns.
    pub fn feed(&mut self, bytes: &[u8]) {
        debug_assert!(!self.eof, "feed after end_of_input");
        self.buf.extend_from_slice(bytes);
    }

    /// Signal that no more input will be fed
    pub fn end_of_input(&mut self) {
        self.eof = true;
    }

    /// Release the parser
    pub fn close(self) {}

    /// Return the next token and its absolute byte range, or `None` if the
    /// fed bytes do not contain a complete token yet
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<(Event<'static>, Range<usize>)>, ParseError> {
        if !self.bom_checked {
            const BOM: &[u8] = b"\xef\xbb\xbf";
            if !self.eof && self.buf.len() < BOM.len() && BOM.starts_with(&self.buf) {
                return Ok(None);
            }
            if self.buf.starts_with(BOM) {
                self.buf.drain(..BOM.len());
                self.offset += BOM.len();
            }
            self.bom_checked = true;
        }

        let len = match complete_token_len(&self.buf) {
            Some(len) => len,
            None if !self.eof => return Ok(None),
            None => {
                if self.buf.is_empty() {
                    if !self.open.is_empty() || !self.seen_root {
                        return Err(ParseError::UnexpectedEof {
                            offset: self.offset,
                        });
                    }
                    // the end of the document, reported idempotently
                    return Ok(Some((Event::Eof, self.offset..self.offset)));
                }
                if self.buf[0] == b'<' {
                    // a tag was started but never finished
                    return Err(ParseError::UnexpectedEof {
                        offset: self.offset + self.buf.len(),
                    });
                }
                // trailing character data with no tag after it
                self.buf.len()
            }
        };

        let start = self.offset;
        let end = start + len;

        let text = from_utf8(&self.buf[..len])
            .map_err(|_| ParseError::InvalidUtf8 { offset: start })?;
        let mut reader = Reader::from_str(text);
        // tag balance is checked below against the open-element stack, which
        // knows the absolute offsets this one-shot reader cannot know
        reader.check_end_names(false);
        let event = reader
            .read_event()
            .map_err(|source| ParseError::Syntax { offset: end, source })?
            .into_owned();

        match &event {
            Event::Start(s) => {
                if self.open.is_empty() {
                    if self.root_closed {
                        return Err(ParseError::TrailingContent { offset: start });
                    }
                    self.seen_root = true;
                }
                self.open.push(s.name().0.to_vec());
            }
            Event::Empty(_) => {
                if self.open.is_empty() {
                    if self.root_closed {
                        return Err(ParseError::TrailingContent { offset: start });
                    }
                    self.seen_root = true;
                    self.root_closed = true;
                }
            }
            Event::End(e) => {
                let found = String::from_utf8_lossy(e.name().0).into_owned();
                match self.open.pop() {
                    None => return Err(ParseError::UnexpectedEndTag { found, offset: end }),
                    Some(expected) if expected != e.name().0 => {
                        return Err(ParseError::MismatchedEndTag {
                            expected: String::from_utf8_lossy(&expected).into_owned(),
                            found,
                            offset: end,
                        });
                    }
                    Some(_) => {
                        if self.open.is_empty() {
                            self.root_closed = true;
                        }
                    }
                }
            }
            Event::Text(t) => {
                // prolog and epilog may contain whitespace only
                if self.open.is_empty()
                    && !t.iter().all(|&b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
                {
                    return Err(ParseError::TrailingContent { offset: start });
                }
            }
            Event::CData(_) => {
                if self.open.is_empty() {
                    return Err(ParseError::TrailingContent { offset: start });
                }
            }
            Event::DocType(_) => {
                if self.root_closed {
                    return Err(ParseError::TrailingContent { offset: start });
                }
            }
            _ => {}
        }

        self.buf.drain(..len);
        self.offset = end;

        Ok(Some((event, start..end)))
    }
}

/// Return the length of the first complete token in `buf`, or `None` if the
/// buffer does not contain one
fn complete_token_len(buf: &[u8]) -> Option<usize> {
    match buf.first()? {
        b'<' => match buf.get(1)? {
            b'?' => find(buf, 2, b"?>").map(|i| i + 2),
            b'!' => match buf.get(2)? {
                b'-' => match buf.get(3)? {
                    b'-' => find(buf, 4, b"-->").map(|i| i + 3),
                    // not a comment after all, delimit at `>' and let the
                    // classifier reject it
                    _ => scan_tag(buf),
                },
                b'[' => {
                    const CDATA: &[u8] = b"<![CDATA[";
                    if buf.len() < CDATA.len() {
                        if CDATA.starts_with(buf) {
                            None
                        } else {
                            scan_tag(buf)
                        }
                    } else if buf.starts_with(CDATA) {
                        find(buf, CDATA.len(), b"]]>").map(|i| i + 3)
                    } else {
                        scan_tag(buf)
                    }
                }
                _ => scan_doctype(buf),
            },
            _ => scan_tag(buf),
        },
        // character data reaches up to the next tag
        _ => buf.iter().position(|&b| b == b'<'),
    }
}

/// Find `needle` in `haystack` starting at `from`
fn find(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

/// Scan for the `>' that ends a tag, skipping quoted attribute values
fn scan_tag(buf: &[u8]) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, &b) in buf.iter().enumerate().skip(1) {
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'>' => return Some(i + 1),
                _ => {}
            },
        }
    }
    None
}

/// Scan for the `>' that ends a DOCTYPE declaration. An internal subset may
/// contain further `>' characters, so square brackets are counted.
fn scan_doctype(buf: &[u8]) -> Option<usize> {
    let mut quote: Option<u8> = None;
    let mut depth = 0usize;
    for (i, &b) in buf.iter().enumerate().skip(2) {
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'[' => depth += 1,
                b']' => depth = depth.saturating_sub(1),
                b'>' if depth == 0 => return Some(i + 1),
                _ => {}
            },
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::ops::Range;

    use quick_xml::events::Event;

    use super::{AsyncXmlParser, ParseError};

    /// Feed `xml` to a parser in pieces of `feed_size` bytes and collect all
    /// tokens up to (but not including) [`Event::Eof`]
    fn collect(
        xml: &str,
        feed_size: usize,
    ) -> Result<Vec<(Event<'static>, Range<usize>)>, ParseError> {
        let mut parser = AsyncXmlParser::new();
        let mut events = Vec::new();
        for piece in xml.as_bytes().chunks(feed_size) {
            parser.feed(piece);
            while let Some((e, span)) = parser.next()? {
                assert_ne!(e, Event::Eof);
                events.push((e, span));
            }
        }
        parser.end_of_input();
        loop {
            let (e, span) = parser
                .next()?
                .expect("no token may be incomplete after end of input");
            if e == Event::Eof {
                break;
            }
            events.push((e, span));
        }
        Ok(events)
    }

    /// The concatenation of all token spans must reproduce the input
    fn assert_spans_cover(xml: &str, events: &[(Event<'static>, Range<usize>)]) {
        let mut pos = 0;
        for (_, span) in events {
            assert_eq!(span.start, pos, "gap before token at byte {}", span.start);
            pos = span.end;
        }
        assert_eq!(pos, xml.len());
    }

    #[test]
    fn single_feed() {
        let xml = r#"<?xml version="1.0"?><root><a>x</a><b/></root>"#;
        let events = collect(xml, xml.len()).unwrap();

        assert!(matches!(events[0].0, Event::Decl(_)));
        assert!(matches!(events[1].0, Event::Start(_)));
        assert!(matches!(events[2].0, Event::Start(_)));
        assert!(matches!(events[3].0, Event::Text(_)));
        assert!(matches!(events[4].0, Event::End(_)));
        assert!(matches!(events[5].0, Event::Empty(_)));
        assert!(matches!(events[6].0, Event::End(_)));
        assert_eq!(events.len(), 7);

        assert_spans_cover(xml, &events);
        assert_eq!(&xml[events[2].1.clone()], "<a>");
        assert_eq!(&xml[events[5].1.clone()], "<b/>");
    }

    /// Feeding byte by byte must produce exactly the same tokens as feeding
    /// the whole document at once
    #[test]
    fn byte_by_byte() {
        let xml = "<?xml version=\"1.0\"?>\n<!DOCTYPE r [<!ENTITY e \"v\">]>\n\
            <r a=\"x&gt;y\"><!-- c --><![CDATA[<raw>]]><p:q/>t</r>\n";
        let whole = collect(xml, xml.len()).unwrap();
        let pieces = collect(xml, 1).unwrap();
        assert_eq!(whole, pieces);
        assert_spans_cover(xml, &pieces);
    }

    /// `next` must report an incomplete token until the closing delimiter
    /// has been fed
    #[test]
    fn incomplete_until_delimiter() {
        let mut parser = AsyncXmlParser::new();
        parser.feed(b"<roo");
        assert!(parser.next().unwrap().is_none());
        parser.feed(b"t at");
        assert!(parser.next().unwrap().is_none());
        parser.feed(b"tr=\"a>b\"");
        // the `>' inside the attribute value does not end the tag
        assert!(parser.next().unwrap().is_none());
        parser.feed(b">");
        let (e, span) = parser.next().unwrap().unwrap();
        assert!(matches!(e, Event::Start(_)));
        assert_eq!(span, 0..17);
    }

    #[test]
    fn mismatched_end_tag() {
        let xml = "<r><a></b></r>";
        let err = collect(xml, xml.len()).unwrap_err();
        match err {
            ParseError::MismatchedEndTag {
                expected,
                found,
                offset,
            } => {
                assert_eq!(expected, "a");
                assert_eq!(found, "b");
                assert_eq!(offset, 10);
            }
            other => panic!("expected MismatchedEndTag, got {other:?}"),
        }
    }

    #[test]
    fn end_tag_without_start() {
        let err = collect("</a>", 4).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEndTag { .. }));
    }

    #[test]
    fn truncated_document() {
        let err = collect("<r><a>", 6).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof { .. }));
    }

    #[test]
    fn content_after_root() {
        let err = collect("<r/><x/>", 8).unwrap_err();
        assert!(matches!(err, ParseError::TrailingContent { offset: 4 }));
    }

    /// Character data after the root element is rejected, whether or not a
    /// tag follows it
    #[test]
    fn text_after_root() {
        let err = collect("<r/> x", 6).unwrap_err();
        assert!(matches!(err, ParseError::TrailingContent { offset: 4 }));

        let err = collect("<r/> x", 1).unwrap_err();
        assert!(matches!(err, ParseError::TrailingContent { offset: 4 }));
    }

    /// The prolog may contain whitespace, comments and processing
    /// instructions, but no character data
    #[test]
    fn text_before_root() {
        let err = collect("x<r/>", 5).unwrap_err();
        assert!(matches!(err, ParseError::TrailingContent { offset: 0 }));
    }

    #[test]
    fn cdata_in_epilog() {
        let err = collect("<r/><![CDATA[x]]>", 17).unwrap_err();
        assert!(matches!(err, ParseError::TrailingContent { offset: 4 }));
    }

    #[test]
    fn doctype_in_epilog() {
        let err = collect("<r/><!DOCTYPE r>", 16).unwrap_err();
        assert!(matches!(err, ParseError::TrailingContent { offset: 4 }));
    }

    #[test]
    fn empty_input() {
        let err = collect("", 1).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof { offset: 0 }));
    }

    /// A leading byte order mark is consumed without producing a token
    #[test]
    fn byte_order_mark() {
        let mut parser = AsyncXmlParser::new();
        parser.feed(b"\xef");
        assert!(parser.next().unwrap().is_none());
        parser.feed(b"\xbb\xbf<a/>");
        let (e, span) = parser.next().unwrap().unwrap();
        assert!(matches!(e, Event::Empty(_)));
        assert_eq!(span, 3..7);
    }

    /// The end of the document is reported idempotently
    #[test]
    fn eof_is_idempotent() {
        let mut parser = AsyncXmlParser::new();
        parser.feed(b"<a/>");
        parser.next().unwrap().unwrap();
        parser.end_of_input();
        for _ in 0..2 {
            let (e, _) = parser.next().unwrap().unwrap();
            assert_eq!(e, Event::Eof);
        }
    }
}
