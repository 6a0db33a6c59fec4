mod async_parser;
mod first_level_splitter;

pub use async_parser::{AsyncXmlParser, ParseError};
pub use first_level_splitter::FirstLevelSplitter;
