//! BibTeX tokenizing and formatting
//!
//! The parser keeps the verbatim text of every entry together with the byte
//! segment each field occupies, so an entry can be written back out exactly
//! as it appeared in its source database with selected fields removed.
//!
//! Features:
//! - Nom-based parser for `@entry`, `@string`, `@preamble` and `@comment`
//! - Braced, quoted, numeric and macro field values with `#` concatenation
//! - Per-field raw segments for verbatim, field-filtered output
//! - Canonical formatting for entries built in memory

mod entry;
mod formatter;
pub mod parser;

pub use entry::{BibTeXEntry, BibTeXEntryType, BibTeXField, BibTeXString};
pub use formatter::{format_entries, format_entry, format_entry_filtered};
pub use parser::{parse, parse_entry, BibTeXParseError, BibTeXParseResult, ParseError};
