//! Core library for bibsift
//!
//! Extracts from one or more BibTeX databases exactly the entries a LaTeX
//! manuscript cites, directly or through `crossref`, and writes them out
//! verbatim as a new self-contained database.
//!
//! # Architecture
//!
//! - **Scanner**: finds citekeys in the manuscript and its includes
//! - **Database**: entry stores consulted in priority order
//! - **Resolver**: expands cited keys with their crossref chains
//! - **Emitter**: drops configured fields and serializes the result
//! - **Pipeline**: runs the stages in order and writes the output file

pub mod config;
pub mod database;
pub mod emitter;
pub mod error;
pub mod pipeline;
pub mod resolver;
pub mod scanner;

pub use config::{split_list, SiftConfig};
pub use database::{DatabaseSet, EntryLookup, EntryStore};
pub use emitter::{emit, emit_self_contained, FieldFilter};
pub use error::{Result, SiftError};
pub use pipeline::{run, sift, Job, Report, Sifted};
pub use resolver::{resolve, Resolution, ResolvedSet, UnresolvedCitation};
pub use scanner::{
    find_citations, scan, scan_text, CitationOccurrence, CiteCommand, RequestedKeySet,
    DEFAULT_CITE_COMMANDS,
};

/// Re-export of the tokenizer types the public API hands out
pub use bibsift_bibtex::{BibTeXEntry, BibTeXEntryType, BibTeXField, BibTeXString};
