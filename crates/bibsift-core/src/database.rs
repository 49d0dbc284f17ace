//! Entry stores and the priority-ordered database set
//!
//! Each database file becomes an [`EntryStore`]. A [`DatabaseSet`] keeps the
//! stores independent and answers lookups by asking them in priority order;
//! the first store that defines a key wins outright, nothing is merged field
//! by field.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use bibsift_bibtex::{parse, BibTeXEntry, BibTeXParseResult, BibTeXString};
use rayon::prelude::*;

use crate::error::{Result, SiftError};

/// Anything entries can be looked up in by citekey
pub trait EntryLookup {
    /// The entry for a citekey, or `None` if it is not defined
    fn lookup(&self, key: &str) -> Option<&BibTeXEntry>;
}

/// The entries of one database, in source order, with unique keys
#[derive(Debug, Clone)]
pub struct EntryStore {
    path: PathBuf,
    entries: Vec<BibTeXEntry>,
    index: HashMap<String, usize>,
    strings: Vec<BibTeXString>,
    preambles: Vec<String>,
}

impl EntryStore {
    /// Read and tokenize a database file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|err| SiftError::io(path, err))?;
        let store = Self::parse(path, &text)?;
        tracing::debug!(
            "Loaded {} entries from {}",
            store.entries.len(),
            path.display()
        );
        Ok(store)
    }

    /// Tokenize database text; `path` names the source in errors.
    ///
    /// Any entry the tokenizer cannot structure makes the whole database
    /// unusable.
    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        let result = parse(text).map_err(|err| SiftError::MalformedEntry {
            path: path.to_path_buf(),
            line: 0,
            message: err.to_string(),
        })?;
        if let Some(error) = result.errors.first() {
            return Err(SiftError::MalformedEntry {
                path: path.to_path_buf(),
                line: error.line,
                message: error.message.clone(),
            });
        }
        Ok(Self::from_parse_result(path, result))
    }

    /// Build a store from tokenizer output.
    ///
    /// A key defined twice in the same database keeps its first definition.
    pub fn from_parse_result(path: &Path, result: BibTeXParseResult) -> Self {
        let mut entries = Vec::with_capacity(result.entries.len());
        let mut index = HashMap::with_capacity(result.entries.len());

        for entry in result.entries {
            if index.contains_key(&entry.cite_key) {
                tracing::warn!(
                    "Duplicate citekey '{}' in {}, keeping the first definition",
                    entry.cite_key,
                    path.display()
                );
                continue;
            }
            index.insert(entry.cite_key.clone(), entries.len());
            entries.push(entry);
        }

        Self {
            path: path.to_path_buf(),
            entries,
            index,
            strings: result.strings,
            preambles: result.preambles,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&BibTeXEntry> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn entries(&self) -> &[BibTeXEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A `@string` definition by name (case-insensitive, last one wins)
    pub fn string(&self, name: &str) -> Option<&BibTeXString> {
        self.strings
            .iter()
            .rev()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Verbatim `@preamble` blocks
    pub fn preambles(&self) -> &[String] {
        &self.preambles
    }
}

impl EntryLookup for EntryStore {
    fn lookup(&self, key: &str) -> Option<&BibTeXEntry> {
        self.get(key)
    }
}

/// Entry stores in priority order: index 0 wins on key collisions
#[derive(Debug, Clone, Default)]
pub struct DatabaseSet {
    stores: Vec<EntryStore>,
}

impl DatabaseSet {
    pub fn new(stores: Vec<EntryStore>) -> Self {
        Self { stores }
    }

    /// Load every database, highest priority first.
    ///
    /// Files are read in parallel, but the set only exists once all of them
    /// have loaded; the first failure (in priority order) is returned.
    pub fn load<P>(paths: &[P]) -> Result<Self>
    where
        P: AsRef<Path> + Sync,
    {
        let stores = paths
            .par_iter()
            .map(|path| EntryStore::load(path.as_ref()))
            .collect::<Vec<_>>()
            .into_iter()
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(stores))
    }

    pub fn stores(&self) -> &[EntryStore] {
        &self.stores
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Index of the store that answers for a key
    pub fn source_of(&self, key: &str) -> Option<usize> {
        self.stores.iter().position(|store| store.contains(key))
    }

    /// The first `@string` definition of a macro in priority order
    pub fn string(&self, name: &str) -> Option<&BibTeXString> {
        self.string_for(None, name).map(|(_, definition)| definition)
    }

    /// A macro definition, looked up in `preferred` first and then in
    /// priority order, with the index of the store that defined it
    pub fn string_for(
        &self,
        preferred: Option<usize>,
        name: &str,
    ) -> Option<(usize, &BibTeXString)> {
        preferred
            .and_then(|i| self.stores.get(i).map(|store| (i, store)))
            .into_iter()
            .chain(self.stores.iter().enumerate())
            .find_map(|(i, store)| store.string(name).map(|definition| (i, definition)))
    }
}

impl EntryLookup for DatabaseSet {
    fn lookup(&self, key: &str) -> Option<&BibTeXEntry> {
        self.stores.iter().find_map(|store| store.get(key))
    }
}
