//! Crossref resolution
//!
//! Expands the requested keys into every entry a self-contained database
//! needs: each requested entry, immediately followed by the chain of entries
//! it cross-references. Entries are looked up by key, never linked, and a
//! visited set keeps every key to a single slot, which also ends cycles.

use std::collections::HashSet;
use std::fmt;

use bibsift_bibtex::BibTeXEntry;

use crate::database::EntryLookup;
use crate::scanner::RequestedKeySet;

/// A key that no database defines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedCitation {
    pub key: String,
    /// The entry whose crossref named this key, if it was not cited directly
    pub referenced_by: Option<String>,
}

impl fmt::Display for UnresolvedCitation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.referenced_by {
            Some(parent) => write!(f, "'{}' (crossref from '{}')", self.key, parent),
            None => write!(f, "'{}'", self.key),
        }
    }
}

/// Entries to emit, in deterministic order, each exactly once
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedSet<'a> {
    entries: Vec<&'a BibTeXEntry>,
}

impl<'a> ResolvedSet<'a> {
    pub fn iter(&self) -> impl Iterator<Item = &'a BibTeXEntry> + '_ {
        self.entries.iter().copied()
    }

    pub fn keys(&self) -> Vec<&'a str> {
        self.entries.iter().map(|e| e.cite_key.as_str()).collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.cite_key == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of resolving a key set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution<'a> {
    pub resolved: ResolvedSet<'a>,
    pub unresolved: Vec<UnresolvedCitation>,
}

impl Resolution<'_> {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Resolve every requested key and its crossref chain.
///
/// Missing keys are recorded and skipped; they never stop resolution of the
/// remaining keys.
pub fn resolve<'a, L>(requested: &RequestedKeySet, lookup: &'a L) -> Resolution<'a>
where
    L: EntryLookup + ?Sized,
{
    let mut resolution = Resolution::default();
    let mut visited: HashSet<String> = HashSet::new();

    for key in requested.iter() {
        let mut next = Some((key.to_string(), None::<String>));

        while let Some((key, referenced_by)) = next.take() {
            if !visited.insert(key.clone()) {
                break;
            }

            match lookup.lookup(&key) {
                Some(entry) => {
                    resolution.resolved.entries.push(entry);
                    next = entry
                        .crossref()
                        .map(|target| (target.to_string(), Some(entry.cite_key.clone())));
                }
                None => {
                    tracing::warn!("Citekey '{}' was not found in any database", key);
                    resolution
                        .unresolved
                        .push(UnresolvedCitation { key, referenced_by });
                }
            }
        }
    }

    resolution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DatabaseSet, EntryStore};
    use std::path::Path;

    fn databases(texts: &[&str]) -> DatabaseSet {
        DatabaseSet::new(
            texts
                .iter()
                .enumerate()
                .map(|(i, text)| {
                    EntryStore::parse(Path::new(&format!("db{i}.bib")), text).unwrap()
                })
                .collect(),
        )
    }

    fn requested(keys: &[&str]) -> RequestedKeySet {
        keys.iter().copied().collect()
    }

    #[test]
    fn test_crossref_follows_citing_entry() {
        let dbs = databases(&[
            "@book{Jones2019}\n@incollection{Smith2020, crossref = {Jones2019}}",
        ]);
        let resolution = resolve(&requested(&["Smith2020"]), &dbs);
        assert_eq!(resolution.resolved.keys(), vec!["Smith2020", "Jones2019"]);
        assert!(resolution.is_complete());
    }

    #[test]
    fn test_missing_key_does_not_abort() {
        let dbs = databases(&["@misc{A}\n@misc{C}"]);
        let resolution = resolve(&requested(&["A", "B", "C"]), &dbs);
        assert_eq!(resolution.resolved.keys(), vec!["A", "C"]);
        assert_eq!(
            resolution.unresolved,
            vec![UnresolvedCitation {
                key: "B".to_string(),
                referenced_by: None
            }]
        );
    }

    #[test]
    fn test_missing_crossref_target_is_reported() {
        let dbs = databases(&["@inbook{Part, crossref = {Ghost}}"]);
        let resolution = resolve(&requested(&["Part"]), &dbs);
        assert_eq!(resolution.resolved.keys(), vec!["Part"]);
        assert_eq!(resolution.unresolved[0].key, "Ghost");
        assert_eq!(resolution.unresolved[0].referenced_by.as_deref(), Some("Part"));
        assert_eq!(
            resolution.unresolved[0].to_string(),
            "'Ghost' (crossref from 'Part')"
        );
    }

    #[test]
    fn test_crossref_cycle_terminates() {
        let dbs = databases(&["@misc{A, crossref = {B}}\n@misc{B, crossref = {A}}"]);
        let resolution = resolve(&requested(&["A"]), &dbs);
        assert_eq!(resolution.resolved.keys(), vec!["A", "B"]);
        assert!(resolution.is_complete());
    }

    #[test]
    fn test_self_crossref_terminates() {
        let dbs = databases(&["@misc{A, crossref = {A}}"]);
        let resolution = resolve(&requested(&["A"]), &dbs);
        assert_eq!(resolution.resolved.keys(), vec!["A"]);
    }

    #[test]
    fn test_crossref_target_also_cited_occupies_one_slot() {
        let dbs = databases(&[
            "@book{Whole}\n@inbook{Part1, crossref={Whole}}\n@inbook{Part2, crossref={Whole}}",
        ]);
        let resolution = resolve(&requested(&["Part1", "Whole", "Part2"]), &dbs);
        assert_eq!(resolution.resolved.keys(), vec!["Part1", "Whole", "Part2"]);
    }

    #[test]
    fn test_chains_are_depth_first() {
        let dbs = databases(&[
            "@misc{A, crossref={A1}}\n@misc{A1, crossref={A2}}\n@misc{A2}\n@misc{B, crossref={B1}}\n@misc{B1}",
        ]);
        let resolution = resolve(&requested(&["A", "B"]), &dbs);
        assert_eq!(resolution.resolved.keys(), vec!["A", "A1", "A2", "B", "B1"]);
    }

    #[test]
    fn test_crossref_uses_database_priority() {
        let dbs = databases(&[
            "@book{Whole, note = {primary}}",
            "@inbook{Part, crossref = {Whole}}\n@book{Whole, note = {secondary}}",
        ]);
        let resolution = resolve(&requested(&["Part"]), &dbs);
        let whole = resolution.resolved.iter().nth(1).unwrap();
        assert_eq!(whole.get_field("note"), Some("primary"));
    }

    #[test]
    fn test_unresolved_key_reported_once() {
        let dbs = databases(&["@misc{A, crossref={Ghost}}"]);
        let resolution = resolve(&requested(&["A", "Ghost"]), &dbs);
        assert_eq!(resolution.unresolved.len(), 1);
    }

    #[test]
    fn test_resolve_against_a_single_store() {
        let store = EntryStore::parse(Path::new("one.bib"), "@misc{Only}").unwrap();
        let resolution = resolve(&requested(&["Only"]), &store);
        assert!(resolution.resolved.contains("Only"));
    }
}
