//! Field filtering and output
//!
//! Entries are written from their verbatim source text with dropped fields
//! cut out whole. [`emit_self_contained`] additionally carries the `@string`
//! macros and `@preamble` blocks the emitted entries depend on.

use std::collections::HashSet;

use bibsift_bibtex::{format_entry_filtered, BibTeXField, BibTeXString};

use crate::database::DatabaseSet;
use crate::resolver::ResolvedSet;

/// Field names to leave out of the output, matched case-insensitively
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldFilter {
    dropped: HashSet<String>,
}

impl FieldFilter {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            dropped: names
                .into_iter()
                .map(|name| name.as_ref().trim().to_lowercase())
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }

    /// Whether a field survives the filter
    pub fn keeps(&self, field: &BibTeXField) -> bool {
        !self.drops(&field.key)
    }

    pub fn drops(&self, name: &str) -> bool {
        self.dropped.contains(&name.to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.dropped.is_empty()
    }
}

/// Serialize the resolved entries, leaving out filtered fields
pub fn emit(resolved: &ResolvedSet<'_>, filter: &FieldFilter) -> String {
    join_blocks(entry_blocks(resolved, filter))
}

/// Like [`emit`], preceded by the macros and preambles the entries need.
///
/// `@string` definitions referenced by retained fields are included together
/// with the definitions they reference in turn, dependencies first. Preambles
/// come from every database that contributed an entry, each text once.
pub fn emit_self_contained(
    resolved: &ResolvedSet<'_>,
    databases: &DatabaseSet,
    filter: &FieldFilter,
) -> String {
    if resolved.is_empty() {
        return String::new();
    }

    let mut blocks = preamble_blocks(resolved, databases);
    blocks.extend(
        string_definitions(resolved, databases, filter)
            .into_iter()
            .map(|definition| definition.raw_bibtex.clone()),
    );
    blocks.extend(entry_blocks(resolved, filter));
    join_blocks(blocks)
}

fn entry_blocks(resolved: &ResolvedSet<'_>, filter: &FieldFilter) -> Vec<String> {
    resolved
        .iter()
        .map(|entry| format_entry_filtered(entry, |field| filter.keeps(field)))
        .collect()
}

fn join_blocks(blocks: Vec<String>) -> String {
    if blocks.is_empty() {
        return String::new();
    }
    let mut output = blocks.join("\n\n");
    output.push('\n');
    output
}

fn preamble_blocks(resolved: &ResolvedSet<'_>, databases: &DatabaseSet) -> Vec<String> {
    let contributing: HashSet<usize> = resolved
        .iter()
        .filter_map(|entry| databases.source_of(&entry.cite_key))
        .collect();

    let mut seen = HashSet::new();
    let mut blocks = Vec::new();
    for (i, store) in databases.stores().iter().enumerate() {
        if !contributing.contains(&i) {
            continue;
        }
        for preamble in store.preambles() {
            if seen.insert(preamble.as_str()) {
                blocks.push(preamble.clone());
            }
        }
    }
    blocks
}

/// Macro definitions needed by the retained fields, dependencies first.
///
/// A macro is taken from the database that supplied the entry using it when
/// that database defines it. Only one definition per name can be written;
/// the first one needed wins.
fn string_definitions<'d>(
    resolved: &ResolvedSet<'_>,
    databases: &'d DatabaseSet,
    filter: &FieldFilter,
) -> Vec<&'d BibTeXString> {
    let mut visited = HashSet::new();
    let mut ordered = Vec::new();

    for entry in resolved.iter() {
        let source = databases.source_of(&entry.cite_key);
        for field in entry.fields.iter().filter(|f| filter.keeps(f)) {
            for name in &field.macros {
                collect_definition(name, source, databases, &mut visited, &mut ordered);
            }
        }
    }

    ordered
}

fn collect_definition<'d>(
    name: &str,
    preferred: Option<usize>,
    databases: &'d DatabaseSet,
    visited: &mut HashSet<String>,
    ordered: &mut Vec<&'d BibTeXString>,
) {
    if !visited.insert(name.to_lowercase()) {
        return;
    }
    // Month names and other macros no database defines are left to BibTeX
    let Some((store, definition)) = databases.string_for(preferred, name) else {
        return;
    };
    for dependency in &definition.macros {
        collect_definition(dependency, Some(store), databases, visited, ordered);
    }
    ordered.push(definition);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::EntryStore;
    use crate::resolver::resolve;
    use crate::scanner::RequestedKeySet;
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

    fn output(dbs: &DatabaseSet, keys: &[&str], drop: &[&str]) -> String {
        let requested: RequestedKeySet = keys.iter().copied().collect();
        let resolution = resolve(&requested, dbs);
        emit_self_contained(&resolution.resolved, dbs, &FieldFilter::new(drop))
    }

    #[test]
    fn test_filter_is_case_insensitive() {
        let filter = FieldFilter::new(["Abstract", " file "]);
        assert!(filter.drops("abstract"));
        assert!(filter.drops("ABSTRACT"));
        assert!(filter.drops("File"));
        assert!(!filter.drops("title"));
        assert!(FieldFilter::new(Vec::<String>::new()).is_empty());
    }

    #[test]
    fn test_emit_drops_whole_field_lines() {
        let dbs = databases(&[
            "@article{A,\n  title = {T},\n  ABSTRACT = {long},\n  year = 2001\n}",
        ]);
        assert_eq!(
            output(&dbs, &["A"], &["abstract"]),
            "@article{A,\n  title = {T},\n  year = 2001\n}\n"
        );
    }

    #[test]
    fn test_emit_without_filter_is_verbatim() {
        let source = "@Book{ B ,\n\tTitle=\"x\" ,  Year = {1999},\n}";
        let dbs = databases(&[source]);
        assert_eq!(output(&dbs, &["B"], &[]), format!("{source}\n"));
    }

    #[test]
    fn test_nothing_resolved_gives_empty_output() {
        let dbs = databases(&["@preamble{\"x\"}\n@misc{Unused}"]);
        assert_eq!(output(&dbs, &["Missing"], &[]), "");
        assert_eq!(output(&dbs, &[], &[]), "");
    }

    #[test]
    fn test_entries_are_separated_by_blank_lines() {
        let dbs = databases(&["@misc{A}\n@misc{B}"]);
        let requested: RequestedKeySet = ["B", "A"].into_iter().collect();
        let resolution = resolve(&requested, &dbs);
        assert_eq!(
            emit(&resolution.resolved, &FieldFilter::default()),
            "@misc{B}\n\n@misc{A}\n"
        );
    }

    #[test]
    fn test_referenced_strings_are_carried_with_dependencies() {
        let dbs = databases(&[
            "@string{pub = {Big}}\n@string{full = pub # { Press}}\n@string{unused = {U}}\n@book{K, publisher = full, month = jan}",
        ]);
        assert_eq!(
            output(&dbs, &["K"], &[]),
            "@string{pub = {Big}}\n\n@string{full = pub # { Press}}\n\n@book{K, publisher = full, month = jan}\n"
        );
    }

    #[test]
    fn test_strings_of_dropped_fields_are_not_carried() {
        let dbs = databases(&["@string{n = {Note}}\n@misc{K, note = n, title = {T}}"]);
        assert_eq!(output(&dbs, &["K"], &["note"]), "@misc{K, title = {T}}\n");
    }

    #[test]
    fn test_string_comes_from_the_entry_database() {
        let dbs = databases(&[
            "@string{hup = {Harvard University Press}}\n@misc{A}",
            "@string{hup = {Harvard UP}}\n@book{B, publisher = hup}",
        ]);
        assert_eq!(
            output(&dbs, &["B"], &[]),
            "@string{hup = {Harvard UP}}\n\n@book{B, publisher = hup}\n"
        );
    }

    #[test]
    fn test_preambles_of_contributing_databases_only() {
        let dbs = databases(&[
            "@preamble{\"\\newcommand{\\one}{1}\"}\n@misc{A}",
            "@preamble{\"\\newcommand{\\two}{2}\"}\n@misc{B}",
            "@preamble{\"\\newcommand{\\one}{1}\"}\n@misc{C}",
        ]);
        assert_eq!(
            output(&dbs, &["A", "C"], &[]),
            "@preamble{\"\\newcommand{\\one}{1}\"}\n\n@misc{A}\n\n@misc{C}\n"
        );
    }
}
