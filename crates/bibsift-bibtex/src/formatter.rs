//! BibTeX formatting module
//!
//! Entries parsed from a file are written back from their raw text, with the
//! segments of unwanted fields cut out. Entries built in memory have no raw
//! text and are rendered canonically instead.

use super::entry::{BibTeXEntry, BibTeXField};

/// Format a single BibTeX entry to string
pub fn format_entry(entry: &BibTeXEntry) -> String {
    format_entry_filtered(entry, |_| true)
}

/// Format an entry keeping only the fields for which `keep` returns true.
///
/// When the entry carries its source text, every retained byte is copied
/// verbatim from it; only whole field segments are removed.
pub fn format_entry_filtered<F>(entry: &BibTeXEntry, keep: F) -> String
where
    F: Fn(&BibTeXField) -> bool,
{
    match entry.raw_bibtex.as_deref() {
        Some(raw) if entry.has_source_spans() => cut_fields(raw, entry, &keep),
        _ => format_canonical(entry, &keep),
    }
}

/// Format multiple entries to a single BibTeX string
pub fn format_entries(entries: &[BibTeXEntry]) -> String {
    entries
        .iter()
        .map(format_entry)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn cut_fields<F>(raw: &str, entry: &BibTeXEntry, keep: &F) -> String
where
    F: Fn(&BibTeXField) -> bool,
{
    let mut result = String::with_capacity(raw.len());
    let mut cursor = 0;

    for field in &entry.fields {
        if keep(field) {
            continue;
        }
        if let Some(span) = &field.span {
            result.push_str(&raw[cursor..span.start]);
            cursor = span.end;
        }
    }

    result.push_str(&raw[cursor..]);
    result
}

fn format_canonical<F>(entry: &BibTeXEntry, keep: &F) -> String
where
    F: Fn(&BibTeXField) -> bool,
{
    let mut result = String::new();

    result.push('@');
    result.push_str(entry.entry_type.as_str());
    result.push('{');
    result.push_str(&entry.cite_key);
    result.push(',');
    result.push('\n');

    for field in entry.fields.iter().filter(|f| keep(f)) {
        result.push_str("    ");
        result.push_str(&field.key);
        result.push_str(" = ");
        result.push_str(&format_field_value(&field.value));
        result.push(',');
        result.push('\n');
    }

    result.push('}');
    result
}

/// Format a field value, choosing appropriate delimiters
fn format_field_value(value: &str) -> String {
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        return value.to_string();
    }

    let mut result = String::with_capacity(value.len() + 2);
    result.push('{');
    result.push_str(value);
    result.push('}');
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::BibTeXEntryType;
    use crate::parser::parse;

    const SOURCE: &str = "@Article{Smith2020,\n  author   = {Smith, Jane},\n  Abstract = {We study\n              things.},\n  title    = \"On {T}hings\",\n  year     = 2020\n}";

    #[test]
    fn test_format_simple_entry() {
        let mut entry = BibTeXEntry::new("Mayr1942", BibTeXEntryType::new("book"));
        entry.add_field("author", "Mayr, Ernst");
        entry.add_field("year", "1942");

        assert_eq!(
            format_entry(&entry),
            "@book{Mayr1942,\n    author = {Mayr, Ernst},\n    year = 1942,\n}"
        );
    }

    #[test]
    fn test_parsed_entry_round_trips() {
        let result = parse(SOURCE).unwrap();
        assert_eq!(format_entry(&result.entries[0]), SOURCE);
    }

    #[test]
    fn test_dropping_a_middle_field() {
        let result = parse(SOURCE).unwrap();
        let formatted =
            format_entry_filtered(&result.entries[0], |f| !f.is_named("abstract"));
        assert_eq!(
            formatted,
            "@Article{Smith2020,\n  author   = {Smith, Jane},\n  title    = \"On {T}hings\",\n  year     = 2020\n}"
        );
    }

    #[test]
    fn test_dropping_the_last_field() {
        let result = parse(SOURCE).unwrap();
        let formatted = format_entry_filtered(&result.entries[0], |f| !f.is_named("year"));
        assert!(formatted.ends_with("title    = \"On {T}hings\",\n}"));
        assert!(!formatted.contains("2020\n"));
    }

    #[test]
    fn test_dropping_fields_on_one_line() {
        let result = parse("@misc{K, a = {1}, b = {2}, c = {3}}").unwrap();
        let formatted = format_entry_filtered(&result.entries[0], |f| !f.is_named("b"));
        assert_eq!(formatted, "@misc{K, a = {1}, c = {3}}");
    }

    #[test]
    fn test_canonical_format_honours_filter() {
        let mut entry = BibTeXEntry::new("Made", BibTeXEntryType::new("book"));
        entry.add_field("title", "Kept");
        entry.add_field("note", "Dropped");

        let formatted = format_entry_filtered(&entry, |f| !f.is_named("NOTE"));
        assert_eq!(formatted, "@book{Made,\n    title = {Kept},\n}");
    }

    #[test]
    fn test_format_entries_separates_with_blank_line() {
        let result = parse("@misc{A}\n@misc{B}").unwrap();
        assert_eq!(format_entries(&result.entries), "@misc{A}\n\n@misc{B}");
    }
}
