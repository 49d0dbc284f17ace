//! Entries, fields and `@string` definitions

use std::fmt;
use std::ops::Range;

/// Entry type name (`article`, `book`, ...) as written in the source.
///
/// Comparisons ignore ASCII case, so `@Article` and `@article` are the same
/// type while the spelling as written survives for output.
#[derive(Debug, Clone, Eq)]
pub struct BibTeXEntryType(String);

impl BibTeXEntryType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against a type name
    pub fn is(&self, name: &str) -> bool {
        self.0.eq_ignore_ascii_case(name)
    }
}

impl PartialEq for BibTeXEntryType {
    fn eq(&self, other: &Self) -> bool {
        self.is(&other.0)
    }
}

impl fmt::Display for BibTeXEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single BibTeX field (key-value pair)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibTeXField {
    pub key: String,
    /// Value with delimiters removed and macros interpolated
    pub value: String,
    /// Names of the `@string` macros the value referenced, in order
    pub macros: Vec<String>,
    /// Byte range of this field's segment within the entry's raw text.
    ///
    /// A segment runs from the end of the previous separator up to and
    /// including the field's own trailing comma, so removing it removes the
    /// whole field and nothing else.
    pub span: Option<Range<usize>>,
}

impl BibTeXField {
    /// Create a field that has no source text
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            macros: Vec::new(),
            span: None,
        }
    }

    /// Case-insensitive field name comparison
    pub fn is_named(&self, name: &str) -> bool {
        self.key.eq_ignore_ascii_case(name)
    }
}

/// One `@type{key, ...}` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibTeXEntry {
    pub cite_key: String,
    pub entry_type: BibTeXEntryType,
    pub fields: Vec<BibTeXField>,
    /// Verbatim source text from `@` through the closing delimiter
    pub raw_bibtex: Option<String>,
}

impl BibTeXEntry {
    /// An entry with no fields and no source text
    pub fn new(cite_key: impl Into<String>, entry_type: BibTeXEntryType) -> Self {
        Self {
            cite_key: cite_key.into(),
            entry_type,
            fields: Vec::new(),
            raw_bibtex: None,
        }
    }

    pub fn add_field(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.push(BibTeXField::new(key, value));
    }

    /// Value of the first field with this name (case-insensitive)
    pub fn get_field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.is_named(key))
            .map(|f| f.value.as_str())
    }

    /// Whether the entry carries a field with this name (case-insensitive)
    pub fn has_field(&self, key: &str) -> bool {
        self.fields.iter().any(|f| f.is_named(key))
    }

    /// The citekey named by the `crossref` field, if any
    pub fn crossref(&self) -> Option<&str> {
        self.get_field("crossref")
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// Whether every field knows where it sits in the raw text
    pub fn has_source_spans(&self) -> bool {
        self.raw_bibtex.is_some() && self.fields.iter().all(|f| f.span.is_some())
    }
}

/// A `@string` macro definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibTeXString {
    pub name: String,
    pub value: String,
    /// Macros referenced by this definition's own value
    pub macros: Vec<String>,
    /// Verbatim source text of the whole `@string{...}` block
    pub raw_bibtex: String,
}
