//! Citation scanner
//!
//! Walks a LaTeX manuscript, following `\input`, `\include`, `\import` and
//! `\subimport`, and collects the citekeys of every recognized citation
//! command in first-occurrence order.
//!
//! The document is never parsed as a whole. Each control word is looked at
//! in isolation: a citation is the command name, an optional `*`, an
//! optional `<overlay>`, any number of `[optional]` groups (skipped, never
//! read for keys) and one required `{...}` group holding the keys.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SiftError};

/// Cite commands recognized when none are configured
pub const DEFAULT_CITE_COMMANDS: &[&str] = &["cite", "citet", "citep"];

const BEGIN_DOCUMENT: &str = r"\begin{document}";

/// A citation command and the other control words treated the same way
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CiteCommandRepr", into = "CiteCommandRepr")]
pub struct CiteCommand {
    name: String,
    aliases: Vec<String>,
}

/// Config form: either `"citep"` or `{ name = "citep", aliases = [...] }`
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum CiteCommandRepr {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        aliases: Vec<String>,
    },
}

impl From<CiteCommandRepr> for CiteCommand {
    fn from(repr: CiteCommandRepr) -> Self {
        match repr {
            CiteCommandRepr::Name(name) => CiteCommand::new(name),
            CiteCommandRepr::Full { name, aliases } => CiteCommand { name, aliases },
        }
    }
}

impl From<CiteCommand> for CiteCommandRepr {
    fn from(command: CiteCommand) -> Self {
        if command.aliases.is_empty() {
            CiteCommandRepr::Name(command.name)
        } else {
            CiteCommandRepr::Full {
                name: command.name,
                aliases: command.aliases,
            }
        }
    }
}

impl CiteCommand {
    /// A command with no aliases
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
        }
    }

    /// Add control words that behave like this command
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// All control words this command answers to
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    /// Whether a control word (without backslash) is this command
    pub fn matches(&self, word: &str) -> bool {
        self.names().any(|name| name == word)
    }

    /// The built-in command set
    pub fn defaults() -> Vec<CiteCommand> {
        DEFAULT_CITE_COMMANDS
            .iter()
            .map(|name| CiteCommand::new(*name))
            .collect()
    }
}

/// The keys found inside one citation command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationOccurrence {
    /// Control word that was matched, without backslash
    pub command: String,
    pub keys: Vec<String>,
}

/// Citekeys in first-occurrence order, each at most once
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestedKeySet {
    keys: Vec<String>,
    seen: HashSet<String>,
}

impl RequestedKeySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a key unless already present. Returns whether it was new.
    pub fn insert(&mut self, key: impl Into<String>) -> bool {
        let key = key.into();
        if self.seen.contains(&key) {
            return false;
        }
        self.seen.insert(key.clone());
        self.keys.push(key);
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.keys
    }
}

impl<S: Into<String>> FromIterator<S> for RequestedKeySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = RequestedKeySet::new();
        set.extend(iter);
        set
    }
}

impl<S: Into<String>> Extend<S> for RequestedKeySet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for key in iter {
            self.insert(key);
        }
    }
}

/// Scan documents (and everything they include) for cited keys.
///
/// Included paths resolve against the directory of the document that
/// started the walk, except `\subimport`, which resolves against the
/// including file. A missing included file is skipped with a warning; a
/// missing root document, any other read failure, or an include cycle is
/// fatal.
pub fn scan<P: AsRef<Path>>(documents: &[P], commands: &[CiteCommand]) -> Result<RequestedKeySet> {
    let mut walker = Walker {
        commands,
        root_dir: PathBuf::new(),
        stack: Vec::new(),
        done: HashSet::new(),
        keys: RequestedKeySet::new(),
    };

    for document in documents {
        let document = document.as_ref();
        walker.root_dir = parent_dir(document);
        walker.visit(document, true)?;
    }

    Ok(walker.keys)
}

/// Scan a single text without following includes
pub fn scan_text(text: &str, commands: &[CiteCommand]) -> RequestedKeySet {
    let mut keys = RequestedKeySet::new();
    for occurrence in find_citations(text, commands) {
        keys.extend(occurrence.keys);
    }
    keys
}

/// Every citation in a text, in order, without following includes.
///
/// Comments are ignored and, when the text has a `\begin{document}`, only
/// the body after it is considered.
pub fn find_citations(text: &str, commands: &[CiteCommand]) -> Vec<CitationOccurrence> {
    directives(text, commands)
        .into_iter()
        .filter_map(|directive| match directive {
            Directive::Citation(occurrence) => Some(occurrence),
            Directive::Include(_) => None,
        })
        .collect()
}

struct Walker<'a> {
    commands: &'a [CiteCommand],
    root_dir: PathBuf,
    /// Canonical paths of files currently being scanned
    stack: Vec<PathBuf>,
    done: HashSet<PathBuf>,
    keys: RequestedKeySet,
}

impl Walker<'_> {
    fn visit(&mut self, path: &Path, is_root: bool) -> Result<()> {
        let canonical = match fs::canonicalize(path) {
            Ok(canonical) => canonical,
            Err(err) if err.kind() == ErrorKind::NotFound && !is_root => {
                tracing::warn!("Included file {} not found, skipping", path.display());
                return Ok(());
            }
            Err(err) => return Err(SiftError::io(path, err)),
        };

        if self.stack.contains(&canonical) {
            let mut chain = self.stack.clone();
            chain.push(canonical);
            return Err(SiftError::CyclicInclude { chain });
        }
        if self.done.contains(&canonical) {
            tracing::debug!("{} already scanned", path.display());
            return Ok(());
        }

        let text = fs::read_to_string(path).map_err(|err| SiftError::io(path, err))?;
        tracing::debug!("Scanning {}", path.display());

        self.stack.push(canonical.clone());
        let current_dir = parent_dir(path);
        for directive in directives(&text, self.commands) {
            match directive {
                Directive::Citation(occurrence) => self.keys.extend(occurrence.keys),
                Directive::Include(include) => {
                    if let Some(target) = include.resolve(&self.root_dir, &current_dir) {
                        tracing::debug!("Following include {}", target.display());
                        self.visit(&target, false)?;
                    } else {
                        tracing::debug!("Not following non-TeX include {}", include.file);
                    }
                }
            }
        }
        self.stack.pop();
        self.done.insert(canonical);

        Ok(())
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

/// Something the scanner acts on
#[derive(Debug, PartialEq, Eq)]
enum Directive {
    Citation(CitationOccurrence),
    Include(Include),
}

#[derive(Debug, PartialEq, Eq)]
enum IncludeKind {
    /// `\input` and `\include`
    Input,
    Import,
    Subimport,
}

#[derive(Debug, PartialEq, Eq)]
struct Include {
    kind: IncludeKind,
    dir: String,
    file: String,
}

impl Include {
    /// Path of the included file, or `None` if it is not a TeX source
    fn resolve(&self, root_dir: &Path, current_dir: &Path) -> Option<PathBuf> {
        let relative = Path::new(&self.dir).join(&self.file);
        let relative = tex_path(&relative)?;
        let base = match self.kind {
            IncludeKind::Input | IncludeKind::Import => root_dir,
            IncludeKind::Subimport => current_dir,
        };
        Some(base.join(relative))
    }
}

/// Add `.tex` to an extensionless name; reject other extensions
fn tex_path(path: &Path) -> Option<PathBuf> {
    match path.extension().and_then(|e| e.to_str()) {
        None => Some(path.with_extension("tex")),
        Some("tex") => Some(path.to_path_buf()),
        Some(_) => None,
    }
}

/// Citations and includes of one file, in textual order
fn directives(text: &str, commands: &[CiteCommand]) -> Vec<Directive> {
    let uncommented = strip_comments(text);
    let body = match uncommented.find(BEGIN_DOCUMENT) {
        Some(pos) => &uncommented[pos + BEGIN_DOCUMENT.len()..],
        None => uncommented.as_str(),
    };

    let mut found = Vec::new();
    let bytes = body.as_bytes();
    let mut pos = 0;

    while let Some(offset) = body[pos..].find('\\') {
        let start = pos + offset + 1;
        let word_end = start
            + body[start..]
                .bytes()
                .take_while(|b| b.is_ascii_alphabetic() || *b == b'@')
                .count();

        if word_end == start {
            // Control symbol such as `\\` or `\%`
            pos = (start + 1).min(bytes.len());
            pos = next_char_boundary(body, pos);
            continue;
        }

        let word = &body[start..word_end];
        let (directive, end) = match word {
            "input" | "include" => parse_include(body, word_end, IncludeKind::Input),
            "import" => parse_include(body, word_end, IncludeKind::Import),
            "subimport" => parse_include(body, word_end, IncludeKind::Subimport),
            _ if commands.iter().any(|c| c.matches(word)) => parse_citation(body, word, word_end),
            _ => (None, word_end),
        };
        if let Some(directive) = directive {
            found.push(directive);
        }
        pos = end;
    }

    found
}

fn next_char_boundary(text: &str, mut pos: usize) -> usize {
    while pos < text.len() && !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

/// Drop everything from an unescaped `%` to the end of its line
fn strip_comments(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        match comment_start(line) {
            Some(pos) => {
                result.push_str(&line[..pos]);
                if line.ends_with('\n') {
                    result.push('\n');
                }
            }
            None => result.push_str(line),
        }
    }
    result
}

fn comment_start(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 2,
            b'%' => return Some(pos),
            _ => pos += 1,
        }
    }
    None
}

fn skip_whitespace(text: &str, pos: usize) -> usize {
    pos + text[pos..]
        .bytes()
        .take_while(u8::is_ascii_whitespace)
        .count()
}

/// Position after a `[...]` group starting at `start`.
///
/// A `]` inside braces does not close the group.
fn skip_bracket_group(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut pos = start + 1;

    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 1,
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b']' if depth == 0 => return Some(pos + 1),
            _ => {}
        }
        pos += 1;
    }

    None
}

/// Contents and end position of a `{...}` group starting at `start`
fn extract_braced_arg(text: &str, start: usize) -> Option<(usize, &str)> {
    if text.as_bytes().get(start) != Some(&b'{') {
        return None;
    }

    let mut depth = 1;
    let mut pos = start + 1;
    let bytes = text.as_bytes();

    while pos < bytes.len() && depth > 0 {
        match bytes[pos] {
            b'{' => depth += 1,
            b'}' => depth -= 1,
            b'\\' => {
                // Skip escaped character
                pos += 1;
            }
            _ => {}
        }
        pos += 1;
    }

    if depth == 0 {
        Some((pos, &text[start + 1..pos - 1]))
    } else {
        None
    }
}

fn parse_citation(text: &str, command: &str, word_end: usize) -> (Option<Directive>, usize) {
    let bytes = text.as_bytes();
    let mut pos = word_end;

    if bytes.get(pos) == Some(&b'*') {
        pos += 1;
    }
    pos = skip_whitespace(text, pos);

    if bytes.get(pos) == Some(&b'<') {
        match text[pos..].find('>') {
            Some(close) => pos = skip_whitespace(text, pos + close + 1),
            None => return (None, word_end),
        }
    }

    while bytes.get(pos) == Some(&b'[') {
        match skip_bracket_group(text, pos) {
            Some(end) => pos = skip_whitespace(text, end),
            None => return (None, word_end),
        }
    }

    let Some((end, inner)) = extract_braced_arg(text, pos) else {
        return (None, word_end);
    };

    let keys: Vec<String> = inner
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect();

    if keys.is_empty() {
        return (None, end);
    }

    let occurrence = CitationOccurrence {
        command: command.to_string(),
        keys,
    };
    (Some(Directive::Citation(occurrence)), end)
}

fn parse_include(text: &str, word_end: usize, kind: IncludeKind) -> (Option<Directive>, usize) {
    let mut pos = word_end;
    if text.as_bytes().get(pos) == Some(&b'*') {
        pos += 1;
    }

    let dir = match kind {
        IncludeKind::Input => String::new(),
        IncludeKind::Import | IncludeKind::Subimport => {
            let Some((end, dir)) = extract_braced_arg(text, skip_whitespace(text, pos)) else {
                return (None, word_end);
            };
            pos = end;
            dir.trim().to_string()
        }
    };

    let Some((end, file)) = extract_braced_arg(text, skip_whitespace(text, pos)) else {
        return (None, word_end);
    };
    let file = file.trim();
    if file.is_empty() {
        return (None, end);
    }

    let include = Include {
        kind,
        dir,
        file: file.to_string(),
    };
    (Some(Directive::Include(include)), end)
}
