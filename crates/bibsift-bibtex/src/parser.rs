//! nom-based BibTeX tokenizer
//!
//! Understands entries delimited by braces or parentheses, `@string` macros
//! (with `#` concatenation and the standard month names), `@preamble`
//! blocks kept verbatim, and `@comment`. Text between records is ignored.
//!
//! Besides the structured values it records where each field sits in the
//! entry's source text, which is what lets the formatter drop fields without
//! touching anything else.

use lazy_static::lazy_static;
use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::{map, opt, peek},
    IResult,
};
use std::collections::HashMap;

use super::entry::{BibTeXEntry, BibTeXEntryType, BibTeXField, BibTeXString};

lazy_static! {
    /// Month macros predefined by every standard BibTeX style.
    static ref MONTH_MACROS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("jan", "January");
        m.insert("feb", "February");
        m.insert("mar", "March");
        m.insert("apr", "April");
        m.insert("may", "May");
        m.insert("jun", "June");
        m.insert("jul", "July");
        m.insert("aug", "August");
        m.insert("sep", "September");
        m.insert("oct", "October");
        m.insert("nov", "November");
        m.insert("dec", "December");
        m
    };
}

/// Parse error information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibTeXParseError {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

/// Result of parsing a BibTeX file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BibTeXParseResult {
    /// Entries in source order
    pub entries: Vec<BibTeXEntry>,
    /// Verbatim `@preamble` blocks in source order
    pub preambles: Vec<String>,
    /// `@string` definitions in source order
    pub strings: Vec<BibTeXString>,
    pub errors: Vec<BibTeXParseError>,
}

impl BibTeXParseResult {
    /// Look up a `@string` definition by name (case-insensitive).
    ///
    /// BibTeX lets a later definition replace an earlier one, so the last
    /// definition with this name wins.
    pub fn string(&self, name: &str) -> Option<&BibTeXString> {
        self.strings
            .iter()
            .rev()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }
}

/// Error type for parsing failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid syntax")]
    InvalidSyntax,
    #[error("Malformed entry at line {line}: {message}")]
    Malformed { line: u32, message: String },
}

/// Tokenize a whole database.
///
/// Never fails as a whole: records that cannot be read are reported in
/// [`BibTeXParseResult::errors`] and skipped.
pub fn parse(input: &str) -> Result<BibTeXParseResult, ParseError> {
    Ok(parse_bibtex(input))
}

/// Parse a single BibTeX entry
pub fn parse_entry(input: &str) -> Result<BibTeXEntry, ParseError> {
    let result = parse_bibtex(input);
    if let Some(error) = result.errors.into_iter().next() {
        return Err(ParseError::Malformed {
            line: error.line,
            message: error.message,
        });
    }
    result
        .entries
        .into_iter()
        .next()
        .ok_or(ParseError::InvalidSyntax)
}

fn parse_bibtex(input: &str) -> BibTeXParseResult {
    let mut result = BibTeXParseResult::default();
    let mut macros: HashMap<String, String> = HashMap::new();
    let mut remaining = input;

    while !remaining.is_empty() {
        remaining = skip_whitespace_and_comments(remaining);

        if remaining.is_empty() {
            break;
        }

        if remaining.starts_with('@') {
            if record_header(remaining).is_err() {
                // A stray `@` in free text, such as an email address
                remaining = &remaining[1..];
                continue;
            }
            match parse_at_entry(remaining, &macros) {
                Ok((rest, at_entry)) => {
                    let consumed = &remaining[..remaining.len() - rest.len()];
                    match at_entry {
                        AtEntry::Entry(mut entry) => {
                            entry.raw_bibtex = Some(consumed.to_string());
                            result.entries.push(entry);
                        }
                        AtEntry::String(mut definition) => {
                            definition.raw_bibtex = consumed.to_string();
                            macros.insert(
                                definition.name.to_lowercase(),
                                definition.value.clone(),
                            );
                            result.strings.push(definition);
                        }
                        AtEntry::Preamble => {
                            result.preambles.push(consumed.to_string());
                        }
                        AtEntry::Comment => {}
                    }
                    remaining = rest;
                }
                Err(_) => {
                    let offset = input.len() - remaining.len();
                    let (line, column) = position_at(input, offset);
                    let first_line: String = remaining
                        .lines()
                        .next()
                        .unwrap_or_default()
                        .chars()
                        .take(60)
                        .collect();
                    result.errors.push(BibTeXParseError {
                        line,
                        column,
                        message: format!("Failed to parse entry `{}`", first_line.trim_end()),
                    });
                    // Skip to next @ or end
                    if let Some(pos) = remaining[1..].find('@') {
                        remaining = &remaining[pos + 1..];
                    } else {
                        break;
                    }
                }
            }
        } else if let Some(pos) = remaining.find('@') {
            remaining = &remaining[pos..];
        } else {
            break;
        }
    }

    result
}

/// Result of parsing an @ entry
enum AtEntry {
    Entry(BibTeXEntry),
    String(BibTeXString),
    Preamble,
    Comment,
}

/// One piece of a `#`-concatenated value
enum ValuePart<'a> {
    Literal(String),
    Macro(&'a str),
}

/// A field value after delimiter removal and macro interpolation
#[derive(Default)]
struct ParsedValue {
    text: String,
    macros: Vec<String>,
}

/// 1-based line and column of a byte offset
fn position_at(input: &str, offset: usize) -> (u32, u32) {
    let before = &input[..offset];
    let line = before.matches('\n').count() + 1;
    let column = offset - before.rfind('\n').map_or(0, |p| p + 1) + 1;
    (line as u32, column as u32)
}

/// Byte offset of `rest` within `origin`, where `rest` is a suffix of `origin`
fn offset_in(origin: &str, rest: &str) -> usize {
    origin.len() - rest.len()
}

fn fail(input: &str) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Char))
}

/// Skip whitespace and `%` line comments between blocks
fn skip_whitespace_and_comments(input: &str) -> &str {
    let mut pos = 0;
    let bytes = input.as_bytes();

    while pos < bytes.len() {
        if bytes[pos].is_ascii_whitespace() {
            pos += 1;
        } else if bytes[pos] == b'%' {
            while pos < bytes.len() && bytes[pos] != b'\n' {
                pos += 1;
            }
        } else {
            break;
        }
    }

    &input[pos..]
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "_-:.+".contains(c)
}

fn is_cite_key_char(c: char) -> bool {
    !c.is_whitespace() && !",{}()=\"#%".contains(c)
}

fn open_delimiter(input: &str) -> IResult<&str, char> {
    alt((char('{'), char('(')))(input)
}

fn closing_for(open: char) -> char {
    if open == '(' {
        ')'
    } else {
        '}'
    }
}

/// `@name{` or `@name(`: the start of a record rather than free text
fn record_header(input: &str) -> IResult<&str, ()> {
    let (rest, _) = char('@')(input)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = take_while1(|c: char| c.is_ascii_alphanumeric())(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = peek(open_delimiter)(rest)?;
    Ok((rest, ()))
}

/// Parse an @ entry (entry, string, preamble, or comment)
fn parse_at_entry<'a>(
    input: &'a str,
    macros: &HashMap<String, String>,
) -> IResult<&'a str, AtEntry> {
    let (rest, _) = char('@')(input)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, entry_type) = take_while1(|c: char| c.is_ascii_alphanumeric())(rest)?;

    match entry_type.to_lowercase().as_str() {
        "string" => {
            let (rest, definition) = parse_string_definition(rest, macros)?;
            Ok((rest, AtEntry::String(definition)))
        }
        "preamble" => {
            let (rest, ()) = parse_preamble(rest, macros)?;
            Ok((rest, AtEntry::Preamble))
        }
        "comment" => {
            let (rest, ()) = parse_comment_body(rest)?;
            Ok((rest, AtEntry::Comment))
        }
        _ => {
            let (rest, entry) = parse_entry_body(input, rest, entry_type, macros)?;
            Ok((rest, AtEntry::Entry(entry)))
        }
    }
}

/// Parse a @string definition
fn parse_string_definition<'a>(
    input: &'a str,
    macros: &HashMap<String, String>,
) -> IResult<&'a str, BibTeXString> {
    let (rest, _) = multispace0(input)?;
    let (rest, open) = open_delimiter(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, name) = take_while1(is_name_char)(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = char('=')(rest)?;
    let (rest, value) = parse_field_value(rest, macros)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = char(closing_for(open))(rest)?;

    Ok((
        rest,
        BibTeXString {
            name: name.to_string(),
            value: value.text,
            macros: value.macros,
            raw_bibtex: String::new(),
        },
    ))
}

/// Parse a @preamble
fn parse_preamble<'a>(input: &'a str, macros: &HashMap<String, String>) -> IResult<&'a str, ()> {
    let (rest, _) = multispace0(input)?;
    let (rest, open) = open_delimiter(rest)?;
    let (rest, _) = parse_field_value(rest, macros)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = char(closing_for(open))(rest)?;

    Ok((rest, ()))
}

/// Parse a @comment body (skip everything in braces or to end of line)
fn parse_comment_body(input: &str) -> IResult<&str, ()> {
    let (rest, _) = multispace0(input)?;
    if rest.starts_with('{') {
        let (rest, _) = parse_braced_content(rest)?;
        Ok((rest, ()))
    } else {
        let pos = rest.find('\n').unwrap_or(rest.len());
        Ok((&rest[pos..], ()))
    }
}

/// Parse an entry body; `origin` starts at the entry's `@`
fn parse_entry_body<'a>(
    origin: &'a str,
    input: &'a str,
    entry_type: &str,
    macros: &HashMap<String, String>,
) -> IResult<&'a str, BibTeXEntry> {
    let (rest, _) = multispace0(input)?;
    let (rest, open) = open_delimiter(rest)?;
    let close = closing_for(open);
    let (rest, _) = multispace0(rest)?;

    let (rest, cite_key) = take_while1(is_cite_key_char)(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = opt(char(','))(rest)?;

    let (rest, fields) = parse_fields(origin, rest, close, macros)?;

    let (rest, _) = multispace0(rest)?;
    let (rest, _) = char(close)(rest)?;

    let mut entry = BibTeXEntry::new(cite_key, BibTeXEntryType::new(entry_type));
    entry.fields = fields;

    Ok((rest, entry))
}

/// Parse fields within an entry, recording each field's segment
fn parse_fields<'a>(
    origin: &'a str,
    input: &'a str,
    close: char,
    macros: &HashMap<String, String>,
) -> IResult<&'a str, Vec<BibTeXField>> {
    let mut fields = Vec::new();
    let mut remaining = input;

    loop {
        let start = offset_in(origin, remaining);
        let (rest, _) = multispace0(remaining)?;

        if rest.is_empty() || rest.starts_with(close) {
            return Ok((remaining, fields));
        }

        match parse_single_field(rest, macros) {
            Ok((rest, (key, value))) => {
                // The trailing comma belongs to the field; whitespace before
                // the closing delimiter does not.
                let (after_space, _) = multispace0(rest)?;
                remaining = after_space.strip_prefix(',').unwrap_or(rest);
                fields.push(BibTeXField {
                    key,
                    value: value.text,
                    macros: value.macros,
                    span: Some(start..offset_in(origin, remaining)),
                });
            }
            Err(_) => {
                return Ok((remaining, fields));
            }
        }
    }
}

/// Parse a single field (key = value)
fn parse_single_field<'a>(
    input: &'a str,
    macros: &HashMap<String, String>,
) -> IResult<&'a str, (String, ParsedValue)> {
    let (rest, key) = take_while1(is_name_char)(input)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = char('=')(rest)?;
    let (rest, value) = parse_field_value(rest, macros)?;

    Ok((rest, (key.to_string(), value)))
}

/// Parse a field value (braced, quoted, number, or string reference).
///
/// The returned remainder starts right after the last value part, before
/// any trailing whitespace.
fn parse_field_value<'a>(
    input: &'a str,
    macros: &HashMap<String, String>,
) -> IResult<&'a str, ParsedValue> {
    let mut value = ParsedValue::default();
    let mut remaining = input;

    loop {
        let (rest, _) = multispace0(remaining)?;

        let (rest, part) = alt((
            map(parse_braced_value, ValuePart::Literal),
            map(parse_quoted_value, ValuePart::Literal),
            map(take_while1(|c: char| c.is_ascii_digit()), |s: &str| {
                ValuePart::Literal(s.to_string())
            }),
            map(take_while1(is_name_char), ValuePart::Macro),
        ))(rest)?;

        match part {
            ValuePart::Literal(text) => value.text.push_str(&text),
            ValuePart::Macro(name) => {
                value.text.push_str(&resolve_macro(name, macros));
                value.macros.push(name.to_string());
            }
        }
        remaining = rest;

        // Check for concatenation
        let (rest, _) = multispace0(remaining)?;
        if let Some(stripped) = rest.strip_prefix('#') {
            remaining = stripped;
        } else {
            return Ok((remaining, value));
        }
    }
}

/// Expand a macro reference; unknown names are kept as written
fn resolve_macro(name: &str, macros: &HashMap<String, String>) -> String {
    let lower = name.to_lowercase();
    macros
        .get(&lower)
        .cloned()
        .or_else(|| MONTH_MACROS.get(lower.as_str()).map(|m| (*m).to_string()))
        .unwrap_or_else(|| name.to_string())
}

/// Parse a braced value {content}
fn parse_braced_value(input: &str) -> IResult<&str, String> {
    let (rest, content) = parse_braced_content(input)?;
    // Remove outer braces
    let inner = &content[1..content.len() - 1];
    Ok((rest, inner.to_string()))
}

/// Parse braced content including nested braces
fn parse_braced_content(input: &str) -> IResult<&str, &str> {
    if !input.starts_with('{') {
        return Err(fail(input));
    }

    let mut depth = 0;
    let mut pos = 0;
    let bytes = input.as_bytes();

    while pos < bytes.len() {
        match bytes[pos] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&input[pos + 1..], &input[..pos + 1]));
                }
            }
            b'\\' => {
                // Skip escaped character
                pos += 1;
            }
            _ => {}
        }
        pos += 1;
    }

    Err(fail(input))
}

/// Parse a quoted value "content"
fn parse_quoted_value(input: &str) -> IResult<&str, String> {
    if !input.starts_with('"') {
        return Err(fail(input));
    }

    let mut brace_depth = 0usize;
    let mut escaped = false;

    for (pos, c) in input.char_indices().skip(1) {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => brace_depth += 1,
            '}' => brace_depth = brace_depth.saturating_sub(1),
            '"' if brace_depth == 0 => {
                return Ok((&input[pos + 1..], input[1..pos].to_string()));
            }
            _ => {}
        }
    }

    Err(fail(input))
}
