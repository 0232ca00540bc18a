//! Named-parameter translation.
//!
//! Rewrites `:name` tokens into a dialect's native placeholders and collects the
//! bound values in placeholder order.
//!
//! Tokens are found by a small lexer rather than a pattern match over the whole
//! text, so look-alikes are left untouched:
//! - single- and double-quoted text and backtick-quoted identifiers; a doubled
//!   quote is always an escaped quote, a backslash only under
//!   [`Quoting::Backslash`] or inside a PostgreSQL `E'...'` string
//! - `--` line comments and `/* */` block comments
//! - PostgreSQL dollar-quoted strings (`$$...$$`, `$tag$...$tag$`)
//! - casts (`value::type`)
//!
//! Outside those regions a token is still rejected when a quote or colon sits
//! immediately before it, or a quote immediately after it.

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, NamedArgs, SqlValue};
use std::ops::Range;

/// How a backend escapes quotes inside quoted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quoting {
    /// Only a doubled quote escapes a quote (SQLite, PostgreSQL).
    #[default]
    Standard,
    /// A backslash also escapes the next character in `'...'` and `"..."` (MySQL).
    Backslash,
}

impl Quoting {
    pub fn for_database(db_type: DatabaseType) -> Self {
        match db_type {
            DatabaseType::MySQL => Quoting::Backslash,
            DatabaseType::PostgreSQL | DatabaseType::SQLite => Quoting::Standard,
        }
    }
}

/// SQL rewritten for a dialect together with its positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedSql {
    pub sql: String,
    pub args: Vec<SqlValue>,
}

/// A named-parameter token found in a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamToken<'a> {
    /// Parameter name without the leading colon.
    pub name: &'a str,
    /// Byte range of the whole token, colon included.
    pub span: Range<usize>,
}

/// Rewrite `template` for a dialect, using [`Quoting::Standard`].
///
/// `placeholder` receives the parameter name and the zero-based position of the
/// value in the returned argument list. Each occurrence of a name takes its own
/// position, so a name used twice is bound twice.
pub fn translate<F>(template: &str, args: &NamedArgs, placeholder: F) -> DbResult<TranslatedSql>
where
    F: FnMut(&str, usize) -> String,
{
    translate_with(template, args, Quoting::Standard, placeholder)
}

/// Rewrite `template` for a dialect whose string literals follow `quoting`.
pub fn translate_with<F>(
    template: &str,
    args: &NamedArgs,
    quoting: Quoting,
    mut placeholder: F,
) -> DbResult<TranslatedSql>
where
    F: FnMut(&str, usize) -> String,
{
    let tokens = find_parameters_with(template, quoting);
    if tokens.is_empty() {
        return Ok(TranslatedSql {
            sql: template.to_string(),
            args: Vec::new(),
        });
    }

    let mut sql = String::with_capacity(template.len() + tokens.len() * 2);
    let mut ordered = Vec::with_capacity(tokens.len());
    let mut copied = 0;

    for token in &tokens {
        let value = args
            .get(token.name)
            .ok_or_else(|| DbError::missing_parameter(token.name))?;

        sql.push_str(&template[copied..token.span.start]);
        sql.push_str(&placeholder(token.name, ordered.len()));
        ordered.push(value.clone());
        copied = token.span.end;
    }
    sql.push_str(&template[copied..]);

    Ok(TranslatedSql { sql, args: ordered })
}

/// Names of the parameters referenced by `template`, in textual order.
pub fn parameter_names(template: &str) -> Vec<&str> {
    parameter_names_with(template, Quoting::Standard)
}

pub fn parameter_names_with(template: &str, quoting: Quoting) -> Vec<&str> {
    find_parameters_with(template, quoting)
        .into_iter()
        .map(|t| t.name)
        .collect()
}

/// Locate every named-parameter token in `template`.
pub fn find_parameters(template: &str) -> Vec<ParamToken<'_>> {
    find_parameters_with(template, Quoting::Standard)
}

pub fn find_parameters_with(template: &str, quoting: Quoting) -> Vec<ParamToken<'_>> {
    let bytes = template.as_bytes();
    let backslash = quoting == Quoting::Backslash;
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        i = match bytes[i] {
            b'\'' => skip_quoted(bytes, i, b'\'', backslash || is_escape_string(bytes, i)),
            b'"' => skip_quoted(bytes, i, b'"', backslash),
            b'`' => skip_quoted(bytes, i, b'`', false),
            b'-' if bytes.get(i + 1) == Some(&b'-') => skip_line_comment(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => skip_block_comment(bytes, i),
            b'$' => skip_dollar_quoted(bytes, i),
            b':' if bytes.get(i + 1) == Some(&b':') => i + 2,
            b':' => match parameter_at(bytes, i) {
                Some(end) => {
                    tokens.push(ParamToken {
                        name: &template[i + 1..end],
                        span: i..end,
                    });
                    end
                }
                None => i + 1,
            },
            _ => i + 1,
        };
    }

    tokens
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_quote(b: u8) -> bool {
    b == b'\'' || b == b'"'
}

/// PostgreSQL `E'...'` string: the quote at `quote` follows a lone `E`.
fn is_escape_string(bytes: &[u8], quote: usize) -> bool {
    quote > 0
        && matches!(bytes[quote - 1], b'E' | b'e')
        && (quote < 2 || !is_word_byte(bytes[quote - 2]))
}

/// End of the parameter token whose colon is at `colon`, if it is one.
fn parameter_at(bytes: &[u8], colon: usize) -> Option<usize> {
    if colon > 0 && (is_quote(bytes[colon - 1]) || bytes[colon - 1] == b':') {
        return None;
    }

    let start = colon + 1;
    let end = start
        + bytes[start..]
            .iter()
            .take_while(|b| is_word_byte(**b))
            .count();
    if end == start {
        return None;
    }
    if bytes.get(end).copied().is_some_and(is_quote) {
        return None;
    }
    Some(end)
}

/// Skip a quoted region opened at `start`. A doubled quote is an escaped quote;
/// with `backslash_escapes` a backslash escapes the byte after it.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8, backslash_escapes: bool) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        let b = bytes[i];
        if backslash_escapes && b == b'\\' {
            i += 2;
            continue;
        }
        if b == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn skip_line_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|b| *b == b'\n')
        .map(|offset| start + offset + 1)
        .unwrap_or(bytes.len())
}

fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map(|offset| start + 2 + offset + 2)
        .unwrap_or(bytes.len())
}

/// Skip a PostgreSQL dollar-quoted string opened at `start`.
///
/// `$1` style placeholders and identifiers containing `$` are not quotes.
fn skip_dollar_quoted(bytes: &[u8], start: usize) -> usize {
    if start > 0 && is_word_byte(bytes[start - 1]) {
        return start + 1;
    }

    let tag_start = start + 1;
    let tag_len = bytes[tag_start..]
        .iter()
        .take_while(|b| is_word_byte(**b))
        .count();
    let tag_end = tag_start + tag_len;
    if bytes.get(tag_start).is_some_and(|b| b.is_ascii_digit()) || bytes.get(tag_end) != Some(&b'$')
    {
        return start + 1;
    }

    let delimiter = &bytes[start..=tag_end];
    let body = tag_end + 1;
    bytes[body..]
        .windows(delimiter.len())
        .position(|w| w == delimiter)
        .map(|offset| body + offset + delimiter.len())
        .unwrap_or(bytes.len())
}
