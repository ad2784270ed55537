//! Macro tokenizer
//!
//! Splits raw SQL into literal text and `$__name(args)` invocations. Argument
//! lists are split on top-level commas only: commas nested in parentheses,
//! quoted strings (`'..'`, `".."`) or bracketed identifiers (`[..]`) belong to
//! the enclosing argument. The same quoted regions are skipped when looking
//! for invocations, so a literal such as `'$__'` is plain text.

use crate::error::{QueryError, Result};

pub const MACRO_PREFIX: &str = "$__";

/// One macro invocation as it appears in the SQL text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroCall<'a> {
    pub name: &'a str,
    /// Trimmed arguments; empty for `$__name()`
    pub args: Vec<&'a str>,
    /// Full invocation text, used in error messages
    pub text: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Macro(MacroCall<'a>),
}

/// Tokenize `sql` left to right in a single pass
pub fn scan(sql: &str) -> Result<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    while let Some(start) = find_macro_start(sql, cursor) {
        let name_start = start + MACRO_PREFIX.len();
        let name_end = sql[name_start..]
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .map(|i| name_start + i)
            .unwrap_or(sql.len());

        if name_end == name_start {
            return Err(QueryError::macro_parse(
                &sql[start..name_end],
                "missing macro name",
            ));
        }
        if !sql[name_end..].starts_with('(') {
            return Err(QueryError::macro_parse(
                &sql[start..name_end],
                "expected `(` after macro name",
            ));
        }

        let (args, end) = split_arguments(sql, start, name_end)?;

        if start > cursor {
            segments.push(Segment::Text(&sql[cursor..start]));
        }
        segments.push(Segment::Macro(MacroCall {
            name: &sql[name_start..name_end],
            args,
            text: &sql[start..end],
        }));
        cursor = end;
    }

    if cursor < sql.len() {
        segments.push(Segment::Text(&sql[cursor..]));
    }

    Ok(segments)
}

/// Whether `text` holds a macro invocation outside quoted regions
pub fn contains_macro(text: &str) -> bool {
    find_macro_start(text, 0).is_some()
}

/// Byte offset of the next `$__` at or after `from` that is not inside
/// `'..'`, `".."` or `[..]`
fn find_macro_start(sql: &str, from: usize) -> Option<usize> {
    let mut quote: Option<char> = None;

    for (i, c) in sql[from..].char_indices() {
        let pos = from + i;

        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' => quote = Some(c),
            '[' => quote = Some(']'),
            '$' if sql[pos..].starts_with(MACRO_PREFIX) => return Some(pos),
            _ => {}
        }
    }

    None
}

/// Split the argument list opening at `open` (the index of `(`).
/// Returns the trimmed arguments and the index just past the closing `)`.
fn split_arguments(sql: &str, start: usize, open: usize) -> Result<(Vec<&str>, usize)> {
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut arg_start = open + 1;

    for (i, c) in sql[open + 1..].char_indices() {
        let pos = open + 1 + i;

        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' => quote = Some(c),
            '[' => quote = Some(']'),
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            ')' => {
                let last = sql[arg_start..pos].trim();
                // `$__name()` and `$__name( )` take no arguments
                if !(args.is_empty() && last.is_empty()) {
                    args.push(last);
                }
                return Ok((args, pos + 1));
            }
            ',' if depth == 0 => {
                args.push(sql[arg_start..pos].trim());
                arg_start = pos + 1;
            }
            _ => {}
        }
    }

    let message = match quote {
        Some(q) => format!("unterminated `{}` in argument list", q),
        None => "unbalanced parentheses in argument list".to_string(),
    };
    Err(QueryError::macro_parse(&sql[start..], message))
}
