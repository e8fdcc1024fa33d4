// Copyright (c) Contributors to the devsync project.
// SPDX-License-Identifier: Apache-2.0

use std::iter::Peekable;
use std::str::Chars;

use relative_path::RelativePath;

#[cfg(test)]
#[path = "./filter_test.rs"]
mod filter_test;

/// An ordered set of glob patterns that select which device nodes are synced.
///
/// Patterns are matched against the base name of an entry, never the full
/// path. An empty set selects everything.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    patterns: Vec<Filter>,
}

#[derive(Debug, Clone)]
struct Filter {
    source: String,
    // None when the pattern failed to compile, such a
    // pattern never matches anything
    compiled: Option<glob::Pattern>,
}

impl FilterSet {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns = patterns
            .into_iter()
            .map(Into::into)
            .map(|source| {
                let compiled = match compile(&source) {
                    Ok(pattern) => Some(pattern),
                    Err(err) => {
                        tracing::warn!(filter = %source, %err, "invalid filter pattern will never match");
                        None
                    }
                };
                Filter { source, compiled }
            })
            .collect();
        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// The patterns in this set, as they were given.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|f| f.source.as_str())
    }

    /// True if the entry at this source-relative path should be synced.
    pub fn matches<P: AsRef<RelativePath>>(&self, relative_path: P) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        let name = relative_path.as_ref().file_name().unwrap_or_default();
        self.patterns
            .iter()
            .filter_map(|f| f.compiled.as_ref())
            .any(|pattern| pattern.matches(name))
    }
}

impl<S: Into<String>> FromIterator<S> for FilterSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self::new(iter)
    }
}

/// Compile a shell-style name pattern.
///
/// `[!...]` and `[^...]` both negate a class, a backslash makes the next
/// character literal and a run of `*` behaves as a single one. The
/// pattern is rewritten into the syntax of [`glob::Pattern`] before
/// compiling, since that dialect has no escapes, no `^` negation, and
/// rejects `**` inside a name.
fn compile(pattern: &str) -> Result<glob::Pattern, String> {
    let mut rewritten = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                while chars.next_if_eq(&'*').is_some() {}
                rewritten.push('*');
            }
            '?' => rewritten.push('?'),
            '\\' => match chars.next() {
                Some(c) => push_literal(&mut rewritten, c),
                None => return Err("trailing backslash".into()),
            },
            '[' => push_class(&mut chars, &mut rewritten)?,
            c => push_literal(&mut rewritten, c),
        }
    }
    glob::Pattern::new(&rewritten).map_err(|err| err.to_string())
}

fn push_literal(out: &mut String, c: char) {
    match c {
        '*' | '?' | '[' | ']' => {
            out.push('[');
            out.push(c);
            out.push(']');
        }
        c => out.push(c),
    }
}

#[derive(Debug, Clone, Copy)]
enum ClassItem {
    Char(char),
    Range(char, char),
}

impl ClassItem {
    fn first(&self) -> char {
        match self {
            Self::Char(c) | Self::Range(c, _) => *c,
        }
    }
}

/// Rewrite the rest of a bracket expression, after its opening `[`.
fn push_class(chars: &mut Peekable<Chars<'_>>, out: &mut String) -> Result<(), String> {
    let unterminated = || "unterminated character class".to_string();
    let negated = chars.next_if(|c| *c == '!' || *c == '^').is_some();

    let mut items = Vec::new();
    loop {
        let c = match chars.next() {
            None => return Err(unterminated()),
            Some(']') if !items.is_empty() => break,
            Some('\\') => chars.next().ok_or_else(unterminated)?,
            Some(c) => c,
        };
        if chars.peek() != Some(&'-') {
            items.push(ClassItem::Char(c));
            continue;
        }
        let mut ahead = chars.clone();
        ahead.next();
        let end = match ahead.next() {
            // a trailing '-' is literal, and is read on the next pass
            None | Some(']') => {
                items.push(ClassItem::Char(c));
                continue;
            }
            Some('\\') => ahead.next().ok_or_else(unterminated)?,
            Some(end) => end,
        };
        *chars = ahead;
        if end < c {
            return Err(format!("invalid range {c}-{end}"));
        }
        if [c, end].into_iter().any(|c| matches!(c, '-' | ']')) {
            return Err(format!("unsupported range {c}-{end}"));
        }
        items.push(ClassItem::Range(c, end));
    }

    // glob only takes ']' as the first member and reads "x-y" as a range,
    // so ']' goes first, '-' last, and '!' never opens a plain class
    let (closing, rest): (Vec<_>, Vec<_>) =
        items.into_iter().partition(|i| matches!(i, ClassItem::Char(']')));
    let (dashes, rest): (Vec<_>, Vec<_>) =
        rest.into_iter().partition(|i| matches!(i, ClassItem::Char('-')));
    let (bangs, rest): (Vec<_>, Vec<_>) = rest.into_iter().partition(|i| i.first() == '!');
    let members: Vec<_> = closing
        .into_iter()
        .take(1)
        .chain(rest)
        .chain(bangs)
        .chain(dashes.into_iter().take(1))
        .collect();

    if !negated && members.first().is_some_and(|i| i.first() == '!') {
        match members.as_slice() {
            [ClassItem::Char('!')] => {
                out.push('!');
                return Ok(());
            }
            [ClassItem::Char('!'), ClassItem::Char('-')] => {
                out.push_str("[-!]");
                return Ok(());
            }
            _ => return Err("unsupported range starting with '!'".into()),
        }
    }

    out.push('[');
    if negated {
        out.push('!');
    }
    for item in members {
        match item {
            ClassItem::Char(c) => out.push(c),
            ClassItem::Range(start, end) => {
                out.push(start);
                out.push('-');
                out.push(end);
            }
        }
    }
    out.push(']');
    Ok(())
}

/// True if the entry at `relative_path` is selected by `filters`.
pub fn should_sync<P: AsRef<RelativePath>>(relative_path: P, filters: &FilterSet) -> bool {
    filters.matches(relative_path)
}
