//! Removal of debugging statements from scripts.
//!
//! Strips `console.*(...)` calls, `alert(...)` calls and `debugger`
//! statements. Every edit preserves the byte length of the code so offsets
//! into the concatenated input stay valid for the minifier's mappings.

use super::lexer::{tokenize, Token, TokenKind};
use super::{Asset, TransformError, TransformStep};

/// Transform step that strips debugging statements.
#[derive(Debug, Clone, Copy, Default)]
pub struct StripDebug;

impl TransformStep for StripDebug {
    fn name(&self) -> &'static str {
        "strip-debug"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        let edits = {
            let tokens = tokenize(&asset.code)
                .map_err(|e| TransformError::at(self.name(), e.message, &asset, e.offset))?;
            find_debug_statements(&tokens)
        };

        if !edits.is_empty() {
            asset.code = apply_edits(&asset.code, &edits);
        }
        Ok(asset)
    }
}

/// Replacement written over a stripped range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replacement {
    /// Spaces only
    Blank,
    /// `void 0`, for calls used as expressions
    VoidZero,
    /// `;`, for a `debugger` that ended a statement without one
    Semicolon,
}

impl Replacement {
    fn text(self) -> &'static str {
        match self {
            Replacement::Blank => "",
            Replacement::VoidZero => "void 0",
            Replacement::Semicolon => ";",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Edit {
    start: usize,
    end: usize,
    replacement: Replacement,
}

fn find_debug_statements(all: &[Token<'_>]) -> Vec<Edit> {
    let tokens: Vec<&Token<'_>> = all.iter().filter(|t| t.kind != TokenKind::Comment).collect();
    let mut edits = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let tok = tokens[i];
        let prev = i.checked_sub(1).map(|p| tokens[p]);
        let after_dot = prev.is_some_and(|p| p.is_punct(".") || p.is_punct("?."));

        let call_end = if tok.is_ident("console") && !after_dot {
            console_call_end(&tokens, i)
        } else if tok.is_ident("alert")
            && !after_dot
            && !prev.is_some_and(|p| p.is_ident("function"))
            && tokens.get(i + 1).is_some_and(|t| t.is_punct("("))
        {
            matching_paren(&tokens, i + 1)
        } else {
            None
        };

        if let Some(close) = call_end {
            let next = tokens.get(close + 1).copied();
            if !continues_call(next) {
                let standalone = is_statement_start(prev) && ends_statement(next);
                edits.push(Edit {
                    start: tok.start,
                    end: tokens[close].end(),
                    replacement: if standalone { Replacement::Blank } else { Replacement::VoidZero },
                });
                i = close + 1;
                continue;
            }
        }

        if tok.is_ident("debugger") && !after_dot {
            let next = tokens.get(i + 1).copied();
            let replacement = if next.is_some_and(|n| n.is_punct(";"))
                || is_statement_start(prev) && ends_statement(next)
            {
                Replacement::Blank
            } else {
                Replacement::Semicolon
            };
            edits.push(Edit { start: tok.start, end: tok.end(), replacement });
        }

        i += 1;
    }

    edits
}

/// Index of the closing paren of `console.a.b(...)` starting at `i`.
fn console_call_end(tokens: &[&Token<'_>], i: usize) -> Option<usize> {
    let mut j = i + 1;
    let mut members = 0;
    while tokens.get(j).is_some_and(|t| t.is_punct("."))
        && tokens.get(j + 1).is_some_and(|t| t.kind == TokenKind::Ident)
    {
        j += 2;
        members += 1;
    }
    if members == 0 || !tokens.get(j).is_some_and(|t| t.is_punct("(")) {
        return None;
    }
    matching_paren(tokens, j)
}

fn matching_paren(tokens: &[&Token<'_>], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (k, t) in tokens.iter().enumerate().skip(open) {
        if t.kind != TokenKind::Punct {
            continue;
        }
        match t.text {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(k);
                }
            }
            _ => {}
        }
    }
    None
}

/// The call's result is used by a member access, call, tagged template,
/// method body or arrow.
fn continues_call(next: Option<&Token<'_>>) -> bool {
    next.is_some_and(|n| {
        n.kind == TokenKind::Template
            || (n.kind == TokenKind::Punct
                && matches!(n.text, "." | "?." | "(" | "[" | "{" | "=>"))
    })
}

fn is_statement_start(prev: Option<&Token<'_>>) -> bool {
    match prev {
        None => true,
        Some(p) => p.is_punct(";") || p.is_punct("{") || p.is_punct("}"),
    }
}

fn ends_statement(next: Option<&Token<'_>>) -> bool {
    match next {
        None => true,
        Some(n) => n.newline_before || n.is_punct(";") || n.is_punct("}"),
    }
}

fn apply_edits(code: &str, edits: &[Edit]) -> String {
    let mut out = String::with_capacity(code.len());
    let mut pos = 0;
    for edit in edits {
        out.push_str(&code[pos..edit.start]);
        overwrite(&mut out, &code[edit.start..edit.end], edit.replacement.text());
        pos = edit.end;
    }
    out.push_str(&code[pos..]);
    out
}

/// Write `prefix` then pad with spaces to the byte length of `range`,
/// keeping any line terminators that fall after the prefix.
fn overwrite(out: &mut String, range: &str, prefix: &str) {
    out.push_str(prefix);
    for (i, c) in range.char_indices() {
        let end = i + c.len_utf8();
        if end <= prefix.len() {
            continue;
        }
        if i < prefix.len() {
            out.extend(std::iter::repeat(' ').take(end - prefix.len()));
            continue;
        }
        match c {
            '\n' | '\r' | '\u{2028}' | '\u{2029}' => out.push(c),
            _ => out.extend(std::iter::repeat(' ').take(c.len_utf8())),
        }
    }
}
