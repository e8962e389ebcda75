//! Whitespace and comment removal for scripts.
//!
//! The minifier re-emits the token stream with the least separation that
//! keeps the program equivalent: a space where two tokens would otherwise
//! merge, and a line break where automatic semicolon insertion or a
//! restricted production depends on one. `/*! ... */` licence comments are
//! kept verbatim. Every emitted token gets a [`Mapping`] back to its input
//! offset.

use super::lexer::{tokenize, Token, TokenKind};
use super::{Asset, Mapping, Position, TransformError, TransformStep};

/// Transform step that minifies JavaScript.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinifyScript;

impl TransformStep for MinifyScript {
    fn name(&self) -> &'static str {
        "minify-script"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        let (code, mappings) = {
            let tokens = tokenize(&asset.code)
                .map_err(|e| TransformError::at(self.name(), e.message, &asset, e.offset))?;
            minify_tokens(&tokens)
        };
        asset.code = code;
        asset.mappings = mappings;
        Ok(asset)
    }
}

/// Keywords after which a line break terminates the statement.
const RESTRICTED_KEYWORDS: &[&str] = &["return", "break", "continue", "throw", "yield", "async"];

/// Generated code with its position tracking.
struct Output {
    code: String,
    position: Position,
    mappings: Vec<Mapping>,
}

impl Output {
    fn push(&mut self, text: &str) {
        self.code.push_str(text);
        match text.rfind(['\n', '\u{2028}', '\u{2029}']) {
            None => self.position.column += utf16_len(text),
            Some(last) => {
                self.position.line += text.matches(['\n', '\u{2028}', '\u{2029}']).count() as u32;
                let rest = &text[last..];
                let rest = &rest[rest.chars().next().map(char::len_utf8).unwrap_or(0)..];
                self.position.column = utf16_len(rest);
            }
        }
    }

    fn map(&mut self, offset: usize) {
        self.mappings.push(Mapping { generated: self.position, offset });
    }
}

fn utf16_len(s: &str) -> u32 {
    if s.is_ascii() {
        s.len() as u32
    } else {
        s.encode_utf16().count() as u32
    }
}

/// Re-emit tokens with minimal separation.
pub fn minify_tokens(tokens: &[Token<'_>]) -> (String, Vec<Mapping>) {
    let capacity = tokens.iter().map(|t| t.text.len() + 1).sum();
    let mut out = Output {
        code: String::with_capacity(capacity),
        position: Position::default(),
        mappings: Vec::with_capacity(tokens.len()),
    };

    let mut prev: Option<&Token<'_>> = None;
    for tok in tokens {
        if tok.kind == TokenKind::Comment {
            // Keep the comment on its own line if it had one
            if tok.newline_before && !out.code.is_empty() {
                out.push("\n");
            }
            out.push(tok.text);
            prev = None;
            continue;
        }

        match prev {
            Some(p) if tok.newline_before && needs_line_break(p, tok) => out.push("\n"),
            Some(p) if needs_space(p, tok) => out.push(" "),
            None if tok.newline_before && !out.code.is_empty() => out.push("\n"),
            _ => {}
        }

        out.map(tok.start);
        out.push(tok.text);
        prev = Some(tok);
    }

    (out.code, out.mappings)
}

/// Whether a line break between `p` and `t` has to survive.
fn needs_line_break(p: &Token<'_>, t: &Token<'_>) -> bool {
    if p.kind == TokenKind::Ident && RESTRICTED_KEYWORDS.contains(&p.text) {
        return true;
    }
    can_end_statement(p) && cannot_continue_expression(t)
}

fn can_end_statement(p: &Token<'_>) -> bool {
    match p.kind {
        TokenKind::Punct => matches!(p.text, ")" | "]" | "}" | "++" | "--"),
        TokenKind::Comment => false,
        _ => true,
    }
}

/// Tokens that force semicolon insertion after a complete expression.
fn cannot_continue_expression(t: &Token<'_>) -> bool {
    match t.kind {
        TokenKind::Punct => matches!(t.text, "{" | "++" | "--" | "!" | "~" | "@" | "#"),
        TokenKind::Template | TokenKind::Comment => false,
        _ => true,
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '\\') || !c.is_ascii()
}

/// Whether `p` and `t` would lex differently if written adjacently.
fn needs_space(p: &Token<'_>, t: &Token<'_>) -> bool {
    let (Some(a), Some(b)) = (p.text.chars().last(), t.text.chars().next()) else {
        return false;
    };

    if is_word_char(a) && is_word_char(b) {
        return true;
    }
    // `1 .toString()`
    if p.kind == TokenKind::Number
        && b == '.'
        && p.text.bytes().all(|c| c.is_ascii_digit() || c == b'_')
    {
        return true;
    }
    // `/re/ in x`
    if p.kind == TokenKind::Regex && is_word_char(b) {
        return true;
    }
    matches!(
        (a, b),
        ('+', '+') | ('-', '-') | ('/', '/') | ('/', '*') | ('<', '!') | ('-', '>')
    )
}
