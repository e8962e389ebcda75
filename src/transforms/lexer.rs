//! JavaScript tokenizer used by the script transforms.
//!
//! Produces significant tokens with their byte offsets and whether a line
//! terminator preceded them. Comments are skipped, except `/*! ... */`
//! licence comments which are returned as [`TokenKind::Comment`].
//!
//! The lexer is deliberately shallow: it knows enough to find token
//! boundaries (strings, template literals, regular expressions, comments)
//! and to check bracket balance, but it does not parse the grammar.

use thiserror::Error;

/// Token classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or keyword, including `#private` names
    Ident,
    /// Numeric literal
    Number,
    /// Single- or double-quoted string
    String,
    /// Template literal, substitutions included
    Template,
    /// Regular expression literal with flags
    Regex,
    /// Operator or punctuation
    Punct,
    /// Preserved licence comment
    Comment,
}

/// A token borrowed from the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    /// Classification
    pub kind: TokenKind,
    /// Exact source text
    pub text: &'a str,
    /// Byte offset in the source
    pub start: usize,
    /// A line terminator appeared between this token and the previous one
    pub newline_before: bool,
}

impl Token<'_> {
    /// Byte offset one past the token.
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }

    /// Whether this is the punctuator `p`.
    pub fn is_punct(&self, p: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == p
    }

    /// Whether this is the identifier or keyword `name`.
    pub fn is_ident(&self, name: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == name
    }
}

/// Lexical error with the byte offset where it was detected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct LexError {
    /// Description
    pub message: String,
    /// Byte offset in the source
    pub offset: usize,
}

impl LexError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self { message: message.into(), offset }
    }
}

/// Keywords after which a `/` starts a regular expression.
const REGEX_PRECEDING_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

/// Punctuators, longest first.
const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==", "!=",
    "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=",
    "**", "<<", ">>", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-", "*", "/", "%",
    "&", "|", "^", "!", "~", "?", ":", "=", ".", "@", "#",
];

/// Tokenize a script.
///
/// Fails on unterminated strings, template literals, comments and regular
/// expressions, and on unbalanced or mismatched brackets.
pub fn tokenize(src: &str) -> Result<Vec<Token<'_>>, LexError> {
    let mut lexer = Lexer { src, bytes: src.as_bytes(), pos: 0, prev: None, brackets: Vec::new() };
    let mut tokens = Vec::new();

    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }

    if let Some(&(open, offset)) = lexer.brackets.last() {
        return Err(LexError::new(format!("unclosed '{}'", open as char), offset));
    }

    Ok(tokens)
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    /// Last significant token, for regex/division disambiguation
    prev: Option<(TokenKind, &'a str)>,
    /// Open brackets and their offsets
    brackets: Vec<(u8, usize)>,
}

impl<'a> Lexer<'a> {
    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn byte_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn next_token(&mut self) -> Result<Option<Token<'a>>, LexError> {
        let mut newline = false;

        let c = loop {
            let Some(c) = self.peek_char() else {
                return Ok(None);
            };
            match c {
                '\n' | '\r' | '\u{2028}' | '\u{2029}' => {
                    newline = true;
                    self.pos += c.len_utf8();
                }
                c if is_whitespace(c) => self.pos += c.len_utf8(),
                '/' if self.byte_at(1) == Some(b'/') => self.skip_line_comment(),
                '#' if self.pos == 0 && self.byte_at(1) == Some(b'!') => self.skip_line_comment(),
                '/' if self.byte_at(1) == Some(b'*') => {
                    let start = self.pos;
                    newline |= self.skip_block_comment()?;
                    let text = &self.src[start..self.pos];
                    if text.starts_with("/*!") {
                        return Ok(Some(Token {
                            kind: TokenKind::Comment,
                            text,
                            start,
                            newline_before: newline,
                        }));
                    }
                }
                c => break c,
            }
        };

        let start = self.pos;
        let kind = match c {
            '"' | '\'' => {
                self.scan_string(c as u8)?;
                TokenKind::String
            }
            '`' => {
                self.scan_template()?;
                TokenKind::Template
            }
            '0'..='9' => {
                self.scan_number();
                TokenKind::Number
            }
            '.' if self.byte_at(1).is_some_and(|b| b.is_ascii_digit()) => {
                self.scan_number();
                TokenKind::Number
            }
            '/' if self.regex_allowed() => {
                self.scan_regex()?;
                TokenKind::Regex
            }
            '#' if self.src[self.pos + 1..].chars().next().is_some_and(is_id_start) => {
                self.pos += 1;
                self.scan_ident();
                TokenKind::Ident
            }
            c if is_id_start(c) || c == '\\' => {
                self.scan_ident();
                TokenKind::Ident
            }
            _ => {
                self.scan_punct()?;
                TokenKind::Punct
            }
        };

        let text = &self.src[start..self.pos];
        if kind == TokenKind::Punct {
            self.track_bracket(text, start)?;
        }
        self.prev = Some((kind, text));

        Ok(Some(Token { kind, text, start, newline_before: newline }))
    }

    fn regex_allowed(&self) -> bool {
        match self.prev {
            None => true,
            Some((TokenKind::Punct, p)) => !matches!(p, ")" | "]" | "++" | "--"),
            Some((TokenKind::Ident, word)) => REGEX_PRECEDING_KEYWORDS.contains(&word),
            Some(_) => false,
        }
    }

    fn track_bracket(&mut self, text: &str, start: usize) -> Result<(), LexError> {
        let close = match text {
            "(" | "[" | "{" => {
                self.brackets.push((text.as_bytes()[0], start));
                return Ok(());
            }
            ")" => b'(',
            "]" => b'[',
            "}" => b'{',
            _ => return Ok(()),
        };
        match self.brackets.pop() {
            Some((open, _)) if open == close => Ok(()),
            Some((open, _)) => Err(LexError::new(
                format!("mismatched '{}', expected '{}'", text, closing(open)),
                start,
            )),
            None => Err(LexError::new(format!("unexpected '{}'", text), start)),
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek_char() {
            if matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}') {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    /// Returns whether the comment spans a line terminator.
    fn skip_block_comment(&mut self) -> Result<bool, LexError> {
        let start = self.pos;
        match self.src[start + 2..].find("*/") {
            Some(end) => {
                let body = &self.src[start + 2..start + 2 + end];
                self.pos = start + 2 + end + 2;
                Ok(body.contains(['\n', '\r', '\u{2028}', '\u{2029}']))
            }
            None => Err(LexError::new("unterminated comment", start)),
        }
    }

    fn scan_string(&mut self, quote: u8) -> Result<(), LexError> {
        let start = self.pos;
        self.pos += 1;
        loop {
            match self.bytes.get(self.pos) {
                None | Some(b'\n') | Some(b'\r') => {
                    return Err(LexError::new("unterminated string literal", start));
                }
                Some(b'\\') => {
                    self.pos += 1;
                    // A backslash before CRLF continues the line
                    if self.bytes.get(self.pos) == Some(&b'\r')
                        && self.bytes.get(self.pos + 1) == Some(&b'\n')
                    {
                        self.pos += 1;
                    }
                    self.pos += 1;
                }
                Some(&b) if b == quote => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn scan_template(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        self.pos += 1;
        loop {
            match self.bytes.get(self.pos) {
                None => return Err(LexError::new("unterminated template literal", start)),
                Some(b'\\') => self.pos += 2,
                Some(b'`') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(b'$') if self.bytes.get(self.pos + 1) == Some(&b'{') => {
                    let depth = self.brackets.len();
                    self.brackets.push((b'{', self.pos + 1));
                    self.pos += 2;

                    let saved = self.prev.take();
                    loop {
                        match self.next_token()? {
                            None => {
                                return Err(LexError::new("unterminated template literal", start))
                            }
                            Some(t) if t.is_punct("}") && self.brackets.len() == depth => break,
                            Some(_) => {}
                        }
                    }
                    self.prev = saved;
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn scan_regex(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let mut in_class = false;
        self.pos += 1;
        loop {
            match self.bytes.get(self.pos) {
                None | Some(b'\n') | Some(b'\r') => {
                    return Err(LexError::new("unterminated regular expression", start));
                }
                Some(b'\\') => self.pos += 2,
                Some(b'[') => {
                    in_class = true;
                    self.pos += 1;
                }
                Some(b']') => {
                    in_class = false;
                    self.pos += 1;
                }
                Some(b'/') if !in_class => {
                    self.pos += 1;
                    break;
                }
                Some(_) => self.pos += 1,
            }
        }
        // flags
        while self.peek_char().is_some_and(is_id_continue) {
            self.pos += 1;
        }
        Ok(())
    }

    fn scan_number(&mut self) {
        let radix_prefix = self.bytes[self.pos] == b'0'
            && matches!(self.byte_at(1), Some(b'x' | b'X' | b'o' | b'O' | b'b' | b'B'));
        if radix_prefix {
            self.pos += 2;
            while self.byte_at(0).is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_') {
                self.pos += 1;
            }
            return;
        }

        let digits = |lexer: &mut Self| {
            while lexer.byte_at(0).is_some_and(|b| b.is_ascii_digit() || b == b'_') {
                lexer.pos += 1;
            }
        };

        digits(self);
        if self.byte_at(0) == Some(b'.') {
            self.pos += 1;
            digits(self);
        }
        if matches!(self.byte_at(0), Some(b'e' | b'E')) {
            let sign = matches!(self.byte_at(1), Some(b'+' | b'-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.byte_at(digit_at).is_some_and(|b| b.is_ascii_digit()) {
                self.pos += digit_at;
                digits(self);
            }
        }
        // BigInt suffix and any trailing identifier characters
        while self.peek_char().is_some_and(is_id_continue) {
            self.pos += self.peek_char().map(char::len_utf8).unwrap_or(1);
        }
    }

    fn scan_ident(&mut self) {
        while let Some(c) = self.peek_char() {
            if c == '\\' {
                // \uXXXX or \u{...} escape
                self.pos += 1;
                if self.byte_at(0) == Some(b'u') {
                    self.pos += 1;
                    if self.byte_at(0) == Some(b'{') {
                        while self.byte_at(0).is_some_and(|b| b != b'}') {
                            self.pos += 1;
                        }
                        self.pos = (self.pos + 1).min(self.bytes.len());
                    } else {
                        let hex = self.bytes[self.pos..]
                            .iter()
                            .take(4)
                            .take_while(|b| b.is_ascii_hexdigit())
                            .count();
                        self.pos += hex;
                    }
                }
            } else if is_id_continue(c) {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn scan_punct(&mut self) -> Result<(), LexError> {
        let rest = &self.src[self.pos..];
        for p in PUNCTUATORS {
            if rest.starts_with(p) {
                // `a?.5:b` is a conditional, not optional chaining
                if *p == "?." && rest.as_bytes().get(2).is_some_and(|b| b.is_ascii_digit()) {
                    continue;
                }
                self.pos += p.len();
                return Ok(());
            }
        }
        let c = rest.chars().next().unwrap_or('\0');
        Err(LexError::new(format!("unexpected character '{}'", c.escape_debug()), self.pos))
    }
}

fn closing(open: u8) -> char {
    match open {
        b'(' => ')',
        b'[' => ']',
        _ => '}',
    }
}

fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\u{b}' | '\u{c}' | '\u{a0}' | '\u{feff}') || c.is_whitespace()
}

/// First character of an identifier.
pub fn is_id_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '$' || c == '_' || (!c.is_ascii() && c.is_alphabetic())
}

/// Subsequent identifier character.
pub fn is_id_continue(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || c == '$'
        || c == '_'
        || c == '\u{200c}'
        || c == '\u{200d}'
        || (!c.is_ascii() && c.is_alphanumeric())
}
