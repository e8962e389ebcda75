//! Stylesheet parser.
//!
//! Splits source text into a tree of [`Node`]s at `{`, `;` and `}`
//! boundaries and classifies each chunk: variables, declarations, rules,
//! mixin definitions and calls, at-rules, imports and extends. Values stay
//! as raw text; they are evaluated later with the variables in scope.

use std::rc::Rc;

/// Position of a node: source index and byte offset in that source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Loc {
    /// Index into the compiler's source table
    pub source: usize,
    /// Byte offset in the source text
    pub offset: usize,
}

/// Syntax error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Description
    pub message: String,
    /// Where it was detected
    pub loc: Loc,
}

/// Shared rule body.
pub type Body = Rc<Vec<Node>>;

/// Parsed stylesheet node.
#[derive(Debug, Clone)]
pub enum Node {
    /// `@name: value;`
    Variable { name: String, value: String, loc: Loc },
    /// `property: value;`
    Declaration { name: String, value: String, loc: Loc },
    /// `selector { ... }`
    Rule(Rc<Rule>),
    /// `.name(@params) when (guard) { ... }`
    Mixin(Rc<MixinDef>),
    /// `.name(args);` or `#ns > .name;`
    Call(MixinCall),
    /// `@media ... { ... }`, `@font-face { ... }`, `@charset "...";`
    AtRule { name: String, prelude: String, body: Option<Body>, loc: Loc },
    /// `@import (options) "path" media;`
    Import(Import),
    /// `&:extend(.selector all);`
    Extend { targets: Vec<ExtendTarget>, loc: Loc },
}

/// A ruleset.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Selector text with `:extend(...)` removed
    pub selector: String,
    /// CSS guard (`when ...`)
    pub guard: Option<String>,
    /// Selectors extended by this rule
    pub extends: Vec<ExtendTarget>,
    /// Contents
    pub body: Body,
    /// Position of the selector
    pub loc: Loc,
}

/// Parametric mixin definition.
#[derive(Debug, Clone)]
pub struct MixinDef {
    /// `.name` or `#name`
    pub name: String,
    /// Parameters in order
    pub params: Vec<Param>,
    /// Guard condition text
    pub guard: Option<String>,
    /// Contents
    pub body: Body,
    /// Position of the definition
    pub loc: Loc,
}

/// Mixin parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// `@name` or `@name: default`
    Named { name: String, default: Option<String> },
    /// Literal value the argument must equal
    Pattern(String),
    /// `...` or `@rest...`
    Rest(Option<String>),
}

/// Mixin call.
#[derive(Debug, Clone)]
pub struct MixinCall {
    /// Namespace path, e.g. `["#gradient", ".vertical"]`
    pub path: Vec<String>,
    /// Arguments in order
    pub args: Vec<Arg>,
    /// Followed by `!important`
    pub important: bool,
    /// Position of the call
    pub loc: Loc,
}

/// Mixin call argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arg {
    /// Parameter name for `@name: value` arguments
    pub name: Option<String>,
    /// Raw value text
    pub value: String,
}

/// `@import` options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// `(less)`: compile regardless of extension
    pub less: bool,
    /// `(css)`: keep as a CSS `@import`
    pub css: bool,
    /// `(reference)`: definitions only, no output
    pub reference: bool,
    /// `(optional)`: a missing file is not an error
    pub optional: bool,
    /// `(inline)`: include the file verbatim
    pub inline: bool,
    /// `(multiple)`: import even if already imported
    pub multiple: bool,
}

/// `@import` statement.
#[derive(Debug, Clone)]
pub struct Import {
    /// Path as written, quoted or `url(...)`
    pub path: String,
    /// Options
    pub options: ImportOptions,
    /// Trailing media query
    pub media: String,
    /// Position of the statement
    pub loc: Loc,
}

/// Target of an extend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendTarget {
    /// Selector to extend
    pub selector: String,
    /// Also match the selector inside longer selectors
    pub all: bool,
}

/// Parse a stylesheet.
pub fn parse(text: &str, source: usize) -> Result<Vec<Node>, ParseError> {
    let clean = strip_comments(text, source)?;
    let mut parser = Parser { text: &clean, bytes: clean.as_bytes(), pos: 0, source };
    parser.block(None)
}

/// Replace comments with spaces, keeping newlines and byte offsets.
pub fn strip_comments(text: &str, source: usize) -> Result<String, ParseError> {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut quote: Option<u8> = None;
    let mut i = 0;

    let blank = |out: &mut String, range: &[u8]| {
        for &b in range {
            out.push(if b == b'\n' { '\n' } else { ' ' });
        }
    };

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q || b == b'\n' {
                quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'"' | b'\'' => {
                quote = Some(b);
                i += 1;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = text[i + 2..]
                    .find("*/")
                    .map(|e| i + 2 + e + 2)
                    .ok_or_else(|| ParseError {
                        message: "unterminated comment".to_string(),
                        loc: Loc { source, offset: i },
                    })?;
                out.push_str(&text[copied..i]);
                blank(&mut out, &bytes[i..end]);
                copied = end;
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                let end = text[i..].find('\n').map(|e| i + e).unwrap_or(bytes.len());
                out.push_str(&text[copied..i]);
                blank(&mut out, &bytes[i..end]);
                copied = end;
                i = end;
            }
            b'u' | b'U'
                if text.get(i..i + 4).is_some_and(|s| s.eq_ignore_ascii_case("url("))
                    && (i == 0 || !is_name_byte(bytes[i - 1])) =>
            {
                // Unquoted URLs may contain `//`
                i = text[i..].find(')').map(|e| i + e + 1).unwrap_or(bytes.len());
            }
            _ => i += 1,
        }
    }
    out.push_str(&text[copied..]);
    Ok(out)
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

/// Split at `sep` outside parentheses, brackets and quotes.
pub fn split_top_level(text: &str, sep: u8) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut start = 0;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'(' | b'[' => depth += 1,
                b')' | b']' => depth = depth.saturating_sub(1),
                _ if b == sep && depth == 0 => {
                    parts.push(&text[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
        i += 1;
    }
    parts.push(&text[start..]);
    parts
}

/// Offset of the first `needle` byte outside parentheses and quotes.
pub fn find_top_level(text: &str, needle: u8) -> Option<usize> {
    let parts = split_top_level(text, needle);
    (parts.len() > 1).then(|| parts[0].len())
}

/// Offset of the parenthesis matching the one at `open`.
fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Strip a trailing `!important`.
pub fn split_important(text: &str) -> (&str, bool) {
    let trimmed = text.trim_end();
    let lower = trimmed.to_ascii_lowercase();
    if lower.ends_with("!important") {
        (trimmed[..trimmed.len() - "!important".len()].trim_end(), true)
    } else {
        (trimmed, false)
    }
}

/// Length of a `.name` / `#name` mixin name at the start of `text`.
fn mixin_name_len(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    if !matches!(bytes.first(), Some(b'.' | b'#')) {
        return None;
    }
    let len = 1 + bytes[1..].iter().take_while(|&&b| is_name_byte(b) || b >= 0x80).count();
    (len > 1).then_some(len)
}

/// Whether `text` is a lone class or id selector usable as a mixin name.
pub fn is_simple_mixin_name(text: &str) -> bool {
    mixin_name_len(text) == Some(text.len())
}

/// Offset of a top-level ` when ` guard keyword.
fn find_guard(text: &str) -> Option<usize> {
    let mut offset = 0;
    for part in split_top_level(text, b' ') {
        if part == "when" && offset > 0 {
            return Some(offset);
        }
        offset += part.len() + 1;
    }
    None
}

struct Parser<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    source: usize,
}

impl<'a> Parser<'a> {
    fn loc(&self, offset: usize) -> Loc {
        Loc { source: self.source, offset }
    }

    fn error(&self, message: impl Into<String>, offset: usize) -> ParseError {
        ParseError { message: message.into(), loc: self.loc(offset) }
    }

    fn skip_blank(&mut self) {
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos].is_ascii_whitespace() || self.bytes[self.pos] == b';')
        {
            self.pos += 1;
        }
    }

    /// Parse nodes until the closing brace of the block opened at `open`,
    /// or end of input for the top level.
    fn block(&mut self, open: Option<usize>) -> Result<Vec<Node>, ParseError> {
        let mut nodes = Vec::new();
        loop {
            self.skip_blank();
            match self.bytes.get(self.pos) {
                None => {
                    return match open {
                        Some(offset) => Err(self.error("missing closing '}'", offset)),
                        None => Ok(nodes),
                    }
                }
                Some(b'}') => {
                    return match open {
                        Some(_) => {
                            self.pos += 1;
                            Ok(nodes)
                        }
                        None => Err(self.error("unexpected '}'", self.pos)),
                    }
                }
                Some(_) => {}
            }

            let start = self.pos;
            let (end, terminator) = self.scan_chunk()?;
            let chunk = self.text[start..end].trim_end();
            match terminator {
                Some(b'{') => {
                    self.pos = end + 1;
                    let body = self.block(Some(end))?;
                    nodes.push(self.block_node(chunk, start, body)?);
                }
                Some(b';') => {
                    self.pos = end + 1;
                    nodes.push(self.statement(chunk, start)?);
                }
                _ => {
                    self.pos = end;
                    nodes.push(self.statement(chunk, start)?);
                }
            }
        }
    }

    /// Find the end of the chunk starting at `pos`: the first `{`, `;` or
    /// `}` outside parentheses, quotes and `@{...}` interpolation.
    fn scan_chunk(&self) -> Result<(usize, Option<u8>), ParseError> {
        let mut depth = 0usize;
        let mut i = self.pos;
        while i < self.bytes.len() {
            let b = self.bytes[i];
            match b {
                b'"' | b'\'' => {
                    let mut j = i + 1;
                    loop {
                        match self.bytes.get(j) {
                            None | Some(b'\n') => {
                                return Err(self.error("unterminated string", i));
                            }
                            Some(b'\\') => j += 2,
                            Some(&c) if c == b => break,
                            Some(_) => j += 1,
                        }
                    }
                    i = j;
                }
                b'@' if self.bytes.get(i + 1) == Some(&b'{') => {
                    i = self.text[i..]
                        .find('}')
                        .map(|e| i + e)
                        .ok_or_else(|| self.error("unclosed interpolation", i))?;
                }
                b'(' | b'[' => depth += 1,
                b')' | b']' => depth = depth.saturating_sub(1),
                b'{' | b';' | b'}' if depth == 0 => return Ok((i, Some(b))),
                _ => {}
            }
            i += 1;
        }
        Ok((self.bytes.len(), None))
    }

    fn block_node(&self, prelude: &str, start: usize, body: Vec<Node>) -> Result<Node, ParseError> {
        let loc = self.loc(start);
        let body = Rc::new(body);

        if let Some(rest) = prelude.strip_prefix('@') {
            let name_len = rest.bytes().take_while(|&b| is_name_byte(b)).count();
            let name = &rest[..name_len];
            let after = rest[name_len..].trim_start();
            if name.is_empty() || after.starts_with(':') {
                return Err(self.error("detached rulesets are not supported", start));
            }
            return Ok(Node::AtRule {
                name: name.to_string(),
                prelude: after.to_string(),
                body: Some(body),
                loc,
            });
        }

        if let Some(name_len) = mixin_name_len(prelude) {
            if prelude[name_len..].trim_start().starts_with('(') {
                return self.mixin_definition(prelude, name_len, start, body);
            }
        }

        let (selector, guard) = match find_guard(prelude) {
            Some(i) => (prelude[..i].trim(), Some(prelude[i + "when".len()..].trim().to_string())),
            None => (prelude, None),
        };
        let (selector, extends) = self.extract_extends(selector, start)?;
        if selector.trim().is_empty() {
            return Err(self.error("missing selector", start));
        }

        Ok(Node::Rule(Rc::new(Rule { selector, guard, extends, body, loc })))
    }

    fn mixin_definition(
        &self,
        prelude: &str,
        name_len: usize,
        start: usize,
        body: Body,
    ) -> Result<Node, ParseError> {
        let open = name_len
            + prelude[name_len..].find('(').ok_or_else(|| self.error("expected '('", start))?;
        let close = matching_paren(prelude, open)
            .ok_or_else(|| self.error("missing ')' in mixin definition", start))?;
        let rest = prelude[close + 1..].trim();
        let guard = match rest.strip_prefix("when") {
            Some(guard) => Some(guard.trim().to_string()),
            None if rest.is_empty() => None,
            None => return Err(self.error(format!("unexpected '{}' after mixin parameters", rest), start)),
        };

        let params = split_arguments(&prelude[open + 1..close])
            .into_iter()
            .map(|p| parse_param(&p))
            .collect();

        Ok(Node::Mixin(Rc::new(MixinDef {
            name: prelude[..name_len].to_string(),
            params,
            guard,
            body,
            loc: self.loc(start),
        })))
    }

    fn statement(&self, text: &str, start: usize) -> Result<Node, ParseError> {
        let loc = self.loc(start);

        if let Some(rest) = text.strip_prefix("@import") {
            if rest.starts_with(|c: char| c.is_whitespace() || c == '(' || c == '"' || c == '\'') {
                return self.import(rest.trim(), start);
            }
        }

        if let Some(rest) = text.strip_prefix('@') {
            let name_len = rest.bytes().take_while(|&b| is_name_byte(b)).count();
            let name = &rest[..name_len];
            let after = rest[name_len..].trim_start();
            if name.is_empty() {
                return Err(self.error(format!("unexpected '{}'", text), start));
            }
            if let Some(value) = after.strip_prefix(':') {
                return Ok(Node::Variable {
                    name: name.to_string(),
                    value: value.trim().to_string(),
                    loc,
                });
            }
            return Ok(Node::AtRule {
                name: name.to_string(),
                prelude: after.to_string(),
                body: None,
                loc,
            });
        }

        if let Some(rest) = text.strip_prefix("&:extend(") {
            let inner = rest
                .strip_suffix(')')
                .ok_or_else(|| self.error("missing ')' in extend", start))?;
            return Ok(Node::Extend { targets: parse_extend_targets(inner), loc });
        }

        if mixin_name_len(text).is_some() {
            return self.mixin_call(text, start);
        }

        let colon = find_top_level(text, b':')
            .ok_or_else(|| self.error(format!("expected ':' in declaration '{}'", text), start))?;
        let name = text[..colon].trim();
        if name.is_empty() {
            return Err(self.error("missing property name", start));
        }
        Ok(Node::Declaration {
            name: name.to_string(),
            value: text[colon + 1..].trim().to_string(),
            loc,
        })
    }

    fn mixin_call(&self, text: &str, start: usize) -> Result<Node, ParseError> {
        let (text, important) = split_important(text);
        let (path_text, args) = match text.find('(') {
            Some(open) => {
                let close = matching_paren(text, open)
                    .ok_or_else(|| self.error("missing ')' in mixin call", start))?;
                if !text[close + 1..].trim().is_empty() {
                    return Err(self.error(format!("unexpected text after mixin call '{}'", text), start));
                }
                let args = split_arguments(&text[open + 1..close])
                    .into_iter()
                    .map(|a| parse_arg(&a))
                    .collect();
                (&text[..open], args)
            }
            None => (text, Vec::new()),
        };

        let mut path = Vec::new();
        let mut rest = path_text.trim();
        while !rest.is_empty() {
            let len = mixin_name_len(rest)
                .ok_or_else(|| self.error(format!("invalid mixin call '{}'", text), start))?;
            path.push(rest[..len].to_string());
            rest = rest[len..].trim_start().trim_start_matches('>').trim_start();
        }

        Ok(Node::Call(MixinCall { path, args, important, loc: self.loc(start) }))
    }

    fn import(&self, text: &str, start: usize) -> Result<Node, ParseError> {
        let mut options = ImportOptions::default();
        let mut rest = text;

        if rest.starts_with('(') {
            let close = matching_paren(rest, 0)
                .ok_or_else(|| self.error("missing ')' in @import options", start))?;
            for option in rest[1..close].split(',') {
                match option.trim() {
                    "less" => options.less = true,
                    "css" => options.css = true,
                    "reference" => options.reference = true,
                    "optional" => options.optional = true,
                    "inline" => options.inline = true,
                    "multiple" => options.multiple = true,
                    "once" => options.multiple = false,
                    other => {
                        return Err(self.error(format!("unknown @import option '{}'", other), start))
                    }
                }
            }
            rest = rest[close + 1..].trim_start();
        }

        let path_len = match rest.as_bytes().first() {
            Some(&q @ (b'"' | b'\'')) => rest[1..].find(q as char).map(|e| e + 2),
            Some(b'u' | b'U') if rest.len() > 4 && rest[..4].eq_ignore_ascii_case("url(") => {
                matching_paren(rest, 3).map(|e| e + 1)
            }
            _ => None,
        }
        .ok_or_else(|| self.error("expected a quoted path or url() after @import", start))?;

        Ok(Node::Import(Import {
            path: rest[..path_len].to_string(),
            options,
            media: rest[path_len..].trim().to_string(),
            loc: self.loc(start),
        }))
    }

    /// Remove `:extend(...)` from a selector and collect its targets.
    fn extract_extends(&self, selector: &str, start: usize) -> Result<(String, Vec<ExtendTarget>), ParseError> {
        let mut out = String::with_capacity(selector.len());
        let mut targets = Vec::new();
        let mut rest = selector;
        while let Some(i) = rest.find(":extend(") {
            out.push_str(&rest[..i]);
            let open = i + ":extend".len();
            let close = matching_paren(rest, open)
                .ok_or_else(|| self.error("missing ')' in extend", start))?;
            targets.extend(parse_extend_targets(&rest[open + 1..close]));
            rest = &rest[close + 1..];
        }
        out.push_str(rest);
        Ok((out, targets))
    }
}

/// Split mixin arguments or parameters: by `;` when present, else by `,`.
fn split_arguments(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let sep = if split_top_level(text, b';').len() > 1 { b';' } else { b',' };
    split_top_level(text, sep)
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// `@name: value` prefix, if present.
fn named_prefix(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix('@')?;
    let len = rest.bytes().take_while(|&b| is_name_byte(b)).count();
    let value = rest[len..].trim_start().strip_prefix(':')?;
    (len > 0).then(|| (&rest[..len], value.trim()))
}

fn parse_param(text: &str) -> Param {
    if text == "..." {
        return Param::Rest(None);
    }
    if let Some(name) = text.strip_prefix('@').and_then(|t| t.strip_suffix("...")) {
        return Param::Rest(Some(name.to_string()));
    }
    if let Some((name, default)) = named_prefix(text) {
        return Param::Named { name: name.to_string(), default: Some(default.to_string()) };
    }
    match text.strip_prefix('@') {
        Some(name) if name.bytes().all(is_name_byte) => {
            Param::Named { name: name.to_string(), default: None }
        }
        _ => Param::Pattern(text.to_string()),
    }
}

fn parse_arg(text: &str) -> Arg {
    match named_prefix(text) {
        Some((name, value)) => Arg { name: Some(name.to_string()), value: value.to_string() },
        None => Arg { name: None, value: text.to_string() },
    }
}

fn parse_extend_targets(text: &str) -> Vec<ExtendTarget> {
    split_top_level(text, b',')
        .into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| match t.strip_suffix(" all") {
            Some(selector) => ExtendTarget { selector: selector.trim().to_string(), all: true },
            None => ExtendTarget { selector: t.to_string(), all: false },
        })
        .collect()
}
