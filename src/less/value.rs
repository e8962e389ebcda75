//! Value expressions for the stylesheet compiler.
//!
//! Declaration and variable values are tokenized, parsed into an [`Expr`]
//! tree and evaluated against the variables in scope. Arithmetic is applied
//! to numbers and colours; a `/` between plain literals is kept as a CSS
//! separator (`font: 12px/1.5`) and only divides inside parentheses or when
//! an operand is a variable. Text the expression grammar does not cover
//! (IE filters, hacks) falls back to plain variable substitution.

use super::color::Color;
use std::collections::HashMap;

/// How list items are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    /// `a b`
    Space,
    /// `a, b`
    Comma,
    /// `a/b`
    Slash,
}

/// An evaluated value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Number with an optional unit (`px`, `%`, `em`, ...)
    Number {
        /// Magnitude
        value: f64,
        /// Unit, empty when unitless
        unit: String,
    },
    /// Colour
    Color(Color),
    /// Quoted string; escaped strings print without quotes
    Quoted {
        /// Text between the quotes, escapes kept as written
        text: String,
        /// Quote character
        quote: char,
        /// Written as `~"..."` or produced by `e()`
        escaped: bool,
    },
    /// Identifier or opaque CSS text
    Keyword(String),
    /// List of values
    List {
        /// Items in order
        items: Vec<Value>,
        /// Joining separator
        separator: Separator,
    },
}

impl Value {
    /// Number with a unit.
    pub fn number(value: f64, unit: &str) -> Self {
        Value::Number { value, unit: unit.to_string() }
    }

    /// Keyword or opaque text.
    pub fn keyword(text: impl Into<String>) -> Self {
        Value::Keyword(text.into())
    }

    fn boolean(b: bool) -> Self {
        Value::keyword(if b { "true" } else { "false" })
    }

    /// CSS text of the value.
    pub fn to_css(&self) -> String {
        match self {
            Value::Number { value, unit } => format!("{}{}", format_number(*value), unit),
            Value::Color(color) => color.to_css(),
            Value::Quoted { text, escaped: true, .. } => text.clone(),
            Value::Quoted { text, quote, escaped: false } => format!("{quote}{text}{quote}"),
            Value::Keyword(text) => text.clone(),
            Value::List { items, separator } => {
                let sep = match separator {
                    Separator::Space => " ",
                    Separator::Comma => ", ",
                    Separator::Slash => "/",
                };
                items.iter().map(Value::to_css).collect::<Vec<_>>().join(sep)
            }
        }
    }

    /// Text used for `@{name}` interpolation: strings lose their quotes.
    pub fn to_interpolated(&self) -> String {
        match self {
            Value::Quoted { text, .. } => text.clone(),
            other => other.to_css(),
        }
    }

    /// The value as a colour, including named colour keywords.
    pub fn as_color(&self) -> Option<Color> {
        match self {
            Value::Color(color) => Some(color.clone()),
            Value::Keyword(word) => Color::named(word),
            _ => None,
        }
    }

    /// The value as a number and unit.
    pub fn as_number(&self) -> Option<(f64, &str)> {
        match self {
            Value::Number { value, unit } => Some((*value, unit.as_str())),
            _ => None,
        }
    }

    /// Whether the value is the keyword `true`.
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Keyword(k) if k == "true")
    }
}

/// Format a number with at most eight decimals and no trailing zeros.
pub fn format_number(value: f64) -> String {
    let rounded = (value * 1e8).round() / 1e8;
    if rounded == 0.0 {
        return "0".to_string();
    }
    if rounded.fract() == 0.0 && rounded.abs() < 1e15 {
        return format!("{}", rounded as i64);
    }
    let text = format!("{:.8}", rounded);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Variable lookup used during evaluation.
pub trait Variables {
    /// Value of `@name`, without the `@`.
    fn lookup(&self, name: &str) -> Option<Value>;
}

impl Variables for HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Evaluation failure.
#[derive(Debug, Clone, PartialEq)]
enum EvalError {
    /// Reported to the user
    Fatal(String),
    /// Outside the expression grammar; fall back to substitution
    Unsupported,
}

type EvalResult = Result<Value, EvalError>;

fn undefined(name: &str) -> EvalError {
    EvalError::Fatal(format!("undefined variable @{}", name))
}

/// Evaluate a value expression.
///
/// Fails only on errors the user must fix, such as undefined variables or
/// colour functions applied to non-colours.
pub fn evaluate(text: &str, vars: &dyn Variables) -> Result<Value, String> {
    let text = text.trim();
    let result = match Parser::parse(text) {
        Some(expr) => eval(&expr, vars),
        None => Err(EvalError::Unsupported),
    };
    match result {
        Ok(value) => Ok(value),
        Err(EvalError::Fatal(message)) => Err(message),
        Err(EvalError::Unsupported) => substitute(text, vars).map(Value::Keyword),
    }
}

/// Replace `@{name}` occurrences with the variable's text.
pub fn interpolate(text: &str, vars: &dyn Variables) -> Result<String, String> {
    if !text.contains("@{") {
        return Ok(text.to_string());
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("@{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| format!("unclosed interpolation in '{}'", text))?;
        let name = &after[..end];
        let value = vars.lookup(name).ok_or_else(|| format!("undefined variable @{}", name))?;
        out.push_str(&value.to_interpolated());
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Replace `@name`, `@@name` and `@{name}` references with their CSS text,
/// leaving everything else as written.
pub fn substitute(text: &str, vars: &dyn Variables) -> Result<String, String> {
    let text = interpolate(text, vars)?;
    if !text.contains('@') {
        return Ok(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();
    let mut quote: Option<char> = None;

    while let Some((i, c)) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                out.push(c);
            }
            (Some(_), '\\') => {
                out.push(c);
                if let Some((_, next)) = chars.next() {
                    out.push(next);
                }
            }
            (None, '"' | '\'') => {
                quote = Some(c);
                out.push(c);
            }
            (None, '@') => {
                let indirect = text[i + 1..].starts_with('@');
                let name_start = i + 1 + usize::from(indirect);
                let name: String =
                    text[name_start..].chars().take_while(|&c| is_name_char(c)).collect();
                if name.is_empty() {
                    out.push(c);
                    continue;
                }
                let mut value = vars.lookup(&name).ok_or_else(|| format!("undefined variable @{}", name))?;
                if indirect {
                    let target = value.to_interpolated();
                    value = vars.lookup(&target).ok_or_else(|| format!("undefined variable @{}", target))?;
                }
                out.push_str(&value.to_css());
                let consumed = name_start + name.len();
                while chars.peek().is_some_and(|&(j, _)| j < consumed) {
                    chars.next();
                }
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Number(f64, String),
    Hash(String),
    Var(String),
    VarVar(String),
    Str { text: String, quote: char, escaped: bool },
    Ident(String),
    Func(String),
    Raw(RawKind, String),
    Punct(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawKind {
    /// `url(...)`: interpolation only
    Url,
    /// `calc(...)` and friends: variables substituted, no arithmetic
    Calc,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    tok: Tok,
    space_before: bool,
}

fn lex(text: &str) -> Option<Vec<Token>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;
    let mut space = false;

    while pos < bytes.len() {
        let c = text[pos..].chars().next()?;
        let start = pos;
        let tok = match c {
            c if c.is_whitespace() => {
                space = true;
                pos += c.len_utf8();
                continue;
            }
            '0'..='9' => lex_number(text, &mut pos)?,
            '.' if bytes.get(pos + 1).is_some_and(u8::is_ascii_digit) => lex_number(text, &mut pos)?,
            '#' => {
                pos += 1;
                pos += name_len(&text[pos..]);
                Tok::Hash(text[start..pos].to_string())
            }
            '@' => {
                let indirect = bytes.get(pos + 1) == Some(&b'@');
                pos += 1 + usize::from(indirect);
                let len = name_len(&text[pos..]);
                if len == 0 {
                    return None;
                }
                let name = text[pos..pos + len].to_string();
                pos += len;
                if indirect {
                    Tok::VarVar(name)
                } else {
                    Tok::Var(name)
                }
            }
            '"' | '\'' => lex_string(text, &mut pos, false)?,
            '~' if matches!(bytes.get(pos + 1), Some(b'"' | b'\'')) => {
                pos += 1;
                lex_string(text, &mut pos, true)?
            }
            '%' if bytes.get(pos + 1) == Some(&b'(') => {
                pos += 2;
                Tok::Func("%".to_string())
            }
            '+' | '-' | '*' | '/' | ',' | '(' | ')'
                if !(c == '-' && starts_ident(&text[pos + 1..])) =>
            {
                pos += 1;
                Tok::Punct(c)
            }
            c if c.is_alphabetic() || c == '_' || c == '-' => {
                pos += name_len(&text[pos..]);
                let name = &text[start..pos];
                if bytes.get(pos) == Some(&b'(') {
                    let lower = name.to_ascii_lowercase();
                    let raw = match lower.as_str() {
                        "url" => Some(RawKind::Url),
                        "calc" | "-webkit-calc" | "-moz-calc" | "expression" => Some(RawKind::Calc),
                        _ => None,
                    };
                    match raw {
                        Some(kind) => {
                            pos = balanced_end(text, pos)?;
                            Tok::Raw(kind, text[start..pos].to_string())
                        }
                        None => {
                            pos += 1;
                            Tok::Func(name.to_string())
                        }
                    }
                } else {
                    Tok::Ident(name.to_string())
                }
            }
            _ => return None,
        };
        tokens.push(Token { tok, space_before: space });
        space = false;
    }
    Some(tokens)
}

fn starts_ident(rest: &str) -> bool {
    rest.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_' || c == '-')
}

fn name_len(s: &str) -> usize {
    s.char_indices().find(|&(_, c)| !is_name_char(c)).map(|(i, _)| i).unwrap_or(s.len())
}

fn lex_number(text: &str, pos: &mut usize) -> Option<Tok> {
    let bytes = text.as_bytes();
    let start = *pos;
    while bytes.get(*pos).is_some_and(u8::is_ascii_digit) {
        *pos += 1;
    }
    if bytes.get(*pos) == Some(&b'.') && bytes.get(*pos + 1).is_some_and(u8::is_ascii_digit) {
        *pos += 1;
        while bytes.get(*pos).is_some_and(u8::is_ascii_digit) {
            *pos += 1;
        }
    }
    let value: f64 = text[start..*pos].parse().ok()?;
    let unit_start = *pos;
    if bytes.get(*pos) == Some(&b'%') {
        *pos += 1;
    } else {
        while bytes.get(*pos).is_some_and(u8::is_ascii_alphabetic) {
            *pos += 1;
        }
    }
    Some(Tok::Number(value, text[unit_start..*pos].to_string()))
}

fn lex_string(text: &str, pos: &mut usize, escaped: bool) -> Option<Tok> {
    let bytes = text.as_bytes();
    let quote = bytes[*pos];
    let start = *pos + 1;
    let mut i = start;
    loop {
        match bytes.get(i)? {
            b'\\' => i += 2,
            &b if b == quote => break,
            _ => i += 1,
        }
    }
    *pos = i + 1;
    Some(Tok::Str { text: text[start..i].to_string(), quote: quote as char, escaped })
}

/// Offset one past the parenthesis closing the one at `open`.
fn balanced_end(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) if b == b'\\' => i += 1,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i + 1);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64, String),
    Color(Color),
    Quoted { text: String, quote: char, escaped: bool },
    Keyword(String),
    Variable(String),
    Indirect(String),
    Raw(RawKind, String),
    Call(String, Vec<Expr>),
    Negate(Box<Expr>),
    Paren(Box<Expr>),
    Binary(char, Box<Expr>, Box<Expr>),
    Slash(Box<Expr>, Box<Expr>),
    List(Vec<Expr>, Separator),
}

impl Expr {
    /// Operands that make `/` a division.
    fn is_computed(&self) -> bool {
        match self {
            Expr::Variable(_) | Expr::Indirect(_) | Expr::Paren(_) | Expr::Binary(..) => true,
            Expr::Negate(inner) => inner.is_computed(),
            _ => false,
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    parens: usize,
}

impl Parser {
    fn parse(text: &str) -> Option<Expr> {
        let tokens = lex(text)?;
        if tokens.is_empty() {
            return Some(Expr::Keyword(String::new()));
        }
        let mut parser = Parser { tokens, pos: 0, parens: 0 };
        let expr = parser.comma_list()?;
        (parser.pos == parser.tokens.len()).then_some(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_punct(&self, p: char) -> bool {
        matches!(self.peek(), Some(Token { tok: Tok::Punct(c), .. }) if *c == p)
    }

    fn expect_close(&mut self) -> Option<()> {
        if self.peek_punct(')') {
            self.pos += 1;
            Some(())
        } else {
            None
        }
    }

    fn comma_list(&mut self) -> Option<Expr> {
        let mut items = vec![self.space_list()?];
        while self.peek_punct(',') {
            self.pos += 1;
            items.push(self.space_list()?);
        }
        Some(if items.len() == 1 { items.remove(0) } else { Expr::List(items, Separator::Comma) })
    }

    fn space_list(&mut self) -> Option<Expr> {
        let mut items = vec![self.additive()?];
        while self.peek().is_some() && !self.peek_punct(',') && !self.peek_punct(')') {
            items.push(self.additive()?);
        }
        Some(if items.len() == 1 { items.remove(0) } else { Expr::List(items, Separator::Space) })
    }

    /// `+`/`-` are binary unless written as a prefix: `1px -2px` is a list.
    fn binary_sign_at(&self) -> Option<char> {
        let op = self.peek()?;
        let c = match op.tok {
            Tok::Punct(c @ ('+' | '-')) => c,
            _ => return None,
        };
        let next = self.tokens.get(self.pos + 1)?;
        let prefix = op.space_before && !next.space_before;
        (!prefix).then_some(c)
    }

    fn additive(&mut self) -> Option<Expr> {
        let mut left = self.multiplicative()?;
        while let Some(op) = self.binary_sign_at() {
            self.pos += 1;
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Some(left)
    }

    fn multiplicative(&mut self) -> Option<Expr> {
        let mut left = self.unary()?;
        loop {
            if self.peek_punct('*') {
                self.pos += 1;
                let right = self.unary()?;
                left = Expr::Binary('*', Box::new(left), Box::new(right));
            } else if self.peek_punct('/') {
                self.pos += 1;
                let right = self.unary()?;
                left = if self.parens > 0 || left.is_computed() || right.is_computed() {
                    Expr::Binary('/', Box::new(left), Box::new(right))
                } else {
                    Expr::Slash(Box::new(left), Box::new(right))
                };
            } else {
                return Some(left);
            }
        }
    }

    fn unary(&mut self) -> Option<Expr> {
        if self.peek_punct('-') {
            self.pos += 1;
            return Some(Expr::Negate(Box::new(self.primary()?)));
        }
        if self.peek_punct('+') {
            self.pos += 1;
        }
        self.primary()
    }

    fn primary(&mut self) -> Option<Expr> {
        let token = self.tokens.get(self.pos)?.tok.clone();
        self.pos += 1;
        Some(match token {
            Tok::Number(value, unit) => Expr::Number(value, unit),
            Tok::Hash(text) => match Color::parse(&text) {
                Ok(color) => Expr::Color(color),
                Err(_) => Expr::Keyword(text),
            },
            Tok::Var(name) => Expr::Variable(name),
            Tok::VarVar(name) => Expr::Indirect(name),
            Tok::Str { text, quote, escaped } => Expr::Quoted { text, quote, escaped },
            Tok::Ident(name) => Expr::Keyword(name),
            Tok::Raw(kind, text) => Expr::Raw(kind, text),
            Tok::Func(name) => {
                let mut args = Vec::new();
                if !self.peek_punct(')') {
                    args.push(self.space_list()?);
                    while self.peek_punct(',') {
                        self.pos += 1;
                        args.push(self.space_list()?);
                    }
                }
                self.expect_close()?;
                Expr::Call(name, args)
            }
            Tok::Punct('(') => {
                self.parens += 1;
                let inner = self.comma_list()?;
                self.expect_close()?;
                self.parens -= 1;
                Expr::Paren(Box::new(inner))
            }
            Tok::Punct(_) => return None,
        })
    }
}

fn eval(expr: &Expr, vars: &dyn Variables) -> EvalResult {
    match expr {
        Expr::Number(value, unit) => Ok(Value::number(*value, unit)),
        Expr::Color(color) => Ok(Value::Color(color.clone())),
        Expr::Quoted { text, quote, escaped } => Ok(Value::Quoted {
            text: interpolate(text, vars).map_err(EvalError::Fatal)?,
            quote: *quote,
            escaped: *escaped,
        }),
        Expr::Keyword(word) => Ok(Value::keyword(word.clone())),
        Expr::Variable(name) => vars.lookup(name).ok_or_else(|| undefined(name)),
        Expr::Indirect(name) => {
            let target = vars.lookup(name).ok_or_else(|| undefined(name))?.to_interpolated();
            vars.lookup(&target).ok_or_else(|| undefined(&target))
        }
        Expr::Raw(RawKind::Url, text) => {
            interpolate(text, vars).map(Value::Keyword).map_err(EvalError::Fatal)
        }
        Expr::Raw(RawKind::Calc, text) => {
            substitute(text, vars).map(Value::Keyword).map_err(EvalError::Fatal)
        }
        Expr::Call(name, args) => {
            let args = args.iter().map(|a| eval(a, vars)).collect::<Result<Vec<_>, _>>()?;
            match call_function(name, &args)? {
                Some(value) => Ok(value),
                None => {
                    let printed: Vec<String> = args.iter().map(Value::to_css).collect();
                    Ok(Value::keyword(format!("{}({})", name, printed.join(", "))))
                }
            }
        }
        Expr::Negate(inner) => match eval(inner, vars)? {
            Value::Number { value, unit } => Ok(Value::Number { value: -value, unit }),
            Value::Keyword(word) => Ok(Value::Keyword(format!("-{}", word))),
            _ => Err(EvalError::Unsupported),
        },
        Expr::Paren(inner) => eval(inner, vars),
        Expr::Binary(op, left, right) => operate(*op, eval(left, vars)?, eval(right, vars)?),
        Expr::Slash(left, right) => {
            let mut items = Vec::new();
            for side in [left, right] {
                match eval(side, vars)? {
                    Value::List { items: inner, separator: Separator::Slash } => items.extend(inner),
                    other => items.push(other),
                }
            }
            Ok(Value::List { items, separator: Separator::Slash })
        }
        Expr::List(items, separator) => Ok(Value::List {
            items: items.iter().map(|i| eval(i, vars)).collect::<Result<_, _>>()?,
            separator: *separator,
        }),
    }
}

fn apply_op(op: char, a: f64, b: f64) -> Result<f64, EvalError> {
    match op {
        '+' => Ok(a + b),
        '-' => Ok(a - b),
        '*' => Ok(a * b),
        _ if b == 0.0 => Err(EvalError::Fatal("division by zero".to_string())),
        _ => Ok(a / b),
    }
}

fn operate(op: char, left: Value, right: Value) -> EvalResult {
    if let (Some((a, unit_a)), Some((b, unit_b))) = (left.as_number(), right.as_number()) {
        let unit = if unit_a.is_empty() { unit_b } else { unit_a };
        return Ok(Value::number(apply_op(op, a, b)?, unit));
    }

    let channels = |color: &Color, f: &dyn Fn(f64) -> Result<f64, EvalError>| {
        Ok::<_, EvalError>(Color::rgba(f(color.r)?, f(color.g)?, f(color.b)?, color.alpha))
    };

    match (left.as_color(), right.as_color(), left.as_number(), right.as_number()) {
        (Some(a), Some(b), _, _) => Ok(Value::Color(Color::rgba(
            apply_op(op, a.r, b.r)?,
            apply_op(op, a.g, b.g)?,
            apply_op(op, a.b, b.b)?,
            a.alpha,
        ))),
        (Some(a), None, _, Some((n, _))) => {
            Ok(Value::Color(channels(&a, &|c| apply_op(op, c, n))?))
        }
        (None, Some(b), Some((n, _)), _) => {
            Ok(Value::Color(channels(&b, &|c| apply_op(op, n, c))?))
        }
        _ => Err(EvalError::Unsupported),
    }
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

fn check_arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), EvalError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max { min.to_string() } else { format!("{}-{}", min, max) };
        return Err(EvalError::Fatal(format!(
            "{}() expects {} argument(s), got {}",
            name,
            expected,
            args.len()
        )));
    }
    Ok(())
}

fn color_arg(name: &str, value: &Value) -> Result<Color, EvalError> {
    value.as_color().ok_or_else(|| {
        EvalError::Fatal(format!("{}() expects a color, got '{}'", name, value.to_css()))
    })
}

fn number_arg(name: &str, value: &Value) -> Result<(f64, String), EvalError> {
    value.as_number().map(|(n, u)| (n, u.to_string())).ok_or_else(|| {
        EvalError::Fatal(format!("{}() expects a number, got '{}'", name, value.to_css()))
    })
}

/// Percentage argument as a fraction: `10%` and `10` both mean 0.1.
fn amount_arg(name: &str, value: &Value) -> Result<f64, EvalError> {
    Ok(number_arg(name, value)?.0 / 100.0)
}

fn channel(value: &Value) -> Option<f64> {
    match value.as_number()? {
        (n, "%") => Some(n * 255.0 / 100.0),
        (n, _) => Some(n),
    }
}

fn alpha(value: &Value) -> Option<f64> {
    match value.as_number()? {
        (n, "%") => Some(n / 100.0),
        (n, _) => Some(n),
    }
}

fn url_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            ' ' | '#' | '^' | '(' | ')' | '{' | '}' | '|' | ':' | '>' | '<' | ';' | ']' | '['
            | '=' | '"' | '\'' => {
                let mut buf = [0u8; 4];
                for b in c.encode_utf8(&mut buf).bytes() {
                    out.push_str(&format!("%{:02X}", b));
                }
            }
            c => out.push(c),
        }
    }
    out
}

/// Evaluate a built-in function. `Ok(None)` means the function is not
/// built in and the call is kept as CSS.
fn call_function(name: &str, args: &[Value]) -> Result<Option<Value>, EvalError> {
    let lower = name.to_ascii_lowercase();
    let value = match lower.as_str() {
        "darken" | "lighten" | "saturate" | "desaturate" | "fadein" | "fadeout" | "fade" | "spin" => {
            check_arity(&lower, args, 2, 3)?;
            let color = color_arg(&lower, &args[0])?;
            let (h, s, l) = color.to_hsl();
            let a = color.alpha;
            let result = match lower.as_str() {
                "darken" => Color::from_hsl(h, s, l - amount_arg(&lower, &args[1])?, a),
                "lighten" => Color::from_hsl(h, s, l + amount_arg(&lower, &args[1])?, a),
                "saturate" => Color::from_hsl(h, s + amount_arg(&lower, &args[1])?, l, a),
                "desaturate" => Color::from_hsl(h, s - amount_arg(&lower, &args[1])?, l, a),
                "spin" => Color::from_hsl(h + number_arg(&lower, &args[1])?.0, s, l, a),
                "fade" => Color::rgba(color.r, color.g, color.b, amount_arg(&lower, &args[1])?),
                "fadein" => Color::rgba(color.r, color.g, color.b, a + amount_arg(&lower, &args[1])?),
                _ => Color::rgba(color.r, color.g, color.b, a - amount_arg(&lower, &args[1])?),
            };
            Value::Color(result)
        }
        "mix" => {
            check_arity(&lower, args, 2, 3)?;
            let a = color_arg(&lower, &args[0])?;
            let b = color_arg(&lower, &args[1])?;
            let p = match args.get(2) {
                Some(weight) => amount_arg(&lower, weight)?,
                None => 0.5,
            };
            let w = p * 2.0 - 1.0;
            let alpha_delta = a.alpha - b.alpha;
            let weight = if w * alpha_delta == -1.0 {
                w
            } else {
                (w + alpha_delta) / (1.0 + w * alpha_delta)
            };
            let w1 = (weight + 1.0) / 2.0;
            let w2 = 1.0 - w1;
            Value::Color(Color::rgba(
                a.r * w1 + b.r * w2,
                a.g * w1 + b.g * w2,
                a.b * w1 + b.b * w2,
                a.alpha * p + b.alpha * (1.0 - p),
            ))
        }
        "rgb" | "rgba" => {
            if args.len() == 2 {
                match (args[0].as_color(), alpha(&args[1])) {
                    (Some(c), Some(a)) => Value::Color(Color::rgba(c.r, c.g, c.b, a)),
                    _ => return Ok(None),
                }
            } else if args.len() == 3 || args.len() == 4 {
                let channels: Option<Vec<f64>> = args[..3].iter().map(channel).collect();
                let a = match args.get(3) {
                    Some(v) => alpha(v),
                    None => Some(1.0),
                };
                match (channels, a) {
                    (Some(c), Some(a)) => Value::Color(Color::rgba(c[0], c[1], c[2], a)),
                    _ => return Ok(None),
                }
            } else {
                return Ok(None);
            }
        }
        "hsl" | "hsla" => {
            if args.len() != 3 && args.len() != 4 {
                return Ok(None);
            }
            let numbers: Option<Vec<f64>> = args[..3].iter().map(|v| v.as_number().map(|n| n.0)).collect();
            let a = match args.get(3) {
                Some(v) => alpha(v),
                None => Some(1.0),
            };
            match (numbers, a) {
                (Some(n), Some(a)) => {
                    Value::Color(Color::from_hsl(n[0], n[1] / 100.0, n[2] / 100.0, a))
                }
                _ => return Ok(None),
            }
        }
        "argb" => {
            check_arity(&lower, args, 1, 1)?;
            let c = color_arg(&lower, &args[0])?;
            Value::keyword(format!(
                "#{:02x}{:02x}{:02x}{:02x}",
                (c.alpha * 255.0).round() as u8,
                c.r.round() as u8,
                c.g.round() as u8,
                c.b.round() as u8
            ))
        }
        "percentage" => {
            check_arity(&lower, args, 1, 1)?;
            Value::number(number_arg(&lower, &args[0])?.0 * 100.0, "%")
        }
        "round" | "ceil" | "floor" | "abs" => {
            check_arity(&lower, args, 1, if lower == "round" { 2 } else { 1 })?;
            let (n, unit) = number_arg(&lower, &args[0])?;
            let result = match lower.as_str() {
                "round" => {
                    let places = match args.get(1) {
                        Some(p) => number_arg(&lower, p)?.0,
                        None => 0.0,
                    };
                    let factor = 10f64.powi(places as i32);
                    (n * factor).round() / factor
                }
                "ceil" => n.ceil(),
                "floor" => n.floor(),
                _ => n.abs(),
            };
            Value::Number { value: result, unit }
        }
        "unit" => {
            check_arity(&lower, args, 1, 2)?;
            let (n, _) = number_arg(&lower, &args[0])?;
            let unit = args.get(1).map(Value::to_interpolated).unwrap_or_default();
            Value::Number { value: n, unit }
        }
        "e" => {
            check_arity(&lower, args, 1, 1)?;
            Value::keyword(args[0].to_interpolated())
        }
        "escape" => {
            check_arity(&lower, args, 1, 1)?;
            Value::keyword(url_encode(&args[0].to_interpolated()))
        }
        "%" => {
            let Some((format, rest)) = args.split_first() else {
                return Err(EvalError::Fatal("%() expects a format string".to_string()));
            };
            let (text, quote) = match format {
                Value::Quoted { text, quote, .. } => (text.clone(), *quote),
                other => (other.to_css(), '"'),
            };
            let mut out = String::with_capacity(text.len());
            let mut rest = rest.iter();
            let mut chars = text.chars().peekable();
            while let Some(c) = chars.next() {
                let spec = if c == '%' { chars.peek().copied() } else { None };
                match spec {
                    Some(s @ ('d' | 'a' | 's' | 'D' | 'A' | 'S')) => {
                        chars.next();
                        let arg = rest.next().map(|v| {
                            if s.eq_ignore_ascii_case(&'s') {
                                v.to_interpolated()
                            } else {
                                v.to_css()
                            }
                        });
                        let arg = arg.unwrap_or_default();
                        if s.is_ascii_uppercase() {
                            out.push_str(&url_encode(&arg));
                        } else {
                            out.push_str(&arg);
                        }
                    }
                    _ => out.push(c),
                }
            }
            Value::Quoted { text: out, quote, escaped: false }
        }
        "iscolor" => Value::boolean(args.first().is_some_and(|v| v.as_color().is_some())),
        "isnumber" => Value::boolean(args.first().is_some_and(|v| v.as_number().is_some())),
        "isstring" => Value::boolean(matches!(args.first(), Some(Value::Quoted { .. }))),
        "iskeyword" => Value::boolean(matches!(args.first(), Some(Value::Keyword(k)) if !k.contains('('))),
        "isurl" => Value::boolean(matches!(args.first(), Some(Value::Keyword(k)) if k.to_ascii_lowercase().starts_with("url("))),
        "ispixel" | "ispercentage" | "isem" => {
            let unit = match lower.as_str() {
                "ispixel" => "px",
                "ispercentage" => "%",
                _ => "em",
            };
            Value::boolean(args.first().and_then(Value::as_number).is_some_and(|(_, u)| u == unit))
        }
        "isunit" => {
            check_arity(&lower, args, 2, 2)?;
            let unit = args[1].to_interpolated();
            Value::boolean(args[0].as_number().is_some_and(|(_, u)| u == unit))
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}
