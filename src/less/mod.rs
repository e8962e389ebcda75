//! LESS stylesheet compiler.
//!
//! Compiles the subset of LESS used by front-end bundles into plain CSS:
//! variables, nested rules with `&`, mixins (parametric, guarded,
//! namespaced), operations and colour functions, `@import` with options,
//! `@media` bubbling and `:extend`.
//!
//! The input is usually several files concatenated into one text; a list
//! of [`SourceSpan`]s maps offsets back to the file they came from so that
//! errors name the right file and line.

pub mod color;
mod eval;
pub mod parser;
pub mod value;

use std::path::PathBuf;
use thiserror::Error;

pub use color::{Color, ColorError};
pub use value::{Separator, Value, Variables};

/// Start of one input file within the text being compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpan {
    /// Byte offset where the file's content starts
    pub start: usize,
    /// Path used to resolve relative imports
    pub path: PathBuf,
    /// Path shown in error messages
    pub display: String,
}

/// Compiler options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LessOptions {
    /// Directory searched for `~` imports and as an import fallback
    pub vendor_dir: PathBuf,
}

/// Compilation failure with the location it was detected at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct LessError {
    /// Description
    pub message: String,
    /// File the error is in
    pub file: Option<String>,
    /// 1-based line in that file
    pub line: Option<usize>,
}

/// Compile LESS text to CSS.
pub fn compile(text: &str, spans: &[SourceSpan], options: &LessOptions) -> Result<String, LessError> {
    eval::Evaluator::new(options).compile(text, spans.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(parts: &[(&str, usize)]) -> Vec<SourceSpan> {
        parts
            .iter()
            .map(|(name, start)| SourceSpan {
                start: *start,
                path: PathBuf::from(name),
                display: name.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_compile_without_spans() {
        let css = compile("@w: 10px; a { width: @w * 2 }", &[], &LessOptions::default()).unwrap();
        assert_eq!(css, "a {\n  width: 20px;\n}\n");
    }

    #[test]
    fn test_error_points_at_second_file() {
        let first = "@c: red;\n.a { color: @c; }\n";
        let second = "\n.b {\n  color: @missing;\n}\n";
        let text = format!("{}{}", first, second);
        let err = compile(&text, &spans(&[("a.less", 0), ("b.less", first.len())]), &LessOptions::default())
            .unwrap_err();
        assert_eq!(err.message, "undefined variable @missing");
        assert_eq!(err.file.as_deref(), Some("b.less"));
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn test_parse_error_location() {
        let err = compile("a {\n  color: red;\n", &spans(&[("site.less", 0)]), &LessOptions::default())
            .unwrap_err();
        assert_eq!(err.message, "missing closing '}'");
        assert_eq!(err.file.as_deref(), Some("site.less"));
        assert_eq!(err.line, Some(1));
    }
}
