//! CSS minification backed by lightningcss.
//!
//! IE property hacks such as `*zoom: 1` do not parse; they are dropped with
//! a warning instead of failing the bundle.

use super::{Asset, TransformError, TransformStep};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Transform step that minifies compiled CSS.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinifyCss;

impl TransformStep for MinifyCss {
    fn name(&self) -> &'static str {
        "minify-css"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        let sources: Vec<&str> = asset.segments.iter().map(|s| s.source.display.as_str()).collect();
        let minified = minify_css(&asset.code, &asset.name).map_err(|message| {
            TransformError::new(self.name(), format!("{} (sources: {})", message, sources.join(", ")))
        })?;
        for dropped in &minified.dropped {
            warn!(output = %asset.name, sources = ?sources, "dropped unparsable css: {}", dropped);
        }
        asset.code = minified.code;
        Ok(asset)
    }
}

/// Result of [`minify_css`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Minified {
    /// Minified stylesheet
    pub code: String,
    /// One description per hack declaration that was skipped
    pub dropped: Vec<String>,
}

/// Parse, optimize and print a stylesheet without whitespace.
///
/// Property hacks (`*zoom: 1`, `_height: 1px`) on their own line are skipped
/// and listed in `dropped`. Any other invalid CSS is an error.
pub fn minify_css(code: &str, filename: &str) -> Result<Minified, String> {
    let warnings = Arc::new(RwLock::new(Vec::new()));
    let options = ParserOptions {
        filename: filename.to_string(),
        error_recovery: true,
        warnings: Some(Arc::clone(&warnings)),
        ..ParserOptions::default()
    };
    let mut sheet = StyleSheet::parse(code, options).map_err(|e| e.to_string())?;

    let mut dropped = Vec::new();
    if let Ok(warnings) = warnings.read() {
        for warning in warnings.iter() {
            let line = warning.loc.as_ref().and_then(|loc| code.lines().nth(loc.line as usize));
            match line.map(str::trim) {
                Some(text) if is_property_hack(text) => dropped.push(format!("`{}`: {}", text, warning)),
                _ => return Err(warning.to_string()),
            }
        }
    }

    sheet.minify(MinifyOptions::default()).map_err(|e| e.to_string())?;
    let printed = sheet
        .to_css(PrinterOptions { minify: true, ..PrinterOptions::default() })
        .map_err(|e| e.to_string())?;
    Ok(Minified { code: printed.code, dropped })
}

/// A single declaration whose property carries an IE `*` or `_` prefix.
fn is_property_hack(line: &str) -> bool {
    let Some(rest) = line.strip_prefix(['*', '_']) else {
        return false;
    };
    match rest.split_once(':') {
        Some((property, _)) => {
            !property.is_empty()
                && property.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
                && !line.contains(['{', '}'])
        }
        None => false,
    }
}
