//! Concatenation of a bundle's sources into one asset.

use super::{Asset, Segment};
use crate::registry::SourceFile;
use std::sync::Arc;

impl Asset {
    /// Join file contents in order, with no separator.
    ///
    /// A file that does not end in a newline continues on the same line as
    /// the next file's first line; segments keep exact byte ranges so
    /// attribution is unaffected. A leading byte order mark is dropped.
    pub fn concat(name: &str, parts: Vec<(SourceFile, String)>) -> Asset {
        let total: usize = parts.iter().map(|(_, text)| text.len()).sum();
        let mut code = String::with_capacity(total);
        let mut segments = Vec::with_capacity(parts.len());

        for (source, text) in parts {
            let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
            segments.push(Segment { source, start: code.len(), len: text.len() });
            code.push_str(text);
        }

        Asset {
            name: name.to_string(),
            original: Arc::from(code.as_str()),
            code,
            segments,
            mappings: Vec::new(),
            source_map: None,
        }
    }

    /// Whether the asset came from no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }
}
