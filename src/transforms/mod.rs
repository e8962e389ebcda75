//! Transform chain for bundle payloads.
//!
//! A bundle's sources are concatenated into an [`Asset`] and passed through
//! an ordered list of [`TransformStep`]s chosen by asset kind:
//!
//! - scripts: [`StripDebug`] → [`MinifyScript`] → [`EmitSourceMap`]
//! - stylesheets: [`CompileLess`] → [`MinifyCss`]
//!
//! Steps are pure: they read the asset and return a new one. The only file
//! access in the chain is LESS `@import` resolution.

pub mod compile_less;
pub mod concat;
pub mod lexer;
pub mod minify_script;
pub mod minify_style;
pub mod sourcemap;
pub mod strip_debug;

pub use compile_less::CompileLess;
pub use minify_script::MinifyScript;
pub use minify_style::MinifyCss;
pub use sourcemap::{EmitSourceMap, SourceMap};
pub use strip_debug::StripDebug;

use crate::config::SourceMapMode;
use crate::registry::{AssetKind, Bundle, SourceFile};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// A source file's byte range within the concatenated stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// File the bytes came from
    pub source: SourceFile,
    /// Byte offset of the first byte in the stream
    pub start: usize,
    /// Length in bytes
    pub len: usize,
}

impl Segment {
    /// Byte offset one past the last byte.
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Zero-based line and UTF-16 column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Position {
    /// Line, starting at 0
    pub line: u32,
    /// Column in UTF-16 code units, starting at 0
    pub column: u32,
}

/// Links a position in the generated code to a byte in the concatenated input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    /// Position in `Asset::code`
    pub generated: Position,
    /// Byte offset in `Asset::original`
    pub offset: usize,
}

/// Where a byte of the concatenated stream came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin<'a> {
    /// Index into `Asset::segments`
    pub segment: usize,
    /// Source file
    pub source: &'a SourceFile,
    /// Zero-based line within the source file
    pub line: usize,
    /// Zero-based UTF-16 column within the line
    pub column: usize,
}

/// Payload passed between transform steps.
#[derive(Debug, Clone)]
pub struct Asset {
    /// Output file name
    pub name: String,
    /// Current code
    pub code: String,
    /// The concatenated input exactly as read
    pub original: Arc<str>,
    /// Per-file ranges of `original`
    pub segments: Vec<Segment>,
    /// Generated-to-input mappings, set by the script minifier
    pub mappings: Vec<Mapping>,
    /// Source map JSON to write next to the output, if any
    pub source_map: Option<String>,
}

impl Asset {
    /// Index of the segment containing a byte offset of the concatenated input.
    pub fn origin_segment(&self, offset: usize) -> Option<usize> {
        let index = match self.segments.binary_search_by(|s| s.start.cmp(&offset)) {
            Ok(i) => i,
            Err(0) => return None,
            Err(i) => i - 1,
        };
        // Empty files share a start offset with their successor
        let index = (index..self.segments.len())
            .take_while(|&i| self.segments[i].start <= offset)
            .filter(|&i| offset < self.segments[i].end() || i + 1 == self.segments.len())
            .last()
            .unwrap_or(index);
        (offset <= self.segments[index].end()).then_some(index)
    }

    /// Locate a byte offset of the concatenated input.
    pub fn origin(&self, offset: usize) -> Option<Origin<'_>> {
        let index = self.origin_segment(offset)?;
        let segment = &self.segments[index];

        let before = self.original.get(segment.start..offset)?;
        let line = before.matches('\n').count();
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = before[line_start..].encode_utf16().count();

        Some(Origin { segment: index, source: &segment.source, line, column })
    }

    /// Display path and 1-based line for an offset, for error messages.
    pub fn describe(&self, offset: usize) -> (Option<PathBuf>, Option<usize>) {
        match self.origin(offset) {
            Some(origin) => (Some(PathBuf::from(&origin.source.display)), Some(origin.line + 1)),
            None => (None, None),
        }
    }
}

/// Error raised by a transform step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{step}: {message}")]
pub struct TransformError {
    /// Step that failed
    pub step: &'static str,
    /// Description
    pub message: String,
    /// Source file the error maps to, when known
    pub file: Option<PathBuf>,
    /// 1-based line in `file`, when known
    pub line: Option<usize>,
}

impl TransformError {
    /// Create an error without a source location.
    pub fn new(step: &'static str, message: impl Into<String>) -> Self {
        Self { step, message: message.into(), file: None, line: None }
    }

    /// Create an error located at a byte offset of the asset's input.
    pub fn at(step: &'static str, message: impl Into<String>, asset: &Asset, offset: usize) -> Self {
        let (file, line) = asset.describe(offset);
        Self { step, message: message.into(), file, line }
    }
}

/// A named, stateless operation on an asset.
pub trait TransformStep: Send + Sync {
    /// Step name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Transform the asset.
    fn apply(&self, asset: Asset) -> Result<Asset, TransformError>;
}

/// Ordered list of steps for one bundle.
pub struct TransformChain {
    steps: Vec<Box<dyn TransformStep>>,
}

impl std::fmt::Debug for TransformChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl TransformChain {
    /// Create a chain from explicit steps.
    pub fn new(steps: Vec<Box<dyn TransformStep>>) -> Self {
        Self { steps }
    }

    /// The fixed chain for a bundle's asset kind.
    pub fn for_bundle(bundle: &Bundle) -> Self {
        let steps: Vec<Box<dyn TransformStep>> = match bundle.kind() {
            AssetKind::Script => {
                let mut steps: Vec<Box<dyn TransformStep>> =
                    vec![Box::new(StripDebug), Box::new(MinifyScript)];
                if bundle.wants_source_map() {
                    let url = match bundle.source_map {
                        SourceMapMode::Inline => None,
                        _ => Some(bundle.map_url()),
                    };
                    steps.push(Box::new(EmitSourceMap::new(url)));
                }
                steps
            }
            AssetKind::Style => vec![
                Box::new(CompileLess::new(bundle.vendor_dir.clone())),
                Box::new(MinifyCss),
            ],
        };
        Self { steps }
    }

    /// Names of the steps in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step in order, stopping at the first error.
    pub fn run(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        for step in &self.steps {
            let before = asset.code.len();
            asset = step.apply(asset)?;
            debug!(step = step.name(), asset = %asset.name, before, after = asset.code.len(), "transform applied");
        }
        Ok(asset)
    }
}
