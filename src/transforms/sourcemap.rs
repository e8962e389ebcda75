//! Source map v3 generation for minified scripts.

use super::{Asset, Mapping, TransformError, TransformStep};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use std::collections::HashMap;

/// A version 3 source map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    /// Always 3
    pub version: u8,
    /// Generated file name
    pub file: String,
    /// Source paths as configured
    pub sources: Vec<String>,
    /// Original content of each source
    pub sources_content: Vec<String>,
    /// Symbol names (unused, identifiers are never renamed)
    pub names: Vec<String>,
    /// Base64 VLQ encoded mappings
    pub mappings: String,
}

impl SourceMap {
    /// Build a map from the asset's minifier mappings.
    pub fn from_asset(asset: &Asset) -> Self {
        let mut sources: Vec<String> = Vec::new();
        let mut sources_content: Vec<String> = Vec::new();
        let mut source_index: HashMap<&str, usize> = HashMap::new();
        let mut segment_source = Vec::with_capacity(asset.segments.len());

        for segment in &asset.segments {
            let display = segment.source.display.as_str();
            let index = *source_index.entry(display).or_insert_with(|| {
                sources.push(display.to_string());
                sources_content
                    .push(asset.original[segment.start..segment.end()].to_string());
                sources.len() - 1
            });
            segment_source.push(index);
        }

        let mut locator = Locator::new(asset);
        let mut encoder = MappingsEncoder::default();
        for mapping in &asset.mappings {
            if let Some((segment, line, column)) = locator.locate(mapping.offset) {
                encoder.add(mapping, segment_source[segment], line, column);
            }
        }

        Self {
            version: 3,
            file: asset.name.clone(),
            sources,
            sources_content,
            names: Vec::new(),
            mappings: encoder.finish(),
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Resolves input offsets to (segment, line, column) in increasing order
/// without rescanning from the start of each file.
struct Locator<'a> {
    asset: &'a Asset,
    /// Offsets at which each line of the concatenated input starts
    line_starts: Vec<usize>,
    /// Last resolved (offset, line start, column) for incremental columns
    cursor: Option<(usize, usize, u32)>,
}

impl<'a> Locator<'a> {
    fn new(asset: &'a Asset) -> Self {
        let line_starts = std::iter::once(0)
            .chain(asset.original.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { asset, line_starts, cursor: None }
    }

    fn line_of(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line - 1,
        }
    }

    fn locate(&mut self, offset: usize) -> Option<(usize, u32, u32)> {
        let origin = self.asset.origin_segment(offset)?;
        let segment = &self.asset.segments[origin];

        let line = self.line_of(offset);
        let segment_line = self.line_of(segment.start);
        let line_start = self.line_starts[line].max(segment.start);

        let column = match self.cursor {
            Some((last, start, column)) if start == line_start && last <= offset => {
                column + utf16_len(&self.asset.original[last..offset])
            }
            _ => utf16_len(&self.asset.original[line_start..offset]),
        };
        self.cursor = Some((offset, line_start, column));

        Some((origin, (line - segment_line) as u32, column))
    }
}

fn utf16_len(s: &str) -> u32 {
    if s.is_ascii() {
        s.len() as u32
    } else {
        s.encode_utf16().count() as u32
    }
}

/// Incremental encoder for the `mappings` field.
#[derive(Default)]
struct MappingsEncoder {
    out: String,
    generated_line: u32,
    generated_column: u32,
    source: i64,
    original_line: i64,
    original_column: i64,
    line_has_segment: bool,
}

impl MappingsEncoder {
    fn add(&mut self, mapping: &Mapping, source: usize, line: u32, column: u32) {
        let generated = mapping.generated;
        while self.generated_line < generated.line {
            self.out.push(';');
            self.generated_line += 1;
            self.generated_column = 0;
            self.line_has_segment = false;
        }
        if self.line_has_segment {
            self.out.push(',');
        }
        self.line_has_segment = true;

        encode_vlq(i64::from(generated.column) - i64::from(self.generated_column), &mut self.out);
        encode_vlq(source as i64 - self.source, &mut self.out);
        encode_vlq(i64::from(line) - self.original_line, &mut self.out);
        encode_vlq(i64::from(column) - self.original_column, &mut self.out);

        self.generated_column = generated.column;
        self.source = source as i64;
        self.original_line = i64::from(line);
        self.original_column = i64::from(column);
    }

    fn finish(self) -> String {
        self.out
    }
}

const BASE64_DIGITS: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Append one base64 VLQ value.
pub fn encode_vlq(value: i64, out: &mut String) {
    let mut vlq = if value < 0 { ((-value) << 1) | 1 } else { value << 1 };
    loop {
        let mut digit = (vlq & 0b11111) as usize;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0b100000;
        }
        out.push(BASE64_DIGITS[digit] as char);
        if vlq == 0 {
            break;
        }
    }
}

/// Transform step that attaches a source map to a minified script.
///
/// With a URL the map is kept on the asset for writing next to the output
/// and a `sourceMappingURL` comment points at it. Without one the map is
/// embedded as a base64 data URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitSourceMap {
    url: Option<String>,
}

impl EmitSourceMap {
    /// Create the step; `None` embeds the map inline.
    pub fn new(url: Option<String>) -> Self {
        Self { url }
    }
}

impl TransformStep for EmitSourceMap {
    fn name(&self) -> &'static str {
        "source-map"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        let json = SourceMap::from_asset(&asset)
            .to_json()
            .map_err(|e| TransformError::new(self.name(), e.to_string()))?;

        match &self.url {
            Some(url) => {
                asset.code.push_str(&format!("\n//# sourceMappingURL={}\n", url));
                asset.source_map = Some(json);
            }
            None => {
                asset.code.push_str(&format!(
                    "\n//# sourceMappingURL=data:application/json;charset=utf-8;base64,{}\n",
                    STANDARD.encode(json.as_bytes())
                ));
                asset.source_map = None;
            }
        }
        Ok(asset)
    }
}
