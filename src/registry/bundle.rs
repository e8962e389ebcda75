//! Bundle identity and definition types.

use crate::config::SourceMapMode;
use std::fmt;
use std::path::{Path, PathBuf};

/// The kind of asset a bundle produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKind {
    /// JavaScript, concatenated and minified
    Script,
    /// LESS compiled to minified CSS
    Style,
}

impl AssetKind {
    /// All kinds in registry order.
    pub const ALL: [AssetKind; 2] = [AssetKind::Script, AssetKind::Style];

    /// Textual form used in bundle ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Script => "script",
            AssetKind::Style => "style",
        }
    }

    /// Parse a kind name, accepting common aliases.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "script" | "scripts" | "js" => Some(AssetKind::Script),
            "style" | "styles" | "css" | "less" => Some(AssetKind::Style),
            _ => None,
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry key for a bundle, written `kind:name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BundleId {
    /// Asset kind
    pub kind: AssetKind,
    /// Bundle name, unique within its kind
    pub name: String,
}

impl BundleId {
    /// Create a bundle id.
    pub fn new(kind: AssetKind, name: impl Into<String>) -> Self {
        Self { kind, name: name.into() }
    }

    /// Parse a qualified `kind:name` id.
    ///
    /// Returns `None` for bare names or unknown kinds.
    pub fn parse(s: &str) -> Option<Self> {
        let (kind, name) = s.split_once(':')?;
        let kind = AssetKind::parse(kind)?;
        if name.is_empty() {
            return None;
        }
        Some(Self::new(kind, name))
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// One input file of a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Resolved path on disk
    pub path: PathBuf,
    /// Path as written in configuration, used in messages and source maps
    pub display: String,
}

impl SourceFile {
    /// Resolve a configured source entry.
    ///
    /// Entries starting with `~` live in the vendor directory; absolute paths
    /// are kept; anything else is relative to the source root.
    pub fn resolve(entry: &str, source_root: &Path, vendor_dir: &Path) -> Self {
        let path = if let Some(vendored) = entry.strip_prefix('~') {
            vendor_dir.join(vendored.trim_start_matches('/'))
        } else {
            let p = Path::new(entry);
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                source_root.join(p)
            }
        };
        Self { path, display: entry.to_string() }
    }
}

/// A named, ordered group of sources compiled to one artifact.
#[derive(Debug, Clone)]
pub struct Bundle {
    /// Registry key
    pub id: BundleId,
    /// Sources in concatenation order
    pub sources: Vec<SourceFile>,
    /// Output file name
    pub output_name: String,
    /// Directory the output is written to
    pub output_dir: PathBuf,
    /// Source map emission (scripts only)
    pub source_map: SourceMapMode,
    /// Directory source maps are written to
    pub maps_dir: PathBuf,
    /// URL prefix of the map as seen from the output file
    pub maps_url: String,
    /// Vendor directory for `~` imports
    pub vendor_dir: PathBuf,
}

impl Bundle {
    /// Asset kind of this bundle.
    pub fn kind(&self) -> AssetKind {
        self.id.kind
    }

    /// Full path of the output artifact.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_name)
    }

    /// Full path of the source map, if this bundle writes one to disk.
    pub fn map_path(&self) -> Option<PathBuf> {
        match (self.kind(), self.source_map) {
            (AssetKind::Script, SourceMapMode::File) => {
                Some(self.maps_dir.join(format!("{}.map", self.output_name)))
            }
            _ => None,
        }
    }

    /// Whether the script chain should produce a source map.
    pub fn wants_source_map(&self) -> bool {
        self.kind() == AssetKind::Script && self.source_map != SourceMapMode::None
    }

    /// The `sourceMappingURL` value for a file-based map.
    pub fn map_url(&self) -> String {
        let prefix = self.maps_url.trim_end_matches('/');
        if prefix.is_empty() || prefix == "." {
            format!("{}.map", self.output_name)
        } else {
            format!("{}/{}.map", prefix, self.output_name)
        }
    }
}
