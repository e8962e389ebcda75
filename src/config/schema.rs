//! Configuration schema types for `assets.toml`
//!
//! Defines the structure and validation rules for asset pipeline configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;

/// How a script bundle's source map is emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceMapMode {
    /// Separate `.map` file under the maps directory
    #[default]
    File,
    /// Base64 data URL appended to the script
    Inline,
    /// No source map
    None,
}

/// Directory layout section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the site's own script and stylesheet sources
    #[serde(default = "default_source_root")]
    pub source_root: PathBuf,
    /// Output directory for script bundles
    #[serde(default = "default_script_out")]
    pub script_out: PathBuf,
    /// Output directory for stylesheet bundles
    #[serde(default = "default_style_out")]
    pub style_out: PathBuf,
    /// Third-party library directory, addressed with a `~` prefix
    #[serde(default = "default_vendor_dir")]
    pub vendor_dir: PathBuf,
    /// Source map directory, relative to `script_out`
    #[serde(default = "default_maps_dir")]
    pub maps_dir: PathBuf,
}

fn default_source_root() -> PathBuf {
    PathBuf::from("opac/webapp/static")
}

fn default_script_out() -> PathBuf {
    PathBuf::from("opac/webapp/static/js")
}

fn default_style_out() -> PathBuf {
    PathBuf::from("opac/webapp/static/css")
}

fn default_vendor_dir() -> PathBuf {
    PathBuf::from("node_modules")
}

fn default_maps_dir() -> PathBuf {
    PathBuf::from("../maps")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source_root: default_source_root(),
            script_out: default_script_out(),
            style_out: default_style_out(),
            vendor_dir: default_vendor_dir(),
            maps_dir: default_maps_dir(),
        }
    }
}

/// A single bundle definition (`[[script]]` or `[[style]]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Bundle name, unique within its kind
    pub name: String,
    /// Output file name written to the kind's output directory
    pub output: String,
    /// Source files in concatenation order
    pub sources: Vec<String>,
    /// Source map emission (scripts only)
    #[serde(default)]
    pub source_map: SourceMapMode,
}

impl BundleConfig {
    /// Create a bundle definition with the default source map mode.
    pub fn new(name: &str, output: &str, sources: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            output: output.to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            source_map: SourceMapMode::default(),
        }
    }
}

/// A named set of globs that triggers rebuilds of a bundle group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchGroupConfig {
    /// Group name used in log output
    pub name: String,
    /// Glob patterns, relative to `paths.source_root`
    pub globs: Vec<String>,
    /// Bundle selectors (`script:*`, `style:name`, bare names)
    pub bundles: Vec<String>,
}

/// Watch mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce delay in milliseconds; 0 rebuilds on every event
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u32,
    /// Clear terminal between rebuilds
    #[serde(default)]
    pub clear_screen: bool,
    /// Bundle groups and the globs that trigger them
    #[serde(default = "default_watch_groups")]
    pub groups: Vec<WatchGroupConfig>,
}

fn default_debounce_ms() -> u32 {
    100
}

fn default_watch_groups() -> Vec<WatchGroupConfig> {
    vec![
        WatchGroupConfig {
            name: "styles".to_string(),
            globs: vec!["less/*.less".to_string()],
            bundles: vec!["style:*".to_string()],
        },
        WatchGroupConfig {
            name: "scripts".to_string(),
            globs: vec!["js/*.js".to_string()],
            bundles: vec!["script:*".to_string()],
        },
    ]
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: default_debounce_ms(), clear_screen: false, groups: default_watch_groups() }
    }
}

/// Complete `assets.toml` configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetsConfig {
    /// Directory layout
    #[serde(default)]
    pub paths: PathsConfig,
    /// Watch mode settings
    #[serde(default)]
    pub watch: WatchConfig,
    /// Script bundles, in registry order
    #[serde(default, rename = "script")]
    pub scripts: Vec<BundleConfig>,
    /// Stylesheet bundles, in registry order
    #[serde(default, rename = "style")]
    pub styles: Vec<BundleConfig>,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "script.scielo-bundle.sources")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "assets.toml: '{}' {}", self.field, self.message)
    }
}

fn bundle_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid regex"))
}

impl AssetsConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        validate_bundles("script", &self.scripts, &mut errors);
        validate_bundles("style", &self.styles, &mut errors);

        let mut group_names = HashSet::new();
        for group in &self.watch.groups {
            let field = format!("watch.groups.{}", group.name);
            if group.name.is_empty() {
                errors.push(ConfigValidationError {
                    field: "watch.groups".to_string(),
                    message: "group name must be a non-empty string".to_string(),
                });
            } else if !group_names.insert(group.name.as_str()) {
                errors.push(ConfigValidationError {
                    field: field.clone(),
                    message: "is defined more than once".to_string(),
                });
            }
            if group.globs.is_empty() {
                errors.push(ConfigValidationError {
                    field: format!("{}.globs", field),
                    message: "must contain at least one glob pattern".to_string(),
                });
            }
            for pattern in &group.globs {
                if let Err(e) = glob::Pattern::new(pattern) {
                    errors.push(ConfigValidationError {
                        field: format!("{}.globs", field),
                        message: format!("invalid glob '{}': {}", pattern, e),
                    });
                }
            }
            if group.bundles.is_empty() {
                errors.push(ConfigValidationError {
                    field: format!("{}.bundles", field),
                    message: "must select at least one bundle".to_string(),
                });
            }
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

fn validate_bundles(kind: &str, bundles: &[BundleConfig], errors: &mut Vec<ConfigValidationError>) {
    let mut seen = HashSet::new();

    for bundle in bundles {
        let field = format!("{}.{}", kind, bundle.name);

        if !bundle_name_pattern().is_match(&bundle.name) {
            errors.push(ConfigValidationError {
                field: kind.to_string(),
                message: format!(
                    "invalid bundle name '{}' (letters, digits, '.', '_' and '-' only)",
                    bundle.name
                ),
            });
        } else if !seen.insert(bundle.name.as_str()) {
            errors.push(ConfigValidationError {
                field: field.clone(),
                message: "is defined more than once".to_string(),
            });
        }

        if bundle.sources.is_empty() {
            errors.push(ConfigValidationError {
                field: format!("{}.sources", field),
                message: "must contain at least one source file".to_string(),
            });
        }

        if bundle.output.is_empty() || bundle.output.contains(['/', '\\']) {
            errors.push(ConfigValidationError {
                field: format!("{}.output", field),
                message: "must be a plain file name".to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_parse() {
        let config: AssetsConfig = toml::from_str("").unwrap();
        assert_eq!(config.paths.source_root, PathBuf::from("opac/webapp/static"));
        assert_eq!(config.paths.maps_dir, PathBuf::from("../maps"));
        assert!(config.scripts.is_empty());
        assert!(config.styles.is_empty());
        assert_eq!(config.watch.debounce_ms, 100);
        assert_eq!(config.watch.groups.len(), 2);
    }

    #[test]
    fn test_full_config_parse() {
        let toml = r#"
[paths]
source_root = "static"
script_out = "dist/js"
style_out = "dist/css"
vendor_dir = "vendor"
maps_dir = "maps"

[watch]
debounce_ms = 0
clear_screen = true

[[watch.groups]]
name = "all"
globs = ["**/*.js", "**/*.less"]
bundles = ["*"]

[[script]]
name = "site"
output = "site.min.js"
sources = ["~jquery/dist/jquery.js", "js/main.js"]
source_map = "inline"

[[style]]
name = "site"
output = "site.css"
sources = ["less/site.less"]
"#;
        let config: AssetsConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.paths.vendor_dir, PathBuf::from("vendor"));
        assert_eq!(config.watch.debounce_ms, 0);
        assert!(config.watch.clear_screen);
        assert_eq!(config.watch.groups.len(), 1);
        assert_eq!(config.scripts[0].sources.len(), 2);
        assert_eq!(config.scripts[0].source_map, SourceMapMode::Inline);
        assert_eq!(config.styles[0].source_map, SourceMapMode::File);
        assert!(config.is_valid());
    }

    #[test]
    fn test_bundle_order_is_preserved() {
        let toml = r#"
[[script]]
name = "b"
output = "b.js"
sources = ["z.js", "a.js", "m.js"]

[[script]]
name = "a"
output = "a.js"
sources = ["a.js"]
"#;
        let config: AssetsConfig = toml::from_str(toml).unwrap();
        let names: Vec<_> = config.scripts.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(config.scripts[0].sources, vec!["z.js", "a.js", "m.js"]);
    }

    #[test]
    fn test_validation_duplicate_bundle() {
        let mut config = AssetsConfig::default();
        config.scripts.push(BundleConfig::new("site", "a.js", &["a.js"]));
        config.scripts.push(BundleConfig::new("site", "b.js", &["b.js"]));

        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("more than once"));
    }

    #[test]
    fn test_same_name_in_both_kinds_is_valid() {
        let mut config = AssetsConfig::default();
        config.scripts.push(BundleConfig::new("site", "site.js", &["a.js"]));
        config.styles.push(BundleConfig::new("site", "site.css", &["a.less"]));
        assert!(config.is_valid());
    }

    #[test]
    fn test_validation_empty_sources_and_bad_output() {
        let mut config = AssetsConfig::default();
        config.styles.push(BundleConfig::new("site", "css/site.css", &[]));

        let errors = config.validate();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.field == "style.site.sources"));
        assert!(errors.iter().any(|e| e.field == "style.site.output"));
    }

    #[test]
    fn test_validation_bad_name() {
        let mut config = AssetsConfig::default();
        config.scripts.push(BundleConfig::new("script:x", "x.js", &["x.js"]));
        assert!(!config.is_valid());
    }

    #[test]
    fn test_validation_invalid_glob() {
        let mut config = AssetsConfig::default();
        config.watch.groups[0].globs = vec!["less/[*.less".to_string()];

        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("invalid glob"));
    }

    #[test]
    fn test_default_watch_groups_match_original_layout() {
        let watch = WatchConfig::default();
        assert_eq!(watch.groups[0].globs, vec!["less/*.less"]);
        assert_eq!(watch.groups[0].bundles, vec!["style:*"]);
        assert_eq!(watch.groups[1].globs, vec!["js/*.js"]);
        assert_eq!(watch.groups[1].bundles, vec!["script:*"]);
    }
}
