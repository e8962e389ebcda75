//! Configuration loading and discovery for `assets.toml`
//!
//! Provides functions to find, load, and merge configuration.

use super::schema::{AssetsConfig, BundleConfig, PathsConfig, WatchConfig};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the project configuration file.
pub const CONFIG_FILENAME: &str = "assets.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse assets.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// CLI arguments that can override config values
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Override source root
    pub source_root: Option<PathBuf>,
    /// Override script output directory
    pub script_out: Option<PathBuf>,
    /// Override stylesheet output directory
    pub style_out: Option<PathBuf>,
    /// Override vendor directory
    pub vendor_dir: Option<PathBuf>,
    /// Override watch debounce window
    pub debounce_ms: Option<u32>,
}

/// Find assets.toml by walking up from the current working directory.
pub fn find_config() -> Option<PathBuf> {
    env::current_dir().ok().and_then(find_config_from)
}

/// Find assets.toml by walking up from a specific directory.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILENAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load configuration from an assets.toml file.
///
/// If a path is provided, loads from that file. Otherwise, uses `find_config()`
/// to locate the config file. If no config file is found, returns the built-in
/// bundle set.
pub fn load_config(path: Option<&Path>) -> Result<AssetsConfig, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(),
    };

    match config_path {
        Some(p) => load_config_file(&p),
        None => Ok(default_config()),
    }
}

/// Load configuration from a specific file path.
fn load_config_file(path: &Path) -> Result<AssetsConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate configuration text.
pub fn parse_config(contents: &str) -> Result<AssetsConfig, ConfigError> {
    let config: AssetsConfig = toml::from_str(contents)?;

    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }

    Ok(config)
}

/// Built-in configuration used when no assets.toml is found.
///
/// Reproduces the journal portal's bundle set: the site-wide script bundle
/// (jQuery, Bootstrap and typeahead ahead of the site's own scripts), the
/// article page bundle and its standalone variant, plus the matching LESS
/// bundles and the print stylesheet.
pub fn default_config() -> AssetsConfig {
    let scripts = vec![
        BundleConfig::new(
            "scielo-bundle",
            "scielo-bundle-min.js",
            &[
                "~jquery/dist/jquery.js",
                "~bootstrap/dist/js/bootstrap.js",
                "~jquery-typeahead/dist/jquery.typeahead.min.js",
                "js/plugins.js",
                "js/main.js",
                "js/common.js",
                "js/moment.js",
                "js/moment_locale_pt_br.js",
                "js/moment_locale_es.js",
                "js/modal_forms.js",
            ],
        ),
        BundleConfig::new("scielo-article", "scielo-article-min.js", &["js/scielo-article.js"]),
        BundleConfig::new(
            "scielo-article-standalone",
            "scielo-article-standalone-min.js",
            &[
                "~jquery/dist/jquery.js",
                "~bootstrap/dist/js/bootstrap.js",
                "js/plugins.js",
                "js/scielo-article.js",
            ],
        ),
    ];

    let styles = vec![
        BundleConfig::new(
            "scielo-bundle",
            "scielo-bundle.css",
            &["less/scielo-bundle.less", "less/style.less", "less/jquery.typeahead.less"],
        ),
        BundleConfig::new("scielo-article", "scielo-article.css", &["less/scielo-article.less"]),
        BundleConfig::new(
            "scielo-article-standalone",
            "scielo-article-standalone.css",
            &["less/scielo-article-standalone.less"],
        ),
        BundleConfig::new(
            "scielo-bundle-print",
            "scielo-bundle-print.css",
            &["less/scielo-bundle-print.less"],
        ),
    ];

    AssetsConfig { paths: PathsConfig::default(), watch: WatchConfig::default(), scripts, styles }
}

/// Merge CLI overrides into a configuration.
///
/// CLI arguments take precedence over config file values.
pub fn merge_cli_overrides(config: &mut AssetsConfig, overrides: &CliOverrides) {
    if let Some(ref root) = overrides.source_root {
        config.paths.source_root = root.clone();
    }

    if let Some(ref out) = overrides.script_out {
        config.paths.script_out = out.clone();
    }

    if let Some(ref out) = overrides.style_out {
        config.paths.style_out = out.clone();
    }

    if let Some(ref vendor) = overrides.vendor_dir {
        config.paths.vendor_dir = vendor.clone();
    }

    if let Some(debounce_ms) = overrides.debounce_ms {
        config.watch.debounce_ms = debounce_ms;
    }
}

/// Get the project root directory from a config file path.
///
/// Returns the parent directory of the assets.toml file.
pub fn project_root(config_path: &Path) -> Option<&Path> {
    config_path.parent()
}

/// Resolve a path relative to the project root.
///
/// If the path is absolute, returns it unchanged.
/// If relative, joins it with the project root.
pub fn resolve_path(project_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_find_config_in_current_dir() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = temp.path().join(CONFIG_FILENAME);
        File::create(&config_path).expect("should create config file");

        let found = find_config_from(temp.path().to_path_buf());
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_config_in_parent_dir() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = temp.path().join(CONFIG_FILENAME);
        File::create(&config_path).expect("should create config file");

        let subdir = temp.path().join("opac").join("webapp");
        fs::create_dir_all(&subdir).expect("should create subdirectories");

        let found = find_config_from(subdir);
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_config_not_found() {
        let temp = TempDir::new().expect("should create temp dir");
        let found = find_config_from(temp.path().to_path_buf());
        assert_eq!(found, None);
    }

    #[test]
    fn test_load_config_from_file() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = temp.path().join(CONFIG_FILENAME);
        File::create(&config_path)
            .expect("should create config file")
            .write_all(
                br#"
[paths]
source_root = "static"

[[script]]
name = "site"
output = "site.min.js"
sources = ["js/a.js", "js/b.js"]
"#,
            )
            .expect("should write config content");

        let config = load_config(Some(&config_path)).expect("should load valid config");
        assert_eq!(config.paths.source_root, PathBuf::from("static"));
        assert_eq!(config.scripts.len(), 1);
        assert!(config.styles.is_empty());
    }

    #[test]
    fn test_load_config_missing_file_errors() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = temp.path().join("nonexistent.toml");

        let result = load_config(Some(&config_path));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let result = parse_config("this is not valid toml {{{");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_validation_error() {
        let result = parse_config(
            r#"
[[style]]
name = "site"
output = ""
sources = []
"#,
        );
        match result {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_default_config_bundles() {
        let config = default_config();
        assert!(config.is_valid());

        let scripts: Vec<_> = config.scripts.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(scripts, vec!["scielo-bundle", "scielo-article", "scielo-article-standalone"]);
        assert_eq!(config.styles.len(), 4);

        // jQuery must precede the plugins that depend on it
        let bundle = &config.scripts[0];
        assert_eq!(bundle.sources[0], "~jquery/dist/jquery.js");
        assert_eq!(bundle.sources[1], "~bootstrap/dist/js/bootstrap.js");
        assert_eq!(bundle.output, "scielo-bundle-min.js");
    }

    #[test]
    fn test_merge_cli_overrides() {
        let mut config = default_config();
        let overrides = CliOverrides {
            source_root: Some(PathBuf::from("assets")),
            style_out: Some(PathBuf::from("dist/css")),
            debounce_ms: Some(0),
            ..Default::default()
        };

        merge_cli_overrides(&mut config, &overrides);
        assert_eq!(config.paths.source_root, PathBuf::from("assets"));
        assert_eq!(config.paths.style_out, PathBuf::from("dist/css"));
        assert_eq!(config.paths.script_out, PathBuf::from("opac/webapp/static/js"));
        assert_eq!(config.watch.debounce_ms, 0);
    }

    #[test]
    fn test_resolve_path_absolute() {
        let root = Path::new("/project");
        let absolute = Path::new("/other/path");
        assert_eq!(resolve_path(root, absolute), PathBuf::from("/other/path"));
    }

    #[test]
    fn test_resolve_path_relative() {
        let root = Path::new("/project");
        let relative = Path::new("node_modules");
        assert_eq!(resolve_path(root, relative), PathBuf::from("/project/node_modules"));
    }

    #[test]
    fn test_project_root() {
        let config_path = Path::new("/project/assets.toml");
        assert_eq!(project_root(config_path), Some(Path::new("/project")));
    }
}
