//! Bundle registry.
//!
//! This module provides:
//! - [`AssetKind`] and [`BundleId`], the typed `kind:name` bundle key
//! - [`SourceFile`] and [`Bundle`], resolved bundle definitions
//! - [`BundleRegistry`], the read-only `BundleId -> Bundle` map built once
//!   from configuration
//!
//! Lookups accept either a qualified id (`style:scielo-bundle`) or a bare
//! name when that name exists under only one kind.

mod bundle;

pub use bundle::{AssetKind, Bundle, BundleId, SourceFile};

use crate::config::{resolve_path, AssetsConfig, BundleConfig};
use crate::error::BuildError;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Error building the registry from configuration.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// Two bundles share the same id
    #[error("bundle '{0}' is defined more than once")]
    DuplicateBundle(BundleId),
    /// A bundle lists no sources
    #[error("bundle '{0}' has no source files")]
    EmptyBundle(BundleId),
}

/// Read-only map of all configured bundles, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct BundleRegistry {
    bundles: Vec<Bundle>,
    index: HashMap<BundleId, usize>,
}

impl BundleRegistry {
    /// Build the registry from configuration.
    ///
    /// Relative directories in `config.paths` are resolved against
    /// `project_root`. Script bundles come before style bundles, each in the
    /// order they were configured.
    pub fn from_config(config: &AssetsConfig, project_root: &Path) -> Result<Self, RegistryError> {
        let paths = &config.paths;
        let source_root = resolve_path(project_root, &paths.source_root);
        let vendor_dir = resolve_path(project_root, &paths.vendor_dir);
        let script_out = resolve_path(project_root, &paths.script_out);
        let style_out = resolve_path(project_root, &paths.style_out);
        let maps_dir = normalize_path(&resolve_path(&script_out, &paths.maps_dir));
        let maps_url = paths.maps_dir.to_string_lossy().replace('\\', "/");

        let layout = Layout { source_root, vendor_dir, maps_dir, maps_url };

        let mut registry = Self::default();
        for def in &config.scripts {
            registry.insert(layout.bundle(AssetKind::Script, def, &script_out))?;
        }
        for def in &config.styles {
            registry.insert(layout.bundle(AssetKind::Style, def, &style_out))?;
        }

        debug!(bundles = registry.len(), "bundle registry built");
        Ok(registry)
    }

    fn insert(&mut self, bundle: Bundle) -> Result<(), RegistryError> {
        if bundle.sources.is_empty() {
            return Err(RegistryError::EmptyBundle(bundle.id));
        }
        if self.index.contains_key(&bundle.id) {
            return Err(RegistryError::DuplicateBundle(bundle.id));
        }
        self.index.insert(bundle.id.clone(), self.bundles.len());
        self.bundles.push(bundle);
        Ok(())
    }

    /// Look up a bundle by id.
    pub fn get(&self, id: &BundleId) -> Option<&Bundle> {
        self.index.get(id).map(|&i| &self.bundles[i])
    }

    /// Resolve a qualified id or a bare bundle name.
    pub fn resolve(&self, name: &str) -> Result<&Bundle, BuildError> {
        if name.contains(':') {
            return BundleId::parse(name)
                .and_then(|id| self.get(&id))
                .ok_or_else(|| BuildError::UnknownBundle(name.to_string()));
        }

        let matches: Vec<&Bundle> = self.bundles.iter().filter(|b| b.id.name == name).collect();
        match matches.as_slice() {
            [] => Err(BuildError::UnknownBundle(name.to_string())),
            [bundle] => Ok(bundle),
            many => Err(BuildError::AmbiguousBundle {
                name: name.to_string(),
                candidates: many.iter().map(|b| b.id.to_string()).collect(),
            }),
        }
    }

    /// Expand selectors into registry-ordered ids without duplicates.
    ///
    /// Accepts `*`, `script:*`, `style:*`, qualified ids and bare names.
    pub fn select<S: AsRef<str>>(&self, selectors: &[S]) -> Result<Vec<BundleId>, BuildError> {
        let mut chosen: HashSet<&BundleId> = HashSet::new();

        for selector in selectors {
            let selector = selector.as_ref().trim();
            if selector == "*" {
                chosen.extend(self.bundles.iter().map(|b| &b.id));
            } else if let Some(kind) = selector.strip_suffix(":*") {
                let kind = AssetKind::parse(kind)
                    .ok_or_else(|| BuildError::UnknownBundle(selector.to_string()))?;
                chosen.extend(self.of_kind(kind).map(|b| &b.id));
            } else {
                chosen.insert(&self.resolve(selector)?.id);
            }
        }

        Ok(self.bundles.iter().filter(|b| chosen.contains(&b.id)).map(|b| b.id.clone()).collect())
    }

    /// All bundles in registry order.
    pub fn bundles(&self) -> impl Iterator<Item = &Bundle> {
        self.bundles.iter()
    }

    /// Bundles of one kind in registry order.
    pub fn of_kind(&self, kind: AssetKind) -> impl Iterator<Item = &Bundle> {
        self.bundles.iter().filter(move |b| b.kind() == kind)
    }

    /// All bundle ids in registry order.
    pub fn ids(&self) -> Vec<BundleId> {
        self.bundles.iter().map(|b| b.id.clone()).collect()
    }

    /// Every path the pipeline writes, including source maps.
    pub fn output_paths(&self) -> Vec<PathBuf> {
        self.bundles
            .iter()
            .flat_map(|b| std::iter::once(b.output_path()).chain(b.map_path()))
            .collect()
    }

    /// Number of bundles.
    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

/// Lexically remove `.` and `..` components so output paths compare equal to
/// the paths reported by filesystem events.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolved directory layout shared by every bundle.
struct Layout {
    source_root: PathBuf,
    vendor_dir: PathBuf,
    maps_dir: PathBuf,
    maps_url: String,
}

impl Layout {
    fn bundle(&self, kind: AssetKind, def: &BundleConfig, output_dir: &Path) -> Bundle {
        Bundle {
            id: BundleId::new(kind, def.name.clone()),
            sources: def
                .sources
                .iter()
                .map(|entry| SourceFile::resolve(entry, &self.source_root, &self.vendor_dir))
                .collect(),
            output_name: def.output.clone(),
            output_dir: output_dir.to_path_buf(),
            source_map: def.source_map,
            maps_dir: self.maps_dir.clone(),
            maps_url: self.maps_url.clone(),
            vendor_dir: self.vendor_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;

    fn registry() -> BundleRegistry {
        BundleRegistry::from_config(&default_config(), Path::new("/p")).unwrap()
    }

    #[test]
    fn test_registry_order_follows_config() {
        let ids: Vec<String> = registry().ids().iter().map(|id| id.to_string()).collect();
        assert_eq!(
            ids,
            vec![
                "script:scielo-bundle",
                "script:scielo-article",
                "script:scielo-article-standalone",
                "style:scielo-bundle",
                "style:scielo-article",
                "style:scielo-article-standalone",
                "style:scielo-bundle-print",
            ]
        );
    }

    #[test]
    fn test_source_order_preserved() {
        let reg = registry();
        let bundle = reg.resolve("script:scielo-bundle").unwrap();
        let first: Vec<&str> = bundle.sources.iter().take(4).map(|s| s.display.as_str()).collect();
        assert_eq!(
            first,
            vec![
                "~jquery/dist/jquery.js",
                "~bootstrap/dist/js/bootstrap.js",
                "~jquery-typeahead/dist/jquery.typeahead.min.js",
                "js/plugins.js",
            ]
        );
        assert_eq!(bundle.sources[0].path, PathBuf::from("/p/node_modules/jquery/dist/jquery.js"));
        assert_eq!(bundle.sources[3].path, PathBuf::from("/p/opac/webapp/static/js/plugins.js"));
    }

    #[test]
    fn test_resolve_unknown() {
        let err = registry().resolve("no-such-bundle").unwrap_err();
        assert!(matches!(err, BuildError::UnknownBundle(ref n) if n == "no-such-bundle"));

        let err = registry().resolve("script:scielo-bundle-print").unwrap_err();
        assert!(matches!(err, BuildError::UnknownBundle(_)));
    }

    #[test]
    fn test_resolve_bare_name() {
        let reg = registry();
        assert_eq!(reg.resolve("scielo-bundle-print").unwrap().kind(), AssetKind::Style);

        let err = reg.resolve("scielo-article").unwrap_err();
        match err {
            BuildError::AmbiguousBundle { candidates, .. } => {
                assert_eq!(candidates, vec!["script:scielo-article", "style:scielo-article"]);
            }
            other => panic!("expected ambiguous bundle, got {:?}", other),
        }
    }

    #[test]
    fn test_select_kind_wildcards() {
        let reg = registry();
        assert_eq!(reg.select(&["script:*"]).unwrap().len(), 3);
        assert_eq!(reg.select(&["style:*"]).unwrap().len(), 4);
        assert_eq!(reg.select(&["*"]).unwrap().len(), 7);
    }

    #[test]
    fn test_select_dedups_in_registry_order() {
        let reg = registry();
        let ids = reg
            .select(&["style:scielo-article", "scielo-bundle-print", "style:*", "script:scielo-article"])
            .unwrap();
        assert_eq!(ids.len(), 5);
        assert_eq!(ids[0].to_string(), "script:scielo-article");
        assert_eq!(ids[1].kind, AssetKind::Style);
    }

    #[test]
    fn test_select_unknown_fails() {
        assert!(registry().select(&["image:*"]).is_err());
        assert!(registry().select(&["missing"]).is_err());
    }

    #[test]
    fn test_duplicate_bundle_is_error() {
        let mut config = AssetsConfig::default();
        config.scripts.push(BundleConfig::new("a", "a.js", &["a.js"]));
        config.scripts.push(BundleConfig::new("a", "b.js", &["b.js"]));

        let err = BundleRegistry::from_config(&config, Path::new("/p")).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateBundle(BundleId::new(AssetKind::Script, "a")));
    }

    #[test]
    fn test_empty_bundle_is_error() {
        let mut config = AssetsConfig::default();
        config.styles.push(BundleConfig::new("a", "a.css", &[]));

        let err = BundleRegistry::from_config(&config, Path::new("/p")).unwrap_err();
        assert!(matches!(err, RegistryError::EmptyBundle(_)));
    }

    #[test]
    fn test_output_paths_include_maps() {
        let reg = registry();
        let outputs = reg.output_paths();
        // 7 artifacts plus a map for each of the 3 scripts
        assert_eq!(outputs.len(), 10);
        assert!(outputs.contains(&PathBuf::from("/p/opac/webapp/static/css/scielo-bundle.css")));
        assert!(outputs
            .contains(&PathBuf::from("/p/opac/webapp/static/maps/scielo-article-min.js.map")));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(normalize_path(Path::new("../x")), PathBuf::from("../x"));
    }
}
