//! Build context containing configuration and the bundle registry.

use crate::config::AssetsConfig;
use crate::registry::{BundleRegistry, RegistryError};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Immutable inputs of a build: the configuration, the project root and the
/// registry built from them.
///
/// The registry sits behind an [`Arc`] so parallel builds and watch rebuild
/// threads share it without copying.
#[derive(Debug, Clone)]
pub struct BuildContext {
    config: Arc<AssetsConfig>,
    project_root: PathBuf,
    registry: Arc<BundleRegistry>,
    verbose: bool,
}

impl BuildContext {
    /// Create a new build context.
    ///
    /// # Arguments
    /// - `config` - The loaded configuration, CLI overrides already merged
    /// - `project_root` - Directory relative paths in `config` resolve against
    pub fn new(config: AssetsConfig, project_root: PathBuf) -> Result<Self, RegistryError> {
        let registry = BundleRegistry::from_config(&config, &project_root)?;
        Ok(Self { config: Arc::new(config), project_root, registry: Arc::new(registry), verbose: false })
    }

    /// Get the configuration.
    pub fn config(&self) -> &AssetsConfig {
        &self.config
    }

    /// Get the project root directory.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Get the bundle registry.
    pub fn registry(&self) -> &BundleRegistry {
        &self.registry
    }

    /// Source root (resolved to absolute path).
    pub fn source_root(&self) -> PathBuf {
        self.resolve_path(&self.config.paths.source_root)
    }

    /// Whether verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Resolve a path relative to the project root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        crate::config::resolve_path(&self.project_root, path)
    }
}
