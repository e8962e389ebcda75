//! Build pipeline orchestration.
//!
//! The pipeline turns one bundle into one artifact: read its sources in
//! order, run the transform chain for its kind, and write the result
//! atomically. Batches are independent builds aggregated in request order;
//! a failing bundle never stops its siblings.

use super::output::write_atomic;
use super::progress::{BundleStatus, NullProgress, ProgressEvent, ProgressReporter};
use super::{BuildContext, BuildReport, BuildResult, BuildStatus};
use crate::error::BuildError;
use crate::registry::{AssetKind, Bundle, SourceFile};
use crate::transforms::{Asset, TransformChain, TransformError};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Build pipeline for executing builds.
#[derive(Clone)]
pub struct BuildPipeline {
    context: BuildContext,
    dry_run: bool,
    progress: Arc<dyn ProgressReporter>,
}

impl std::fmt::Debug for BuildPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildPipeline")
            .field("context", &self.context)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl BuildPipeline {
    /// Create a new build pipeline.
    pub fn new(context: BuildContext) -> Self {
        Self { context, dry_run: false, progress: Arc::new(NullProgress) }
    }

    /// Set dry-run mode (resolve and plan only, touch no files).
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Report bundle progress to `progress`.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Get the build context.
    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    /// Build one bundle by qualified id or bare name.
    pub fn build(&self, name: &str) -> BuildResult {
        let start = Instant::now();
        match self.context.registry().resolve(name) {
            Ok(bundle) => self.build_bundle(bundle),
            Err(err) => BuildResult::failed(name, err, start.elapsed()),
        }
    }

    /// Build a resolved bundle.
    pub fn build_bundle(&self, bundle: &Bundle) -> BuildResult {
        let output = bundle.output_path();
        let map = bundle.map_path();

        if self.dry_run {
            return BuildResult::skipped(bundle.id.clone(), output, map);
        }

        let start = Instant::now();
        match self.execute(bundle) {
            Ok(written_map) => BuildResult::success(bundle.id.clone(), output, written_map, start.elapsed()),
            Err(err) => {
                if bundle.kind() == AssetKind::Style {
                    let sources: Vec<&str> = bundle.sources.iter().map(|s| s.display.as_str()).collect();
                    warn!(bundle = %bundle.id, sources = ?sources, error = %err, "stylesheet bundle failed");
                } else {
                    warn!(bundle = %bundle.id, error = %err, "bundle failed");
                }
                BuildResult::failed(bundle.id.to_string(), err, start.elapsed())
            }
        }
    }

    /// Build every named bundle, in request order.
    ///
    /// Names that do not resolve are reported as failed results; the rest
    /// of the batch still runs.
    pub fn build_all<S: AsRef<str>>(&self, names: &[S]) -> BuildReport {
        let start = Instant::now();
        self.progress.report(ProgressEvent::BuildStarted { total_bundles: names.len() });

        let mut report = BuildReport::new();
        for name in names {
            report.add_result(self.build_reported(name.as_ref()));
        }

        self.finish(report, start)
    }

    /// Build one bundle, emitting start and completion events.
    pub(crate) fn build_reported(&self, name: &str) -> BuildResult {
        self.progress.report(ProgressEvent::BundleStarted { bundle: name.to_string() });
        let result = self.build(name);
        let status = match &result.status {
            BuildStatus::Success => BundleStatus::Success,
            BuildStatus::Skipped => BundleStatus::Skipped,
            BuildStatus::Failed(err) => BundleStatus::Failed(err.to_string()),
        };
        self.progress.report(ProgressEvent::BundleCompleted {
            bundle: result.bundle.clone(),
            status,
            duration_ms: result.duration.as_millis() as u64,
        });
        result
    }

    /// Stamp the batch duration and emit the completion event.
    pub(crate) fn finish(&self, report: BuildReport, start: Instant) -> BuildReport {
        let report = report.with_duration(start.elapsed());
        self.progress.report(ProgressEvent::BuildCompleted {
            success: report.is_success(),
            duration_ms: report.total_duration.as_millis() as u64,
            succeeded: report.success_count(),
            skipped: report.skipped_count(),
            failed: report.failed_count(),
        });
        report
    }

    pub(crate) fn progress(&self) -> &Arc<dyn ProgressReporter> {
        &self.progress
    }

    /// Read, transform and write; returns the source map path if one was written.
    fn execute(&self, bundle: &Bundle) -> Result<Option<PathBuf>, BuildError> {
        let parts = read_sources(bundle)?;
        let output = bundle.output_path();

        info!(
            bundle = %bundle.id,
            sources = parts.len(),
            output = %output.display(),
            "building bundle"
        );

        let asset = Asset::concat(&bundle.output_name, parts);
        let asset = TransformChain::for_bundle(bundle)
            .run(asset)
            .map_err(|e| transform_failure(bundle, e))?;

        // The map goes first so the output never references a missing map.
        let mut written_map = None;
        if let (Some(map_path), Some(map)) = (bundle.map_path(), asset.source_map.as_ref()) {
            write_atomic(&map_path, map.as_bytes()).map_err(|source| BuildError::WriteFailure {
                bundle: bundle.id.clone(),
                path: map_path.clone(),
                source,
            })?;
            written_map = Some(map_path);
        }

        write_atomic(&output, asset.code.as_bytes()).map_err(|source| BuildError::WriteFailure {
            bundle: bundle.id.clone(),
            path: output.clone(),
            source,
        })?;

        Ok(written_map)
    }
}

/// Read every source of `bundle` in configured order.
fn read_sources(bundle: &Bundle) -> Result<Vec<(SourceFile, String)>, BuildError> {
    bundle
        .sources
        .iter()
        .map(|source| match fs::read_to_string(&source.path) {
            Ok(text) => Ok((source.clone(), text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(BuildError::MissingSourceFile {
                bundle: bundle.id.clone(),
                path: source.path.clone(),
            }),
            Err(e) => Err(BuildError::ReadFailure {
                bundle: bundle.id.clone(),
                path: source.path.clone(),
                source: e,
            }),
        })
        .collect()
}

fn transform_failure(bundle: &Bundle, err: TransformError) -> BuildError {
    BuildError::TransformFailure {
        bundle: bundle.id.clone(),
        step: err.step,
        file: err.file,
        line: err.line,
        message: err.message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AssetsConfig, BundleConfig, PathsConfig, SourceMapMode};
    use std::path::Path;
    use tempfile::TempDir;

    fn config(scripts: Vec<BundleConfig>, styles: Vec<BundleConfig>) -> AssetsConfig {
        AssetsConfig {
            paths: PathsConfig {
                source_root: PathBuf::from("src"),
                script_out: PathBuf::from("out/js"),
                style_out: PathBuf::from("out/css"),
                vendor_dir: PathBuf::from("node_modules"),
                maps_dir: PathBuf::from("../maps"),
            },
            scripts,
            styles,
            ..Default::default()
        }
    }

    fn pipeline(dir: &Path, config: AssetsConfig) -> BuildPipeline {
        BuildPipeline::new(BuildContext::new(config, dir.to_path_buf()).unwrap())
    }

    fn write(dir: &Path, rel: &str, text: &str) {
        let path = dir.join("src").join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    #[test]
    fn test_script_bundle_concatenates_in_order() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "js/a.js", "var a = 1;\n");
        write(dir.path(), "js/b.js", "var b = 2;\n");
        let mut def = BundleConfig::new("site", "site.js", &["js/a.js", "js/b.js"]);
        def.source_map = SourceMapMode::None;

        let result = pipeline(dir.path(), config(vec![def], vec![])).build("site");
        assert!(result.is_success(), "{:?}", result.error());

        let out = fs::read_to_string(dir.path().join("out/js/site.js")).unwrap();
        let a = out.find("a=1").unwrap();
        let b = out.find("b=2").unwrap();
        assert!(a < b);
        assert!(result.source_map.is_none());
    }

    #[test]
    fn test_script_bundle_writes_map_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "js/a.js", "var a = 1;\n");
        let def = BundleConfig::new("site", "site.js", &["js/a.js"]);

        let result = pipeline(dir.path(), config(vec![def], vec![])).build("script:site");
        let map_path = dir.path().join("out/maps/site.js.map");
        assert!(result.is_success(), "{:?}", result.error());
        assert_eq!(result.source_map.as_ref(), Some(&map_path));
        assert!(map_path.exists());

        let out = fs::read_to_string(dir.path().join("out/js/site.js")).unwrap();
        assert!(out.ends_with("//# sourceMappingURL=../maps/site.js.map\n"));
    }

    #[test]
    fn test_style_bundle() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "less/vars.less", "@c: red;\n");
        write(dir.path(), "less/site.less", ".x { color: @c; }\n");
        let def = BundleConfig::new("site", "site.css", &["less/vars.less", "less/site.less"]);

        let result = pipeline(dir.path(), config(vec![], vec![def])).build("site");
        assert!(result.is_success(), "{:?}", result.error());
        assert_eq!(fs::read_to_string(dir.path().join("out/css/site.css")).unwrap(), ".x{color:red}");
    }

    #[test]
    fn test_missing_source_names_path() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "js/a.js", "var a;");
        let def = BundleConfig::new("site", "site.js", &["js/a.js", "js/gone.js"]);

        let result = pipeline(dir.path(), config(vec![def], vec![])).build("site");
        match result.error() {
            Some(BuildError::MissingSourceFile { path, .. }) => {
                assert_eq!(path, &dir.path().join("src/js/gone.js"));
            }
            other => panic!("expected MissingSourceFile, got {:?}", other),
        }
        assert!(!dir.path().join("out/js/site.js").exists());
    }

    #[test]
    fn test_unknown_bundle() {
        let dir = TempDir::new().unwrap();
        let result = pipeline(dir.path(), config(vec![], vec![])).build("nope");
        assert!(matches!(result.error(), Some(BuildError::UnknownBundle(name)) if name == "nope"));
        assert_eq!(result.bundle, "nope");
    }

    #[test]
    fn test_transform_failure_keeps_previous_output() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "less/site.less", ".x { color: @missing; }\n");
        fs::create_dir_all(dir.path().join("out/css")).unwrap();
        fs::write(dir.path().join("out/css/site.css"), "previous").unwrap();
        let def = BundleConfig::new("site", "site.css", &["less/site.less"]);

        let result = pipeline(dir.path(), config(vec![], vec![def])).build("site");
        match result.error() {
            Some(BuildError::TransformFailure { step, file, line, .. }) => {
                assert_eq!(*step, "compile-less");
                assert_eq!(file.as_deref(), Some(Path::new("less/site.less")));
                assert_eq!(*line, Some(1));
            }
            other => panic!("expected TransformFailure, got {:?}", other),
        }
        assert_eq!(fs::read_to_string(dir.path().join("out/css/site.css")).unwrap(), "previous");
    }

    #[test]
    fn test_build_all_isolates_failures() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "less/bad.less", ".x { color: @nope; }");
        write(dir.path(), "less/good.less", ".y { color: blue; }");
        let styles = vec![
            BundleConfig::new("bad", "bad.css", &["less/bad.less"]),
            BundleConfig::new("good", "good.css", &["less/good.less"]),
        ];

        let report = pipeline(dir.path(), config(vec![], styles)).build_all(&["bad", "missing", "good"]);
        assert_eq!(report.results.len(), 3);
        assert_eq!(report.results[0].bundle, "style:bad");
        assert_eq!(report.results[1].bundle, "missing");
        assert_eq!(report.results[2].bundle, "style:good");
        assert_eq!(report.failed_count(), 2);
        assert_eq!(report.success_count(), 1);
        assert!(dir.path().join("out/css/good.css").exists());
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let def = BundleConfig::new("site", "site.js", &["js/not-there.js"]);

        let report = pipeline(dir.path(), config(vec![def], vec![])).with_dry_run(true).build_all(&["site"]);
        assert!(report.is_success());
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.results[0].output, Some(dir.path().join("out/js/site.js")));
        assert!(!dir.path().join("out").exists());
    }
}
