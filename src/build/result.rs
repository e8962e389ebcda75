//! Build result types.
//!
//! A [`BuildResult`] records the outcome of one bundle; a [`BuildReport`]
//! aggregates a batch in request order.

use crate::error::BuildError;
use crate::registry::BundleId;
use std::path::PathBuf;
use std::time::Duration;

/// Status of a single bundle build.
#[derive(Debug)]
pub enum BuildStatus {
    /// Output written
    Success,
    /// Not built (dry run)
    Skipped,
    /// Build failed; previous output is left untouched
    Failed(BuildError),
}

impl BuildStatus {
    /// Check if the status indicates success.
    pub fn is_success(&self) -> bool {
        matches!(self, BuildStatus::Success | BuildStatus::Skipped)
    }

    /// Check if the status indicates failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, BuildStatus::Failed(_))
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildStatus::Success => write!(f, "success"),
            BuildStatus::Skipped => write!(f, "skipped"),
            BuildStatus::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// Outcome of building one bundle.
#[derive(Debug)]
pub struct BuildResult {
    /// Name as requested (qualified id once resolved)
    pub bundle: String,
    /// Resolved bundle id, absent when the name did not resolve
    pub id: Option<BundleId>,
    /// Build status
    pub status: BuildStatus,
    /// Output artifact written or planned
    pub output: Option<PathBuf>,
    /// Source map written or planned
    pub source_map: Option<PathBuf>,
    /// Build duration
    pub duration: Duration,
}

impl BuildResult {
    /// Create a successful result.
    pub fn success(id: BundleId, output: PathBuf, source_map: Option<PathBuf>, duration: Duration) -> Self {
        Self {
            bundle: id.to_string(),
            id: Some(id),
            status: BuildStatus::Success,
            output: Some(output),
            source_map,
            duration,
        }
    }

    /// Create a skipped (dry-run) result listing what would be written.
    pub fn skipped(id: BundleId, output: PathBuf, source_map: Option<PathBuf>) -> Self {
        Self {
            bundle: id.to_string(),
            id: Some(id),
            status: BuildStatus::Skipped,
            output: Some(output),
            source_map,
            duration: Duration::ZERO,
        }
    }

    /// Create a failed result.
    pub fn failed(bundle: impl Into<String>, error: BuildError, duration: Duration) -> Self {
        Self {
            bundle: bundle.into(),
            id: error.bundle().cloned(),
            status: BuildStatus::Failed(error),
            output: None,
            source_map: None,
            duration,
        }
    }

    /// Check if this result is successful.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// The error, if the build failed.
    pub fn error(&self) -> Option<&BuildError> {
        match &self.status {
            BuildStatus::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Results of a batch build, in request order.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Results for each bundle
    pub results: Vec<BuildResult>,
    /// Total build duration
    pub total_duration: Duration,
}

impl BuildReport {
    /// Create a new empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bundle result.
    pub fn add_result(&mut self, result: BuildResult) {
        self.results.push(result);
    }

    /// Set the total duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.total_duration = duration;
        self
    }

    /// Get the number of bundles built.
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| matches!(r.status, BuildStatus::Success)).count()
    }

    /// Get the number of skipped bundles.
    pub fn skipped_count(&self) -> usize {
        self.results.iter().filter(|r| matches!(r.status, BuildStatus::Skipped)).count()
    }

    /// Get the number of failed bundles.
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| r.status.is_failure()).count()
    }

    /// Check if the batch succeeded (no failures).
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    /// Every artifact written, maps included.
    pub fn outputs(&self) -> Vec<&PathBuf> {
        self.results
            .iter()
            .filter(|r| matches!(r.status, BuildStatus::Success))
            .flat_map(|r| r.output.iter().chain(r.source_map.iter()))
            .collect()
    }

    /// Get failed bundle results.
    pub fn failures(&self) -> Vec<&BuildResult> {
        self.results.iter().filter(|r| r.status.is_failure()).collect()
    }

    /// Look up a result by the name it was requested under or its id.
    pub fn get(&self, bundle: &str) -> Option<&BuildResult> {
        self.results
            .iter()
            .find(|r| r.bundle == bundle || r.id.as_ref().is_some_and(|id| id.name == bundle))
    }

    /// Format a summary of the report.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        let success = self.success_count();
        let skipped = self.skipped_count();
        let failed = self.failed_count();
        let total = self.results.len();

        if failed > 0 {
            lines.push(format!(
                "Build failed: {} succeeded, {} skipped, {} failed ({} total)",
                success, skipped, failed, total
            ));
            for result in self.failures() {
                if let Some(err) = result.error() {
                    lines.push(format!("  - {}", err));
                }
            }
        } else {
            lines.push(format!(
                "Build succeeded: {} built, {} skipped ({} total) in {:?}",
                success, skipped, total, self.total_duration
            ));
        }

        lines.join("\n")
    }
}
