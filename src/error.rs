//! Per-bundle build errors.
//!
//! Every failure that can happen while building one bundle is a
//! [`BuildError`]. Errors are isolated at the bundle boundary: a failing
//! bundle yields a failed [`BuildResult`](crate::build::BuildResult) and never
//! aborts its siblings.

use crate::registry::BundleId;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error building a single bundle.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BuildError {
    /// No bundle matches the requested name
    #[error("unknown bundle '{0}'")]
    UnknownBundle(String),
    /// A bare name exists under more than one asset kind
    #[error("bundle name '{name}' is ambiguous, use one of: {}", .candidates.join(", "))]
    AmbiguousBundle {
        /// The bare name that was requested
        name: String,
        /// Qualified ids that match
        candidates: Vec<String>,
    },
    /// A configured source file does not exist
    #[error("{bundle}: source file not found: {}", .path.display())]
    MissingSourceFile {
        /// Bundle being built
        bundle: BundleId,
        /// The absent path
        path: PathBuf,
    },
    /// A source file exists but could not be read
    #[error("{bundle}: failed to read {}: {source}", .path.display())]
    ReadFailure {
        /// Bundle being built
        bundle: BundleId,
        /// File that failed to read
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },
    /// A transform step rejected the bundle's input
    #[error("{bundle}: {step} failed{}: {message}", location_suffix(.file, .line))]
    TransformFailure {
        /// Bundle being built
        bundle: BundleId,
        /// Name of the failing step
        step: &'static str,
        /// Source file the error maps to, when known
        file: Option<PathBuf>,
        /// 1-based line in `file`, when known
        line: Option<usize>,
        /// Step-specific description
        message: String,
    },
    /// Writing the output artifact failed
    #[error("{bundle}: failed to write {}: {source}", .path.display())]
    WriteFailure {
        /// Bundle being built
        bundle: BundleId,
        /// Destination path
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },
}

impl BuildError {
    /// The bundle this error belongs to, if it was resolved.
    pub fn bundle(&self) -> Option<&BundleId> {
        match self {
            BuildError::UnknownBundle(_) | BuildError::AmbiguousBundle { .. } => None,
            BuildError::MissingSourceFile { bundle, .. }
            | BuildError::ReadFailure { bundle, .. }
            | BuildError::TransformFailure { bundle, .. }
            | BuildError::WriteFailure { bundle, .. } => Some(bundle),
        }
    }

    /// Whether this is a name resolution error rather than a build error.
    pub fn is_resolution(&self) -> bool {
        matches!(self, BuildError::UnknownBundle(_) | BuildError::AmbiguousBundle { .. })
    }
}

fn location_suffix(file: &Option<PathBuf>, line: &Option<usize>) -> String {
    match (file, line) {
        (Some(file), Some(line)) => format!(" at {}:{}", file.display(), line),
        (Some(file), None) => format!(" in {}", file.display()),
        (None, Some(line)) => format!(" at line {}", line),
        (None, None) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AssetKind;

    fn id() -> BundleId {
        BundleId::new(AssetKind::Style, "site")
    }

    #[test]
    fn test_unknown_bundle_display() {
        let err = BuildError::UnknownBundle("nope".to_string());
        assert_eq!(err.to_string(), "unknown bundle 'nope'");
        assert!(err.is_resolution());
        assert!(err.bundle().is_none());
    }

    #[test]
    fn test_ambiguous_bundle_lists_candidates() {
        let err = BuildError::AmbiguousBundle {
            name: "site".to_string(),
            candidates: vec!["script:site".to_string(), "style:site".to_string()],
        };
        assert!(err.to_string().contains("script:site, style:site"));
    }

    #[test]
    fn test_transform_failure_location() {
        let err = BuildError::TransformFailure {
            bundle: id(),
            step: "compile-less",
            file: Some(PathBuf::from("less/site.less")),
            line: Some(3),
            message: "undefined variable @c".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "style:site: compile-less failed at less/site.less:3: undefined variable @c"
        );
        assert_eq!(err.bundle(), Some(&id()));
    }

    #[test]
    fn test_transform_failure_without_location() {
        let err = BuildError::TransformFailure {
            bundle: id(),
            step: "minify-css",
            file: None,
            line: None,
            message: "unexpected token".to_string(),
        };
        assert_eq!(err.to_string(), "style:site: minify-css failed: unexpected token");
    }

    #[test]
    fn test_missing_source_display() {
        let err =
            BuildError::MissingSourceFile { bundle: id(), path: PathBuf::from("/x/less/a.less") };
        assert!(err.to_string().contains("source file not found: /x/less/a.less"));
    }
}
