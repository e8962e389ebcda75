//! LESS compilation step.

use super::{Asset, TransformError, TransformStep};
use crate::less::{self, LessOptions, SourceSpan};
use std::path::PathBuf;

/// Transform step that compiles a concatenated LESS bundle to CSS.
///
/// Each source file's span is passed to the compiler so errors name the
/// file and line they occurred in, and relative imports resolve against
/// the importing file's directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileLess {
    options: LessOptions,
}

impl CompileLess {
    /// Create the step with the directory used for `~` imports.
    pub fn new(vendor_dir: PathBuf) -> Self {
        Self { options: LessOptions { vendor_dir } }
    }
}

impl TransformStep for CompileLess {
    fn name(&self) -> &'static str {
        "compile-less"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        let spans: Vec<SourceSpan> = asset
            .segments
            .iter()
            .map(|segment| SourceSpan {
                start: segment.start,
                path: segment.source.path.clone(),
                display: segment.source.display.clone(),
            })
            .collect();

        let css = less::compile(&asset.code, &spans, &self.options).map_err(|e| TransformError {
            step: self.name(),
            message: e.message,
            file: e.file.map(PathBuf::from),
            line: e.line,
        })?;

        asset.code = css;
        asset.mappings.clear();
        Ok(asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SourceFile;
    use std::fs;
    use tempfile::TempDir;

    fn asset(dir: &std::path::Path, parts: &[(&str, &str)]) -> Asset {
        let parts = parts
            .iter()
            .map(|(name, text)| {
                let path = dir.join(name);
                fs::write(&path, text).unwrap();
                (SourceFile { path, display: name.to_string() }, text.to_string())
            })
            .collect();
        Asset::concat("site.css", parts)
    }

    #[test]
    fn test_variables_shared_across_files() {
        let dir = TempDir::new().unwrap();
        let input = asset(dir.path(), &[("vars.less", "@brand: #336699;\n"), ("site.less", "a { color: @brand }\n")]);
        let out = CompileLess::new(dir.path().join("vendor")).apply(input).unwrap();
        assert_eq!(out.code, "a {\n  color: #336699;\n}\n");
    }

    #[test]
    fn test_error_names_file_and_line() {
        let dir = TempDir::new().unwrap();
        let input = asset(
            dir.path(),
            &[("ok.less", ".a { x: y }\n"), ("broken.less", "\n\n.b { color: @undefined; }\n")],
        );
        let err = CompileLess::new(dir.path().to_path_buf()).apply(input).unwrap_err();
        assert_eq!(err.step, "compile-less");
        assert_eq!(err.file, Some(PathBuf::from("broken.less")));
        assert_eq!(err.line, Some(3));
        assert_eq!(err.to_string(), "compile-less: undefined variable @undefined");
    }

    #[test]
    fn test_relative_import_from_source_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("mixins.less"), ".rounded(@r) { border-radius: @r }").unwrap();
        let input = asset(dir.path(), &[("site.less", "@import \"mixins\";\n.a { .rounded(4px); }\n")]);
        let out = CompileLess::new(dir.path().join("vendor")).apply(input).unwrap();
        assert_eq!(out.code, ".a {\n  border-radius: 4px;\n}\n");
    }
}
