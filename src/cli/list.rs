//! List command implementation

use std::fmt::Write;
use std::path::Path;
use std::process::ExitCode;

use super::{load_context, EXIT_SUCCESS};
use crate::config::{CliOverrides, SourceMapMode};
use crate::registry::BundleRegistry;

/// Run the list command
pub fn run_list(config_path: Option<&Path>, overrides: &CliOverrides) -> ExitCode {
    let context = match load_context(config_path, overrides, false) {
        Ok(ctx) => ctx,
        Err(code) => return code,
    };

    print!("{}", format_registry(context.registry()));
    ExitCode::from(EXIT_SUCCESS)
}

/// Human-readable listing of every bundle, in registry order.
pub(crate) fn format_registry(registry: &BundleRegistry) -> String {
    let mut out = String::new();
    for bundle in registry.bundles() {
        let _ = writeln!(out, "{}", bundle.id);
        let _ = writeln!(out, "  output: {}", bundle.output_path().display());
        if let Some(map) = bundle.map_path() {
            let _ = writeln!(out, "  map:    {}", map.display());
        } else if bundle.wants_source_map() && bundle.source_map == SourceMapMode::Inline {
            let _ = writeln!(out, "  map:    inline");
        }
        let _ = writeln!(out, "  sources:");
        for source in &bundle.sources {
            let _ = writeln!(out, "    {}", source.display);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;

    #[test]
    fn test_format_registry() {
        let registry = BundleRegistry::from_config(&default_config(), Path::new("/p")).unwrap();
        let text = format_registry(&registry);

        assert!(text.starts_with("script:scielo-bundle\n"));
        assert!(text.contains("  output: /p/opac/webapp/static/js/scielo-bundle-min.js\n"));
        assert!(text.contains("    ~jquery/dist/jquery.js\n"));
        assert!(text.contains("style:scielo-bundle-print\n"));

        let script = text.find("script:scielo-article\n").unwrap();
        let style = text.find("style:scielo-article\n").unwrap();
        assert!(script < style);
    }
}
