//! Build command implementation

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use super::{load_context, OutputFormat, EXIT_ERROR, EXIT_SUCCESS};
use crate::build::progress::{ConsoleProgress, JsonProgress, ProgressReporter};
use crate::build::{BuildPipeline, BuildReport, BuildStatus, ParallelBuild};
use crate::config::CliOverrides;
use crate::registry::{AssetKind, BundleRegistry};

/// `--scripts` / `--styles` flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct KindFilter {
    pub scripts: bool,
    pub styles: bool,
}

/// Run the build command
pub fn run_build(
    config_path: Option<&Path>,
    overrides: &CliOverrides,
    bundles: &[String],
    kinds: KindFilter,
    jobs: Option<usize>,
    dry_run: bool,
    format: OutputFormat,
    verbose: bool,
) -> ExitCode {
    let context = match load_context(config_path, overrides, verbose) {
        Ok(ctx) => ctx,
        Err(code) => return code,
    };

    let names = requested_bundles(context.registry(), bundles, kinds);

    let progress: Arc<dyn ProgressReporter> = match format {
        OutputFormat::Console => Arc::new(ConsoleProgress::new().with_verbose(verbose)),
        OutputFormat::Json => Arc::new(JsonProgress::new()),
    };

    let pipeline = BuildPipeline::new(context).with_dry_run(dry_run).with_progress(progress);

    if dry_run {
        let report = pipeline.build_all(&names);
        if format == OutputFormat::Console {
            print_plan(&report);
        }
        return exit_code(&report);
    }

    let mut parallel = ParallelBuild::new(pipeline);
    if let Some(jobs) = jobs {
        parallel = parallel.with_jobs(jobs);
    }
    let report = parallel.run(&names);

    if format == OutputFormat::Console {
        if report.is_success() {
            println!("{}", report.summary());
        } else {
            eprintln!("{}", report.summary());
        }
    }
    exit_code(&report)
}

/// Expand kind flags and names into the bundle list, in request order.
///
/// Kind flags expand in registry order ahead of explicit names; nothing at
/// all means every bundle. Names are passed through unresolved so unknown
/// ones surface as failed results.
pub(crate) fn requested_bundles(registry: &BundleRegistry, bundles: &[String], kinds: KindFilter) -> Vec<String> {
    if bundles.is_empty() && !kinds.scripts && !kinds.styles {
        return registry.ids().iter().map(|id| id.to_string()).collect();
    }

    let mut names: Vec<String> = Vec::new();
    for (enabled, kind) in [(kinds.scripts, AssetKind::Script), (kinds.styles, AssetKind::Style)] {
        if enabled {
            names.extend(registry.of_kind(kind).map(|b| b.id.to_string()));
        }
    }

    for name in bundles {
        let already = registry.resolve(name).is_ok_and(|b| names.contains(&b.id.to_string()));
        if !already && !names.contains(name) {
            names.push(name.clone());
        }
    }
    names
}

fn print_plan(report: &BuildReport) {
    println!("Dry run - would build:");
    for result in &report.results {
        match (&result.status, &result.output) {
            (BuildStatus::Failed(err), _) => println!("  - {}: {}", result.bundle, err),
            (_, Some(output)) => {
                println!("  - {} -> {}", result.bundle, output.display());
                if let Some(map) = &result.source_map {
                    println!("      map -> {}", map.display());
                }
            }
            (_, None) => println!("  - {}", result.bundle),
        }
    }
}

fn exit_code(report: &BuildReport) -> ExitCode {
    if report.is_success() {
        ExitCode::from(EXIT_SUCCESS)
    } else {
        ExitCode::from(EXIT_ERROR)
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
    fn test_nothing_requested_means_everything() {
        let names = requested_bundles(&registry(), &[], KindFilter::default());
        assert_eq!(names.len(), 7);
    }

    #[test]
    fn test_kind_flags() {
        let names = requested_bundles(&registry(), &[], KindFilter { scripts: false, styles: true });
        assert_eq!(
            names,
            vec![
                "style:scielo-bundle",
                "style:scielo-article",
                "style:scielo-article-standalone",
                "style:scielo-bundle-print",
            ]
        );
    }

    #[test]
    fn test_names_kept_in_order_and_deduplicated() {
        let requested = vec![
            "style:scielo-bundle-print".to_string(),
            "nope".to_string(),
            "script:scielo-article".to_string(),
            "nope".to_string(),
        ];
        let names = requested_bundles(&registry(), &requested, KindFilter::default());
        assert_eq!(names, vec!["style:scielo-bundle-print", "nope", "script:scielo-article"]);
    }

    #[test]
    fn test_names_already_covered_by_kind() {
        let requested = vec!["scielo-bundle-print".to_string()];
        let names = requested_bundles(&registry(), &requested, KindFilter { scripts: false, styles: true });
        assert_eq!(names.len(), 4);
    }
}
