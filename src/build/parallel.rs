//! Parallel build execution.
//!
//! Bundles share no state beyond the read-only registry, so a batch can be
//! built on a bounded worker pool. Results come back in request order
//! regardless of completion order.
//!
//! # Example
//!
//! ```ignore
//! use assetpipe::build::{BuildContext, BuildPipeline, ParallelBuild};
//!
//! let pipeline = BuildPipeline::new(BuildContext::new(config, project_root)?);
//! let report = ParallelBuild::new(pipeline)
//!     .with_jobs(4)
//!     .run(&["script:scielo-bundle", "style:scielo-bundle"]);
//!
//! println!("Built {} bundles in {:?}", report.success_count(), report.total_duration);
//! ```

use super::{BuildPipeline, BuildReport, BuildResult};
use super::progress::ProgressEvent;
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, warn};

/// Default number of parallel jobs (uses available parallelism).
pub fn default_jobs() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Parallel build executor.
#[derive(Debug)]
pub struct ParallelBuild {
    pipeline: BuildPipeline,
    jobs: usize,
}

impl ParallelBuild {
    /// Create a new parallel build.
    pub fn new(pipeline: BuildPipeline) -> Self {
        Self { pipeline, jobs: default_jobs() }
    }

    /// Set the number of parallel jobs.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Get the number of parallel jobs.
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Build every named bundle, results in request order.
    pub fn run<S: AsRef<str> + Sync>(&self, names: &[S]) -> BuildReport {
        let start = Instant::now();
        self.pipeline.progress().report(ProgressEvent::BuildStarted { total_bundles: names.len() });

        let results = if self.jobs == 1 || names.len() <= 1 {
            self.run_sequential(names)
        } else {
            match rayon::ThreadPoolBuilder::new().num_threads(self.jobs).build() {
                Ok(pool) => {
                    debug!(jobs = self.jobs, bundles = names.len(), "building in parallel");
                    pool.install(|| {
                        names.par_iter().map(|name| self.pipeline.build_reported(name.as_ref())).collect()
                    })
                }
                Err(e) => {
                    warn!(error = %e, "failed to start worker pool, building sequentially");
                    self.run_sequential(names)
                }
            }
        };

        let mut report = BuildReport::new();
        for result in results {
            report.add_result(result);
        }
        self.pipeline.finish(report, start)
    }

    fn run_sequential<S: AsRef<str>>(&self, names: &[S]) -> Vec<BuildResult> {
        names.iter().map(|name| self.pipeline.build_reported(name.as_ref())).collect()
    }
}
