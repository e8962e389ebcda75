//! Build executor for assetpipe
//!
//! Turns registry bundles into written artifacts.
//!
//! # Overview
//!
//! The build consists of:
//! - **Context**: configuration, project root and the bundle registry
//! - **Pipeline**: read sources, run the transform chain, write atomically
//! - **Parallel**: the same contract on a bounded worker pool
//! - **Progress**: console and JSON reporting of bundle outcomes
//!
//! # Example
//!
//! ```ignore
//! use assetpipe::build::{BuildContext, BuildPipeline};
//! use assetpipe::config::load_config;
//!
//! let config = load_config(None)?;
//! let context = BuildContext::new(config, project_root)?;
//! let pipeline = BuildPipeline::new(context);
//!
//! let report = pipeline.build_all(&["style:scielo-article"]);
//! println!("{}", report.summary());
//! ```

pub mod context;
pub mod output;
pub mod parallel;
pub mod pipeline;
pub mod progress;
pub mod result;

pub use context::*;
pub use output::*;
pub use parallel::*;
pub use pipeline::*;
pub use result::*;
