//! Assetpipe - declarative bundling of front-end scripts and stylesheets
//!
//! This library provides functionality to:
//! - Describe bundles in `assets.toml` and resolve them in a typed registry
//! - Concatenate, debug-strip and minify scripts with source maps
//! - Compile LESS stylesheets and minify the resulting CSS
//! - Rebuild bundle groups on file changes with per-group debouncing

pub mod build;
pub mod cli;
pub mod config;
pub mod error;
pub mod less;
pub mod registry;
pub mod transforms;
pub mod watch;
