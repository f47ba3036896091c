//! packline - a module bundling pipeline
//!
//! This library provides functionality to:
//! - Resolve module references against aliases, extensions and module directories
//! - Select a transform chain for each module by ordered, first-match-wins rules
//! - Run transform chains (built-in or external commands) in parallel
//! - Drive plugins at the `init`, `post-resolve` and `post-emit` stages
//! - Emit bundles, assets and plugin output into a cleared output directory

pub mod build;
pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod init;
pub mod paths;
pub mod plugin;
pub mod resolve;
pub mod rules;
pub mod scan;
pub mod transform;

pub use build::{BuildContext, BuildPipeline, BuildReport};
pub use config::{load_config, PackConfig};
pub use error::BuildError;
