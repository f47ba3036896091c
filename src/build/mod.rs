//! Build pipeline for packline
//!
//! Turns a configured project into an output directory.
//!
//! # Overview
//!
//! The build pipeline consists of:
//! - **Discovery**: resolve entries and walk their references into a module graph
//! - **Transformation**: run each module's matched transform chain
//! - **Linking**: wrap modules into bundles (or mirror the source tree)
//! - **Emission**: clear the output directory and write every artifact
//!
//! Plugins run around these phases at the `init`, `post-resolve` and
//! `post-emit` stages.
//!
//! # Example
//!
//! ```ignore
//! use packline::build::{BuildContext, BuildPipeline};
//! use packline::config::load_config;
//!
//! let loaded = load_config(None, &std::env::current_dir()?)?;
//! let pipeline = BuildPipeline::new(BuildContext::from_loaded(loaded));
//!
//! let report = pipeline.run()?;
//! println!("{}", report.summary());
//! ```

pub mod context;
pub mod emit;
pub mod link;
pub mod pipeline;
pub mod result;

pub use context::*;
pub use emit::{check_artifacts, ArtifactOrigin, EmitError, Emitter, PipelineArtifact};
pub use link::{Linker, TransformedModule};
pub use pipeline::*;
pub use result::*;
