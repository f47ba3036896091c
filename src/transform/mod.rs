//! Transform chains.
//!
//! A transform is an external collaborator with the contract
//! `(content, path) -> content`. The core only sequences them: a chain is
//! declared closest-to-output first and executed from the last entry to the
//! first, each step consuming the previous step's output.

mod builtin;
mod command;

pub use builtin::{
    CssTransform, FileTransform, InlineTransform, JsonTransform, RawTransform, StyleTransform,
};
pub use command::CommandTransform;
pub(crate) use builtin::{hashed_asset_path, url_export};

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::config::PackConfig;

/// Identifiers of the transforms shipped with packline.
pub const BUILTIN_TRANSFORMS: &[&str] =
    &["raw", "json", "css", "css-minify", "style", "file", "inline"];

/// Whether `id` names a built-in transform.
pub fn is_builtin_transform(id: &str) -> bool {
    BUILTIN_TRANSFORMS.contains(&id)
}

/// Errors a transform may report
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransformError {
    /// Input is not UTF-8 text
    #[error("input is not valid UTF-8")]
    InvalidUtf8,
    /// JSON parse error
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// CSS parse or print error from lightningcss
    #[error("CSS error: {0}")]
    Css(String),
    /// External command could not be started
    #[error("failed to run '{program}': {source}")]
    Spawn {
        /// Program name
        program: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// External command exited unsuccessfully
    #[error("'{program}' exited with {status}: {stderr}")]
    Exit {
        /// Program name
        program: String,
        /// Exit status description
        status: String,
        /// Captured standard error
        stderr: String,
    },
    /// Transform id not present in the registry
    #[error("unknown transform '{0}'")]
    Unknown(String),
    /// Any other rejection
    #[error("{0}")]
    Rejected(String),
}

impl<T: std::fmt::Display> From<lightningcss::error::Error<T>> for TransformError {
    fn from(e: lightningcss::error::Error<T>) -> Self {
        TransformError::Css(e.to_string())
    }
}

/// An additional file produced by a transform alongside its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedFile {
    /// Path relative to the output directory
    pub path: String,
    /// File content
    pub content: Vec<u8>,
}

/// The result of one transform step or a whole chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOutput {
    /// Transformed content
    pub content: Vec<u8>,
    /// Extra files to emit
    pub artifacts: Vec<EmittedFile>,
}

impl TransformOutput {
    /// Output with content only.
    pub fn content(content: impl Into<Vec<u8>>) -> Self {
        Self { content: content.into(), artifacts: Vec::new() }
    }
}

/// A single content transform.
pub trait Transform: Send + Sync {
    /// Identifier used in rule chains.
    fn name(&self) -> &str;

    /// Transform `content` read from (or derived from) `path`.
    fn apply(&self, content: Vec<u8>, path: &Path) -> Result<TransformOutput, TransformError>;
}

/// A transform failure within a chain.
#[derive(Debug, Error)]
#[error("transform '{transform}' (position {position} of {chain_len}) failed: {source}")]
pub struct ChainFailure {
    /// Failing transform id
    pub transform: String,
    /// Zero-based position in the declared chain
    pub position: usize,
    /// Declared chain length
    pub chain_len: usize,
    /// Transform error
    #[source]
    pub source: TransformError,
}

/// Options for the built-in transforms.
#[derive(Debug, Clone, Default)]
pub struct BuiltinOptions {
    /// URL prefix for files emitted by the `file` transform
    pub public_path: String,
}

/// Transforms keyed by identifier.
#[derive(Clone, Default)]
pub struct TransformRegistry {
    transforms: BTreeMap<String, Arc<dyn Transform>>,
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformRegistry").field("ids", &self.ids()).finish()
    }
}

impl TransformRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in transform.
    pub fn with_builtins(options: &BuiltinOptions) -> Self {
        let mut registry = Self::new();
        registry.register(RawTransform);
        registry.register(JsonTransform);
        registry.register(CssTransform::new(false));
        registry.register(CssTransform::new(true));
        registry.register(StyleTransform);
        registry.register(FileTransform::new(&options.public_path));
        registry.register(InlineTransform);
        registry
    }

    /// Built-ins plus the command transforms declared in configuration.
    pub fn from_config(config: &PackConfig) -> Self {
        let mut registry =
            Self::with_builtins(&BuiltinOptions { public_path: config.output.public_path.clone() });
        for (id, command) in &config.transforms {
            registry.register(CommandTransform::from_config(id, command));
        }
        registry
    }

    /// Register a transform under its own name, replacing any previous one.
    pub fn register<T: Transform + 'static>(&mut self, transform: T) {
        self.transforms.insert(transform.name().to_string(), Arc::new(transform));
    }

    /// Look up a transform.
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Transform>> {
        self.transforms.get(id)
    }

    /// Whether a transform is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.transforms.contains_key(id)
    }

    /// Registered identifiers in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        self.transforms.keys().map(String::as_str).collect()
    }

    /// Run a declared chain over `content`, last entry first.
    ///
    /// Artifacts from every step are accumulated; on failure everything
    /// produced for this file is dropped.
    pub fn run_chain(
        &self,
        chain: &[String],
        content: Vec<u8>,
        path: &Path,
    ) -> Result<TransformOutput, ChainFailure> {
        let mut output = TransformOutput::content(content);

        for (position, id) in chain.iter().enumerate().rev() {
            let fail = |source| ChainFailure {
                transform: id.clone(),
                position,
                chain_len: chain.len(),
                source,
            };
            let transform = self.get(id).ok_or_else(|| fail(TransformError::Unknown(id.clone())))?;

            debug!(transform = %id, position, path = %path.display(), "applying transform");
            let step = transform.apply(output.content, path).map_err(fail)?;
            output.content = step.content;
            output.artifacts.extend(step.artifacts);
        }

        Ok(output)
    }
}

/// Decode UTF-8 input for text transforms.
pub(crate) fn as_text(content: Vec<u8>) -> Result<String, TransformError> {
    String::from_utf8(content).map_err(|_| TransformError::InvalidUtf8)
}
