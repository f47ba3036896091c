//! Build error taxonomy.
//!
//! Every fatal condition aborts the whole build and surfaces as exactly one
//! [`BuildError`], which names the failing component, the file involved and
//! the cause.

use std::path::PathBuf;

use thiserror::Error;

use crate::build::emit::EmitError;
use crate::config::ConfigError;
use crate::graph::GraphError;
use crate::plugin::{HookFailure, HookStage, PluginError};
use crate::resolve::ResolveError;
use crate::transform::TransformError;

/// A fatal build error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BuildError {
    /// Invalid configuration or missing inputs, detected before any module is processed
    #[error("configuration error: {message}")]
    Configuration {
        /// Human-readable description
        message: String,
    },

    /// A reference could not be resolved
    #[error("unresolved module '{reference}' requested by '{}': {source}", requester.display())]
    UnresolvedModule {
        /// Reference as written
        reference: String,
        /// File containing the reference (the config file for entries)
        requester: PathBuf,
        /// Resolver error with the candidates tried
        #[source]
        source: ResolveError,
    },

    /// A transform rejected a module
    #[error("transform '{transform}' failed on '{}' (chain position {position}): {source}", file.display())]
    TransformFailure {
        /// Module being transformed
        file: PathBuf,
        /// Transform identifier
        transform: String,
        /// Zero-based position in the declared chain
        position: usize,
        /// Transform error
        #[source]
        source: TransformError,
    },

    /// A plugin hook failed after the init stage
    #[error("plugin '{plugin}' failed during {stage}: {source}")]
    PluginFailure {
        /// Plugin name
        plugin: String,
        /// Stage being run
        stage: HookStage,
        /// Plugin error
        #[source]
        source: PluginError,
    },

    /// Writing the output directory failed; the directory may be empty or partial
    #[error("emit failed ({written} artifact(s) written, output directory is incomplete): {source}")]
    EmitFailure {
        /// Artifacts on disk when the failure occurred
        written: usize,
        /// Emitter error
        #[source]
        source: EmitError,
    },

    /// A source file could not be read
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        BuildError::Configuration { message: message.into() }
    }

    /// Name of the pipeline component that raised the error.
    pub fn component(&self) -> &'static str {
        match self {
            BuildError::Configuration { .. } => "configuration",
            BuildError::UnresolvedModule { .. } => "resolver",
            BuildError::TransformFailure { .. } => "transform-chain",
            BuildError::PluginFailure { .. } => "plugin-host",
            BuildError::EmitFailure { .. } => "emitter",
            BuildError::Io { .. } => "filesystem",
        }
    }

    /// File the error is about, when there is one.
    pub fn file(&self) -> Option<PathBuf> {
        match self {
            BuildError::UnresolvedModule { requester, .. } => Some(requester.clone()),
            BuildError::TransformFailure { file, .. } => Some(file.clone()),
            BuildError::Io { path, .. } => Some(path.clone()),
            BuildError::EmitFailure { source: EmitError::Write { path, .. }, .. } => {
                Some(path.clone())
            }
            _ => None,
        }
    }
}

impl From<ConfigError> for BuildError {
    fn from(e: ConfigError) -> Self {
        BuildError::configuration(e.to_string())
    }
}

impl From<GraphError> for BuildError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::Unresolved { requester, source } => {
                let reference = match &source {
                    ResolveError::NotFound { reference, .. } => reference.clone(),
                };
                BuildError::UnresolvedModule { reference, requester, source }
            }
            GraphError::Read { path, source } => BuildError::Io { path, source },
            GraphError::ExternalEntry { .. } => BuildError::configuration(e.to_string()),
        }
    }
}

impl From<EmitError> for BuildError {
    fn from(source: EmitError) -> Self {
        BuildError::EmitFailure { written: source.written(), source }
    }
}

impl BuildError {
    /// Map a hook failure: init-stage failures are configuration errors.
    pub fn from_hook(failure: HookFailure) -> Self {
        match failure.stage {
            HookStage::Init => BuildError::configuration(format!(
                "plugin '{}': {}",
                failure.plugin, failure.source
            )),
            stage => {
                BuildError::PluginFailure { plugin: failure.plugin, stage, source: failure.source }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_hook_failure_is_configuration() {
        let err = BuildError::from_hook(HookFailure {
            plugin: "copy".to_string(),
            stage: HookStage::Init,
            source: PluginError::MissingInput {
                what: "copy source".to_string(),
                path: PathBuf::from("/p/static"),
            },
        });
        assert_eq!(err.component(), "configuration");
        assert!(err.to_string().contains("copy source '/p/static' does not exist"));
    }

    #[test]
    fn test_later_hook_failure_is_plugin_failure() {
        let err = BuildError::from_hook(HookFailure {
            plugin: "html".to_string(),
            stage: HookStage::PostResolve,
            source: PluginError::Invalid("bad template".to_string()),
        });
        assert!(matches!(err, BuildError::PluginFailure { stage: HookStage::PostResolve, .. }));
        assert_eq!(err.component(), "plugin-host");
    }

    #[test]
    fn test_unresolved_from_graph() {
        let err: BuildError = GraphError::Unresolved {
            requester: PathBuf::from("/p/src/main.js"),
            source: ResolveError::NotFound {
                reference: "./App".to_string(),
                from: PathBuf::from("/p/src"),
                tried: vec![PathBuf::from("/p/src/App.js")],
            },
        }
        .into();
        assert_eq!(err.component(), "resolver");
        assert_eq!(err.file(), Some(PathBuf::from("/p/src/main.js")));
        let message = err.to_string();
        assert!(message.contains("'./App'"));
        assert!(message.contains("/p/src/App.js"));
    }

    #[test]
    fn test_emit_failure_carries_written_count() {
        let err: BuildError = EmitError::Write {
            path: PathBuf::from("/p/dist/a.js/b.js"),
            written: 3,
            source: std::io::Error::other("not a directory"),
        }
        .into();
        assert!(matches!(err, BuildError::EmitFailure { written: 3, .. }));
        assert_eq!(err.component(), "emitter");
    }
}
