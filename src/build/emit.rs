//! Artifact emission.
//!
//! The emitter is the only writer of the output directory. Artifacts are
//! validated as a set before anything on disk is touched; then the directory
//! is cleared (when requested) and every artifact is written in path order.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::paths::is_safe_relative;

/// Who produced an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "origin", content = "source", rename_all = "lowercase")]
pub enum ArtifactOrigin {
    /// A module (or bundle) produced by the transform chains
    Module(String),
    /// A plugin, by name
    Plugin(String),
}

impl std::fmt::Display for ArtifactOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactOrigin::Module(id) => write!(f, "module '{}'", id),
            ArtifactOrigin::Plugin(name) => write!(f, "plugin '{}'", name),
        }
    }
}

/// A unit of output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineArtifact {
    /// `/`-separated path relative to the output directory
    pub path: String,
    /// File content
    pub content: Vec<u8>,
    /// Producer
    pub origin: ArtifactOrigin,
}

impl PipelineArtifact {
    /// Artifact produced from a module.
    pub fn module(path: impl Into<String>, content: Vec<u8>, id: &str) -> Self {
        Self { path: path.into(), content, origin: ArtifactOrigin::Module(id.to_string()) }
    }

    /// Artifact produced by a plugin.
    pub fn plugin(path: impl Into<String>, content: Vec<u8>, name: &str) -> Self {
        Self { path: path.into(), content, origin: ArtifactOrigin::Plugin(name.to_string()) }
    }
}

/// Error type for emission.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EmitError {
    /// Artifact path escapes the output directory
    #[error("artifact path '{path}' from {origin} must be relative and stay inside the output directory")]
    UnsafePath {
        /// Offending path
        path: String,
        /// Producer
        origin: ArtifactOrigin,
    },
    /// Two different contents for the same path
    #[error("conflicting artifacts for '{path}': {first} and {second} produce different content")]
    Conflict {
        /// Output path
        path: String,
        /// First producer
        first: ArtifactOrigin,
        /// Second producer
        second: ArtifactOrigin,
    },
    /// Output directory could not be cleared
    #[error("failed to clear output directory '{}': {source}", path.display())]
    Clear {
        /// Output directory or entry being removed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// A write failed part-way through emission
    #[error("failed to write '{}' after {written} artifact(s) were written: {source}", path.display())]
    Write {
        /// File being written
        path: PathBuf,
        /// Artifacts successfully written before the failure
        written: usize,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl EmitError {
    /// Number of artifacts on disk when the error occurred.
    pub fn written(&self) -> usize {
        match self {
            EmitError::Write { written, .. } => *written,
            _ => 0,
        }
    }
}

/// Validate an artifact set before anything is written.
///
/// Paths must be safe relative paths. Identical duplicates are merged;
/// differing duplicates are a conflict. The result is sorted by path.
pub fn check_artifacts(
    artifacts: Vec<PipelineArtifact>,
) -> Result<Vec<PipelineArtifact>, EmitError> {
    let mut by_path: BTreeMap<String, PipelineArtifact> = BTreeMap::new();

    for artifact in artifacts {
        if !is_safe_relative(&artifact.path) {
            return Err(EmitError::UnsafePath { path: artifact.path, origin: artifact.origin });
        }
        match by_path.get(&artifact.path) {
            Some(existing) if existing.content == artifact.content => {
                debug!(path = %artifact.path, "merged identical artifact");
            }
            Some(existing) => {
                return Err(EmitError::Conflict {
                    path: artifact.path,
                    first: existing.origin.clone(),
                    second: artifact.origin,
                });
            }
            None => {
                by_path.insert(artifact.path.clone(), artifact);
            }
        }
    }

    Ok(by_path.into_values().collect())
}

/// Single writer for the output directory.
#[derive(Debug)]
pub struct Emitter {
    out_dir: PathBuf,
    written: BTreeMap<String, ArtifactOrigin>,
}

impl Emitter {
    /// Create an emitter for `out_dir`.
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir, written: BTreeMap::new() }
    }

    /// The output directory.
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Remove everything inside the output directory, creating it if needed.
    pub fn clear(&self) -> Result<(), EmitError> {
        let clear_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| EmitError::Clear { path, source }
        };

        if !self.out_dir.exists() {
            return fs::create_dir_all(&self.out_dir).map_err(clear_err(&self.out_dir));
        }

        for entry in fs::read_dir(&self.out_dir).map_err(clear_err(&self.out_dir))? {
            let entry = entry.map_err(clear_err(&self.out_dir))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(clear_err(&path))?;
            if file_type.is_dir() {
                fs::remove_dir_all(&path).map_err(clear_err(&path))?;
            } else {
                fs::remove_file(&path).map_err(clear_err(&path))?;
            }
        }
        debug!(out_dir = %self.out_dir.display(), "cleared output directory");
        Ok(())
    }

    /// Write one artifact, creating intermediate directories.
    pub fn write_artifact(&mut self, artifact: &PipelineArtifact) -> Result<(), EmitError> {
        if !is_safe_relative(&artifact.path) {
            return Err(EmitError::UnsafePath {
                path: artifact.path.clone(),
                origin: artifact.origin.clone(),
            });
        }

        let target = self.out_dir.join(&artifact.path);
        let written = self.written.len();
        let write_err = |source| EmitError::Write { path: target.clone(), written, source };

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(&target, &artifact.content).map_err(write_err)?;

        debug!(path = %artifact.path, bytes = artifact.content.len(), "wrote artifact");
        self.written.insert(artifact.path.clone(), artifact.origin.clone());
        Ok(())
    }

    /// Write every artifact in order. Stops at the first failure.
    pub fn emit_all(&mut self, artifacts: &[PipelineArtifact]) -> Result<usize, EmitError> {
        fs::create_dir_all(&self.out_dir).map_err(|source| EmitError::Write {
            path: self.out_dir.clone(),
            written: self.written.len(),
            source,
        })?;
        for artifact in artifacts {
            self.write_artifact(artifact)?;
        }
        Ok(self.written.len())
    }

    /// Whether `path` was written during this build.
    pub fn has_written(&self, path: &str) -> bool {
        self.written.contains_key(path)
    }

    /// Number of artifacts written so far.
    pub fn written_count(&self) -> usize {
        self.written.len()
    }
}
