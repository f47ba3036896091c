//! Build report types.
//!
//! Contains types for representing the outcome of a build run.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::build::emit::ArtifactOrigin;
use crate::config::OutputMode;
use crate::resolve::ModuleKind;

/// A module processed by the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleSummary {
    /// Module id
    pub id: String,
    /// Detected kind
    pub kind: ModuleKind,
    /// Transform chain applied, in declaration order
    pub chain: Vec<String>,
}

/// An artifact in the output set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSummary {
    /// Path relative to the output directory
    pub path: String,
    /// Producer
    #[serde(flatten)]
    pub origin: ArtifactOrigin,
    /// Size in bytes
    pub bytes: usize,
}

/// Result of a complete build run.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    /// Project name
    pub project: String,
    /// Output directory
    pub out_dir: PathBuf,
    /// Output layout
    pub mode: OutputMode,
    /// Modules in id order
    pub modules: Vec<ModuleSummary>,
    /// Artifacts in path order (copied files last)
    pub artifacts: Vec<ArtifactSummary>,
    /// Non-fatal diagnostics
    pub warnings: Vec<String>,
    /// Whether the output directory was cleared
    pub cleaned: bool,
    /// Whether this was a dry run (nothing written)
    pub dry_run: bool,
    /// Total build duration
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

fn serialize_millis<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

impl BuildReport {
    /// Number of artifacts produced by modules.
    pub fn module_artifact_count(&self) -> usize {
        self.artifacts.iter().filter(|a| matches!(a.origin, ArtifactOrigin::Module(_))).count()
    }

    /// Number of artifacts produced by plugins.
    pub fn plugin_artifact_count(&self) -> usize {
        self.artifacts.iter().filter(|a| matches!(a.origin, ArtifactOrigin::Plugin(_))).count()
    }

    /// Total bytes across all artifacts.
    pub fn total_bytes(&self) -> usize {
        self.artifacts.iter().map(|a| a.bytes).sum()
    }

    /// Format a summary of the build.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        let verb = if self.dry_run { "Planned" } else { "Built" };
        lines.push(format!(
            "{} {}: {} modules -> {} artifacts ({} from plugins, {} bytes) in {:?}",
            verb,
            self.project,
            self.modules.len(),
            self.artifacts.len(),
            self.plugin_artifact_count(),
            self.total_bytes(),
            self.duration
        ));

        for artifact in &self.artifacts {
            lines.push(format!(
                "  {} ({} bytes, {})",
                artifact.path, artifact.bytes, artifact.origin
            ));
        }

        if !self.warnings.is_empty() {
            lines.push(format!("Warnings ({}): ", self.warnings.len()));
            for warning in self.warnings.iter().take(5) {
                lines.push(format!("  - {}", warning));
            }
            if self.warnings.len() > 5 {
                lines.push(format!("  ... and {} more", self.warnings.len() - 5));
            }
        }

        lines.join("\n")
    }
}
