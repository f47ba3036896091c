//! Static file copying.

use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;
use tracing::{debug, warn};

use super::{EmitContext, HookStage, InitContext, Plugin, PluginError};
use crate::config::{CopyPattern, CopyPluginConfig};
use crate::paths::{relative_slash, resolve_path, to_slash};

/// Copies files verbatim into the output directory after emission.
#[derive(Debug, Clone)]
pub struct CopyPlugin {
    config: CopyPluginConfig,
}

/// A file selected by a copy pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyEntry {
    /// Source file
    pub source: PathBuf,
    /// Destination relative to the output directory
    pub dest: String,
}

impl CopyPlugin {
    /// Create from configuration.
    pub fn new(config: CopyPluginConfig) -> Self {
        Self { config }
    }

    /// Files selected by one pattern, sorted by destination.
    pub fn collect(pattern: &CopyPattern, root: &Path) -> Result<Vec<CopyEntry>, PluginError> {
        let from = resolve_path(root, &pattern.from);
        let prefix = pattern.to.as_deref().map(to_slash).unwrap_or_default();
        let dest_for = |rel: &str| {
            if prefix.is_empty() {
                rel.to_string()
            } else {
                format!("{}/{}", prefix.trim_end_matches('/'), rel)
            }
        };

        if from.is_file() {
            let name =
                from.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            return Ok(vec![CopyEntry { dest: dest_for(&name), source: from }]);
        }
        if !from.is_dir() {
            return Err(PluginError::MissingInput {
                what: "copy source".to_string(),
                path: from,
            });
        }

        let ignore = pattern
            .ignore
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| {
                    PluginError::Invalid(format!("invalid ignore glob '{}': {}", p, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let walk = format!("{}/**/*", Pattern::escape(&from.to_string_lossy()));
        let paths = glob::glob(&walk).map_err(|e| PluginError::Invalid(e.to_string()))?;

        let mut entries = Vec::new();
        for path in paths {
            let path = path.map_err(|e| {
                let path = e.path().to_path_buf();
                PluginError::Io { path, source: e.into_error() }
            })?;
            if !path.is_file() {
                continue;
            }
            let Some(rel) = relative_slash(&path, &from) else {
                continue;
            };
            if ignore.iter().any(|p| p.matches(&rel)) {
                debug!(file = %rel, "ignored by copy pattern");
                continue;
            }
            entries.push(CopyEntry { dest: dest_for(&rel), source: path });
        }
        entries.sort_by(|a, b| a.dest.cmp(&b.dest));
        Ok(entries)
    }
}

impl Plugin for CopyPlugin {
    fn name(&self) -> &str {
        "copy"
    }

    fn stages(&self) -> &[HookStage] {
        &[HookStage::Init, HookStage::PostEmit]
    }

    fn init(&self, ctx: &mut InitContext<'_>) -> Result<(), PluginError> {
        for pattern in &self.config.patterns {
            let from = resolve_path(ctx.root, &pattern.from);
            if !from.exists() {
                return Err(PluginError::MissingInput {
                    what: "copy source".to_string(),
                    path: from,
                });
            }
            ctx.ensure_outside_output("copy source", &from)?;
        }
        Ok(())
    }

    fn post_emit(&self, ctx: &mut EmitContext<'_>) -> Result<(), PluginError> {
        for pattern in &self.config.patterns {
            for entry in Self::collect(pattern, ctx.root)? {
                if ctx.emitter.has_written(&entry.dest) && !pattern.force {
                    warn!(
                        file = %entry.dest,
                        "not copying over an artifact of this build (set force = true to overwrite)"
                    );
                    continue;
                }
                let content = fs::read(&entry.source)
                    .map_err(|source| PluginError::Io { path: entry.source.clone(), source })?;
                ctx.write(entry.dest, content)?;
            }
        }
        Ok(())
    }
}
