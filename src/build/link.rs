//! Linking transformed modules into output artifacts.
//!
//! `bundle` mode wraps every module reachable from an entry in a small
//! module-registry runtime. Each module keeps its own specifier map, so
//! module text is never rewritten. `files` mode mirrors the source tree.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};

use crate::build::emit::PipelineArtifact;
use crate::config::{OutputMode, PackConfig};
use crate::graph::{DependencyTarget, Module, ModuleGraph, ModuleId};
use crate::paths::{relative_slash, to_slash};
use crate::plugin::EntryScript;
use crate::resolve::ModuleKind;
use crate::rules::RuleMatcher;
use crate::transform::{hashed_asset_path, url_export, EmittedFile};

/// A module after its transform chain ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedModule {
    /// Module id
    pub id: ModuleId,
    /// Chain that was applied, in declaration order
    pub chain: Vec<String>,
    /// Final content
    pub content: Vec<u8>,
    /// Extra files declared by transforms
    pub artifacts: Vec<EmittedFile>,
    /// Output extension override (files mode)
    pub emit_extension: Option<String>,
}

const RUNTIME_HEAD: &str = r#"(function (modules, entry) {
  var cache = {};
  function load(id) {
    if (cache[id]) return cache[id].exports;
    var def = modules[id];
    var module = (cache[id] = { exports: {} });
    def[2].forEach(load);
    def[0].call(module.exports, module, module.exports, function (request) {
      var target = def[1][request];
      if (target === undefined) {
        throw new Error("Cannot find module '" + request + "' from '" + id + "'");
      }
      return typeof target === "string" ? load(target) : globalThis[target.global];
    });
    return module.exports;
  }
  return load(entry);
})({
"#;

/// Builds output artifacts from transformed modules.
#[derive(Debug)]
pub struct Linker<'a> {
    config: &'a PackConfig,
    root: PathBuf,
    src_dir: PathBuf,
}

impl<'a> Linker<'a> {
    /// Create a linker for a project.
    pub fn new(config: &'a PackConfig, root: &Path, src_dir: &Path) -> Self {
        Self { config, root: root.to_path_buf(), src_dir: src_dir.to_path_buf() }
    }

    /// Output path of a module in `files` mode.
    pub fn file_output_path(&self, module: &Module, emit_extension: Option<&str>) -> String {
        let rel = relative_slash(&module.path, &self.src_dir)
            .or_else(|| relative_slash(&module.path, &self.root))
            .unwrap_or_else(|| {
                let name = module.path.file_name().map(|n| n.to_string_lossy().into_owned());
                name.unwrap_or_default()
            });
        match emit_extension {
            Some(ext) => to_slash(&Path::new(&rel).with_extension(ext.trim_start_matches('.'))),
            None => rel,
        }
    }

    /// Scripts the entry document must load, one per entry.
    pub fn entry_scripts(&self, graph: &ModuleGraph, rules: &RuleMatcher) -> Vec<EntryScript> {
        graph
            .entries()
            .iter()
            .map(|(name, id)| {
                let path = match self.config.output.mode {
                    OutputMode::Bundle => self.config.output.bundle_name(name),
                    OutputMode::Files => match graph.get(id) {
                        Some(module) => {
                            let ext = rules.match_path(&module.path).emit_extension();
                            self.file_output_path(module, ext)
                        }
                        None => id.clone(),
                    },
                };
                let url = format!("{}{}", self.config.output.public_path, path);
                EntryScript { name: name.clone(), url }
            })
            .collect()
    }

    /// Result for a module whose chain is empty.
    ///
    /// In bundle mode anything that is not a script becomes a hashed asset
    /// file whose module exports its URL; otherwise content passes through.
    pub fn pass_through(&self, module: &Module) -> TransformedModule {
        if self.config.output.mode == OutputMode::Bundle && module.kind != ModuleKind::Script {
            let emitted = hashed_asset_path(&module.path, &module.content);
            let url = format!("{}{}", self.config.output.public_path, emitted);
            return TransformedModule {
                id: module.id.clone(),
                chain: Vec::new(),
                content: url_export(&url),
                artifacts: vec![EmittedFile { path: emitted, content: module.content.clone() }],
                emit_extension: None,
            };
        }
        TransformedModule {
            id: module.id.clone(),
            chain: Vec::new(),
            content: module.content.clone(),
            artifacts: Vec::new(),
            emit_extension: None,
        }
    }

    /// Produce every module artifact for the build.
    pub fn link(
        &self,
        graph: &ModuleGraph,
        transformed: &BTreeMap<ModuleId, TransformedModule>,
    ) -> Vec<PipelineArtifact> {
        let mut artifacts = Vec::new();

        for module in transformed.values() {
            for extra in &module.artifacts {
                let content = extra.content.clone();
                artifacts.push(PipelineArtifact::module(extra.path.clone(), content, &module.id));
            }
        }

        match self.config.output.mode {
            OutputMode::Bundle => {
                for (name, entry_id) in graph.entries() {
                    let content = self.bundle(graph, transformed, entry_id);
                    artifacts.push(PipelineArtifact::module(
                        self.config.output.bundle_name(name),
                        content.into_bytes(),
                        entry_id,
                    ));
                }
            }
            OutputMode::Files => {
                for module in graph.modules() {
                    if let Some(done) = transformed.get(&module.id) {
                        let path = self.file_output_path(module, done.emit_extension.as_deref());
                        let content = done.content.clone();
                        artifacts.push(PipelineArtifact::module(path, content, &module.id));
                    }
                }
            }
        }

        artifacts
    }

    /// Render the bundle for one entry.
    pub fn bundle(
        &self,
        graph: &ModuleGraph,
        transformed: &BTreeMap<ModuleId, TransformedModule>,
        entry_id: &str,
    ) -> String {
        let ids: BTreeSet<ModuleId> = graph.reachable_from(entry_id).into_iter().collect();

        let mut out = String::from(RUNTIME_HEAD);
        for id in &ids {
            let (Some(module), Some(done)) = (graph.get(id), transformed.get(id)) else {
                continue;
            };
            let (deps, implicit) = dependency_maps(module);
            out.push_str(&Value::String(id.clone()).to_string());
            out.push_str(": [function (module, exports, require) {\n");
            out.push_str(&String::from_utf8_lossy(&done.content));
            if !done.content.ends_with(b"\n") {
                out.push('\n');
            }
            out.push_str("}, ");
            out.push_str(&deps.to_string());
            out.push_str(", ");
            out.push_str(&implicit.to_string());
            out.push_str("],\n");
        }
        out.push_str("}, ");
        out.push_str(&Value::String(entry_id.to_string()).to_string());
        out.push_str(");\n");
        out
    }
}

/// Specifier map and implicit-load list for a module.
fn dependency_maps(module: &Module) -> (Value, Value) {
    let mut deps = Map::new();
    let mut implicit = Vec::new();
    for dep in &module.dependencies {
        let target = match &dep.target {
            DependencyTarget::Module(id) => Value::String(id.clone()),
            DependencyTarget::External(global) => json!({ "global": global }),
        };
        if dep.implicit {
            if let DependencyTarget::Module(id) = &dep.target {
                implicit.push(Value::String(id.clone()));
            }
        }
        deps.insert(dep.specifier.clone(), target);
    }
    (Value::Object(deps), Value::Array(implicit))
}
