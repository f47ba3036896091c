//! Build pipeline orchestration.
//!
//! One run goes through fixed phases: preflight, `init` hooks, module graph
//! discovery, `post-resolve` hooks, transform chains (in parallel), linking,
//! artifact validation, emission and `post-emit` hooks. Every fatal
//! condition aborts the run with a single [`BuildError`].

use std::collections::BTreeMap;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::build::emit::{check_artifacts, Emitter, PipelineArtifact};
use crate::build::link::{Linker, TransformedModule};
use crate::build::result::{ArtifactSummary, BuildReport, ModuleSummary};
use crate::build::BuildContext;
use crate::error::BuildError;
use crate::graph::{Module, ModuleGraph, ModuleId};
use crate::plugin::{EmitContext, InitContext, PluginHost, ResolveContext};
use crate::resolve::Resolver;
use crate::rules::RuleMatcher;
use crate::transform::TransformRegistry;

/// Build pipeline for one project.
#[derive(Debug)]
pub struct BuildPipeline {
    /// Build context
    context: BuildContext,
    /// Registered plugins
    plugins: PluginHost,
    /// Available transforms
    transforms: TransformRegistry,
}

impl BuildPipeline {
    /// Create a pipeline with the plugins and transforms from configuration.
    pub fn new(context: BuildContext) -> Self {
        let plugins = PluginHost::from_config(context.config());
        let transforms = TransformRegistry::from_config(context.config());
        Self { context, plugins, transforms }
    }

    /// Replace the plugin host.
    pub fn with_plugins(mut self, plugins: PluginHost) -> Self {
        self.plugins = plugins;
        self
    }

    /// Replace the transform registry.
    pub fn with_transforms(mut self, transforms: TransformRegistry) -> Self {
        self.transforms = transforms;
        self
    }

    /// The build context.
    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    /// Run the whole build.
    pub fn run(&self) -> Result<BuildReport, BuildError> {
        let start = Instant::now();
        let config = self.context.config();
        let root = self.context.project_root();
        let out_dir = self.context.out_dir();
        let mut warnings = Vec::new();

        info!(project = %config.project.name, root = %root.display(), "starting build");

        let (resolver, rules) = self.preflight()?;

        let clean = {
            let mut ctx = InitContext::new(root, &out_dir, &rules);
            self.plugins.run_init(&mut ctx).map_err(BuildError::from_hook)?;
            ctx.clean_requested()
        };

        let config_label = self.context.config_label();
        let mut graph =
            ModuleGraph::discover(root, &config.entry.entries(), &resolver, &config_label)?;
        info!(modules = graph.len(), entries = graph.entries().len(), "module graph complete");

        let src_dir = self.context.src_dir();
        let linker = Linker::new(config, root, &src_dir);
        let entry_scripts = linker.entry_scripts(&graph, &rules);

        let plugin_artifacts = {
            let mut ctx = ResolveContext::new(root, &mut graph, &entry_scripts);
            self.plugins.run_post_resolve(&mut ctx).map_err(BuildError::from_hook)?;
            ctx.into_artifacts()
        };
        graph.scan_pending(&resolver)?;

        warnings.extend(overlap_warnings(&graph, &rules));

        let transformed = self.transform_all(&graph, &rules, &linker)?;
        info!(modules = transformed.len(), "transforms complete");

        let mut artifacts = linker.link(&graph, &transformed);
        artifacts.extend(plugin_artifacts);
        let artifacts = check_artifacts(artifacts)?;

        let modules = graph
            .modules()
            .map(|m| ModuleSummary {
                id: m.id.clone(),
                kind: m.kind,
                chain: transformed.get(&m.id).map(|t| t.chain.clone()).unwrap_or_default(),
            })
            .collect();
        let mut summaries: Vec<ArtifactSummary> = artifacts.iter().map(summarize).collect();

        let dry_run = self.context.is_dry_run();
        if dry_run {
            info!(artifacts = artifacts.len(), "dry run, nothing written");
        } else {
            let mut emitter = Emitter::new(out_dir.clone());
            if clean {
                emitter.clear()?;
            }
            let written = emitter.emit_all(&artifacts)?;
            info!(written, out_dir = %out_dir.display(), "artifacts emitted");

            let mut ctx = EmitContext::new(root, &mut emitter);
            self.plugins.run_post_emit(&mut ctx).map_err(BuildError::from_hook)?;
            summaries.extend(ctx.into_written());
        }

        Ok(BuildReport {
            project: config.project.name.clone(),
            out_dir,
            mode: config.output.mode,
            modules,
            artifacts: summaries,
            warnings,
            cleaned: clean && !dry_run,
            dry_run,
            duration: start.elapsed(),
        })
    }

    /// Filesystem checks that must pass before any module is processed.
    fn preflight(&self) -> Result<(Resolver, RuleMatcher), BuildError> {
        let config = self.context.config();
        let root = self.context.project_root();

        let errors = config.validate();
        if !errors.is_empty() {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            return Err(BuildError::configuration(messages.join("; ")));
        }

        let src_dir = self.context.src_dir();
        if !src_dir.is_dir() {
            return Err(BuildError::configuration(format!(
                "source root '{}' does not exist",
                src_dir.display()
            )));
        }

        let out_dir = self.context.out_dir();
        if out_dir == root {
            return Err(BuildError::configuration("output directory must not be the project root"));
        }
        if src_dir.starts_with(&out_dir) {
            return Err(BuildError::configuration(format!(
                "output directory '{}' contains the source root",
                out_dir.display()
            )));
        }

        let resolver = Resolver::from_config(config, root);
        for (key, target) in resolver.alias_targets() {
            if !target.exists() {
                return Err(BuildError::configuration(format!(
                    "alias '{}' points to missing path '{}'",
                    key,
                    target.display()
                )));
            }
            if target.starts_with(&out_dir) {
                return Err(BuildError::configuration(format!(
                    "alias '{}' points into the output directory '{}'",
                    key,
                    out_dir.display()
                )));
            }
        }

        let rules = RuleMatcher::from_config(config)
            .map_err(|e| BuildError::configuration(format!("invalid rule pattern: {}", e)))?;

        debug!(rules = rules.rules().len(), plugins = ?self.plugins.names(), "preflight passed");
        Ok((resolver, rules))
    }

    /// Run every module's chain on a worker pool.
    ///
    /// Results are gathered in module-id order, so the failure reported is
    /// the one with the smallest id regardless of scheduling.
    fn transform_all(
        &self,
        graph: &ModuleGraph,
        rules: &RuleMatcher,
        linker: &Linker<'_>,
    ) -> Result<BTreeMap<ModuleId, TransformedModule>, BuildError> {
        let modules: Vec<&Module> = graph.modules().collect();
        let run = || -> Vec<Result<TransformedModule, BuildError>> {
            modules.par_iter().map(|module| self.transform_module(module, rules, linker)).collect()
        };

        let jobs = self.context.jobs();
        let results = match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
            Ok(pool) => pool.install(run),
            Err(e) => {
                warn!(error = %e, "could not start worker pool, transforming on the global pool");
                run()
            }
        };

        let mut transformed = BTreeMap::new();
        for result in results {
            let module = result?;
            transformed.insert(module.id.clone(), module);
        }
        Ok(transformed)
    }

    fn transform_module(
        &self,
        module: &Module,
        rules: &RuleMatcher,
        linker: &Linker<'_>,
    ) -> Result<TransformedModule, BuildError> {
        let matched = rules.match_path(&module.path);
        let chain = matched.chain();
        if chain.is_empty() {
            debug!(module = %module.id, "no rule matched, passing through");
            return Ok(linker.pass_through(module));
        }

        debug!(module = %module.id, chain = ?chain, "running transform chain");
        let output = self
            .transforms
            .run_chain(chain, module.content.clone(), &module.path)
            .map_err(|failure| BuildError::TransformFailure {
                file: module.path.clone(),
                transform: failure.transform,
                position: failure.position,
                source: failure.source,
            })?;

        Ok(TransformedModule {
            id: module.id.clone(),
            chain: chain.to_vec(),
            content: output.content,
            artifacts: output.artifacts,
            emit_extension: matched.emit_extension().map(str::to_string),
        })
    }
}

/// Warnings for modules matched by more than one rule.
fn overlap_warnings(graph: &ModuleGraph, rules: &RuleMatcher) -> Vec<String> {
    let mut warnings = Vec::new();
    for module in graph.modules() {
        let matching = rules.matching_rules(&module.path);
        if let [first, shadowed @ ..] = matching.as_slice() {
            if shadowed.is_empty() {
                continue;
            }
            let names: Vec<String> =
                shadowed.iter().map(|r| format!("#{} ({})", r.index, r.pattern.source())).collect();
            let message = format!(
                "'{}' matches rule #{} ({}); shadowed rule(s) {} never apply",
                module.id,
                first.index,
                first.pattern.source(),
                names.join(", ")
            );
            warn!("{}", message);
            warnings.push(message);
        }
    }
    warnings
}

fn summarize(artifact: &PipelineArtifact) -> ArtifactSummary {
    ArtifactSummary {
        path: artifact.path.clone(),
        origin: artifact.origin.clone(),
        bytes: artifact.content.len(),
    }
}

/// Convenience wrapper: build the project described by `context`.
pub fn build(context: BuildContext) -> Result<BuildReport, BuildError> {
    BuildPipeline::new(context).run()
}
