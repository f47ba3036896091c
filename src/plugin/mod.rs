//! Plugin lifecycle host.
//!
//! Plugins hook into three stages of a build:
//!
//! - [`HookStage::Init`]: before any module is processed. May request that
//!   the output directory be cleared, and verifies plugin inputs.
//! - [`HookStage::PostResolve`]: after the module graph is complete and
//!   before any transform runs. May inject synthetic modules and artifacts.
//! - [`HookStage::PostEmit`]: after the emitter has written the build. May
//!   write additional files through the emitter.
//!
//! Handlers for a stage run one at a time, in registration order.

mod clean;
mod component;
mod copy;
mod html;

pub use clean::CleanPlugin;
pub use component::ComponentPlugin;
pub use copy::CopyPlugin;
pub use html::HtmlPlugin;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::build::emit::{EmitError, Emitter, PipelineArtifact};
use crate::build::result::ArtifactSummary;
use crate::config::{PackConfig, PluginConfig};
use crate::graph::ModuleGraph;
use crate::rules::RuleMatcher;

/// A lifecycle stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookStage {
    /// Before any file is processed
    Init,
    /// After the module graph is known
    PostResolve,
    /// After artifacts are written
    PostEmit,
}

impl std::fmt::Display for HookStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookStage::Init => write!(f, "init"),
            HookStage::PostResolve => write!(f, "post-resolve"),
            HookStage::PostEmit => write!(f, "post-emit"),
        }
    }
}

/// Errors a plugin hook may report
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PluginError {
    /// A required input file or directory does not exist
    #[error("{what} '{}' does not exist", path.display())]
    MissingInput {
        /// Description of the input
        what: String,
        /// Path that was checked
        path: PathBuf,
    },
    /// An input lives inside the output directory, which the build clears
    #[error("{what} '{}' is inside the output directory '{}'", path.display(), out_dir.display())]
    InsideOutput {
        /// Description of the input
        what: String,
        /// Input path
        path: PathBuf,
        /// Output directory
        out_dir: PathBuf,
    },
    /// File system error
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        /// Path being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// Emission through the emitter failed
    #[error(transparent)]
    Emit(#[from] EmitError),
    /// Plugin-specific rejection
    #[error("{0}")]
    Invalid(String),
}

/// A hook failure, attributed to its plugin and stage.
#[derive(Debug, Error)]
#[error("plugin '{plugin}' failed during {stage}: {source}")]
pub struct HookFailure {
    /// Plugin name
    pub plugin: String,
    /// Stage being run
    pub stage: HookStage,
    /// Plugin error
    #[source]
    pub source: PluginError,
}

/// A script the entry document must load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryScript {
    /// Entry name
    pub name: String,
    /// URL of the entry's output
    pub url: String,
}

/// State visible to `init` hooks.
#[derive(Debug)]
pub struct InitContext<'a> {
    /// Project root
    pub root: &'a Path,
    /// Output directory
    pub out_dir: &'a Path,
    /// Compiled rules
    pub rules: &'a RuleMatcher,
    clean_requested: bool,
}

impl<'a> InitContext<'a> {
    /// Create an init context.
    pub fn new(root: &'a Path, out_dir: &'a Path, rules: &'a RuleMatcher) -> Self {
        Self { root, out_dir, rules, clean_requested: false }
    }

    /// Ask the emitter to clear the output directory before writing.
    pub fn request_clean(&mut self) {
        self.clean_requested = true;
    }

    /// Whether any plugin requested a clean.
    pub fn clean_requested(&self) -> bool {
        self.clean_requested
    }

    /// Reject an input that the output directory equals or contains.
    pub fn ensure_outside_output(&self, what: &str, path: &Path) -> Result<(), PluginError> {
        if path.starts_with(self.out_dir) {
            return Err(PluginError::InsideOutput {
                what: what.to_string(),
                path: path.to_path_buf(),
                out_dir: self.out_dir.to_path_buf(),
            });
        }
        Ok(())
    }
}

/// State visible to `post-resolve` hooks.
#[derive(Debug)]
pub struct ResolveContext<'a> {
    /// Project root
    pub root: &'a Path,
    /// The complete module graph; synthetic modules may be added
    pub graph: &'a mut ModuleGraph,
    /// Scripts produced for each entry
    pub entry_scripts: &'a [EntryScript],
    artifacts: Vec<PipelineArtifact>,
    current: String,
}

impl<'a> ResolveContext<'a> {
    /// Create a post-resolve context.
    pub fn new(
        root: &'a Path,
        graph: &'a mut ModuleGraph,
        entry_scripts: &'a [EntryScript],
    ) -> Self {
        Self { root, graph, entry_scripts, artifacts: Vec::new(), current: String::new() }
    }

    /// Add an artifact attributed to the running plugin.
    pub fn emit(&mut self, path: impl Into<String>, content: Vec<u8>) {
        let artifact = PipelineArtifact::plugin(path, content, &self.current);
        self.artifacts.push(artifact);
    }

    /// Artifacts contributed by plugins so far.
    pub fn artifacts(&self) -> &[PipelineArtifact] {
        &self.artifacts
    }

    /// Take the contributed artifacts.
    pub fn into_artifacts(self) -> Vec<PipelineArtifact> {
        self.artifacts
    }
}

/// State visible to `post-emit` hooks.
#[derive(Debug)]
pub struct EmitContext<'a> {
    /// Project root
    pub root: &'a Path,
    /// The output directory's single writer
    pub emitter: &'a mut Emitter,
    written: Vec<ArtifactSummary>,
    current: String,
}

impl<'a> EmitContext<'a> {
    /// Create a post-emit context.
    pub fn new(root: &'a Path, emitter: &'a mut Emitter) -> Self {
        Self { root, emitter, written: Vec::new(), current: String::new() }
    }

    /// Write a file through the emitter, attributed to the running plugin.
    pub fn write(&mut self, path: impl Into<String>, content: Vec<u8>) -> Result<(), PluginError> {
        let artifact = PipelineArtifact::plugin(path, content, &self.current);
        self.emitter.write_artifact(&artifact)?;
        self.written.push(ArtifactSummary {
            bytes: artifact.content.len(),
            path: artifact.path,
            origin: artifact.origin,
        });
        Ok(())
    }

    /// Files written by post-emit hooks.
    pub fn written(&self) -> &[ArtifactSummary] {
        &self.written
    }

    /// Take the record of files written by post-emit hooks.
    pub fn into_written(self) -> Vec<ArtifactSummary> {
        self.written
    }
}

/// A build plugin.
///
/// Only the handlers for stages listed in [`Plugin::stages`] are invoked.
pub trait Plugin: Send + Sync {
    /// Plugin name used in logs and errors.
    fn name(&self) -> &str;

    /// Stages this plugin participates in.
    fn stages(&self) -> &[HookStage];

    /// `init` handler.
    fn init(&self, _ctx: &mut InitContext<'_>) -> Result<(), PluginError> {
        Ok(())
    }

    /// `post-resolve` handler.
    fn post_resolve(&self, _ctx: &mut ResolveContext<'_>) -> Result<(), PluginError> {
        Ok(())
    }

    /// `post-emit` handler.
    fn post_emit(&self, _ctx: &mut EmitContext<'_>) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Ordered plugin registry for one build.
#[derive(Default, Clone)]
pub struct PluginHost {
    plugins: Vec<Arc<dyn Plugin>>,
    by_stage: BTreeMap<HookStage, Vec<usize>>,
}

impl std::fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHost").field("plugins", &self.names()).finish()
    }
}

impl PluginHost {
    /// Create an empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the configured plugins.
    ///
    /// The clean plugin comes first when `output.clean` is set, followed by
    /// `[[plugins]]` in declaration order.
    pub fn from_config(config: &PackConfig) -> Self {
        let mut host = Self::new();
        if config.output.clean {
            host.register(CleanPlugin);
        }
        for plugin in &config.plugins {
            match plugin {
                PluginConfig::Html(html) => host.register(HtmlPlugin::new(html.clone())),
                PluginConfig::Copy(copy) => host.register(CopyPlugin::new(copy.clone())),
                PluginConfig::Component(component) => {
                    host.register(ComponentPlugin::new(component.clone()))
                }
            }
        }
        host
    }

    /// Register a plugin for each stage it declares.
    pub fn register<P: Plugin + 'static>(&mut self, plugin: P) {
        self.register_arc(Arc::new(plugin));
    }

    /// Register a shared plugin.
    pub fn register_arc(&mut self, plugin: Arc<dyn Plugin>) {
        let index = self.plugins.len();
        for stage in plugin.stages() {
            let slots = self.by_stage.entry(*stage).or_default();
            if !slots.contains(&index) {
                slots.push(index);
            }
        }
        self.plugins.push(plugin);
    }

    /// Plugin names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Names of the plugins registered for a stage, in dispatch order.
    pub fn stage_names(&self, stage: HookStage) -> Vec<&str> {
        self.stage_plugins(stage).map(|p| p.name()).collect()
    }

    fn stage_plugins(&self, stage: HookStage) -> impl Iterator<Item = &Arc<dyn Plugin>> {
        self.by_stage
            .get(&stage)
            .into_iter()
            .flatten()
            .filter_map(move |&i| self.plugins.get(i))
    }

    /// Run every `init` handler.
    pub fn run_init(&self, ctx: &mut InitContext<'_>) -> Result<(), HookFailure> {
        for plugin in self.stage_plugins(HookStage::Init) {
            debug!(plugin = plugin.name(), "running init hook");
            plugin.init(ctx).map_err(|source| failure(plugin.as_ref(), HookStage::Init, source))?;
        }
        Ok(())
    }

    /// Run every `post-resolve` handler.
    pub fn run_post_resolve(&self, ctx: &mut ResolveContext<'_>) -> Result<(), HookFailure> {
        for plugin in self.stage_plugins(HookStage::PostResolve) {
            debug!(plugin = plugin.name(), "running post-resolve hook");
            ctx.current = plugin.name().to_string();
            plugin
                .post_resolve(ctx)
                .map_err(|source| failure(plugin.as_ref(), HookStage::PostResolve, source))?;
        }
        Ok(())
    }

    /// Run every `post-emit` handler.
    pub fn run_post_emit(&self, ctx: &mut EmitContext<'_>) -> Result<(), HookFailure> {
        for plugin in self.stage_plugins(HookStage::PostEmit) {
            debug!(plugin = plugin.name(), "running post-emit hook");
            ctx.current = plugin.name().to_string();
            plugin
                .post_emit(ctx)
                .map_err(|source| failure(plugin.as_ref(), HookStage::PostEmit, source))?;
        }
        Ok(())
    }
}

fn failure(plugin: &dyn Plugin, stage: HookStage, source: PluginError) -> HookFailure {
    HookFailure { plugin: plugin.name().to_string(), stage, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        stages: Vec<HookStage>,
        log: Arc<Mutex<Vec<String>>>,
        fail_at: Option<HookStage>,
    }

    impl Recorder {
        fn record(&self, stage: HookStage) -> Result<(), PluginError> {
            self.log.lock().unwrap().push(format!("{}:{}", self.name, stage));
            if self.fail_at == Some(stage) {
                return Err(PluginError::Invalid("boom".to_string()));
            }
            Ok(())
        }
    }

    impl Plugin for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn stages(&self) -> &[HookStage] {
            &self.stages
        }

        fn init(&self, ctx: &mut InitContext<'_>) -> Result<(), PluginError> {
            ctx.request_clean();
            self.record(HookStage::Init)
        }

        fn post_resolve(&self, ctx: &mut ResolveContext<'_>) -> Result<(), PluginError> {
            ctx.emit(format!("{}.txt", self.name), Vec::new());
            self.record(HookStage::PostResolve)
        }

        fn post_emit(&self, _ctx: &mut EmitContext<'_>) -> Result<(), PluginError> {
            self.record(HookStage::PostEmit)
        }
    }

    fn recorder(
        name: &'static str,
        stages: &[HookStage],
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Recorder {
        Recorder { name, stages: stages.to_vec(), log: Arc::clone(log), fail_at: None }
    }

    #[test]
    fn test_stages_dispatch_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut host = PluginHost::new();
        host.register(recorder("a", &[HookStage::PostResolve, HookStage::Init], &log));
        host.register(recorder("b", &[HookStage::Init], &log));
        host.register(recorder("c", &[HookStage::PostResolve], &log));

        let root = Path::new("/p");
        let rules = RuleMatcher::default();
        let mut init = InitContext::new(root, Path::new("/p/dist"), &rules);
        host.run_init(&mut init).unwrap();
        assert!(init.clean_requested());

        let mut graph = ModuleGraph::new(root);
        let mut resolve = ResolveContext::new(root, &mut graph, &[]);
        host.run_post_resolve(&mut resolve).unwrap();
        let artifacts = resolve.into_artifacts();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:init", "b:init", "a:post-resolve", "c:post-resolve"]
        );
        assert_eq!(artifacts.len(), 2);
        assert_eq!(
            artifacts[0].origin,
            crate::build::emit::ArtifactOrigin::Plugin("a".to_string())
        );
        assert_eq!(artifacts[1].path, "c.txt");
    }

    #[test]
    fn test_undeclared_stage_not_invoked() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut host = PluginHost::new();
        host.register(recorder("only-init", &[HookStage::Init], &log));
        assert!(host.stage_names(HookStage::PostEmit).is_empty());

        let temp = tempfile::TempDir::new().unwrap();
        let mut emitter = Emitter::new(temp.path().join("dist"));
        let mut ctx = EmitContext::new(temp.path(), &mut emitter);
        host.run_post_emit(&mut ctx).unwrap();
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failure_stops_stage_and_names_plugin() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut host = PluginHost::new();
        let mut failing = recorder("bad", &[HookStage::Init], &log);
        failing.fail_at = Some(HookStage::Init);
        host.register(failing);
        host.register(recorder("after", &[HookStage::Init], &log));

        let rules = RuleMatcher::default();
        let mut init = InitContext::new(Path::new("/p"), Path::new("/p/dist"), &rules);
        let err = host.run_init(&mut init).unwrap_err();

        assert_eq!(err.plugin, "bad");
        assert_eq!(err.stage, HookStage::Init);
        assert_eq!(*log.lock().unwrap(), vec!["bad:init"]);
    }

    #[test]
    fn test_from_config_registers_clean_first() {
        let toml = r#"
[project]
name = "t"

[[plugins]]
kind = "html"

[[plugins]]
kind = "copy"
patterns = [{ from = "static" }]
"#;
        let config: PackConfig = toml::from_str(toml).unwrap();
        let host = PluginHost::from_config(&config);
        assert_eq!(host.names(), vec!["clean", "html", "copy"]);
        assert_eq!(host.stage_names(HookStage::Init), vec!["clean", "html", "copy"]);
        assert_eq!(host.stage_names(HookStage::PostEmit), vec!["copy"]);
    }

    #[test]
    fn test_from_config_without_clean() {
        let toml = r#"
[project]
name = "t"

[output]
clean = false
"#;
        let config: PackConfig = toml::from_str(toml).unwrap();
        assert!(PluginHost::from_config(&config).names().is_empty());
    }
}
