//! Build context containing configuration and paths for a build.

use crate::config::{LoadedConfig, PackConfig, CONFIG_FILE};
use crate::paths;
use std::path::{Path, PathBuf};

/// Default number of parallel jobs (uses available parallelism).
pub fn default_jobs() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Build context containing configuration and paths for a build operation.
///
/// The context provides access to all information needed to execute a build,
/// including the configuration, project root, and output directory.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// The loaded configuration
    config: PackConfig,
    /// Project root directory (where packline.toml is located)
    project_root: PathBuf,
    /// Config file, when one was loaded
    config_path: Option<PathBuf>,
    /// Plan the build without writing anything
    dry_run: bool,
}

impl BuildContext {
    /// Create a new build context.
    ///
    /// A relative `project_root` is made absolute against the current
    /// directory so module paths and ids are stable.
    pub fn new(config: PackConfig, project_root: PathBuf) -> Self {
        let project_root = if project_root.is_absolute() {
            paths::normalize(&project_root)
        } else {
            std::env::current_dir()
                .map(|cwd| paths::normalize(&cwd.join(&project_root)))
                .unwrap_or(project_root)
        };
        Self { config, project_root, config_path: None, dry_run: false }
    }

    /// Create a context from a loaded configuration.
    pub fn from_loaded(loaded: LoadedConfig) -> Self {
        let LoadedConfig { config, root, path } = loaded;
        let mut context = Self::new(config, root);
        context.config_path = path;
        context
    }

    /// Get the configuration.
    pub fn config(&self) -> &PackConfig {
        &self.config
    }

    /// Get the project root directory.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Get the source directory (resolved to absolute path).
    pub fn src_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.project.src)
    }

    /// Get the output directory (resolved to absolute path).
    pub fn out_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.output.path)
    }

    /// The file reported as the requester of entry modules.
    pub fn config_label(&self) -> PathBuf {
        self.config_path.clone().unwrap_or_else(|| self.project_root.join(CONFIG_FILE))
    }

    /// Worker threads for the transform phase.
    pub fn jobs(&self) -> usize {
        self.config.build.jobs.unwrap_or_else(default_jobs).max(1)
    }

    /// Whether this is a dry run.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Set dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set the config file path used in diagnostics.
    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    /// Resolve a path relative to the project root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        paths::resolve_path(&self.project_root, path)
    }
}
