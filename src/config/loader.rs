//! Configuration loading and discovery for `packline.toml`
//!
//! Provides functions to find, load, and merge configuration.

use super::schema::{
    BuildSettings, EntryConfig, OutputConfig, OutputMode, PackConfig, ProjectConfig,
    ResolveConfig,
};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the configuration file.
pub const CONFIG_FILE: &str = "packline.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse packline.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", format_problems(.0))]
    Validation(Vec<String>),
}

fn format_problems(problems: &[String]) -> String {
    problems.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n")
}

/// CLI arguments that can override config values
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Override output directory
    pub out: Option<PathBuf>,
    /// Override output layout
    pub mode: Option<OutputMode>,
    /// Number of parallel jobs
    pub jobs: Option<usize>,
}

/// A loaded configuration together with the directory it applies to.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Parsed and validated configuration
    pub config: PackConfig,
    /// Project root (the directory holding `packline.toml`)
    pub root: PathBuf,
    /// Config file path, or `None` for the zero-config default
    pub path: Option<PathBuf>,
}

impl LoadedConfig {
    /// Label used when the config file is the requester of an entry.
    pub fn source_label(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| self.root.join(CONFIG_FILE))
    }
}

/// Find packline.toml by walking up from a specific directory.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILE);
        if config_path.is_file() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Find packline.toml by walking up from the current working directory.
pub fn find_config() -> Option<PathBuf> {
    env::current_dir().ok().and_then(find_config_from)
}

/// Load configuration.
///
/// With an explicit path the file must exist. Otherwise the nearest
/// `packline.toml` above `start` is used, falling back to the zero-config
/// default rooted at `start`.
///
/// # Example
/// ```ignore
/// let loaded = load_config(None, Path::new("."))?;
/// println!("building {}", loaded.config.project.name);
/// ```
pub fn load_config(path: Option<&Path>, start: &Path) -> Result<LoadedConfig, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config_from(start.to_path_buf()),
    };

    match config_path {
        Some(p) => {
            let config = load_config_file(&p)?;
            let root = project_root(&p)
                .filter(|r| !r.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            Ok(LoadedConfig { config, root, path: Some(p) })
        }
        None => {
            Ok(LoadedConfig {
                config: default_config(start),
                root: start.to_path_buf(),
                path: None,
            })
        }
    }
}

/// Load configuration from a specific file path.
pub fn load_config_file(path: &Path) -> Result<PackConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config: PackConfig = toml::from_str(&contents)?;

    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }

    Ok(config)
}

/// Create a default configuration when no packline.toml is found.
///
/// The project name is the directory name.
pub fn default_config(dir: &Path) -> PackConfig {
    let project_name = dir
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unnamed".to_string());

    PackConfig {
        project: ProjectConfig { name: project_name, src: PathBuf::from("src") },
        entry: EntryConfig::default(),
        output: OutputConfig::default(),
        resolve: ResolveConfig::default(),
        rules: Vec::new(),
        transforms: BTreeMap::new(),
        plugins: Vec::new(),
        build: BuildSettings::default(),
    }
}

/// Merge CLI overrides into a configuration.
///
/// CLI arguments take precedence over config file values.
pub fn merge_cli_overrides(config: &mut PackConfig, overrides: &CliOverrides) {
    if let Some(ref out) = overrides.out {
        config.output.path = out.clone();
    }

    if let Some(mode) = overrides.mode {
        config.output.mode = mode;
    }

    if let Some(jobs) = overrides.jobs {
        config.build.jobs = Some(jobs);
    }
}

/// Get the project root directory from a config file path.
pub fn project_root(config_path: &Path) -> Option<&Path> {
    config_path.parent()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join(CONFIG_FILE);
        fs::write(&path, contents).expect("should write config content");
        path
    }

    #[test]
    fn test_find_config_in_current_dir() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(temp.path(), "[project]\nname = \"test\"");

        let found = find_config_from(temp.path().to_path_buf());
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_config_in_parent_dir() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(temp.path(), "[project]\nname = \"test\"");

        let subdir = temp.path().join("src").join("components");
        fs::create_dir_all(&subdir).expect("should create subdirectories");

        let found = find_config_from(subdir);
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_config_not_found() {
        let temp = TempDir::new().expect("should create temp dir");
        let found = find_config_from(temp.path().to_path_buf());
        assert_eq!(found, None);
    }

    #[test]
    fn test_load_config_from_file() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(
            temp.path(),
            r#"
entry = "./src/main.js"

[project]
name = "test-project"

[resolve]
extensions = [".vue", ".js"]
"#,
        );

        let loaded =
            load_config(Some(&config_path), temp.path()).expect("should load valid config");
        assert_eq!(loaded.config.project.name, "test-project");
        assert_eq!(loaded.root, temp.path());
        assert_eq!(loaded.path, Some(config_path));
        assert_eq!(loaded.config.resolve.extensions.len(), 2);
    }

    #[test]
    fn test_load_config_discovers_from_start() {
        let temp = TempDir::new().expect("should create temp dir");
        write_config(temp.path(), "[project]\nname = \"found\"");
        let nested = temp.path().join("src");
        fs::create_dir_all(&nested).expect("should create src");

        let loaded = load_config(None, &nested).expect("should discover config");
        assert_eq!(loaded.config.project.name, "found");
        assert_eq!(loaded.root, temp.path());
    }

    #[test]
    fn test_load_config_missing_explicit_file_errors() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = temp.path().join("nonexistent.toml");

        let result = load_config(Some(&config_path), temp.path());
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_no_file_uses_defaults() {
        let temp = TempDir::new().expect("should create temp dir");

        let loaded = load_config(None, temp.path()).expect("should fall back to defaults");
        assert!(loaded.path.is_none());
        assert_eq!(loaded.config.output.path, PathBuf::from("dist"));
        assert_eq!(loaded.config.entry, EntryConfig::Single("./src/index.js".to_string()));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(temp.path(), "this is not valid toml {{{");

        let result = load_config(Some(&config_path), temp.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_validation_error() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(
            temp.path(),
            r#"
[project]
name = ""

[build]
jobs = 0
"#,
        );

        match load_config(Some(&config_path), temp.path()) {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_cli_overrides() {
        let temp = TempDir::new().expect("should create temp dir");
        let mut config = default_config(temp.path());
        let overrides = CliOverrides {
            out: Some(PathBuf::from("public")),
            mode: Some(OutputMode::Files),
            jobs: Some(2),
        };

        merge_cli_overrides(&mut config, &overrides);
        assert_eq!(config.output.path, PathBuf::from("public"));
        assert_eq!(config.output.mode, OutputMode::Files);
        assert_eq!(config.build.jobs, Some(2));
    }

    #[test]
    fn test_merge_cli_overrides_empty_keeps_values() {
        let temp = TempDir::new().expect("should create temp dir");
        let mut config = default_config(temp.path());
        merge_cli_overrides(&mut config, &CliOverrides::default());
        assert_eq!(config.output.path, PathBuf::from("dist"));
        assert_eq!(config.build.jobs, None);
    }

    #[test]
    fn test_project_root() {
        let config_path = Path::new("/project/packline.toml");
        assert_eq!(project_root(config_path), Some(Path::new("/project")));
    }

    #[test]
    fn test_default_config_is_valid() {
        let temp = TempDir::new().expect("should create temp dir");
        let config = default_config(temp.path());
        assert!(!config.project.name.is_empty());
        assert!(config.is_valid());
    }
}
