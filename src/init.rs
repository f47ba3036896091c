//! Project initialization for packline
//!
//! Scaffolds new projects from a small set of presets.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::CONFIG_FILE;

/// Error during project initialization
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InitError {
    /// Target directory exists and is not empty
    #[error("directory '{0}' already exists and is not empty")]
    DirectoryExists(String),
    /// Unknown preset name
    #[error("unknown preset '{0}'. Available: {}", PRESETS.join(", "))]
    UnknownPreset(String),
    /// Filesystem error
    #[error("failed to write '{}': {source}", path.display())]
    Io {
        /// File or directory being created
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Preset names accepted by [`init_project`].
pub const PRESETS: &[&str] = &["minimal", "component"];

/// Available project presets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// One script entry and a generated entry document
    Minimal,
    /// Single-file components, stylesheets, a document template and static files
    Component,
}

impl std::str::FromStr for Preset {
    type Err = InitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minimal" => Ok(Preset::Minimal),
            "component" | "vue" => Ok(Preset::Component),
            _ => Err(InitError::UnknownPreset(s.to_string())),
        }
    }
}

/// Initialize a new packline project.
///
/// # Example
/// ```ignore
/// init_project(Path::new("my-app"), "my-app", "component")?;
/// ```
pub fn init_project(path: &Path, name: &str, preset: &str) -> Result<Preset, InitError> {
    let preset: Preset = preset.parse()?;

    if path.exists() {
        let is_empty = path.read_dir().map(|mut d| d.next().is_none()).unwrap_or(false);
        if !is_empty {
            return Err(InitError::DirectoryExists(path.display().to_string()));
        }
    }

    for (rel, content) in scaffold_files(preset, name) {
        write_file(&path.join(rel), &content)?;
    }
    Ok(preset)
}

/// Relative paths and contents written for a preset.
pub fn scaffold_files(preset: Preset, name: &str) -> Vec<(&'static str, String)> {
    match preset {
        Preset::Minimal => vec![
            (CONFIG_FILE, minimal_config(name)),
            (".gitignore", gitignore()),
            ("src/index.js", minimal_script(name)),
        ],
        Preset::Component => vec![
            (CONFIG_FILE, component_config(name)),
            (".gitignore", gitignore()),
            ("src/main.js", component_main()),
            ("src/App.vue", component_app(name)),
            ("src/index.html", document_template(name)),
            ("static/robots.txt", "User-agent: *\nDisallow:\n".to_string()),
        ],
    }
}

fn write_file(path: &Path, content: &str) -> Result<(), InitError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| InitError::Io { path, source }
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    fs::write(path, content).map_err(io_err(path))
}

fn gitignore() -> String {
    "# packline output\ndist/\n\n# OS files\n.DS_Store\nThumbs.db\n".to_string()
}

fn minimal_config(name: &str) -> String {
    format!(
        r#"[project]
name = "{}"

[[plugins]]
kind = "html"
title = "{}"
"#,
        name, name
    )
}

fn minimal_script(name: &str) -> String {
    format!("console.log(\"hello from {}\");\n", name)
}

fn component_config(name: &str) -> String {
    format!(
        r#"entry = "./src/main.js"

[project]
name = "{}"

[output]
path = "dist"
clean = true

[resolve]
extensions = [".vue", ".js"]

[resolve.alias]
"~" = "src"

# Components are exported as source text. Point a command transform at a
# component compiler to replace "raw":
#
# [transforms.vue]
# command = "vue-compile"
# args = ["{{file}}"]

[[rules]]
test = '\.vue$'
use = "raw"

# Add "sass" after "css" once a [transforms.sass] command is declared.
[[rules]]
test = '\.s?css$'
use = ["style", "css"]

[[plugins]]
kind = "component"

[[plugins]]
kind = "html"
template = "src/index.html"

[[plugins]]
kind = "copy"
patterns = [{{ from = "static" }}]
"#,
        name
    )
}

fn component_main() -> String {
    r#"var App = require('~/App');

document.getElementById('app').textContent = App;
"#
    .to_string()
}

fn component_app(name: &str) -> String {
    format!(
        r#"<template>
  <h1>{}</h1>
</template>

<script>
export default {{ name: 'App' }};
</script>

<style lang="css">
h1 {{ font-family: sans-serif; color: #2c3e50; }}
</style>
"#,
        name
    )
}

fn document_template(name: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>{}</title>
</head>
<body>
  <div id="app"></div>
</body>
</html>
"#,
        name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_file;
    use tempfile::TempDir;

    #[test]
    fn test_preset_parse() {
        assert_eq!("minimal".parse::<Preset>().unwrap(), Preset::Minimal);
        assert_eq!("Component".parse::<Preset>().unwrap(), Preset::Component);
        assert!(matches!("game".parse::<Preset>(), Err(InitError::UnknownPreset(_))));
    }

    #[test]
    fn test_init_minimal() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("app");
        init_project(&dir, "app", "minimal").unwrap();

        assert!(dir.join("src/index.js").exists());
        let config = load_config_file(&dir.join(CONFIG_FILE)).unwrap();
        assert_eq!(config.project.name, "app");
        assert_eq!(config.plugins.len(), 1);
    }

    #[test]
    fn test_init_component_config_is_valid() {
        let temp = TempDir::new().unwrap();
        init_project(temp.path(), "shop", "component").unwrap();

        let config = load_config_file(&temp.path().join(CONFIG_FILE)).unwrap();
        assert!(config.validate().is_empty());
        assert_eq!(config.resolve.extensions, vec![".vue", ".js"]);
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.plugins.len(), 3);
        assert!(temp.path().join("static/robots.txt").exists());
        assert!(temp.path().join("src/App.vue").exists());
    }

    #[test]
    fn test_init_refuses_non_empty_directory() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("keep.txt"), "x").unwrap();
        let err = init_project(temp.path(), "x", "minimal").unwrap_err();
        assert!(matches!(err, InitError::DirectoryExists(_)));
    }
}
