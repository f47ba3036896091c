//! Module reference resolution.
//!
//! Maps a reference as written in source (`./App`, `~/components/Hello`,
//! `lodash/merge`) to a concrete file, applying alias substitution and
//! extension inference in the configured order.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::config::PackConfig;
use crate::paths::{normalize, resolve_path, to_slash};

/// Broad category of a module, derived from its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    /// JavaScript and friends
    Script,
    /// Single-file UI component
    Component,
    /// Stylesheet
    Style,
    /// Anything else (images, fonts, data)
    Asset,
}

impl ModuleKind {
    /// Classify a path by its extension.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "js" | "mjs" | "cjs" | "jsx" | "ts" | "tsx" => ModuleKind::Script,
            "vue" | "svelte" => ModuleKind::Component,
            "css" | "scss" | "sass" | "less" | "styl" => ModuleKind::Style,
            _ => ModuleKind::Asset,
        }
    }

    /// Lowercase name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::Script => "script",
            ModuleKind::Component => "component",
            ModuleKind::Style => "style",
            ModuleKind::Asset => "asset",
        }
    }
}

impl std::fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference resolved to a file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Absolute, lexically normalized path
    pub path: PathBuf,
    /// Detected kind
    pub kind: ModuleKind,
}

impl ResolvedPath {
    /// Build a resolved path, detecting the kind from the extension.
    pub fn new(path: PathBuf) -> Self {
        let kind = ModuleKind::from_path(&path);
        Self { path, kind }
    }
}

/// Outcome of resolving a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A file that becomes part of the module graph
    Module(ResolvedPath),
    /// A bare specifier provided by a runtime global
    External(String),
}

/// Error type for resolution failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResolveError {
    /// No candidate existed
    #[error("cannot resolve '{reference}' from '{}' (tried {})", from.display(), format_tried(tried))]
    NotFound {
        /// Reference as written
        reference: String,
        /// Directory the reference was resolved from
        from: PathBuf,
        /// Every candidate path checked, in order
        tried: Vec<PathBuf>,
    },
}

fn format_tried(tried: &[PathBuf]) -> String {
    if tried.is_empty() {
        return "no candidates".to_string();
    }
    tried.iter().map(|p| to_slash(p)).collect::<Vec<_>>().join(", ")
}

#[derive(Debug, Clone)]
struct Alias {
    key: String,
    exact: bool,
    target: PathBuf,
}

impl Alias {
    /// Remainder of `reference` after the alias key, if it applies.
    fn strip<'a>(&self, reference: &'a str) -> Option<&'a str> {
        if self.exact {
            return (reference == self.key).then_some("");
        }
        let rest = reference.strip_prefix(self.key.as_str())?;
        if rest.is_empty() {
            Some(rest)
        } else {
            rest.strip_prefix('/')
        }
    }
}

/// Resolves module references against a project's resolve settings.
#[derive(Debug, Clone)]
pub struct Resolver {
    extensions: Vec<String>,
    aliases: Vec<Alias>,
    modules: Vec<PathBuf>,
    externals: BTreeMap<String, String>,
}

impl Resolver {
    /// Create a resolver with the given ordered extension list and no aliases.
    pub fn new(extensions: Vec<String>) -> Self {
        Self { extensions, aliases: Vec::new(), modules: Vec::new(), externals: BTreeMap::new() }
    }

    /// Build a resolver from configuration, anchoring relative paths at `root`.
    pub fn from_config(config: &PackConfig, root: &Path) -> Self {
        let mut resolver = Resolver::new(config.resolve.extensions.clone());
        for (key, target) in &config.resolve.alias {
            resolver = resolver.with_alias(key, resolve_path(root, target));
        }
        resolver.modules =
            config.resolve.modules.iter().map(|dir| resolve_path(root, dir)).collect();
        resolver.externals = config.resolve.externals.clone();
        resolver
    }

    /// Add an alias. A key ending in `$` only matches the exact reference.
    pub fn with_alias(mut self, key: &str, target: PathBuf) -> Self {
        let (key, exact) = match key.strip_suffix('$') {
            Some(stripped) => (stripped.to_string(), true),
            None => (key.to_string(), false),
        };
        self.aliases.push(Alias { key, exact, target: normalize(&target) });
        // Longest key first so `@app/ui` beats `@app`.
        self.aliases.sort_by(|a, b| b.key.len().cmp(&a.key.len()).then(a.key.cmp(&b.key)));
        self
    }

    /// Add a directory searched for bare specifiers.
    pub fn with_module_dir(mut self, dir: PathBuf) -> Self {
        self.modules.push(dir);
        self
    }

    /// Declare a bare specifier as provided by a runtime global.
    pub fn with_external(mut self, specifier: &str, global: &str) -> Self {
        self.externals.insert(specifier.to_string(), global.to_string());
        self
    }

    /// The ordered extension list.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Alias targets, for preflight checks.
    pub fn alias_targets(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.aliases.iter().map(|a| (a.key.as_str(), a.target.as_path()))
    }

    /// Resolve `reference` as seen from a file in `from_dir`.
    pub fn resolve(&self, reference: &str, from_dir: &Path) -> Result<Resolution, ResolveError> {
        if let Some(global) = self.externals.get(reference) {
            return Ok(Resolution::External(global.clone()));
        }

        let mut tried = Vec::new();
        let found = if let Some((alias, rest)) = self.match_alias(reference) {
            let candidate =
                if rest.is_empty() { alias.target.clone() } else { alias.target.join(rest) };
            self.load(&candidate, &mut tried)
        } else if is_relative_reference(reference) {
            self.load(&from_dir.join(reference), &mut tried)
        } else if Path::new(reference).is_absolute() {
            self.load(Path::new(reference), &mut tried)
        } else {
            self.modules.iter().find_map(|dir| self.load(&dir.join(reference), &mut tried))
        };

        match found {
            Some(path) => Ok(Resolution::Module(ResolvedPath::new(path))),
            None => Err(ResolveError::NotFound {
                reference: reference.to_string(),
                from: from_dir.to_path_buf(),
                tried,
            }),
        }
    }

    fn match_alias<'a, 'r>(&'a self, reference: &'r str) -> Option<(&'a Alias, &'r str)> {
        self.aliases.iter().find_map(|alias| alias.strip(reference).map(|rest| (alias, rest)))
    }

    /// Whether the file name ends with one of the configured extensions.
    pub fn has_recognized_extension(&self, path: &Path) -> bool {
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy(),
            None => return false,
        };
        self.extensions.iter().any(|ext| name.len() > ext.len() && name.ends_with(ext.as_str()))
    }

    fn load(&self, candidate: &Path, tried: &mut Vec<PathBuf>) -> Option<PathBuf> {
        let candidate = normalize(candidate);
        if self.has_recognized_extension(&candidate) {
            return check_file(candidate, tried);
        }
        if let Some(found) = self.load_with_extensions(&candidate, tried) {
            return Some(found);
        }
        if candidate.is_dir() {
            return self.load_directory(&candidate, tried);
        }
        None
    }

    /// Extensions in declared order, then the bare candidate.
    fn load_with_extensions(&self, candidate: &Path, tried: &mut Vec<PathBuf>) -> Option<PathBuf> {
        for ext in &self.extensions {
            let mut with_ext = candidate.as_os_str().to_owned();
            with_ext.push(ext);
            if let Some(found) = check_file(PathBuf::from(with_ext), tried) {
                return Some(found);
            }
        }
        check_file(candidate.to_path_buf(), tried)
    }

    fn load_directory(&self, dir: &Path, tried: &mut Vec<PathBuf>) -> Option<PathBuf> {
        if let Some(main) = package_main(dir) {
            let main_path = normalize(&dir.join(main));
            let found = if self.has_recognized_extension(&main_path) {
                check_file(main_path, tried)
            } else {
                self.load_with_extensions(&main_path, tried)
            };
            if found.is_some() {
                return found;
            }
        }
        self.load_with_extensions(&dir.join("index"), tried)
    }
}

fn check_file(path: PathBuf, tried: &mut Vec<PathBuf>) -> Option<PathBuf> {
    if path.is_file() {
        Some(path)
    } else {
        tried.push(path);
        None
    }
}

/// Read the `main` field of `dir/package.json`, if any.
fn package_main(dir: &Path) -> Option<String> {
    let contents = fs::read_to_string(dir.join("package.json")).ok()?;
    let manifest: serde_json::Value = serde_json::from_str(&contents).ok()?;
    manifest.get("main")?.as_str().filter(|m| !m.is_empty()).map(str::to_string)
}

fn is_relative_reference(reference: &str) -> bool {
    reference == "."
        || reference == ".."
        || reference.starts_with("./")
        || reference.starts_with("../")
}
