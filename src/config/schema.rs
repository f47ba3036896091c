//! Configuration schema types for `packline.toml`
//!
//! Defines the structure and validation rules for packline project configuration.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use crate::paths::is_safe_relative;
use crate::transform::is_builtin_transform;

/// Project metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name (required)
    pub name: String,
    /// Source root directory
    #[serde(default = "default_src")]
    pub src: PathBuf,
}

fn default_src() -> PathBuf {
    PathBuf::from("src")
}

/// Entry point declaration.
///
/// Either a single module reference (named `main`) or a table of
/// entry names to module references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryConfig {
    /// `entry = "./src/main.js"`
    Single(String),
    /// `entry = { main = "./src/main.js", admin = "./src/admin.js" }`
    Named(BTreeMap<String, String>),
}

impl Default for EntryConfig {
    fn default() -> Self {
        EntryConfig::Single("./src/index.js".to_string())
    }
}

impl EntryConfig {
    /// Entry name used for a single unnamed entry.
    pub const DEFAULT_NAME: &'static str = "main";

    /// All entries as `(name, reference)` pairs, ordered by name.
    pub fn entries(&self) -> Vec<(String, String)> {
        match self {
            EntryConfig::Single(reference) => {
                vec![(Self::DEFAULT_NAME.to_string(), reference.clone())]
            }
            EntryConfig::Named(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }

    /// Number of declared entries.
    pub fn len(&self) -> usize {
        match self {
            EntryConfig::Single(_) => 1,
            EntryConfig::Named(map) => map.len(),
        }
    }

    /// Whether no entries are declared.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How transformed modules are laid out in the output directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// One bundle per entry containing every reachable module
    #[default]
    Bundle,
    /// One output file per module, mirroring the source tree
    Files,
}

impl std::str::FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bundle" => Ok(OutputMode::Bundle),
            "files" => Ok(OutputMode::Files),
            other => Err(format!("unknown output mode '{}' (expected bundle or files)", other)),
        }
    }
}

/// Output section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory
    #[serde(default = "default_out")]
    pub path: PathBuf,
    /// Clear the output directory before writing
    #[serde(default = "default_true")]
    pub clean: bool,
    /// Bundle filename template (`[name]` is the entry name)
    #[serde(default = "default_filename")]
    pub filename: String,
    /// Output layout
    #[serde(default)]
    pub mode: OutputMode,
    /// Prefix for URLs written into generated documents and asset exports
    #[serde(default)]
    pub public_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_out(),
            clean: true,
            filename: default_filename(),
            mode: OutputMode::default(),
            public_path: String::new(),
        }
    }
}

impl OutputConfig {
    /// Render the bundle filename for an entry.
    pub fn bundle_name(&self, entry: &str) -> String {
        self.filename.replace("[name]", entry)
    }
}

fn default_out() -> PathBuf {
    PathBuf::from("dist")
}

fn default_filename() -> String {
    "[name].js".to_string()
}

fn default_true() -> bool {
    true
}

/// Module resolution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveConfig {
    /// Extensions tried, in order, for references without a recognized extension
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Alias prefix to directory (or file) substitutions
    #[serde(default)]
    pub alias: BTreeMap<String, PathBuf>,
    /// Directories searched for bare specifiers
    #[serde(default = "default_modules")]
    pub modules: Vec<PathBuf>,
    /// Bare specifiers provided by a global at runtime instead of bundled
    #[serde(default)]
    pub externals: BTreeMap<String, String>,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            alias: BTreeMap::new(),
            modules: default_modules(),
            externals: BTreeMap::new(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec![".js".to_string()]
}

fn default_modules() -> Vec<PathBuf> {
    vec![PathBuf::from("node_modules")]
}

/// One transform id or an ordered list of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UseConfig {
    /// `use = "vue"`
    One(String),
    /// `use = ["style", "css", "sass"]`
    Many(Vec<String>),
}

impl UseConfig {
    /// Transform ids in declaration order.
    pub fn ids(&self) -> Vec<String> {
        match self {
            UseConfig::One(id) => vec![id.clone()],
            UseConfig::Many(ids) => ids.clone(),
        }
    }
}

/// A `[[rules]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Regular expression matched against the module path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
    /// Plain suffix matched against the module path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    /// Regular expression excluding paths that would otherwise match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,
    /// Transform chain, listed closest-to-output first
    #[serde(rename = "use")]
    pub uses: UseConfig,
    /// Output extension for matched modules in `files` mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emit_extension: Option<String>,
}

/// An external command transform (`[transforms.<id>]`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandTransformConfig {
    /// Program to run
    pub command: String,
    /// Arguments; `{file}` and `{dir}` are substituted per module
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Where generated script tags go in the entry document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InjectMode {
    /// Before `</head>`
    #[default]
    Head,
    /// Before `</body>`
    Body,
    /// Do not inject
    None,
}

/// How generated script tags load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScriptLoading {
    /// `<script defer="defer" ...>`
    #[default]
    Defer,
    /// Plain `<script ...>`
    Blocking,
    /// `<script type="module" ...>`
    Module,
}

/// Entry document generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtmlPluginConfig {
    /// Template document; a built-in shell is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,
    /// Output filename
    #[serde(default = "default_html_filename")]
    pub filename: String,
    /// Document title for the built-in shell
    #[serde(default = "default_title")]
    pub title: String,
    /// Script tag placement
    #[serde(default)]
    pub inject: InjectMode,
    /// Script tag loading attribute
    #[serde(default)]
    pub script_loading: ScriptLoading,
}

impl Default for HtmlPluginConfig {
    fn default() -> Self {
        Self {
            template: None,
            filename: default_html_filename(),
            title: default_title(),
            inject: InjectMode::default(),
            script_loading: ScriptLoading::default(),
        }
    }
}

fn default_html_filename() -> String {
    "index.html".to_string()
}

fn default_title() -> String {
    "Packline App".to_string()
}

/// A single copy source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyPattern {
    /// File or directory to copy (relative to the project root)
    pub from: PathBuf,
    /// Destination sub-directory inside the output directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<PathBuf>,
    /// Glob patterns (relative to `from`) to skip
    #[serde(default)]
    pub ignore: Vec<String>,
    /// Overwrite files already emitted by this build
    #[serde(default)]
    pub force: bool,
}

/// Static file copying
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CopyPluginConfig {
    /// Copy sources
    #[serde(default)]
    pub patterns: Vec<CopyPattern>,
}

/// Single-file component support
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentPluginConfig {
    /// Component file extension
    #[serde(default = "default_component_extension")]
    pub extension: String,
}

impl Default for ComponentPluginConfig {
    fn default() -> Self {
        Self { extension: default_component_extension() }
    }
}

fn default_component_extension() -> String {
    ".vue".to_string()
}

/// A `[[plugins]]` entry, selected by `kind`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PluginConfig {
    /// Generate the entry document
    Html(HtmlPluginConfig),
    /// Copy static files into the output
    Copy(CopyPluginConfig),
    /// Split component style blocks into stylesheet modules
    Component(ComponentPluginConfig),
}

impl PluginConfig {
    /// The `kind` string of this plugin.
    pub fn kind(&self) -> &'static str {
        match self {
            PluginConfig::Html(_) => "html",
            PluginConfig::Copy(_) => "copy",
            PluginConfig::Component(_) => "component",
        }
    }
}

/// Build execution settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BuildSettings {
    /// Worker threads for the transform phase (default: available parallelism)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
}

/// Complete packline.toml configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackConfig {
    /// Project metadata (required)
    pub project: ProjectConfig,
    /// Entry points
    #[serde(default)]
    pub entry: EntryConfig,
    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,
    /// Resolution settings
    #[serde(default)]
    pub resolve: ResolveConfig,
    /// Ordered transform rules; first match wins
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
    /// External command transforms
    #[serde(default)]
    pub transforms: BTreeMap<String, CommandTransformConfig>,
    /// Ordered plugin list
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
    /// Build execution settings
    #[serde(default)]
    pub build: BuildSettings,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "rules[1].test")
    pub field: String,
    /// Error message
    pub message: String,
}

impl ConfigValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "packline.toml: '{}' {}", self.field, self.message)
    }
}

impl PackConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.project.name.is_empty() {
            errors.push(ConfigValidationError::new("project.name", "must be a non-empty string"));
        }
        if self.project.src.as_os_str().is_empty() {
            errors.push(ConfigValidationError::new("project.src", "must be a non-empty path"));
        }

        self.validate_entries(&mut errors);
        self.validate_output(&mut errors);
        self.validate_resolve(&mut errors);
        self.validate_transforms(&mut errors);
        self.validate_rules(&mut errors);
        self.validate_plugins(&mut errors);

        if self.build.jobs == Some(0) {
            errors.push(ConfigValidationError::new("build.jobs", "must be a positive integer"));
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Whether a transform id is known (built-in or declared).
    pub fn knows_transform(&self, id: &str) -> bool {
        is_builtin_transform(id) || self.transforms.contains_key(id)
    }

    fn validate_entries(&self, errors: &mut Vec<ConfigValidationError>) {
        if self.entry.is_empty() {
            errors.push(ConfigValidationError::new("entry", "must declare at least one entry"));
        }
        for (name, reference) in self.entry.entries() {
            if name.is_empty() {
                errors.push(ConfigValidationError::new("entry", "entry names must be non-empty"));
            }
            if reference.is_empty() {
                errors.push(ConfigValidationError::new(
                    format!("entry.{}", name),
                    "must be a non-empty module reference",
                ));
            }
        }
    }

    fn validate_output(&self, errors: &mut Vec<ConfigValidationError>) {
        let out = &self.output.path;
        if out.as_os_str().is_empty() || out == &PathBuf::from(".") {
            errors.push(ConfigValidationError::new(
                "output.path",
                "must name a dedicated directory (it is cleared on every build)",
            ));
        }

        if self.entry.len() > 1 && !self.output.filename.contains("[name]") {
            errors.push(ConfigValidationError::new(
                "output.filename",
                "must contain [name] when several entries are declared",
            ));
        }
        let sample = self.output.bundle_name("main");
        if !is_safe_relative(&sample) {
            errors.push(ConfigValidationError::new(
                "output.filename",
                "must be a relative path without '..'",
            ));
        }
    }

    fn validate_resolve(&self, errors: &mut Vec<ConfigValidationError>) {
        let mut seen = HashSet::new();
        for (i, ext) in self.resolve.extensions.iter().enumerate() {
            if ext.len() < 2 || !ext.starts_with('.') {
                errors.push(ConfigValidationError::new(
                    format!("resolve.extensions[{}]", i),
                    format!("'{}' must start with '.' and name an extension", ext),
                ));
            }
            if !seen.insert(ext) {
                errors.push(ConfigValidationError::new(
                    format!("resolve.extensions[{}]", i),
                    format!("'{}' is listed more than once", ext),
                ));
            }
        }

        for (key, target) in &self.resolve.alias {
            if key.is_empty() || key == "$" {
                errors.push(ConfigValidationError::new(
                    "resolve.alias",
                    "alias keys must be non-empty",
                ));
            }
            if target.as_os_str().is_empty() {
                errors.push(ConfigValidationError::new(
                    format!("resolve.alias.{}", key),
                    "must name a target path",
                ));
            }
        }

        for (name, global) in &self.resolve.externals {
            if global.is_empty() {
                errors.push(ConfigValidationError::new(
                    format!("resolve.externals.{}", name),
                    "must name a global",
                ));
            }
        }
    }

    fn validate_transforms(&self, errors: &mut Vec<ConfigValidationError>) {
        for (id, transform) in &self.transforms {
            if is_builtin_transform(id) {
                errors.push(ConfigValidationError::new(
                    format!("transforms.{}", id),
                    "shadows a built-in transform",
                ));
            }
            if transform.command.is_empty() {
                errors.push(ConfigValidationError::new(
                    format!("transforms.{}.command", id),
                    "must be a non-empty program name",
                ));
            }
        }
    }

    fn validate_rules(&self, errors: &mut Vec<ConfigValidationError>) {
        let mut patterns: Vec<(Option<&str>, Option<&str>, Option<&str>)> = Vec::new();

        for (i, rule) in self.rules.iter().enumerate() {
            let field = format!("rules[{}]", i);

            match (&rule.test, &rule.suffix) {
                (Some(_), Some(_)) => errors.push(ConfigValidationError::new(
                    &field,
                    "must set only one of 'test' and 'suffix'",
                )),
                (None, None) => errors.push(ConfigValidationError::new(
                    &field,
                    "must set one of 'test' or 'suffix'",
                )),
                _ => {}
            }

            if let Some(test) = &rule.test {
                if let Err(e) = Regex::new(test) {
                    errors.push(ConfigValidationError::new(
                        format!("{}.test", field),
                        format!("is not a valid regex: {}", e),
                    ));
                }
            }
            if let Some(suffix) = &rule.suffix {
                if suffix.is_empty() {
                    errors.push(ConfigValidationError::new(
                        format!("{}.suffix", field),
                        "must be non-empty",
                    ));
                }
            }
            if let Some(exclude) = &rule.exclude {
                if let Err(e) = Regex::new(exclude) {
                    errors.push(ConfigValidationError::new(
                        format!("{}.exclude", field),
                        format!("is not a valid regex: {}", e),
                    ));
                }
            }

            let ids = rule.uses.ids();
            if ids.is_empty() {
                errors.push(ConfigValidationError::new(
                    format!("{}.use", field),
                    "must list at least one transform",
                ));
            }
            for id in &ids {
                if !self.knows_transform(id) {
                    errors.push(ConfigValidationError::new(
                        format!("{}.use", field),
                        format!("unknown transform '{}'", id),
                    ));
                }
            }

            if let Some(ext) = &rule.emit_extension {
                if !ext.starts_with('.') || ext.contains('/') {
                    errors.push(ConfigValidationError::new(
                        format!("{}.emit_extension", field),
                        "must start with '.' and contain no '/'",
                    ));
                }
            }

            let key = (rule.test.as_deref(), rule.suffix.as_deref(), rule.exclude.as_deref());
            if let Some(first) = patterns.iter().position(|p| *p == key) {
                errors.push(ConfigValidationError::new(
                    &field,
                    format!("is unreachable: rules[{}] has the same pattern", first),
                ));
            }
            patterns.push(key);
        }
    }

    fn validate_plugins(&self, errors: &mut Vec<ConfigValidationError>) {
        for (i, plugin) in self.plugins.iter().enumerate() {
            let field = format!("plugins[{}]", i);
            match plugin {
                PluginConfig::Html(html) => {
                    if !is_safe_relative(&html.filename) {
                        errors.push(ConfigValidationError::new(
                            format!("{}.filename", field),
                            "must be a relative path without '..'",
                        ));
                    }
                }
                PluginConfig::Copy(copy) => {
                    if copy.patterns.is_empty() {
                        errors.push(ConfigValidationError::new(
                            format!("{}.patterns", field),
                            "must contain at least one pattern",
                        ));
                    }
                    for (j, pattern) in copy.patterns.iter().enumerate() {
                        if pattern.from.as_os_str().is_empty() {
                            errors.push(ConfigValidationError::new(
                                format!("{}.patterns[{}].from", field, j),
                                "must be a non-empty path",
                            ));
                        }
                        if let Some(to) = &pattern.to {
                            let to = crate::paths::to_slash(to);
                            if !to.is_empty() && !is_safe_relative(&to) {
                                errors.push(ConfigValidationError::new(
                                    format!("{}.patterns[{}].to", field, j),
                                    "must be a relative path without '..'",
                                ));
                            }
                        }
                        for ignore in &pattern.ignore {
                            if let Err(e) = glob::Pattern::new(ignore) {
                                errors.push(ConfigValidationError::new(
                                    format!("{}.patterns[{}].ignore", field, j),
                                    format!("invalid glob '{}': {}", ignore, e),
                                ));
                            }
                        }
                    }
                }
                PluginConfig::Component(component) => {
                    if component.extension.len() < 2 || !component.extension.starts_with('.') {
                        errors.push(ConfigValidationError::new(
                            format!("{}.extension", field),
                            "must start with '.'",
                        ));
                    }
                }
            }
        }
    }
}
