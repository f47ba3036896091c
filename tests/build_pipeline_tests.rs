//! Build pipeline integration tests
//!
//! Each test lays out a project in a temporary directory, loads its
//! `packline.toml` and runs the whole pipeline against the real filesystem.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile::TempDir;

use packline::build::{BuildContext, BuildPipeline, BuildReport};
use packline::config::load_config;
use packline::error::BuildError;
use packline::init::init_project;
use packline::resolve::{ModuleKind, Resolution, Resolver};
use packline::transform::{
    EmittedFile, Transform, TransformError, TransformOutput, TransformRegistry,
};

// ============================================================================
// Test Utilities
// ============================================================================

/// Create a file (and its parent directories) under `root`.
fn create_test_file(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// Build context for the project whose config lives in `root`.
fn context(root: &Path) -> BuildContext {
    let loaded = load_config(Some(&root.join("packline.toml")), root).unwrap();
    BuildContext::from_loaded(loaded)
}

fn build(root: &Path) -> Result<BuildReport, BuildError> {
    BuildPipeline::new(context(root)).run()
}

/// Every file under `dir` keyed by `/`-separated relative path.
fn read_tree(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(&current).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let rel = path.strip_prefix(dir).unwrap().to_string_lossy().replace('\\', "/");
                files.insert(rel, fs::read(&path).unwrap());
            }
        }
    }
    files
}

/// Appends `>name` to its input so the execution order is visible.
struct Tag(String);

impl Transform for Tag {
    fn name(&self) -> &str {
        &self.0
    }

    fn apply(&self, mut content: Vec<u8>, _path: &Path) -> Result<TransformOutput, TransformError> {
        content.extend_from_slice(format!(">{}", self.0).as_bytes());
        Ok(TransformOutput::content(content))
    }
}

/// Counts invocations.
struct Counting(Arc<AtomicUsize>);

impl Transform for Counting {
    fn name(&self) -> &str {
        "count"
    }

    fn apply(&self, content: Vec<u8>, _path: &Path) -> Result<TransformOutput, TransformError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(TransformOutput::content(content))
    }
}

/// Declares two extra files whose paths collide on disk.
struct Colliding;

impl Transform for Colliding {
    fn name(&self) -> &str {
        "collide"
    }

    fn apply(&self, content: Vec<u8>, _path: &Path) -> Result<TransformOutput, TransformError> {
        Ok(TransformOutput {
            content,
            artifacts: vec![
                EmittedFile { path: "a.js".to_string(), content: b"a".to_vec() },
                EmittedFile { path: "a.js/b.js".to_string(), content: b"b".to_vec() },
            ],
        })
    }
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn test_alias_reference_prefers_first_extension() {
    let temp = TempDir::new().unwrap();
    let hello = create_test_file(temp.path(), "src/components/Hello.vue", "<template/>");

    let resolver = Resolver::new(vec![".vue".to_string(), ".js".to_string()])
        .with_alias("~", temp.path().join("src"));
    let resolved = resolver.resolve("~/components/Hello", &temp.path().join("src/deep")).unwrap();

    match resolved {
        Resolution::Module(found) => {
            assert_eq!(found.path, hello);
            assert_eq!(found.kind, ModuleKind::Component);
        }
        other => panic!("expected a module, got {:?}", other),
    }
}

#[test]
fn test_commented_out_references_are_not_dependencies() {
    let temp = TempDir::new().unwrap();
    create_test_file(temp.path(), "packline.toml", "[project]\nname = \"comments\"\n");
    create_test_file(
        temp.path(),
        "src/index.js",
        "// import Old from './Old';\n/* require('./legacy') */\nmodule.exports = 1;\n",
    );

    let report = build(temp.path()).unwrap();
    let ids: Vec<&str> = report.modules.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["src/index.js"]);
}

#[test]
fn test_component_style_imports_join_the_graph() {
    let temp = TempDir::new().unwrap();
    init_project(temp.path(), "themed", "component").unwrap();
    create_test_file(
        temp.path(),
        "src/App.vue",
        "<template><h1>hi</h1></template>\n\
         <script>\nmodule.exports = { name: 'App' };\n</script>\n\
         <style lang=\"css\">\n@import './theme.css';\nh1 { color: red; }\n</style>\n",
    );
    create_test_file(temp.path(), "src/theme.css", "body { margin: 0; }\n");

    let report = build(temp.path()).unwrap();
    assert!(report.modules.iter().any(|m| m.id == "src/theme.css"));
    let bundle = fs::read_to_string(temp.path().join("dist/main.js")).unwrap();
    assert!(bundle.contains("{\"./theme.css\":\"src/theme.css\"}"));
}

#[test]
fn test_unresolved_reference_names_requester() {
    let temp = TempDir::new().unwrap();
    create_test_file(
        temp.path(),
        "packline.toml",
        "entry = \"./src/main.js\"\n[project]\nname = \"x\"\n",
    );
    let main = create_test_file(temp.path(), "src/main.js", "import Missing from './Missing';\n");

    let err = build(temp.path()).unwrap_err();
    match &err {
        BuildError::UnresolvedModule { reference, requester, .. } => {
            assert_eq!(reference, "./Missing");
            assert_eq!(requester, &main);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("Missing.js"));
    assert!(!temp.path().join("dist").exists());
}

// ============================================================================
// Rules and transform chains
// ============================================================================

#[test]
fn test_chain_executes_last_declared_first() {
    let temp = TempDir::new().unwrap();
    create_test_file(
        temp.path(),
        "packline.toml",
        r#"entry = "./src/main.js"

[project]
name = "chain"

[transforms.sass]
command = "sass"

[[rules]]
test = '\.s?css$'
use = ["style", "css", "sass"]
"#,
    );
    create_test_file(temp.path(), "src/main.js", "require('./theme.scss');\n");
    create_test_file(temp.path(), "src/theme.scss", "x");

    let mut transforms = TransformRegistry::new();
    for id in ["style", "css", "sass"] {
        transforms.register(Tag(id.to_string()));
    }
    let report =
        BuildPipeline::new(context(temp.path())).with_transforms(transforms).run().unwrap();

    let bundle = fs::read_to_string(temp.path().join("dist/main.js")).unwrap();
    assert!(bundle.contains("x>sass>css>style"));
    let theme = report.modules.iter().find(|m| m.id == "src/theme.scss").unwrap();
    assert_eq!(theme.chain, vec!["style", "css", "sass"]);
}

#[test]
fn test_overlapping_rules_first_declared_wins() {
    let temp = TempDir::new().unwrap();
    create_test_file(
        temp.path(),
        "packline.toml",
        r#"entry = "./src/main.js"

[project]
name = "overlap"

[[rules]]
test = '\.css$'
use = "first"

[[rules]]
suffix = "theme.css"
use = "second"

[transforms.first]
command = "first"

[transforms.second]
command = "second"
"#,
    );
    create_test_file(temp.path(), "src/main.js", "require('./theme.css');\n");
    create_test_file(temp.path(), "src/theme.css", "c");

    let mut transforms = TransformRegistry::new();
    transforms.register(Tag("first".to_string()));
    transforms.register(Tag("second".to_string()));
    let report =
        BuildPipeline::new(context(temp.path())).with_transforms(transforms).run().unwrap();

    let bundle = fs::read_to_string(temp.path().join("dist/main.js")).unwrap();
    assert!(bundle.contains("c>first"));
    assert!(!bundle.contains(">second"));
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("src/theme.css"));
}

#[cfg(unix)]
#[test]
fn test_command_transforms() {
    let temp = TempDir::new().unwrap();
    create_test_file(
        temp.path(),
        "packline.toml",
        r#"entry = "./src/main.js"

[project]
name = "commands"

[transforms.upper]
command = "tr"
args = ["a-z", "A-Z"]

[[rules]]
test = '\.txt$'
use = ["raw", "upper"]
"#,
    );
    create_test_file(temp.path(), "src/main.js", "var note = require('./note.txt');\n");
    create_test_file(temp.path(), "src/note.txt", "hello");

    build(temp.path()).unwrap();
    let bundle = fs::read_to_string(temp.path().join("dist/main.js")).unwrap();
    assert!(bundle.contains("module.exports = \"HELLO\";"));
}

#[cfg(unix)]
#[test]
fn test_failing_command_aborts_with_transform_failure() {
    let temp = TempDir::new().unwrap();
    create_test_file(
        temp.path(),
        "packline.toml",
        r#"entry = "./src/main.js"

[project]
name = "commands"

[transforms.broken]
command = "sh"
args = ["-c", "echo boom >&2; exit 3"]

[[rules]]
test = '\.txt$'
use = ["raw", "broken"]
"#,
    );
    create_test_file(temp.path(), "src/main.js", "require('./note.txt');\n");
    let note = create_test_file(temp.path(), "src/note.txt", "hello");
    create_test_file(temp.path(), "dist/previous.js", "old");

    let err = build(temp.path()).unwrap_err();
    match &err {
        BuildError::TransformFailure { file, transform, position, source } => {
            assert_eq!(file, &note);
            assert_eq!(transform, "broken");
            assert_eq!(*position, 1);
            assert!(source.to_string().contains("boom"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.component(), "transform-chain");
    // Nothing was emitted, so the previous output is untouched.
    assert!(temp.path().join("dist/previous.js").exists());
}

// ============================================================================
// Plugins
// ============================================================================

#[test]
fn test_missing_copy_source_fails_before_transforms() {
    let temp = TempDir::new().unwrap();
    create_test_file(
        temp.path(),
        "packline.toml",
        r#"entry = "./src/main.js"

[project]
name = "copy"

[transforms.count]
command = "count"

[[rules]]
test = '\.js$'
use = "count"

[[plugins]]
kind = "copy"
patterns = [{ from = "static" }]
"#,
    );
    create_test_file(temp.path(), "src/main.js", "module.exports = 1;\n");

    let calls = Arc::new(AtomicUsize::new(0));
    let mut transforms = TransformRegistry::new();
    transforms.register(Counting(calls.clone()));
    let err =
        BuildPipeline::new(context(temp.path())).with_transforms(transforms).run().unwrap_err();

    assert_eq!(err.component(), "configuration");
    assert!(err.to_string().contains("static"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!temp.path().join("dist").exists());
}

#[test]
fn test_output_over_copy_source_is_rejected() {
    let temp = TempDir::new().unwrap();
    create_test_file(
        temp.path(),
        "packline.toml",
        r#"[project]
name = "overlap"

[output]
path = "static"

[[plugins]]
kind = "copy"
patterns = [{ from = "static" }]
"#,
    );
    create_test_file(temp.path(), "src/index.js", "module.exports = 1;\n");
    create_test_file(temp.path(), "static/favicon.ico", "ico");

    let err = build(temp.path()).unwrap_err();
    assert_eq!(err.component(), "configuration");
    assert!(err.to_string().contains("inside the output directory"));
    assert_eq!(fs::read_to_string(temp.path().join("static/favicon.ico")).unwrap(), "ico");
}

#[test]
fn test_component_project_end_to_end() {
    let temp = TempDir::new().unwrap();
    init_project(temp.path(), "shop", "component").unwrap();

    let report = build(temp.path()).unwrap();
    let dist = temp.path().join("dist");

    let html = fs::read_to_string(dist.join("index.html")).unwrap();
    assert!(html.contains("<title>shop</title>"));
    assert!(html.contains("<script defer=\"defer\" src=\"main.js\"></script></head>"));

    let bundle = fs::read_to_string(dist.join("main.js")).unwrap();
    assert!(bundle.contains("\"src/App.vue\""));
    assert!(bundle.contains("\"src/App.vue.0.css\""));
    assert!(bundle.contains("document.createElement(\"style\")"));
    assert!(bundle.contains("{\"~/App\":\"src/App.vue\"}"));

    assert_eq!(fs::read_to_string(dist.join("robots.txt")).unwrap(), "User-agent: *\nDisallow:\n");

    let paths: Vec<&str> = report.artifacts.iter().map(|a| a.path.as_str()).collect();
    assert_eq!(paths, vec!["index.html", "main.js", "robots.txt"]);
    assert_eq!(report.plugin_artifact_count(), 2);
}

// ============================================================================
// Emission
// ============================================================================

#[test]
fn test_rebuild_is_byte_identical() {
    let temp = TempDir::new().unwrap();
    init_project(temp.path(), "shop", "component").unwrap();
    create_test_file(temp.path(), "src/logo.png", "PNG");
    create_test_file(
        temp.path(),
        "src/main.js",
        "var App = require('~/App');\nvar logo = require('./logo.png');\n",
    );

    build(temp.path()).unwrap();
    let first = read_tree(&temp.path().join("dist"));
    build(temp.path()).unwrap();
    let second = read_tree(&temp.path().join("dist"));

    assert_eq!(first, second);
    assert!(first.keys().any(|k| k.starts_with("assets/logo.")));
}

#[test]
fn test_clean_removes_previous_output() {
    let temp = TempDir::new().unwrap();
    create_test_file(temp.path(), "packline.toml", "[project]\nname = \"clean\"\n");
    create_test_file(temp.path(), "src/index.js", "module.exports = 1;\n");
    create_test_file(temp.path(), "dist/stale/old.js", "old");

    let report = build(temp.path()).unwrap();
    assert!(report.cleaned);
    let tree = read_tree(&temp.path().join("dist"));
    assert_eq!(tree.keys().collect::<Vec<_>>(), vec!["main.js"]);
}

#[test]
fn test_clean_disabled_keeps_previous_output() {
    let temp = TempDir::new().unwrap();
    create_test_file(
        temp.path(),
        "packline.toml",
        "[project]\nname = \"keep\"\n\n[output]\nclean = false\n",
    );
    create_test_file(temp.path(), "src/index.js", "module.exports = 1;\n");
    create_test_file(temp.path(), "dist/old.js", "old");

    let report = build(temp.path()).unwrap();
    assert!(!report.cleaned);
    assert!(temp.path().join("dist/old.js").exists());
    assert!(temp.path().join("dist/main.js").exists());
}

#[test]
fn test_emit_failure_reports_partial_output() {
    let temp = TempDir::new().unwrap();
    create_test_file(
        temp.path(),
        "packline.toml",
        r#"[project]
name = "collide"

[transforms.collide]
command = "collide"

[[rules]]
test = '\.js$'
use = "collide"
"#,
    );
    create_test_file(temp.path(), "src/index.js", "module.exports = 1;\n");
    create_test_file(temp.path(), "dist/stale.js", "old");

    let mut transforms = TransformRegistry::new();
    transforms.register(Colliding);
    let err =
        BuildPipeline::new(context(temp.path())).with_transforms(transforms).run().unwrap_err();

    assert!(matches!(err, BuildError::EmitFailure { written: 1, .. }));
    assert_eq!(err.component(), "emitter");
    let tree = read_tree(&temp.path().join("dist"));
    assert_eq!(tree.keys().collect::<Vec<_>>(), vec!["a.js"]);
}

#[test]
fn test_dry_run_plans_without_writing() {
    let temp = TempDir::new().unwrap();
    init_project(temp.path(), "shop", "component").unwrap();
    create_test_file(temp.path(), "dist/keep.txt", "kept");

    let report = BuildPipeline::new(context(temp.path()).with_dry_run(true)).run().unwrap();
    assert!(report.dry_run);
    assert!(report.summary().starts_with("Planned shop"));
    assert!(report.artifacts.iter().any(|a| a.path == "index.html"));

    let tree = read_tree(&temp.path().join("dist"));
    assert_eq!(tree.keys().collect::<Vec<_>>(), vec!["keep.txt"]);
}

#[test]
fn test_files_mode_mirrors_source_tree() {
    let temp = TempDir::new().unwrap();
    create_test_file(
        temp.path(),
        "packline.toml",
        r#"[project]
name = "files"

[output]
mode = "files"

[[rules]]
test = '\.json$'
use = "json"
emit_extension = ".js"
"#,
    );
    create_test_file(temp.path(), "src/index.js", "require('./data/config.json');\n");
    create_test_file(temp.path(), "src/data/config.json", "{\"debug\": true}");

    build(temp.path()).unwrap();
    let tree = read_tree(&temp.path().join("dist"));
    assert_eq!(tree.keys().collect::<Vec<_>>(), vec!["data/config.js", "index.js"]);
    assert_eq!(tree["index.js"], b"require('./data/config.json');\n".to_vec());
    let config = String::from_utf8(tree["data/config.js"].clone()).unwrap();
    assert!(config.starts_with("module.exports = "));
}

#[test]
fn test_externals_are_not_bundled() {
    let temp = TempDir::new().unwrap();
    create_test_file(
        temp.path(),
        "packline.toml",
        r#"[project]
name = "ext"

[resolve.externals]
vue = "Vue"
"#,
    );
    create_test_file(temp.path(), "src/index.js", "import Vue from 'vue';\n");

    build(temp.path()).unwrap();
    let bundle = fs::read_to_string(temp.path().join("dist/main.js")).unwrap();
    assert!(bundle.contains("{\"vue\":{\"global\":\"Vue\"}}"));
    assert!(!temp.path().join("dist/node_modules").exists());
}
