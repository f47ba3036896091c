//! Entry document generation.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{EntryScript, HookStage, InitContext, Plugin, PluginError, ResolveContext};
use crate::config::{HtmlPluginConfig, InjectMode, ScriptLoading};
use crate::paths::resolve_path;

/// Renders an HTML document that loads every entry script.
#[derive(Debug, Clone)]
pub struct HtmlPlugin {
    config: HtmlPluginConfig,
}

impl HtmlPlugin {
    /// Create from configuration.
    pub fn new(config: HtmlPluginConfig) -> Self {
        Self { config }
    }

    fn template_path(&self, root: &Path) -> Option<PathBuf> {
        self.config.template.as_ref().map(|t| resolve_path(root, t))
    }

    fn script_tag(&self, script: &EntryScript) -> String {
        let src = escape_attr(&script.url);
        match self.config.script_loading {
            ScriptLoading::Defer => format!("<script defer=\"defer\" src=\"{}\"></script>", src),
            ScriptLoading::Blocking => format!("<script src=\"{}\"></script>", src),
            ScriptLoading::Module => format!("<script type=\"module\" src=\"{}\"></script>", src),
        }
    }

    /// Insert script tags for `scripts` into `document`.
    pub fn render(&self, document: &str, scripts: &[EntryScript]) -> String {
        let tags: String = scripts.iter().map(|s| self.script_tag(s)).collect();
        match self.config.inject {
            InjectMode::None => document.to_string(),
            InjectMode::Head => insert_before(document, &["</head>", "</body>"], &tags),
            InjectMode::Body => insert_before(document, &["</body>"], &tags),
        }
    }

    fn default_document(&self) -> String {
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
             <title>{}</title>\n</head>\n<body>\n</body>\n</html>\n",
            escape_text(&self.config.title)
        )
    }
}

impl Plugin for HtmlPlugin {
    fn name(&self) -> &str {
        "html"
    }

    fn stages(&self) -> &[HookStage] {
        &[HookStage::Init, HookStage::PostResolve]
    }

    fn init(&self, ctx: &mut InitContext<'_>) -> Result<(), PluginError> {
        if let Some(template) = self.template_path(ctx.root) {
            if !template.is_file() {
                return Err(PluginError::MissingInput {
                    what: "html template".to_string(),
                    path: template,
                });
            }
            ctx.ensure_outside_output("html template", &template)?;
        }
        Ok(())
    }

    fn post_resolve(&self, ctx: &mut ResolveContext<'_>) -> Result<(), PluginError> {
        let document = match self.template_path(ctx.root) {
            Some(template) => fs::read_to_string(&template)
                .map_err(|source| PluginError::Io { path: template.clone(), source })?,
            None => self.default_document(),
        };
        let rendered = self.render(&document, ctx.entry_scripts);
        debug!(
            filename = %self.config.filename,
            scripts = ctx.entry_scripts.len(),
            "rendered entry document"
        );
        ctx.emit(self.config.filename.clone(), rendered.into_bytes());
        Ok(())
    }
}

/// Insert `insert` before the first closing tag found (case-insensitive),
/// trying `closers` in order; append when none is present.
fn insert_before(document: &str, closers: &[&str], insert: &str) -> String {
    let lower = document.to_ascii_lowercase();
    for closer in closers {
        if let Some(pos) = lower.find(closer) {
            let mut out = String::with_capacity(document.len() + insert.len());
            out.push_str(&document[..pos]);
            out.push_str(insert);
            out.push_str(&document[pos..]);
            return out;
        }
    }
    format!("{}{}", document, insert)
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;").replace('<', "&lt;")
}

fn escape_text(value: &str) -> String {
    value.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ModuleGraph;
    use crate::rules::RuleMatcher;
    use tempfile::TempDir;

    fn scripts(urls: &[&str]) -> Vec<EntryScript> {
        urls.iter()
            .map(|u| EntryScript {
                name: u.trim_end_matches(".js").to_string(),
                url: u.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_defer_into_head() {
        let plugin = HtmlPlugin::new(HtmlPluginConfig::default());
        let out = plugin.render(
            "<html><head><title>x</title></head><body></body></html>",
            &scripts(&["main.js"]),
        );
        assert_eq!(
            out,
            "<html><head><title>x</title><script defer=\"defer\" src=\"main.js\"></script></head><body></body></html>"
        );
    }

    #[test]
    fn test_body_injection_and_module_loading() {
        let plugin = HtmlPlugin::new(HtmlPluginConfig {
            inject: InjectMode::Body,
            script_loading: ScriptLoading::Module,
            ..Default::default()
        });
        let out = plugin.render("<HEAD></HEAD><BODY></BODY>", &scripts(&["admin.js", "main.js"]));
        assert_eq!(
            out,
            "<HEAD></HEAD><BODY><script type=\"module\" src=\"admin.js\"></script><script type=\"module\" src=\"main.js\"></script></BODY>"
        );
    }

    #[test]
    fn test_head_falls_back_to_body_then_append() {
        let plugin = HtmlPlugin::new(HtmlPluginConfig {
            script_loading: ScriptLoading::Blocking,
            ..Default::default()
        });
        assert_eq!(
            plugin.render("<body></body>", &scripts(&["a.js"])),
            "<body><script src=\"a.js\"></script></body>"
        );
        assert_eq!(
            plugin.render("<p>hi</p>", &scripts(&["a.js"])),
            "<p>hi</p><script src=\"a.js\"></script>"
        );
    }

    #[test]
    fn test_inject_none() {
        let plugin =
            HtmlPlugin::new(HtmlPluginConfig { inject: InjectMode::None, ..Default::default() });
        assert_eq!(plugin.render("<head></head>", &scripts(&["a.js"])), "<head></head>");
    }

    #[test]
    fn test_init_missing_template() {
        let temp = TempDir::new().unwrap();
        let plugin = HtmlPlugin::new(HtmlPluginConfig {
            template: Some(PathBuf::from("src/index.html")),
            ..Default::default()
        });
        let rules = RuleMatcher::default();
        let out = temp.path().join("dist");
        let mut ctx = InitContext::new(temp.path(), &out, &rules);
        let err = plugin.init(&mut ctx).unwrap_err();
        assert!(matches!(err, PluginError::MissingInput { .. }));
    }

    #[test]
    fn test_init_template_inside_output() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("public")).unwrap();
        fs::write(temp.path().join("public/index.html"), "<html></html>").unwrap();
        let plugin = HtmlPlugin::new(HtmlPluginConfig {
            template: Some(PathBuf::from("public/index.html")),
            ..Default::default()
        });
        let rules = RuleMatcher::default();
        let out = temp.path().join("public");
        let mut ctx = InitContext::new(temp.path(), &out, &rules);
        let err = plugin.init(&mut ctx).unwrap_err();
        assert!(matches!(err, PluginError::InsideOutput { .. }));
    }

    #[test]
    fn test_post_resolve_uses_template() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::write(
            temp.path().join("src/index.html"),
            "<html><head></head><body><div id=\"app\"></div></body></html>",
        )
        .unwrap();
        let plugin = HtmlPlugin::new(HtmlPluginConfig {
            template: Some(PathBuf::from("./src/index.html")),
            ..Default::default()
        });

        let mut graph = ModuleGraph::new(temp.path());
        let entries = scripts(&["main.js"]);
        let mut ctx = ResolveContext::new(temp.path(), &mut graph, &entries);
        plugin.post_resolve(&mut ctx).unwrap();

        let artifacts = ctx.into_artifacts();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].path, "index.html");
        let html = String::from_utf8(artifacts[0].content.clone()).unwrap();
        assert!(html.contains("<script defer=\"defer\" src=\"main.js\"></script></head>"));
        assert!(html.contains("<div id=\"app\"></div>"));
    }

    #[test]
    fn test_default_document_escapes_title() {
        let plugin =
            HtmlPlugin::new(HtmlPluginConfig { title: "A & B".to_string(), ..Default::default() });
        assert!(plugin.default_document().contains("<title>A &amp; B</title>"));
    }
}
