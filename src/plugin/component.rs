//! Single-file component support.
//!
//! Splits the `<style>` blocks of component modules into synthetic
//! stylesheet modules so that stylesheet rules process them like any other
//! stylesheet.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use super::{HookStage, InitContext, Plugin, PluginError, ResolveContext};
use crate::config::ComponentPluginConfig;
use crate::graph::ModuleOrigin;

fn style_block() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)<style\b([^>]*)>(.*?)</style\s*>").expect("style block pattern")
    })
}

fn lang_attr() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"\blang\s*=\s*["']?([A-Za-z0-9_-]+)"#).expect("lang attribute pattern")
    })
}

/// A `<style>` block of a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleBlock {
    /// Declared language (`css` when absent)
    pub lang: String,
    /// Block content
    pub content: String,
}

/// Extract the style blocks of a component, in document order.
pub fn style_blocks(source: &str) -> Vec<StyleBlock> {
    let lang = lang_attr();
    style_block()
        .captures_iter(source)
        .map(|caps| {
            let attrs = caps.get(1).map_or("", |m| m.as_str());
            let lang = lang
                .captures(attrs)
                .and_then(|c| c.get(1))
                .map_or_else(|| "css".to_string(), |m| m.as_str().to_ascii_lowercase());
            let content = caps.get(2).map_or("", |m| m.as_str()).to_string();
            StyleBlock { lang, content }
        })
        .collect()
}

/// Component block splitting.
#[derive(Debug, Clone)]
pub struct ComponentPlugin {
    config: ComponentPluginConfig,
}

impl ComponentPlugin {
    /// Create from configuration.
    pub fn new(config: ComponentPluginConfig) -> Self {
        Self { config }
    }

    fn is_component(&self, path: &Path) -> bool {
        path.to_string_lossy().ends_with(self.config.extension.as_str())
    }
}

impl Plugin for ComponentPlugin {
    fn name(&self) -> &str {
        "component"
    }

    fn stages(&self) -> &[HookStage] {
        &[HookStage::Init, HookStage::PostResolve]
    }

    fn init(&self, ctx: &mut InitContext<'_>) -> Result<(), PluginError> {
        let probe = ctx.root.join(format!("component{}", self.config.extension));
        if ctx.rules.chain_for(&probe).is_empty() {
            return Err(PluginError::Invalid(format!(
                "no rule matches '{}' files; add a [[rules]] entry for components",
                self.config.extension
            )));
        }
        Ok(())
    }

    fn post_resolve(&self, ctx: &mut ResolveContext<'_>) -> Result<(), PluginError> {
        let components: Vec<(String, Vec<StyleBlock>)> = ctx
            .graph
            .modules()
            .filter(|m| m.origin == ModuleOrigin::File && self.is_component(&m.path))
            .map(|m| (m.id.clone(), style_blocks(&String::from_utf8_lossy(&m.content))))
            .filter(|(_, blocks)| !blocks.is_empty())
            .collect();

        for (id, blocks) in components {
            for (n, block) in blocks.into_iter().enumerate() {
                let suffix = format!(".{}.{}", n, block.lang);
                let content = block.content.into_bytes();
                if let Some(style_id) = ctx.graph.add_synthetic(&id, &suffix, content) {
                    debug!(component = %id, style = %style_id, "extracted style block");
                }
            }
        }
        Ok(())
    }
}
