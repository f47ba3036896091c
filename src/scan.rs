//! Dependency reference scanning.
//!
//! Extracts module references from source text. Scanning is lexical:
//! comments are blanked out first, and references built at runtime are not
//! seen.

use std::sync::OnceLock;

use regex::Regex;

use crate::resolve::ModuleKind;

fn script_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // import x from '...', import { a } from "...", export * from '...'
            r#"(?m)^\s*(?:import|export)\b[^'";]*?\bfrom\s*['"]([^'"\n]+)['"]"#,
            // import '...'
            r#"(?m)^\s*import\s*['"]([^'"\n]+)['"]"#,
            // require('...')
            r#"\brequire\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#,
            // import('...')
            r#"\bimport\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#,
        ]
        .iter()
        .map(|p| Regex::new(p).expect("script reference pattern"))
        .collect()
    })
}

fn style_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"@(?:import|use|forward)\s+(?:url\(\s*)?['"]([^'"\n]+)['"]"#)
            .expect("style reference pattern")
    })
}

fn script_block_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)<script\b[^>]*>(.*?)</script>").expect("script block pattern")
    })
}

/// Replace `//` and `/* */` comments with spaces.
///
/// Newlines and byte offsets are kept. Quoted strings and template literals
/// are skipped, so `'http://host'` survives.
fn blank_comments(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out = bytes.to_vec();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            // An unterminated quote ends at the line break.
            if b == q || (b == b'\n' && q != b'`') {
                quote = None;
            }
            i += 1;
            continue;
        }
        match (b, bytes.get(i + 1).copied()) {
            (b'\'' | b'"' | b'`', _) => {
                quote = Some(b);
                i += 1;
            }
            (b'/', Some(b'/')) => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    out[i] = b' ';
                    i += 1;
                }
            }
            (b'/', Some(b'*')) => {
                let end = source[i + 2..].find("*/").map_or(bytes.len(), |at| i + 2 + at + 2);
                for byte in &mut out[i..end] {
                    if *byte != b'\n' {
                        *byte = b' ';
                    }
                }
                i = end;
            }
            _ => i += 1,
        }
    }
    // Only whole characters inside comments were replaced.
    String::from_utf8(out).unwrap_or_else(|_| source.to_string())
}

/// A reference found in a module's source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedRef {
    /// The reference as written
    pub specifier: String,
    /// Fallback tried when the primary reference does not resolve
    pub fallback: Option<String>,
}

impl ScannedRef {
    fn plain(specifier: &str) -> Self {
        Self { specifier: specifier.to_string(), fallback: None }
    }
}

/// Scan a module's text for references, in order of first appearance.
pub fn scan_references(kind: ModuleKind, source: &str) -> Vec<ScannedRef> {
    let found = match kind {
        ModuleKind::Script => scan_script(source),
        ModuleKind::Component => scan_component(source),
        ModuleKind::Style => scan_style(source),
        ModuleKind::Asset => Vec::new(),
    };
    dedup_in_order(found)
}

fn scan_script(source: &str) -> Vec<(usize, ScannedRef)> {
    let source = blank_comments(source);
    let mut found = Vec::new();
    for re in script_patterns() {
        for caps in re.captures_iter(&source) {
            if let Some(m) = caps.get(1) {
                found.push((m.start(), ScannedRef::plain(m.as_str())));
            }
        }
    }
    found.sort_by_key(|(pos, _)| *pos);
    found
}

fn scan_component(source: &str) -> Vec<(usize, ScannedRef)> {
    let mut found = Vec::new();
    for caps in script_block_pattern().captures_iter(source) {
        if let Some(body) = caps.get(1) {
            let offset = body.start();
            found.extend(
                scan_script(body.as_str()).into_iter().map(|(pos, r)| (offset + pos, r)),
            );
        }
    }
    found
}

fn scan_style(source: &str) -> Vec<(usize, ScannedRef)> {
    let source = blank_comments(source);
    style_pattern()
        .captures_iter(&source)
        .filter_map(|caps| caps.get(1))
        .filter(|m| is_bundled_style_ref(m.as_str()))
        .map(|m| {
            let spec = m.as_str();
            let fallback = if is_bare(spec) { Some(format!("./{}", spec)) } else { None };
            (m.start(), ScannedRef { specifier: spec.to_string(), fallback })
        })
        .collect()
}

/// Skip stylesheet built-ins and remote URLs.
fn is_bundled_style_ref(spec: &str) -> bool {
    !(spec.starts_with("sass:")
        || spec.starts_with("http://")
        || spec.starts_with("https://")
        || spec.starts_with("//")
        || spec.starts_with("data:"))
}

fn is_bare(spec: &str) -> bool {
    !(spec.starts_with('.') || spec.starts_with('/') || spec.starts_with('~'))
}

fn dedup_in_order(found: Vec<(usize, ScannedRef)>) -> Vec<ScannedRef> {
    let mut seen = std::collections::HashSet::new();
    found
        .into_iter()
        .map(|(_, r)| r)
        .filter(|r| seen.insert(r.specifier.clone()))
        .collect()
}
