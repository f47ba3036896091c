//! Built-in transforms.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use sha2::{Digest, Sha256};

use super::{as_text, EmittedFile, Transform, TransformError, TransformOutput};

fn js_string(text: &str) -> String {
    // serde_json string escaping is valid JS string syntax
    serde_json::Value::String(text.to_string()).to_string()
}

fn export(value: &str) -> Vec<u8> {
    format!("module.exports = {};\n", value).into_bytes()
}

/// Content-hashed file name under `assets/`, e.g. `assets/logo.3f2a9c1b.png`.
pub(crate) fn hashed_asset_path(path: &Path, content: &[u8]) -> String {
    let digest = format!("{:x}", Sha256::digest(content));
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let stem = if stem.is_empty() { "asset".to_string() } else { stem };
    match path.extension() {
        Some(ext) => format!("assets/{}.{}.{}", stem, &digest[..8], ext.to_string_lossy()),
        None => format!("assets/{}.{}", stem, &digest[..8]),
    }
}

/// JS module body exporting a URL string.
pub(crate) fn url_export(url: &str) -> Vec<u8> {
    export(&js_string(url))
}

fn mime_type(path: &Path) -> &'static str {
    let ext =
        path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase()).unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "css" => "text/css",
        "json" => "application/json",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Exports the content as a JS string.
pub struct RawTransform;

impl Transform for RawTransform {
    fn name(&self) -> &str {
        "raw"
    }

    fn apply(&self, content: Vec<u8>, _path: &Path) -> Result<TransformOutput, TransformError> {
        let text = as_text(content)?;
        Ok(TransformOutput::content(export(&js_string(&text))))
    }
}

/// Validates JSON and exports it as a JS value.
pub struct JsonTransform;

impl Transform for JsonTransform {
    fn name(&self) -> &str {
        "json"
    }

    fn apply(&self, content: Vec<u8>, _path: &Path) -> Result<TransformOutput, TransformError> {
        let value: serde_json::Value = serde_json::from_slice(&content)?;
        Ok(TransformOutput::content(export(&value.to_string())))
    }
}

/// Parses and re-prints CSS, optionally minified.
pub struct CssTransform {
    minify: bool,
}

impl CssTransform {
    /// `css` when `minify` is false, `css-minify` otherwise.
    pub fn new(minify: bool) -> Self {
        Self { minify }
    }
}

impl Transform for CssTransform {
    fn name(&self) -> &str {
        if self.minify {
            "css-minify"
        } else {
            "css"
        }
    }

    fn apply(&self, content: Vec<u8>, path: &Path) -> Result<TransformOutput, TransformError> {
        let text = as_text(content)?;
        let options = ParserOptions {
            filename: path.to_string_lossy().into_owned(),
            ..ParserOptions::default()
        };
        let sheet = StyleSheet::parse(&text, options)?;
        let printed =
            sheet.to_css(PrinterOptions { minify: self.minify, ..PrinterOptions::default() })?;
        Ok(TransformOutput::content(printed.code))
    }
}

/// Wraps CSS text in a module that injects a `<style>` element when loaded.
pub struct StyleTransform;

impl Transform for StyleTransform {
    fn name(&self) -> &str {
        "style"
    }

    fn apply(&self, content: Vec<u8>, path: &Path) -> Result<TransformOutput, TransformError> {
        let css = as_text(content)?;
        let source = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let code = format!(
            "var css = {css};\n\
             if (typeof document !== \"undefined\") {{\n  \
             var style = document.createElement(\"style\");\n  \
             style.setAttribute(\"data-source\", {source});\n  \
             style.textContent = css;\n  \
             document.head.appendChild(style);\n\
             }}\n\
             module.exports = css;\n",
            css = js_string(&css),
            source = js_string(&source),
        );
        Ok(TransformOutput::content(code))
    }
}

/// Emits the content as a content-hashed file and exports its URL.
pub struct FileTransform {
    public_path: String,
}

impl FileTransform {
    /// Create with the URL prefix for emitted files.
    pub fn new(public_path: &str) -> Self {
        Self { public_path: public_path.to_string() }
    }
}

impl Transform for FileTransform {
    fn name(&self) -> &str {
        "file"
    }

    fn apply(&self, content: Vec<u8>, path: &Path) -> Result<TransformOutput, TransformError> {
        let emitted = hashed_asset_path(path, &content);
        let url = format!("{}{}", self.public_path, emitted);
        Ok(TransformOutput {
            content: url_export(&url),
            artifacts: vec![EmittedFile { path: emitted, content }],
        })
    }
}

/// Exports the content as a base64 `data:` URI.
pub struct InlineTransform;

impl Transform for InlineTransform {
    fn name(&self) -> &str {
        "inline"
    }

    fn apply(&self, content: Vec<u8>, path: &Path) -> Result<TransformOutput, TransformError> {
        let uri = format!("data:{};base64,{}", mime_type(path), STANDARD.encode(&content));
        Ok(TransformOutput::content(url_export(&uri)))
    }
}
