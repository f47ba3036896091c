//! Path helpers shared by the resolver, linker and emitter.
//!
//! All module ids and artifact paths use `/` separators regardless of the
//! host platform so that output trees are byte-identical across machines.

use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path, removing `.` components and folding `..`.
///
/// The filesystem is not consulted, so symlinks are not followed.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Render a path with `/` separators.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::RootDir => Some(String::new()),
            Component::Prefix(p) => Some(p.as_os_str().to_string_lossy().into_owned()),
            Component::CurDir => None,
            other => Some(other.as_os_str().to_string_lossy().into_owned()),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Express `path` relative to `base` with `/` separators.
///
/// Returns `None` when `path` is not inside `base`.
pub fn relative_slash(path: &Path, base: &Path) -> Option<String> {
    path.strip_prefix(base).ok().map(to_slash)
}

/// Check that a `/`-separated output path stays inside the output directory.
pub fn is_safe_relative(path: &str) -> bool {
    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return false;
    }
    if Path::new(path).is_absolute() {
        return false;
    }
    path.split('/').all(|segment| !segment.is_empty() && segment != ".." && segment != ".")
}

/// Resolve a configured path against the project root.
///
/// If the path is absolute, returns it unchanged.
/// If relative, joins it with the project root.
pub fn resolve_path(project_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&project_root.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_folds_parent_dirs() {
        assert_eq!(
            normalize(Path::new("/project/src/./components/../main.js")),
            PathBuf::from("/project/src/main.js")
        );
    }

    #[test]
    fn test_normalize_keeps_leading_parent_of_relative() {
        assert_eq!(normalize(Path::new("../shared/a.js")), PathBuf::from("../shared/a.js"));
    }

    #[test]
    fn test_to_slash_absolute() {
        assert_eq!(to_slash(Path::new("/project/src/main.js")), "/project/src/main.js");
    }

    #[test]
    fn test_relative_slash() {
        let base = Path::new("/project");
        assert_eq!(
            relative_slash(Path::new("/project/src/App.vue"), base),
            Some("src/App.vue".to_string())
        );
        assert_eq!(relative_slash(Path::new("/elsewhere/App.vue"), base), None);
    }

    #[test]
    fn test_is_safe_relative() {
        assert!(is_safe_relative("main.js"));
        assert!(is_safe_relative("assets/logo.abc123.png"));
        assert!(!is_safe_relative(""));
        assert!(!is_safe_relative("/etc/passwd"));
        assert!(!is_safe_relative("../outside.js"));
        assert!(!is_safe_relative("a/../../b"));
        assert!(!is_safe_relative("a//b"));
    }

    #[test]
    fn test_resolve_path() {
        let root = Path::new("/project");
        assert_eq!(resolve_path(root, Path::new("src")), PathBuf::from("/project/src"));
        assert_eq!(resolve_path(root, Path::new("/abs/dir")), PathBuf::from("/abs/dir"));
    }
}
