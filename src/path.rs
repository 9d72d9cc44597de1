//! Lexical path helpers. Everything here operates on path components only;
//! nothing touches the file system except [`absolute`], which needs the
//! current working directory.
//!
//! URLs produced by this module are always POSIX-style (`/`-separated)
//! regardless of the host platform, and never contain `.` or `..` segments.

use std::io;
use std::path::{Component, Path, PathBuf};

/// Normalizes `path` lexically: `.` segments are dropped and `..` segments
/// cancel the preceding normal segment. A `..` which cannot be cancelled is
/// kept for relative paths and dropped for rooted paths (there is nothing
/// above the root).
pub fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            _ => out.push(component),
        }
    }
    out.iter().collect()
}

/// Makes `path` absolute (relative to the current working directory) and
/// normalizes it. Symbolic links are not resolved.
pub fn absolute(path: &Path) -> io::Result<PathBuf> {
    Ok(normalize(&std::path::absolute(path)?))
}

/// Renders `path` with `/` separators. The empty path renders as `.`.
pub fn to_posix(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::RootDir => Some(String::new()),
            Component::CurDir => Some(".".to_owned()),
            Component::ParentDir => Some("..".to_owned()),
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            Component::Prefix(p) => Some(p.as_os_str().to_string_lossy().into_owned()),
        })
        .collect();
    match parts.as_slice() {
        [] => ".".to_owned(),
        [root] if root.is_empty() => "/".to_owned(),
        _ => parts.join("/"),
    }
}

/// Returns the lexical path from `base` to `path`. Both paths should be of
/// the same kind (both absolute or both relative) and normalized.
pub fn relative(path: &Path, base: &Path) -> PathBuf {
    let path: Vec<Component> = path.components().collect();
    let base: Vec<Component> = base.components().collect();
    let shared = path
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in shared..base.len() {
        out.push("..");
    }
    for component in &path[shared..] {
        out.push(component.as_os_str());
    }
    out
}

/// The root-relative URL for `path`: `normalize(relative(path, root))` with
/// POSIX separators.
pub fn url(path: &Path, root: &Path) -> String {
    to_posix(&normalize(&relative(path, root)))
}

/// The relative path from `dir` back up to `root`, always terminated by a
/// `/` so templates can concatenate it with a site-relative link. When `dir`
/// is `root` the result is `./`.
pub fn relative_root_prefix(dir: &Path, root: &Path) -> String {
    let prefix = to_posix(&normalize(&relative(root, dir)));
    if prefix == "." {
        "./".to_owned()
    } else {
        format!("{}/", prefix)
    }
}
