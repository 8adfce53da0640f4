//! Namespace link resolution.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Outcome of resolving one namespace link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedLink {
    /// Target is an existing regular file.
    Valid(PathBuf),
    /// Target does not exist.
    Dangling(PathBuf),
    /// Target exists but is not a plain file.
    IllegalTarget(PathBuf),
}

/// Reads `link` and returns its target as an absolute, lexically normalised
/// path. Relative targets are resolved against the link's own directory.
pub fn link_target(link: &Path) -> io::Result<PathBuf> {
    let target = fs::read_link(link)?;
    let target = if target.is_absolute() {
        target
    } else {
        link.parent().unwrap_or_else(|| Path::new("/")).join(target)
    };
    Ok(normalize_lexically(&target))
}

/// Resolves and classifies a namespace link.
///
/// Errors other than a missing target (permission, loops) are returned so
/// the caller can skip the link instead of treating it as illegal.
pub fn resolve_link(link: &Path) -> io::Result<ResolvedLink> {
    let target = link_target(link)?;
    match fs::metadata(&target) {
        Ok(metadata) if metadata.is_file() => Ok(ResolvedLink::Valid(target)),
        Ok(_) => Ok(ResolvedLink::IllegalTarget(target)),
        Err(err)
            if err.kind() == io::ErrorKind::NotFound
                || err.kind() == io::ErrorKind::NotADirectory =>
        {
            Ok(ResolvedLink::Dangling(target))
        }
        Err(err) => Err(err),
    }
}

/// Collapses `.`, `..` and repeated separators without touching the
/// filesystem. `..` never climbs above the root.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                match normalized.components().next_back() {
                    Some(Component::Normal(_)) => {
                        normalized.pop();
                    }
                    _ if path.has_root() => {}
                    _ => normalized.push(".."),
                }
            }
            Component::Normal(name) => normalized.push(name),
        }
    }
    if normalized.as_os_str().is_empty() {
        normalized.push(".");
    }
    normalized
}

/// Absolute, normalised form of a root given on the command line.
pub fn absolute_root(path: &Path) -> io::Result<PathBuf> {
    Ok(normalize_lexically(&std::path::absolute(path)?))
}

/// Replaces every run of `/` with a single `/`.
pub fn squash_separators(value: &str) -> String {
    let mut squashed = String::with_capacity(value.len());
    let mut previous_slash = false;
    for c in value.chars() {
        if c == '/' {
            if !previous_slash {
                squashed.push(c);
            }
            previous_slash = true;
        } else {
            squashed.push(c);
            previous_slash = false;
        }
    }
    squashed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(
            normalize_lexically(Path::new("/ns/a/../b/./c//d")),
            PathBuf::from("/ns/b/c/d")
        );
        assert_eq!(normalize_lexically(Path::new("/../x")), PathBuf::from("/x"));
        assert_eq!(normalize_lexically(Path::new("a/../../b")), PathBuf::from("../b"));
    }

    #[test]
    fn test_squash_separators() {
        assert_eq!(squash_separators("//data///xrd//"), "/data/xrd/");
        assert_eq!(squash_separators("/plain/path"), "/plain/path");
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_relative_link() {
        let tmp = tempfile::tempdir().unwrap();
        let data = tmp.path().join("data");
        let ns = tmp.path().join("ns").join("sub");
        fs::create_dir_all(&data).unwrap();
        fs::create_dir_all(&ns).unwrap();
        fs::write(data.join("f"), "x").unwrap();
        std::os::unix::fs::symlink("../../data/f", ns.join("f")).unwrap();
        std::os::unix::fs::symlink("../../data/missing", ns.join("gone")).unwrap();
        std::os::unix::fs::symlink("../../data", ns.join("dir")).unwrap();

        assert_eq!(
            resolve_link(&ns.join("f")).unwrap(),
            ResolvedLink::Valid(normalize_lexically(&data.join("f")))
        );
        assert!(matches!(
            resolve_link(&ns.join("gone")).unwrap(),
            ResolvedLink::Dangling(_)
        ));
        assert!(matches!(
            resolve_link(&ns.join("dir")).unwrap(),
            ResolvedLink::IllegalTarget(_)
        ));
    }
}
