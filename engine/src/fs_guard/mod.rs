use sdk::errors::EngineError;
use std::path::{Component, Path, PathBuf};

/// WorkspaceGuard confines every tool to a single workspace root.
///
/// All tool paths are resolved through [`WorkspaceGuard::resolve`] before any
/// I/O happens. Resolution canonicalizes the longest existing ancestor, so
/// files that do not exist yet still resolve, while `..` segments and
/// symlinks that escape the root are rejected.
///
/// # Validation gates
///
/// 1. Deny list on the path as given
/// 2. Canonicalize the longest existing ancestor (resolves symlinks and `..`)
/// 3. Reject `..` in the not-yet-existing remainder
/// 4. Verify the result is inside the workspace root
/// 5. Deny list on the resolved path, relative to the root
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    root: PathBuf,
    deny_list: Vec<PathBuf>,
}

impl WorkspaceGuard {
    /// Creates a guard rooted at `root`.
    ///
    /// The deny list covers credentials that have no business being touched
    /// by a coding assistant even when they sit inside the workspace:
    /// - .ssh, .gnupg
    /// - .aws/credentials
    /// - id_rsa, id_ed25519
    pub fn new(root: impl AsRef<Path>) -> Result<Self, EngineError> {
        let root = root.as_ref();
        // Canonicalize root to handle symlinks (e.g., /var -> /private/var on macOS)
        let root = root
            .canonicalize()
            .map_err(|e| EngineError::PathCanonicalization(root.to_path_buf(), e.to_string()))?;

        let deny_list = vec![
            PathBuf::from(".ssh"),
            PathBuf::from(".gnupg"),
            PathBuf::from(".aws/credentials"),
            PathBuf::from("id_rsa"),
            PathBuf::from("id_ed25519"),
        ];

        Ok(Self { root, deny_list })
    }

    /// Returns the canonical workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `path` (relative to the root, or absolute) to a real path
    /// inside the workspace.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::PathDenied` if the path matches the deny list.
    /// Returns `EngineError::PathCanonicalization` if an existing ancestor cannot be resolved.
    /// Returns `EngineError::PathOutsideWorkspace` if the path escapes the root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf, EngineError> {
        let path = path.as_ref();
        let candidate = if path.as_os_str().is_empty() {
            self.root.clone()
        } else if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        // Gate 1: deny list on the path as given
        if self.is_denied(path) {
            return Err(EngineError::PathDenied(path.to_path_buf()));
        }

        // Gate 2: canonicalize the longest ancestor that exists on disk.
        // symlink_metadata so a dangling link is canonicalized (and fails)
        // instead of being treated as a fresh file name.
        let existing = candidate
            .ancestors()
            .find(|a| a.symlink_metadata().is_ok())
            .unwrap_or(Path::new("/"));
        let canonical = existing
            .canonicalize()
            .map_err(|e| EngineError::PathCanonicalization(existing.to_path_buf(), e.to_string()))?;

        // Gate 3: the remainder does not exist yet, so `..` cannot be resolved
        let remainder = candidate.strip_prefix(existing).unwrap_or(Path::new(""));
        let mut resolved = canonical;
        for component in remainder.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return Err(EngineError::PathOutsideWorkspace(candidate.clone())),
            }
        }

        // Gate 4: verify within workspace
        if !resolved.starts_with(&self.root) {
            return Err(EngineError::PathOutsideWorkspace(resolved));
        }

        // Gate 5: deny list after resolution (catches symlink bypasses)
        if let Ok(relative) = resolved.strip_prefix(&self.root) {
            if self.is_denied(relative) {
                return Err(EngineError::PathDenied(resolved));
            }
        }

        Ok(resolved)
    }

    /// Resolve `path` without following a symlink in its final component.
    ///
    /// The parent goes through [`resolve`](Self::resolve); the last name is
    /// joined as given, so a link resolves to the link rather than its target.
    pub fn resolve_entry(&self, path: impl AsRef<Path>) -> Result<PathBuf, EngineError> {
        let path = path.as_ref();
        let (parent, name) = match (path.parent(), path.file_name()) {
            (Some(parent), Some(name)) => (parent, name),
            _ => return self.resolve(path),
        };

        if self.is_denied(path) {
            return Err(EngineError::PathDenied(path.to_path_buf()));
        }

        let resolved = self.resolve(parent)?.join(name);
        if let Ok(relative) = resolved.strip_prefix(&self.root) {
            if self.is_denied(relative) {
                return Err(EngineError::PathDenied(resolved));
            }
        }
        Ok(resolved)
    }

    /// Display form of a resolved path, relative to the root with `/` separators.
    pub fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            ".".to_string()
        } else {
            parts.join("/")
        }
    }

    fn is_denied(&self, path: &Path) -> bool {
        self.deny_list.iter().any(|denied| {
            path.ends_with(denied)
                || path.components().any(|c| {
                    c.as_os_str()
                        .to_str()
                        .is_some_and(|part| denied.as_os_str().to_str() == Some(part))
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn guard_in(temp: &TempDir) -> (WorkspaceGuard, PathBuf) {
        let workspace = temp.path().join("workspace");
        fs::create_dir(&workspace).unwrap();
        let guard = WorkspaceGuard::new(&workspace).unwrap();
        let root = guard.root().to_path_buf();
        (guard, root)
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let temp = TempDir::new().unwrap();
        let result = WorkspaceGuard::new(temp.path().join("nope"));
        assert!(matches!(
            result.unwrap_err(),
            EngineError::PathCanonicalization(_, _)
        ));
    }

    #[test]
    fn test_existing_file_resolves() {
        let temp = TempDir::new().unwrap();
        let (guard, root) = guard_in(&temp);
        fs::write(root.join("file.txt"), "x").unwrap();

        let resolved = guard.resolve("file.txt").unwrap();
        assert_eq!(resolved, root.join("file.txt"));
        assert_eq!(guard.relative(&resolved), "file.txt");
    }

    #[test]
    fn test_new_nested_file_resolves() {
        let temp = TempDir::new().unwrap();
        let (guard, root) = guard_in(&temp);

        let resolved = guard.resolve("src/deep/new.rs").unwrap();
        assert_eq!(resolved, root.join("src").join("deep").join("new.rs"));
        assert_eq!(guard.relative(&resolved), "src/deep/new.rs");
    }

    #[test]
    fn test_empty_path_is_root() {
        let temp = TempDir::new().unwrap();
        let (guard, root) = guard_in(&temp);
        assert_eq!(guard.resolve("").unwrap(), root);
        assert_eq!(guard.relative(&root), ".");
    }

    #[test]
    fn test_path_traversal_attempt() {
        let temp = TempDir::new().unwrap();
        let (guard, _) = guard_in(&temp);
        fs::write(temp.path().join("secret.txt"), "secret").unwrap();

        let result = guard.resolve("../secret.txt");
        assert!(matches!(
            result.unwrap_err(),
            EngineError::PathOutsideWorkspace(_)
        ));
    }

    #[test]
    fn test_traversal_through_missing_directory() {
        let temp = TempDir::new().unwrap();
        let (guard, _) = guard_in(&temp);

        let result = guard.resolve("missing/../../escape.txt");
        assert!(matches!(
            result.unwrap_err(),
            EngineError::PathOutsideWorkspace(_)
        ));
    }

    #[test]
    fn test_absolute_path_outside_workspace() {
        let temp = TempDir::new().unwrap();
        let (guard, _) = guard_in(&temp);
        let outside = temp.path().join("outside.txt");
        fs::write(&outside, "test").unwrap();

        assert!(matches!(
            guard.resolve(&outside).unwrap_err(),
            EngineError::PathOutsideWorkspace(_)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escaping_workspace() {
        let temp = TempDir::new().unwrap();
        let (guard, root) = guard_in(&temp);
        let outside_dir = temp.path().join("outside");
        fs::create_dir(&outside_dir).unwrap();
        std::os::unix::fs::symlink(&outside_dir, root.join("link")).unwrap();

        assert!(matches!(
            guard.resolve("link/file.txt").unwrap_err(),
            EngineError::PathOutsideWorkspace(_)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_is_rejected() {
        let temp = TempDir::new().unwrap();
        let (guard, root) = guard_in(&temp);
        std::os::unix::fs::symlink(temp.path().join("ghost"), root.join("dangling")).unwrap();

        assert!(guard.resolve("dangling").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_entry_keeps_final_link() {
        let temp = TempDir::new().unwrap();
        let (guard, root) = guard_in(&temp);
        fs::write(root.join("real.txt"), "data").unwrap();
        std::os::unix::fs::symlink(root.join("real.txt"), root.join("alias")).unwrap();

        assert_eq!(guard.resolve("alias").unwrap(), root.join("real.txt"));
        assert_eq!(guard.resolve_entry("alias").unwrap(), root.join("alias"));
        assert_eq!(guard.resolve_entry("./alias").unwrap(), root.join("alias"));

        let outside_dir = temp.path().join("outside");
        fs::create_dir(&outside_dir).unwrap();
        std::os::unix::fs::symlink(&outside_dir, root.join("link")).unwrap();
        assert!(matches!(
            guard.resolve_entry("link/file.txt").unwrap_err(),
            EngineError::PathOutsideWorkspace(_)
        ));
        assert!(guard.resolve_entry("../escape.txt").is_err());
    }

    #[test]
    fn test_denied_component_in_path() {
        let temp = TempDir::new().unwrap();
        let (guard, _) = guard_in(&temp);

        let result = guard.resolve("project/.ssh/config");
        assert!(matches!(result.unwrap_err(), EngineError::PathDenied(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_into_denied_directory() {
        let temp = TempDir::new().unwrap();
        let (guard, root) = guard_in(&temp);
        fs::create_dir(root.join(".ssh")).unwrap();
        std::os::unix::fs::symlink(root.join(".ssh"), root.join("safe_link")).unwrap();

        assert!(matches!(
            guard.resolve("safe_link").unwrap_err(),
            EngineError::PathDenied(_)
        ));
    }
}
