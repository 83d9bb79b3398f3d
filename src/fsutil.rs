//! Forced-deletion helpers.
//!
//! Directory trees produced by clones and index engines can contain
//! read-only entries that `remove_dir_all` refuses to delete. These helpers
//! escalate: plain removal, then a recursive permission pass and retry, then
//! one external forced-removal command. Business logic only ever calls
//! [`remove_tree`] / [`force_remove`] and never branches on the platform.

use std::path::Path;
use std::process::Command;
use walkdir::WalkDir;

/// Recursively make every entry under `path` writable. Individual failures
/// are ignored; this is a best-effort pass before a retry.
pub fn relax_permissions(path: &Path) {
    for entry in WalkDir::new(path).into_iter().flatten() {
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let mut perms = metadata.permissions();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            perms.set_mode(if metadata.is_dir() { 0o755 } else { 0o644 });
        }
        #[cfg(not(unix))]
        perms.set_readonly(false);
        let _ = std::fs::set_permissions(entry.path(), perms);
    }
}

/// Remove a directory tree, escalating through permission relaxation and
/// the external forced-removal command. Returns whether the tree is gone.
pub fn remove_tree(path: &Path) -> bool {
    if !path.exists() {
        return true;
    }
    if std::fs::remove_dir_all(path).is_ok() {
        return true;
    }
    force_remove(path)
}

/// The portable forced-removal capability: relax permissions, retry, then
/// hand the path to the platform's removal command. Returns whether the
/// tree is gone afterwards.
pub fn force_remove(path: &Path) -> bool {
    if !path.exists() {
        return true;
    }

    relax_permissions(path);
    if std::fs::remove_dir_all(path).is_ok() {
        return true;
    }

    let status = if cfg!(windows) {
        Command::new("cmd")
            .args(["/c", "rmdir", "/s", "/q"])
            .arg(path)
            .status()
    } else {
        Command::new("rm").arg("-rf").arg(path).status()
    };

    match status {
        Ok(s) if s.success() => !path.exists(),
        _ => {
            tracing::warn!(path = %path.display(), "forced removal failed");
            !path.exists()
        }
    }
}

/// Clear a stale directory before reuse: best-effort permission fix, then
/// removal with residual errors ignored.
pub fn clear_stale(path: &Path) {
    if path.exists() && !remove_tree(path) {
        tracing::warn!(path = %path.display(), "stale directory could not be fully cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removing_missing_path_succeeds() {
        let tmp = tempfile::tempdir().unwrap();
        let gone = tmp.path().join("never-existed");
        assert!(remove_tree(&gone));
        assert!(force_remove(&gone));
    }

    #[test]
    fn removes_plain_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("tree");
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("nested/file.txt"), "x").unwrap();
        assert!(remove_tree(&dir));
        assert!(!dir.exists());
    }

    #[cfg(unix)]
    #[test]
    fn removes_tree_with_readonly_dir() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("locked");
        let inner = dir.join("inner");
        std::fs::create_dir_all(&inner).unwrap();
        std::fs::write(inner.join("file.txt"), "x").unwrap();
        // A read-only directory blocks deletion of its children.
        std::fs::set_permissions(&inner, std::fs::Permissions::from_mode(0o555)).unwrap();

        assert!(remove_tree(&dir));
        assert!(!dir.exists());
    }
}
