//! Crash-safe persistence of the YAML state files.

use crate::error::{Result, RetentionError};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Replace `path` with `data` via a sibling tempfile, so a reader sees
/// either the old file or the new one. Failures name the target file.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let failed = |source| RetentionError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(failed)?;
    let mut staged = NamedTempFile::new_in(dir).map_err(failed)?;
    staged.write_all(data).map_err(failed)?;
    staged.as_file().sync_all().map_err(failed)?;
    staged.persist(path).map_err(|e| failed(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn creates_missing_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/store.yaml");
        atomic_write(&path, b"nodes: {}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "nodes: {}");
    }

    #[test]
    fn replaces_existing_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn failure_names_the_target() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"file, not a directory").unwrap();
        let path = blocker.join("store.yaml");
        let err = atomic_write(&path, b"x").unwrap_err();
        match &err {
            RetentionError::Write { path: failed, .. } => assert_eq!(failed, &path),
            other => panic!("expected a write error, got {other:?}"),
        }
        assert!(err.to_string().contains("store.yaml"));
    }
}
