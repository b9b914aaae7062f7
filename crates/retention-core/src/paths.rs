use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const RETENTION_DIR: &str = ".retention";
pub const CONFIG_FILE: &str = ".retention/config.yaml";
pub const STORE_FILE: &str = ".retention/store.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn retention_dir(root: &Path) -> PathBuf {
    root.join(RETENTION_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn store_path(root: &Path) -> PathBuf {
    root.join(STORE_FILE)
}

pub fn is_initialized(root: &Path) -> bool {
    config_path(root).exists()
}
