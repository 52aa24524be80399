use crate::constants::CONFIG_NAMES;
use std::env::current_dir;
use std::path::{Path, PathBuf};
use tracing::warn;

/// First Mewofile in the current directory, trying names in order.
pub fn find_config_file() -> Option<PathBuf> {
    match current_dir() {
        Ok(dir) => find_config_file_in(&dir),
        Err(e) => {
            warn!("cannot read current directory: {}", e);
            None
        }
    }
}

pub fn find_config_file_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}
