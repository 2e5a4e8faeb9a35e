//! Wrapper for getting well-known paths.
//!
//! Follows these rules:
//!
//! - XDG base directory (all platforms if environment variable is set)
//! - Platform-specific well known directory (see [`dirs`])
//! - Home directory
//! - Current directory

use std::env;
use std::path::PathBuf;

use camino::Utf8PathBuf;

const XDG_DATA_HOME: &str = "XDG_DATA_HOME";

/// Gets the data directory. Creates it if it does not exist.
///
/// # Panics
///
/// If none of the rules succeeds.
pub fn data_dir(name: &str) -> PathBuf {
    let dir = if let Ok(path) = env::var(XDG_DATA_HOME) {
        PathBuf::from(path).join(name)
    } else if let Some(path) = dirs::data_dir() {
        path.join(name)
    } else if let Some(path) = dirs::home_dir() {
        path.join(format!(".{name}"))
    } else if let Ok(path) = env::current_dir() {
        path.join(format!(".{name}"))
    } else {
        panic!("all sources for data dir failed");
    };
    std::fs::create_dir_all(&dir).expect("unable to ensure data dir exists");
    dir
}

/// Gets a path inside the user's `~/.ssh` directory.
///
/// Falls back to a relative `.ssh` when no home directory can be found, in
/// which case the path will most likely not exist.
#[must_use]
pub fn ssh_path(file: &str) -> Utf8PathBuf {
    let home = dirs::home_dir()
        .and_then(|p| Utf8PathBuf::try_from(p).ok())
        .unwrap_or_default();
    home.join(".ssh").join(file)
}
