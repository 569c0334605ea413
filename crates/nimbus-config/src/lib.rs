pub mod document;
pub mod error;

pub use document::{CloudSettings, SpecDocument, load_document};
pub use error::*;

use std::path::{Path, PathBuf};

pub const ENV_SPEC_PATH: &str = "NIMBUS_SPEC_PATH";

/// File names tried in each search directory, most specific first
const FILE_NAMES: [&str; 4] = [
    "server.local.yaml",
    ".server.local.yaml",
    "server.yaml",
    ".server.yaml",
];

/// Every location a spec document may live at, in lookup order.
///
/// `NIMBUS_SPEC_PATH` is handled separately by [`find_spec_file`] because a dangling value
/// is worth a warning.
pub fn search_paths(project_dir: &Path) -> Vec<PathBuf> {
    let local_dir = project_dir.join(".nimbus");
    let mut paths: Vec<PathBuf> = [project_dir, local_dir.as_path()]
        .iter()
        .flat_map(|dir| FILE_NAMES.iter().map(move |name| dir.join(name)))
        .collect();
    if let Some(base) = dirs::config_dir() {
        paths.push(base.join("nimbus").join("server.yaml"));
    }
    paths
}

/// Locate the spec document: `NIMBUS_SPEC_PATH`, then [`search_paths`] from the current
/// directory.
pub fn find_spec_file() -> Result<PathBuf> {
    if let Some(explicit) = std::env::var_os(ENV_SPEC_PATH).map(PathBuf::from) {
        if explicit.is_file() {
            return Ok(explicit);
        }
        tracing::warn!("{} points at missing file {}", ENV_SPEC_PATH, explicit.display());
    }

    let cwd = std::env::current_dir()?;
    search_paths(&cwd)
        .into_iter()
        .find(|candidate| candidate.is_file())
        .ok_or(ConfigError::SpecFileNotFound)
}
