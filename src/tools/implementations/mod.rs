// Tool implementations
//
// Concrete implementations of the tools this server exposes.

use std::path::{Path, PathBuf};

use crate::dag::PathCache;

pub mod build_layer;
pub mod feedback;
pub mod iterate;
pub mod saved_dags;
pub mod system_info;

pub use build_layer::LayerBuildTool;
pub use feedback::InteractiveFeedbackTool;
pub use iterate::IterateDagTool;
pub use saved_dags::GetSavedDagsTool;
pub use system_info::GetSystemInfoTool;

/// Files whose presence marks a directory as a project root.
const PROJECT_MARKERS: &[&str] = &[
    ".git",
    "pyproject.toml",
    "package.json",
    "Cargo.toml",
    "go.mod",
    "pom.xml",
    "Makefile",
];

/// Resolve the project root for a tool call. An explicit path wins; then
/// the STRATUM_PROJECT_ROOT environment variable, the path cache, and
/// finally marker-based detection upwards from the working directory.
pub(crate) fn resolve_project_path(provided: &str, cache: &PathCache) -> PathBuf {
    if !provided.is_empty() {
        return PathBuf::from(provided);
    }

    if let Ok(path) = std::env::var("STRATUM_PROJECT_ROOT") {
        let path = PathBuf::from(path);
        if path.is_dir() {
            return path;
        }
    }

    if let Some(path) = cache.project_path() {
        return path;
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_project_root(&cwd).unwrap_or(cwd)
}

fn find_project_root(start: &Path) -> Option<PathBuf> {
    for dir in start.ancestors() {
        if PROJECT_MARKERS.iter().any(|marker| dir.join(marker).exists()) {
            return Some(dir.to_path_buf());
        }
    }
    None
}
