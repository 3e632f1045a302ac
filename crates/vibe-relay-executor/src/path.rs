//! Executable lookup and the worker's PATH.

use std::{
    collections::HashSet,
    env::{join_paths, split_paths},
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};

/// Minimum Node.js major version the agent CLIs run on.
const MIN_NODE_MAJOR: u32 = 20;

/// Resolve an executable by name against `search_path`.
///
/// Absolute paths are accepted as-is when they point at a file.
pub async fn resolve_executable_path(executable: &str, search_path: &OsStr) -> Option<PathBuf> {
    if executable.trim().is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.is_absolute() {
        return path.is_file().then(|| path.to_path_buf());
    }

    let executable = executable.to_string();
    let search_path = search_path.to_os_string();
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    tokio::task::spawn_blocking(move || which::which_in(executable, Some(search_path), cwd))
        .await
        .ok()
        .and_then(Result::ok)
}

/// Merge two PATH strings into a single, de-duplicated PATH.
#[must_use]
pub fn merge_paths(primary: impl AsRef<OsStr>, secondary: impl AsRef<OsStr>) -> OsString {
    let mut seen = HashSet::<PathBuf>::new();
    let mut merged = Vec::<PathBuf>::new();

    for p in split_paths(primary.as_ref()).chain(split_paths(secondary.as_ref())) {
        if !p.as_os_str().is_empty() && seen.insert(p.clone()) {
            merged.push(p);
        }
    }

    join_paths(merged).unwrap_or_default()
}

/// PATH for the worker process.
///
/// Puts a recent nvm-managed Node and `~/.local/bin` ahead of `current`.
#[must_use]
pub fn worker_path(current: &OsStr) -> OsString {
    let Some(home) = dirs::home_dir() else {
        return current.to_os_string();
    };
    worker_path_in(&home, current)
}

fn worker_path_in(home: &Path, current: &OsStr) -> OsString {
    let mut extra = Vec::new();
    if let Some(node_bin) = newest_node_bin(&home.join(".nvm").join("versions").join("node")) {
        extra.push(node_bin);
    }
    let local_bin = home.join(".local").join("bin");
    if local_bin.is_dir() {
        extra.push(local_bin);
    }

    if extra.is_empty() {
        return current.to_os_string();
    }
    tracing::debug!(?extra, "Extending worker PATH");
    merge_paths(join_paths(extra).unwrap_or_default(), current)
}

/// Highest installed Node version (>= 20) under an nvm `versions/node` dir.
fn newest_node_bin(nvm_root: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(nvm_root).ok()?;
    entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name();
            let major = name
                .to_str()?
                .trim_start_matches('v')
                .split('.')
                .next()?
                .parse::<u32>()
                .ok()?;
            let bin = entry.path().join("bin");
            (major >= MIN_NODE_MAJOR && bin.join("node").is_file()).then_some((major, bin))
        })
        .max_by_key(|(major, _)| *major)
        .map(|(_, bin)| bin)
}
