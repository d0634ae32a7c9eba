//! Deterministic storage file naming, one file per CI server identity.

use std::path::{Path, PathBuf};

const FILE_PREFIX: &str = "queuebridge_id_mappings_";
const FILE_EXTENSION: &str = "conf";

const FORBIDDEN_CHARS: &[char] = &['/', '\\', '<', '>', ':', '"', '|', '?', '*'];

/// Returns the mapping-store path for `server_url` inside `mappings_dir`.
pub fn mappings_file(mappings_dir: &Path, server_url: &str) -> PathBuf {
    mappings_dir.join(format!(
        "{FILE_PREFIX}{}.{FILE_EXTENSION}",
        server_file_stem(server_url)
    ))
}

/// The host part of the server URL, with characters unfit for file names
/// normalized to `_`. Falls back to the whole address when it does not look
/// like a URL.
fn server_file_stem(server_url: &str) -> String {
    let parts: Vec<&str> = server_url.split('/').filter(|part| !part.is_empty()).collect();
    if parts.len() < 2 {
        return normalize(server_url);
    }
    normalize(parts[1])
}

fn normalize(name: &str) -> String {
    name.chars()
        .map(|c| if FORBIDDEN_CHARS.contains(&c) { '_' } else { c })
        .collect()
}
