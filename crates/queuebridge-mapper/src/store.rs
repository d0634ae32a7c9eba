//! Flat-file persistence of resolved `id=url` mappings.
//!
//! One mapping per line, UTF-8, split at the first `=`. The format tolerates
//! foreign content: comments, blank lines and anything else that fails to
//! parse is silently skipped.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

const SEPARATOR: char = '=';

/// Parses one stored line into `(id, build_url)`.
///
/// Both sides are trimmed independently; the id must parse as an integer and
/// the value must be non-empty. The value may itself contain `=`.
pub fn parse_line(line: &str) -> Option<(String, String)> {
    let (id, build_url) = line.trim().split_once(SEPARATOR)?;

    let id = id.trim();
    if id.parse::<i64>().is_err() {
        return None;
    }

    let build_url = build_url.trim();
    if build_url.is_empty() {
        return None;
    }

    Some((id.to_string(), build_url.to_string()))
}

/// Loads all parseable mappings; a missing file yields an empty map, and on
/// duplicate ids the last occurrence in file order wins.
pub fn load(path: &Path) -> io::Result<HashMap<String, String>> {
    let mut mappings = HashMap::new();
    if !path.exists() {
        return Ok(mappings);
    }

    for line in fs::read_to_string(path)?.lines() {
        if let Some((id, build_url)) = parse_line(line) {
            mappings.insert(id, build_url);
        }
    }
    Ok(mappings)
}

/// Overwrites the store with the full current mapping set.
///
/// No-op when the target file does not already exist (the owning process
/// creates it at startup) or when the mapping is empty.
pub fn save(path: &Path, mappings: &HashMap<String, String>) -> io::Result<()> {
    if !path.exists() || mappings.is_empty() {
        return Ok(());
    }

    let mut ids: Vec<&String> = mappings.keys().collect();
    ids.sort_by_key(|id| id.parse::<i64>().unwrap_or(i64::MAX));

    let mut contents = String::new();
    for id in ids {
        contents.push_str(id);
        contents.push(SEPARATOR);
        contents.push_str(&mappings[id]);
        contents.push('\n');
    }
    fs::write(path, contents)
}
