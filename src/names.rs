// SPDX-FileCopyrightText: 2025 khpack contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::container::{ContainerEntry, ContainerKind, EntryHash};
use crate::error::Error;

/// Extension given to entries with no known name.
const FALLBACK_EXTENSION: &str = "dat";

/// Known relative paths, keyed by their content hash.
///
/// Paths are stored with `/` separators. Anything that could escape the destination, or that
/// looks like a fallback name, is refused when it's inserted.
#[derive(Debug, Default, Clone)]
pub struct NameTable {
    names: HashMap<EntryHash, String>,
}

impl NameTable {
    /// Creates an empty table. Every entry will resolve to its fallback name.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a known `path` for `hash`. Returns `false` if the path was refused.
    pub fn insert(&mut self, hash: EntryHash, path: &str) -> bool {
        let Some(normalized) = normalize_path(path) else {
            warn!(%hash, path, "Refusing unsafe path");
            return false;
        };

        let file_name = normalized.rsplit('/').next().unwrap_or(&normalized);
        if is_fallback_name(file_name) {
            warn!(%hash, path, "Refusing path that looks like an unknown entry");
            return false;
        }

        if let Some(previous) = self.names.insert(hash, normalized) {
            debug!(%hash, %previous, path, "Replaced known name");
        }

        true
    }

    /// Hashes `path` the way containers of `kind` do, and adds it.
    pub fn insert_path(&mut self, kind: ContainerKind, path: &str) -> bool {
        let normalized = path.replace('\\', "/");
        self.insert(EntryHash::from_path(kind, &normalized), &normalized)
    }

    /// Reads a JSON object mapping hashes (as printed by [`EntryHash`]) to paths.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let map: HashMap<String, String> = serde_json::from_str(text)
            .map_err(|err| Error::config(format!("invalid name table: {err}")))?;

        let mut table = Self::new();
        for (hash, path) in map {
            let parsed = EntryHash::parse(&hash)
                .ok_or_else(|| Error::config(format!("invalid hash {hash:?} in name table")))?;
            table.insert(parsed, &path);
        }

        Ok(table)
    }

    /// Reads a list of known paths, one per line, and hashes them for `kind`. Empty lines and
    /// lines starting with `#` are ignored.
    pub fn from_path_list(kind: ContainerKind, text: &str) -> Self {
        let mut table = Self::new();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            table.insert_path(kind, line);
        }

        table
    }

    /// Loads a name table file. `.json` files are read with [`NameTable::from_json`], anything
    /// else is treated as a path list for `kind`.
    pub fn load(path: &Path, kind: ContainerKind) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            Error::config(format!("unable to read name table {}: {err}", path.display()))
        })?;

        let table = match path.extension().and_then(|x| x.to_str()) {
            Some(extension) if extension.eq_ignore_ascii_case("json") => Self::from_json(&text)?,
            _ => Self::from_path_list(kind, &text),
        };

        debug!(path = %path.display(), names = table.len(), "Loaded name table");

        Ok(table)
    }

    /// Adds every name from `other`, replacing names that are in both.
    pub fn extend(&mut self, other: NameTable) {
        self.names.extend(other.names);
    }

    /// Looks up the known path of `hash`.
    pub fn get(&self, hash: &EntryHash) -> Option<&str> {
        self.names.get(hash).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Turns entries into relative output paths.
#[derive(Debug, Clone)]
pub struct AssetNameResolver {
    table: Arc<NameTable>,
}

impl AssetNameResolver {
    pub fn new(table: Arc<NameTable>) -> Self {
        Self { table }
    }

    /// The relative path `entry` is extracted to. This never fails, unknown entries get a name
    /// derived from their hash.
    pub fn resolve(&self, entry: &ContainerEntry) -> String {
        self.resolve_hash(&entry.hash)
    }

    /// Same as [`AssetNameResolver::resolve`], for a bare hash.
    pub fn resolve_hash(&self, hash: &EntryHash) -> String {
        match self.table.get(hash) {
            Some(path) => path.to_string(),
            None => fallback_name(hash),
        }
    }

    /// Whether `hash` has a known name.
    pub fn is_known(&self, hash: &EntryHash) -> bool {
        self.table.get(hash).is_some()
    }
}

/// The name given to an entry with no known path, e.g. `DEADBEEF_1234.dat`.
pub fn fallback_name(hash: &EntryHash) -> String {
    format!("{hash}.{FALLBACK_EXTENSION}")
}

/// Whether `file_name` could have been produced by [`fallback_name`].
fn is_fallback_name(file_name: &str) -> bool {
    let Some((stem, extension)) = file_name.rsplit_once('.') else {
        return false;
    };

    extension.eq_ignore_ascii_case(FALLBACK_EXTENSION)
        && stem.chars().all(|c| c.is_ascii_hexdigit() || c == '_')
        && EntryHash::parse(stem).is_some()
}

/// Normalizes separators, and refuses paths that aren't relative to the destination.
fn normalize_path(path: &str) -> Option<String> {
    let path = path.replace('\\', "/");
    if path.starts_with('/') {
        return None;
    }

    let mut components = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => continue,
            ".." => return None,
            // drive letters
            _ if component.contains(':') => return None,
            _ => components.push(component),
        }
    }

    if components.is_empty() {
        return None;
    }

    Some(components.join("/"))
}
