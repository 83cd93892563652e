//! Discovery of assistant servers on disk
//!
//! A server definition is any regular file whose stem ends in `_server`
//! (e.g. `lights_server.py`). Its display metadata is read from two
//! assignment lines, found by a plain text scan; the file is never executed:
//!
//! ```text
//! SERVER_NAME = "Lights"
//! SERVER_DESCRIPTION = "Controls the living room lights"
//! ```

use std::path::{Path, PathBuf};

use pa_core::ServerDescriptor;

/// Suffix a file stem must carry to be treated as a server definition
pub const SERVER_SUFFIX: &str = "_server";

/// Description used when a definition carries none
pub const DEFAULT_DESCRIPTION: &str = "No description available";

const NAME_KEY: &str = "SERVER_NAME";
const DESCRIPTION_KEY: &str = "SERVER_DESCRIPTION";

/// Scan `dir` for server definitions.
///
/// Per-file problems are logged and fall back to file-name-derived metadata;
/// they never abort the scan. A missing directory yields an empty list.
pub fn discover_servers(dir: &Path) -> Vec<ServerDescriptor> {
    let dir = match dir.canonicalize() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::warn!("Server directory {:?} unavailable: {}", dir, e);
            return Vec::new();
        }
    };

    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Failed to read server directory {:?}: {}", dir, e);
            return Vec::new();
        }
    };

    let mut servers = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                tracing::warn!("Skipping unreadable entry in {:?}: {}", dir, e);
                continue;
            }
        };

        if !path.is_file() || server_stem(&path).is_none() {
            continue;
        }

        servers.push(describe_server(path));
    }

    servers.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
    tracing::info!("Discovered {} servers in {:?}", servers.len(), dir);
    servers
}

/// Build the descriptor of a single server definition
pub fn describe_server(path: PathBuf) -> ServerDescriptor {
    let fallback_name = server_stem(&path)
        .map(display_name_from_stem)
        .unwrap_or_else(|| path.display().to_string());

    let (name, description) = match std::fs::read(&path) {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes);
            (
                metadata_value(&text, NAME_KEY),
                metadata_value(&text, DESCRIPTION_KEY),
            )
        }
        Err(e) => {
            tracing::warn!("Failed to read server metadata from {:?}: {}", path, e);
            (None, None)
        }
    };

    ServerDescriptor {
        name: name.unwrap_or(fallback_name),
        path,
        description: description.unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
    }
}

/// File stem without the `_server` suffix, if the file is a server definition
fn server_stem(path: &Path) -> Option<&str> {
    let stem = path.file_stem()?.to_str()?;
    let base = stem.strip_suffix(SERVER_SUFFIX)?;
    (!base.is_empty()).then_some(base)
}

/// `smart_home` -> `Smart Home`
pub fn display_name_from_stem(stem: &str) -> String {
    stem.split(['_', '-'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Value of the first `KEY = "value"` line (single or double quotes)
fn metadata_value(text: &str, key: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let rest = line.trim_start().strip_prefix(key)?;
        let rest = rest.trim_start().strip_prefix('=')?.trim();
        let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
        let inner = &rest[quote.len_utf8()..];
        let end = inner.find(quote)?;
        let value = inner[..end].trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}
