use std::path::{Component, Path, PathBuf};

/// Local path, relative to the sync destination, for an object key.
///
/// The prefix is stripped when one is configured; otherwise the full key is
/// used. Returns `None` for keys outside the prefix and for keys that would
/// resolve outside the destination (absolute paths or parent traversals).
pub fn relative_key(key: &str, prefix: &str) -> Option<PathBuf> {
    let stripped = if prefix.is_empty() {
        key
    } else {
        key.strip_prefix(prefix)?
    };

    let stripped = stripped.trim_start_matches('/');
    if stripped.is_empty() {
        return None;
    }

    let relative = Path::new(stripped);
    if relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return None;
    }

    Some(relative.to_path_buf())
}
