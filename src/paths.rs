use std::path::{Path, PathBuf};

/// Virtio-serial port exposed inside the guest.
pub const DEFAULT_PORT: &str = "/dev/virtio-ports/org.qubes-os.qubesdb";

/// Cache directory consulted by guest tooling.
pub const DEFAULT_CACHE_DIR: &str = "/var/lib/qubesdb";

/// Aggregate document inside a cache root.
pub fn aggregate_path(root: &Path) -> PathBuf {
    root.join("qubesdb.json")
}

/// Per-key entries directory inside a cache root.
pub fn entries_dir(root: &Path) -> PathBuf {
    root.join("entries")
}

/// Filesystem-safe filename for a key: leading `/` stripped, remaining `/`
/// flattened to `_`.
pub fn safe_key(key: &str) -> String {
    key.trim_start_matches('/').replace('/', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_key_strips_leading_separator() {
        assert_eq!(safe_key("/name"), "name");
        assert_eq!(safe_key("name"), "name");
    }

    #[test]
    fn safe_key_flattens_nested_separators() {
        assert_eq!(safe_key("/qubes-keyboard/layout"), "qubes-keyboard_layout");
    }
}
