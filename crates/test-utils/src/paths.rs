//! Path utilities for locating scenario files and scratch directories.

use std::path::PathBuf;

/// Returns the workspace root directory.
///
/// This is determined by walking up from the current crate's manifest directory
/// until we find the workspace Cargo.toml.
pub fn workspace_root() -> PathBuf {
    // Start from the test-utils crate manifest dir
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir)
        .parent() // crates/
        .and_then(|p| p.parent()) // workspace root
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from(manifest_dir))
}

/// Returns the directory holding the bundled YAML scenarios.
pub fn scenarios_dir() -> PathBuf {
    workspace_root()
        .join("validation")
        .join("ws-flood")
        .join("scenarios")
}

/// Searches for a scenario file by name.
///
/// Checks `SCENARIO_DIR` (if set) before the bundled scenarios directory.
pub fn find_scenario(name: &str) -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(dir) = std::env::var("SCENARIO_DIR") {
        candidates.push(PathBuf::from(dir).join(name));
    }
    candidates.push(scenarios_dir().join(name));

    candidates.into_iter().find(|p| p.exists())
}

/// Creates a temporary directory for test output.
///
/// The directory is automatically cleaned up when the returned `TempDir` is dropped.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temporary test directory")
}

/// Writes `content` to `name` inside a fresh temporary directory.
///
/// Keep the returned `TempDir` alive for as long as the file is needed.
pub fn write_temp_file(name: &str, content: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = temp_test_dir();
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("Failed to write temporary test file");
    (dir, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_root_is_valid() {
        let root = workspace_root();
        // Should contain Cargo.toml at workspace level
        assert!(
            root.join("Cargo.toml").exists(),
            "Workspace root should contain Cargo.toml: {:?}",
            root
        );
    }

    #[test]
    fn test_scenarios_dir() {
        let dir = scenarios_dir();
        assert!(dir.ends_with("validation/ws-flood/scenarios"));
    }

    #[test]
    fn test_find_scenario_missing() {
        assert!(find_scenario("does-not-exist.yaml").is_none());
    }

    #[test]
    fn test_write_temp_file() {
        let (_dir, path) = write_temp_file("flood.yaml", "host: a\n");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "host: a\n");
    }
}
