//! Default filesystem locations for runtime state.
//!
//! Resolves platform-appropriate directories via [`dirs`]; every path can
//! be overridden with an environment variable for tests and custom
//! deployments.

use std::path::PathBuf;

/// Application data root, e.g. for the client registry's persisted JSON.
///
/// Resolves to `dirs::data_dir()/vox-runtime/` by default. Override with
/// `VOX_RUNTIME_DATA_DIR`.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(over) = std::env::var_os("VOX_RUNTIME_DATA_DIR") {
        return PathBuf::from(over);
    }
    dirs::data_dir()
        .map(|d| d.join("vox-runtime"))
        .unwrap_or_else(|| PathBuf::from("/tmp/vox-runtime-data"))
}

/// Default path for the client registry's persisted registration file.
#[must_use]
pub fn client_registry_file() -> PathBuf {
    data_dir().join("client_registry.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_is_honored() {
        // SAFETY: test-only, single-threaded within this process's test harness.
        unsafe { std::env::set_var("VOX_RUNTIME_DATA_DIR", "/tmp/vox-runtime-test-override") };
        assert_eq!(data_dir(), PathBuf::from("/tmp/vox-runtime-test-override"));
        unsafe { std::env::remove_var("VOX_RUNTIME_DATA_DIR") };
    }
}
