//! Platform detection and OS-specific directories.

use std::path::PathBuf;
use crate::constants::APP_NAME;
use crate::error::{MmError, MmResult};

/// Detected operating system platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Android,
}

impl Platform {
    /// Detect the current platform at compile time.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "android") {
            Platform::Android
        } else {
            Platform::Linux
        }
    }

    /// Get the platform-specific application data directory.
    ///
    /// - Windows: `%APPDATA%/Matchmaker`
    /// - macOS: `~/Library/Application Support/Matchmaker`
    /// - Linux: `~/.local/share/Matchmaker`
    pub fn data_dir() -> MmResult<PathBuf> {
        let base = dirs::data_dir()
            .ok_or_else(|| MmError::Config("could not determine data directory".into()))?;
        Ok(base.join(APP_NAME))
    }

    /// Get the platform-specific configuration directory.
    pub fn config_dir() -> MmResult<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| MmError::Config("could not determine config directory".into()))?;
        Ok(base.join(APP_NAME))
    }

    /// Get a human-readable platform name.
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Windows => "Windows",
            Platform::MacOs => "macOS",
            Platform::Linux => "Linux",
            Platform::Android => "Android",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_name() {
        assert_eq!(Platform::MacOs.name(), "macOS");
        assert_eq!(Platform::Android.to_string(), "Android");
    }

    #[test]
    fn test_config_dir_is_app_scoped() {
        if let Ok(dir) = Platform::config_dir() {
            assert!(dir.ends_with(APP_NAME));
        }
    }
}
