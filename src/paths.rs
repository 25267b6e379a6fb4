//! Application path management for portable and installed modes.
//!
//! - **Portable mode**: a `.portable` marker next to the executable keeps
//!   config and state in the executable's directory.
//! - **Installed mode** (default): data lives in the platform data directory
//!   (`~/.local/share/fixa`, `%APPDATA%\fixa`, ...).

use std::path::{Path, PathBuf};
use tracing::debug;

/// Application name used for directories in installed mode
const APP_NAME: &str = "fixa";

/// Application paths for config and state
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Path to the state directory (sled database)
    pub state_dir: PathBuf,
    /// Whether running in portable mode
    pub is_portable: bool,
}

impl AppPaths {
    /// Detect the appropriate paths based on environment.
    ///
    /// Called before logging is initialized.
    pub fn detect() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        // In debug builds a config.yaml in the working directory wins
        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            if cwd.join("config.yaml").exists() {
                eprintln!("[paths] Running in DEV mode ({})", cwd.display());
                return Self::portable(&cwd);
            }
        }

        if exe_dir.join(".portable").exists() {
            Self::portable(&exe_dir)
        } else {
            let data_dir = dirs::data_dir().unwrap_or_else(|| {
                eprintln!("[paths] WARNING: no data directory, falling back to exe dir");
                exe_dir.clone()
            });
            Self::installed(&data_dir)
        }
    }

    /// Everything next to `dir`
    pub fn portable(dir: &Path) -> Self {
        Self {
            config: dir.join("config.yaml"),
            state_dir: dir.join(".state"),
            is_portable: true,
        }
    }

    /// Everything under `data_dir/fixa`
    pub fn installed(data_dir: &Path) -> Self {
        let app_data = data_dir.join(APP_NAME);
        Self {
            config: app_data.join("config.yaml"),
            state_dir: app_data.join("state"),
            is_portable: false,
        }
    }

    /// Ensure the state directory exists
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        if !self.state_dir.exists() {
            debug!("Creating state directory: {}", self.state_dir.display());
            std::fs::create_dir_all(&self.state_dir)?;
        }
        Ok(())
    }

    /// Get the sled database path (within state_dir)
    pub fn sled_db_path(&self) -> PathBuf {
        self.state_dir.join("values.sled")
    }
}
