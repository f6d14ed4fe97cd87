//! Configuration management

use anyhow::{Context, Result};
use portal_core::Settings;
use std::path::{Path, PathBuf};

pub struct SettingsManager;

impl SettingsManager {
    /// Get the portal home directory (~/.portal)
    pub fn portal_home() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("PORTAL_HOME") {
            return Ok(PathBuf::from(path));
        }
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".portal"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Result<PathBuf> {
        Ok(Self::portal_home()?.join("settings.json"))
    }

    /// Get the portal definitions file path
    pub fn portals_path() -> Result<PathBuf> {
        Ok(Self::portal_home()?.join("portals.json"))
    }

    /// Get the log file path
    pub fn log_path() -> Result<PathBuf> {
        Ok(Self::portal_home()?.join("daemon.log"))
    }

    /// Get the daemon PID file path
    pub fn pid_path() -> Result<PathBuf> {
        Ok(Self::portal_home()?.join("daemon.pid"))
    }

    /// Load settings from disk
    pub fn load() -> Result<Settings> {
        Self::load_from(&Self::settings_path()?)
    }

    /// Save settings to disk
    pub fn save(settings: &Settings) -> Result<()> {
        Self::save_to(settings, &Self::settings_path()?)
    }

    /// Load settings from `path`, writing defaults if the file does not exist
    pub fn load_from(path: &Path) -> Result<Settings> {
        if !path.exists() {
            let settings = Settings::default();
            Self::save_to(&settings, path)?;
            return Ok(settings);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {:?}", path))?;
        let settings: Settings = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings from {:?}", path))?;

        Ok(settings)
    }

    pub fn save_to(settings: &Settings, path: &Path) -> Result<()> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let content =
            serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write settings to {:?}", path))?;

        // Set permissions on Unix (restrict to owner only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(path, perms)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_settings_are_created() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("home/settings.json");

        let settings = SettingsManager::load_from(&path).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(path.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");

        let settings = Settings {
            rpc_port: 17001,
            default_address: "127.0.0.1:3000".to_string(),
            ..Settings::default()
        };
        SettingsManager::save_to(&settings, &path).unwrap();

        assert_eq!(SettingsManager::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_corrupt_settings_report_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, "{oops").unwrap();

        let err = SettingsManager::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse settings"));
    }
}
