use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::clipboard::DEFAULT_CLEAR_AFTER;
use crate::storage::{atomic_write, restrict_dir, restrict_file};

pub const APP_DIR: &str = ".pwd-shell";
pub const CONFIG_FILE: &str = "config.json";
pub const REPOSITORY_DIR: &str = "repository";

fn default_clear_after_secs() -> u64 {
    DEFAULT_CLEAR_AFTER.as_secs()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub repository_dir: Option<PathBuf>,
    #[serde(default = "default_clear_after_secs")]
    pub clear_after_secs: u64,
    #[serde(default)]
    pub editor: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repository_dir: None,
            clear_after_secs: default_clear_after_secs(),
            editor: None,
        }
    }
}

/// Values the running session needs, after config and flags are merged.
#[derive(Debug, Clone)]
pub struct Settings {
    pub repository_dir: PathBuf,
    pub clear_after: Duration,
    pub editor: Option<String>,
}

pub fn default_base_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("Could not determine home directory"))?;
    Ok(home.join(APP_DIR))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(default_base_dir()?.join(CONFIG_FILE))
}

pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = fs::read_to_string(path)?;
    let cfg: Config = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("Invalid config file {}: {e}", path.display()))?;
    Ok(cfg)
}

pub fn save_config(path: &Path, cfg: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
            restrict_dir(parent)?;
        }
    }
    let data = serde_json::to_string_pretty(cfg)?;
    atomic_write(path, data.as_bytes())?;
    restrict_file(path)?;
    Ok(())
}

pub fn validate_repository_dir(raw: &Path) -> Result<PathBuf> {
    if raw
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(anyhow!(
            "Repository path is invalid: parent traversal is not allowed"
        ));
    }
    Ok(raw.to_path_buf())
}

impl Config {
    /// Merges flags over the file values; `base_dir` anchors the default
    /// repository location.
    pub fn settings(
        &self,
        base_dir: &Path,
        repository_override: Option<&Path>,
        clear_after_override: Option<u64>,
    ) -> Result<Settings> {
        let repository_dir = match repository_override.or(self.repository_dir.as_deref()) {
            Some(dir) => validate_repository_dir(dir)?,
            None => base_dir.join(REPOSITORY_DIR),
        };
        Ok(Settings {
            repository_dir,
            clear_after: Duration::from_secs(clear_after_override.unwrap_or(self.clear_after_secs)),
            editor: self.editor.clone(),
        })
    }
}

pub fn ensure_repository_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    restrict_dir(dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = load_config(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.clear_after_secs, 5);
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let cfg = Config {
            repository_dir: Some(PathBuf::from("/tmp/repo")),
            clear_after_secs: 9,
            editor: Some("vim".into()),
        };
        save_config(&path, &cfg).unwrap();
        assert_eq!(load_config(&path).unwrap(), cfg);
    }

    #[test]
    fn partial_file_uses_field_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, r#"{"editor": "nano"}"#).unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.editor.as_deref(), Some("nano"));
        assert_eq!(cfg.clear_after_secs, 5);
    }

    #[test]
    fn flags_override_file() {
        let cfg = Config {
            repository_dir: Some(PathBuf::from("/data/a")),
            clear_after_secs: 5,
            editor: None,
        };
        let base = Path::new("/home/u/.pwd-shell");
        let settings = cfg.settings(base, Some(Path::new("/data/b")), Some(30)).unwrap();
        assert_eq!(settings.repository_dir, PathBuf::from("/data/b"));
        assert_eq!(settings.clear_after, Duration::from_secs(30));

        let settings = Config::default().settings(base, None, None).unwrap();
        assert_eq!(settings.repository_dir, base.join(REPOSITORY_DIR));
    }

    #[test]
    fn traversal_is_rejected() {
        assert!(validate_repository_dir(Path::new("/data/../etc")).is_err());
    }
}
