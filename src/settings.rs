use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{QmError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    /// Default facility filter for reports. Empty means "must be passed
    /// on the command line".
    #[serde(default)]
    pub facility_name: String,
    #[serde(default = "default_inflation_rate")]
    pub inflation_rate: f64,
}

fn default_inflation_rate() -> f64 {
    0.03
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            facility_name: String::new(),
            inflation_rate: default_inflation_rate(),
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("quartermaster")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("quartermaster")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| QmError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn get_data_dir() -> PathBuf {
    PathBuf::from(&load_settings().data_dir)
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings {
            data_dir: "/tmp/test".to_string(),
            facility_name: "Mercy General Hospital".to_string(),
            inflation_rate: 0.045,
        };
        let json = serde_json::to_string_pretty(&settings).unwrap();
        std::fs::write(&path, &json).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let loaded: Settings = serde_json::from_str(&content).unwrap();
        assert_eq!(loaded.facility_name, "Mercy General Hospital");
        assert_eq!(loaded.data_dir, "/tmp/test");
        assert_eq!(loaded.inflation_rate, 0.045);
    }

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert!(s.facility_name.is_empty());
        assert_eq!(s.inflation_rate, 0.03);
        assert!(!s.data_dir.is_empty());
    }

    #[test]
    fn test_load_merges_with_defaults() {
        let json = r#"{"data_dir": "/tmp/test", "facility_name": "St. Anne"}"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(s.inflation_rate, 0.03);
        assert_eq!(s.facility_name, "St. Anne");
    }
}
