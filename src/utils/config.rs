use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::models::Settings;

const ENV_CONFIG_PATH: &str = "MONITOR_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/settings.json";

pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

pub fn config_path() -> PathBuf {
    std::env::var(ENV_CONFIG_PATH)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Reads settings from `path`; a missing file yields the defaults.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        log::info!("[Config] {} not found, using defaults", path.display());
        return Ok(Settings::default());
    }

    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let settings = serde_json::from_str(&raw).with_context(|| format!("invalid settings file {}", path.display()))?;
    log::info!("[Config] Loaded settings from {}", path.display());
    Ok(settings)
}

/// Applies `MONITOR_*` overrides. `lookup` is `std::env::var` in production.
pub fn apply_env_overrides<F>(settings: &mut Settings, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(url) = get("MONITOR_CAMERA_URL") {
        settings.camera_url = Some(url);
    }
    if let Some(url) = get("MONITOR_CLASSIFIER_URL") {
        settings.classifier_url = Some(url);
    }
    if let Some(dir) = get("MONITOR_OUTPUT_DIR") {
        settings.output_dir = PathBuf::from(dir);
    }
    if let Some(host) = get("MONITOR_HOST") {
        settings.host = host;
    }
    if let Some(port) = get("MONITOR_PORT") {
        settings.web_port = port
            .parse()
            .with_context(|| format!("MONITOR_PORT must be a port number, got '{}'", port))?;
    }
    if let Some(keywords) = get("MONITOR_CRM_KEYWORDS") {
        settings.crm_keywords = keywords
            .split(',')
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
    }
    Ok(())
}

/// `.env`, then the settings file, then environment overrides.
pub fn load_from_env() -> Result<Settings> {
    load_dotenv();
    let mut settings = load_settings(&config_path())?;
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings.web_port, 5000);
    }

    #[test]
    fn file_then_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "camera_url": "rtsp://cam/1", "web_port": 7000 }"#).unwrap();

        let mut settings = load_settings(&path).unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("MONITOR_PORT", "8081"),
            ("MONITOR_CRM_KEYWORDS", " AmoCRM, zoho ,,"),
            ("MONITOR_OUTPUT_DIR", "  "),
        ]);
        apply_env_overrides(&mut settings, |key| env.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(settings.camera_url.as_deref(), Some("rtsp://cam/1"));
        assert_eq!(settings.web_port, 8081);
        assert_eq!(settings.crm_keywords, vec!["amocrm", "zoho"]);
        assert_eq!(settings.output_dir, PathBuf::from("activity_logs"));
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut settings = Settings::default();
        let result = apply_env_overrides(&mut settings, |key| (key == "MONITOR_PORT").then(|| "eighty".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_settings(&path).is_err());
    }
}
