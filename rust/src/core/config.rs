use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppCore;

const DEFAULT_PAGE_SIZE: usize = 20;
const DEFAULT_PENDING_TIMEOUT_SECS: u64 = 60;
const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1_000;
const DEFAULT_APP_NAME: &str = "Parley";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub(crate) page_size: Option<usize>,
    // Pending entries older than this are promoted to Failed by the sweep.
    pub(crate) pending_timeout_secs: Option<u64>,
    pub(crate) sweep_interval_ms: Option<u64>,
    pub(crate) app_name: Option<String>,
}

pub(crate) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join("parley_config.json");
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    match serde_json::from_slice::<AppConfig>(&bytes) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %path.display(), %e, "ignoring unreadable config");
            AppConfig::default()
        }
    }
}

pub(crate) fn default_app_config_json() -> String {
    let config = AppConfig {
        page_size: Some(DEFAULT_PAGE_SIZE),
        pending_timeout_secs: Some(DEFAULT_PENDING_TIMEOUT_SECS),
        sweep_interval_ms: Some(DEFAULT_SWEEP_INTERVAL_MS),
        app_name: Some(DEFAULT_APP_NAME.to_string()),
    };
    serde_json::to_string_pretty(&config).unwrap_or_else(|_| "{}".to_string())
}

impl AppConfig {
    pub(crate) fn page_size(&self) -> usize {
        if let Some(n) = std::env::var("PARLEY_PAGE_SIZE")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
        {
            return n;
        }
        self.page_size
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub(crate) fn pending_timeout(&self) -> Duration {
        Duration::from_secs(
            self.pending_timeout_secs
                .unwrap_or(DEFAULT_PENDING_TIMEOUT_SECS),
        )
    }

    pub(crate) fn sweep_interval(&self) -> Duration {
        Duration::from_millis(
            self.sweep_interval_ms
                .filter(|ms| *ms > 0)
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_MS),
        )
    }

    pub(crate) fn app_name(&self) -> &str {
        self.app_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_APP_NAME)
    }
}

impl AppCore {
    pub(super) fn pending_timeout_ms(&self) -> i64 {
        i64::try_from(self.config.pending_timeout().as_millis()).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_app_config(dir.path().to_str().unwrap());
        assert_eq!(config.pending_timeout(), Duration::from_secs(60));
        assert_eq!(config.sweep_interval(), Duration::from_millis(1_000));
        assert_eq!(config.app_name(), "Parley");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("parley_config.json"),
            br#"{"pending_timeout_secs": 5, "app_name": "Lenster"}"#,
        )
        .unwrap();
        let config = load_app_config(dir.path().to_str().unwrap());
        assert_eq!(config.pending_timeout(), Duration::from_secs(5));
        assert_eq!(config.app_name(), "Lenster");
        assert_eq!(config.sweep_interval(), Duration::from_millis(1_000));
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("parley_config.json"), b"{not json").unwrap();
        let config = load_app_config(dir.path().to_str().unwrap());
        assert!(config.page_size.is_none());
        assert_eq!(config.app_name(), "Parley");
    }

    #[test]
    fn zero_values_are_ignored() {
        let config = AppConfig {
            sweep_interval_ms: Some(0),
            app_name: Some("   ".into()),
            ..AppConfig::default()
        };
        assert_eq!(config.sweep_interval(), Duration::from_millis(1_000));
        assert_eq!(config.app_name(), "Parley");
    }

    #[test]
    fn default_json_round_trips() {
        let parsed: AppConfig = serde_json::from_str(&default_app_config_json()).unwrap();
        assert_eq!(parsed.page_size, Some(20));
        assert_eq!(parsed.pending_timeout_secs, Some(60));
    }
}
