//! Process-wide settings, read once at startup.
//!
//! Every component receives what it needs from [`AppConfig`] at construction
//! time; nothing looks settings up from the environment after `main` has
//! built the struct.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("LibreOffice path does not exist: {0}")]
    LibreOfficeMissing(PathBuf),

    #[error("ARTIFACT_TTL_SECS ({ttl}s) must exceed OFFICE_TIMEOUT_SECS ({timeout}s)")]
    TtlTooShort { ttl: u64, timeout: u64 },

    #[error("could not create scratch directory {path}: {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_title: String,
    pub app_version: String,
    pub api_prefix: String,
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    pub scratch_dir: PathBuf,
    pub libreoffice_path: PathBuf,
    pub api_keys: HashSet<String>,
    pub office_timeout: Duration,
    pub artifact_ttl: Duration,
    pub sweep_interval: Duration,
    pub max_upload_bytes: usize,
    pub pdfium_library_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. No filesystem checks
    /// happen here; see [`AppConfig::prepare`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let libreoffice_path = get("LIBREOFFICE_PATH")
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("LIBREOFFICE_PATH"))?;
        let keys = get("VALID_API_KEYS_STR").ok_or(ConfigError::Missing("VALID_API_KEYS_STR"))?;

        Ok(Self {
            app_title: get("APP_TITLE").unwrap_or_else(|| "File Converter API".to_string()),
            app_version: get("APP_VERSION")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            api_prefix: get("API_PREFIX").unwrap_or_else(|| "/api".to_string()),
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse(&get, "PORT")?.unwrap_or(8002),
            workers: parse(&get, "HTTP_WORKERS")?,
            scratch_dir: get("TEMP_FILE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("temp_files")),
            libreoffice_path,
            api_keys: parse_api_keys(&keys),
            office_timeout: Duration::from_secs(parse(&get, "OFFICE_TIMEOUT_SECS")?.unwrap_or(120)),
            artifact_ttl: Duration::from_secs(parse(&get, "ARTIFACT_TTL_SECS")?.unwrap_or(3600)),
            sweep_interval: Duration::from_secs(parse(&get, "SWEEP_INTERVAL_SECS")?.unwrap_or(300)),
            max_upload_bytes: parse(&get, "MAX_UPLOAD_BYTES")?.unwrap_or(50 * 1024 * 1024),
            pdfium_library_dir: get("PDFIUM_LIBRARY_DIR").map(PathBuf::from),
        })
    }

    /// Startup side effects and checks: scratch root exists, LibreOffice is
    /// present, and the stale sweep cannot reap an in-flight conversion.
    pub fn prepare(&self) -> Result<(), ConfigError> {
        if !self.libreoffice_path.exists() {
            return Err(ConfigError::LibreOfficeMissing(self.libreoffice_path.clone()));
        }
        if self.artifact_ttl <= self.office_timeout {
            return Err(ConfigError::TtlTooShort {
                ttl: self.artifact_ttl.as_secs(),
                timeout: self.office_timeout.as_secs(),
            });
        }
        std::fs::create_dir_all(&self.scratch_dir).map_err(|source| ConfigError::Scratch {
            path: self.scratch_dir.clone(),
            source,
        })?;
        if self.api_keys.is_empty() {
            log::warn!(
                "VALID_API_KEYS_STR contains no usable keys; every request will be rejected"
            );
        }
        Ok(())
    }

    /// Mount point of the conversion routes, e.g. `/api/v1/conversion`.
    pub fn conversion_scope(&self) -> String {
        format!("{}/v1/conversion", self.api_prefix.trim_end_matches('/'))
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}

fn parse<T, G>(get: &G, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(None),
    }
}

fn parse_api_keys(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_optional_settings_absent() {
        let config = AppConfig::from_lookup(lookup(&[
            ("LIBREOFFICE_PATH", "/usr/bin/soffice"),
            ("VALID_API_KEYS_STR", "abc"),
        ]))
        .unwrap();

        assert_eq!(config.app_title, "File Converter API");
        assert_eq!(config.api_prefix, "/api");
        assert_eq!(config.port, 8002);
        assert_eq!(config.scratch_dir, PathBuf::from("temp_files"));
        assert_eq!(config.office_timeout, Duration::from_secs(120));
        assert_eq!(config.conversion_scope(), "/api/v1/conversion");
    }

    #[test]
    fn api_keys_are_trimmed_and_empties_dropped() {
        let config = AppConfig::from_lookup(lookup(&[
            ("LIBREOFFICE_PATH", "/usr/bin/soffice"),
            ("VALID_API_KEYS_STR", " one, two ,,three , "),
        ]))
        .unwrap();

        let mut keys: Vec<_> = config.api_keys.into_iter().collect();
        keys.sort();
        assert_eq!(keys, vec!["one", "three", "two"]);
    }

    #[test]
    fn required_settings_are_enforced() {
        let err = AppConfig::from_lookup(lookup(&[("VALID_API_KEYS_STR", "k")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("LIBREOFFICE_PATH")));

        let err = AppConfig::from_lookup(lookup(&[("LIBREOFFICE_PATH", "/x")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("VALID_API_KEYS_STR")));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = AppConfig::from_lookup(lookup(&[
            ("LIBREOFFICE_PATH", "/x"),
            ("VALID_API_KEYS_STR", "k"),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
    }

    #[test]
    fn prepare_creates_scratch_and_checks_libreoffice() {
        let root = tempfile::tempdir().unwrap();
        let office = root.path().join("soffice");
        let scratch = root.path().join("nested").join("scratch");

        let mut config = AppConfig::from_lookup(lookup(&[
            ("LIBREOFFICE_PATH", office.to_str().unwrap()),
            ("VALID_API_KEYS_STR", "k"),
            ("TEMP_FILE_DIR", scratch.to_str().unwrap()),
        ]))
        .unwrap();

        assert!(matches!(config.prepare(), Err(ConfigError::LibreOfficeMissing(_))));

        std::fs::write(&office, b"").unwrap();
        config.prepare().unwrap();
        assert!(scratch.is_dir());

        config.artifact_ttl = config.office_timeout;
        assert!(matches!(config.prepare(), Err(ConfigError::TtlTooShort { .. })));
    }
}
