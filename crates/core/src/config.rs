use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::bucket::BucketZone;
use crate::error::{KvSeriesError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub kv_endpoint: String,
    pub kv_project: String,
    pub kv_key: String,
    pub kv_token: Option<String>,
    pub ingest_addr: String,
    pub display_addr: String,
    pub group: Option<String>,
    pub bucket_zone: BucketZone,
    pub default_window: Duration,
    pub fetch_timeout: Duration,
    pub append_timeout: Duration,
    pub sort_merged: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kv_endpoint: "https://kv.valar.dev".to_string(),
            kv_project: "default".to_string(),
            kv_key: "timeseries".to_string(),
            kv_token: None,
            ingest_addr: "0.0.0.0:8080".to_string(),
            display_addr: "0.0.0.0:8081".to_string(),
            group: None,
            bucket_zone: BucketZone::Local,
            default_window: Duration::from_secs(7 * 24 * 60 * 60),
            fetch_timeout: Duration::from_secs(10),
            append_timeout: Duration::from_secs(10),
            sort_merged: true,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }

    /// Bearer credential, required by anything that talks to the KV service.
    pub fn require_token(&self) -> Result<&str> {
        self.kv_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| KvSeriesError::Config("KVSERIES_KV_TOKEN is not set".to_string()))
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    kv_endpoint: Option<String>,
    kv_project: Option<String>,
    kv_key: Option<String>,
    kv_token: Option<String>,
    ingest_addr: Option<String>,
    display_addr: Option<String>,
    group: Option<String>,
    bucket_timezone: Option<String>,
    default_window: Option<String>,
    fetch_timeout: Option<String>,
    append_timeout: Option<String>,
    sort_merged: Option<bool>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("KVSERIES_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("kvseries/config.toml")
}

fn load_file_overrides(path: &Path) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| KvSeriesError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| KvSeriesError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    let sort_merged = match env::var("KVSERIES_SORT_MERGED") {
        Ok(v) => Some(parse_bool(&v).ok_or_else(|| {
            KvSeriesError::Config(format!("bad KVSERIES_SORT_MERGED in environment: {v}"))
        })?),
        Err(_) => None,
    };

    Ok(ConfigOverrides {
        kv_endpoint: env::var("KVSERIES_KV_ENDPOINT").ok(),
        kv_project: env::var("KVSERIES_KV_PROJECT").ok(),
        kv_key: env::var("KVSERIES_KV_KEY").ok(),
        kv_token: env::var("KVSERIES_KV_TOKEN").ok(),
        ingest_addr: env::var("KVSERIES_INGEST_ADDR").ok(),
        display_addr: env::var("KVSERIES_DISPLAY_ADDR").ok(),
        group: env::var("KVSERIES_GROUP").ok(),
        bucket_timezone: env::var("KVSERIES_BUCKET_TZ").ok(),
        default_window: env::var("KVSERIES_DEFAULT_WINDOW").ok(),
        fetch_timeout: env::var("KVSERIES_FETCH_TIMEOUT").ok(),
        append_timeout: env::var("KVSERIES_APPEND_TIMEOUT").ok(),
        sort_merged,
    })
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.kv_endpoint {
        cfg.kv_endpoint = v;
    }
    if let Some(v) = overrides.kv_project {
        cfg.kv_project = v;
    }
    if let Some(v) = overrides.kv_key {
        cfg.kv_key = v;
    }
    if let Some(v) = overrides.kv_token {
        cfg.kv_token = Some(v);
    }
    if let Some(v) = overrides.ingest_addr {
        cfg.ingest_addr = v;
    }
    if let Some(v) = overrides.display_addr {
        cfg.display_addr = v;
    }
    if let Some(v) = overrides.group {
        cfg.group = Some(v);
    }
    if let Some(v) = overrides.bucket_timezone {
        cfg.bucket_zone = v.parse().map_err(|e| {
            KvSeriesError::Config(format!("bad bucket_timezone in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.default_window {
        cfg.default_window = parse_duration(&v, "default_window", source)?;
    }
    if let Some(v) = overrides.fetch_timeout {
        cfg.fetch_timeout = parse_duration(&v, "fetch_timeout", source)?;
    }
    if let Some(v) = overrides.append_timeout {
        cfg.append_timeout = parse_duration(&v, "append_timeout", source)?;
    }
    if let Some(v) = overrides.sort_merged {
        cfg.sort_merged = v;
    }
    Ok(())
}

fn parse_duration(value: &str, field: &str, source: &str) -> Result<Duration> {
    humantime::parse_duration(value).map_err(|e| {
        KvSeriesError::Config(format!("bad {field} in {source}: {e} (value={value})"))
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
