//! Load uploader configuration from a TOML file and apply command line overrides

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::info;
use serde::Deserialize;
use url::Url;

/// Environment variable that overrides `[api] token`
pub static TOKEN_ENV: &str = "BAM_UPLOADER_TOKEN";

static DEFAULT_MARKER_SUFFIX: &str = "FLAG";
static DEFAULT_LOG_FILE: &str = "bam-uploader.log";
const DEFAULT_INTERVAL_SECS: u64 = 30;
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Validated configuration used by the rest of the program
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub watch: WatchConfig,
    pub log_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: Url,
    pub token: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub root: PathBuf,
    pub marker_suffix: String,
    pub interval: Duration,
}

/// Values set on the command line, these win over the config file
#[derive(Debug, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub watch_dir: Option<PathBuf>,
    pub marker_suffix: Option<String>,
    pub interval_secs: Option<u64>,
    pub log_file: Option<PathBuf>,
}

/// Raw file layout, every key is optional until overrides are applied
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    api: ApiSection,
    #[serde(default)]
    watch: WatchSection,
    #[serde(default)]
    log: LogSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ApiSection {
    base_url: Option<String>,
    token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct WatchSection {
    path: Option<PathBuf>,
    marker_suffix: Option<String>,
    interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LogSection {
    file: Option<PathBuf>,
}

impl Config {
    /// Read the config file (if any) and merge it with overrides and the token environment variable
    ///
    /// A missing file is only an error when `required` is set, i.e. the path was given explicitly.
    pub fn load(path: &Path, required: bool, overrides: Overrides) -> Result<Config> {
        let file = if path.exists() {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Can't read config file {}", path.display()))?;
            parse(&text).with_context(|| format!("Invalid config file {}", path.display()))?
        } else if required {
            bail!("Config file {} does not exist", path.display());
        } else {
            ConfigFile::default()
        };

        let env_token = std::env::var(TOKEN_ENV).ok().filter(|t| !t.trim().is_empty());
        resolve(file, overrides, env_token)
    }

    pub fn describe(&self) {
        info!("Platform API: {}", self.api.base_url);
        info!("Watching {} for *{} markers every {}s", self.watch.root.display(),
            self.watch.marker_suffix, self.watch.interval.as_secs());
        match self.api.token {
            Some(_) => info!("Using bearer token authentication"),
            None => info!("No API token configured, requests are unauthenticated"),
        }
    }
}

fn parse(text: &str) -> Result<ConfigFile> {
    Ok(toml::from_str::<ConfigFile>(text)?)
}

fn resolve(file: ConfigFile, overrides: Overrides, env_token: Option<String>) -> Result<Config> {
    let raw_url = overrides.base_url.or(file.api.base_url)
        .context("No platform base URL, set [api] base_url or --base-url")?;
    let base_url = parse_base_url(&raw_url)?;

    let root = overrides.watch_dir.or(file.watch.path)
        .context("No watch directory, set [watch] path or --watch-dir")?;

    let marker_suffix = overrides.marker_suffix.or(file.watch.marker_suffix)
        .unwrap_or_else(|| DEFAULT_MARKER_SUFFIX.to_string());
    if marker_suffix.is_empty() {
        bail!("Marker suffix can't be empty");
    }

    let interval_secs = overrides.interval_secs.or(file.watch.interval_secs).unwrap_or(DEFAULT_INTERVAL_SECS);
    if interval_secs == 0 {
        bail!("Poll interval must be at least one second");
    }

    let timeout_secs = file.api.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout_secs == 0 {
        bail!("API timeout must be at least one second");
    }

    let token = env_token.or(file.api.token);
    let log_file = overrides.log_file.or(file.log.file).unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));

    Ok(Config {
        api: ApiConfig { base_url, token, timeout: Duration::from_secs(timeout_secs) },
        watch: WatchConfig { root, marker_suffix, interval: Duration::from_secs(interval_secs) },
        log_file,
    })
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("Invalid base URL {raw}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => bail!("Unsupported base URL scheme {scheme}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static FULL: &str = r#"
[api]
base_url = "https://platform.example.org/api/"
token = "file-token"
timeout_secs = 60

[watch]
path = "/data/runs"
marker_suffix = "COMPLETE"
interval_secs = 10

[log]
file = "/var/log/uploader.log"
"#;

    #[test]
    fn full_file_is_used_as_is() {
        let config = resolve(parse(FULL).unwrap(), Overrides::default(), None).unwrap();
        assert_eq!(config.api.base_url.as_str(), "https://platform.example.org/api/");
        assert_eq!(config.api.token.as_deref(), Some("file-token"));
        assert_eq!(config.api.timeout, Duration::from_secs(60));
        assert_eq!(config.watch.root, PathBuf::from("/data/runs"));
        assert_eq!(config.watch.marker_suffix, "COMPLETE");
        assert_eq!(config.watch.interval, Duration::from_secs(10));
        assert_eq!(config.log_file, PathBuf::from("/var/log/uploader.log"));
    }

    #[test]
    fn defaults_fill_optional_keys() {
        let text = "[api]\nbase_url = \"http://localhost:8000\"\n[watch]\npath = \"runs\"\n";
        let config = resolve(parse(text).unwrap(), Overrides::default(), None).unwrap();
        assert_eq!(config.watch.marker_suffix, "FLAG");
        assert_eq!(config.watch.interval, Duration::from_secs(30));
        assert_eq!(config.api.timeout, Duration::from_secs(300));
        assert_eq!(config.log_file, PathBuf::from("bam-uploader.log"));
        assert!(config.api.token.is_none());
    }

    #[test]
    fn overrides_and_env_token_win() {
        let overrides = Overrides {
            base_url: Some("http://other:9000".to_string()),
            watch_dir: Some(PathBuf::from("/elsewhere")),
            marker_suffix: Some(".done".to_string()),
            interval_secs: Some(5),
            log_file: None,
        };
        let config = resolve(parse(FULL).unwrap(), overrides, Some("env-token".to_string())).unwrap();
        assert_eq!(config.api.base_url.as_str(), "http://other:9000/");
        assert_eq!(config.watch.root, PathBuf::from("/elsewhere"));
        assert_eq!(config.watch.marker_suffix, ".done");
        assert_eq!(config.watch.interval, Duration::from_secs(5));
        assert_eq!(config.api.token.as_deref(), Some("env-token"));
    }

    #[test]
    fn missing_base_url_is_an_error() {
        let text = "[watch]\npath = \"runs\"\n";
        let err = resolve(parse(text).unwrap(), Overrides::default(), None).unwrap_err();
        assert!(err.to_string().contains("base URL"));
    }

    #[test]
    fn rejects_bad_values() {
        let bad_scheme = "[api]\nbase_url = \"ftp://host\"\n[watch]\npath = \"runs\"\n";
        assert!(resolve(parse(bad_scheme).unwrap(), Overrides::default(), None).is_err());

        let zero_interval = "[api]\nbase_url = \"http://host\"\n[watch]\npath = \"runs\"\ninterval_secs = 0\n";
        assert!(resolve(parse(zero_interval).unwrap(), Overrides::default(), None).is_err());

        let empty_suffix = "[api]\nbase_url = \"http://host\"\n[watch]\npath = \"runs\"\nmarker_suffix = \"\"\n";
        assert!(resolve(parse(empty_suffix).unwrap(), Overrides::default(), None).is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(parse("[api]\nbase_ulr = \"http://host\"\n").is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Config::load(&missing, true, Overrides::default()).is_err());
    }
}
