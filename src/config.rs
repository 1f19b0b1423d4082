use anyhow::{Context, Result, bail};
use std::{
    fs,
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use crate::retry::RetryPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/socialgrab-env";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_WWW_ROOT: &str = "static";
pub const DEFAULT_COOKIES_FILE: &str = "cookies.txt";
pub const DEFAULT_YTDLP_BIN: &str = "yt-dlp";
pub const SCRATCH_SUBDIR: &str = "downloads";
/// Longest accepted pause between attempts.
pub const MAX_RETRY_DELAY_SECS: u64 = 300;

#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub scratch_dir: Option<PathBuf>,
    pub www_root: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub cookies_file: Option<PathBuf>,
    pub ytdlp_bin: Option<PathBuf>,
    pub max_attempts: Option<u32>,
    pub retry_delay_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub scratch_dir: PathBuf,
    pub www_root: PathBuf,
    pub host: String,
    pub port: u16,
    pub cookies_file: PathBuf,
    pub ytdlp_bin: PathBuf,
    pub retry: RetryPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            www_root: PathBuf::from(DEFAULT_WWW_ROOT),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            cookies_file: PathBuf::from(DEFAULT_COOKIES_FILE),
            ytdlp_bin: PathBuf::from(DEFAULT_YTDLP_BIN),
            retry: RetryPolicy::standard(),
        }
    }
}

impl Settings {
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("Parsing bind host {:?}", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// `<os temp>/downloads`
pub fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join(SCRATCH_SUBDIR)
}

pub fn read_env_config(path: &Path) -> Result<Option<EnvConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let mut cfg = EnvConfig::default();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value_raw)) = trimmed.split_once('=') {
            let value = value_raw.trim().trim_matches('"');
            if value.is_empty() {
                continue;
            }
            match key.trim() {
                "SCRATCH_DIR" => cfg.scratch_dir = Some(PathBuf::from(value)),
                "WWW_ROOT" => cfg.www_root = Some(PathBuf::from(value)),
                "SOCIALGRAB_HOST" => cfg.host = Some(value.to_string()),
                "SOCIALGRAB_PORT" => {
                    let port: u16 = value.parse().with_context(|| {
                        format!("Parsing SOCIALGRAB_PORT from {}", path.display())
                    })?;
                    cfg.port = Some(port);
                }
                "COOKIES_FILE" => cfg.cookies_file = Some(PathBuf::from(value)),
                "YTDLP_BIN" => cfg.ytdlp_bin = Some(PathBuf::from(value)),
                "MAX_ATTEMPTS" => {
                    let attempts: u32 = value.parse().with_context(|| {
                        format!("Parsing MAX_ATTEMPTS from {}", path.display())
                    })?;
                    if attempts == 0 {
                        bail!("MAX_ATTEMPTS in {} must be at least 1", path.display());
                    }
                    cfg.max_attempts = Some(attempts);
                }
                "RETRY_DELAY_SECS" => {
                    let secs: u64 = value.parse().with_context(|| {
                        format!("Parsing RETRY_DELAY_SECS from {}", path.display())
                    })?;
                    if secs > MAX_RETRY_DELAY_SECS {
                        bail!(
                            "RETRY_DELAY_SECS in {} must be at most {}",
                            path.display(),
                            MAX_RETRY_DELAY_SECS
                        );
                    }
                    cfg.retry_delay_secs = Some(secs);
                }
                _ => {}
            }
        }
    }
    Ok(Some(cfg))
}

/// A missing file is not an error: every key has a default.
pub fn load_settings_from(path: impl AsRef<Path>) -> Result<Settings> {
    let path = path.as_ref();
    let Some(cfg) = read_env_config(path)? else {
        return Ok(Settings::default());
    };
    Ok(apply(Settings::default(), cfg))
}

fn apply(defaults: Settings, cfg: EnvConfig) -> Settings {
    let max_attempts = cfg.max_attempts.unwrap_or(defaults.retry.max_attempts);
    let delay = cfg
        .retry_delay_secs
        .map(Duration::from_secs)
        .unwrap_or(defaults.retry.initial_backoff);
    Settings {
        scratch_dir: cfg.scratch_dir.unwrap_or(defaults.scratch_dir),
        www_root: cfg.www_root.unwrap_or(defaults.www_root),
        host: cfg.host.unwrap_or(defaults.host),
        port: cfg.port.unwrap_or(defaults.port),
        cookies_file: cfg.cookies_file.unwrap_or(defaults.cookies_file),
        ytdlp_bin: cfg.ytdlp_bin.unwrap_or(defaults.ytdlp_bin),
        retry: RetryPolicy::fixed(max_attempts, delay),
    }
}
