//! Boundary with the external extraction engine.
//!
//! The engine is yt-dlp, driven as a child process. Everything above this
//! module talks to the [`ExtractionEngine`] trait so the orchestrator and the
//! handlers can be exercised against a scripted stand-in. Failures are
//! classified exactly once, here, into [`EngineError::Blocked`] (the site
//! suspects automation; worth another attempt with a different disguise) or
//! [`EngineError::Fatal`] (anything else).

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use crate::options::ExtractionOptions;

/// Lowercase fragments the video sites use when they refuse automated access.
const BLOCK_MARKERS: &[&str] = &["bot", "cookies", "sign in to confirm"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("{0}")]
    Blocked(String),
    #[error("{0}")]
    Fatal(String),
}

impl EngineError {
    /// Classifies free-form engine output.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if looks_like_bot_check(&message) {
            EngineError::Blocked(message)
        } else {
            EngineError::Fatal(message)
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Blocked(_))
    }

    pub fn message(&self) -> &str {
        match self {
            EngineError::Blocked(message) | EngineError::Fatal(message) => message,
        }
    }
}

pub fn looks_like_bot_check(message: &str) -> bool {
    let lower = message.to_lowercase();
    BLOCK_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// One entry of yt-dlp's `formats` array. Only the fields we surface are read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFormat {
    pub format_id: Option<String>,
    pub ext: Option<String>,
    pub resolution: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub quality: Option<f64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub filesize: Option<u64>,
    /// `"none"` when the stream carries no video.
    pub vcodec: Option<String>,
    /// `"none"` when the stream carries no audio.
    pub acodec: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestedDownload {
    pub filepath: Option<String>,
}

/// Subset of the `--dump-single-json` payload. Everything is optional because
/// extractors for different sites fill in very different fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawInfo {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub duration: Option<f64>,
    pub formats: Option<Vec<RawFormat>>,
    #[serde(default)]
    pub requested_downloads: Vec<RequestedDownload>,
    #[serde(rename = "_filename")]
    pub prepared_filename: Option<String>,
    pub filename: Option<String>,
}

/// Extractors disagree on number types (`1024`, `1024.0`, `"1024"`), and an
/// odd value in one optional field must not sink the whole payload.
fn lenient_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(lenient_number))
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(|value| {
        value.as_u64().or_else(|| {
            lenient_number(value)
                .filter(|number| *number >= 0.0)
                .map(|number| number.round() as u64)
        })
    }))
}

impl RawInfo {
    /// Where the engine says it wrote the media. The post-processed path in
    /// `requested_downloads` wins over the pre-merge `_filename`.
    pub fn written_path(&self) -> Option<PathBuf> {
        self.requested_downloads
            .iter()
            .find_map(|download| download.filepath.clone())
            .or_else(|| self.prepared_filename.clone())
            .or_else(|| self.filename.clone())
            .map(PathBuf::from)
    }
}

#[derive(Debug, Clone)]
pub struct DownloadedMedia {
    pub info: RawInfo,
    pub path: PathBuf,
}

/// Capability the orchestrator needs from an extraction backend. Calls block
/// the current thread until the engine finishes.
pub trait ExtractionEngine: Send + Sync {
    fn extract_info(&self, url: &str, options: &ExtractionOptions) -> Result<RawInfo, EngineError>;

    fn download(
        &self,
        url: &str,
        options: &ExtractionOptions,
    ) -> Result<DownloadedMedia, EngineError>;
}

/// yt-dlp invoked through its command-line interface.
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Runs `<program> --version`, failing loudly when yt-dlp is missing.
    pub fn version(&self) -> Result<String> {
        let output = Command::new(&self.program)
            .arg("--version")
            .output()
            .with_context(|| format!("running {} --version", self.program.display()))?;
        if !output.status.success() {
            bail!(
                "{} --version exited with status {}",
                self.program.display(),
                output.status
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run(&self, url: &str, options: &ExtractionOptions, download: bool) -> Result<RawInfo, EngineError> {
        let mut command = Command::new(&self.program);
        command.arg("--dump-single-json").arg("--no-playlist");
        if download {
            command.arg("--no-simulate");
        } else {
            command.arg("--skip-download");
        }
        command.args(options.to_args()).arg("--").arg(url);

        let output = command.output().map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                EngineError::Fatal(format!(
                    "{} is not installed; install yt-dlp and restart the server",
                    self.program.display()
                ))
            } else {
                EngineError::Fatal(format!("could not run {}: {err}", self.program.display()))
            }
        })?;

        if !output.status.success() {
            return Err(EngineError::from_message(failure_message(
                &output.stderr,
                output.status,
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|err| EngineError::Fatal(format!("could not parse yt-dlp output: {err}")))
    }
}

impl ExtractionEngine for YtDlp {
    fn extract_info(&self, url: &str, options: &ExtractionOptions) -> Result<RawInfo, EngineError> {
        self.run(url, options, false)
    }

    fn download(
        &self,
        url: &str,
        options: &ExtractionOptions,
    ) -> Result<DownloadedMedia, EngineError> {
        let info = self.run(url, options, true)?;
        let path = info.written_path().ok_or_else(|| {
            EngineError::Fatal("yt-dlp did not report the downloaded file".to_string())
        })?;
        Ok(DownloadedMedia { info, path })
    }
}

/// Prefers yt-dlp's `ERROR:` lines; otherwise the last non-empty stderr line.
fn failure_message(stderr: &[u8], status: ExitStatus) -> String {
    let text = String::from_utf8_lossy(stderr);
    let errors: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("ERROR:"))
        .collect();
    if !errors.is_empty() {
        return errors.join(" ");
    }

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("yt-dlp exited with status {status}"))
}
