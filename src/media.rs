//! Shapes returned to the browser and the post-download bookkeeping.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::info;

use crate::engine::{DownloadedMedia, RawFormat, RawInfo};
use crate::platform::Platform;

/// At most this many formats are offered to the user.
pub const MAX_FORMATS: usize = 10;
/// Progressive mp4 when the site has one, otherwise whatever is best.
pub const DEFAULT_FORMAT: &str = "best[ext=mp4]/best";
/// yt-dlp's marker for a missing video or audio stream.
const CODEC_NONE: &str = "none";
const ILLEGAL_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const FALLBACK_FILENAME: &str = "download";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatDescriptor {
    pub format_id: String,
    pub ext: String,
    pub resolution: String,
    pub quality: f64,
    /// Bytes; 0 when the site does not announce a size.
    pub filesize: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoInfo {
    pub title: String,
    pub thumbnail: String,
    /// Seconds.
    pub duration: f64,
    pub formats: Vec<FormatDescriptor>,
    pub platform: Platform,
}

impl VideoInfo {
    pub fn from_raw(raw: RawInfo, platform: Platform) -> Self {
        let formats = raw
            .formats
            .as_deref()
            .map(combined_formats)
            .unwrap_or_default();
        Self {
            title: raw.title.unwrap_or_else(|| "Unknown".to_string()),
            thumbnail: raw.thumbnail.unwrap_or_default(),
            duration: raw.duration.unwrap_or(0.0),
            formats,
            platform,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadResult {
    pub success: bool,
    pub filename: String,
    pub filepath: String,
    pub title: String,
}

fn has_video(format: &RawFormat) -> bool {
    format.vcodec.as_deref() != Some(CODEC_NONE)
}

fn has_audio(format: &RawFormat) -> bool {
    format.acodec.as_deref() != Some(CODEC_NONE)
}

/// Selectable formats carrying both video and audio, in engine order, capped
/// at [`MAX_FORMATS`]. A format without an id cannot be requested back and is
/// skipped.
pub fn combined_formats(formats: &[RawFormat]) -> Vec<FormatDescriptor> {
    formats
        .iter()
        .filter(|format| has_video(format) && has_audio(format))
        .filter_map(|format| {
            let format_id = format.format_id.as_deref()?.trim();
            (!format_id.is_empty()).then(|| (format_id.to_string(), format))
        })
        .take(MAX_FORMATS)
        .map(|(format_id, format)| FormatDescriptor {
            format_id,
            ext: format.ext.clone().unwrap_or_else(|| "mp4".to_string()),
            resolution: format
                .resolution
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            quality: format.quality.unwrap_or(0.0),
            filesize: format.filesize.unwrap_or(0),
        })
        .collect()
}

/// `None` and `"best"` both mean the default selector.
pub fn resolve_format(requested: Option<&str>) -> String {
    match requested.map(str::trim) {
        None | Some("") | Some("best") => DEFAULT_FORMAT.to_string(),
        Some(format) => format.to_string(),
    }
}

/// Drops characters that are illegal in file names on common filesystems.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !ILLEGAL_FILENAME_CHARS.contains(c))
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => FALLBACK_FILENAME.to_string(),
        _ => cleaned,
    }
}

/// Moves the engine's file to its sanitized name inside `scratch_dir`.
/// A file already there under that name is replaced.
pub fn finalize_download(media: DownloadedMedia, scratch_dir: &Path) -> Result<DownloadResult> {
    let DownloadedMedia { info, path } = media;
    if !path.is_file() {
        bail!("Download failed - file not found");
    }

    let original = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .context("Download failed - engine reported a path without a file name")?;
    let filename = sanitize_filename(&original);
    let target = scratch_dir.join(&filename);

    if path != target {
        fs::rename(&path, &target).with_context(|| {
            format!(
                "Download failed: moving {} to {}",
                path.display(),
                target.display()
            )
        })?;
    }
    info!(file = %target.display(), "download stored");

    Ok(DownloadResult {
        success: true,
        filename,
        filepath: target.to_string_lossy().to_string(),
        title: info.title.unwrap_or_else(|| "Unknown".to_string()),
    })
}
