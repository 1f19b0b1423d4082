//! The scratch directory downloads are staged in, and streaming them back.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use mime_guess::MimeGuess;
use tokio::fs::{self, File};
use tokio_util::io::ReaderStream;
use tracing::warn;

/// Flat directory shared by every request. Nothing in it expires.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("creating scratch directory {}", self.root.display()))
    }

    /// Path of the regular file called exactly `name` directly inside the
    /// scratch directory, or `None`. Anything that would resolve elsewhere
    /// (separators, `..`, symlinks pointing out) is treated as missing.
    pub async fn resolve(&self, name: &str) -> Option<PathBuf> {
        if !is_plain_file_name(name) {
            return None;
        }

        let candidate = self.root.join(name);
        let metadata = match fs::metadata(&candidate).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => return None,
            Err(err) => {
                warn!("could not stat {}: {}", candidate.display(), err);
                return None;
            }
        };
        if !metadata.is_file() {
            return None;
        }

        let root = fs::canonicalize(&self.root).await.ok()?;
        let canonical = fs::canonicalize(&candidate).await.ok()?;
        if canonical.parent() != Some(root.as_path()) {
            warn!(
                "refusing to serve {} from outside {}",
                canonical.display(),
                root.display()
            );
            return None;
        }

        Some(canonical)
    }
}

/// True for a single normal path component such as `clip.mp4`.
pub fn is_plain_file_name(name: &str) -> bool {
    if name.is_empty() || name.contains(['/', '\\', '\0']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Streams `path` with a download-as-attachment disposition.
pub async fn stream_attachment(path: &Path) -> std::io::Result<Response> {
    let file = File::open(path).await?;

    let stream = ReaderStream::new(file);
    let mut response = Body::from_stream(stream).into_response();

    let mime = MimeGuess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }

    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    if let Ok(value) = HeaderValue::from_str(&content_disposition(&filename)) {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }

    Ok(response)
}

/// ASCII fallback for old clients plus the exact UTF-8 name per RFC 6266.
pub fn content_disposition(filename: &str) -> String {
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_filename(filename),
        urlencoding::encode(filename)
    )
}

fn ascii_filename(value: &str) -> String {
    let sanitized: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = sanitized.trim();
    if trimmed.is_empty() {
        "download.bin".to_string()
    } else {
        trimmed.to_string()
    }
}
