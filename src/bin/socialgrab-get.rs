#![forbid(unsafe_code)]

//! One-shot command-line download of a single video into a local directory.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use socialgrab::{
    config::{DEFAULT_COOKIES_FILE, DEFAULT_YTDLP_BIN},
    engine::YtDlp,
    media::{DEFAULT_FORMAT, finalize_download, resolve_format},
    options::OptionBuilder,
    platform::Platform,
    retry::{Orchestrator, RetryPolicy},
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Download one video with yt-dlp.")]
struct Args {
    /// Video page URL.
    url: String,
    #[arg(short, long, default_value = DEFAULT_FORMAT, help = "yt-dlp format selector; \"best\" means the default")]
    format: String,
    #[arg(short, long = "output-dir", value_name = "DIR", default_value = ".", help = "Directory the file is written to")]
    output_dir: PathBuf,
    #[arg(long, value_name = "PATH", default_value = DEFAULT_COOKIES_FILE, help = "Netscape cookie file, used when it exists")]
    cookies: PathBuf,
    #[arg(long = "yt-dlp", value_name = "PATH", default_value = DEFAULT_YTDLP_BIN)]
    ytdlp_bin: PathBuf,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let args = Args::parse();
    let url = args.url.trim();
    if url.is_empty() {
        return Err(anyhow!("URL is required"));
    }
    let platform = Platform::detect(url);
    if !platform.is_supported() {
        warn!("{url} is not a known video site, trying anyway");
    }

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;
    let output_dir = fs::canonicalize(&args.output_dir)
        .with_context(|| format!("resolving {}", args.output_dir.display()))?;
    println!("Download directory: {}", output_dir.display());

    let orchestrator = Orchestrator::new(
        Arc::new(YtDlp::new(&args.ytdlp_bin)),
        OptionBuilder::new(&args.cookies, &output_dir),
        RetryPolicy::standard(),
    );
    let format = resolve_format(Some(&args.format));
    let media = orchestrator
        .download(url, platform, &format)
        .map_err(|err| anyhow!(err.user_message()))?;
    let result = finalize_download(media, &output_dir)?;

    println!("Download complete: {}", result.title);
    println!("File saved in: {}", result.filepath);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_is_required() {
        assert!(Args::try_parse_from(["socialgrab-get"]).is_err());
    }

    #[test]
    fn defaults_download_into_the_working_directory() {
        let args = Args::try_parse_from(["socialgrab-get", "https://youtu.be/abc"]).unwrap();
        assert_eq!(args.url, "https://youtu.be/abc");
        assert_eq!(args.format, DEFAULT_FORMAT);
        assert_eq!(args.output_dir, PathBuf::from("."));
        assert_eq!(args.cookies, PathBuf::from(DEFAULT_COOKIES_FILE));
        assert_eq!(args.ytdlp_bin, PathBuf::from(DEFAULT_YTDLP_BIN));
    }

    #[test]
    fn format_and_output_dir_flags() {
        let args = Args::try_parse_from([
            "socialgrab-get",
            "--format",
            "22",
            "--output-dir",
            "/tmp/clips",
            "https://x.com/a/status/1",
        ])
        .unwrap();
        assert_eq!(resolve_format(Some(&args.format)), "22");
        assert_eq!(args.output_dir, PathBuf::from("/tmp/clips"));

        let short = Args::try_parse_from(["socialgrab-get", "-f", "best", "-o", "out", "u"]).unwrap();
        assert_eq!(resolve_format(Some(&short.format)), DEFAULT_FORMAT);
        assert_eq!(short.output_dir, PathBuf::from("out"));
    }
}
