#![forbid(unsafe_code)]

//! HTTP front-end that analyzes and downloads social-media videos through
//! yt-dlp.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use socialgrab::{
    config::{DEFAULT_CONFIG_PATH, Settings, load_settings_from},
    engine::YtDlp,
    files::ScratchDir,
    options::OptionBuilder,
    retry::Orchestrator,
    server::{AppState, router},
};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve the social video downloader API.")]
struct Args {
    #[arg(long = "config", value_name = "PATH", default_value = DEFAULT_CONFIG_PATH, help = "Path to the env-style config file")]
    config: PathBuf,
    #[arg(long, help = "Address to bind, overrides SOCIALGRAB_HOST")]
    host: Option<String>,
    #[arg(short, long, help = "Port to listen on, overrides SOCIALGRAB_PORT")]
    port: Option<u16>,
}

impl Args {
    fn apply(&self, settings: &mut Settings) {
        if let Some(host) = &self.host {
            settings.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let args = Args::parse();
    let mut settings = load_settings_from(&args.config)
        .with_context(|| format!("loading settings from {}", args.config.display()))?;
    args.apply(&mut settings);

    let scratch = ScratchDir::new(&settings.scratch_dir);
    scratch.ensure()?;

    let engine = YtDlp::new(&settings.ytdlp_bin);
    match engine.version() {
        Ok(version) => info!("using {} {}", engine.program().display(), version),
        Err(err) => warn!("yt-dlp check failed, analyze and download will fail: {err:#}"),
    }

    let orchestrator = Orchestrator::new(
        Arc::new(engine),
        OptionBuilder::new(&settings.cookies_file, scratch.path()),
        settings.retry.clone(),
    );
    info!(
        scratch = %scratch.path().display(),
        max_attempts = settings.retry.max_attempts,
        "scratch directory ready"
    );
    let app = router(AppState::new(orchestrator, scratch, &settings.www_root));

    let addr = settings.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let args = Args::try_parse_from(["socialgrab", "--port", "8081", "--host", "127.0.0.1"])
            .unwrap();
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut settings = Settings::default();
        args.apply(&mut settings);
        assert_eq!(settings.port, 8081);
        assert_eq!(settings.host, "127.0.0.1");
    }

    #[test]
    fn defaults_leave_settings_alone() {
        let args = Args::try_parse_from(["socialgrab", "--config", "/tmp/sg-env"]).unwrap();
        let mut settings = Settings::default();
        args.apply(&mut settings);
        assert_eq!(settings.port, socialgrab::config::DEFAULT_PORT);
        assert_eq!(args.config, PathBuf::from("/tmp/sg-env"));
    }
}
