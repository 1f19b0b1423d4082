//! Per-call option bundle handed to the extraction engine.
//!
//! Every attempt gets a freshly built [`ExtractionOptions`]: a user agent drawn
//! from a small pool, a browser-like header set and the platform homepage as
//! referer. YouTube additionally gets extractor hints that steer yt-dlp towards
//! the android player client, which trips bot detection less often than the
//! web client.

use std::collections::BTreeMap;
use std::path::PathBuf;

use rand_core::RngCore;

use crate::platform::Platform;

/// Desktop browser strings rotated between attempts.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_2) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

const BROWSER_HEADERS: &[(&str, &str)] = &[
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
    ),
    ("Accept-Language", "en-US,en;q=0.5"),
    ("Accept-Encoding", "gzip, deflate"),
    ("Sec-Fetch-Dest", "document"),
    ("Sec-Fetch-Mode", "navigate"),
    ("Sec-Fetch-Site", "none"),
    ("Sec-Fetch-User", "?1"),
];

/// yt-dlp output template; the engine fills in title and container.
pub const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionOptions {
    pub quiet: bool,
    pub user_agent: String,
    pub referer: Option<String>,
    pub http_headers: BTreeMap<String, String>,
    /// extractor name -> hint name -> values, e.g. `youtube -> skip -> [dash, hls]`.
    pub extractor_args: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    pub cookie_file: Option<PathBuf>,
    pub output_template: PathBuf,
    pub format: Option<String>,
}

impl ExtractionOptions {
    /// Renders the bundle as yt-dlp command-line flags (URL not included).
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--no-warnings".to_string(),
            "--no-progress".to_string(),
            "--user-agent".to_string(),
            self.user_agent.clone(),
        ];

        if self.quiet {
            args.push("--quiet".to_string());
        }

        if let Some(referer) = &self.referer {
            args.push("--referer".to_string());
            args.push(referer.clone());
        }

        for (name, value) in &self.http_headers {
            args.push("--add-header".to_string());
            args.push(format!("{name}:{value}"));
        }

        for (extractor, hints) in &self.extractor_args {
            let joined = hints
                .iter()
                .map(|(hint, values)| format!("{hint}={}", values.join(",")))
                .collect::<Vec<_>>()
                .join(";");
            args.push("--extractor-args".to_string());
            args.push(format!("{extractor}:{joined}"));
        }

        if let Some(cookies) = &self.cookie_file {
            args.push("--cookies".to_string());
            args.push(cookies.to_string_lossy().to_string());
        }

        args.push("--output".to_string());
        args.push(self.output_template.to_string_lossy().to_string());

        if let Some(format) = &self.format {
            args.push("--format".to_string());
            args.push(format.clone());
        }

        args
    }
}

/// Holds the settings that do not change between calls.
#[derive(Debug, Clone)]
pub struct OptionBuilder {
    cookie_file: PathBuf,
    scratch_dir: PathBuf,
}

impl OptionBuilder {
    pub fn new(cookie_file: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            cookie_file: cookie_file.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Builds the options for one engine call. The only side effect is the
    /// existence check on the cookie file.
    pub fn build<R>(&self, platform: Platform, rng: &mut R, format: Option<&str>) -> ExtractionOptions
    where
        R: RngCore + ?Sized,
    {
        let http_headers = BROWSER_HEADERS
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();

        let mut extractor_args = BTreeMap::new();
        if platform == Platform::Youtube {
            extractor_args.insert("youtube".to_string(), youtube_hints());
        }

        let cookie_file = self
            .cookie_file
            .exists()
            .then(|| self.cookie_file.clone());

        ExtractionOptions {
            quiet: true,
            user_agent: pick_user_agent(rng).to_string(),
            referer: platform.homepage().map(str::to_string),
            http_headers,
            extractor_args,
            cookie_file,
            output_template: self.scratch_dir.join(OUTPUT_TEMPLATE),
            format: format.map(str::to_string),
        }
    }
}

/// Prefer the android client, fall back to web, and skip the manifest
/// formats that trigger extra page fetches.
fn youtube_hints() -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([
        (
            "player_client".to_string(),
            vec!["android".to_string(), "web".to_string()],
        ),
        (
            "skip".to_string(),
            vec!["dash".to_string(), "hls".to_string()],
        ),
    ])
}

pub fn pick_user_agent<R>(rng: &mut R) -> &'static str
where
    R: RngCore + ?Sized,
{
    let index = rng.next_u32() as usize % USER_AGENTS.len();
    USER_AGENTS[index]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SequenceRng;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn user_agent_follows_the_rng() {
        let mut rng = SequenceRng::new([0, 1, 2, USER_AGENTS.len() as u32]);
        assert_eq!(pick_user_agent(&mut rng), USER_AGENTS[0]);
        assert_eq!(pick_user_agent(&mut rng), USER_AGENTS[1]);
        assert_eq!(pick_user_agent(&mut rng), USER_AGENTS[2]);
        assert_eq!(pick_user_agent(&mut rng), USER_AGENTS[0]);
    }

    #[test]
    fn youtube_gets_client_hints_and_referer() {
        let dir = tempdir().unwrap();
        let builder = OptionBuilder::new(dir.path().join("cookies.txt"), dir.path());
        let options = builder.build(Platform::Youtube, &mut SequenceRng::new([3]), None);

        assert_eq!(options.user_agent, USER_AGENTS[3]);
        assert_eq!(options.referer.as_deref(), Some("https://www.youtube.com/"));
        let hints = &options.extractor_args["youtube"];
        assert_eq!(hints["player_client"], vec!["android", "web"]);
        assert_eq!(hints["skip"], vec!["dash", "hls"]);
        assert!(options.http_headers.contains_key("Sec-Fetch-Mode"));
        assert!(options.quiet);
        assert_eq!(options.output_template, dir.path().join(OUTPUT_TEMPLATE));
    }

    #[test]
    fn other_platforms_skip_youtube_hints() {
        let dir = tempdir().unwrap();
        let builder = OptionBuilder::new(dir.path().join("cookies.txt"), dir.path());
        let options = builder.build(Platform::Instagram, &mut SequenceRng::new([0]), Some("18"));

        assert!(options.extractor_args.is_empty());
        assert_eq!(options.referer.as_deref(), Some("https://www.instagram.com/"));
        assert_eq!(options.format.as_deref(), Some("18"));
    }

    #[test]
    fn cookie_file_is_absent_unless_present_on_disk() {
        let dir = tempdir().unwrap();
        let cookies = dir.path().join("cookies.txt");
        let builder = OptionBuilder::new(&cookies, dir.path());

        let without = builder.build(Platform::Twitter, &mut SequenceRng::new([0]), None);
        assert!(without.cookie_file.is_none());
        assert!(!without.to_args().iter().any(|arg| arg == "--cookies"));

        fs::write(&cookies, "# Netscape HTTP Cookie File\n").unwrap();
        let with = builder.build(Platform::Twitter, &mut SequenceRng::new([0]), None);
        assert_eq!(with.cookie_file.as_deref(), Some(cookies.as_path()));
        assert!(with.to_args().iter().any(|arg| arg == "--cookies"));
    }

    #[test]
    fn renders_yt_dlp_flags() {
        let dir = tempdir().unwrap();
        let cookies = dir.path().join("cookies.txt");
        fs::write(&cookies, "").unwrap();
        let builder = OptionBuilder::new(&cookies, dir.path());
        let args = builder
            .build(Platform::Youtube, &mut SequenceRng::new([0]), Some("best"))
            .to_args();

        let after = |flag: &str| {
            let index = args.iter().position(|arg| arg == flag).unwrap();
            args[index + 1].clone()
        };
        assert_eq!(after("--user-agent"), USER_AGENTS[0]);
        assert_eq!(after("--referer"), "https://www.youtube.com/");
        assert_eq!(
            after("--extractor-args"),
            "youtube:player_client=android,web;skip=dash,hls"
        );
        assert_eq!(after("--cookies"), cookies.to_string_lossy());
        assert_eq!(after("--format"), "best");
        assert!(after("--output").ends_with(OUTPUT_TEMPLATE));
        assert!(args.iter().any(|arg| arg == "Accept-Language:en-US,en;q=0.5"));
        assert!(args.iter().any(|arg| arg == "--quiet"));
    }
}
