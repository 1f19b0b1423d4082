//! Bounded retry around the extraction engine.
//!
//! An engine call either succeeds, fails with a bot check (retried with a
//! freshly rotated user agent until the policy runs out of attempts), or fails
//! with anything else (surfaced immediately).

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand_core::{OsRng, RngCore};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::engine::{DownloadedMedia, EngineError, ExtractionEngine, RawInfo};
use crate::options::{ExtractionOptions, OptionBuilder};
use crate::platform::Platform;

/// How many times to call the engine and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Never below 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Applied to the backoff after each failed attempt; 1.0 keeps it fixed.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Fixed delay between attempts.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: delay,
            max_backoff: delay,
            backoff_multiplier: 1.0,
        }
    }

    /// Two attempts, two seconds apart.
    pub fn standard() -> Self {
        Self::fixed(2, Duration::from_secs(2))
    }

    /// No waiting at all; meant for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::fixed(max_attempts, Duration::ZERO)
    }

    /// Delay after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = scaled.min(self.max_backoff.as_secs_f64()).max(0.0);
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Last engine error plus how many attempts were spent on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptError {
    pub attempts: u32,
    pub error: EngineError,
}

/// Calls `operation` with the 1-based attempt number until it succeeds, fails
/// with a non-retryable error, or the policy is exhausted. `sleep` is called
/// between attempts only.
pub fn retry_with_policy<T, F, S>(
    policy: &RetryPolicy,
    mut sleep: S,
    mut operation: F,
) -> Result<T, AttemptError>
where
    F: FnMut(u32) -> Result<T, EngineError>,
    S: FnMut(Duration),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation(attempt) {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt < max_attempts => {
                let delay = policy.backoff(attempt);
                warn!(attempt, max_attempts, ?delay, "engine reported a bot check, retrying: {error}");
                sleep(delay);
                attempt += 1;
            }
            Err(error) => return Err(AttemptError { attempts: attempt, error }),
        }
    }
}

/// Terminal failure of an orchestrated call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Every attempt hit a bot check.
    #[error("{platform} kept blocking automated access after {attempts} attempt(s): {last_error}")]
    Blocked {
        platform: Platform,
        attempts: u32,
        last_error: String,
    },
    /// The engine failed for a reason retrying will not fix.
    #[error("{0}")]
    Failed(String),
}

impl FetchError {
    /// Message meant for the person pasting the URL.
    pub fn user_message(&self) -> String {
        match self {
            FetchError::Blocked { platform, .. } => format!(
                "{} is temporarily blocking automated access. Please try again in a few minutes, \
                 or the video may require authentication.",
                platform.display_name()
            ),
            FetchError::Failed(message) => message.clone(),
        }
    }
}

/// What the engine is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Info,
    Download,
}

impl Mode {
    fn as_str(self) -> &'static str {
        match self {
            Mode::Info => "info",
            Mode::Download => "download",
        }
    }
}

pub type SharedRng = Arc<Mutex<Box<dyn RngCore + Send>>>;
pub type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

/// Builds options, calls the engine and applies the retry policy.
#[derive(Clone)]
pub struct Orchestrator {
    engine: Arc<dyn ExtractionEngine>,
    options: OptionBuilder,
    policy: RetryPolicy,
    rng: SharedRng,
    sleeper: Sleeper,
}

impl Orchestrator {
    /// Uses the OS randomness source and a real thread sleep.
    pub fn new(engine: Arc<dyn ExtractionEngine>, options: OptionBuilder, policy: RetryPolicy) -> Self {
        let rng: Box<dyn RngCore + Send> = Box::new(OsRng);
        Self {
            engine,
            options,
            policy,
            rng: Arc::new(Mutex::new(rng)),
            sleeper: Arc::new(std::thread::sleep),
        }
    }

    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        let rng: Box<dyn RngCore + Send> = Box::new(rng);
        self.rng = Arc::new(Mutex::new(rng));
        self
    }

    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Metadata only; nothing is written to disk.
    pub fn fetch_info(&self, url: &str, platform: Platform) -> Result<RawInfo, FetchError> {
        self.run(url, platform, Mode::Info, None, |options| {
            self.engine.extract_info(url, options)
        })
    }

    /// Downloads `format` into the scratch directory.
    pub fn download(
        &self,
        url: &str,
        platform: Platform,
        format: &str,
    ) -> Result<DownloadedMedia, FetchError> {
        self.run(url, platform, Mode::Download, Some(format), |options| {
            self.engine.download(url, options)
        })
    }

    fn run<T>(
        &self,
        url: &str,
        platform: Platform,
        mode: Mode,
        format: Option<&str>,
        call: impl Fn(&ExtractionOptions) -> Result<T, EngineError>,
    ) -> Result<T, FetchError> {
        let outcome = retry_with_policy(
            &self.policy,
            |delay| (self.sleeper)(delay),
            |attempt| {
                let options = {
                    let mut rng = self.rng.lock();
                    self.options.build(platform, &mut **rng, format)
                };
                info!(mode = mode.as_str(), %platform, attempt, url, "calling extraction engine");
                call(&options)
            },
        );

        outcome.map_err(|AttemptError { attempts, error }| {
            error!(mode = mode.as_str(), %platform, attempts, url, "extraction failed: {error}");
            match error {
                EngineError::Blocked(message) => FetchError::Blocked {
                    platform,
                    attempts,
                    last_error: message,
                },
                EngineError::Fatal(message) => FetchError::Failed(message),
            }
        })
    }
}
