//! Stand-ins shared by the unit tests.

use std::collections::VecDeque;
use std::fs;

use parking_lot::Mutex;
use rand_core::{RngCore, impls};

use crate::engine::{DownloadedMedia, EngineError, ExtractionEngine, RawInfo};
use crate::options::ExtractionOptions;

/// Replays a fixed list of values, cycling when it runs out.
pub(crate) struct SequenceRng {
    values: Vec<u32>,
    next: usize,
}

impl SequenceRng {
    pub(crate) fn new(values: impl IntoIterator<Item = u32>) -> Self {
        let values: Vec<u32> = values.into_iter().collect();
        assert!(!values.is_empty(), "SequenceRng needs at least one value");
        Self { values, next: 0 }
    }
}

impl RngCore for SequenceRng {
    fn next_u32(&mut self) -> u32 {
        let value = self.values[self.next % self.values.len()];
        self.next += 1;
        value
    }

    fn next_u64(&mut self) -> u64 {
        impls::next_u64_via_u32(self)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        impls::fill_bytes_via_next(self, dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

/// What the scripted engine does on its next call.
pub(crate) enum Step {
    Info(RawInfo),
    Fail(&'static str),
    /// Download mode: writes `file_name` next to the output template.
    WriteFile {
        title: &'static str,
        file_name: &'static str,
    },
}

/// Engine that follows a script and records every options bundle it receives.
#[derive(Default)]
pub(crate) struct ScriptedEngine {
    steps: Mutex<VecDeque<Step>>,
    seen: Mutex<Vec<ExtractionOptions>>,
}

impl ScriptedEngine {
    pub(crate) fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.seen.lock().len()
    }

    pub(crate) fn seen_options(&self) -> Vec<ExtractionOptions> {
        self.seen.lock().clone()
    }

    fn next(&self, options: &ExtractionOptions) -> Option<Step> {
        self.seen.lock().push(options.clone());
        self.steps.lock().pop_front()
    }
}

impl ExtractionEngine for ScriptedEngine {
    fn extract_info(&self, _url: &str, options: &ExtractionOptions) -> Result<RawInfo, EngineError> {
        match self.next(options) {
            Some(Step::Info(info)) => Ok(info),
            Some(Step::Fail(message)) => Err(EngineError::from_message(message)),
            Some(Step::WriteFile { title, .. }) => Ok(RawInfo {
                title: Some(title.to_string()),
                ..RawInfo::default()
            }),
            None => Err(EngineError::Fatal("script exhausted".to_string())),
        }
    }

    fn download(
        &self,
        _url: &str,
        options: &ExtractionOptions,
    ) -> Result<DownloadedMedia, EngineError> {
        match self.next(options) {
            Some(Step::WriteFile { title, file_name }) => {
                let dir = options
                    .output_template
                    .parent()
                    .ok_or_else(|| EngineError::Fatal("template has no directory".into()))?;
                let path = dir.join(file_name);
                fs::write(&path, b"media").map_err(|err| EngineError::Fatal(err.to_string()))?;
                Ok(DownloadedMedia {
                    info: RawInfo {
                        title: Some(title.to_string()),
                        ..RawInfo::default()
                    },
                    path,
                })
            }
            Some(Step::Fail(message)) => Err(EngineError::from_message(message)),
            Some(Step::Info(_)) => Err(EngineError::Fatal("no file written".to_string())),
            None => Err(EngineError::Fatal("script exhausted".to_string())),
        }
    }
}
