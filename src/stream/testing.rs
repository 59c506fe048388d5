//! Test doubles for the external toolchain.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::{
    error::{RenderError, Result},
    stream::{
        registry::BackendContext,
        toolchain::{FfmpegVersion, MediaProbe, Toolchain},
        traits::RenderSettings,
    },
};

/// Records every ffmpeg invocation and fabricates its output file
pub struct FakeToolchain {
    version: FfmpegVersion,
    default_probe: MediaProbe,
    probes: HashMap<PathBuf, MediaProbe>,
    invocations: Mutex<Vec<Vec<String>>>,
    fail_runs: bool,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self {
            version: FfmpegVersion::parse("ffmpeg version 6.1.1 Copyright (c) 2000-2023").unwrap(),
            default_probe: MediaProbe {
                duration: 60.0,
                has_video: true,
                has_audio: true,
                width: 1920,
                height: 1080,
            },
            probes: HashMap::new(),
            invocations: Mutex::new(Vec::new()),
            fail_runs: false,
        }
    }

    /// Answer probes of `path` with `probe` instead of the 60s 1080p default
    pub fn with_probe(mut self, path: impl Into<PathBuf>, probe: MediaProbe) -> Self {
        self.probes.insert(path.into(), probe);
        self
    }

    pub fn with_version(mut self, line: &str) -> Self {
        self.version = FfmpegVersion::parse(line).unwrap();
        self
    }

    /// Make every ffmpeg run fail
    pub fn failing(mut self) -> Self {
        self.fail_runs = true;
        self
    }

    pub fn invocations(&self) -> Vec<Vec<String>> {
        self.invocations.lock().unwrap().clone()
    }

    /// The `-filter_complex` argument of the most recent run that had one
    pub fn last_filter_complex(&self) -> Option<String> {
        self.invocations().iter().rev().find_map(|args| {
            args.iter()
                .position(|arg| arg == "-filter_complex")
                .and_then(|index| args.get(index + 1).cloned())
        })
    }
}

impl Toolchain for FakeToolchain {
    fn version(&self) -> &FfmpegVersion {
        &self.version
    }

    fn probe(&self, path: &Path) -> Result<MediaProbe> {
        Ok(self.probes.get(path).cloned().unwrap_or_else(|| self.default_probe.clone()))
    }

    fn run_ffmpeg(&self, args: &[String]) -> Result<()> {
        self.invocations.lock().unwrap().push(args.to_vec());
        if self.fail_runs {
            return Err(RenderError::CommandFailed {
                tool: "ffmpeg".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "simulated failure".to_string(),
            }
            .into());
        }
        if let Some(output) = args.last() {
            std::fs::write(output, b"fake render")?;
        }
        Ok(())
    }
}

/// Probe result for a video with sound
pub fn video_probe(duration: f64, width: u32, height: u32) -> MediaProbe {
    MediaProbe {
        duration,
        has_video: true,
        has_audio: true,
        width,
        height,
    }
}

/// Probe result for a plain audio file
pub fn audio_probe(duration: f64) -> MediaProbe {
    MediaProbe {
        duration,
        has_video: false,
        has_audio: true,
        width: 0,
        height: 0,
    }
}

/// Backend context around a shared fake
pub fn context(toolchain: &Arc<FakeToolchain>) -> BackendContext {
    BackendContext {
        toolchain: toolchain.clone(),
        settings: RenderSettings::default(),
    }
}
