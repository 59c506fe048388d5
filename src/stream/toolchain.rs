//! # External tools
//!
//! Everything that leaves the process goes through the [`Toolchain`] trait:
//! version detection, probing media files and running ffmpeg. Tests swap in
//! a recording fake so no encoder is needed to exercise the backends.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Deserialize;
use tracing::debug;

use crate::{
    config::ToolsConfig,
    error::{EnvironmentError, RenderError, Result},
};

/// Arguments prepended to every ffmpeg invocation
const FFMPEG_PREAMBLE: [&str; 4] = ["-hide_banner", "-loglevel", "error", "-y"];

/// Parsed `ffmpeg -version` string, e.g. `4.4.2-0ubuntu0.22.04.1` or `N-91586-g90dc584d21`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegVersion {
    raw: String,
}

impl FfmpegVersion {
    /// Parse the first line of `ffmpeg -version`
    pub fn parse(line: &str) -> Result<Self> {
        let unparsable = || EnvironmentError::UnparsableVersion {
            tool: "ffmpeg".to_string(),
            line: line.to_string(),
        };

        let rest = line.trim().strip_prefix("ffmpeg version ").ok_or_else(unparsable)?;
        let raw = rest.split(" Copyright").next().unwrap_or_default().trim();
        if raw.is_empty() {
            return Err(unparsable().into());
        }
        Ok(Self { raw: raw.to_string() })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Nightly builds report `N-<revision>`
    pub fn is_nightly(&self) -> bool {
        self.raw.starts_with('N')
    }

    /// Leading major version number of a release build
    pub fn major(&self) -> Option<u32> {
        let digits: String = self.raw.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    }

    /// Whether drawbox understands `t=fill`
    pub fn supports_fill_box(&self) -> bool {
        self.is_nightly() || self.major().map_or(false, |major| major >= 4)
    }
}

/// What a probe found out about a media file
#[derive(Debug, Clone, PartialEq)]
pub struct MediaProbe {
    pub duration: f64,
    pub has_video: bool,
    pub has_audio: bool,
    pub width: u32,
    pub height: u32,
}

/// Access to ffmpeg/ffprobe
pub trait Toolchain: Send + Sync {
    /// Version of the ffmpeg binary
    fn version(&self) -> &FfmpegVersion;

    /// Inspect the streams and duration of a media file
    fn probe(&self, path: &Path) -> Result<MediaProbe>;

    /// Run ffmpeg with `args`; the last argument is the output file
    fn run_ffmpeg(&self, args: &[String]) -> Result<()>;
}

/// The real toolchain found on the system
#[derive(Debug, Clone)]
pub struct FfmpegToolchain {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    version: FfmpegVersion,
}

impl FfmpegToolchain {
    /// Locate both tools and read the ffmpeg version
    pub fn detect(tools: &ToolsConfig) -> Result<Self> {
        let output = Command::new(&tools.ffmpeg)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| EnvironmentError::ToolMissing {
                tool: tools.ffmpeg.display().to_string(),
                reason: e.to_string(),
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let first_line = stdout.lines().next().unwrap_or_default();
        let version = FfmpegVersion::parse(first_line)?;

        let probe_ok = Command::new(&tools.ffprobe)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| EnvironmentError::ToolMissing {
                tool: tools.ffprobe.display().to_string(),
                reason: e.to_string(),
            })?;
        if !probe_ok.success() {
            return Err(EnvironmentError::ToolMissing {
                tool: tools.ffprobe.display().to_string(),
                reason: format!("'-version' exited with {}", probe_ok),
            }
            .into());
        }

        debug!("Found {:?} and {:?}", tools.ffmpeg, tools.ffprobe);
        Ok(Self {
            ffmpeg: tools.ffmpeg.clone(),
            ffprobe: tools.ffprobe.clone(),
            version,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Turn ffprobe's JSON report into a [`MediaProbe`]
fn parse_probe(path: &Path, json: &str) -> Result<MediaProbe> {
    let failed = |reason: String| RenderError::ProbeFailed {
        path: path.display().to_string(),
        reason,
    };

    let output: ProbeOutput = serde_json::from_str(json).map_err(|e| failed(e.to_string()))?;

    let video = output
        .streams
        .iter()
        .find(|stream| stream.codec_type.as_deref() == Some("video"));
    let has_audio = output
        .streams
        .iter()
        .any(|stream| stream.codec_type.as_deref() == Some("audio"));

    let duration = output
        .format
        .as_ref()
        .and_then(|format| format.duration.as_deref())
        .or_else(|| output.streams.iter().find_map(|stream| stream.duration.as_deref()))
        .and_then(|value| value.parse::<f64>().ok())
        .ok_or_else(|| failed("no duration reported".to_string()))?;

    Ok(MediaProbe {
        duration,
        has_video: video.is_some(),
        has_audio,
        width: video.and_then(|stream| stream.width).unwrap_or(0),
        height: video.and_then(|stream| stream.height).unwrap_or(0),
    })
}

impl Toolchain for FfmpegToolchain {
    fn version(&self) -> &FfmpegVersion {
        &self.version
    }

    fn probe(&self, path: &Path) -> Result<MediaProbe> {
        debug!("Probing {:?}", path);
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| RenderError::SpawnFailed {
                tool: self.ffprobe.display().to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(RenderError::ProbeFailed {
                path: path.display().to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        parse_probe(path, &String::from_utf8_lossy(&output.stdout))
    }

    fn run_ffmpeg(&self, args: &[String]) -> Result<()> {
        debug!("ffmpeg {}", args.join(" "));
        let output = Command::new(&self.ffmpeg)
            .args(FFMPEG_PREAMBLE)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| RenderError::SpawnFailed {
                tool: self.ffmpeg.display().to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(RenderError::CommandFailed {
                tool: "ffmpeg".to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Pixel size of a still image
pub fn image_size(path: &Path) -> Result<(u32, u32)> {
    image::image_dimensions(path).map_err(|e| {
        RenderError::ImageFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}
