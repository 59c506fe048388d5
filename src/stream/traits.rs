use std::any::Any;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    error::{Result, StreamError},
    timing::Interval,
};

/// Frequency used by `replace_audio_by_beep` when the event does not name one
pub const DEFAULT_BEEP_FREQUENCY_HZ: f64 = 1500.0;

/// A stream under construction, owned by value
///
/// Every operation consumes the stream and hands back its successor, so a
/// stream that has been combined into another one can no longer be touched.
pub type Stream = Box<dyn MediaStream>;

/// Core trait every editable audio/video stream implements
///
/// Operations validate the channel contract first: video operations on a
/// stream without video (and audio operations on a stream without audio)
/// fail with a [`StreamError`] instead of being ignored.
pub trait MediaStream: Send {
    /// Name of the backend that produced this stream
    fn backend_name(&self) -> &str;

    /// Channels, frame size and tracked duration
    fn info(&self) -> &StreamInfo;

    /// Restrict the stream to `interval` and move its origin back to 0
    fn trim(self: Box<Self>, interval: Interval) -> Result<Stream>;

    /// Concatenate the stream with itself, doubling its length
    fn repeat(self: Box<Self>) -> Result<Stream>;

    /// Concatenate `other` after this stream (or before it with `other_first`)
    ///
    /// With a non-zero crossfade the second stream starts `crossfade` seconds
    /// early and blends into the first one.
    fn combine(self: Box<Self>, other: Stream, options: CombineOptions) -> Result<Stream>;

    /// Fade from black/silence at the start and to black/silence at the end
    fn fade_in_and_out(self: Box<Self>, fade: Fade) -> Result<Stream>;

    /// Fit the video inside the canvas, padding the rest with black
    fn scale_video(self: Box<Self>) -> Result<Stream>;

    /// Draw a semi-transparent bar at the top or bottom with text in it
    fn draw_text_in_box(self: Box<Self>, text: &str, text_box: TextBox) -> Result<Stream>;

    /// Draw horizontally centered text at a fraction of the frame height
    fn draw_text(self: Box<Self>, text: &str, placement: TextPlacement) -> Result<Stream>;

    /// Show vertically centered text during `interval`, fading in and out
    fn overlay_fading_text(self: Box<Self>, text: &str, interval: Interval) -> Result<Stream> {
        self.draw_text(text, TextPlacement::centered().during(interval))
    }

    /// Replace this stream's audio with the audio of `other`
    fn add_audio(self: Box<Self>, other: Stream) -> Result<Stream>;

    /// Prepend a black card with scrolling text
    fn add_spacer(self: Box<Self>, text: &str, duration: f64) -> Result<Stream>;

    /// Prepend silence to an audio-only stream
    fn add_silence(self: Box<Self>, duration: f64) -> Result<Stream>;

    /// Play the stream backwards
    fn reverse(self: Box<Self>) -> Result<Stream>;

    /// Replace the audio inside `interval` by a sine tone
    fn replace_audio_by_beep(
        self: Box<Self>,
        interval: Interval,
        frequency_hz: f64,
    ) -> Result<Stream>;

    /// Normalize the loudness of the audio channel
    fn normalize_audio(self: Box<Self>) -> Result<Stream>;

    /// Materialize the stream into `file_name`
    ///
    /// Returns the path actually written, which differs from `file_name` for
    /// audio-only extensions. With `dry_run` everything is prepared and
    /// validated but nothing is encoded. Held resources are released on every
    /// path out of this call.
    fn run(self: Box<Self>, file_name: &Path, dry_run: bool) -> Result<PathBuf>;

    /// Upcast used by `combine`/`add_audio` to recover the concrete type
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

/// Factory side of a backend: creates the streams the operations work on
pub trait Backend: Send + Sync {
    /// Returns the unique name of this backend
    fn name(&self) -> &str;

    /// Returns a human-readable description of this backend
    fn description(&self) -> &str;

    /// Open a media file with the requested channels
    ///
    /// A requested channel the file lacks is synthesized: black video for
    /// audio-only files, silence for files without sound.
    fn open(&self, path: &Path, channels: Channels, canvas: Canvas) -> Result<Stream>;

    /// Black video of the given duration
    fn create_empty_stream(&self, duration: f64, canvas: Canvas) -> Result<Stream>;

    /// A still image scaled and padded to the canvas, shown for `duration`
    fn create_single_image_stream(
        &self,
        image: &Path,
        duration: f64,
        canvas: Canvas,
    ) -> Result<Stream>;

    /// Audio-only silence of the given duration
    fn create_silent_stream(&self, duration: f64, canvas: Canvas) -> Result<Stream>;
}

/// Target frame size of a render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

/// Which media kinds a stream is opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channels {
    Both,
    VideoOnly,
    AudioOnly,
}

impl Channels {
    pub fn has_video(self) -> bool {
        matches!(self, Channels::Both | Channels::VideoOnly)
    }

    pub fn has_audio(self) -> bool {
        matches!(self, Channels::Both | Channels::AudioOnly)
    }
}

/// Channels, dimensions and duration of a stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub has_video: bool,
    pub has_audio: bool,
    pub width: u32,
    pub height: u32,
    pub duration: f64,
}

impl StreamInfo {
    pub fn new(channels: Channels, width: u32, height: u32, duration: f64) -> Self {
        Self {
            has_video: channels.has_video(),
            has_audio: channels.has_audio(),
            width,
            height,
            duration,
        }
    }

    /// Short description of the channel set, used in error messages
    pub fn describe(&self) -> &'static str {
        match (self.has_video, self.has_audio) {
            (true, true) => "video+audio",
            (true, false) => "video-only",
            (false, true) => "audio-only",
            (false, false) => "empty",
        }
    }

    pub fn require_video(&self, operation: &str) -> Result<()> {
        if !self.has_video {
            return Err(StreamError::MissingVideo { operation: operation.to_string() }.into());
        }
        Ok(())
    }

    pub fn require_audio(&self, operation: &str) -> Result<()> {
        if !self.has_audio {
            return Err(StreamError::MissingAudio { operation: operation.to_string() }.into());
        }
        Ok(())
    }

    /// Info after restricting to `interval`
    pub fn trimmed(&self, interval: &Interval) -> Result<Self> {
        if interval.start() >= self.duration {
            return Err(StreamError::TrimOutOfRange {
                start: interval.start(),
                duration: self.duration,
            }.into());
        }
        Ok(Self {
            duration: interval.end().min(self.duration) - interval.start(),
            ..self.clone()
        })
    }

    /// Info after concatenating the stream with itself
    pub fn repeated(&self) -> Self {
        Self {
            duration: self.duration * 2.0,
            ..self.clone()
        }
    }

    /// Info after concatenating `other`, validating the channel agreement
    pub fn combined(&self, other: &StreamInfo, options: &CombineOptions) -> Result<Self> {
        if self.has_video != other.has_video || self.has_audio != other.has_audio {
            return Err(StreamError::ChannelMismatch {
                left: self.describe().to_string(),
                right: other.describe().to_string(),
            }.into());
        }
        let crossfade = options.crossfade;
        let too_long = crossfade >= self.duration || crossfade >= other.duration;
        if crossfade < 0.0 || (crossfade > 0.0 && too_long) {
            return Err(StreamError::InvalidCrossfade {
                duration: crossfade,
                first: self.duration,
                second: other.duration,
            }.into());
        }
        Ok(Self {
            duration: self.duration + other.duration - crossfade,
            ..self.clone()
        })
    }

    /// Info after prepending `duration` seconds
    pub fn extended(&self, duration: f64) -> Self {
        Self {
            duration: self.duration + duration,
            ..self.clone()
        }
    }
}

/// How two streams are concatenated
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CombineOptions {
    /// Put the other stream in front instead of behind
    pub other_first: bool,

    /// Overlap between the two streams in seconds (0 for a hard cut)
    pub crossfade: f64,
}

impl CombineOptions {
    pub fn crossfade(duration: f64) -> Self {
        Self {
            other_first: false,
            crossfade: duration,
        }
    }
}

/// Fade to/from black and silence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fade {
    /// Length of each fade in seconds
    pub duration: f64,

    /// Length of the faded stream; the fade-out starts at `total_length - duration`
    pub total_length: f64,

    pub fade_in: bool,
    pub fade_out: bool,
}

impl Fade {
    /// Fade in at the start and out at the end
    pub fn symmetric(duration: f64, total_length: f64) -> Self {
        Self {
            duration,
            total_length,
            fade_in: true,
            fade_out: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.duration < 0.0 || self.duration * 2.0 > self.total_length {
            return Err(StreamError::InvalidFade {
                duration: self.duration,
                total: self.total_length,
            }.into());
        }
        Ok(())
    }

    /// Start of the fade-out
    pub fn fade_out_start(&self) -> f64 {
        self.total_length - self.duration
    }

    /// Whether the fade changes anything at all
    pub fn is_noop(&self) -> bool {
        self.duration == 0.0 || (!self.fade_in && !self.fade_out)
    }
}

/// Horizontal behaviour of text inside a bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMotion {
    /// Scrolls right to left, reaching the left margin at the end of the box length
    Scroll,
    /// Left-aligned at the margin
    Static,
}

/// Edge of the frame a text bar is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxEdge {
    Top,
    Bottom,
}

/// Options for `draw_text_in_box`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextBox {
    /// Time the scrolling text takes to cross the frame (seconds)
    pub length: f64,
    pub motion: TextMotion,
    pub edge: BoxEdge,
    /// Keep the text hidden for this long before it starts
    pub delay: Option<f64>,
}

impl TextBox {
    /// Scrolling label in a bar at the bottom
    pub fn scrolling(length: f64) -> Self {
        Self {
            length,
            motion: TextMotion::Scroll,
            edge: BoxEdge::Bottom,
            delay: None,
        }
    }

    /// Static banner at the top
    pub fn banner(length: f64) -> Self {
        Self {
            length,
            motion: TextMotion::Static,
            edge: BoxEdge::Top,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: f64) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Options for `draw_text`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextPlacement {
    /// Vertical position as a fraction of the frame height
    pub height_fraction: f64,

    /// Only show the text during this interval, with 1s fades around it
    pub interval: Option<Interval>,
}

impl TextPlacement {
    pub fn at(height_fraction: f64) -> Self {
        Self {
            height_fraction,
            interval: None,
        }
    }

    pub fn centered() -> Self {
        Self::at(0.5)
    }

    pub fn during(mut self, interval: Interval) -> Self {
        self.interval = Some(interval);
        self
    }
}

/// Encoding and normalization settings shared by both backends
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub fps: u32,
    pub codec: String,
    pub preset: String,
    pub crf: u8,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub sample_rate: u32,
    pub font_file: Option<PathBuf>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for RenderSettings {
    fn from(config: &Config) -> Self {
        Self {
            fps: config.video.fps,
            codec: config.video.codec.clone(),
            preset: config.video.preset.clone(),
            crf: config.video.crf,
            audio_codec: config.video.audio_codec.clone(),
            audio_bitrate: config.video.audio_bitrate.clone(),
            sample_rate: config.video.sample_rate,
            font_file: config.video.font_file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(duration: f64) -> StreamInfo {
        StreamInfo::new(Channels::Both, 1280, 720, duration)
    }

    #[test]
    fn test_combine_adds_durations() {
        let combined = info(10.0).combined(&info(5.0), &CombineOptions::default()).unwrap();
        assert_eq!(combined.duration, 15.0);
    }

    #[test]
    fn test_crossfade_overlaps() {
        let combined = info(10.0).combined(&info(5.0), &CombineOptions::crossfade(2.0)).unwrap();
        assert_eq!(combined.duration, 13.0);
    }

    #[test]
    fn test_crossfade_longer_than_clip_rejected() {
        assert!(info(10.0).combined(&info(2.0), &CombineOptions::crossfade(2.0)).is_err());
    }

    #[test]
    fn test_channel_mismatch_rejected() {
        let audio = StreamInfo::new(Channels::AudioOnly, 0, 0, 5.0);
        let err = info(5.0).combined(&audio, &CombineOptions::default()).unwrap_err();
        assert!(err.to_string().contains("video+audio"));
        assert!(err.to_string().contains("audio-only"));
    }

    #[test]
    fn test_repeat_doubles() {
        let mut current = info(3.0);
        for _ in 0..3 {
            current = current.repeated();
        }
        assert_eq!(current.duration, 24.0);
    }

    #[test]
    fn test_trim_clamps_to_available_duration() {
        let trimmed = info(12.0).trimmed(&Interval::new(5.0, 15.0).unwrap()).unwrap();
        assert_eq!(trimmed.duration, 7.0);
        assert!(info(12.0).trimmed(&Interval::new(12.0, 15.0).unwrap()).is_err());
    }

    #[test]
    fn test_fade_guard() {
        assert!(Fade::symmetric(3.0, 6.0).validate().is_ok());
        assert!(Fade::symmetric(3.5, 6.0).validate().is_err());
        assert_eq!(Fade::symmetric(3.0, 10.0).fade_out_start(), 7.0);
    }

    #[test]
    fn test_channel_requirements() {
        let audio = StreamInfo::new(Channels::AudioOnly, 0, 0, 5.0);
        assert!(audio.require_audio("add_silence").is_ok());
        assert!(audio.require_video("scale_video").is_err());
    }
}
