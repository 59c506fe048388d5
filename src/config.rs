use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, Result},
    stream::{BackendRegistry, Canvas, DEFAULT_BEEP_FREQUENCY_HZ},
};

/// Main configuration for popquiz
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output video settings
    pub video: VideoConfig,

    /// Quiz layout and timing settings
    pub quiz: QuizConfig,

    /// External tools and backend selection
    pub tools: ToolsConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.video.validate()?;
        self.quiz.validate()?;
        self.tools.validate()?;
        Ok(())
    }

    /// Target frame of every rendered unit
    pub fn canvas(&self) -> Canvas {
        Canvas::new(self.video.width, self.video.height)
    }
}

/// Output video configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Output width in pixels
    pub width: u32,

    /// Output height in pixels
    pub height: u32,

    /// Output frame rate
    pub fps: u32,

    /// Video codec passed to ffmpeg
    pub codec: String,

    /// Encoder preset
    pub preset: String,

    /// Constant rate factor (0-51, lower is better)
    pub crf: u8,

    /// Audio codec passed to ffmpeg
    pub audio_codec: String,

    /// Audio bitrate, e.g. "192k"
    pub audio_bitrate: String,

    /// Audio sample rate every stream is resampled to
    pub sample_rate: u32,

    /// Font used for all text overlays (ffmpeg's default font when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_file: Option<PathBuf>,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            codec: "libx264".to_string(),
            preset: "medium".to_string(),
            crf: 20,
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
            sample_rate: 44100,
            font_file: None,
        }
    }
}

impl VideoConfig {
    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 || self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(ConfigError::InvalidValue {
                key: "video.resolution".to_string(),
                value: format!("{}x{}", self.width, self.height)
            }.into());
        }

        if self.fps == 0 {
            return Err(ConfigError::InvalidValue {
                key: "video.fps".to_string(),
                value: self.fps.to_string()
            }.into());
        }

        if self.crf > 51 {
            return Err(ConfigError::InvalidValue {
                key: "video.crf".to_string(),
                value: self.crf.to_string()
            }.into());
        }

        if self.sample_rate == 0 {
            return Err(ConfigError::InvalidValue {
                key: "video.sample_rate".to_string(),
                value: self.sample_rate.to_string()
            }.into());
        }

        Ok(())
    }
}

/// Quiz layout and timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizConfig {
    /// Duration of the round title cards (seconds)
    pub title_duration_s: f64,

    /// Fade in/out applied to every segment (seconds)
    pub fade_duration_s: f64,

    /// Duration of the spacer card in front of each unit (seconds)
    pub spacer_duration_s: f64,

    /// Default frequency of beep events (Hz)
    pub beep_frequency_hz: f64,

    /// Normalize the loudness of every unit's audio
    pub normalize_audio: bool,

    /// Apply question repetitions to answer units as well
    pub repeat_answers: bool,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            title_duration_s: 10.0,
            fade_duration_s: 1.0,
            spacer_duration_s: 3.0,
            beep_frequency_hz: DEFAULT_BEEP_FREQUENCY_HZ,
            normalize_audio: true,
            repeat_answers: false,
        }
    }
}

impl QuizConfig {
    fn validate(&self) -> Result<()> {
        if self.title_duration_s <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "quiz.title_duration_s".to_string(),
                value: self.title_duration_s.to_string()
            }.into());
        }

        if self.fade_duration_s < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "quiz.fade_duration_s".to_string(),
                value: self.fade_duration_s.to_string()
            }.into());
        }

        if self.spacer_duration_s <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "quiz.spacer_duration_s".to_string(),
                value: self.spacer_duration_s.to_string()
            }.into());
        }

        if self.beep_frequency_hz <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "quiz.beep_frequency_hz".to_string(),
                value: self.beep_frequency_hz.to_string()
            }.into());
        }

        Ok(())
    }
}

/// External tool locations and backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// ffmpeg executable
    pub ffmpeg: PathBuf,

    /// ffprobe executable
    pub ffprobe: PathBuf,

    /// Backend identifier ("graph" or "clip")
    pub backend: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            backend: "graph".to_string(),
        }
    }
}

impl ToolsConfig {
    fn validate(&self) -> Result<()> {
        let registry = BackendRegistry::new();
        if !registry.has_backend(&self.backend) {
            return Err(ConfigError::UnknownBackend {
                name: self.backend.clone(),
                available: registry.available_backends().join(", ")
            }.into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("popquiz.toml");

        let mut original_config = Config::default();
        original_config.video.width = 1920;
        original_config.tools.backend = "clip".to_string();

        original_config.save_to_file(&file_path).unwrap();
        let loaded_config = Config::from_file(&file_path).unwrap();

        assert_eq!(loaded_config.video.width, 1920);
        assert_eq!(loaded_config.tools.backend, "clip");
        assert_eq!(loaded_config.quiz.spacer_duration_s, original_config.quiz.spacer_duration_s);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("partial.toml");
        std::fs::write(&file_path, "[video]\nheight = 1080\n").unwrap();

        let config = Config::from_file(&file_path).unwrap();
        assert_eq!(config.video.height, 1080);
        assert_eq!(config.video.width, 1280);
        assert_eq!(config.tools.ffmpeg, PathBuf::from("ffmpeg"));
        assert_eq!(config.quiz.beep_frequency_hz, DEFAULT_BEEP_FREQUENCY_HZ);
    }

    #[test]
    fn test_odd_resolution_rejected() {
        let mut config = Config::default();
        config.video.width = 1279;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_crf_rejected() {
        let mut config = Config::default();
        config.video.crf = 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let mut config = Config::default();
        config.tools.backend = "moviepy".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.user_message().contains("Available backends: clip, graph"));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = Config::from_file("/nonexistent/popquiz.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/popquiz.toml"));
    }
}
