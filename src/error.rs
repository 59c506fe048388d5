use thiserror::Error;

/// Main error type for the popquiz library
#[derive(Error, Debug)]
pub enum QuizError {
    #[error("Stream contract violation: {0}")]
    Stream(#[from] StreamError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Quiz file error: {0}")]
    Spec(#[from] SpecError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Violations of the stream capability contract
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Invalid interval: [{start}, {end})")]
    InvalidInterval { start: f64, end: f64 },

    #[error("Malformed timestamp '{value}', expected M:SS[.frac]")]
    MalformedTimestamp { value: String },

    #[error("Operation '{operation}' requires a video channel")]
    MissingVideo { operation: String },

    #[error("Operation '{operation}' requires an audio channel")]
    MissingAudio { operation: String },

    #[error("Cannot combine a {left} stream with a {right} stream")]
    ChannelMismatch { left: String, right: String },

    #[error("Cannot mix streams of different backends (expected {expected})")]
    BackendMismatch { expected: String },

    #[error("Fade of {duration}s in and out does not fit in {total}s")]
    InvalidFade { duration: f64, total: f64 },

    #[error("Crossfade of {duration}s is longer than one of the clips ({first}s, {second}s)")]
    InvalidCrossfade { duration: f64, first: f64, second: f64 },

    #[error("Trim start {start}s lies beyond the end of a {duration}s stream")]
    TrimOutOfRange { start: f64, duration: f64 },

    #[error("Invalid stream parameters: {details}")]
    InvalidParameters { details: String },
}

/// Failures while probing or rendering through the external toolchain
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to spawn {tool}: {reason}")]
    SpawnFailed { tool: String, reason: String },

    #[error("{tool} exited with {status}: {stderr}")]
    CommandFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("Failed to probe media file {path}: {reason}")]
    ProbeFailed { path: String, reason: String },

    #[error("Failed to read image {path}: {reason}")]
    ImageFailed { path: String, reason: String },

    #[error("Failed to publish rendered file to {path}: {reason}")]
    PublishFailed { path: String, reason: String },
}

/// Errors in the quiz description (the JSON round file)
#[derive(Error, Debug)]
pub enum SpecError {
    #[error("Failed to parse quiz file {path}: {reason}")]
    ParseFailed { path: String, reason: String },

    #[error("Source {source_id} of type '{kind}' is missing required keys: {missing}")]
    MissingSourceKeys {
        source_id: String,
        kind: String,
        missing: String,
    },

    #[error("Unsupported source type '{kind}'")]
    UnsupportedSource { kind: String },

    #[error("Question {question}: expected {expected} answers, got {actual}")]
    AnswerCountMismatch {
        question: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Question {question}: mismatching {kind} audio ({audio}s) and video ({video}s) runtime")]
    DurationMismatch {
        question: usize,
        kind: String,
        audio: f64,
        video: f64,
    },

    #[error("Question {question}: answer keys {answers:?} do not match questioned keys {questioned:?}")]
    QuestionedMismatch {
        question: usize,
        answers: Vec<String>,
        questioned: Vec<String>,
    },

    #[error("Repetition not 1 or a multiple of 2, got: {value}")]
    InvalidRepetitions { value: u32 },

    #[error("Question {question}: source index {index} out of range ({count} sources)")]
    SourceIndex {
        question: usize,
        index: usize,
        count: usize,
    },

    #[error("Question {question}: event index {index} out of range ({count} events)")]
    EventIndex {
        question: usize,
        index: usize,
        count: usize,
    },

    #[error("Question {question}: event {index} lies outside its segment")]
    EventOutsideSegment { question: usize, index: usize },

    #[error("Question {question}: event {index} has no {payload}")]
    MissingEventPayload {
        question: usize,
        index: usize,
        payload: String,
    },

    #[error("{location}: '{field}' must not be empty")]
    EmptyField { location: String, field: String },

    #[error("Required media file '{path}' doesn't exist")]
    MissingMedia { path: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Unknown backend '{name}' (available: {available})")]
    UnknownBackend { name: String, available: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Problems with the external tools the renderer depends on
#[derive(Error, Debug)]
pub enum EnvironmentError {
    #[error("{tool} is probably not in the path: {reason}")]
    ToolMissing { tool: String, reason: String },

    #[error("Cannot parse {tool} version string: {line}")]
    UnparsableVersion { tool: String, line: String },
}

/// Convenience type alias for Results using QuizError
pub type Result<T> = std::result::Result<T, QuizError>;

impl QuizError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Whether the error comes from the quiz description or the configuration
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::Spec(_)
                | Self::Config(_)
                | Self::Stream(StreamError::InvalidInterval { .. })
                | Self::Stream(StreamError::MalformedTimestamp { .. })
        )
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Environment(EnvironmentError::ToolMissing { tool, .. }) => {
                format!("'{}' was not found. Please install FFmpeg and make sure '{}' is on the PATH.", tool, tool)
            }
            Self::Spec(SpecError::MissingMedia { path }) => {
                format!("Media file '{}' is missing. Place it there or fix the source entry.", path)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            Self::Config(ConfigError::UnknownBackend { name, available }) => {
                format!("Backend '{}' not found. Available backends: {}", name, available)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_errors_are_configuration_errors() {
        let err: QuizError = StreamError::InvalidInterval { start: 5.0, end: 2.0 }.into();
        assert!(err.is_configuration_error());
        assert_eq!(
            err.to_string(),
            "Stream contract violation: Invalid interval: [5, 2)"
        );
    }

    #[test]
    fn test_channel_errors_are_not_configuration_errors() {
        let err: QuizError = StreamError::MissingVideo {
            operation: "scale_video".to_string(),
        }
        .into();
        assert!(!err.is_configuration_error());
    }

    #[test]
    fn test_user_message_names_missing_tool() {
        let err: QuizError = EnvironmentError::ToolMissing {
            tool: "ffprobe".to_string(),
            reason: "not found".to_string(),
        }
        .into();
        assert!(err.user_message().contains("'ffprobe' was not found"));
    }
}
