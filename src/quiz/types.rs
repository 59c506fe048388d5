use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{error::SpecError, timing::Interval};

/// Folder (below the output directory) holding materialized sources
pub const SOURCES_FOLDER: &str = "sources";

/// One quiz round as described by its JSON file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuizSpec {
    pub round: u32,
    pub theme: String,

    /// Answer keys asked for in every question, in display order
    pub questioned: Vec<String>,

    pub questions: Vec<Question>,

    /// Text of the spacer card in front of every unit (no spacer when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spacers: Option<String>,

    /// Reuse rendered unit files that are already on disk
    #[serde(default)]
    pub use_cached_video_files: bool,

    /// Image behind the round title cards, relative to the quiz file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image: Option<PathBuf>,

    /// Number the first question 0 and show its answer right after it
    #[serde(default)]
    pub first_question_is_example: bool,
}

/// Question or answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    Question,
    Answer,
}

impl UnitKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitKind::Question => "question",
            UnitKind::Answer => "answer",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single question with its media and answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub sources: Vec<Source>,
    pub question_video: Vec<Segment>,
    pub question_audio: Vec<Segment>,
    pub answer_video: Vec<Segment>,
    pub answer_audio: Vec<Segment>,

    /// One map per answer video segment, from questioned key to answer text
    pub answers: Vec<BTreeMap<String, String>>,

    /// Unit-level repetitions, 1 or even
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<Event>,

    /// Values for `var:<name>` references, substituted at load time
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, serde_json::Value>,
}

impl Question {
    pub fn video_segments(&self, kind: UnitKind) -> &[Segment] {
        match kind {
            UnitKind::Question => &self.question_video,
            UnitKind::Answer => &self.answer_video,
        }
    }

    pub fn audio_segments(&self, kind: UnitKind) -> &[Segment] {
        match kind {
            UnitKind::Question => &self.question_audio,
            UnitKind::Answer => &self.answer_audio,
        }
    }

    /// Answer texts per answer segment, ordered like `questioned`
    pub fn answer_texts(&self, questioned: &[String]) -> Vec<Vec<String>> {
        self.answers
            .iter()
            .map(|answer| {
                questioned
                    .iter()
                    .filter_map(|key| answer.get(key).cloned())
                    .collect()
            })
            .collect()
    }
}

fn default_repetitions() -> u32 {
    1
}

/// A piece of a source used in a unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Index into the question's `sources`
    pub source: usize,

    /// Part of the source to use, in source time
    pub interval: Interval,

    #[serde(default)]
    pub reverse: bool,

    #[serde(default = "default_repetitions")]
    pub repetitions: u32,

    /// Overlap with the previous segment in seconds
    #[serde(default)]
    pub crossfade_duration: f64,

    /// Indices of events whose interval is replaced by a tone
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub beeps_events: Vec<usize>,

    /// Indices of events whose text is shown while the segment plays
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub answer_label_events: Vec<usize>,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.interval.duration()
    }
}

/// A named moment inside a question's sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// When the event happens, in source time
    pub interval: Interval,

    /// Label shown by `answer_label_events`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Tone used by `beeps_events` (1500 Hz when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
}

/// Where a source comes from
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    /// A downloaded video; must already be present in the sources folder
    Youtube { format: String },
    /// A file next to the quiz file, in its `sources` folder
    Local { format: String },
    /// Lines of text rendered on a black card
    Text { lines: Vec<String>, duration: f64 },
    /// A still image (the identifier is its path relative to the quiz file)
    Image { duration: f64, format: String },
}

impl SourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Youtube { .. } => "youtube",
            SourceKind::Local { .. } => "local",
            SourceKind::Text { .. } => "text",
            SourceKind::Image { .. } => "image",
        }
    }
}

/// A validated source entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSource", into = "RawSource")]
pub struct Source {
    pub identifier: String,
    pub kind: SourceKind,
}

impl Source {
    fn format(&self) -> &str {
        match &self.kind {
            SourceKind::Youtube { format }
            | SourceKind::Local { format }
            | SourceKind::Image { format, .. } => format,
            SourceKind::Text { .. } => "mp4",
        }
    }

    fn duration(&self) -> Option<f64> {
        match &self.kind {
            SourceKind::Text { duration, .. } | SourceKind::Image { duration, .. } => {
                Some(*duration)
            }
            _ => None,
        }
    }

    /// Path of the materialized source, relative to the output directory
    ///
    /// `sources/{identifier}[_{duration}].{format}`, with path separators in
    /// the identifier replaced by `_`.
    pub fn file_name(&self) -> PathBuf {
        let mut stem: String = self
            .identifier
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        if let Some(duration) = self.duration() {
            stem.push_str(&format!("_{}", crate::stream::filters::secs(duration)));
        }
        Path::new(SOURCES_FOLDER).join(format!("{}.{}", stem, self.format()))
    }
}

/// Source entry as written in the JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSource {
    pub source: String,
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl TryFrom<RawSource> for Source {
    type Error = SpecError;

    fn try_from(raw: RawSource) -> Result<Self, Self::Error> {
        let missing = |keys: &[&str]| SpecError::MissingSourceKeys {
            source_id: raw.identifier.clone(),
            kind: raw.source.clone(),
            missing: keys.join(", "),
        };
        let positive = |duration: Option<f64>| duration.filter(|d| d.is_finite() && *d > 0.0);

        let kind = match raw.source.as_str() {
            "youtube" => SourceKind::Youtube {
                format: raw.format.clone().ok_or_else(|| missing(&["format"]))?,
            },
            "local" => SourceKind::Local {
                format: raw.format.clone().ok_or_else(|| missing(&["format"]))?,
            },
            "text" => {
                let lines = raw.text.clone().filter(|lines| !lines.is_empty());
                match (lines, positive(raw.duration)) {
                    (Some(lines), Some(duration)) => SourceKind::Text { lines, duration },
                    (None, Some(_)) => return Err(missing(&["text"])),
                    (Some(_), None) => return Err(missing(&["duration"])),
                    (None, None) => return Err(missing(&["text", "duration"])),
                }
            }
            "image" => SourceKind::Image {
                duration: positive(raw.duration).ok_or_else(|| missing(&["duration"]))?,
                format: raw.format.clone().unwrap_or_else(|| "mp4".to_string()),
            },
            other => return Err(SpecError::UnsupportedSource { kind: other.to_string() }),
        };

        Ok(Source {
            identifier: raw.identifier,
            kind,
        })
    }
}

impl From<Source> for RawSource {
    fn from(source: Source) -> Self {
        let name = source.kind.name().to_string();
        let (format, text, duration) = match source.kind {
            SourceKind::Youtube { format } | SourceKind::Local { format } => {
                (Some(format), None, None)
            }
            SourceKind::Text { lines, duration } => (None, Some(lines), Some(duration)),
            SourceKind::Image { duration, format } => (Some(format), None, Some(duration)),
        };
        RawSource {
            source: name,
            identifier: source.identifier,
            format,
            text,
            duration,
        }
    }
}
