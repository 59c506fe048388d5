//! Quiz rounds: the JSON model, its loader and source materialization.

pub mod loader;
pub mod sources;
pub mod types;

pub use loader::{load_quiz, parse_quiz};
pub use sources::SourceMaterializer;
pub use types::{Event, Question, QuizSpec, Segment, Source, SourceKind, UnitKind};
