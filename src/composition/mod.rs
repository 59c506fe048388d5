//! # Composition
//!
//! Turns a loaded quiz round into videos: units are assembled per question,
//! then concatenated behind their title cards into the question and the
//! answer video of the round.

pub mod combine;
pub mod engine;
pub mod unit;

// Re-exports for convenience
pub use combine::combine_videos;
pub use engine::{QuizEngine, RoundOutputs};
pub use unit::{Unit, UnitAssembler};
