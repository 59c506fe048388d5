//! # popquiz
//!
//! Build themed pop-quiz videos from clips, audio files and text cards described in a JSON round file.
//!
//! Every question of a round becomes a question video and an answer video. These are cut from the
//! question's sources, decorated with labels and answer banners, and concatenated behind a title
//! card into one video per kind.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use popquiz::{composition::QuizEngine, config::Config, stream::FfmpegToolchain};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let toolchain = Arc::new(FfmpegToolchain::detect(&config.tools)?);
//!
//! let engine = QuizEngine::from_config(config, toolchain)?;
//! engine.render_file(Path::new("round01.json"), Path::new("output/"))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//!
//! - [`stream`] - Editable audio/video streams and the `graph` and `clip` backends rendering them
//! - [`quiz`] - The round file model, its loader and source materialization
//! - [`composition`] - Unit assembly, combination and the round pipeline
//! - [`timing`] - Timestamps and intervals
//! - [`config`] - Configuration management
//!
//! ## Working with streams directly
//!
//! Streams are values: every operation consumes the stream and returns its successor.
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use popquiz::{
//!     config::Config,
//!     stream::{BackendContext, BackendRegistry, Channels, FfmpegToolchain, Fade, RenderSettings},
//!     timing::Interval,
//! };
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let toolchain = Arc::new(FfmpegToolchain::detect(&config.tools)?);
//! let context = BackendContext::new(toolchain, RenderSettings::from(&config));
//! let backend = BackendRegistry::new().create("graph", context)?;
//!
//! backend
//!     .open(Path::new("clip.mp4"), Channels::Both, config.canvas())?
//!     .trim(Interval::parse("0:05", "0:15")?)?
//!     .scale_video()?
//!     .fade_in_and_out(Fade::symmetric(1.0, 10.0))?
//!     .run(Path::new("excerpt.mp4"), false)?;
//! # Ok(())
//! # }
//! ```

pub mod composition;
pub mod config;
pub mod error;
pub mod quiz;
pub mod stream;
pub mod timing;

// Re-export commonly used types for convenience
pub use crate::{
    composition::QuizEngine,
    config::Config,
    error::{QuizError, Result},
    quiz::QuizSpec,
    stream::{Backend, MediaStream, Stream},
};
