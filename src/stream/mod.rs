//! Editable audio/video streams and the backends that render them.

pub mod clip;
pub mod filters;
pub mod graph;
pub mod layout;
pub mod output;
pub mod registry;
pub mod toolchain;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use clip::ClipBackend;
pub use graph::GraphBackend;
pub use registry::{BackendContext, BackendRegistry};
pub use toolchain::{FfmpegToolchain, FfmpegVersion, MediaProbe, Toolchain};
pub use traits::{
    Backend, BoxEdge, Canvas, Channels, CombineOptions, Fade, MediaStream, RenderSettings, Stream,
    StreamInfo, TextBox, TextMotion, TextPlacement, DEFAULT_BEEP_FREQUENCY_HZ,
};
