//! # Clip backend
//!
//! Every operation is carried out immediately: it runs one ffmpeg step that
//! reads the current intermediate clip(s) and writes a new one into the
//! backend's scratch directory. Intermediates are lossless (H.264 `-qp 0`,
//! PCM audio, Matroska) so nothing degrades along the way; only
//! [`MediaStream::run`] encodes with the configured codecs.
//!
//! Steps are described with the same graph operations as the graph backend,
//! which keeps the rendered output of both backends identical.

mod handles;

pub use handles::{ClipHandle, HandleSet, Scratch};

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    error::{Result, StreamError},
    stream::{
        graph::GraphStream,
        output::{encoding_args, output_path_for, ScopedOutput},
        registry::BackendContext,
        traits::{
            Backend, Canvas, Channels, CombineOptions, Fade, MediaStream, Stream, StreamInfo,
            TextBox, TextPlacement,
        },
    },
    timing::Interval,
};

pub const BACKEND_NAME: &str = "clip";

/// Encoder options of an intermediate clip
fn intermediate_args(info: &StreamInfo) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    if info.has_video {
        args.extend(
            ["-c:v", "libx264", "-preset", "ultrafast", "-qp", "0", "-pix_fmt", "yuv420p"]
                .map(String::from),
        );
    } else {
        args.push("-vn".to_string());
    }
    if info.has_audio {
        args.extend(["-c:a", "pcm_s16le"].map(String::from));
    } else {
        args.push("-an".to_string());
    }
    args
}

struct ClipContext {
    base: Arc<BackendContext>,
    scratch: Scratch,
}

impl ClipContext {
    /// Render `graph` into a fresh intermediate clip owned by `handles`
    fn materialize(
        self: &Arc<Self>,
        graph: GraphStream,
        mut handles: HandleSet,
        canvas: Canvas,
    ) -> Result<ClipStream> {
        let handle = self.scratch.next_clip();
        let clip = handle.path().to_path_buf();
        let info = graph.stream_info().clone();
        let args = graph.render_args(&clip, intermediate_args(&info))?;

        handles.track(handle);
        self.base.toolchain.run_ffmpeg(&args)?;

        Ok(ClipStream {
            clip,
            info,
            canvas,
            handles,
            context: self.clone(),
        })
    }
}

/// Backend that materializes every operation as an intermediate clip
pub struct ClipBackend {
    context: Arc<ClipContext>,
}

impl ClipBackend {
    pub fn new(context: BackendContext) -> Result<Self> {
        Ok(Self {
            context: Arc::new(ClipContext {
                base: Arc::new(context),
                scratch: Scratch::new()?,
            }),
        })
    }

    fn create(&self, graph: GraphStream, canvas: Canvas) -> Result<Stream> {
        Ok(Box::new(self.context.materialize(graph, HandleSet::new(), canvas)?))
    }
}

impl Backend for ClipBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn description(&self) -> &str {
        "Renders every operation to a lossless intermediate clip"
    }

    fn open(&self, path: &Path, channels: Channels, canvas: Canvas) -> Result<Stream> {
        let graph = GraphStream::open(path, channels, canvas, self.context.base.clone())?;
        self.create(graph, canvas)
    }

    fn create_empty_stream(&self, duration: f64, canvas: Canvas) -> Result<Stream> {
        let graph = GraphStream::empty(duration, canvas, self.context.base.clone())?;
        self.create(graph, canvas)
    }

    fn create_single_image_stream(
        &self,
        image: &Path,
        duration: f64,
        canvas: Canvas,
    ) -> Result<Stream> {
        let graph = GraphStream::single_image(image, duration, canvas, self.context.base.clone())?;
        self.create(graph, canvas)
    }

    fn create_silent_stream(&self, duration: f64, canvas: Canvas) -> Result<Stream> {
        let graph = GraphStream::silent(duration, canvas, self.context.base.clone())?;
        self.create(graph, canvas)
    }
}

/// A stream backed by a materialized intermediate clip
pub struct ClipStream {
    clip: PathBuf,
    info: StreamInfo,
    canvas: Canvas,
    handles: HandleSet,
    context: Arc<ClipContext>,
}

impl ClipStream {
    /// The intermediate file currently holding this stream
    pub fn clip_path(&self) -> &Path {
        &self.clip
    }

    pub fn handles(&self) -> &HandleSet {
        &self.handles
    }

    fn as_graph(&self) -> GraphStream {
        let context = self.context.base.clone();
        GraphStream::normalized(&self.clip, self.info.clone(), self.canvas, context)
    }

    /// Run one operation as an ffmpeg step
    ///
    /// Operations that leave the clip untouched do not spawn ffmpeg.
    fn step<F>(self: Box<Self>, operation: &str, apply: F) -> Result<Stream>
    where
        F: FnOnce(&mut GraphStream) -> Result<()>,
    {
        let mut graph = self.as_graph();
        apply(&mut graph)?;

        let ClipStream {
            clip,
            canvas,
            handles,
            context,
            ..
        } = *self;

        if graph.is_passthrough() {
            return Ok(Box::new(ClipStream {
                clip,
                info: graph.stream_info().clone(),
                canvas,
                handles,
                context,
            }));
        }

        debug!("Clip step '{}' on {:?}", operation, clip);
        Ok(Box::new(context.materialize(graph, handles, canvas)?))
    }

    /// Run an operation that consumes a second clip stream
    fn step_with<F>(mut self: Box<Self>, other: Stream, operation: &str, apply: F) -> Result<Stream>
    where
        F: FnOnce(&mut GraphStream, GraphStream) -> Result<()>,
    {
        let mut other = downcast(other)?;
        let other_graph = other.as_graph();
        self.handles.merge(std::mem::take(&mut other.handles));
        self.step(operation, move |graph| apply(graph, other_graph))
    }
}

impl MediaStream for ClipStream {
    fn backend_name(&self) -> &str {
        BACKEND_NAME
    }

    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn trim(self: Box<Self>, interval: Interval) -> Result<Stream> {
        self.step("trim", |graph| graph.apply_trim(interval))
    }

    fn repeat(self: Box<Self>) -> Result<Stream> {
        self.step("repeat", |graph| graph.apply_repeat())
    }

    fn combine(self: Box<Self>, other: Stream, options: CombineOptions) -> Result<Stream> {
        self.step_with(other, "combine", |graph, other| graph.apply_combine(other, options))
    }

    fn fade_in_and_out(self: Box<Self>, fade: Fade) -> Result<Stream> {
        self.step("fade_in_and_out", |graph| graph.apply_fade(fade))
    }

    fn scale_video(self: Box<Self>) -> Result<Stream> {
        self.step("scale_video", |graph| graph.apply_scale())
    }

    fn draw_text_in_box(self: Box<Self>, text: &str, text_box: TextBox) -> Result<Stream> {
        self.step("draw_text_in_box", |graph| graph.apply_text_in_box(text, text_box))
    }

    fn draw_text(self: Box<Self>, text: &str, placement: TextPlacement) -> Result<Stream> {
        self.step("draw_text", |graph| graph.apply_text(text, placement))
    }

    fn add_audio(self: Box<Self>, other: Stream) -> Result<Stream> {
        self.step_with(other, "add_audio", |graph, other| graph.apply_add_audio(other))
    }

    fn add_spacer(self: Box<Self>, text: &str, duration: f64) -> Result<Stream> {
        self.step("add_spacer", |graph| graph.apply_spacer(text, duration))
    }

    fn add_silence(self: Box<Self>, duration: f64) -> Result<Stream> {
        self.step("add_silence", |graph| graph.apply_silence(duration))
    }

    fn reverse(self: Box<Self>) -> Result<Stream> {
        self.step("reverse", |graph| graph.apply_reverse())
    }

    fn replace_audio_by_beep(
        self: Box<Self>,
        interval: Interval,
        frequency_hz: f64,
    ) -> Result<Stream> {
        self.step("replace_audio_by_beep", |graph| graph.apply_beep(interval, frequency_hz))
    }

    fn normalize_audio(self: Box<Self>) -> Result<Stream> {
        self.step("normalize_audio", |graph| graph.apply_normalize())
    }

    fn run(mut self: Box<Self>, file_name: &Path, dry_run: bool) -> Result<PathBuf> {
        let target = output_path_for(file_name);

        if dry_run {
            let released = self.handles.release();
            debug!("Dry run for {:?}, released {} intermediate clips", target, released);
            return Ok(target);
        }

        let output = ScopedOutput::new(&target)?;
        let settings = &self.context.base.settings;
        let args = self.as_graph().render_args(
            output.staged_path(),
            encoding_args(settings, self.info.has_video, self.info.has_audio),
        )?;

        info!(
            "Rendering {:?} ({:.1}s) from {} intermediate clips",
            target,
            self.info.duration,
            self.handles.len()
        );
        self.context.base.toolchain.run_ffmpeg(&args)?;
        let published = output.publish()?;

        let released = self.handles.release();
        debug!("Released {} intermediate clips", released);
        Ok(published)
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

fn downcast(stream: Stream) -> Result<ClipStream> {
    stream
        .into_any()
        .downcast::<ClipStream>()
        .map(|stream| *stream)
        .map_err(|_| {
            StreamError::BackendMismatch {
                expected: BACKEND_NAME.to_string(),
            }
            .into()
        })
}
