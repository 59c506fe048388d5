//! # Filter-graph backend
//!
//! Operations only describe work: each one appends nodes to the stream's
//! [`FilterGraph`] and moves the stream's video/audio pads forward. Nothing is
//! encoded until [`MediaStream::run`], which compiles the whole graph into a
//! single `-filter_complex` invocation.
//!
//! The clip backend reuses the same operations on one-step graphs, which is
//! why the `apply_*` methods are visible inside the crate.

mod filtergraph;

pub use filtergraph::{FilterGraph, Offsets, Pad};

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    error::{Result, StreamError},
    stream::{
        filters::{self, MediaKind},
        layout::TextLayout,
        output::{encoding_args, output_path_for, ScopedOutput},
        registry::BackendContext,
        toolchain::image_size,
        traits::{
            Backend, Canvas, Channels, CombineOptions, Fade, MediaStream, Stream, StreamInfo,
            TextBox, TextPlacement,
        },
    },
    timing::Interval,
};

pub const BACKEND_NAME: &str = "graph";

/// Backend that renders each stream with one ffmpeg run
pub struct GraphBackend {
    context: Arc<BackendContext>,
}

impl GraphBackend {
    pub fn new(context: BackendContext) -> Self {
        Self {
            context: Arc::new(context),
        }
    }
}

impl Backend for GraphBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn description(&self) -> &str {
        "Builds a single ffmpeg filter graph per output and renders it in one pass"
    }

    fn open(&self, path: &Path, channels: Channels, canvas: Canvas) -> Result<Stream> {
        Ok(Box::new(GraphStream::open(path, channels, canvas, self.context.clone())?))
    }

    fn create_empty_stream(&self, duration: f64, canvas: Canvas) -> Result<Stream> {
        Ok(Box::new(GraphStream::empty(duration, canvas, self.context.clone())?))
    }

    fn create_single_image_stream(
        &self,
        image: &Path,
        duration: f64,
        canvas: Canvas,
    ) -> Result<Stream> {
        Ok(Box::new(GraphStream::single_image(image, duration, canvas, self.context.clone())?))
    }

    fn create_silent_stream(&self, duration: f64, canvas: Canvas) -> Result<Stream> {
        Ok(Box::new(GraphStream::silent(duration, canvas, self.context.clone())?))
    }
}

fn require_positive(what: &str, duration: f64) -> Result<()> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(StreamError::InvalidParameters {
            details: format!("{} needs a positive duration, got {}", what, duration),
        }
        .into());
    }
    Ok(())
}

/// A stream described by a filter graph and its current output pads
pub struct GraphStream {
    graph: FilterGraph,
    video: Option<Pad>,
    audio: Option<Pad>,
    info: StreamInfo,
    canvas: Canvas,
    context: Arc<BackendContext>,
}

impl GraphStream {
    /// Open a media file, normalizing frame rate and audio format
    pub(crate) fn open(
        path: &Path,
        channels: Channels,
        canvas: Canvas,
        context: Arc<BackendContext>,
    ) -> Result<Self> {
        let probe = context.toolchain.probe(path)?;
        let settings = &context.settings;

        let mut graph = FilterGraph::new();
        let input = graph.add_input(path, Vec::new());
        let mut info = StreamInfo::new(channels, 0, 0, probe.duration);

        let video = if !channels.has_video() {
            None
        } else if probe.has_video {
            info.width = probe.width;
            info.height = probe.height;
            let pad = graph.input_pad(input, MediaKind::Video);
            Some(graph.chain(pad, filters::video_format(settings)))
        } else {
            info.width = canvas.width;
            info.height = canvas.height;
            let black = filters::black_source(canvas, settings, probe.duration);
            Some(graph.source(MediaKind::Video, black))
        };

        let audio = if !channels.has_audio() {
            None
        } else if probe.has_audio {
            let pad = graph.input_pad(input, MediaKind::Audio);
            Some(graph.chain(pad, filters::audio_format(settings)))
        } else {
            Some(graph.source(MediaKind::Audio, filters::silence_source(settings, probe.duration)))
        };

        debug!("Opened {:?} as {} ({:.2}s)", path, info.describe(), info.duration);
        Ok(Self {
            graph,
            video,
            audio,
            info,
            canvas,
            context,
        })
    }

    /// Use a file that is already in the common format as is
    pub(crate) fn normalized(
        path: &Path,
        info: StreamInfo,
        canvas: Canvas,
        context: Arc<BackendContext>,
    ) -> Self {
        let mut graph = FilterGraph::new();
        let input = graph.add_input(path, Vec::new());
        let video = info.has_video.then(|| graph.input_pad(input, MediaKind::Video));
        let audio = info.has_audio.then(|| graph.input_pad(input, MediaKind::Audio));
        Self {
            graph,
            video,
            audio,
            info,
            canvas,
            context,
        }
    }

    pub(crate) fn empty(
        duration: f64,
        canvas: Canvas,
        context: Arc<BackendContext>,
    ) -> Result<Self> {
        require_positive("An empty stream", duration)?;
        let mut graph = FilterGraph::new();
        let video = graph.source(
            MediaKind::Video,
            filters::black_source(canvas, &context.settings, duration),
        );
        Ok(Self {
            graph,
            video: Some(video),
            audio: None,
            info: StreamInfo::new(Channels::VideoOnly, canvas.width, canvas.height, duration),
            canvas,
            context,
        })
    }

    pub(crate) fn single_image(
        image: &Path,
        duration: f64,
        canvas: Canvas,
        context: Arc<BackendContext>,
    ) -> Result<Self> {
        require_positive("An image stream", duration)?;
        let (width, height) = image_size(image)?;
        let settings = &context.settings;

        let mut graph = FilterGraph::new();
        let options = vec![
            "-loop".to_string(),
            "1".to_string(),
            "-framerate".to_string(),
            settings.fps.to_string(),
            "-t".to_string(),
            filters::secs(duration),
        ];
        let input = graph.add_input(image, options);

        let still = StreamInfo::new(Channels::VideoOnly, width, height, duration);
        let mut chain = Vec::new();
        if let Some(fit) = filters::scale_and_pad(&still, canvas) {
            chain.push(fit);
        }
        chain.push(filters::video_format(settings));
        let pad = graph.input_pad(input, MediaKind::Video);
        let video = graph.chain(pad, chain.join(","));

        Ok(Self {
            graph,
            video: Some(video),
            audio: None,
            info: StreamInfo::new(Channels::VideoOnly, canvas.width, canvas.height, duration),
            canvas,
            context,
        })
    }

    pub(crate) fn silent(
        duration: f64,
        canvas: Canvas,
        context: Arc<BackendContext>,
    ) -> Result<Self> {
        require_positive("A silent stream", duration)?;
        let mut graph = FilterGraph::new();
        let silence = filters::silence_source(&context.settings, duration);
        let audio = graph.source(MediaKind::Audio, silence);
        Ok(Self {
            graph,
            video: None,
            audio: Some(audio),
            info: StreamInfo::new(Channels::AudioOnly, 0, 0, duration),
            canvas,
            context,
        })
    }

    pub(crate) fn stream_info(&self) -> &StreamInfo {
        &self.info
    }

    /// Whether the graph still just passes its single input through
    pub(crate) fn is_passthrough(&self) -> bool {
        self.graph.node_count() == 0 && self.graph.input_count() == 1
    }

    /// Run both pads through a per-kind filter
    fn map_pads<F>(&mut self, filter: F)
    where
        F: Fn(MediaKind) -> String,
    {
        if let Some(pad) = self.video.take() {
            self.video = Some(self.graph.chain(pad, filter(MediaKind::Video)));
        }
        if let Some(pad) = self.audio.take() {
            self.audio = Some(self.graph.chain(pad, filter(MediaKind::Audio)));
        }
    }

    fn chain_video(&mut self, filter: String) {
        if let Some(pad) = self.video.take() {
            self.video = Some(self.graph.chain(pad, filter));
        }
    }

    fn chain_audio(&mut self, filter: String) {
        if let Some(pad) = self.audio.take() {
            self.audio = Some(self.graph.chain(pad, filter));
        }
    }

    pub(crate) fn apply_trim(&mut self, interval: Interval) -> Result<()> {
        self.info = self.info.trimmed(&interval)?;
        self.map_pads(|kind| filters::trim(kind, &interval));
        Ok(())
    }

    fn repeat_pad(&mut self, pad: Pad) -> Pad {
        let kind = pad.kind();
        let (first, second) = self.graph.split(pad);
        self.graph.join(kind, vec![first, second], filters::concat(kind, 2))
    }

    pub(crate) fn apply_repeat(&mut self) -> Result<()> {
        if let Some(pad) = self.video.take() {
            self.video = Some(self.repeat_pad(pad));
        }
        if let Some(pad) = self.audio.take() {
            self.audio = Some(self.repeat_pad(pad));
        }
        self.info = self.info.repeated();
        Ok(())
    }

    fn join_pair(
        &mut self,
        kind: MediaKind,
        mine: Option<Pad>,
        theirs: Option<Pad>,
        options: &CombineOptions,
        first_duration: f64,
    ) -> Option<Pad> {
        match (mine, theirs) {
            (Some(mine), Some(theirs)) => {
                let (first, second) = if options.other_first {
                    (theirs, mine)
                } else {
                    (mine, theirs)
                };
                let filter = if options.crossfade > 0.0 {
                    filters::crossfade(kind, options.crossfade, first_duration)
                } else {
                    filters::concat(kind, 2)
                };
                Some(self.graph.join(kind, vec![first, second], filter))
            }
            (mine, theirs) => {
                for pad in [mine, theirs].into_iter().flatten() {
                    self.graph.discard(pad);
                }
                None
            }
        }
    }

    pub(crate) fn apply_combine(
        &mut self,
        other: GraphStream,
        options: CombineOptions,
    ) -> Result<()> {
        let (first, second) = if options.other_first {
            (&other.info, &self.info)
        } else {
            (&self.info, &other.info)
        };
        let info = first.combined(second, &options)?;
        let first_duration = first.duration;

        let offsets = self.graph.absorb(other.graph);
        let other_video = other.video.map(|pad| offsets.shift(pad));
        let other_audio = other.audio.map(|pad| offsets.shift(pad));

        let video = self.video.take();
        self.video = self.join_pair(MediaKind::Video, video, other_video, &options, first_duration);
        let audio = self.audio.take();
        self.audio = self.join_pair(MediaKind::Audio, audio, other_audio, &options, first_duration);
        self.info = info;
        Ok(())
    }

    pub(crate) fn apply_fade(&mut self, fade: Fade) -> Result<()> {
        fade.validate()?;
        if let Some(filter) = filters::fade(MediaKind::Video, &fade) {
            self.chain_video(filter);
        }
        if let Some(filter) = filters::fade(MediaKind::Audio, &fade) {
            self.chain_audio(filter);
        }
        Ok(())
    }

    pub(crate) fn apply_scale(&mut self) -> Result<()> {
        self.info.require_video("scale_video")?;
        if let Some(filter) = filters::scale_and_pad(&self.info, self.canvas) {
            self.chain_video(filter);
            self.info.width = self.canvas.width;
            self.info.height = self.canvas.height;
        }
        Ok(())
    }

    fn layout(&self) -> TextLayout {
        TextLayout::for_frame(self.info.width, self.info.height)
    }

    pub(crate) fn apply_text_in_box(&mut self, text: &str, text_box: TextBox) -> Result<()> {
        self.info.require_video("draw_text_in_box")?;
        let style = self.context.text_style();
        let filter = filters::text_in_box(text, &text_box, &self.layout(), &style);
        self.chain_video(filter);
        Ok(())
    }

    pub(crate) fn apply_text(&mut self, text: &str, placement: TextPlacement) -> Result<()> {
        self.info.require_video("draw_text")?;
        let style = self.context.text_style();
        let filter = filters::placed_text(text, &placement, &self.layout(), &style);
        self.chain_video(filter);
        Ok(())
    }

    pub(crate) fn apply_add_audio(&mut self, other: GraphStream) -> Result<()> {
        self.info.require_video("add_audio")?;
        other.info.require_audio("add_audio")?;

        let offsets = self.graph.absorb(other.graph);
        if let Some(pad) = other.video {
            self.graph.discard(offsets.shift(pad));
        }
        if let Some(pad) = self.audio.take() {
            self.graph.discard(pad);
        }
        self.audio = other.audio.map(|pad| offsets.shift(pad));
        self.info.has_audio = true;
        Ok(())
    }

    pub(crate) fn apply_spacer(&mut self, text: &str, duration: f64) -> Result<()> {
        self.info.require_video("add_spacer")?;
        require_positive("A spacer", duration)?;

        let frame = Canvas::new(self.info.width, self.info.height);
        let settings = &self.context.settings;
        let card = format!(
            "{},{}",
            filters::black_source(frame, settings, duration),
            filters::spacer_text(text, duration, &self.layout(), &self.context.text_style())
        );
        let card = self.graph.source(MediaKind::Video, card);
        if let Some(video) = self.video.take() {
            self.video = Some(self.graph.join(
                MediaKind::Video,
                vec![card, video],
                filters::concat(MediaKind::Video, 2),
            ));
        }

        if let Some(audio) = self.audio.take() {
            let silence = filters::silence_source(settings, duration);
            let silence = self.graph.source(MediaKind::Audio, silence);
            self.audio = Some(self.graph.join(
                MediaKind::Audio,
                vec![silence, audio],
                filters::concat(MediaKind::Audio, 2),
            ));
        }

        self.info = self.info.extended(duration);
        Ok(())
    }

    pub(crate) fn apply_silence(&mut self, duration: f64) -> Result<()> {
        self.info.require_audio("add_silence")?;
        if self.info.has_video {
            return Err(StreamError::InvalidParameters {
                details: "add_silence expects an audio-only stream, use add_spacer with video".to_string(),
            }
            .into());
        }
        require_positive("Silence", duration)?;

        let silence = self
            .graph
            .source(MediaKind::Audio, filters::silence_source(&self.context.settings, duration));
        if let Some(audio) = self.audio.take() {
            self.audio = Some(self.graph.join(
                MediaKind::Audio,
                vec![silence, audio],
                filters::concat(MediaKind::Audio, 2),
            ));
        }
        self.info = self.info.extended(duration);
        Ok(())
    }

    pub(crate) fn apply_reverse(&mut self) -> Result<()> {
        self.map_pads(|kind| filters::reverse(kind).to_string());
        Ok(())
    }

    pub(crate) fn apply_beep(&mut self, interval: Interval, frequency_hz: f64) -> Result<()> {
        self.info.require_audio("replace_audio_by_beep")?;
        let duration = self.info.duration;
        if interval.start() >= duration {
            return Err(StreamError::TrimOutOfRange {
                start: interval.start(),
                duration,
            }
            .into());
        }
        if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
            return Err(StreamError::InvalidParameters {
                details: format!("beep frequency must be positive, got {}", frequency_hz),
            }
            .into());
        }

        let start = interval.start();
        let end = interval.end().min(duration);
        let keep_head = start > 0.0;
        let keep_tail = duration - end > 1e-6;

        let audio = match self.audio.take() {
            Some(audio) => audio,
            None => return Ok(()),
        };
        let (head, tail) = match (keep_head, keep_tail) {
            (true, true) => {
                let (head, tail) = self.graph.split(audio);
                (Some(head), Some(tail))
            }
            (true, false) => (Some(audio), None),
            (false, true) => (None, Some(audio)),
            (false, false) => {
                self.graph.discard(audio);
                (None, None)
            }
        };

        let settings = &self.context.settings;
        let mut parts = Vec::new();
        if let Some(head) = head {
            parts.push(self.graph.chain(head, filters::audio_head(start)));
        }
        parts.push(self.graph.source(
            MediaKind::Audio,
            filters::sine_source(frequency_hz, settings, end - start),
        ));
        if let Some(tail) = tail {
            parts.push(self.graph.chain(tail, filters::audio_tail(end)));
        }

        let count = parts.len();
        self.audio = Some(if count == 1 {
            parts.remove(0)
        } else {
            self.graph.join(MediaKind::Audio, parts, filters::concat(MediaKind::Audio, count))
        });
        Ok(())
    }

    pub(crate) fn apply_normalize(&mut self) -> Result<()> {
        self.info.require_audio("normalize_audio")?;
        let filter = filters::loudness(&self.context.settings);
        self.chain_audio(filter);
        Ok(())
    }

    /// Full ffmpeg argument list writing the stream to `output`
    pub(crate) fn render_args(&self, output: &Path, encoding: Vec<String>) -> Result<Vec<String>> {
        let outputs: Vec<&Pad> = self.video.iter().chain(self.audio.iter()).collect();
        if outputs.is_empty() {
            return Err(StreamError::InvalidParameters {
                details: "nothing to render, the stream has neither video nor audio".to_string(),
            }
            .into());
        }
        let mut args = self.graph.compile(&outputs);
        args.extend(encoding);
        args.push(output.display().to_string());
        Ok(args)
    }
}

impl MediaStream for GraphStream {
    fn backend_name(&self) -> &str {
        BACKEND_NAME
    }

    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn trim(mut self: Box<Self>, interval: Interval) -> Result<Stream> {
        self.apply_trim(interval)?;
        Ok(self)
    }

    fn repeat(mut self: Box<Self>) -> Result<Stream> {
        self.apply_repeat()?;
        Ok(self)
    }

    fn combine(mut self: Box<Self>, other: Stream, options: CombineOptions) -> Result<Stream> {
        let other = downcast(other)?;
        self.apply_combine(other, options)?;
        Ok(self)
    }

    fn fade_in_and_out(mut self: Box<Self>, fade: Fade) -> Result<Stream> {
        self.apply_fade(fade)?;
        Ok(self)
    }

    fn scale_video(mut self: Box<Self>) -> Result<Stream> {
        self.apply_scale()?;
        Ok(self)
    }

    fn draw_text_in_box(mut self: Box<Self>, text: &str, text_box: TextBox) -> Result<Stream> {
        self.apply_text_in_box(text, text_box)?;
        Ok(self)
    }

    fn draw_text(mut self: Box<Self>, text: &str, placement: TextPlacement) -> Result<Stream> {
        self.apply_text(text, placement)?;
        Ok(self)
    }

    fn add_audio(mut self: Box<Self>, other: Stream) -> Result<Stream> {
        let other = downcast(other)?;
        self.apply_add_audio(other)?;
        Ok(self)
    }

    fn add_spacer(mut self: Box<Self>, text: &str, duration: f64) -> Result<Stream> {
        self.apply_spacer(text, duration)?;
        Ok(self)
    }

    fn add_silence(mut self: Box<Self>, duration: f64) -> Result<Stream> {
        self.apply_silence(duration)?;
        Ok(self)
    }

    fn reverse(mut self: Box<Self>) -> Result<Stream> {
        self.apply_reverse()?;
        Ok(self)
    }

    fn replace_audio_by_beep(
        mut self: Box<Self>,
        interval: Interval,
        frequency_hz: f64,
    ) -> Result<Stream> {
        self.apply_beep(interval, frequency_hz)?;
        Ok(self)
    }

    fn normalize_audio(mut self: Box<Self>) -> Result<Stream> {
        self.apply_normalize()?;
        Ok(self)
    }

    fn run(self: Box<Self>, file_name: &Path, dry_run: bool) -> Result<PathBuf> {
        let target = output_path_for(file_name);
        let settings = &self.context.settings;
        let encoding = encoding_args(settings, self.info.has_video, self.info.has_audio);

        if dry_run {
            let args = self.render_args(&target, encoding)?;
            debug!("Dry run for {:?}: ffmpeg {}", target, args.join(" "));
            return Ok(target);
        }

        let output = ScopedOutput::new(&target)?;
        let args = self.render_args(output.staged_path(), encoding)?;
        info!(
            "Rendering {:?} ({:.1}s, {} filters)",
            target,
            self.info.duration,
            self.graph.node_count()
        );
        debug!("Filter graph: {}", self.graph.filter_complex());
        self.context.toolchain.run_ffmpeg(&args)?;
        output.publish()
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

fn downcast(stream: Stream) -> Result<GraphStream> {
    stream
        .into_any()
        .downcast::<GraphStream>()
        .map(|stream| *stream)
        .map_err(|_| {
            StreamError::BackendMismatch {
                expected: BACKEND_NAME.to_string(),
            }
            .into()
        })
}
