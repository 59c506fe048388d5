//! # Unit assembly
//!
//! A unit is the question or the answer video of one question. Its video and
//! audio are built independently from their segment lists, each segment being
//! opened, trimmed, decorated and faded before it is appended to the rest.
//! The audio is finally muxed into the video and the unit rendered to
//! `{round:02}_{question:02}_{kind}.mp4`.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{
    config::QuizConfig,
    error::{QuizError, Result, SpecError},
    quiz::{
        loader::{check_repetitions, repeat_steps},
        types::{Event, Question, Segment, UnitKind},
    },
    stream::{
        layout::stacked_fractions, output::output_path_for, Backend, Canvas, Channels,
        CombineOptions, Fade, Stream, TextBox, TextPlacement,
    },
};

/// Everything needed to build one unit
pub struct Unit<'a> {
    pub round: u32,
    /// Number shown in the "Question R.N" label and used in the file name
    pub number: usize,
    pub kind: UnitKind,
    pub question: &'a Question,
    /// Answer texts per answer video segment, in questioned order
    pub answer_texts: &'a [Vec<String>],
    /// Materialized source files, indexed like `question.sources`
    pub sources: &'a [PathBuf],
    /// Text of the spacer card in front of the unit
    pub spacer: Option<&'a str>,
}

impl Unit<'_> {
    pub fn label(&self) -> String {
        format!("Question {}.{}", self.round, self.number)
    }

    pub fn file_name(&self) -> String {
        unit_file_name(self.round, self.number, self.kind)
    }

    fn source(&self, segment: &Segment) -> Result<&Path> {
        self.sources
            .get(segment.source)
            .map(PathBuf::as_path)
            .ok_or_else(|| {
                QuizError::generic(format!("No materialized file for source {}", segment.source))
            })
    }

    fn event(&self, index: usize) -> Result<&Event> {
        self.question.events.get(index).ok_or_else(|| {
            SpecError::EventIndex {
                question: self.number,
                index,
                count: self.question.events.len(),
            }
            .into()
        })
    }
}

/// `{round:02}_{question:02}_{kind}.mp4`
pub fn unit_file_name(round: u32, number: usize, kind: UnitKind) -> String {
    format!("{:02}_{:02}_{}.mp4", round, number, kind)
}

/// Builds and renders units on one backend
pub struct UnitAssembler<'a> {
    backend: &'a dyn Backend,
    settings: &'a QuizConfig,
    canvas: Canvas,
}

impl<'a> UnitAssembler<'a> {
    pub fn new(backend: &'a dyn Backend, settings: &'a QuizConfig, canvas: Canvas) -> Self {
        Self {
            backend,
            settings,
            canvas,
        }
    }

    /// Render a unit into `round_dir`
    ///
    /// With `use_cache` an existing file is returned as is, without building
    /// the unit.
    pub fn render(&self, unit: &Unit<'_>, round_dir: &Path, use_cache: bool) -> Result<PathBuf> {
        let target = output_path_for(&round_dir.join(unit.file_name()));
        if use_cache && target.exists() {
            info!("♻️  Reusing cached {} video {:?}", unit.kind, target);
            return Ok(target);
        }

        info!("🎞️  Rendering {} video for {}", unit.kind, unit.label());
        self.build(unit)?.run(&target, false)
    }

    /// Assemble the full unit stream without rendering it
    pub fn build(&self, unit: &Unit<'_>) -> Result<Stream> {
        let repeat_unit = unit.kind == UnitKind::Question || self.settings.repeat_answers;
        let repetitions = if repeat_unit { unit.question.repetitions } else { 1 };
        check_repetitions(repetitions)?;

        let video = self.build_video(unit, repetitions)?;
        let audio = self.build_audio(unit, repetitions)?;
        debug!(
            "{} {}: video {:.2}s, audio {:.2}s",
            unit.label(),
            unit.kind,
            video.info().duration,
            audio.info().duration
        );
        video.add_audio(audio)
    }

    fn build_video(&self, unit: &Unit<'_>, repetitions: u32) -> Result<Stream> {
        let segments = unit.question.video_segments(unit.kind);
        let mut video: Option<Stream> = None;

        for (index, segment) in segments.iter().enumerate() {
            let mut stream = self
                .backend
                .open(unit.source(segment)?, Channels::VideoOnly, self.canvas)?
                .trim(segment.interval)?;
            if segment.reverse {
                stream = stream.reverse()?;
            }
            stream = stream.scale_video()?;
            let length = stream.info().duration;

            if unit.kind == UnitKind::Answer {
                if let Some(texts) = unit.answer_texts.get(index) {
                    stream = draw_answer_texts(stream, texts, length)?;
                }
                stream = self.draw_label_events(stream, unit, segment)?;
            }

            stream = stream.fade_in_and_out(self.segment_fade(segments, index, length))?;
            stream = repeat(stream, segment.repetitions)?;
            video = Some(append(video, stream, segment)?);
        }

        let video = video.ok_or_else(|| {
            QuizError::generic(format!("{} has no {} video", unit.label(), unit.kind))
        })?;
        let duration = video.info().duration;
        let mut video = video.draw_text_in_box(&unit.label(), TextBox::scrolling(duration))?;
        video = repeat(video, repetitions)?;
        if let Some(text) = unit.spacer {
            video = video.add_spacer(text, self.settings.spacer_duration_s)?;
        }
        Ok(video)
    }

    fn build_audio(&self, unit: &Unit<'_>, repetitions: u32) -> Result<Stream> {
        let segments = unit.question.audio_segments(unit.kind);
        let mut audio: Option<Stream> = None;

        for (index, segment) in segments.iter().enumerate() {
            let mut stream = self
                .backend
                .open(unit.source(segment)?, Channels::AudioOnly, self.canvas)?;
            for &event_index in &segment.beeps_events {
                let event = unit.event(event_index)?;
                let frequency = event.frequency.unwrap_or(self.settings.beep_frequency_hz);
                stream = stream.replace_audio_by_beep(event.interval, frequency)?;
            }
            stream = stream.trim(segment.interval)?;
            if segment.reverse {
                stream = stream.reverse()?;
            }
            let length = stream.info().duration;
            stream = stream.fade_in_and_out(self.segment_fade(segments, index, length))?;
            stream = repeat(stream, segment.repetitions)?;
            audio = Some(append(audio, stream, segment)?);
        }

        let mut audio = audio.ok_or_else(|| {
            QuizError::generic(format!("{} has no {} audio", unit.label(), unit.kind))
        })?;
        audio = repeat(audio, repetitions)?;
        if unit.spacer.is_some() {
            audio = audio.add_silence(self.settings.spacer_duration_s)?;
        }
        if self.settings.normalize_audio {
            audio = audio.normalize_audio()?;
        }
        Ok(audio)
    }

    /// Show the label events of a segment on its trimmed timeline
    fn draw_label_events(
        &self,
        mut stream: Stream,
        unit: &Unit<'_>,
        segment: &Segment,
    ) -> Result<Stream> {
        for &event_index in &segment.answer_label_events {
            let event = unit.event(event_index)?;
            if let Some(text) = &event.text {
                let interval = event.interval.relative_to(segment.interval.start())?;
                stream = stream.overlay_fading_text(text, interval)?;
            }
        }
        Ok(stream)
    }

    /// Fade of segment `index` over its trimmed `length`: clamped to half of
    /// it, and left out at the edges that crossfade into a neighbour
    fn segment_fade(&self, segments: &[Segment], index: usize, length: f64) -> Fade {
        let crossfades_in = index > 0 && segments[index].crossfade_duration > 0.0;
        let crossfades_out = segments
            .get(index + 1)
            .map_or(false, |next| next.crossfade_duration > 0.0);

        Fade {
            duration: self.settings.fade_duration_s.min(length / 2.0),
            total_length: length,
            fade_in: !crossfades_in,
            fade_out: !crossfades_out,
        }
    }
}

/// Banner with the first two answers, the remaining ones centered below each other
fn draw_answer_texts(mut stream: Stream, texts: &[String], length: f64) -> Result<Stream> {
    let banner = texts.iter().take(2).cloned().collect::<Vec<_>>().join(" - ");
    if !banner.is_empty() {
        stream = stream.draw_text_in_box(&banner, TextBox::banner(length))?;
    }

    let rest = texts.get(2..).unwrap_or_default();
    for (text, fraction) in rest.iter().zip(stacked_fractions(rest.len())) {
        stream = stream.draw_text(text, TextPlacement::at(fraction))?;
    }
    Ok(stream)
}

fn repeat(mut stream: Stream, repetitions: u32) -> Result<Stream> {
    check_repetitions(repetitions)?;
    for _ in 0..repeat_steps(repetitions) {
        stream = stream.repeat()?;
    }
    Ok(stream)
}

fn append(accumulated: Option<Stream>, stream: Stream, segment: &Segment) -> Result<Stream> {
    match accumulated {
        None => Ok(stream),
        Some(accumulated) => {
            accumulated.combine(stream, CombineOptions::crossfade(segment.crossfade_duration))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::types::Source;
    use crate::stream::{
        testing::{context, video_probe, FakeToolchain},
        ClipBackend, GraphBackend,
    };
    use crate::timing::Interval;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn segment(start: &str, end: &str) -> Segment {
        Segment {
            source: 0,
            interval: Interval::parse(start, end).unwrap(),
            reverse: false,
            repetitions: 1,
            crossfade_duration: 0.0,
            beeps_events: Vec::new(),
            answer_label_events: Vec::new(),
        }
    }

    fn question() -> Question {
        Question {
            sources: vec![serde_json::from_str::<Source>(
                r#"{"source": "youtube", "identifier": "abc", "format": "mp4"}"#,
            )
            .unwrap()],
            question_video: vec![segment("0:05", "0:15")],
            question_audio: vec![segment("0:05", "0:15")],
            answer_video: vec![segment("1:00", "1:10")],
            answer_audio: vec![segment("1:00", "1:10")],
            answers: vec![BTreeMap::new()],
            repetitions: 1,
            events: Vec::new(),
            variables: BTreeMap::new(),
        }
    }

    fn unit<'a>(
        question: &'a Question,
        kind: UnitKind,
        texts: &'a [Vec<String>],
        sources: &'a [PathBuf],
    ) -> Unit<'a> {
        Unit {
            round: 3,
            number: 1,
            kind,
            question,
            answer_texts: texts,
            sources,
            spacer: None,
        }
    }

    fn texts(items: &[&str]) -> Vec<Vec<String>> {
        vec![items.iter().map(|s| s.to_string()).collect()]
    }

    #[test]
    fn test_question_unit_has_label_and_no_banner() {
        let toolchain = Arc::new(FakeToolchain::new());
        let backend = GraphBackend::new(context(&toolchain));
        let settings = QuizConfig::default();
        let assembler = UnitAssembler::new(&backend, &settings, Canvas::default());

        let question = question();
        let answers = texts(&["Band", "Song"]);
        let sources = vec![PathBuf::from("abc.mp4")];
        let unit = unit(&question, UnitKind::Question, &answers, &sources);

        let stream = assembler.build(&unit).unwrap();
        assert_eq!(stream.info().duration, 10.0);
        assert!(stream.info().has_video && stream.info().has_audio);

        let dir = tempdir().unwrap();
        let path = stream.run(&dir.path().join(unit.file_name()), false).unwrap();
        assert!(path.ends_with("03_01_question.mp4"));

        let fc = toolchain.last_filter_complex().unwrap();
        assert!(fc.contains("text=Question 3.1:"));
        assert!(!fc.contains("drawbox=x=0:y=0:"));
        assert!(!fc.contains("Band"));
        assert!(fc.contains("loudnorm"));
    }

    #[test]
    fn test_answer_banner_joins_first_two_texts() {
        let toolchain = Arc::new(FakeToolchain::new());
        let backend = GraphBackend::new(context(&toolchain));
        let settings = QuizConfig::default();
        let assembler = UnitAssembler::new(&backend, &settings, Canvas::default());

        let question = question();
        let answers = texts(&["Band", "Song"]);
        let sources = vec![PathBuf::from("abc.mp4")];
        let dir = tempdir().unwrap();
        assembler
            .render(&unit(&question, UnitKind::Answer, &answers, &sources), dir.path(), false)
            .unwrap();

        let fc = toolchain.last_filter_complex().unwrap();
        assert!(fc.contains("drawbox=x=0:y=0:"));
        assert!(fc.contains("text=Band - Song:"));
        assert!(fc.contains("text=Question 3.1:"));
    }

    #[test]
    fn test_third_answer_text_drawn_separately() {
        let toolchain = Arc::new(FakeToolchain::new());
        let backend = GraphBackend::new(context(&toolchain));
        let settings = QuizConfig::default();
        let assembler = UnitAssembler::new(&backend, &settings, Canvas::default());

        let question = question();
        let answers = texts(&["Band", "Song", "1987"]);
        let sources = vec![PathBuf::from("abc.mp4")];
        let dir = tempdir().unwrap();
        assembler
            .render(&unit(&question, UnitKind::Answer, &answers, &sources), dir.path(), false)
            .unwrap();

        let fc = toolchain.last_filter_complex().unwrap();
        assert!(fc.contains("text=Band - Song:"));
        assert!(fc.contains("text=1987:"));
        assert!(!fc.contains("Song - 1987"));
    }

    #[test]
    fn test_spacer_and_repetitions_extend_the_unit() {
        let toolchain = Arc::new(FakeToolchain::new());
        let backend = GraphBackend::new(context(&toolchain));
        let settings = QuizConfig::default();
        let assembler = UnitAssembler::new(&backend, &settings, Canvas::default());

        let mut question = question();
        question.repetitions = 2;
        let answers = texts(&["Band"]);
        let sources = vec![PathBuf::from("abc.mp4")];
        let mut unit = unit(&question, UnitKind::Question, &answers, &sources);
        unit.spacer = Some("Get ready");

        let stream = assembler.build(&unit).unwrap();
        assert_eq!(stream.info().duration, 10.0 * 2.0 + settings.spacer_duration_s);

        // answers only repeat with repeat_answers
        unit.kind = UnitKind::Answer;
        unit.spacer = None;
        assert_eq!(assembler.build(&unit).unwrap().info().duration, 10.0);
    }

    #[test]
    fn test_crossfaded_segments_skip_inner_fades() {
        let toolchain = Arc::new(FakeToolchain::new());
        let backend = GraphBackend::new(context(&toolchain));
        let settings = QuizConfig::default();
        let assembler = UnitAssembler::new(&backend, &settings, Canvas::default());

        let mut question = question();
        let mut second = segment("0:20", "0:27");
        second.crossfade_duration = 2.0;
        question.question_video = vec![segment("0:05", "0:10"), second.clone()];
        question.question_audio = vec![segment("0:05", "0:10"), second];

        let answers = texts(&["Band"]);
        let sources = vec![PathBuf::from("abc.mp4")];
        let stream = assembler
            .build(&unit(&question, UnitKind::Question, &answers, &sources))
            .unwrap();
        assert_eq!(stream.info().duration, 10.0);

        let dir = tempdir().unwrap();
        stream.run(&dir.path().join("unit.mp4"), false).unwrap();
        let fc = toolchain.last_filter_complex().unwrap();
        assert!(fc.contains("xfade=transition=fade:duration=2:offset=3"));
        assert!(fc.contains("fade=t=out:st=6:d=1"));
        assert!(!fc.contains("fade=t=out:st=4:d=1"));
    }

    #[test]
    fn test_label_events_use_segment_time() {
        let toolchain = Arc::new(FakeToolchain::new());
        let backend = GraphBackend::new(context(&toolchain));
        let settings = QuizConfig::default();
        let assembler = UnitAssembler::new(&backend, &settings, Canvas::default());

        let mut question = question();
        question.events = vec![Event {
            name: None,
            interval: Interval::parse("1:02", "1:05").unwrap(),
            text: Some("Chorus".to_string()),
            frequency: None,
        }];
        question.answer_video[0].answer_label_events = vec![0];

        let answers = texts(&["Band"]);
        let sources = vec![PathBuf::from("abc.mp4")];
        let dir = tempdir().unwrap();
        assembler
            .render(&unit(&question, UnitKind::Answer, &answers, &sources), dir.path(), false)
            .unwrap();

        let fc = toolchain.last_filter_complex().unwrap();
        assert!(fc.contains("text=Chorus:"));
        assert!(fc.contains(r"between(t\,1\,6)"));
    }

    #[test]
    fn test_beeps_use_event_frequency() {
        let toolchain = Arc::new(FakeToolchain::new());
        let backend = GraphBackend::new(context(&toolchain));
        let settings = QuizConfig::default();
        let assembler = UnitAssembler::new(&backend, &settings, Canvas::default());

        let mut question = question();
        question.events = vec![Event {
            name: Some("hook".to_string()),
            interval: Interval::parse("0:07", "0:08").unwrap(),
            text: None,
            frequency: Some(880.0),
        }];
        question.question_audio[0].beeps_events = vec![0];

        let answers = texts(&["Band"]);
        let sources = vec![PathBuf::from("abc.mp4")];
        let stream = assembler
            .build(&unit(&question, UnitKind::Question, &answers, &sources))
            .unwrap();
        assert_eq!(stream.info().duration, 10.0);

        let dir = tempdir().unwrap();
        stream.run(&dir.path().join("unit.mp4"), false).unwrap();
        assert!(toolchain.last_filter_complex().unwrap().contains("sine=frequency=880"));
    }

    #[test]
    fn test_cached_unit_is_reused() {
        let toolchain = Arc::new(FakeToolchain::new());
        let backend = GraphBackend::new(context(&toolchain));
        let settings = QuizConfig::default();
        let assembler = UnitAssembler::new(&backend, &settings, Canvas::default());

        let question = question();
        let answers = texts(&["Band"]);
        let sources = vec![PathBuf::from("abc.mp4")];
        let unit = unit(&question, UnitKind::Question, &answers, &sources);

        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("03_01_question.mp4"), b"old render").unwrap();
        let path = assembler.render(&unit, dir.path(), true).unwrap();

        assert!(toolchain.invocations().is_empty());
        assert_eq!(std::fs::read(path).unwrap(), b"old render");
    }

    #[test]
    fn test_cached_unit_skips_every_clip_step() {
        let toolchain = Arc::new(FakeToolchain::new());
        let backend = ClipBackend::new(context(&toolchain)).unwrap();
        let settings = QuizConfig::default();
        let assembler = UnitAssembler::new(&backend, &settings, Canvas::default());

        let question = question();
        let answers = texts(&["Band", "Song"]);
        let sources = vec![PathBuf::from("abc.mp4")];
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("03_01_answer.mp4"), b"old render").unwrap();

        let path = assembler
            .render(&unit(&question, UnitKind::Answer, &answers, &sources), dir.path(), true)
            .unwrap();
        assert!(toolchain.invocations().is_empty());
        assert_eq!(std::fs::read(path).unwrap(), b"old render");

        // without the cache flag the clip steps run again
        assembler
            .render(&unit(&question, UnitKind::Answer, &answers, &sources), dir.path(), false)
            .unwrap();
        assert!(!toolchain.invocations().is_empty());
    }

    #[test]
    fn test_short_source_fades_at_trimmed_end() {
        let toolchain =
            Arc::new(FakeToolchain::new().with_probe("short.mp4", video_probe(12.0, 1920, 1080)));
        let backend = GraphBackend::new(context(&toolchain));
        let settings = QuizConfig::default();
        let assembler = UnitAssembler::new(&backend, &settings, Canvas::default());

        let mut question = question();
        question.answer_video = vec![segment("0:05", "0:15")];
        question.answer_audio = vec![segment("0:05", "0:15")];
        let answers = texts(&["Band", "Song"]);
        let sources = vec![PathBuf::from("short.mp4")];

        let stream = assembler
            .build(&unit(&question, UnitKind::Answer, &answers, &sources))
            .unwrap();
        assert_eq!(stream.info().duration, 7.0);

        let dir = tempdir().unwrap();
        stream.run(&dir.path().join("unit.mp4"), false).unwrap();
        let fc = toolchain.last_filter_complex().unwrap();
        assert!(fc.contains("fade=t=out:st=6:d=1"));
        assert!(!fc.contains("st=9"));
    }

    #[test]
    fn test_unknown_event_index_is_an_error() {
        let toolchain = Arc::new(FakeToolchain::new());
        let backend = GraphBackend::new(context(&toolchain));
        let settings = QuizConfig::default();
        let assembler = UnitAssembler::new(&backend, &settings, Canvas::default());

        let mut beeping = question();
        beeping.question_audio[0].beeps_events = vec![3];
        let mut labelled = question();
        labelled.answer_video[0].answer_label_events = vec![1];
        let answers = texts(&["Band"]);
        let sources = vec![PathBuf::from("abc.mp4")];

        let result = assembler.build(&unit(&beeping, UnitKind::Question, &answers, &sources));
        assert!(matches!(
            result.err(),
            Some(QuizError::Spec(SpecError::EventIndex { index: 3, count: 0, .. }))
        ));

        let result = assembler.build(&unit(&labelled, UnitKind::Answer, &answers, &sources));
        assert!(result.is_err());
    }

    #[test]
    fn test_clip_backend_builds_same_durations() {
        let toolchain = Arc::new(FakeToolchain::new());
        let backend = ClipBackend::new(context(&toolchain)).unwrap();
        let settings = QuizConfig::default();
        let assembler = UnitAssembler::new(&backend, &settings, Canvas::default());

        let question = question();
        let answers = texts(&["Band", "Song"]);
        let sources = vec![PathBuf::from("abc.mp4")];
        let dir = tempdir().unwrap();
        let path = assembler
            .render(&unit(&question, UnitKind::Answer, &answers, &sources), dir.path(), false)
            .unwrap();
        assert!(path.exists());
        assert!(toolchain.invocations().len() > 1);
    }
}
