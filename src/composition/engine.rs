use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    composition::{
        combine::combine_videos,
        unit::{Unit, UnitAssembler},
    },
    config::Config,
    error::Result,
    quiz::{
        loader::load_quiz,
        sources::SourceMaterializer,
        types::{QuizSpec, UnitKind},
    },
    stream::{
        layout::stacked_fractions, output::output_path_for, Backend, BackendContext,
        BackendRegistry, RenderSettings, TextPlacement, Toolchain,
    },
};

/// Files produced for one round
#[derive(Debug, Clone, PartialEq)]
pub struct RoundOutputs {
    pub round_dir: PathBuf,
    pub questions: PathBuf,
    /// Absent when every answer was shown inside the question round
    pub answers: Option<PathBuf>,
}

/// Main engine that turns a quiz round into its question and answer videos
///
/// The engine follows a clear pipeline:
/// 1. Source materialization - every source ends up as a file in `{output}/sources`
/// 2. Title cards - one for the questions, one for the answers
/// 3. Units - a question and an answer video per question
/// 4. Combination - the units of each kind concatenated behind their title
pub struct QuizEngine {
    config: Config,
    backend: Box<dyn Backend>,
}

impl QuizEngine {
    /// Create an engine rendering on the given backend
    pub fn new(config: Config, backend: Box<dyn Backend>) -> Self {
        Self { config, backend }
    }

    /// Create an engine on the backend named in the configuration
    pub fn from_config(config: Config, toolchain: Arc<dyn Toolchain>) -> Result<Self> {
        let context = BackendContext::new(toolchain, RenderSettings::from(&config));
        let backend = BackendRegistry::new().create(&config.tools.backend, context)?;
        Ok(Self::new(config, backend))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Load a round file and render it below `output_dir`
    pub fn render_file(&self, quiz_file: &Path, output_dir: &Path) -> Result<RoundOutputs> {
        let spec = load_quiz(quiz_file)?;
        let input_dir = quiz_file.parent().unwrap_or_else(|| Path::new("."));
        self.render(&spec, input_dir, output_dir)
    }

    /// Render a loaded round; `input_dir` resolves local sources and images
    pub fn render(
        &self,
        spec: &QuizSpec,
        input_dir: &Path,
        output_dir: &Path,
    ) -> Result<RoundOutputs> {
        info!("🎬 Processing popquiz round {}", spec.round);
        info!("   Theme: {}", spec.theme);
        info!("   Questions: {}", spec.questions.len());
        info!("   Backend: {}", self.backend.name());

        let round_dir = output_dir.join(format!("{:02}", spec.round));
        std::fs::create_dir_all(&round_dir)?;

        // Pipeline Step 1: Sources
        let canvas = self.config.canvas();
        let materializer =
            SourceMaterializer::new(self.backend.as_ref(), input_dir, output_dir, canvas);
        let sources = spec
            .questions
            .iter()
            .map(|question| materializer.materialize_all(&question.sources))
            .collect::<Result<Vec<_>>>()?;

        // Pipeline Step 2: Title cards
        let theme = format!("\"{}\"", spec.theme);
        let question_title = self.render_title(
            spec,
            input_dir,
            &round_dir.join(format!("{:02}_questions_title.mp4", spec.round)),
            &[format!("Round {:02}", spec.round), theme.clone()],
        )?;
        let answer_title = self.render_title(
            spec,
            input_dir,
            &round_dir.join(format!("{:02}_answers_title.mp4", spec.round)),
            &[format!("Answers for round {:02}", spec.round), theme],
        )?;

        // Pipeline Step 3: Units
        let assembler = UnitAssembler::new(self.backend.as_ref(), &self.config.quiz, canvas);
        let mut question_videos = vec![question_title];
        let mut answer_videos = vec![answer_title];

        for (index, (question, sources)) in spec.questions.iter().zip(&sources).enumerate() {
            let number = index + usize::from(!spec.first_question_is_example);
            let is_example = spec.first_question_is_example && index == 0;
            let answer_texts = question.answer_texts(&spec.questioned);
            info!("❓ Processing question {}: {:?}", number, answer_texts);

            let render = |kind: UnitKind| {
                let unit = Unit {
                    round: spec.round,
                    number,
                    kind,
                    question,
                    answer_texts: &answer_texts,
                    sources,
                    spacer: spec.spacers.as_deref(),
                };
                assembler.render(&unit, &round_dir, spec.use_cached_video_files)
            };
            let question_video = render(UnitKind::Question)?;
            let answer_video = render(UnitKind::Answer)?;

            question_videos.push(question_video);
            if is_example {
                question_videos.push(answer_video);
            } else {
                answer_videos.push(answer_video);
            }
        }

        // Pipeline Step 4: Combination
        let questions = combine_videos(
            self.backend.as_ref(),
            &question_videos,
            UnitKind::Question,
            spec.round,
            output_dir,
            canvas,
        )?;
        let answers = if answer_videos.len() > 1 {
            Some(combine_videos(
                self.backend.as_ref(),
                &answer_videos,
                UnitKind::Answer,
                spec.round,
                output_dir,
                canvas,
            )?)
        } else {
            debug!("Round {} has no answers left for the answer video", spec.round);
            None
        };

        info!("🎉 Round {} complete! Questions: {:?}", spec.round, questions);
        Ok(RoundOutputs {
            round_dir,
            questions,
            answers,
        })
    }

    /// Title card over the background image (or black) with stacked lines
    fn render_title(
        &self,
        spec: &QuizSpec,
        input_dir: &Path,
        target: &Path,
        lines: &[String],
    ) -> Result<PathBuf> {
        let target = output_path_for(target);
        if spec.use_cached_video_files && target.exists() {
            debug!("Reusing cached title card {:?}", target);
            return Ok(target);
        }

        let duration = self.config.quiz.title_duration_s;
        let canvas = self.config.canvas();

        let mut stream = match &spec.background_image {
            Some(image) => self
                .backend
                .create_single_image_stream(&input_dir.join(image), duration, canvas)?,
            None => self.backend.create_empty_stream(duration, canvas)?,
        };
        for (line, fraction) in lines.iter().zip(stacked_fractions(lines.len())) {
            stream = stream.draw_text(line, TextPlacement::at(fraction))?;
        }

        debug!("Rendering title card {:?}", target);
        stream.run(&target, false)
    }
}
