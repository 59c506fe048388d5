//! # Quiz file loading
//!
//! A round file is JSON with two conveniences on top: lines starting with
//! `//` are comments, and any string value `"var:<name>"` inside a question is
//! replaced by that question's `variables[<name>]`. After parsing, the round
//! is checked for the mistakes that would otherwise only show up halfway
//! through a render.

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::{
    error::{Result, SpecError},
    quiz::types::{Question, QuizSpec, Segment},
};

const VARIABLE_MARKER: &str = "var:";

/// Tolerance when comparing audio and video runtimes
const DURATION_EPSILON: f64 = 1e-6;

/// Read, substitute, parse and validate a round file
pub fn load_quiz(path: &Path) -> Result<QuizSpec> {
    let content = std::fs::read_to_string(path).map_err(|e| SpecError::ParseFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let spec = parse_quiz(&content, &path.display().to_string())?;
    debug!(
        "Loaded round {} ({} questions) from {:?}",
        spec.round,
        spec.questions.len(),
        path
    );
    Ok(spec)
}

/// Parse and validate round file contents; `origin` names the file in errors
pub fn parse_quiz(content: &str, origin: &str) -> Result<QuizSpec> {
    let parse_failed = |reason: String| SpecError::ParseFailed {
        path: origin.to_string(),
        reason,
    };

    let mut value: Value = serde_json::from_str(&strip_comments(content))
        .map_err(|e| parse_failed(e.to_string()))?;
    substitute_variables(&mut value);
    let spec: QuizSpec = serde_json::from_value(value).map_err(|e| parse_failed(e.to_string()))?;

    validate(&spec)?;
    Ok(spec)
}

/// Drop every line whose first non-blank characters are `//`
pub fn strip_comments(content: &str) -> String {
    content
        .lines()
        .filter(|line| !line.trim_start().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace `var:<name>` strings in every question by its variable values
///
/// Unknown names are left untouched.
pub fn substitute_variables(root: &mut Value) {
    let questions = match root.get_mut("questions").and_then(Value::as_array_mut) {
        Some(questions) => questions,
        None => return,
    };

    for question in questions {
        let variables = match question.get("variables").and_then(Value::as_object) {
            Some(variables) => variables.clone(),
            None => continue,
        };
        if let Some(fields) = question.as_object_mut() {
            for (key, item) in fields.iter_mut() {
                if key != "variables" {
                    substitute_in(item, &variables);
                }
            }
        }
    }
}

fn substitute_in(item: &mut Value, variables: &serde_json::Map<String, Value>) {
    match item {
        Value::Array(items) => items.iter_mut().for_each(|item| substitute_in(item, variables)),
        Value::Object(fields) => fields
            .iter_mut()
            .filter(|(key, _)| key.as_str() != "variables")
            .for_each(|(_, item)| substitute_in(item, variables)),
        Value::String(text) => {
            let replacement = text
                .strip_prefix(VARIABLE_MARKER)
                .and_then(|name| variables.get(name))
                .cloned();
            if let Some(replacement) = replacement {
                *item = replacement;
            }
        }
        _ => {}
    }
}

/// Runtime of a segment list once repeated and crossfaded
pub fn effective_duration(segments: &[Segment]) -> f64 {
    segments
        .iter()
        .enumerate()
        .map(|(index, segment)| {
            let overlap = if index > 0 { segment.crossfade_duration } else { 0.0 };
            segment.duration() * repetition_factor(segment.repetitions) - overlap
        })
        .sum()
}

/// Number of `repeat()` calls for a repetition count; each call doubles the length
pub fn repeat_steps(repetitions: u32) -> u32 {
    if repetitions <= 1 {
        0
    } else {
        repetitions / 2
    }
}

/// Length multiplier of a repetition count
pub fn repetition_factor(repetitions: u32) -> f64 {
    2f64.powi(repeat_steps(repetitions) as i32)
}

/// Repetition counts must be 1 or even
pub fn check_repetitions(value: u32) -> Result<()> {
    if value == 1 || (value > 0 && value % 2 == 0) {
        Ok(())
    } else {
        Err(SpecError::InvalidRepetitions { value }.into())
    }
}

fn require_items<T>(items: &[T], location: &str, field: &str) -> Result<()> {
    if items.is_empty() {
        return Err(SpecError::EmptyField {
            location: location.to_string(),
            field: field.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Semantic checks the schema alone cannot express
pub fn validate(spec: &QuizSpec) -> Result<()> {
    require_items(&spec.questioned, "Round file", "questioned")?;
    require_items(&spec.questions, "Round file", "questions")?;

    for (index, question) in spec.questions.iter().enumerate() {
        validate_question(index + 1, question, &spec.questioned)?;
    }
    Ok(())
}

fn validate_question(number: usize, question: &Question, questioned: &[String]) -> Result<()> {
    let location = format!("Question {}", number);
    require_items(&question.sources, &location, "sources")?;
    require_items(&question.answers, &location, "answers")?;

    let lists = [
        ("question_video", &question.question_video),
        ("question_audio", &question.question_audio),
        ("answer_video", &question.answer_video),
        ("answer_audio", &question.answer_audio),
    ];
    for (field, segments) in lists {
        require_items(segments, &location, field)?;
        for segment in segments.iter() {
            validate_segment(number, question, segment)?;
        }
    }

    check_repetitions(question.repetitions)?;

    if question.answers.len() != question.answer_video.len() {
        return Err(SpecError::AnswerCountMismatch {
            question: number,
            expected: question.answer_video.len(),
            actual: question.answers.len(),
        }
        .into());
    }

    for (kind, video, audio) in [
        ("question", &question.question_video, &question.question_audio),
        ("answer", &question.answer_video, &question.answer_audio),
    ] {
        let video = effective_duration(video);
        let audio = effective_duration(audio);
        if (video - audio).abs() > DURATION_EPSILON {
            return Err(SpecError::DurationMismatch {
                question: number,
                kind: kind.to_string(),
                audio,
                video,
            }
            .into());
        }
    }

    let mut answers: Vec<String> = question
        .answers
        .iter()
        .flat_map(|answer| answer.keys().cloned())
        .collect();
    let mut expected = questioned.to_vec();
    answers.sort();
    expected.sort();
    if answers != expected {
        return Err(SpecError::QuestionedMismatch {
            question: number,
            answers,
            questioned: expected,
        }
        .into());
    }

    Ok(())
}

fn validate_segment(number: usize, question: &Question, segment: &Segment) -> Result<()> {
    if segment.source >= question.sources.len() {
        return Err(SpecError::SourceIndex {
            question: number,
            index: segment.source,
            count: question.sources.len(),
        }
        .into());
    }

    check_repetitions(segment.repetitions)?;

    let events = segment
        .beeps_events
        .iter()
        .map(|index| (*index, false))
        .chain(segment.answer_label_events.iter().map(|index| (*index, true)));
    for (index, is_label) in events {
        let event = question.events.get(index).ok_or(SpecError::EventIndex {
            question: number,
            index,
            count: question.events.len(),
        })?;
        if !segment.interval.contains(&event.interval) {
            return Err(SpecError::EventOutsideSegment { question: number, index }.into());
        }
        if is_label && event.text.is_none() {
            return Err(SpecError::MissingEventPayload {
                question: number,
                index,
                payload: "text".to_string(),
            }
            .into());
        }
    }
    Ok(())
}
