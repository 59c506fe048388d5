//! # Source materialization
//!
//! Every source of a question ends up as a media file below
//! `{output}/sources`, named by [`Source::file_name`]. Files that are already
//! there are reused, so re-running a round only renders what is new.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{
    error::{Result, SpecError},
    quiz::types::{Source, SourceKind},
    stream::{layout::stacked_fractions, output::ensure_parent_dir, Backend, Canvas, TextPlacement},
};

/// Turns source entries into files on disk
pub struct SourceMaterializer<'a> {
    backend: &'a dyn Backend,
    input_dir: PathBuf,
    output_dir: PathBuf,
    canvas: Canvas,
}

impl<'a> SourceMaterializer<'a> {
    /// `input_dir` is the directory of the quiz file, `output_dir` the render root
    pub fn new(
        backend: &'a dyn Backend,
        input_dir: &Path,
        output_dir: &Path,
        canvas: Canvas,
    ) -> Self {
        Self {
            backend,
            input_dir: input_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            canvas,
        }
    }

    /// Path the source is (or will be) materialized at
    pub fn target_for(&self, source: &Source) -> PathBuf {
        self.output_dir.join(source.file_name())
    }

    /// Make sure the source exists on disk and return its path
    pub fn materialize(&self, source: &Source) -> Result<PathBuf> {
        let target = self.target_for(source);
        if target.exists() {
            debug!("Reusing {} source {:?}", source.kind.name(), target);
            return Ok(target);
        }

        match &source.kind {
            SourceKind::Youtube { .. } => Err(SpecError::MissingMedia {
                path: target.display().to_string(),
            }
            .into()),
            SourceKind::Local { .. } => self.copy_local(source, &target),
            SourceKind::Text { lines, duration } => self.render_text(lines, *duration, &target),
            SourceKind::Image { duration, .. } => {
                self.render_image(&source.identifier, *duration, &target)
            }
        }
    }

    /// Materialize every source of a question, in order
    pub fn materialize_all(&self, sources: &[Source]) -> Result<Vec<PathBuf>> {
        sources.iter().map(|source| self.materialize(source)).collect()
    }

    fn copy_local(&self, source: &Source, target: &Path) -> Result<PathBuf> {
        let origin = self.input_dir.join(source.file_name());
        if !origin.is_file() {
            return Err(SpecError::MissingMedia {
                path: origin.display().to_string(),
            }
            .into());
        }

        ensure_parent_dir(target)?;
        std::fs::copy(&origin, target)?;
        info!("Copied local source {:?} to {:?}", origin, target);
        Ok(target.to_path_buf())
    }

    fn render_text(&self, lines: &[String], duration: f64, target: &Path) -> Result<PathBuf> {
        let mut stream = self.backend.create_empty_stream(duration, self.canvas)?;
        for (line, fraction) in lines.iter().zip(stacked_fractions(lines.len())) {
            stream = stream.draw_text(line, TextPlacement::at(fraction))?;
        }

        info!("Rendering text card {:?} ({} lines)", target, lines.len());
        stream.run(target, false)
    }

    fn render_image(&self, identifier: &str, duration: f64, target: &Path) -> Result<PathBuf> {
        let image = self.input_dir.join(identifier);
        if !image.is_file() {
            return Err(SpecError::MissingMedia {
                path: image.display().to_string(),
            }
            .into());
        }

        info!("Rendering image card {:?} from {:?}", target, image);
        self.backend
            .create_single_image_stream(&image, duration, self.canvas)?
            .run(target, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{
        testing::{context, FakeToolchain},
        GraphBackend,
    };
    use std::sync::Arc;
    use tempfile::tempdir;

    fn source(json: &str) -> Source {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_missing_youtube_source_names_expected_path() {
        let toolchain = Arc::new(FakeToolchain::new());
        let backend = GraphBackend::new(context(&toolchain));
        let dir = tempdir().unwrap();
        let materializer = SourceMaterializer::new(&backend, dir.path(), dir.path(), Canvas::default());

        let err = materializer
            .materialize(&source(r#"{"source": "youtube", "identifier": "abc", "format": "mp4"}"#))
            .unwrap_err();
        assert!(err.to_string().contains("sources/abc.mp4"));
    }

    #[test]
    fn test_existing_source_is_reused() {
        let toolchain = Arc::new(FakeToolchain::new());
        let backend = GraphBackend::new(context(&toolchain));
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sources")).unwrap();
        std::fs::write(dir.path().join("sources/abc.mp4"), b"downloaded").unwrap();

        let materializer = SourceMaterializer::new(&backend, dir.path(), dir.path(), Canvas::default());
        let path = materializer
            .materialize(&source(r#"{"source": "youtube", "identifier": "abc", "format": "mp4"}"#))
            .unwrap();
        assert_eq!(path, dir.path().join("sources/abc.mp4"));
        assert!(toolchain.invocations().is_empty());
    }

    #[test]
    fn test_local_source_is_copied() {
        let toolchain = Arc::new(FakeToolchain::new());
        let backend = GraphBackend::new(context(&toolchain));
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        std::fs::create_dir_all(input.path().join("sources")).unwrap();
        std::fs::write(input.path().join("sources/song.mp3"), b"mp3 data").unwrap();

        let materializer = SourceMaterializer::new(&backend, input.path(), output.path(), Canvas::default());
        let path = materializer
            .materialize(&source(r#"{"source": "local", "identifier": "song", "format": "mp3"}"#))
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"mp3 data");
        assert!(input.path().join("sources/song.mp3").exists());

        let missing = materializer.materialize(&source(r#"{"source": "local", "identifier": "gone", "format": "mp4"}"#));
        assert!(missing.is_err());
    }

    #[test]
    fn test_text_card_draws_every_line() {
        let toolchain = Arc::new(FakeToolchain::new());
        let backend = GraphBackend::new(context(&toolchain));
        let dir = tempdir().unwrap();

        let materializer = SourceMaterializer::new(&backend, dir.path(), dir.path(), Canvas::default());
        let path = materializer
            .materialize(&source(
                r#"{"source": "text", "identifier": "intro", "text": ["Welcome", "to the quiz"], "duration": 5}"#,
            ))
            .unwrap();

        assert_eq!(path, dir.path().join("sources/intro_5.mp4"));
        assert!(path.exists());
        let fc = toolchain.last_filter_complex().unwrap();
        assert!(fc.contains("text=Welcome:"));
        assert!(fc.contains("text=to the quiz:"));
        assert!(fc.contains("color=c=black:s=1280x720:r=30:d=5"));
    }

    #[test]
    fn test_image_card() {
        let toolchain = Arc::new(FakeToolchain::new());
        let backend = GraphBackend::new(context(&toolchain));
        let dir = tempdir().unwrap();
        image::RgbImage::new(640, 480).save(dir.path().join("cover.png")).unwrap();

        let materializer = SourceMaterializer::new(&backend, dir.path(), dir.path(), Canvas::default());
        let path = materializer
            .materialize(&source(r#"{"source": "image", "identifier": "cover.png", "duration": 4}"#))
            .unwrap();
        assert_eq!(path, dir.path().join("sources/cover.png_4.mp4"));

        let args = &toolchain.invocations()[0];
        assert!(args.contains(&"-loop".to_string()));
        assert!(args.iter().any(|arg| arg.ends_with("cover.png")));
    }
}
