//! Staging of rendered files: every render goes to a temporary directory
//! beside its target and is renamed into place only once ffmpeg succeeded.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::{
    error::{RenderError, Result},
    stream::traits::RenderSettings,
};

/// Target file a render of `file_name` actually produces
///
/// Audio-only extensions are rendered as video, so `.mp3`/`.wav` map to `.mp4`.
pub fn output_path_for(file_name: &Path) -> PathBuf {
    let audio_only = file_name
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("mp3") || ext.eq_ignore_ascii_case("wav"));

    if audio_only {
        file_name.with_extension("mp4")
    } else {
        file_name.to_path_buf()
    }
}

/// Create the parent directory of `path` if needed
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Encoder options of a final render
pub fn encoding_args(settings: &RenderSettings, has_video: bool, has_audio: bool) -> Vec<String> {
    let mut args = Vec::new();
    if has_video {
        args.extend([
            "-c:v".to_string(),
            settings.codec.clone(),
            "-preset".to_string(),
            settings.preset.clone(),
            "-crf".to_string(),
            settings.crf.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
        ]);
    } else {
        args.push("-vn".to_string());
    }
    if has_audio {
        args.extend([
            "-c:a".to_string(),
            settings.audio_codec.clone(),
            "-b:a".to_string(),
            settings.audio_bitrate.clone(),
            "-ar".to_string(),
            settings.sample_rate.to_string(),
        ]);
    } else {
        args.push("-an".to_string());
    }
    args
}

/// A staged render that only shows up at its target after [`publish`](Self::publish)
///
/// Dropping it without publishing removes the staged file.
#[derive(Debug)]
pub struct ScopedOutput {
    dir: TempDir,
    staged: PathBuf,
    target: PathBuf,
}

impl ScopedOutput {
    pub fn new(target: &Path) -> Result<Self> {
        ensure_parent_dir(target)?;
        let parent = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let dir = tempfile::Builder::new().prefix(".popquiz-").tempdir_in(&parent)?;
        let file_name = target
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("render.mp4"));
        let staged = dir.path().join(file_name);

        Ok(Self {
            dir,
            staged,
            target: target.to_path_buf(),
        })
    }

    /// Where ffmpeg should write
    pub fn staged_path(&self) -> &Path {
        &self.staged
    }

    /// Move the staged file onto the target
    pub fn publish(self) -> Result<PathBuf> {
        std::fs::rename(&self.staged, &self.target).map_err(|e| RenderError::PublishFailed {
            path: self.target.display().to_string(),
            reason: e.to_string(),
        })?;
        debug!("Published {:?} (staged in {:?})", self.target, self.dir.path());
        Ok(self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_audio_targets_render_as_video() {
        assert_eq!(output_path_for(Path::new("out/a.mp3")), PathBuf::from("out/a.mp4"));
        assert_eq!(output_path_for(Path::new("out/a.WAV")), PathBuf::from("out/a.mp4"));
        assert_eq!(output_path_for(Path::new("out/a.mkv")), PathBuf::from("out/a.mkv"));
    }

    #[test]
    fn test_encoding_args_follow_channels() {
        let settings = RenderSettings::default();
        let both = encoding_args(&settings, true, true);
        assert!(both.windows(2).any(|pair| pair == ["-c:v", "libx264"]));
        assert!(both.windows(2).any(|pair| pair == ["-crf", "20"]));
        assert!(both.windows(2).any(|pair| pair == ["-c:a", "aac"]));

        let silent = encoding_args(&settings, true, false);
        assert_eq!(silent.last().map(String::as_str), Some("-an"));
    }

    #[test]
    fn test_publish_moves_into_place() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested").join("01_01_question.mp4");

        let output = ScopedOutput::new(&target).unwrap();
        assert_eq!(output.staged_path().parent().unwrap().parent().unwrap(), target.parent().unwrap());
        std::fs::write(output.staged_path(), b"frames").unwrap();

        let published = output.publish().unwrap();
        assert_eq!(published, target);
        assert_eq!(std::fs::read(&target).unwrap(), b"frames");
    }

    #[test]
    fn test_unpublished_output_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("unit.mp4");
        {
            let output = ScopedOutput::new(&target).unwrap();
            std::fs::write(output.staged_path(), b"partial").unwrap();
        }
        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_publish_without_render_fails() {
        let dir = tempdir().unwrap();
        let output = ScopedOutput::new(&dir.path().join("unit.mp4")).unwrap();
        assert!(output.publish().is_err());
    }
}
