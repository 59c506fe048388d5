//! Concatenation of rendered units into one round video.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::{
    error::{QuizError, Result},
    quiz::types::UnitKind,
    stream::{Backend, Canvas, Channels, CombineOptions},
};

/// `{round:02}_{kind}.{ext}`, taking the extension of the first video
pub fn combined_file_name(round: u32, kind: UnitKind, first: &Path) -> String {
    let extension = first
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("mp4");
    format!("{:02}_{}.{}", round, kind, extension)
}

/// Open every video with both channels and append them in order
pub fn combine_videos(
    backend: &dyn Backend,
    videos: &[PathBuf],
    kind: UnitKind,
    round: u32,
    output_dir: &Path,
    canvas: Canvas,
) -> Result<PathBuf> {
    let (first, rest) = videos
        .split_first()
        .ok_or_else(|| {
            QuizError::generic(format!("No {} videos to combine for round {}", kind, round))
        })?;

    let mut stream = backend.open(first, Channels::Both, canvas)?;
    for video in rest {
        let next = backend.open(video, Channels::Both, canvas)?;
        stream = stream.combine(next, CombineOptions::default())?;
    }

    let target = output_dir.join(combined_file_name(round, kind, first));
    info!(
        "🔗 Combining {} {} videos into {:?} ({:.1}s)",
        videos.len(),
        kind,
        target,
        stream.info().duration
    );
    stream.run(&target, false)
}
