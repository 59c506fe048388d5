use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::Result;

/// Directory holding every intermediate clip of one backend
///
/// Removed as a whole once the backend and all of its streams are gone.
#[derive(Debug)]
pub struct Scratch {
    dir: TempDir,
    counter: AtomicUsize,
}

impl Scratch {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("popquiz-clips-").tempdir()?;
        debug!("Intermediate clips go to {:?}", dir.path());
        Ok(Self {
            dir,
            counter: AtomicUsize::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Reserve the file name of the next intermediate clip
    pub fn next_clip(&self) -> ClipHandle {
        let index = self.counter.fetch_add(1, Ordering::Relaxed);
        ClipHandle {
            path: self.dir.path().join(format!("clip_{:04}.mkv", index)),
        }
    }
}

/// One intermediate clip file a stream depends on
#[derive(Debug, PartialEq, Eq)]
pub struct ClipHandle {
    path: PathBuf,
}

impl ClipHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn release(self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// All intermediate clips behind a stream
///
/// Released after the final render, or when the stream is dropped without
/// ever being rendered.
#[derive(Debug, Default)]
pub struct HandleSet {
    handles: Vec<ClipHandle>,
}

impl HandleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, handle: ClipHandle) {
        self.handles.push(handle);
    }

    /// Take over the handles of a stream that was merged into this one
    pub fn merge(&mut self, mut other: HandleSet) {
        self.handles.append(&mut other.handles);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.handles.iter().map(|handle| handle.path.clone()).collect()
    }

    /// Delete every tracked clip; failures are logged, never returned
    pub fn release(&mut self) -> usize {
        let mut released = 0;
        for handle in self.handles.drain(..) {
            let path = handle.path.clone();
            match handle.release() {
                Ok(()) => released += 1,
                Err(e) => warn!("Failed to remove intermediate clip {:?}: {}", path, e),
            }
        }
        released
    }
}

impl Drop for HandleSet {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            debug!("Releasing {} clips of an unrendered stream", self.handles.len());
            self.release();
        }
    }
}
