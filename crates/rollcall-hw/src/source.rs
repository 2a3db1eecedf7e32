//! Frame sources: anything that yields grayscale frames in order.

use crate::camera::CameraError;
use crate::frame::Frame;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("camera: {0}")]
    Camera(#[from] CameraError),
    #[error("failed to read {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no images found in {0}")]
    Empty(PathBuf),
}

/// A stream of frames. `Ok(None)` signals a clean end of stream.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        (**self).next_frame()
    }
}

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "webp", "tiff"];

/// Replays still images as frames, one per file.
pub struct ImageSource {
    paths: std::vec::IntoIter<PathBuf>,
    sequence: u32,
}

impl ImageSource {
    pub fn from_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            paths: paths.into_iter(),
            sequence: 0,
        }
    }

    /// Every image file in `dir`, sorted by file name.
    pub fn from_dir(dir: &Path) -> Result<Self, SourceError> {
        let io_err = |source| SourceError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if path.is_file() && is_image {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Err(SourceError::Empty(dir.to_path_buf()));
        }
        paths.sort();
        tracing::info!(dir = %dir.display(), count = paths.len(), "replaying images");
        Ok(Self::from_paths(paths))
    }

    /// A file yields itself; a directory yields its images.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        if path.is_dir() {
            Self::from_dir(path)
        } else {
            Ok(Self::from_paths(vec![path.to_path_buf()]))
        }
    }
}

impl FrameSource for ImageSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(path) = self.paths.next() else {
            return Ok(None);
        };
        let img = image::open(&path).map_err(|source| SourceError::Image {
            path: path.clone(),
            source,
        })?;
        let frame = Frame::from_image(&img, self.sequence);
        self.sequence += 1;
        tracing::debug!(path = %path.display(), width = frame.width, height = frame.height, "loaded image frame");
        Ok(Some(frame))
    }
}
