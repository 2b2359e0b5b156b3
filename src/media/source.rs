use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    foundation::core::{Fps, FrameIndex, FrameRange},
    foundation::error::{StageCheckError, StageCheckResult},
    media::{
        color::ColorTag,
        decode::decode_image_file,
        frame::Frame,
    },
};

const SEQUENCE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp", "exr"];

/// Reference media as described in a run manifest.
///
/// Paths are relative to the media root passed to [`open_media`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaHandle {
    /// A single image held for `frames` frames.
    Still {
        path: PathBuf,
        frames: u64,
        fps: Fps,
        #[serde(default)]
        color: ColorTag,
    },
    /// A directory of images, one per frame, ordered by file name.
    Sequence {
        dir: PathBuf,
        fps: Fps,
        #[serde(default)]
        color: ColorTag,
    },
    /// Synthetic solid-color pattern.
    Solid {
        width: u32,
        height: u32,
        rgba: [u8; 4],
        frames: u64,
        fps: Fps,
        #[serde(default)]
        color: ColorTag,
    },
}

impl MediaHandle {
    pub fn describe(&self) -> String {
        match self {
            Self::Still { path, .. } => path.display().to_string(),
            Self::Sequence { dir, .. } => format!("{}/*", dir.display()),
            Self::Solid {
                width,
                height,
                rgba,
                ..
            } => format!("solid {width}x{height} {rgba:?}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub fps: Fps,
    pub frame_count: u64,
    pub color: ColorTag,
}

impl MediaInfo {
    pub fn range(&self) -> FrameRange {
        FrameRange {
            start: FrameIndex(0),
            end: FrameIndex(self.frame_count),
        }
    }
}

/// Random-access source of decoded reference frames.
///
/// `frame_at` must be deterministic: the same timestamp always yields the same pixels.
pub trait FrameSource: Send + Sync {
    fn info(&self) -> &MediaInfo;

    fn frame_at(&self, timestamp: FrameIndex) -> StageCheckResult<Frame>;
}

impl dyn FrameSource + '_ {
    /// Lazy cursor over `range`.
    pub fn frames(&self, range: FrameRange) -> FrameCursor<'_> {
        FrameCursor::new(self, range)
    }
}

fn check_range(media: &str, info: &MediaInfo, timestamp: FrameIndex) -> StageCheckResult<()> {
    if !info.range().contains(timestamp) {
        return Err(StageCheckError::media_decode(
            media,
            format!(
                "frame {} out of range [0, {})",
                timestamp.0, info.frame_count
            ),
        ));
    }
    Ok(())
}

/// Resolve a handle against `root` and open it.
///
/// Resolvability is checked eagerly: missing files, empty directories and undecodable stills fail
/// here rather than on the first `frame_at`.
pub fn open_media(handle: &MediaHandle, root: &Path) -> StageCheckResult<Box<dyn FrameSource>> {
    match handle {
        MediaHandle::Still {
            path,
            frames,
            fps,
            color,
        } => Ok(Box::new(StillImageSource::open(
            &root.join(path),
            *frames,
            *fps,
            color.clone(),
        )?)),
        MediaHandle::Sequence { dir, fps, color } => Ok(Box::new(ImageSequenceSource::open(
            &root.join(dir),
            *fps,
            color.clone(),
        )?)),
        MediaHandle::Solid {
            width,
            height,
            rgba,
            frames,
            fps,
            color,
        } => Ok(Box::new(SolidColorSource::new(
            *width,
            *height,
            *rgba,
            *frames,
            *fps,
            color.clone(),
        )?)),
    }
}

pub struct StillImageSource {
    path: PathBuf,
    info: MediaInfo,
    frame: Frame,
}

impl StillImageSource {
    pub fn open(path: &Path, frames: u64, fps: Fps, color: ColorTag) -> StageCheckResult<Self> {
        if frames == 0 {
            return Err(StageCheckError::media_decode(
                path.display().to_string(),
                "still image must cover at least one frame",
            ));
        }
        let frame = decode_image_file(path, color.clone())?;
        Ok(Self {
            path: path.to_path_buf(),
            info: MediaInfo {
                width: frame.width,
                height: frame.height,
                fps,
                frame_count: frames,
                color,
            },
            frame,
        })
    }
}

impl FrameSource for StillImageSource {
    fn info(&self) -> &MediaInfo {
        &self.info
    }

    fn frame_at(&self, timestamp: FrameIndex) -> StageCheckResult<Frame> {
        check_range(&self.path.display().to_string(), &self.info, timestamp)?;
        Ok(self.frame.clone())
    }
}

pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    info: MediaInfo,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path, fps: Fps, color: ColorTag) -> StageCheckResult<Self> {
        let media = format!("{}/*", dir.display());
        let entries = std::fs::read_dir(dir)
            .map_err(|e| StageCheckError::media_decode(&media, e.to_string()))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| StageCheckError::media_decode(&media, e.to_string()))?
                .path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| SEQUENCE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image && path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        let first = files
            .first()
            .ok_or_else(|| StageCheckError::media_decode(&media, "no image files in sequence"))?;
        let probe = decode_image_file(first, color.clone())?;

        Ok(Self {
            dir: dir.to_path_buf(),
            info: MediaInfo {
                width: probe.width,
                height: probe.height,
                fps,
                frame_count: files.len() as u64,
                color,
            },
            files,
        })
    }
}

impl FrameSource for ImageSequenceSource {
    fn info(&self) -> &MediaInfo {
        &self.info
    }

    fn frame_at(&self, timestamp: FrameIndex) -> StageCheckResult<Frame> {
        let media = format!("{}/*", self.dir.display());
        check_range(&media, &self.info, timestamp)?;
        let path = &self.files[timestamp.0 as usize];
        let frame = decode_image_file(path, self.info.color.clone())?;
        if frame.dimensions() != (self.info.width, self.info.height) {
            return Err(StageCheckError::media_decode(
                path.display().to_string(),
                format!(
                    "sequence frame is {}x{}, sequence is {}x{}",
                    frame.width, frame.height, self.info.width, self.info.height
                ),
            ));
        }
        Ok(frame)
    }
}

pub struct SolidColorSource {
    info: MediaInfo,
    frame: Frame,
}

impl SolidColorSource {
    pub fn new(
        width: u32,
        height: u32,
        rgba: [u8; 4],
        frames: u64,
        fps: Fps,
        color: ColorTag,
    ) -> StageCheckResult<Self> {
        if width == 0 || height == 0 || frames == 0 {
            return Err(StageCheckError::media_decode(
                format!("solid {width}x{height}"),
                "solid media must have non-zero size and duration",
            ));
        }
        Ok(Self {
            info: MediaInfo {
                width,
                height,
                fps,
                frame_count: frames,
                color: color.clone(),
            },
            frame: Frame::solid(width, height, rgba, color),
        })
    }
}

impl FrameSource for SolidColorSource {
    fn info(&self) -> &MediaInfo {
        &self.info
    }

    fn frame_at(&self, timestamp: FrameIndex) -> StageCheckResult<Frame> {
        check_range("solid", &self.info, timestamp)?;
        Ok(self.frame.clone())
    }
}

/// Lazy, finite, restartable cursor over a frame range of a [`FrameSource`].
///
/// Frames are decoded on `next`. Seeking only moves the position.
pub struct FrameCursor<'a> {
    source: &'a dyn FrameSource,
    range: FrameRange,
    pos: u64,
}

impl<'a> FrameCursor<'a> {
    pub fn new(source: &'a dyn FrameSource, range: FrameRange) -> Self {
        Self {
            source,
            range,
            pos: range.start.0,
        }
    }

    /// Cursor over every frame of the source.
    pub fn all(source: &'a dyn FrameSource) -> Self {
        let range = source.info().range();
        Self::new(source, range)
    }

    pub fn position(&self) -> FrameIndex {
        FrameIndex(self.pos)
    }

    /// Move to `timestamp`; seeking to the range end leaves the cursor exhausted.
    pub fn seek(&mut self, timestamp: FrameIndex) -> StageCheckResult<()> {
        if timestamp.0 < self.range.start.0 || timestamp.0 > self.range.end.0 {
            return Err(StageCheckError::media_decode(
                "cursor",
                format!(
                    "seek to frame {} outside [{}, {}]",
                    timestamp.0, self.range.start.0, self.range.end.0
                ),
            ));
        }
        self.pos = timestamp.0;
        Ok(())
    }

    pub fn rewind(&mut self) {
        self.pos = self.range.start.0;
    }
}

impl Iterator for FrameCursor<'_> {
    type Item = StageCheckResult<(FrameIndex, Frame)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.range.end.0 {
            return None;
        }
        let ts = FrameIndex(self.pos);
        self.pos += 1;
        Some(self.source.frame_at(ts).map(|f| (ts, f)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.range.end.0.saturating_sub(self.pos) as usize;
        (n, Some(n))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/media/source.rs"]
mod tests;
