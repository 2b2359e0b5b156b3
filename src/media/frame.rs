use std::sync::Arc;

use crate::{
    foundation::core::{ClockInstant, FrameIndex, NodeId},
    foundation::error::{StageCheckError, StageCheckResult},
    media::color::ColorTag,
};

/// Decoded frame: straight (non-premultiplied) RGBA8, row-major, tightly packed.
///
/// The pixel buffer is shared and never mutated after construction.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub color: ColorTag,
    pub rgba8: Arc<Vec<u8>>,
}

impl Frame {
    pub fn new(width: u32, height: u32, color: ColorTag, rgba8: Vec<u8>) -> StageCheckResult<Self> {
        check_len(width, height, rgba8.len())?;
        Ok(Self {
            width,
            height,
            color,
            rgba8: Arc::new(rgba8),
        })
    }

    /// Frame filled with one straight-alpha RGBA8 color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4], color: ColorTag) -> Self {
        let px = width as usize * height as usize;
        let mut data = Vec::with_capacity(px * 4);
        for _ in 0..px {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            color,
            rgba8: Arc::new(data),
        }
    }

    /// Fails with `MediaDecode` when the buffer length does not match `width * height * 4`.
    pub fn check_buffer(&self) -> StageCheckResult<()> {
        check_len(self.width, self.height, self.rgba8.len())
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.rgba8.get(i..i + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Same pixels under a different color tag.
    pub fn with_color(&self, color: ColorTag) -> Self {
        Self {
            color,
            ..self.clone()
        }
    }
}

fn check_len(width: u32, height: u32, len: usize) -> StageCheckResult<()> {
    let expected = width as usize * height as usize * 4;
    if len != expected {
        return Err(StageCheckError::media_decode(
            format!("{width}x{height} buffer"),
            format!("expected {expected} bytes, got {len}"),
        ));
    }
    Ok(())
}

/// A frame captured from one node for one presentation timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSample {
    pub node: NodeId,
    pub timestamp: FrameIndex,
    /// When the node reports having presented the frame, on the common cluster clock.
    pub presented_at: ClockInstant,
    pub frame: Frame,
}

#[cfg(test)]
#[path = "../../tests/unit/media/frame.rs"]
mod tests;
