use std::path::Path;

use anyhow::Context;

use crate::{
    foundation::error::{StageCheckError, StageCheckResult},
    media::{color::ColorTag, frame::Frame},
};

/// Decode encoded image bytes into a straight RGBA8 [`Frame`].
pub fn decode_image(bytes: &[u8], color: ColorTag) -> StageCheckResult<Frame> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Frame::new(width, height, color, rgba.into_raw())
}

/// Read and decode an image file, mapping every failure to `MediaDecode`.
pub fn decode_image_file(path: &Path, color: ColorTag) -> StageCheckResult<Frame> {
    let bytes = std::fs::read(path)
        .map_err(|e| StageCheckError::media_decode(path.display().to_string(), e.to_string()))?;
    decode_image(&bytes, color).map_err(|e| match e {
        StageCheckError::Other(inner) => {
            StageCheckError::media_decode(path.display().to_string(), format!("{inner:#}"))
        }
        other => other,
    })
}

#[cfg(test)]
#[path = "../../tests/unit/media/decode.rs"]
mod tests;
