use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::frame::RawFrame;

/// Resize a packed RGB24 frame to `width x height` with bilinear filtering.
///
/// The frame is returned untouched when it already has the target size or
/// when either target dimension is 0 (resizing disabled).
pub(crate) fn resize_rgb(frame: RawFrame, width: u32, height: u32) -> Result<RawFrame> {
    let expected = (frame.width as usize)
        .checked_mul(frame.height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))?;
    if frame.pixels.len() != expected {
        return Err(anyhow!(
            "RGB frame length mismatch: expected {}, got {}",
            expected,
            frame.pixels.len()
        ));
    }

    if width == 0 || height == 0 || (frame.width == width && frame.height == height) {
        return Ok(frame);
    }

    let source = RgbImage::from_raw(frame.width, frame.height, frame.pixels)
        .ok_or_else(|| anyhow!("RGB buffer does not match its dimensions"))?;
    let resized = imageops::resize(&source, width, height, FilterType::Triangle);
    Ok(RawFrame::new(resized.into_raw(), width, height))
}
