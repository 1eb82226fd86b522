//! Synthetic transport for `stub://` URLs.
//!
//! Produces a moving gradient at a fixed native resolution so the whole
//! pipeline (skip, resize, classify, publish) can run without a camera.

use anyhow::{anyhow, Result};

use super::transport::{TransportOptions, VideoTransport};
use crate::frame::RawFrame;

pub const SYNTHETIC_WIDTH: u32 = 640;
pub const SYNTHETIC_HEIGHT: u32 = 480;

pub struct SyntheticTransport {
    url: Option<String>,
    frame_count: u64,
    width: u32,
    height: u32,
}

impl SyntheticTransport {
    pub fn new() -> Self {
        Self::with_size(SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT)
    }

    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            url: None,
            frame_count: 0,
            width,
            height,
        }
    }

    /// Frames generated so far, grabbed or retrieved.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let pixel_count = (self.width * self.height * 3) as usize;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 / 3 + self.frame_count) % 256) as u8;
        }
        pixels
    }
}

impl Default for SyntheticTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoTransport for SyntheticTransport {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn open(&mut self, options: &TransportOptions) -> Result<()> {
        if !options.url.starts_with("stub://") {
            return Err(anyhow!(
                "synthetic transport only serves stub:// URLs, got {}",
                options.url
            ));
        }
        self.url = Some(options.url.clone());
        log::info!("synthetic stream opened: {}", options.url);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.url.is_some()
    }

    fn grab(&mut self) -> Result<bool> {
        if !self.is_open() {
            return Ok(false);
        }
        self.frame_count += 1;
        Ok(true)
    }

    fn retrieve(&mut self) -> Result<Option<RawFrame>> {
        if !self.is_open() {
            return Ok(None);
        }
        self.frame_count += 1;
        Ok(Some(RawFrame::new(
            self.generate_pixels(),
            self.width,
            self.height,
        )))
    }

    fn release(&mut self) {
        if let Some(url) = self.url.take() {
            log::info!("synthetic stream released: {}", url);
        }
    }
}
