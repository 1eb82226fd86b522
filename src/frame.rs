//! Decoded video frames.
//!
//! - `RawFrame`: what a transport hands back, at native stream resolution.
//! - `Frame`: what the classifier sees, resized to the configured size.
//!
//! Frames live for a single loop iteration and are never buffered beyond it.

/// Packed RGB24 pixels straight out of a transport.
#[derive(Clone, Debug)]
pub struct RawFrame {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl RawFrame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            pixels,
            width,
            height,
        }
    }
}

/// Packed RGB24 frame ready for classification.
pub struct Frame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Sequence number of this frame among all frames decoded by the source.
    pub sequence: u64,
}

impl Frame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            pixels,
            width,
            height,
            sequence,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Pixel content is never logged.
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposes_packed_pixels() {
        let frame = Frame::new(vec![1, 2, 3, 4, 5, 6], 2, 1, 0);
        assert_eq!(frame.pixels(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!((frame.width, frame.height), (2, 1));
    }

    #[test]
    fn debug_output_omits_pixels() {
        let frame = Frame::new(vec![42; 12], 2, 2, 7);
        let rendered = format!("{:?}", frame);
        assert!(rendered.contains("sequence: 7"));
        assert!(!rendered.contains("42"));
    }
}
