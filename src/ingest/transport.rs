use anyhow::Result;

use crate::frame::RawFrame;

/// Options a transport receives when it is opened.
#[derive(Clone, Debug)]
pub struct TransportOptions {
    /// Stream address (e.g. `rtsp://192.168.1.100:554/stream1` or `stub://cam`).
    pub url: String,
    /// Frame rate hint passed to the transport. 0 leaves the native rate.
    pub target_fps: u32,
}

/// Video transport trait.
///
/// A transport owns the connection to one stream and exposes the two
/// primitives the frame source needs to keep latency bounded:
/// - `grab` drops one already-buffered frame as cheaply as the backend allows
///   (no color conversion, no copy out)
/// - `retrieve` decodes and returns the next frame
///
/// Implementations must bound every blocking call with a timeout so that a
/// stalled stream cannot hold the driver loop indefinitely.
pub trait VideoTransport {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Open the stream with minimal internal buffering.
    fn open(&mut self, options: &TransportOptions) -> Result<()>;

    /// Whether the stream is currently open.
    fn is_open(&self) -> bool;

    /// Discard one buffered frame. Returns false when nothing was available.
    fn grab(&mut self) -> Result<bool>;

    /// Decode the next frame. `Ok(None)` means the stream produced no data.
    fn retrieve(&mut self) -> Result<Option<RawFrame>>;

    /// Close the stream. Must be idempotent.
    fn release(&mut self);
}
