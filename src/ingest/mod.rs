//! Frame ingestion.
//!
//! This module provides the latency-bounded `FrameSource` and the transports
//! it can sit on:
//! - Synthetic frames for `stub://` URLs (testing, demos)
//! - RTSP via GStreamer (feature: rtsp-gstreamer)
//! - RTSP via FFmpeg (feature: rtsp-ffmpeg)
//!
//! The ingestion layer is responsible for:
//! - Reconnecting on request, never on its own schedule
//! - Dropping buffered frames so the decoded frame is as fresh as possible
//! - Resizing to the classifier input size
//!
//! The ingestion layer MUST NOT:
//! - Store frames to disk
//! - Log pixel content

mod resize;
pub mod source;
pub mod synthetic;
mod transport;

#[cfg(feature = "rtsp-ffmpeg")]
pub mod rtsp_ffmpeg;
#[cfg(feature = "rtsp-gstreamer")]
pub mod rtsp_gstreamer;

use anyhow::Result;

pub use source::{
    Acquired, ConnectionState, FrameSource, SourceConfig, SourceStats, BACKLOG_DROP_FRAMES,
};
pub use synthetic::SyntheticTransport;
pub use transport::{TransportOptions, VideoTransport};

/// Pick the transport for a stream URL.
///
/// `stub://` is always synthetic. Anything else uses GStreamer when compiled
/// in, falling back to FFmpeg.
pub fn transport_for_url(url: &str) -> Result<Box<dyn VideoTransport>> {
    if url.starts_with("stub://") {
        return Ok(Box::new(SyntheticTransport::new()));
    }
    #[cfg(feature = "rtsp-gstreamer")]
    {
        Ok(Box::new(rtsp_gstreamer::GstreamerTransport::new()?))
    }
    #[cfg(all(not(feature = "rtsp-gstreamer"), feature = "rtsp-ffmpeg"))]
    {
        Ok(Box::new(rtsp_ffmpeg::FfmpegTransport::new()?))
    }
    #[cfg(not(any(feature = "rtsp-gstreamer", feature = "rtsp-ffmpeg")))]
    {
        anyhow::bail!(
            "stream {} requires the rtsp-gstreamer or rtsp-ffmpeg feature",
            url
        )
    }
}
