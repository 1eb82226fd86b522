//! Latency-bounded frame source.
//!
//! `FrameSource` wraps a `VideoTransport` and is responsible for:
//! - Connecting (and reconnecting) to the stream
//! - Dropping the transport's backlog before every decode
//! - Decimating by `skip_frames`
//! - Resizing frames to the configured classifier input size
//!
//! It never sleeps and never retries on its own. Connection and read failures
//! are reported as distinct outcomes so the driver can apply its own backoff
//! and consecutive-failure policy.

use anyhow::{anyhow, Result};

use super::resize::resize_rgb;
use super::transport::{TransportOptions, VideoTransport};
use crate::frame::Frame;

/// Frames dropped from the transport buffer before every decode.
pub const BACKLOG_DROP_FRAMES: u32 = 3;

/// Configuration for a frame source.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Stream address (e.g. "rtsp://192.168.1.100:554/stream1", "stub://cam").
    pub url: String,
    /// Frame rate hint for the transport.
    pub target_fps: u32,
    /// Output width. 0 disables resizing.
    pub width: u32,
    /// Output height. 0 disables resizing.
    pub height: u32,
    /// Decode one frame out of every `skip_frames` (>= 1).
    pub skip_frames: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://gesture_camera".to_string(),
            target_fps: 15,
            width: 320,
            height: 240,
            skip_frames: 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Result of one `acquire` call.
#[derive(Debug)]
pub enum Acquired {
    Frame(Frame),
    /// The stream could not be opened. The caller should wait before retrying.
    ConnectionFailed,
    /// Connected, but no frame could be decoded this time.
    ReadFailed,
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub connect_attempts: u64,
    pub frames_grabbed: u64,
    pub frames_decoded: u64,
    pub read_failures: u64,
}

pub struct FrameSource {
    config: SourceConfig,
    transport: Box<dyn VideoTransport>,
    state: ConnectionState,
    stats: SourceStats,
}

impl FrameSource {
    pub fn new(config: SourceConfig, transport: Box<dyn VideoTransport>) -> Result<Self> {
        if config.skip_frames == 0 {
            return Err(anyhow!("skip_frames must be at least 1"));
        }
        Ok(Self {
            config,
            transport,
            state: ConnectionState::Disconnected,
            stats: SourceStats::default(),
        })
    }

    /// Build a source with the transport that serves `config.url`.
    pub fn for_url(config: SourceConfig) -> Result<Self> {
        let transport = super::transport_for_url(&config.url)?;
        Self::new(config, transport)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && self.transport.is_open()
    }

    pub fn stats(&self) -> &SourceStats {
        &self.stats
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Open the stream. Never fails loudly: errors are logged and reported as
    /// `false`, leaving the source `Disconnected`.
    pub fn connect(&mut self) -> bool {
        if self.state == ConnectionState::Connected {
            self.transport.release();
        }
        self.state = ConnectionState::Connecting;
        self.stats.connect_attempts += 1;
        log::info!(
            "connecting to stream {} via {}",
            self.config.url,
            self.transport.name()
        );

        let options = TransportOptions {
            url: self.config.url.clone(),
            target_fps: self.config.target_fps,
        };
        match self.transport.open(&options) {
            Ok(()) if self.transport.is_open() => {
                self.state = ConnectionState::Connected;
                log::info!("connected to stream (low latency mode)");
                true
            }
            Ok(()) => {
                self.transport.release();
                self.state = ConnectionState::Disconnected;
                log::error!("stream {} did not open", self.config.url);
                false
            }
            Err(e) => {
                self.transport.release();
                self.state = ConnectionState::Disconnected;
                log::error!("failed to connect to stream {}: {:#}", self.config.url, e);
                false
            }
        }
    }

    /// Deliver the most recent frame the transport can offer.
    pub fn acquire(&mut self) -> Acquired {
        if !self.is_connected() && !self.connect() {
            return Acquired::ConnectionFailed;
        }

        let drops = BACKLOG_DROP_FRAMES + self.config.skip_frames.saturating_sub(1);
        for _ in 0..drops {
            match self.transport.grab() {
                Ok(true) => self.stats.frames_grabbed += 1,
                Ok(false) => break,
                Err(e) => {
                    log::debug!("grab failed: {:#}", e);
                    return self.read_failed();
                }
            }
        }

        let raw = match self.transport.retrieve() {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                log::debug!("stream produced no frame");
                return self.read_failed();
            }
            Err(e) => {
                log::debug!("frame decode failed: {:#}", e);
                return self.read_failed();
            }
        };

        match resize_rgb(raw, self.config.width, self.config.height) {
            Ok(resized) => {
                self.stats.frames_decoded += 1;
                Acquired::Frame(Frame::new(
                    resized.pixels,
                    resized.width,
                    resized.height,
                    self.stats.frames_decoded,
                ))
            }
            Err(e) => {
                log::warn!("dropping malformed frame: {:#}", e);
                self.read_failed()
            }
        }
    }

    /// Close the stream. The next `acquire` reconnects.
    pub fn release(&mut self) {
        if self.state != ConnectionState::Disconnected {
            log::info!("releasing stream {}", self.config.url);
        }
        self.transport.release();
        self.state = ConnectionState::Disconnected;
    }

    fn read_failed(&mut self) -> Acquired {
        self.stats.read_failures += 1;
        Acquired::ReadFailed
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.transport.release();
    }
}
