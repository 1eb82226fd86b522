//! The acquisition loop.
//!
//! One thread of control runs FrameSource -> classifier -> StabilityBuffer ->
//! publisher at a fixed cadence. The loop owns recovery from stream
//! failures and guarantees the source and publisher are closed once on every
//! exit path, including unwinding.

use std::time::{Duration, Instant, SystemTime};

use anyhow::Result;

use crate::config::BridgeConfig;
use crate::detect::GestureClassifier;
use crate::gesture::{Gesture, GestureFilter};
use crate::ingest::{Acquired, FrameSource};
use crate::shutdown::StopSignal;
use crate::stability::StabilityBuffer;
use crate::transport::GesturePublisher;

pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 10;
pub const DEFAULT_READ_FAILURE_BACKOFF: Duration = Duration::from_millis(100);
const UNPACED_INTERVAL: Duration = Duration::from_millis(10);
const PROGRESS_EVERY_FRAMES: u64 = 20;
const PROGRESS_EVERY: Duration = Duration::from_secs(5);

/// Pause between frames for a target rate. `0` means "as fast as possible",
/// which still yields for 10 ms.
pub fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        UNPACED_INTERVAL
    } else {
        Duration::from_secs(1) / target_fps
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriverSettings {
    pub reconnect_delay: Duration,
    pub read_failure_backoff: Duration,
    pub max_consecutive_failures: u32,
    pub frame_interval: Duration,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            read_failure_backoff: DEFAULT_READ_FAILURE_BACKOFF,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            frame_interval: frame_interval(15),
        }
    }
}

impl DriverSettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            reconnect_delay: config.reconnect_delay,
            frame_interval: config.frame_interval(),
            ..Self::default()
        }
    }
}

/// Outcome of one loop iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Tick {
    /// The stop signal was raised; nothing was done.
    Stopped,
    /// The stream could not be opened.
    ConnectionFailed,
    /// No frame this time. `released` is set when the failure threshold was
    /// reached and the stream was closed.
    ReadFailed { consecutive: u32, released: bool },
    /// A frame went through the pipeline.
    Processed {
        detected: Option<Gesture>,
        confidence: f32,
        triggered: Option<Gesture>,
    },
}

impl Tick {
    /// How long the loop waits before the next iteration.
    pub fn pause(&self, settings: &DriverSettings) -> Duration {
        match self {
            Tick::Stopped => Duration::ZERO,
            Tick::ConnectionFailed => settings.reconnect_delay,
            Tick::ReadFailed { .. } => settings.read_failure_backoff,
            Tick::Processed { .. } => settings.frame_interval,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub frames_processed: u64,
    pub triggers: u64,
    pub publish_failures: u64,
    pub classification_errors: u64,
    pub connection_failures: u64,
    pub read_failures: u64,
    pub reconnects_forced: u64,
}

pub struct Driver<C: GestureClassifier, P: GesturePublisher> {
    source: FrameSource,
    classifier: C,
    stability: StabilityBuffer,
    filter: GestureFilter,
    publisher: P,
    settings: DriverSettings,
    stop: StopSignal,
    stats: DriverStats,
    consecutive_failures: u32,
    last_progress: Instant,
    closed: bool,
}

impl<C: GestureClassifier, P: GesturePublisher> Driver<C, P> {
    /// `publisher` is expected to be connected already.
    pub fn new(
        source: FrameSource,
        classifier: C,
        stability: StabilityBuffer,
        filter: GestureFilter,
        publisher: P,
        settings: DriverSettings,
        stop: StopSignal,
    ) -> Self {
        Self {
            source,
            classifier,
            stability,
            filter,
            publisher,
            settings,
            stop,
            stats: DriverStats::default(),
            consecutive_failures: 0,
            last_progress: Instant::now(),
            closed: false,
        }
    }

    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    pub fn source(&self) -> &FrameSource {
        &self.source
    }

    /// Run until the stop signal is raised, then close everything.
    pub fn run(&mut self) -> DriverStats {
        log::info!(
            "starting gesture loop on {} (classifier: {})",
            self.source.url(),
            self.classifier.name()
        );
        loop {
            let tick = self.tick();
            if tick == Tick::Stopped {
                break;
            }
            if tick == Tick::ConnectionFailed {
                log::warn!(
                    "stream unavailable, retrying in {:?}",
                    self.settings.reconnect_delay
                );
            }
            if !self.stop.sleep(tick.pause(&self.settings)) {
                break;
            }
        }
        if let Err(e) = self.shutdown() {
            log::warn!("shutdown failed: {:#}", e);
        }
        log::info!(
            "gesture loop stopped: {} frames, {} triggers, {} publish failures",
            self.stats.frames_processed,
            self.stats.triggers,
            self.stats.publish_failures
        );
        self.stats.clone()
    }

    /// One iteration, without the trailing pause.
    pub fn tick(&mut self) -> Tick {
        if self.stop.is_raised() {
            return Tick::Stopped;
        }
        if let Err(e) = self.publisher.maintain() {
            log::warn!("publisher maintenance failed: {:#}", e);
        }

        let attempts = self.source.stats().connect_attempts;
        let acquired = self.source.acquire();
        if self.source.stats().connect_attempts != attempts && self.source.is_connected() {
            // Fresh connection, earlier read failures belong to the old one.
            self.consecutive_failures = 0;
        }
        let frame = match acquired {
            Acquired::Frame(frame) => frame,
            Acquired::ConnectionFailed => {
                self.stats.connection_failures += 1;
                return Tick::ConnectionFailed;
            }
            Acquired::ReadFailed => return self.read_failed(),
        };
        self.consecutive_failures = 0;

        let classification = match self.classifier.classify(&frame) {
            Ok(classification) => classification,
            Err(e) => {
                self.stats.classification_errors += 1;
                log::warn!("gesture classification failed: {:#}", e);
                Default::default()
            }
        };
        let detected = self.filter.admit(classification.gesture_label());
        let confidence = if detected.is_some() {
            classification.confidence
        } else {
            0.0
        };
        if let Some(gesture) = detected {
            log::debug!("frame {}: {} ({:.2})", frame.sequence, gesture, confidence);
        }

        let triggered = self.stability.observe(detected, confidence);
        if let Some(gesture) = triggered {
            self.stats.triggers += 1;
            log::debug!("publishing {} ({:.2})", gesture, confidence);
            if let Err(e) = self.publisher.publish(gesture, confidence, SystemTime::now()) {
                self.stats.publish_failures += 1;
                log::warn!("failed to publish {}: {:#}", gesture, e);
            }
        }

        self.stats.frames_processed += 1;
        self.log_progress();
        Tick::Processed {
            detected,
            confidence,
            triggered,
        }
    }

    /// Close the source and the publisher. Idempotent.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.source.release();
        self.publisher.disconnect()
    }

    fn read_failed(&mut self) -> Tick {
        self.stats.read_failures += 1;
        self.consecutive_failures += 1;
        let consecutive = self.consecutive_failures;
        let released = consecutive >= self.settings.max_consecutive_failures;
        if released {
            log::warn!(
                "{} consecutive read failures, reconnecting stream",
                consecutive
            );
            self.source.release();
            self.stats.reconnects_forced += 1;
            self.consecutive_failures = 0;
        }
        Tick::ReadFailed {
            consecutive,
            released,
        }
    }

    fn log_progress(&mut self) {
        if self.stats.frames_processed % PROGRESS_EVERY_FRAMES != 0
            && self.last_progress.elapsed() < PROGRESS_EVERY
        {
            return;
        }
        self.last_progress = Instant::now();
        let source = self.source.stats();
        log::debug!(
            "processed {} frames ({} decoded, {} grabbed), {} triggers, stable: {}",
            self.stats.frames_processed,
            source.frames_decoded,
            source.frames_grabbed,
            self.stats.triggers,
            self.stability
                .current_stable()
                .map(|g| g.as_str())
                .unwrap_or("-")
        );
    }
}

impl<C: GestureClassifier, P: GesturePublisher> Drop for Driver<C, P> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("shutdown during drop failed: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_interval_from_fps() {
        assert_eq!(frame_interval(10), Duration::from_millis(100));
        assert_eq!(frame_interval(0), Duration::from_millis(10));
    }

    #[test]
    fn pauses_follow_tick_kind() {
        let settings = DriverSettings::default();
        assert_eq!(Tick::Stopped.pause(&settings), Duration::ZERO);
        assert_eq!(
            Tick::ConnectionFailed.pause(&settings),
            settings.reconnect_delay
        );
        assert_eq!(
            Tick::ReadFailed {
                consecutive: 1,
                released: false
            }
            .pause(&settings),
            Duration::from_millis(100)
        );
    }
}
