//! Debounce / cooldown state machine.
//!
//! `StabilityBuffer` turns a noisy per-frame stream of gesture detections into
//! a sparse stream of triggers. A gesture triggers when:
//! - it has been detected on `min_detections` consecutive frames, each at or
//!   above `confidence_threshold`, and
//! - it has not triggered within the last `cooldown`.
//!
//! Any absent or low-confidence frame, and any change of gesture, forgets the
//! current run immediately. There is no grace period: switching gestures is
//! favoured over smoothing across a change.
//!
//! The buffer is driven serially, once per frame, in arrival order.

use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::gesture::Gesture;

pub const DEFAULT_MIN_DETECTIONS: usize = 2;
pub const DEFAULT_COOLDOWN_SECS: f64 = 1.5;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Construction-time parameters for a `StabilityBuffer`.
#[derive(Clone, Debug, PartialEq)]
pub struct StabilitySettings {
    /// Consecutive confident detections required before a gesture is stable.
    pub min_detections: usize,
    /// Minimum time between two triggers of the same gesture.
    pub cooldown: Duration,
    /// Detections below this confidence count as "no gesture".
    pub confidence_threshold: f32,
    /// Upper bound on retained detections. Bounds memory only.
    pub history_capacity: usize,
}

impl Default for StabilitySettings {
    fn default() -> Self {
        Self {
            min_detections: DEFAULT_MIN_DETECTIONS,
            cooldown: Duration::from_secs_f64(DEFAULT_COOLDOWN_SECS),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl StabilitySettings {
    /// Convert a cooldown given in float seconds, rejecting negative or
    /// non-finite values.
    pub fn cooldown_from_secs(secs: f64) -> Result<Duration> {
        Duration::try_from_secs_f64(secs)
            .map_err(|_| anyhow!("cooldown must be a finite, non-negative number of seconds"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_detections == 0 {
            return Err(anyhow!("min_detections must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(anyhow!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            ));
        }
        if self.history_capacity < self.min_detections {
            return Err(anyhow!(
                "history_capacity ({}) must be at least min_detections ({})",
                self.history_capacity,
                self.min_detections
            ));
        }
        Ok(())
    }
}

/// One confident, per-frame classification result.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub gesture: Gesture,
    pub confidence: f32,
    pub at: Instant,
}

pub struct StabilityBuffer {
    settings: StabilitySettings,
    history: VecDeque<Detection>,
    current_stable: Option<Gesture>,
    last_trigger: Option<(Gesture, Instant)>,
}

impl StabilityBuffer {
    pub fn new(settings: StabilitySettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            history: VecDeque::with_capacity(settings.history_capacity),
            settings,
            current_stable: None,
            last_trigger: None,
        })
    }

    pub fn settings(&self) -> &StabilitySettings {
        &self.settings
    }

    /// Feed one frame's result, timestamped now. Returns the gesture to
    /// publish, if this frame triggers one.
    pub fn observe(&mut self, gesture: Option<Gesture>, confidence: f32) -> Option<Gesture> {
        self.observe_at(gesture, confidence, Instant::now())
    }

    /// Same as [`observe`](Self::observe) with an explicit monotonic instant.
    ///
    /// Instants must be non-decreasing across calls.
    pub fn observe_at(
        &mut self,
        gesture: Option<Gesture>,
        confidence: f32,
        now: Instant,
    ) -> Option<Gesture> {
        let gesture = match gesture {
            Some(g) if confidence >= self.settings.confidence_threshold => g,
            _ => {
                self.clear();
                return None;
            }
        };

        if let Some(last) = self.history.back() {
            if last.gesture != gesture {
                log::debug!(
                    "gesture changed {} -> {}, resetting history",
                    last.gesture,
                    gesture
                );
                self.clear();
            }
        }

        while self.history.len() >= self.settings.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(Detection {
            gesture,
            confidence,
            at: now,
        });

        if !self.is_stable(gesture) {
            log::trace!(
                "{} seen but not yet stable ({}/{})",
                gesture,
                self.history.len(),
                self.settings.min_detections
            );
            return None;
        }
        self.current_stable = Some(gesture);

        if !self.cooldown_elapsed(gesture, now) {
            log::debug!("{} stable but cooling down", gesture);
            return None;
        }

        log::info!("gesture triggered: {} (confidence {:.2})", gesture, confidence);
        self.last_trigger = Some((gesture, now));
        Some(gesture)
    }

    /// Gesture currently judged stable, if any.
    pub fn current_stable(&self) -> Option<Gesture> {
        self.current_stable
    }

    /// Most recent trigger and when it happened.
    pub fn last_triggered(&self) -> Option<(Gesture, Instant)> {
        self.last_trigger
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    fn clear(&mut self) {
        self.history.clear();
        self.current_stable = None;
    }

    fn is_stable(&self, gesture: Gesture) -> bool {
        let needed = self.settings.min_detections;
        if self.history.len() < needed {
            return false;
        }
        let threshold = self.settings.confidence_threshold;
        let recent = self.history.iter().skip(self.history.len() - needed);
        let mut span_start = None;
        for detection in recent {
            if detection.gesture != gesture || detection.confidence < threshold {
                return false;
            }
            span_start.get_or_insert(detection.at);
        }
        if let (Some(start), Some(end)) = (span_start, self.history.back()) {
            log::debug!(
                "{} stable over last {} detections ({:.2}s)",
                gesture,
                needed,
                end.at.saturating_duration_since(start).as_secs_f64()
            );
        }
        true
    }

    fn cooldown_elapsed(&self, gesture: Gesture, now: Instant) -> bool {
        match self.last_trigger {
            Some((last, at)) if last == gesture => {
                now.saturating_duration_since(at) >= self.settings.cooldown
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(min_detections: usize, cooldown_ms: u64) -> StabilitySettings {
        StabilitySettings {
            min_detections,
            cooldown: Duration::from_millis(cooldown_ms),
            confidence_threshold: 0.5,
            history_capacity: 50,
        }
    }

    #[test]
    fn rejects_invalid_settings() {
        assert!(StabilityBuffer::new(settings(0, 0)).is_err());
        let mut s = settings(2, 0);
        s.confidence_threshold = 1.5;
        assert!(StabilityBuffer::new(s).is_err());
        let mut s = settings(5, 0);
        s.history_capacity = 3;
        assert!(StabilityBuffer::new(s).is_err());
        assert!(StabilitySettings::cooldown_from_secs(-1.0).is_err());
        assert!(StabilitySettings::cooldown_from_secs(f64::NAN).is_err());

        let buf = StabilityBuffer::new(settings(3, 250)).unwrap();
        assert_eq!(buf.settings().min_detections, 3);
        assert_eq!(buf.settings().cooldown, Duration::from_millis(250));
    }

    #[test]
    fn single_detection_triggers_when_min_is_one() {
        let mut buf = StabilityBuffer::new(settings(1, 1000)).unwrap();
        let t0 = Instant::now();
        assert_eq!(
            buf.observe_at(Some(Gesture::ThumbsUp), 0.9, t0),
            Some(Gesture::ThumbsUp)
        );
        assert_eq!(
            buf.observe_at(Some(Gesture::ThumbsUp), 0.9, t0 + Duration::from_millis(10)),
            None
        );
    }

    #[test]
    fn zero_cooldown_fires_every_stable_frame() {
        let mut buf = StabilityBuffer::new(settings(2, 0)).unwrap();
        let t0 = Instant::now();
        assert_eq!(buf.observe_at(Some(Gesture::Peace), 0.8, t0), None);
        for i in 1..5 {
            let t = t0 + Duration::from_millis(10 * i);
            assert_eq!(buf.observe_at(Some(Gesture::Peace), 0.8, t), Some(Gesture::Peace));
        }
    }

    #[test]
    fn suppressed_trigger_keeps_history() {
        let mut buf = StabilityBuffer::new(settings(2, 1000)).unwrap();
        let t0 = Instant::now();
        buf.observe_at(Some(Gesture::OpenPalm), 0.9, t0);
        buf.observe_at(Some(Gesture::OpenPalm), 0.9, t0);
        assert_eq!(buf.observe_at(Some(Gesture::OpenPalm), 0.9, t0), None);
        assert_eq!(buf.history_len(), 3);
        assert_eq!(buf.current_stable(), Some(Gesture::OpenPalm));
    }

    #[test]
    fn low_confidence_clears_stable_state_but_not_cooldown() {
        let mut buf = StabilityBuffer::new(settings(1, 1000)).unwrap();
        let t0 = Instant::now();
        buf.observe_at(Some(Gesture::ClosedFist), 0.9, t0);
        assert_eq!(buf.observe_at(Some(Gesture::ClosedFist), 0.2, t0), None);
        assert_eq!(buf.history_len(), 0);
        assert_eq!(buf.current_stable(), None);
        assert_eq!(buf.last_triggered().map(|(g, _)| g), Some(Gesture::ClosedFist));
    }

    #[test]
    fn history_is_bounded() {
        let mut s = settings(2, 60_000);
        s.history_capacity = 4;
        let mut buf = StabilityBuffer::new(s).unwrap();
        let t0 = Instant::now();
        for _ in 0..20 {
            buf.observe_at(Some(Gesture::PointingUp), 0.9, t0);
        }
        assert_eq!(buf.history_len(), 4);
    }
}
