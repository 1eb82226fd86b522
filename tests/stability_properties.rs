use std::time::{Duration, Instant};

use gesture_bridge::gesture::Gesture;
use gesture_bridge::stability::{StabilityBuffer, StabilitySettings};

fn settings(min_detections: usize, cooldown_ms: u64) -> StabilitySettings {
    StabilitySettings {
        min_detections,
        cooldown: Duration::from_millis(cooldown_ms),
        confidence_threshold: 0.5,
        history_capacity: 50,
    }
}

fn at(start: Instant, ms: u64) -> Instant {
    start + Duration::from_millis(ms)
}

#[test]
fn open_palm_then_thumbs_up_scenario() {
    let mut buffer = StabilityBuffer::new(settings(2, 1500)).expect("buffer");
    let t0 = Instant::now();
    let palm = Some(Gesture::OpenPalm);

    assert_eq!(buffer.observe_at(palm, 0.9, at(t0, 0)), None);
    assert_eq!(buffer.observe_at(palm, 0.9, at(t0, 100)), palm);
    assert_eq!(buffer.current_stable(), palm);

    // Still stable, but inside the cooldown window.
    assert_eq!(buffer.observe_at(palm, 0.9, at(t0, 200)), None);
    assert_eq!(buffer.current_stable(), palm);
    assert_eq!(buffer.history_len(), 3);

    // Exactly one cooldown after the first trigger.
    assert_eq!(buffer.observe_at(palm, 0.9, at(t0, 1600)), palm);

    // A new gesture starts from scratch and is not held back by cooldown.
    let thumbs = Some(Gesture::ThumbsUp);
    assert_eq!(buffer.observe_at(thumbs, 0.8, at(t0, 1700)), None);
    assert_eq!(buffer.history_len(), 1);
    assert_eq!(buffer.current_stable(), None);
    assert_eq!(buffer.observe_at(thumbs, 0.8, at(t0, 1800)), thumbs);

    assert_eq!(buffer.observe_at(None, 0.0, at(t0, 1900)), None);
    assert_eq!(buffer.history_len(), 0);
    assert_eq!(buffer.current_stable(), None);
    assert_eq!(
        buffer.last_triggered().map(|(g, _)| g),
        Some(Gesture::ThumbsUp)
    );
}

#[test]
fn low_confidence_breaks_a_run() {
    let mut buffer = StabilityBuffer::new(settings(3, 0)).expect("buffer");
    let t0 = Instant::now();
    let peace = Some(Gesture::Peace);

    assert_eq!(buffer.observe_at(peace, 0.9, at(t0, 0)), None);
    assert_eq!(buffer.observe_at(peace, 0.9, at(t0, 10)), None);
    assert_eq!(buffer.observe_at(peace, 0.49, at(t0, 20)), None);
    assert_eq!(buffer.history_len(), 0);
    assert_eq!(buffer.observe_at(peace, 0.9, at(t0, 30)), None);
    assert_eq!(buffer.observe_at(peace, 0.9, at(t0, 40)), None);
    assert_eq!(buffer.observe_at(peace, 0.9, at(t0, 50)), peace);
}

#[test]
fn threshold_is_inclusive() {
    let mut buffer = StabilityBuffer::new(settings(1, 0)).expect("buffer");
    assert_eq!(
        buffer.observe_at(Some(Gesture::OkSign), 0.5, Instant::now()),
        Some(Gesture::OkSign)
    );
}

#[test]
fn switching_back_and_forth_never_triggers() {
    let mut buffer = StabilityBuffer::new(settings(2, 0)).expect("buffer");
    let t0 = Instant::now();
    for i in 0..20 {
        let gesture = if i % 2 == 0 {
            Gesture::ClosedFist
        } else {
            Gesture::OpenPalm
        };
        assert_eq!(buffer.observe_at(Some(gesture), 0.95, at(t0, i * 10)), None);
    }
}

#[test]
fn zero_cooldown_retriggers_every_stable_frame() {
    let mut buffer = StabilityBuffer::new(settings(2, 0)).expect("buffer");
    let t0 = Instant::now();
    let fist = Some(Gesture::ClosedFist);
    assert_eq!(buffer.observe_at(fist, 0.9, at(t0, 0)), None);
    for i in 1..5 {
        assert_eq!(buffer.observe_at(fist, 0.9, at(t0, i)), fist);
    }
}

/// Deterministic pseudo-random stream of observations.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

#[test]
fn triggers_respect_run_length_and_cooldown() {
    let min = 3;
    let cooldown = Duration::from_millis(400);
    let mut buffer = StabilityBuffer::new(settings(min, 400)).expect("buffer");
    let mut rng = Lcg(42);
    let t0 = Instant::now();
    let choices = [None, Some(Gesture::ThumbsUp), Some(Gesture::ThumbsDown)];

    let mut run_label: Option<Gesture> = None;
    let mut run_len = 0usize;
    let mut last_trigger: Option<(Gesture, Instant)> = None;
    let mut triggers = 0;

    let mut current = choices[1];
    for step in 0..5_000u64 {
        // Long-ish runs so that stable periods actually occur.
        if rng.next() % 6 == 0 {
            current = choices[(rng.next() % 3) as usize];
        }
        let confidence = if rng.next() % 10 == 0 { 0.3 } else { 0.9 };
        let now = at(t0, step * 33);
        let result = buffer.observe_at(current, confidence, now);

        let confident = current.filter(|_| confidence >= 0.5);
        match confident {
            Some(g) if run_label == Some(g) => run_len += 1,
            Some(g) => {
                run_label = Some(g);
                run_len = 1;
            }
            None => {
                run_label = None;
                run_len = 0;
            }
        }

        let eligible_by_cooldown = match (last_trigger, confident) {
            (Some((prev, when)), Some(g)) if prev == g => now.duration_since(when) >= cooldown,
            _ => true,
        };
        let expected = if run_len >= min && eligible_by_cooldown {
            confident
        } else {
            None
        };
        assert_eq!(result, expected, "step {step}");

        if let Some(g) = result {
            assert!(run_len >= min);
            if let Some((prev, when)) = last_trigger {
                if prev == g {
                    assert!(now.duration_since(when) >= cooldown);
                }
            }
            last_trigger = Some((g, now));
            triggers += 1;
        }
    }
    assert!(triggers > 10, "stream too noisy to exercise triggers");
}
