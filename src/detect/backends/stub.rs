use anyhow::{anyhow, Result};

use crate::detect::backend::GestureClassifier;
use crate::detect::result::Classification;
use crate::frame::Frame;
use crate::gesture::{Gesture, NO_GESTURE};

/// Frames each scripted gesture is held for, followed by as many empty frames.
pub const STUB_HOLD_FRAMES: usize = 10;
const STUB_CONFIDENCE: f32 = 0.9;

/// Scripted classifier. Ignores pixels and replays a fixed sequence, looping.
pub struct StubClassifier {
    script: Vec<Classification>,
    cursor: usize,
}

impl StubClassifier {
    pub fn scripted(script: Vec<Classification>) -> Self {
        Self { script, cursor: 0 }
    }

    /// Build from a `stub://` model path.
    ///
    /// - `stub://` cycles through open palm and thumbs up
    /// - `stub://THUMBS_UP,PEACE` cycles through the listed gestures
    /// - `stub://NONE` only ever reports the no-gesture sentinel
    ///
    /// Each gesture is held for `STUB_HOLD_FRAMES` frames, then no hand for
    /// the same number of frames.
    pub fn from_model_path(path: &str) -> Result<Self> {
        let list = path
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("stub classifier path must start with stub://"))?;
        let mut script = Vec::new();
        let names: Vec<&str> = if list.trim().is_empty() {
            vec!["OPEN_PALM", "THUMBS_UP"]
        } else {
            list.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
        };
        for name in names {
            let entry = if name.eq_ignore_ascii_case(NO_GESTURE) {
                Classification::no_gesture(STUB_CONFIDENCE)
            } else {
                Classification::gesture(name.parse::<Gesture>()?, STUB_CONFIDENCE)
            };
            script.extend(std::iter::repeat(entry).take(STUB_HOLD_FRAMES));
            script.extend(std::iter::repeat(Classification::nothing()).take(STUB_HOLD_FRAMES));
        }
        Ok(Self::scripted(script))
    }
}

impl Default for StubClassifier {
    fn default() -> Self {
        Self::scripted(Vec::new())
    }
}

impl GestureClassifier for StubClassifier {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn classify(&mut self, _frame: &Frame) -> Result<Classification> {
        if self.script.is_empty() {
            return Ok(Classification::nothing());
        }
        let result = self.script[self.cursor % self.script.len()];
        self.cursor = self.cursor.wrapping_add(1);
        Ok(result)
    }
}
