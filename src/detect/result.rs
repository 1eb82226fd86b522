use crate::gesture::Gesture;

/// What the recognizer said about one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Label {
    Gesture(Gesture),
    /// A hand was seen but matched no gesture (`NONE` / `Unknown`).
    NoGesture,
}

/// Result of classifying one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Classification {
    /// `None` when no hand was found at all.
    pub label: Option<Label>,
    pub confidence: f32,
}

impl Classification {
    /// No hand in view. Also the stand-in for classifier errors.
    pub fn nothing() -> Self {
        Self {
            label: None,
            confidence: 0.0,
        }
    }

    pub fn gesture(gesture: Gesture, confidence: f32) -> Self {
        Self {
            label: Some(Label::Gesture(gesture)),
            confidence,
        }
    }

    pub fn no_gesture(confidence: f32) -> Self {
        Self {
            label: Some(Label::NoGesture),
            confidence,
        }
    }

    /// Collapse the sentinel and "no hand" into `None`.
    pub fn gesture_label(&self) -> Option<Gesture> {
        match self.label {
            Some(Label::Gesture(g)) => Some(g),
            Some(Label::NoGesture) | None => None,
        }
    }
}

impl Default for Classification {
    fn default() -> Self {
        Self::nothing()
    }
}
