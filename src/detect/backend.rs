use anyhow::Result;

use crate::detect::result::Classification;
use crate::frame::Frame;

/// Gesture classifier trait.
///
/// # Boundary
///
/// The classifier is an opaque collaborator: it receives a resized RGB frame
/// and returns a single `(label, confidence)` pair for the most prominent
/// hand. Implementations must:
/// - Treat the frame as read-only and not retain it past `classify`
/// - Report "no hand" as `Classification::nothing()`
/// - Report "hand but no known gesture" as `Classification::no_gesture`
///
/// Errors are not fatal to the caller; the driver logs them and treats the
/// frame as having no detection.
pub trait GestureClassifier {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Classify one frame.
    fn classify(&mut self, frame: &Frame) -> Result<Classification>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<C: GestureClassifier + ?Sized> GestureClassifier for Box<C> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn classify(&mut self, frame: &Frame) -> Result<Classification> {
        (**self).classify(frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
