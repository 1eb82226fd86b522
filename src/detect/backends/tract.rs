#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::GestureClassifier;
use crate::detect::landmarks::{HandLandmarks, LANDMARK_COUNT, OK_SIGN_CONFIDENCE};
use crate::detect::result::Classification;
use crate::frame::Frame;
use crate::gesture::Gesture;

/// Category order of the recognizer's score output.
pub const MODEL_CATEGORIES: [&str; 8] = [
    "None",
    "Closed_Fist",
    "Open_Palm",
    "Pointing_Up",
    "Thumb_Down",
    "Thumb_Up",
    "Victory",
    "ILoveYou",
];

/// Tract-based gesture classifier.
///
/// Expects an ONNX export of the gesture recognizer with:
/// - input 0: `1x3xHxW` f32 RGB in `[0, 1]`
/// - output 0: one score per entry of `MODEL_CATEGORIES`
/// - output 1 (optional): 21x3 hand landmarks
/// - output 2 (optional): hand-presence score
///
/// It performs no network I/O and writes nothing to disk.
pub struct TractClassifier {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    /// Hand-presence score below which a frame counts as "no hand".
    min_hand_presence: f32,
}

impl TractClassifier {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        width: u32,
        height: u32,
        min_hand_presence: f32,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(anyhow!("model file not found: {}", model_path.display()));
        }
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            min_hand_presence,
        })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        if frame.width != self.width || frame.height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                frame.width,
                frame.height,
                self.width,
                self.height
            ));
        }

        let pixels = frame.pixels();
        let expected_len = (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let width = self.width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );
        Ok(input.into_tensor())
    }

    fn interpret(&self, outputs: TVec<TValue>) -> Result<Classification> {
        if let Some(presence) = outputs.get(2) {
            let presence = presence
                .to_array_view::<f32>()
                .context("hand-presence output was not f32")?
                .iter()
                .copied()
                .next()
                .unwrap_or(0.0);
            if presence < self.min_hand_presence {
                return Ok(Classification::nothing());
            }
        }

        let scores = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?
            .to_array_view::<f32>()
            .context("score output was not f32")?
            .iter()
            .copied()
            .collect::<Vec<f32>>();
        if scores.len() != MODEL_CATEGORIES.len() {
            return Err(anyhow!(
                "expected {} category scores, got {}",
                MODEL_CATEGORIES.len(),
                scores.len()
            ));
        }
        let scores = normalize_scores(scores);
        let (best, confidence) = scores
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |acc, (i, s)| if s > acc.1 { (i, s) } else { acc });
        let category = MODEL_CATEGORIES[best];

        if let Some(gesture) = Gesture::from_model_category(category) {
            log::debug!("recognized {} ({}, {:.2})", gesture, category, confidence);
            return Ok(Classification::gesture(gesture, confidence));
        }

        if let Some(landmarks) = outputs.get(1) {
            let flat: Vec<f32> = landmarks
                .to_array_view::<f32>()
                .context("landmark output was not f32")?
                .iter()
                .copied()
                .collect();
            if flat.len() == LANDMARK_COUNT * 3 && HandLandmarks::from_flat(&flat)?.is_ok_sign() {
                log::debug!("recognized OK_SIGN from landmarks");
                return Ok(Classification::gesture(Gesture::OkSign, OK_SIGN_CONFIDENCE));
            }
        }

        Ok(Classification::no_gesture(confidence))
    }
}

/// Apply softmax when the model emits logits rather than probabilities.
fn normalize_scores(scores: Vec<f32>) -> Vec<f32> {
    if scores.iter().all(|s| (0.0..=1.0).contains(s)) {
        return scores;
    }
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

impl GestureClassifier for TractClassifier {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn classify(&mut self, frame: &Frame) -> Result<Classification> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.interpret(outputs)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::new(
            vec![0u8; (self.width * self.height * 3) as usize],
            self.width,
            self.height,
            0,
        );
        self.classify(&blank).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logits_are_softmaxed() {
        let probs = normalize_scores(vec![2.0, 0.0, -1.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs[0] > probs[1] && probs[1] > probs[2]);
    }

    #[test]
    fn probabilities_pass_through() {
        assert_eq!(normalize_scores(vec![0.1, 0.9]), vec![0.1, 0.9]);
    }

    #[test]
    fn missing_model_is_an_error() {
        let err = TractClassifier::new("/nonexistent/gesture.onnx", 320, 240, 0.5)
            .err()
            .expect("error");
        assert!(err.to_string().contains("not found"));
    }
}
