mod backend;
mod backends;
mod landmarks;
mod result;

use std::path::Path;

use anyhow::{anyhow, Result};

pub use backend::GestureClassifier;
pub use backends::StubClassifier;
#[cfg(feature = "backend-tract")]
pub use backends::TractClassifier;
pub use landmarks::{HandLandmarks, Landmark, LANDMARK_COUNT, OK_SIGN_CONFIDENCE, OK_SIGN_TIP_DISTANCE};
pub use result::{Classification, Label};

/// Load the classifier named by `model_path`.
///
/// `stub://...` selects the scripted classifier. Anything else is treated as
/// an ONNX file on disk and requires the `backend-tract` feature. A missing
/// model file is an error so startup can fail fast, as is a model input
/// size with a zero side. `min_hand_presence` gates the model's optional
/// hand-presence output.
pub fn load_classifier(
    model_path: &str,
    width: u32,
    height: u32,
    min_hand_presence: f32,
) -> Result<Box<dyn GestureClassifier>> {
    if model_path.starts_with("stub://") {
        log::info!("using scripted classifier ({})", model_path);
        return Ok(Box::new(StubClassifier::from_model_path(model_path)?));
    }
    if !Path::new(model_path).exists() {
        return Err(anyhow!("gesture model not found at {}", model_path));
    }
    if width == 0 || height == 0 {
        return Err(anyhow!(
            "gesture model needs a fixed input size, got {}x{} (set FRAME_WIDTH and FRAME_HEIGHT)",
            width,
            height
        ));
    }
    load_model_file(model_path, width, height, min_hand_presence)
}

#[cfg(feature = "backend-tract")]
fn load_model_file(
    model_path: &str,
    width: u32,
    height: u32,
    min_hand_presence: f32,
) -> Result<Box<dyn GestureClassifier>> {
    let mut classifier = TractClassifier::new(model_path, width, height, min_hand_presence)?;
    classifier.warm_up()?;
    log::info!("loaded gesture model {} ({}x{})", model_path, width, height);
    Ok(Box::new(classifier))
}

#[cfg(not(feature = "backend-tract"))]
fn load_model_file(
    model_path: &str,
    _width: u32,
    _height: u32,
    _min_hand_presence: f32,
) -> Result<Box<dyn GestureClassifier>> {
    Err(anyhow!(
        "cannot load {}: built without the backend-tract feature",
        model_path
    ))
}
