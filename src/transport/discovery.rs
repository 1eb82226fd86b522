//! Home Assistant discovery and state payloads.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::gesture::Gesture;

pub const PAYLOAD_ONLINE: &str = "online";
pub const PAYLOAD_OFFLINE: &str = "offline";

const SENSOR_NAME: &str = "Gesture Control";
const SENSOR_ICON: &str = "mdi:hand-back-right";
const MANUFACTURER: &str = "gesture-bridge";
const MODEL: &str = "Gesture Detector";

/// Home Assistant MQTT Discovery config for the gesture sensor.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HaSensorConfig {
    pub name: String,
    pub unique_id: String,
    pub state_topic: String,
    pub json_attributes_topic: String,
    pub value_template: String,
    pub icon: String,
    pub availability_topic: String,
    pub payload_available: String,
    pub payload_not_available: String,
    pub device: HaDeviceInfo,
}

/// Home Assistant device info for entity grouping.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HaDeviceInfo {
    pub identifiers: Vec<String>,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub sw_version: String,
}

/// Topic layout derived from the configured prefixes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topics {
    pub discovery: String,
    pub state: String,
    pub availability: String,
}

impl Topics {
    pub fn new(discovery_prefix: &str, device_name: &str, state_topic: &str) -> Self {
        Self {
            discovery: format!(
                "{}/sensor/{}/config",
                discovery_prefix.trim_end_matches('/'),
                device_name
            ),
            state: state_topic.to_string(),
            availability: availability_topic(state_topic),
        }
    }
}

/// `mediapipe/gesture/state` -> `mediapipe/gesture/availability`.
pub fn availability_topic(state_topic: &str) -> String {
    match state_topic.rsplit_once('/') {
        Some((root, _)) if !root.is_empty() => format!("{}/availability", root),
        _ => format!("{}/availability", state_topic),
    }
}

impl HaSensorConfig {
    pub fn for_gesture_sensor(device_name: &str, topics: &Topics) -> Self {
        Self {
            name: SENSOR_NAME.to_string(),
            unique_id: format!("{}_sensor", device_name),
            state_topic: topics.state.clone(),
            json_attributes_topic: topics.state.clone(),
            value_template: "{{ value_json.state }}".to_string(),
            icon: SENSOR_ICON.to_string(),
            availability_topic: topics.availability.clone(),
            payload_available: PAYLOAD_ONLINE.to_string(),
            payload_not_available: PAYLOAD_OFFLINE.to_string(),
            device: HaDeviceInfo {
                identifiers: vec![device_name.to_string()],
                name: device_name.to_string(),
                manufacturer: MANUFACTURER.to_string(),
                model: MODEL.to_string(),
                sw_version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}

/// State message published on every trigger.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GestureStatePayload {
    pub state: String,
    /// Rounded to three decimals.
    pub confidence: f64,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

impl GestureStatePayload {
    pub fn new(gesture: Gesture, confidence: f32, at: SystemTime) -> Self {
        let timestamp = at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self {
            state: gesture.as_str().to_string(),
            confidence: round3(f64::from(confidence)),
            timestamp,
        }
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
