use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use gesture_bridge::config::BridgeConfig;
use gesture_bridge::gesture::Gesture;

static ENV_LOCK: Mutex<()> = Mutex::new(());

const ENV_KEYS: &[&str] = &[
    "GESTURE_BRIDGE_CONFIG",
    "RTSP_URL",
    "RTSP_RECONNECT_DELAY",
    "MQTT_BROKER",
    "MQTT_PORT",
    "MQTT_USERNAME",
    "MQTT_PASSWORD",
    "MQTT_USE_TLS",
    "MQTT_TLS_CA_PATH",
    "MQTT_TLS_CLIENT_CERT_PATH",
    "MQTT_TLS_CLIENT_KEY_PATH",
    "MQTT_CLIENT_ID",
    "MQTT_DISCOVERY_PREFIX",
    "MQTT_STATE_TOPIC",
    "MQTT_DEVICE_NAME",
    "FRAME_WIDTH",
    "FRAME_HEIGHT",
    "TARGET_FPS",
    "SKIP_FRAMES",
    "GESTURE_CONFIDENCE_THRESHOLD",
    "GESTURE_MIN_DETECTIONS",
    "GESTURE_COOLDOWN",
    "GESTURE_MODEL_PATH",
    "MIN_DETECTION_CONFIDENCE",
];

fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
    for gesture in Gesture::ALL {
        std::env::remove_var(gesture.enable_key());
    }
}

fn lock() -> std::sync::MutexGuard<'static, ()> {
    let guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();
    guard
}

#[test]
fn defaults_match_documented_values() {
    let _guard = lock();

    let cfg = BridgeConfig::load().expect("load defaults");
    assert_eq!(cfg.source.url, "stub://gesture_camera");
    assert_eq!(cfg.reconnect_delay, Duration::from_secs(5));
    assert_eq!((cfg.source.width, cfg.source.height), (320, 240));
    assert_eq!(cfg.source.target_fps, 15);
    assert_eq!(cfg.source.skip_frames, 1);
    assert_eq!(cfg.mqtt.broker, "core-mosquitto");
    assert_eq!(cfg.mqtt.port, 1883);
    assert_eq!(cfg.mqtt.client_id, "gesture_control");
    assert_eq!(cfg.mqtt.credentials(), None);
    assert_eq!(
        cfg.mqtt.topics().discovery,
        "homeassistant/sensor/gesture_control/config"
    );
    assert_eq!(cfg.mqtt.state_topic, "mediapipe/gesture/state");
    assert_eq!(cfg.stability.min_detections, 2);
    assert_eq!(cfg.stability.confidence_threshold, 0.5);
    assert_eq!(cfg.stability.cooldown, Duration::from_millis(1500));
    assert_eq!(cfg.model_path, "models/gesture_recognizer.onnx");
    assert_eq!(cfg.min_detection_confidence, 0.5);
    assert_eq!(cfg.gestures.enabled().count(), Gesture::ALL.len());
}

#[test]
fn loads_json_file_then_env_overrides() {
    let _guard = lock();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "rtsp": {
            "url": "rtsp://camera-1/stream",
            "reconnect_delay_secs": 2,
            "target_fps": 10,
            "width": 640,
            "height": 480,
            "skip_frames": 2
        },
        "mqtt": {
            "broker": "broker.lan",
            "port": 1884,
            "username": "bridge",
            "password": "secret",
            "state_topic": "home/gestures/state"
        },
        "gestures": {
            "confidence_threshold": 0.7,
            "min_detections": 3,
            "cooldown_secs": 2.5,
            "model_path": "stub://",
            "min_detection_confidence": 0.6,
            "enabled": { "OK_SIGN": false, "peace": false }
        }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("GESTURE_BRIDGE_CONFIG", file.path());
    std::env::set_var("MQTT_PORT", "1885");
    std::env::set_var("GESTURE_COOLDOWN", "0.25");
    std::env::set_var("ENABLE_PEACE", "true");
    std::env::set_var("MIN_DETECTION_CONFIDENCE", "0.7");
    std::env::set_var("ENABLE_THUMBS_DOWN", "FALSE");

    let cfg = BridgeConfig::load().expect("load config");
    assert_eq!(cfg.source.url, "rtsp://camera-1/stream");
    assert_eq!(cfg.reconnect_delay, Duration::from_secs(2));
    assert_eq!(cfg.source.target_fps, 10);
    assert_eq!((cfg.source.width, cfg.source.height), (640, 480));
    assert_eq!(cfg.source.skip_frames, 2);
    assert_eq!(cfg.mqtt.broker, "broker.lan");
    assert_eq!(cfg.mqtt.port, 1885);
    assert_eq!(
        cfg.mqtt.credentials(),
        Some(("bridge".to_string(), "secret".to_string()))
    );
    assert_eq!(cfg.mqtt.topics().availability, "home/gestures/availability");
    assert_eq!(cfg.stability.confidence_threshold, 0.7);
    assert_eq!(cfg.stability.min_detections, 3);
    assert_eq!(cfg.stability.cooldown, Duration::from_millis(250));
    assert_eq!(cfg.model_path, "stub://");
    assert_eq!(cfg.min_detection_confidence, 0.7);
    assert!(!cfg.gestures.is_enabled(Gesture::OkSign));
    assert!(cfg.gestures.is_enabled(Gesture::Peace));
    assert!(!cfg.gestures.is_enabled(Gesture::ThumbsDown));
    assert!(cfg.gestures.is_enabled(Gesture::OpenPalm));

    clear_env();
}

#[test]
fn loads_toml_file() {
    let _guard = lock();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
[rtsp]
url = "rtsp://garage/stream"

[mqtt]
broker = "mqtts://broker.example.com"
port = 8883

[gestures]
min_detections = 1
"#;
    file.write_all(toml.as_bytes()).expect("write config");

    let cfg = BridgeConfig::load_from(Some(file.path())).expect("load toml");
    assert_eq!(cfg.source.url, "rtsp://garage/stream");
    assert_eq!(cfg.stability.min_detections, 1);
    let endpoint = cfg.mqtt.endpoint().expect("endpoint");
    assert!(endpoint.use_tls);
    assert_eq!(endpoint.port, 8883);
}

#[test]
fn credentials_require_both_halves() {
    let _guard = lock();
    std::env::set_var("MQTT_USERNAME", "bridge");

    let cfg = BridgeConfig::load().expect("load config");
    assert_eq!(cfg.mqtt.credentials(), None);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = lock();

    let cases: &[(&str, &str)] = &[
        ("GESTURE_MIN_DETECTIONS", "0"),
        ("GESTURE_CONFIDENCE_THRESHOLD", "1.5"),
        ("GESTURE_COOLDOWN", "-1"),
        ("MQTT_PORT", "not-a-port"),
        ("SKIP_FRAMES", "0"),
        ("MQTT_STATE_TOPIC", "gestures/#"),
        ("MQTT_DEVICE_NAME", "has space"),
        ("ENABLE_OK_SIGN", "maybe"),
        ("MIN_DETECTION_CONFIDENCE", "1.2"),
    ];
    for (key, value) in cases {
        std::env::set_var(key, value);
        assert!(
            BridgeConfig::load().is_err(),
            "{}={} should be rejected",
            key,
            value
        );
        std::env::remove_var(key);
    }
}

#[test]
fn rejects_unknown_file_keys_and_gestures() {
    let _guard = lock();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(br#"{ "gestures": { "enabled": { "WAVE": true } } }"#)
        .expect("write config");
    assert!(BridgeConfig::load_from(Some(file.path())).is_err());

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(br#"{ "camera": {} }"#).expect("write config");
    assert!(BridgeConfig::load_from(Some(file.path())).is_err());
}
