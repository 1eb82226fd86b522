use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::gesture::{Gesture, GestureFilter};
use crate::ingest::SourceConfig;
use crate::stability::{
    StabilitySettings, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_COOLDOWN_SECS,
    DEFAULT_HISTORY_CAPACITY, DEFAULT_MIN_DETECTIONS,
};
use crate::transport::{MqttEndpoint, MqttSettings, TlsMaterials, Topics, DEFAULT_CONNECT_TIMEOUT};

/// Environment variable naming an optional JSON/TOML config file.
pub const CONFIG_PATH_ENV: &str = "GESTURE_BRIDGE_CONFIG";

const DEFAULT_RTSP_URL: &str = "stub://gesture_camera";
const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;
const DEFAULT_TARGET_FPS: u32 = 15;
const DEFAULT_FRAME_WIDTH: u32 = 320;
const DEFAULT_FRAME_HEIGHT: u32 = 240;
const DEFAULT_SKIP_FRAMES: u32 = 1;
const DEFAULT_MQTT_BROKER: &str = "core-mosquitto";
const DEFAULT_MQTT_PORT: u16 = 1883;
const DEFAULT_MQTT_CLIENT_ID: &str = "gesture_control";
const DEFAULT_DISCOVERY_PREFIX: &str = "homeassistant";
const DEFAULT_STATE_TOPIC: &str = "mediapipe/gesture/state";
const DEFAULT_DEVICE_NAME: &str = "gesture_control";
const DEFAULT_MODEL_PATH: &str = "models/gesture_recognizer.onnx";
const DEFAULT_MIN_DETECTION_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct BridgeConfigFile {
    rtsp: Option<RtspConfigFile>,
    mqtt: Option<MqttConfigFile>,
    gestures: Option<GestureConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RtspConfigFile {
    url: Option<String>,
    reconnect_delay_secs: Option<u64>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    skip_frames: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MqttConfigFile {
    broker: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    use_tls: Option<bool>,
    tls_ca_path: Option<PathBuf>,
    tls_client_cert_path: Option<PathBuf>,
    tls_client_key_path: Option<PathBuf>,
    client_id: Option<String>,
    discovery_prefix: Option<String>,
    state_topic: Option<String>,
    device_name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct GestureConfigFile {
    confidence_threshold: Option<f32>,
    min_detections: Option<usize>,
    cooldown_secs: Option<f64>,
    history_capacity: Option<usize>,
    model_path: Option<String>,
    min_detection_confidence: Option<f32>,
    enabled: Option<BTreeMap<String, bool>>,
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub source: SourceConfig,
    pub reconnect_delay: Duration,
    pub mqtt: MqttConfig,
    pub stability: StabilitySettings,
    pub gestures: GestureFilter,
    pub model_path: String,
    /// Hand-presence score a model must report before its category counts.
    pub min_detection_confidence: f32,
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
    pub tls_ca_path: Option<PathBuf>,
    pub tls_client_cert_path: Option<PathBuf>,
    pub tls_client_key_path: Option<PathBuf>,
    pub client_id: String,
    pub discovery_prefix: String,
    pub state_topic: String,
    pub device_name: String,
}

impl MqttConfig {
    /// Username and password, only when both are set.
    pub fn credentials(&self) -> Option<(String, String)> {
        match (&self.username, &self.password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            _ => None,
        }
    }

    pub fn topics(&self) -> Topics {
        Topics::new(&self.discovery_prefix, &self.device_name, &self.state_topic)
    }

    pub fn endpoint(&self) -> Result<MqttEndpoint> {
        MqttEndpoint::resolve(&self.broker, self.port, self.use_tls)
    }

    /// Resolve the endpoint and read TLS material from disk.
    pub fn settings(&self) -> Result<MqttSettings> {
        let tls = TlsMaterials::load(
            self.tls_ca_path.as_deref(),
            self.tls_client_cert_path.as_deref(),
            self.tls_client_key_path.as_deref(),
        )?;
        Ok(MqttSettings {
            endpoint: self.endpoint()?,
            tls,
            client_id: self.client_id.clone(),
            credentials: self.credentials(),
            device_name: self.device_name.clone(),
            topics: self.topics(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }
}

impl BridgeConfig {
    /// Defaults, then the file named by `GESTURE_BRIDGE_CONFIG`, then env.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Like `load`, with an explicit config file path.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => BridgeConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: BridgeConfigFile) -> Result<Self> {
        let rtsp = file.rtsp.unwrap_or_default();
        let mqtt = file.mqtt.unwrap_or_default();
        let gestures = file.gestures.unwrap_or_default();

        let source = SourceConfig {
            url: rtsp.url.unwrap_or_else(|| DEFAULT_RTSP_URL.to_string()),
            target_fps: rtsp.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
            width: rtsp.width.unwrap_or(DEFAULT_FRAME_WIDTH),
            height: rtsp.height.unwrap_or(DEFAULT_FRAME_HEIGHT),
            skip_frames: rtsp.skip_frames.unwrap_or(DEFAULT_SKIP_FRAMES),
        };
        let reconnect_delay = Duration::from_secs(
            rtsp.reconnect_delay_secs
                .unwrap_or(DEFAULT_RECONNECT_DELAY_SECS),
        );

        let mqtt = MqttConfig {
            broker: mqtt
                .broker
                .unwrap_or_else(|| DEFAULT_MQTT_BROKER.to_string()),
            port: mqtt.port.unwrap_or(DEFAULT_MQTT_PORT),
            username: mqtt.username.filter(|u| !u.is_empty()),
            password: mqtt.password.filter(|p| !p.is_empty()),
            use_tls: mqtt.use_tls.unwrap_or(false),
            tls_ca_path: mqtt.tls_ca_path,
            tls_client_cert_path: mqtt.tls_client_cert_path,
            tls_client_key_path: mqtt.tls_client_key_path,
            client_id: mqtt
                .client_id
                .unwrap_or_else(|| DEFAULT_MQTT_CLIENT_ID.to_string()),
            discovery_prefix: mqtt
                .discovery_prefix
                .unwrap_or_else(|| DEFAULT_DISCOVERY_PREFIX.to_string()),
            state_topic: mqtt
                .state_topic
                .unwrap_or_else(|| DEFAULT_STATE_TOPIC.to_string()),
            device_name: mqtt
                .device_name
                .unwrap_or_else(|| DEFAULT_DEVICE_NAME.to_string()),
        };

        let stability = StabilitySettings {
            min_detections: gestures.min_detections.unwrap_or(DEFAULT_MIN_DETECTIONS),
            cooldown: StabilitySettings::cooldown_from_secs(
                gestures.cooldown_secs.unwrap_or(DEFAULT_COOLDOWN_SECS),
            )?,
            confidence_threshold: gestures
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            history_capacity: gestures
                .history_capacity
                .unwrap_or(DEFAULT_HISTORY_CAPACITY),
        };

        let mut filter = GestureFilter::all();
        for (name, enabled) in gestures.enabled.unwrap_or_default() {
            let gesture: Gesture = name
                .parse()
                .with_context(|| format!("invalid entry in gestures.enabled: {}", name))?;
            filter.set(gesture, enabled);
        }

        Ok(Self {
            source,
            reconnect_delay,
            mqtt,
            stability,
            gestures: filter,
            model_path: gestures
                .model_path
                .unwrap_or_else(|| DEFAULT_MODEL_PATH.to_string()),
            min_detection_confidence: gestures
                .min_detection_confidence
                .unwrap_or(DEFAULT_MIN_DETECTION_CONFIDENCE),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_string("RTSP_URL") {
            self.source.url = url;
        }
        if let Some(secs) = env_parse::<u64>("RTSP_RECONNECT_DELAY")? {
            self.reconnect_delay = Duration::from_secs(secs);
        }
        if let Some(width) = env_parse("FRAME_WIDTH")? {
            self.source.width = width;
        }
        if let Some(height) = env_parse("FRAME_HEIGHT")? {
            self.source.height = height;
        }
        if let Some(fps) = env_parse("TARGET_FPS")? {
            self.source.target_fps = fps;
        }
        if let Some(skip) = env_parse("SKIP_FRAMES")? {
            self.source.skip_frames = skip;
        }

        if let Some(broker) = env_string("MQTT_BROKER") {
            self.mqtt.broker = broker;
        }
        if let Some(port) = env_parse("MQTT_PORT")? {
            self.mqtt.port = port;
        }
        if let Some(user) = env_string("MQTT_USERNAME") {
            self.mqtt.username = Some(user);
        }
        if let Some(password) = env_string("MQTT_PASSWORD") {
            self.mqtt.password = Some(password);
        }
        if let Some(use_tls) = env_bool("MQTT_USE_TLS")? {
            self.mqtt.use_tls = use_tls;
        }
        if let Some(path) = env_string("MQTT_TLS_CA_PATH") {
            self.mqtt.tls_ca_path = Some(PathBuf::from(path));
        }
        if let Some(path) = env_string("MQTT_TLS_CLIENT_CERT_PATH") {
            self.mqtt.tls_client_cert_path = Some(PathBuf::from(path));
        }
        if let Some(path) = env_string("MQTT_TLS_CLIENT_KEY_PATH") {
            self.mqtt.tls_client_key_path = Some(PathBuf::from(path));
        }
        if let Some(client_id) = env_string("MQTT_CLIENT_ID") {
            self.mqtt.client_id = client_id;
        }
        if let Some(prefix) = env_string("MQTT_DISCOVERY_PREFIX") {
            self.mqtt.discovery_prefix = prefix;
        }
        if let Some(topic) = env_string("MQTT_STATE_TOPIC") {
            self.mqtt.state_topic = topic;
        }
        if let Some(name) = env_string("MQTT_DEVICE_NAME") {
            self.mqtt.device_name = name;
        }

        if let Some(threshold) = env_parse("GESTURE_CONFIDENCE_THRESHOLD")? {
            self.stability.confidence_threshold = threshold;
        }
        if let Some(min) = env_parse("GESTURE_MIN_DETECTIONS")? {
            self.stability.min_detections = min;
        }
        if let Some(cooldown) = env_parse::<f64>("GESTURE_COOLDOWN")? {
            self.stability.cooldown = StabilitySettings::cooldown_from_secs(cooldown)
                .context("GESTURE_COOLDOWN")?;
        }
        if let Some(path) = env_string("GESTURE_MODEL_PATH") {
            self.model_path = path;
        }
        if let Some(presence) = env_parse("MIN_DETECTION_CONFIDENCE")? {
            self.min_detection_confidence = presence;
        }
        for gesture in Gesture::ALL {
            if let Some(enabled) = env_bool(&gesture.enable_key())? {
                self.gestures.set(gesture, enabled);
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.source.url.trim().is_empty() {
            return Err(anyhow!("RTSP_URL must not be empty"));
        }
        if self.source.skip_frames == 0 {
            return Err(anyhow!("SKIP_FRAMES must be at least 1"));
        }
        if self.mqtt.port == 0 {
            return Err(anyhow!("MQTT_PORT must be non-zero"));
        }
        if self.mqtt.client_id.trim().is_empty() {
            return Err(anyhow!("MQTT_CLIENT_ID must not be empty"));
        }
        validate_topic("MQTT_STATE_TOPIC", &self.mqtt.state_topic)?;
        validate_topic("MQTT_DISCOVERY_PREFIX", &self.mqtt.discovery_prefix)?;
        if self.mqtt.device_name.is_empty()
            || !self
                .mqtt
                .device_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(anyhow!(
                "MQTT_DEVICE_NAME must be non-empty and use only [A-Za-z0-9_-]: {:?}",
                self.mqtt.device_name
            ));
        }
        self.mqtt.endpoint().context("invalid MQTT_BROKER")?;
        self.stability
            .validate()
            .context("invalid gesture stability settings")?;
        if self.model_path.trim().is_empty() {
            return Err(anyhow!("GESTURE_MODEL_PATH must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.min_detection_confidence) {
            return Err(anyhow!(
                "MIN_DETECTION_CONFIDENCE must be within [0, 1], got {}",
                self.min_detection_confidence
            ));
        }
        if self.gestures.enabled().next().is_none() {
            log::warn!("all gestures are disabled; nothing will ever be published");
        }
        Ok(())
    }

    /// Pause between two frames.
    pub fn frame_interval(&self) -> Duration {
        crate::driver::frame_interval(self.source.target_fps)
    }
}

fn validate_topic(key: &str, topic: &str) -> Result<()> {
    if topic.trim().is_empty() {
        return Err(anyhow!("{} must not be empty", key));
    }
    if topic.contains(['+', '#']) {
        return Err(anyhow!("{} must not contain MQTT wildcards: {}", key, topic));
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<BridgeConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env_string(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(None),
    }
}

fn env_bool(key: &str) -> Result<Option<bool>> {
    match env_string(key) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(anyhow!("{} must be true or false, got {:?}", key, raw)),
        },
        None => Ok(None),
    }
}
