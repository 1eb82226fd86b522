//! Gesture Bridge
//!
//! Turns a live camera stream into discrete, debounced hand-gesture events on
//! an MQTT bus, announced to Home Assistant through MQTT discovery.
//!
//! # Pipeline
//!
//! ```text
//! FrameSource -> GestureClassifier -> GestureFilter -> StabilityBuffer -> GesturePublisher
//! ```
//!
//! A gesture is published when it has been seen on `min_detections`
//! consecutive frames above `confidence_threshold`, and the same gesture has
//! not been published within `cooldown`.
//!
//! # Module Structure
//!
//! - `gesture`: the closed gesture vocabulary and enable flags
//! - `stability`: the debounce / cooldown state machine
//! - `frame`: decoded RGB frames
//! - `ingest`: stream transports and the latency-bounded `FrameSource`
//! - `detect`: classifier boundary and backends
//! - `transport`: MQTT publishing and Home Assistant discovery
//! - `driver`: the acquisition loop and its lifecycle
//! - `config`: file + environment configuration

pub mod config;
pub mod detect;
pub mod driver;
pub mod frame;
pub mod gesture;
pub mod ingest;
pub mod shutdown;
pub mod stability;
pub mod transport;
pub mod ui;

pub use config::{BridgeConfig, MqttConfig};
pub use detect::{load_classifier, Classification, GestureClassifier, Label, StubClassifier};
pub use driver::{Driver, DriverSettings, DriverStats, Tick};
pub use frame::{Frame, RawFrame};
pub use gesture::{Gesture, GestureFilter, NO_GESTURE};
pub use ingest::{Acquired, ConnectionState, FrameSource, SourceConfig};
pub use shutdown::StopSignal;
pub use stability::{StabilityBuffer, StabilitySettings};
pub use transport::{GesturePublisher, MqttPublisher};
