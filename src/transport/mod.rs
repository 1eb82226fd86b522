//! Event delivery to the home-automation bus.
//!
//! `GesturePublisher` is the seam the driver talks to; `MqttPublisher` is the
//! production implementation with Home Assistant discovery.

mod discovery;
mod mqtt;
mod tls;

use std::time::SystemTime;

use anyhow::Result;

use crate::gesture::Gesture;

pub use discovery::{
    availability_topic, GestureStatePayload, HaDeviceInfo, HaSensorConfig, Topics,
    PAYLOAD_OFFLINE, PAYLOAD_ONLINE,
};
pub use mqtt::{LinkState, MqttPublisher, MqttSettings, DEFAULT_CONNECT_TIMEOUT};
pub use tls::{MqttEndpoint, TlsMaterials};

/// Delivers trigger events. Delivery is at-most-once with no local retry.
pub trait GesturePublisher {
    /// Open the session. Failing here is an initialization failure.
    fn connect(&mut self) -> Result<()>;

    /// Send one trigger. Errors are reported, never retried.
    fn publish(&mut self, gesture: Gesture, confidence: f32, at: SystemTime) -> Result<()>;

    /// Periodic housekeeping, e.g. re-announcing after a reconnect.
    fn maintain(&mut self) -> Result<()> {
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()>;
}

impl<P: GesturePublisher + ?Sized> GesturePublisher for Box<P> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn publish(&mut self, gesture: Gesture, confidence: f32, at: SystemTime) -> Result<()> {
        (**self).publish(gesture, confidence, at)
    }

    fn maintain(&mut self) -> Result<()> {
        (**self).maintain()
    }

    fn disconnect(&mut self) -> Result<()> {
        (**self).disconnect()
    }
}
