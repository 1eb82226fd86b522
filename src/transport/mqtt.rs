//! MQTT publisher for gesture triggers.
//!
//! 1. Connects with a retained `offline` last will on the availability topic
//! 2. Announces the Home Assistant sensor once per broker session
//! 3. Publishes trigger state fire-and-forget (QoS 1, not retained)
//!
//! The rumqttc connection is driven on a background thread that only records
//! link state; announcements happen on the caller's thread via `maintain`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

use anyhow::{anyhow, Context, Result};
use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, LastWill, Packet};
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{Client, Connection, Event, MqttOptions};
use rumqttc::Outgoing;

use crate::gesture::Gesture;
use crate::transport::discovery::{
    GestureStatePayload, HaSensorConfig, Topics, PAYLOAD_OFFLINE, PAYLOAD_ONLINE,
};
use crate::transport::tls::{MqttEndpoint, TlsMaterials};
use crate::transport::GesturePublisher;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const KEEP_ALIVE: Duration = Duration::from_secs(60);
const REQUEST_CAPACITY: usize = 10;
const RETRY_PAUSE: Duration = Duration::from_secs(1);
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_SLICE: Duration = Duration::from_millis(50);

/// Everything needed to open and announce a broker session.
#[derive(Clone, Debug)]
pub struct MqttSettings {
    pub endpoint: MqttEndpoint,
    pub tls: TlsMaterials,
    pub client_id: String,
    pub credentials: Option<(String, String)>,
    pub device_name: String,
    pub topics: Topics,
    pub connect_timeout: Duration,
}

/// Broker link as observed by the connection thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Connected,
    Disconnected { reason: String },
}

#[derive(Debug)]
struct LinkInner {
    state: LinkState,
    /// Incremented on every accepted CONNACK.
    session: u64,
}

#[derive(Debug)]
struct Link {
    inner: Mutex<LinkInner>,
    changed: Condvar,
}

impl Link {
    fn new() -> Self {
        Self {
            inner: Mutex::new(LinkInner {
                state: LinkState::Connecting,
                session: 0,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LinkInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, state: LinkState) {
        let mut inner = self.lock();
        if state == LinkState::Connected {
            inner.session += 1;
        }
        inner.state = state;
        self.changed.notify_all();
    }

    fn snapshot(&self) -> (LinkState, u64) {
        let inner = self.lock();
        (inner.state.clone(), inner.session)
    }

    fn await_connected(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |inner| inner.state != LinkState::Connected)
            .unwrap_or_else(PoisonError::into_inner);
        guard.state == LinkState::Connected
    }
}

struct Runtime {
    client: Client,
    link: Arc<Link>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Runtime {
    fn spawn(client: Client, connection: Connection) -> Self {
        let link = Arc::new(Link::new());
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let link = Arc::clone(&link);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || drive_connection(connection, &link, &stop))
        };
        Self {
            client,
            link,
            stop,
            handle: Some(handle),
        }
    }

    /// Queue DISCONNECT behind any pending publishes and wait for the
    /// connection thread to put it on the wire.
    fn shutdown(mut self) -> Result<()> {
        let result = self
            .client
            .try_disconnect()
            .map_err(|e| anyhow!("MQTT disconnect failed: {}", e));
        // Only cuts a retry pause short; a live session ends on DISCONNECT.
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let deadline = Instant::now() + JOIN_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(POLL_SLICE);
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                log::debug!("MQTT connection thread still busy, detaching");
            }
        }
        result
    }
}

fn drive_connection(mut connection: Connection, link: &Link, stop: &AtomicBool) {
    let mut failing = false;
    for event in connection.iter() {
        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    log::info!("MQTT session established");
                    failing = false;
                    link.set(LinkState::Connected);
                } else {
                    log::error!("MQTT broker refused connection: {:?}", ack.code);
                    link.set(LinkState::Disconnected {
                        reason: format!("{:?}", ack.code),
                    });
                }
            }
            Ok(Event::Incoming(Packet::Disconnect(disconnect))) => {
                log::warn!("MQTT broker disconnected: {:?}", disconnect.reason_code);
                link.set(LinkState::Disconnected {
                    reason: format!("{:?}", disconnect.reason_code),
                });
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                log::debug!("MQTT DISCONNECT sent");
                break;
            }
            Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
            Err(_) if stop.load(Ordering::SeqCst) => break,
            Err(e) => {
                if failing {
                    log::debug!("MQTT connection error: {}", e);
                } else {
                    log::warn!("MQTT connection error: {} (retrying)", e);
                    failing = true;
                }
                link.set(LinkState::Disconnected {
                    reason: e.to_string(),
                });
                let resume = Instant::now() + RETRY_PAUSE;
                while Instant::now() < resume && !stop.load(Ordering::SeqCst) {
                    std::thread::sleep(POLL_SLICE);
                }
                if stop.load(Ordering::SeqCst) {
                    break;
                }
            }
        }
    }
}

/// Production [`GesturePublisher`] on rumqttc.
pub struct MqttPublisher {
    settings: MqttSettings,
    runtime: Option<Runtime>,
    announced_session: u64,
}

impl MqttPublisher {
    pub fn new(settings: MqttSettings) -> Self {
        Self {
            settings,
            runtime: None,
            announced_session: 0,
        }
    }

    fn options(&self) -> Result<MqttOptions> {
        let s = &self.settings;
        let mut options = MqttOptions::new(&s.client_id, &s.endpoint.host, s.endpoint.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_start(true);
        if let Some((user, password)) = &s.credentials {
            options.set_credentials(user, password);
        }
        options.set_last_will(LastWill::new(
            s.topics.availability.clone(),
            PAYLOAD_OFFLINE.as_bytes().to_vec(),
            QoS::AtLeastOnce,
            true,
            None,
        ));
        options.set_transport(s.endpoint.build_transport(&s.tls)?);
        Ok(options)
    }

    fn announce(&mut self, session: u64) -> Result<()> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| anyhow!("MQTT publisher is not connected"))?;
        let topics = &self.settings.topics;
        let config = HaSensorConfig::for_gesture_sensor(&self.settings.device_name, topics);
        let payload = serde_json::to_vec(&config).context("serialize discovery config")?;
        runtime
            .client
            .try_publish(&topics.discovery, QoS::AtLeastOnce, true, payload)
            .map_err(|e| anyhow!("failed to queue discovery config: {}", e))?;
        runtime
            .client
            .try_publish(
                &topics.availability,
                QoS::AtLeastOnce,
                true,
                PAYLOAD_ONLINE.as_bytes().to_vec(),
            )
            .map_err(|e| anyhow!("failed to queue availability: {}", e))?;
        self.announced_session = session;
        log::info!("announced gesture sensor on {}", topics.discovery);
        Ok(())
    }
}

impl GesturePublisher for MqttPublisher {
    fn connect(&mut self) -> Result<()> {
        if self.runtime.is_some() {
            return Ok(());
        }
        let options = self.options()?;
        log::info!(
            "connecting to MQTT broker {} (auth: {})",
            self.settings.endpoint,
            self.settings.credentials.is_some()
        );
        let (client, connection) = Client::new(options, REQUEST_CAPACITY);
        let runtime = Runtime::spawn(client, connection);

        if !runtime.link.await_connected(self.settings.connect_timeout) {
            let (state, _) = runtime.link.snapshot();
            let _ = runtime.shutdown();
            return Err(anyhow!(
                "MQTT broker {} unreachable after {:?}: {:?}",
                self.settings.endpoint,
                self.settings.connect_timeout,
                state
            ));
        }
        self.runtime = Some(runtime);
        self.maintain()
    }

    fn publish(&mut self, gesture: Gesture, confidence: f32, at: SystemTime) -> Result<()> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| anyhow!("MQTT publisher is not connected"))?;
        let (state, _) = runtime.link.snapshot();
        if state != LinkState::Connected {
            return Err(anyhow!("MQTT link is down ({:?}), dropping {}", state, gesture));
        }
        let payload = GestureStatePayload::new(gesture, confidence, at);
        let body = serde_json::to_vec(&payload).context("serialize gesture state")?;
        runtime
            .client
            .try_publish(&self.settings.topics.state, QoS::AtLeastOnce, false, body)
            .map_err(|e| anyhow!("failed to queue gesture state: {}", e))?;
        log::debug!("published {} ({:.2})", gesture, confidence);
        Ok(())
    }

    fn maintain(&mut self) -> Result<()> {
        let session = match &self.runtime {
            Some(runtime) => match runtime.link.snapshot() {
                (LinkState::Connected, session) => session,
                _ => return Ok(()),
            },
            None => return Ok(()),
        };
        if session > self.announced_session {
            self.announce(session)?;
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        let Some(runtime) = self.runtime.take() else {
            return Ok(());
        };
        log::info!("disconnecting from MQTT broker");
        if runtime.link.snapshot().0 == LinkState::Connected {
            // Graceful disconnect suppresses the will, so mark offline ourselves.
            let _ = runtime.client.try_publish(
                &self.settings.topics.availability,
                QoS::AtLeastOnce,
                true,
                PAYLOAD_OFFLINE.as_bytes().to_vec(),
            );
        }
        runtime.shutdown()
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            log::debug!("MQTT disconnect on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    #[test]
    fn link_counts_sessions() {
        let link = Link::new();
        assert!(!link.await_connected(Duration::from_millis(10)));
        link.set(LinkState::Connected);
        assert!(link.await_connected(Duration::from_millis(10)));
        link.set(LinkState::Disconnected {
            reason: "io".into(),
        });
        link.set(LinkState::Connected);
        assert_eq!(link.snapshot(), (LinkState::Connected, 2));
    }

    #[test]
    fn await_connected_wakes_on_change() {
        let link = Arc::new(Link::new());
        let setter = Arc::clone(&link);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            setter.set(LinkState::Connected);
        });
        assert!(link.await_connected(Duration::from_secs(5)));
        handle.join().unwrap();
    }

    fn test_settings(port: u16, connect_timeout: Duration) -> MqttSettings {
        MqttSettings {
            endpoint: MqttEndpoint::resolve("127.0.0.1", port, false).unwrap(),
            tls: TlsMaterials::default(),
            client_id: "test".into(),
            credentials: None,
            device_name: "gesture_control".into(),
            topics: Topics::new("homeassistant", "gesture_control", "mediapipe/gesture/state"),
            connect_timeout,
        }
    }

    #[test]
    fn publish_before_connect_fails() {
        let mut publisher = MqttPublisher::new(test_settings(1883, Duration::from_millis(10)));
        assert!(publisher
            .publish(Gesture::Peace, 0.9, SystemTime::now())
            .is_err());
        assert!(publisher.maintain().is_ok());
        assert!(publisher.disconnect().is_ok());
    }

    #[test]
    fn maintain_announces_once_per_session() {
        // Room for exactly one announcement (discovery + online).
        let options = MqttOptions::new("test", "127.0.0.1", 1883);
        let (client, _connection) = Client::new(options, 2);
        let link = Arc::new(Link::new());
        let mut publisher = MqttPublisher::new(test_settings(1883, Duration::from_millis(10)));
        publisher.runtime = Some(Runtime {
            client,
            link: Arc::clone(&link),
            stop: Arc::new(AtomicBool::new(false)),
            handle: None,
        });

        publisher.maintain().unwrap();
        assert_eq!(publisher.announced_session, 0);

        link.set(LinkState::Connected);
        publisher.maintain().unwrap();
        assert_eq!(publisher.announced_session, 1);

        // Same session: nothing is queued, so the full channel is never hit.
        publisher.maintain().unwrap();
        publisher.maintain().unwrap();
        assert_eq!(publisher.announced_session, 1);

        link.set(LinkState::Disconnected {
            reason: "io".into(),
        });
        publisher.maintain().unwrap();
        link.set(LinkState::Connected);
        // A new session re-announces, which now overflows the channel.
        assert!(publisher.maintain().is_err());
        assert_eq!(publisher.announced_session, 1);
    }

    const CONNECT: u8 = 1;
    const PUBLISH: u8 = 3;
    const DISCONNECT: u8 = 14;

    /// Minimal MQTT v5 broker: accepts one client, acks CONNECT and QoS 1
    /// publishes, and records `(packet type, body)` until DISCONNECT or EOF.
    fn fake_broker(listener: TcpListener) -> Vec<(u8, Vec<u8>)> {
        let (mut stream, _) = listener.accept().unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut packets = Vec::new();
        loop {
            let mut header = [0u8; 1];
            if stream.read_exact(&mut header).is_err() {
                break;
            }
            let mut len = 0usize;
            let mut shift = 0;
            loop {
                let mut byte = [0u8; 1];
                stream.read_exact(&mut byte).unwrap();
                len |= ((byte[0] & 0x7f) as usize) << shift;
                if byte[0] & 0x80 == 0 {
                    break;
                }
                shift += 7;
            }
            let mut body = vec![0u8; len];
            stream.read_exact(&mut body).unwrap();

            let kind = header[0] >> 4;
            match kind {
                CONNECT => stream.write_all(&[0x20, 0x03, 0x00, 0x00, 0x00]).unwrap(),
                PUBLISH if (header[0] >> 1) & 0x03 == 1 => {
                    let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
                    let pkid = &body[2 + topic_len..4 + topic_len];
                    stream.write_all(&[0x40, 0x02, pkid[0], pkid[1]]).unwrap();
                }
                _ => {}
            }
            packets.push((kind, body));
            if kind == DISCONNECT {
                break;
            }
        }
        packets
    }

    #[test]
    fn disconnect_marks_offline_then_sends_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let broker = std::thread::spawn(move || fake_broker(listener));

        let mut publisher = MqttPublisher::new(test_settings(port, Duration::from_secs(5)));
        publisher.connect().expect("connect");
        publisher.disconnect().expect("disconnect");

        let packets = broker.join().unwrap();
        let kinds: Vec<u8> = packets.iter().map(|(kind, _)| *kind).collect();
        assert_eq!(kinds.first(), Some(&CONNECT));
        assert_eq!(kinds.last(), Some(&DISCONNECT));

        let publishes: Vec<&Vec<u8>> = packets
            .iter()
            .filter(|(kind, _)| *kind == PUBLISH)
            .map(|(_, body)| body)
            .collect();
        assert_eq!(publishes.len(), 3);
        assert!(publishes[1].ends_with(PAYLOAD_ONLINE.as_bytes()));
        assert!(publishes[2].ends_with(PAYLOAD_OFFLINE.as_bytes()));
    }
}
