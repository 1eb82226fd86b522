//! Broker endpoint and TLS material handling.
//!
//! Mirrors the Home Assistant MQTT TLS options:
//! - CA verification: custom CA path or the bundled webpki roots
//! - Client certificates: mutual TLS, cert and key supplied together

use anyhow::{anyhow, Context, Result};
use rumqttc::Transport;
use std::path::Path;

/// TLS certificate materials for the broker connection.
#[derive(Clone, Debug, Default)]
pub struct TlsMaterials {
    /// PEM-encoded CA certificate. `None` uses the default root store.
    pub ca: Option<Vec<u8>>,

    /// PEM-encoded client certificate and key for mutual TLS.
    pub client_auth: Option<(Vec<u8>, Vec<u8>)>,
}

impl TlsMaterials {
    pub fn load(
        ca_path: Option<&Path>,
        client_cert_path: Option<&Path>,
        client_key_path: Option<&Path>,
    ) -> Result<Self> {
        let ca = ca_path
            .map(|path| {
                std::fs::read(path)
                    .with_context(|| format!("failed to read MQTT TLS CA '{}'", path.display()))
            })
            .transpose()?;

        let client_auth = match (client_cert_path, client_key_path) {
            (Some(cert_path), Some(key_path)) => {
                let cert = std::fs::read(cert_path).with_context(|| {
                    format!(
                        "failed to read MQTT TLS client cert '{}'",
                        cert_path.display()
                    )
                })?;
                let key = std::fs::read(key_path).with_context(|| {
                    format!(
                        "failed to read MQTT TLS client key '{}'",
                        key_path.display()
                    )
                })?;
                Some((cert, key))
            }
            (None, None) => None,
            (Some(_), None) => {
                return Err(anyhow!("MQTT TLS client certificate provided without key"))
            }
            (None, Some(_)) => {
                return Err(anyhow!("MQTT TLS client key provided without certificate"))
            }
        };

        Ok(Self { ca, client_auth })
    }

    pub fn is_configured(&self) -> bool {
        self.ca.is_some() || self.client_auth.is_some()
    }
}

/// Resolved broker address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

impl MqttEndpoint {
    /// Resolve the broker setting plus port into an endpoint.
    ///
    /// Accepts a bare host (`core-mosquitto`), a scheme-qualified host
    /// (`mqtt://`, `tcp://`, `mqtts://`, `ssl://`) and an optional explicit
    /// port (`host:1884`, `[::1]:1883`) which overrides `default_port`.
    pub fn resolve(broker: &str, default_port: u16, tls_override: bool) -> Result<Self> {
        let mut use_tls = tls_override;
        let mut remainder = broker.trim();

        if let Some((scheme, rest)) = remainder.split_once("://") {
            match scheme {
                "mqtt" | "tcp" => {}
                "mqtts" | "ssl" => use_tls = true,
                other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
            }
            remainder = rest;
        }
        let remainder = remainder.trim_end_matches('/');
        if remainder.is_empty() {
            return Err(anyhow!("MQTT broker host is empty"));
        }

        let (host, port) = split_host_port(remainder, default_port)?;
        Ok(Self {
            host,
            port,
            use_tls,
        })
    }

    /// Build the rumqttc transport for this endpoint.
    pub fn build_transport(&self, materials: &TlsMaterials) -> Result<Transport> {
        if !self.use_tls {
            if materials.is_configured() {
                return Err(anyhow!(
                    "MQTT TLS materials provided but TLS is disabled; \
                     set MQTT_USE_TLS or use an mqtts:// broker"
                ));
            }
            return Ok(Transport::tcp());
        }

        if !materials.is_configured() {
            return Ok(Transport::tls_with_default_config());
        }

        let ca = materials.ca.clone().ok_or_else(|| {
            anyhow!(
                "MQTT TLS CA certificate is required when providing client certificates; \
                 set MQTT_TLS_CA_PATH"
            )
        })?;
        Ok(Transport::tls(ca, materials.client_auth.clone(), None))
    }
}

impl std::fmt::Display for MqttEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = if self.use_tls { "mqtts" } else { "mqtt" };
        if self.host.contains(':') {
            write!(f, "{}://[{}]:{}", scheme, self.host, self.port)
        } else {
            write!(f, "{}://{}:{}", scheme, self.host, self.port)
        }
    }
}

fn split_host_port(addr: &str, default_port: u16) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = match rest.strip_prefix(':') {
            Some(port) => parse_port(port, addr)?,
            None if rest.is_empty() => default_port,
            None => return Err(anyhow!("invalid MQTT address: {}", addr)),
        };
        return Ok((host.to_string(), port));
    }

    // A bare IPv6 literal has several colons and no port.
    if addr.matches(':').count() > 1 {
        return Ok((addr.to_string(), default_port));
    }

    match addr.rsplit_once(':') {
        Some((host, port)) => Ok((host.to_string(), parse_port(port, addr)?)),
        None => Ok((addr.to_string(), default_port)),
    }
}

fn parse_port(port: &str, addr: &str) -> Result<u16> {
    port.parse()
        .with_context(|| format!("invalid MQTT port in {}", addr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn bare_host_uses_configured_port() {
        let ep = MqttEndpoint::resolve("core-mosquitto", 1883, false).unwrap();
        assert_eq!(ep.host, "core-mosquitto");
        assert_eq!(ep.port, 1883);
        assert!(!ep.use_tls);
    }

    #[test]
    fn explicit_port_wins() {
        let ep = MqttEndpoint::resolve("mqtt://broker.lan:1884", 1883, false).unwrap();
        assert_eq!(ep.host, "broker.lan");
        assert_eq!(ep.port, 1884);
    }

    #[test]
    fn mqtts_scheme_enables_tls() {
        let ep = MqttEndpoint::resolve("mqtts://broker.example.com", 8883, false).unwrap();
        assert!(ep.use_tls);
        assert_eq!(ep.to_string(), "mqtts://broker.example.com:8883");
    }

    #[test]
    fn ipv6_forms() {
        let ep = MqttEndpoint::resolve("[::1]:1884", 1883, false).unwrap();
        assert_eq!((ep.host.as_str(), ep.port), ("::1", 1884));
        let ep = MqttEndpoint::resolve("::1", 1883, false).unwrap();
        assert_eq!((ep.host.as_str(), ep.port), ("::1", 1883));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(MqttEndpoint::resolve("ws://broker", 1883, false).is_err());
        assert!(MqttEndpoint::resolve("broker:notaport", 1883, false).is_err());
        assert!(MqttEndpoint::resolve("  ", 1883, false).is_err());
    }

    #[test]
    fn tls_materials_require_both_cert_and_key() {
        let cert = PathBuf::from("/nonexistent/cert.pem");
        let result = TlsMaterials::load(None, Some(cert.as_path()), None);
        assert!(result.unwrap_err().to_string().contains("without key"));
    }

    #[test]
    fn materials_without_tls_are_rejected() {
        let ep = MqttEndpoint::resolve("broker", 1883, false).unwrap();
        let materials = TlsMaterials {
            ca: Some(b"ca".to_vec()),
            client_auth: None,
        };
        assert!(ep.build_transport(&materials).is_err());
        assert!(ep.build_transport(&TlsMaterials::default()).is_ok());
    }
}
