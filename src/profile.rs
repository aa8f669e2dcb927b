//! `KernelProfile`: the connection descriptor shared between a kernel and
//! its clients (§4.D, §6).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// ZeroMQ transport scheme for a kernel's sockets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// TCP over the given `ip` interface.
    Tcp,
    /// Unix domain sockets, using `ip` as a path prefix.
    Ipc,
}

/// Message-signing scheme. Only `hmac-sha256` is supported (§4.D); an empty
/// `key` disables signing entirely regardless of this field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureScheme {
    /// HMAC with SHA-256, the only scheme this crate implements.
    #[serde(rename = "hmac-sha256")]
    HmacSha256,
}

/// The connection descriptor shared between a kernel and its clients: the
/// transport, interface, five channel ports, signing scheme, and signing
/// key. Serializes to the Jupyter connection file format (§6).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelProfile {
    pub transport: Transport,
    pub ip: String,
    pub signature_scheme: SignatureScheme,
    /// Held as raw bytes in memory; round-trips as a hex string on the wire
    /// (§4.D), mirroring the raw-bytes-vs-hex-string split the teacher's
    /// `sign_message(signing_key: &str, ...)` makes explicit at its API
    /// boundary.
    #[serde(with = "key_as_hex")]
    pub key: Vec<u8>,
    pub shell_port: u16,
    pub iopub_port: u16,
    pub control_port: u16,
    pub stdin_port: u16,
    pub hb_port: u16,
}

impl KernelProfile {
    /// A profile with all ports unbound (`0`), `tcp` transport on the
    /// loopback interface, and a freshly generated signing key. Suitable as
    /// a starting point for a kernel that will bind dynamic ports.
    pub fn new_dynamic() -> Self {
        KernelProfile {
            transport: Transport::Tcp,
            ip: "127.0.0.1".to_string(),
            signature_scheme: SignatureScheme::HmacSha256,
            key: generate_key(),
            shell_port: 0,
            iopub_port: 0,
            control_port: 0,
            stdin_port: 0,
            hb_port: 0,
        }
    }

    /// Read and parse a connection file (client side).
    pub fn read_connection_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())
            .map_err(|e| Error::ConnectionFile(format!("reading {}: {e}", path.as_ref().display())))?;

        // Checked ahead of the real parse so an unknown scheme reports the
        // dedicated, documented error instead of serde's generic "unknown
        // variant" message.
        let raw: serde_json::Value = serde_json::from_str(&text).map_err(Error::Json)?;
        if let Some(scheme) = raw.get("signature_scheme").and_then(serde_json::Value::as_str) {
            if scheme != "hmac-sha256" {
                return Err(Error::UnsupportedSignatureScheme(scheme.to_string()));
            }
        }

        serde_json::from_value(raw).map_err(Error::Json)
    }

    /// Serialize this profile (normally post-bind, with effective ports) to
    /// a connection file (kernel side).
    pub fn write_connection_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), text)
            .map_err(|e| Error::ConnectionFile(format!("writing {}: {e}", path.as_ref().display())))
    }

    /// The `tcp://ip:port` (or `ipc://ip-port`) endpoint URL for one of this
    /// profile's channels.
    pub fn endpoint(&self, port: u16) -> String {
        match self.transport {
            Transport::Tcp => format!("tcp://{}:{}", self.ip, port),
            Transport::Ipc => format!("ipc://{}-{}", self.ip, port),
        }
    }
}

fn generate_key() -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

mod key_as_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(key))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Ok(Vec::new());
        }
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_connection_file_json() {
        let mut profile = KernelProfile::new_dynamic();
        profile.shell_port = 50001;
        profile.iopub_port = 50002;
        profile.control_port = 50003;
        profile.stdin_port = 50004;
        profile.hb_port = 50005;

        let json = serde_json::to_string(&profile).unwrap();
        let parsed: KernelProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, profile);
    }

    #[test]
    fn key_round_trips_as_hex_string() {
        let profile = KernelProfile {
            key: vec![0xde, 0xad, 0xbe, 0xef],
            ..KernelProfile::new_dynamic()
        };
        let value: serde_json::Value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["key"], serde_json::json!("deadbeef"));
    }

    #[test]
    fn empty_key_round_trips_as_empty_string() {
        let profile = KernelProfile {
            key: Vec::new(),
            ..KernelProfile::new_dynamic()
        };
        let value: serde_json::Value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["key"], serde_json::json!(""));
        let parsed: KernelProfile = serde_json::from_value(value).unwrap();
        assert!(parsed.key.is_empty());
    }

    #[test]
    fn unsupported_signature_scheme_is_rejected() {
        let path = std::env::temp_dir().join("jupyter-wire-test-unsupported-scheme.json");
        let json = r#"{
            "transport":"tcp","ip":"127.0.0.1","signature_scheme":"hmac-sha384",
            "key":"abab",
            "shell_port":1,"iopub_port":2,"control_port":3,"stdin_port":4,"hb_port":5
        }"#;
        fs::write(&path, json).unwrap();
        let err = KernelProfile::read_connection_file(&path).unwrap_err();
        assert!(matches!(err, Error::UnsupportedSignatureScheme(scheme) if scheme == "hmac-sha384"));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn parses_canonical_connection_file_shape() {
        let json = r#"{
            "transport":"tcp","ip":"127.0.0.1","signature_scheme":"hmac-sha256",
            "key":"abab",
            "shell_port":1,"iopub_port":2,"control_port":3,"stdin_port":4,"hb_port":5
        }"#;
        let profile: KernelProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.key, vec![0xab, 0xab]);
        assert_eq!(profile.shell_port, 1);
        assert_eq!(profile.endpoint(1), "tcp://127.0.0.1:1");
    }
}
