//! `Comm`: free-form, unsolicited, symmetric messages identified by a UUID
//! (§3, §4.B, §6).

use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::{Tagged, TargetModule, TargetName};
use crate::error::ProtocolError;

/// A comm message; either side may open, message, or close a comm.
#[derive(Clone, Debug, PartialEq)]
pub enum Comm {
    /// Open a new comm with the given ID, initial payload, and target.
    CommOpen(Uuid, Value, TargetName, Option<TargetModule>),
    /// Close an existing comm, with a final payload.
    CommClose(Uuid, Value),
    /// Send a payload over an existing comm.
    CommMessage(Uuid, Value),
}

impl Comm {
    /// The comm ID this message refers to.
    pub fn comm_id(&self) -> Uuid {
        match self {
            Comm::CommOpen(id, ..) | Comm::CommClose(id, ..) | Comm::CommMessage(id, ..) => *id,
        }
    }
}

impl Tagged for Comm {
    fn msg_type(&self) -> &'static str {
        match self {
            Comm::CommOpen(..) => "comm_open",
            Comm::CommClose(..) => "comm_close",
            Comm::CommMessage(..) => "comm_msg",
        }
    }
}

impl Comm {
    /// Encode this comm message's `content` body as JSON.
    pub fn encode(&self) -> Value {
        match self {
            Comm::CommOpen(id, data, target_name, target_module) => {
                let mut value = serde_json::json!({
                    "comm_id": id,
                    "data": data,
                    "target_name": target_name,
                });
                if let Some(target_module) = target_module {
                    value["target_module"] = serde_json::json!(target_module);
                }
                value
            }
            Comm::CommClose(id, data) => serde_json::json!({
                "comm_id": id,
                "data": data,
            }),
            Comm::CommMessage(id, data) => serde_json::json!({
                "comm_id": id,
                "data": data,
            }),
        }
    }

    /// Decode a comm message's `content` body, given the header's
    /// `msg_type`.
    pub fn decode(msg_type: &str, content: Value) -> Result<Self, ProtocolError> {
        let err = |e: serde_json::Error| super::decode_error(msg_type, e);
        Ok(match msg_type {
            "comm_open" => {
                #[derive(Deserialize)]
                struct Wire {
                    comm_id: Uuid,
                    #[serde(default)]
                    data: Value,
                    target_name: String,
                    #[serde(default)]
                    target_module: Option<String>,
                }
                let wire: Wire = serde_json::from_value(content).map_err(err)?;
                Comm::CommOpen(wire.comm_id, wire.data, wire.target_name, wire.target_module)
            }
            "comm_close" => {
                #[derive(Deserialize)]
                struct Wire {
                    comm_id: Uuid,
                    #[serde(default)]
                    data: Value,
                }
                let wire: Wire = serde_json::from_value(content).map_err(err)?;
                Comm::CommClose(wire.comm_id, wire.data)
            }
            "comm_msg" => {
                #[derive(Deserialize)]
                struct Wire {
                    comm_id: Uuid,
                    #[serde(default)]
                    data: Value,
                }
                let wire: Wire = serde_json::from_value(content).map_err(err)?;
                Comm::CommMessage(wire.comm_id, wire.data)
            }
            other => return Err(ProtocolError::UnknownMessageType(other.to_string())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_variant() {
        let id = Uuid::new_v4();
        let cases = vec![
            Comm::CommOpen(id, serde_json::json!({"state": 1}), "jupyter.widget".into(), Some("ipywidgets".into())),
            Comm::CommOpen(id, Value::Null, "jupyter.widget".into(), None),
            Comm::CommClose(id, serde_json::json!({})),
            Comm::CommMessage(id, serde_json::json!({"method": "update"})),
        ];
        for case in cases {
            let tag = case.msg_type();
            let encoded = case.encode();
            let decoded = Comm::decode(tag, encoded).unwrap();
            assert_eq!(decoded, case);
        }
    }

    #[test]
    fn comm_id_accessor() {
        let id = Uuid::new_v4();
        let comm = Comm::CommMessage(id, Value::Null);
        assert_eq!(comm.comm_id(), id);
    }
}
