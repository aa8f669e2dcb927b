//! Message headers: per-message metadata shared by every family in the
//! algebra (§3, §4.A).

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::identifier::{new_uuid, DEFAULT_USERNAME, PROTOCOL_VERSION};

/// Per-message metadata: who created it, when, what kind it is, and which
/// session/protocol version it belongs to.
///
/// `date` is optional when parsing (some kernels omit it or send malformed
/// timestamps) but this crate always fills it in when constructing a header
/// to send.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Unique ID of this message.
    #[serde(rename = "msg_id")]
    pub message_id: Uuid,

    /// ID of the session that created this message.
    pub session: Uuid,

    /// Free-text username; defaults to `"default-username"` when absent.
    #[serde(default = "default_username")]
    pub username: String,

    /// Creation timestamp, ISO-8601. Optional in parse, always emitted on
    /// send.
    #[serde(default, with = "self::iso8601_opt")]
    pub date: Option<OffsetDateTime>,

    /// The wire tag identifying which payload variant `content` decodes as.
    pub msg_type: String,

    /// Protocol version string, e.g. `"5.0"`.
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_username() -> String {
    DEFAULT_USERNAME.to_string()
}

fn default_version() -> String {
    PROTOCOL_VERSION.to_string()
}

impl PartialEq for MessageHeader {
    /// Headers compare by identity and tag, ignoring the timestamp: two
    /// independently-constructed headers for "the same" message (e.g. in a
    /// round-trip test) should compare equal even if the clock ticked
    /// between encode and decode.
    fn eq(&self, other: &Self) -> bool {
        self.message_id == other.message_id
            && self.session == other.session
            && self.username == other.username
            && self.msg_type == other.msg_type
            && self.version == other.version
    }
}

/// Build a fresh header for a message a caller is originating (not a reply
/// to anything).
pub fn make_request_header(session: Uuid, username: Option<&str>, msg_type: &str) -> MessageHeader {
    MessageHeader {
        message_id: new_uuid(),
        session,
        username: username.unwrap_or(DEFAULT_USERNAME).to_string(),
        date: Some(OffsetDateTime::now_utc()),
        msg_type: msg_type.to_string(),
        version: PROTOCOL_VERSION.to_string(),
    }
}

/// Build a header for a message replying to `parent`: the session, username,
/// and protocol version are copied from `parent`; `parent_header` (held
/// alongside, not inside, this header) is expected to be set to a clone of
/// `parent` by the caller.
pub fn make_reply_header(parent: &MessageHeader, msg_type: &str) -> MessageHeader {
    MessageHeader {
        message_id: new_uuid(),
        session: parent.session,
        username: parent.username.clone(),
        date: Some(OffsetDateTime::now_utc()),
        msg_type: msg_type.to_string(),
        version: parent.version.clone(),
    }
}

mod iso8601_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::format_description::well_known::Iso8601;
    use time::OffsetDateTime;

    pub fn serialize<S>(date: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(date) => {
                let formatted = date
                    .format(&Iso8601::DEFAULT)
                    .map_err(serde::ser::Error::custom)?;
                serializer.serialize_str(&formatted)
            }
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(match raw {
            Some(raw) if !raw.is_empty() => OffsetDateTime::parse(&raw, &Iso8601::DEFAULT).ok(),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_header_has_no_parent_and_fresh_id() {
        let session = new_uuid();
        let a = make_request_header(session, None, "execute_request");
        let b = make_request_header(session, None, "execute_request");
        assert_eq!(a.username, DEFAULT_USERNAME);
        assert_eq!(a.session, session);
        assert_ne!(a.message_id, b.message_id);
        assert!(a.date.is_some());
    }

    #[test]
    fn reply_header_copies_session_and_username() {
        let parent = make_request_header(new_uuid(), Some("alice"), "execute_request");
        let reply = make_reply_header(&parent, "execute_reply");
        assert_eq!(reply.session, parent.session);
        assert_eq!(reply.username, parent.username);
        assert_eq!(reply.version, parent.version);
        assert_ne!(reply.message_id, parent.message_id);
        assert_eq!(reply.msg_type, "execute_reply");
    }

    #[test]
    fn date_round_trips_through_json() {
        let header = make_request_header(new_uuid(), None, "kernel_info_request");
        let json = serde_json::to_string(&header).unwrap();
        let decoded: MessageHeader = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, header);
        assert!(decoded.date.is_some());
    }

    #[test]
    fn missing_date_parses_to_none() {
        let json = r#"{"msg_id":"3b241101-e2bb-4255-8caf-4136c566a962","session":"3b241101-e2bb-4255-8caf-4136c566a963","msg_type":"kernel_info_request"}"#;
        let decoded: MessageHeader = serde_json::from_str(json).unwrap();
        assert_eq!(decoded.date, None);
        assert_eq!(decoded.username, DEFAULT_USERNAME);
        assert_eq!(decoded.version, "5.0");
    }
}
