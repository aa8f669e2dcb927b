//! UUIDs used as message, session, and comm identifiers.
//!
//! Every identifier in the protocol is a UUID in canonical lowercase-hex
//! form, generated from a cryptographic RNG. We re-export `uuid::Uuid`
//! directly rather than wrapping it: its `Serialize`/`Deserialize` impls
//! already produce the canonical hyphenated string Jupyter expects, and
//! its `PartialEq` is already byte-wise.

use uuid::Uuid;

/// Generate a fresh random UUID in canonical form.
pub fn new_uuid() -> Uuid {
    Uuid::new_v4()
}

/// The default username used when a caller doesn't provide one.
pub const DEFAULT_USERNAME: &str = "default-username";

/// The protocol version we emit on headers we construct.
pub const PROTOCOL_VERSION: &str = "5.0";
