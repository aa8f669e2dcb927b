//! Blanket glue tying each payload family to a uniform encode interface used
//! by the envelope layer.

use serde_json::Value;

use super::{ClientReply, ClientRequest, Comm, KernelOutput, KernelReply, KernelRequest, Tagged};

/// A payload family that can encode itself to a JSON `content` body. Every
/// member of the message algebra (§3) implements this; decoding is done via
/// each family's own `decode(msg_type, content)` associated function, since
/// the families don't share a return type.
pub trait Payload: Tagged {
    /// Encode this value's `content` body.
    fn encode_content(&self) -> Value;
}

macro_rules! impl_payload {
    ($ty:ty) => {
        impl Payload for $ty {
            fn encode_content(&self) -> Value {
                self.encode()
            }
        }
    };
}

impl_payload!(ClientRequest);
impl_payload!(KernelReply);
impl_payload!(KernelOutput);
impl_payload!(KernelRequest);
impl_payload!(ClientReply);
impl_payload!(Comm);
