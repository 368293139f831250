//! Control-plane signaling over the encrypted message channel.

pub mod channel;
pub mod message;

pub use channel::{
    CallCrypto, DeliveryToken, InboundEnvelope, SignalingChannel, SignalingEvent,
    SignalingTransport, SIGNALING_MAGIC,
};
pub use message::SignalingMessage;
