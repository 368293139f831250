//! Call session core: signaling, lifecycle and adaptive quality control
//! for one-to-one calls carried over an end-to-end-encrypted message
//! channel.
//!
//! The crate owns the control plane only. Media capture, peer connections
//! and payload encryption live behind the [`media::MediaEngine`],
//! [`signaling::SignalingTransport`] and [`signaling::CallCrypto`] seams;
//! the [`coordinator::CallSessionCoordinator`] drives everything between
//! them and publishes progress on a typed [`types::events::EventBus`].

pub mod coordinator;
pub mod error;
pub mod ice;
pub mod media;
pub mod quality;
pub mod signaling;
pub mod state;
pub mod test_utils;
pub mod types;

pub use coordinator::{CallSessionCoordinator, CoordinatorConfig};
pub use error::CallError;
pub use ice::{IceServer, IceServerProvider};
pub use quality::{
    BandwidthEstimator, CodecSelector, CodecSettings, NetworkCondition, QualityController,
    VideoQuality,
};
pub use signaling::{SignalingChannel, SignalingMessage};
pub use state::{is_valid_transition, transition, CallEvent, CallState};
pub use types::call::{CallId, CallSession, PeerId, PendingCall};
pub use types::events::{CallQualityEvent, CallStateEvent, EventBus};
