//! Core call identifiers and session records.

use crate::media::MediaSessionHandle;
use crate::state::CallState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque string uniquely naming one call attempt end-to-end.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier (32 uppercase hex chars).
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut bytes);
        Self(hex::encode_upper(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Peer identity on the encrypted message channel.
///
/// Opaque to this crate; the transport and crypto layers know how to route
/// to and encrypt for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDirection {
    Outgoing,
    Incoming,
}

/// Where a proposed-but-not-connected call currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingCallStatus {
    InvitationSent,
    InvitationReceived,
    Accepted,
    Rejected,
    Expired,
}

/// A call that has been proposed but not yet connected.
///
/// Exists only between invitation and acceptance/rejection/timeout; on
/// acceptance it is superseded by a [`CallSession`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCall {
    pub call_id: CallId,
    pub peer: PeerId,
    pub video: bool,
    pub direction: CallDirection,
    pub status: PendingCallStatus,
    pub created_at: DateTime<Utc>,
}

impl PendingCall {
    pub fn new_outgoing(call_id: CallId, peer: PeerId, video: bool) -> Self {
        Self {
            call_id,
            peer,
            video,
            direction: CallDirection::Outgoing,
            status: PendingCallStatus::InvitationSent,
            created_at: Utc::now(),
        }
    }

    pub fn new_incoming(call_id: CallId, peer: PeerId, video: bool) -> Self {
        Self {
            call_id,
            peer,
            video,
            direction: CallDirection::Incoming,
            status: PendingCallStatus::InvitationReceived,
            created_at: Utc::now(),
        }
    }
}

/// A live call. Exactly one per call identifier.
///
/// The media handles are opaque references owned by the media engine; this
/// crate only stores and forwards them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    pub call_id: CallId,
    pub peer: PeerId,
    pub video: bool,
    pub status: CallState,
    pub local_media: Option<MediaSessionHandle>,
    pub remote_media: Option<MediaSessionHandle>,
    pub created_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
}

impl CallSession {
    pub fn new(call_id: CallId, peer: PeerId, video: bool, status: CallState) -> Self {
        Self {
            call_id,
            peer,
            video,
            status,
            local_media: None,
            remote_media: None,
            created_at: Utc::now(),
            connected_at: None,
        }
    }

    /// Seconds between connect and now, if the call ever connected.
    pub fn duration_secs(&self) -> Option<i64> {
        self.connected_at
            .map(|at| Utc::now().signed_duration_since(at).num_seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_id_generate_is_unique_hex() {
        let a = CallId::generate();
        let b = CallId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_pending_call_constructors() {
        let out = PendingCall::new_outgoing(CallId::generate(), PeerId::new("bob"), true);
        assert_eq!(out.direction, CallDirection::Outgoing);
        assert_eq!(out.status, PendingCallStatus::InvitationSent);

        let inc = PendingCall::new_incoming(CallId::generate(), PeerId::new("alice"), false);
        assert_eq!(inc.direction, CallDirection::Incoming);
        assert_eq!(inc.status, PendingCallStatus::InvitationReceived);
    }
}
