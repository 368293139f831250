//! Signaling message definitions.
//!
//! These are the control-plane messages exchanged over the encrypted
//! message channel to establish and tear down a call. Every non-error
//! variant names the call it belongs to and carries a send timestamp.

use crate::media::{IceCandidatePayload, SessionDescription};
use crate::types::call::CallId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Call signaling message. Serialized as tagged JSON on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalingMessage {
    /// Invitation to a new call. First message of every call attempt.
    CallInvitation {
        call_id: CallId,
        video: bool,
        timestamp: DateTime<Utc>,
    },
    /// Callee accepted the invitation. Triggers the offer/answer exchange.
    CallAcceptance {
        call_id: CallId,
        timestamp: DateTime<Utc>,
    },
    /// Callee declined, or the caller withdrew a pending invitation.
    CallRejection {
        call_id: CallId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// SDP offer from the initiator.
    CallOffer {
        call_id: CallId,
        sdp: SessionDescription,
        timestamp: DateTime<Utc>,
    },
    /// SDP answer from the callee.
    CallAnswer {
        call_id: CallId,
        sdp: SessionDescription,
        timestamp: DateTime<Utc>,
    },
    /// One ICE candidate. May arrive before or after the offer/answer.
    IceCandidate {
        call_id: CallId,
        candidate: IceCandidatePayload,
        timestamp: DateTime<Utc>,
    },
    /// Either side hung up an accepted or connected call.
    CallTermination {
        call_id: CallId,
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// Protocol-level error report; also synthesized locally for inbound
    /// payloads that look like signaling but fail to decrypt or parse.
    Error {
        call_id: Option<CallId>,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl SignalingMessage {
    pub fn invitation(call_id: CallId, video: bool) -> Self {
        Self::CallInvitation {
            call_id,
            video,
            timestamp: Utc::now(),
        }
    }

    pub fn acceptance(call_id: CallId) -> Self {
        Self::CallAcceptance {
            call_id,
            timestamp: Utc::now(),
        }
    }

    pub fn rejection(call_id: CallId, reason: impl Into<String>) -> Self {
        Self::CallRejection {
            call_id,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn offer(call_id: CallId, sdp: SessionDescription) -> Self {
        Self::CallOffer {
            call_id,
            sdp,
            timestamp: Utc::now(),
        }
    }

    pub fn answer(call_id: CallId, sdp: SessionDescription) -> Self {
        Self::CallAnswer {
            call_id,
            sdp,
            timestamp: Utc::now(),
        }
    }

    pub fn ice_candidate(call_id: CallId, candidate: IceCandidatePayload) -> Self {
        Self::IceCandidate {
            call_id,
            candidate,
            timestamp: Utc::now(),
        }
    }

    pub fn termination(call_id: CallId, reason: Option<String>) -> Self {
        Self::CallTermination {
            call_id,
            reason,
            timestamp: Utc::now(),
        }
    }

    pub fn error(call_id: Option<CallId>, message: impl Into<String>) -> Self {
        Self::Error {
            call_id,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// The call this message belongs to, if it names one.
    pub fn call_id(&self) -> Option<&CallId> {
        match self {
            Self::CallInvitation { call_id, .. }
            | Self::CallAcceptance { call_id, .. }
            | Self::CallRejection { call_id, .. }
            | Self::CallOffer { call_id, .. }
            | Self::CallAnswer { call_id, .. }
            | Self::IceCandidate { call_id, .. }
            | Self::CallTermination { call_id, .. } => Some(call_id),
            Self::Error { call_id, .. } => call_id.as_ref(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::CallInvitation { timestamp, .. }
            | Self::CallAcceptance { timestamp, .. }
            | Self::CallRejection { timestamp, .. }
            | Self::CallOffer { timestamp, .. }
            | Self::CallAnswer { timestamp, .. }
            | Self::IceCandidate { timestamp, .. }
            | Self::CallTermination { timestamp, .. }
            | Self::Error { timestamp, .. } => *timestamp,
        }
    }

    /// Short tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CallInvitation { .. } => "invitation",
            Self::CallAcceptance { .. } => "acceptance",
            Self::CallRejection { .. } => "rejection",
            Self::CallOffer { .. } => "offer",
            Self::CallAnswer { .. } => "answer",
            Self::IceCandidate { .. } => "ice_candidate",
            Self::CallTermination { .. } => "termination",
            Self::Error { .. } => "error",
        }
    }
}

impl std::fmt::Display for SignalingMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.call_id() {
            Some(call_id) => write!(f, "{} ({call_id})", self.kind()),
            None => f.write_str(self.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::SdpKind;

    #[test]
    fn test_json_tagging_is_stable() {
        let message = SignalingMessage::invitation(CallId::new("ABCD"), true);
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "call_invitation");
        assert_eq!(json["call_id"], "ABCD");
        assert_eq!(json["video"], true);
    }

    #[test]
    fn test_call_id_accessor() {
        let call_id = CallId::new("X1");
        assert_eq!(
            SignalingMessage::acceptance(call_id.clone()).call_id(),
            Some(&call_id)
        );
        assert_eq!(SignalingMessage::error(None, "bad").call_id(), None);
        assert_eq!(
            SignalingMessage::error(Some(call_id.clone()), "bad").call_id(),
            Some(&call_id)
        );
    }

    #[test]
    fn test_serde_round_trip_every_variant() {
        let call_id = CallId::new("AC90CFD09DF712D981142B172706F9F2");
        let sdp = SessionDescription {
            kind: SdpKind::Offer,
            sdp: "v=0\r\no=- 0 0 IN IP4 0.0.0.0".to_string(),
        };
        let variants = vec![
            SignalingMessage::invitation(call_id.clone(), true),
            SignalingMessage::acceptance(call_id.clone()),
            SignalingMessage::rejection(call_id.clone(), "Busy"),
            SignalingMessage::offer(call_id.clone(), sdp.clone()),
            SignalingMessage::answer(
                call_id.clone(),
                SessionDescription {
                    kind: SdpKind::Answer,
                    ..sdp
                },
            ),
            SignalingMessage::ice_candidate(
                call_id.clone(),
                crate::media::IceCandidatePayload::new("candidate:1 1 UDP 1 10.0.0.1 1 typ host"),
            ),
            SignalingMessage::termination(call_id.clone(), Some("User ended".to_string())),
            SignalingMessage::error(Some(call_id), "unknown call"),
        ];

        for message in variants {
            let bytes = serde_json::to_vec(&message).unwrap();
            let decoded: SignalingMessage = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(decoded, message);
        }
    }
}
