//! Encrypted signaling channel.
//!
//! Turns a [`SignalingMessage`] into an opaque encrypted payload for the
//! external transport and classifies inbound payloads back into signaling
//! events. The transport carries all kinds of application traffic; a short
//! magic prefix marks call signaling so everything else can be skipped
//! cheaply. This is a best-effort classifier, not a strict protocol framer:
//! payloads without the prefix are silently ignored, while prefixed
//! payloads that fail to decrypt or parse surface as an `Error` message so
//! the coordinator can react.

use super::message::SignalingMessage;
use crate::error::CallError;
use crate::types::call::PeerId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, trace};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Prefix identifying call-signaling payloads on the shared transport.
pub const SIGNALING_MAGIC: [u8; 4] = *b"CSG1";

/// Transport acknowledgment for one sent payload.
pub type DeliveryToken = String;

/// One payload delivered by the external transport.
#[derive(Debug, Clone)]
pub struct InboundEnvelope {
    pub from: PeerId,
    pub payload: Vec<u8>,
    pub delivery_token: DeliveryToken,
    pub timestamp: DateTime<Utc>,
}

/// A classified inbound signaling message.
#[derive(Debug, Clone)]
pub struct SignalingEvent {
    pub from: PeerId,
    pub message: SignalingMessage,
    pub delivery_token: DeliveryToken,
    pub timestamp: DateTime<Utc>,
}

/// The external end-to-end-encrypted message transport.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Deliver an opaque payload to a peer identity.
    async fn send(&self, peer: &PeerId, payload: Vec<u8>) -> Result<DeliveryToken, CallError>;

    /// Lazy, restartable stream of inbound payloads for an identity.
    async fn subscribe_inbound(&self, identity: &PeerId) -> mpsc::Receiver<InboundEnvelope>;
}

/// Per-peer payload encryption, implemented outside this crate.
#[async_trait]
pub trait CallCrypto: Send + Sync {
    /// Encrypt for the peer's current identity key.
    async fn encrypt_for(&self, peer: &PeerId, plaintext: &[u8]) -> Result<Vec<u8>, CallError>;

    async fn decrypt_from(&self, peer: &PeerId, ciphertext: &[u8]) -> Result<Vec<u8>, CallError>;
}

/// Serializes, encrypts and classifies signaling traffic.
pub struct SignalingChannel {
    crypto: Arc<dyn CallCrypto>,
    transport: Arc<dyn SignalingTransport>,
}

impl SignalingChannel {
    pub fn new(crypto: Arc<dyn CallCrypto>, transport: Arc<dyn SignalingTransport>) -> Arc<Self> {
        Arc::new(Self { crypto, transport })
    }

    /// Serialize, encrypt and hand the message to the transport.
    pub async fn send(
        &self,
        peer: &PeerId,
        message: &SignalingMessage,
    ) -> Result<DeliveryToken, CallError> {
        let body =
            serde_json::to_vec(message).map_err(|e| CallError::Parse(e.to_string()))?;
        let ciphertext = self.crypto.encrypt_for(peer, &body).await?;

        let mut payload = Vec::with_capacity(SIGNALING_MAGIC.len() + ciphertext.len());
        payload.extend_from_slice(&SIGNALING_MAGIC);
        payload.extend_from_slice(&ciphertext);

        let token = self.transport.send(peer, payload).await?;
        trace!(target: "Call/Signaling", "Sent {message} to {peer} (token {token})");
        Ok(token)
    }

    /// Classify one inbound payload.
    ///
    /// Returns `None` for non-signaling traffic. Prefixed payloads that
    /// fail to decrypt or parse come back as a `SignalingMessage::Error`
    /// event rather than being dropped.
    pub async fn classify_inbound(&self, envelope: InboundEnvelope) -> Option<SignalingEvent> {
        let Some(ciphertext) = envelope.payload.strip_prefix(&SIGNALING_MAGIC[..]) else {
            trace!(
                target: "Call/Signaling",
                "Skipping non-signaling payload from {} ({} bytes)",
                envelope.from,
                envelope.payload.len()
            );
            return None;
        };

        let message = match self.crypto.decrypt_from(&envelope.from, ciphertext).await {
            Ok(plaintext) => match serde_json::from_slice::<SignalingMessage>(&plaintext) {
                Ok(message) => message,
                Err(e) => {
                    debug!(
                        target: "Call/Signaling",
                        "Corrupted signaling message from {}: {e}",
                        envelope.from
                    );
                    SignalingMessage::error(None, format!("corrupted signaling message: {e}"))
                }
            },
            Err(e) => {
                debug!(
                    target: "Call/Signaling",
                    "Undecryptable signaling message from {}: {e}",
                    envelope.from
                );
                SignalingMessage::error(None, format!("undecryptable signaling message: {e}"))
            }
        };

        Some(SignalingEvent {
            from: envelope.from,
            message,
            delivery_token: envelope.delivery_token,
            timestamp: envelope.timestamp,
        })
    }

    /// Subscribe to classified signaling events for an identity.
    ///
    /// Spawns a background task that drains the transport's inbound stream;
    /// the task exits when either side of the pipe closes.
    pub async fn subscribe(
        self: &Arc<Self>,
        identity: &PeerId,
    ) -> mpsc::Receiver<SignalingEvent> {
        let (tx, rx) = mpsc::channel(64);
        let mut inbound = self.transport.subscribe_inbound(identity).await;
        let channel = Arc::clone(self);
        let identity = identity.clone();

        tokio::spawn(async move {
            while let Some(envelope) = inbound.recv().await {
                if let Some(event) = channel.classify_inbound(envelope).await
                    && tx.send(event).await.is_err()
                {
                    break;
                }
            }
            debug!(target: "Call/Signaling", "Inbound stream for {identity} closed");
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{SdpKind, SessionDescription};
    use crate::test_utils::{InMemoryRouter, XorCrypto};
    use crate::types::call::CallId;

    fn channel_for(router: &Arc<InMemoryRouter>, identity: &str) -> Arc<SignalingChannel> {
        SignalingChannel::new(
            Arc::new(XorCrypto),
            router.endpoint(PeerId::new(identity)),
        )
    }

    /// Encode, encrypt, decrypt, decode yields the original message for
    /// every variant.
    #[tokio::test]
    async fn test_wire_round_trip_every_variant() {
        let router = InMemoryRouter::new();
        let alice = channel_for(&router, "alice");
        let bob = channel_for(&router, "bob");
        let mut inbox = bob.subscribe(&PeerId::new("bob")).await;

        let call_id = CallId::generate();
        let sdp = SessionDescription {
            kind: SdpKind::Offer,
            sdp: "v=0".to_string(),
        };
        let messages = vec![
            SignalingMessage::invitation(call_id.clone(), true),
            SignalingMessage::acceptance(call_id.clone()),
            SignalingMessage::rejection(call_id.clone(), "Busy"),
            SignalingMessage::offer(call_id.clone(), sdp.clone()),
            SignalingMessage::answer(call_id.clone(), sdp),
            SignalingMessage::ice_candidate(
                call_id.clone(),
                crate::media::IceCandidatePayload::new("candidate:1"),
            ),
            SignalingMessage::termination(call_id.clone(), None),
            SignalingMessage::error(Some(call_id), "remote error"),
        ];

        for message in messages {
            alice.send(&PeerId::new("bob"), &message).await.unwrap();
            let event = inbox.recv().await.unwrap();
            assert_eq!(event.message, message);
            assert_eq!(event.from, PeerId::new("alice"));
        }
    }

    #[tokio::test]
    async fn test_send_without_route_is_a_transport_error() {
        let router = InMemoryRouter::new();
        let alice = channel_for(&router, "alice");

        let message = SignalingMessage::acceptance(CallId::generate());
        let result = alice.send(&PeerId::new("nobody"), &message).await;
        assert!(matches!(result, Err(CallError::Transport(_))));
    }

    #[tokio::test]
    async fn test_non_signaling_payloads_are_skipped() {
        let router = InMemoryRouter::new();
        let alice = channel_for(&router, "alice");
        let bob = channel_for(&router, "bob");
        let mut inbox = bob.subscribe(&PeerId::new("bob")).await;

        router
            .inject(&PeerId::new("bob"), PeerId::new("alice"), b"hello, not a call".to_vec())
            .await;
        // A real message afterwards shows the first one was skipped, not queued.
        let follow_up = SignalingMessage::acceptance(CallId::generate());
        alice.send(&PeerId::new("bob"), &follow_up).await.unwrap();

        let event = inbox.recv().await.unwrap();
        assert_eq!(event.message, follow_up);
    }

    #[tokio::test]
    async fn test_corrupted_signaling_surfaces_as_error_event() {
        let router = InMemoryRouter::new();
        let bob = channel_for(&router, "bob");
        let mut inbox = bob.subscribe(&PeerId::new("bob")).await;

        let mut payload = SIGNALING_MAGIC.to_vec();
        payload.extend_from_slice(b"\xff\xfe garbage");
        router
            .inject(&PeerId::new("bob"), PeerId::new("mallory"), payload)
            .await;

        let event = inbox.recv().await.unwrap();
        assert!(matches!(event.message, SignalingMessage::Error { .. }));
        assert_eq!(event.from, PeerId::new("mallory"));
    }
}
