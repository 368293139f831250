//! In-memory doubles for the external seams, shared by unit and
//! integration tests.

use crate::error::CallError;
use crate::media::{
    IceCandidatePayload, MediaEngine, MediaSessionHandle, MediaStats, SdpKind, SessionDescription,
};
use crate::quality::codec::CodecSettings;
use crate::signaling::{CallCrypto, DeliveryToken, InboundEnvelope, SignalingTransport};
use crate::types::call::PeerId;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Routes payloads between in-process peers. Each peer talks to the router
/// through its own [`RouterEndpoint`] so the router knows who is sending.
#[derive(Debug, Default)]
pub struct InMemoryRouter {
    inboxes: DashMap<PeerId, mpsc::Sender<InboundEnvelope>>,
    tokens: AtomicU64,
}

impl InMemoryRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Transport handle bound to one local identity.
    pub fn endpoint(self: &Arc<Self>, local: PeerId) -> Arc<RouterEndpoint> {
        Arc::new(RouterEndpoint {
            local,
            router: Arc::clone(self),
        })
    }

    /// Push a raw payload straight into a peer's inbox, bypassing any
    /// channel framing. For exercising the classifier with alien traffic.
    pub async fn inject(&self, to: &PeerId, from: PeerId, payload: Vec<u8>) {
        if let Some(tx) = self.inboxes.get(to).map(|t| t.value().clone()) {
            let _ = tx
                .send(InboundEnvelope {
                    from,
                    payload,
                    delivery_token: self.next_token(),
                    timestamp: Utc::now(),
                })
                .await;
        }
    }

    fn next_token(&self) -> DeliveryToken {
        format!("token-{}", self.tokens.fetch_add(1, Ordering::Relaxed))
    }
}

/// One peer's view of the [`InMemoryRouter`].
pub struct RouterEndpoint {
    local: PeerId,
    router: Arc<InMemoryRouter>,
}

#[async_trait]
impl SignalingTransport for RouterEndpoint {
    async fn send(&self, peer: &PeerId, payload: Vec<u8>) -> Result<DeliveryToken, CallError> {
        let token = self.router.next_token();
        let Some(tx) = self.router.inboxes.get(peer).map(|t| t.value().clone()) else {
            return Err(CallError::Transport(format!("no route to {peer}")));
        };
        tx.send(InboundEnvelope {
            from: self.local.clone(),
            payload,
            delivery_token: token.clone(),
            timestamp: Utc::now(),
        })
        .await
        .map_err(|_| CallError::Transport(format!("inbox for {peer} closed")))?;
        Ok(token)
    }

    async fn subscribe_inbound(&self, identity: &PeerId) -> mpsc::Receiver<InboundEnvelope> {
        let (tx, rx) = mpsc::channel(64);
        self.router.inboxes.insert(identity.clone(), tx);
        rx
    }
}

/// Reversible stand-in cipher. Prefixed garbage "decrypts" to garbage,
/// which then fails to parse and exercises the error path.
#[derive(Debug, Clone, Copy, Default)]
pub struct XorCrypto;

const XOR_KEY: u8 = 0x5A;

fn xor(data: &[u8]) -> Vec<u8> {
    data.iter().map(|b| b ^ XOR_KEY).collect()
}

#[async_trait]
impl CallCrypto for XorCrypto {
    async fn encrypt_for(&self, _peer: &PeerId, plaintext: &[u8]) -> Result<Vec<u8>, CallError> {
        Ok(xor(plaintext))
    }

    async fn decrypt_from(&self, _peer: &PeerId, ciphertext: &[u8]) -> Result<Vec<u8>, CallError> {
        Ok(xor(ciphertext))
    }
}

/// Scriptable media engine double.
///
/// Statistics are served from a queue; when it runs dry the default
/// snapshot repeats, so a monitoring loop can tick forever in tests.
#[derive(Debug)]
pub struct FakeMediaEngine {
    next_handle: AtomicU64,
    scripted_stats: Mutex<VecDeque<MediaStats>>,
    default_stats: Mutex<MediaStats>,
    applied_settings: Mutex<Vec<(MediaSessionHandle, CodecSettings)>>,
    remote_descriptions: Mutex<Vec<(MediaSessionHandle, SessionDescription)>>,
    candidates: Mutex<Vec<(MediaSessionHandle, IceCandidatePayload)>>,
    closed: Mutex<Vec<MediaSessionHandle>>,
    fail_prepare: AtomicBool,
    fail_statistics: AtomicBool,
    fail_apply: AtomicBool,
}

/// Statistics snapshot with the three readings classification cares about.
pub fn stats_with(bandwidth_kbps: u32, packet_loss_pct: f64, rtt_ms: u32) -> MediaStats {
    MediaStats {
        packet_loss_pct,
        jitter_ms: 5.0,
        rtt_ms,
        audio_level: 0.5,
        frame_rate: 30,
        resolution: (1280, 720),
        available_bandwidth_kbps: Some(bandwidth_kbps),
        bytes_sent: 0,
    }
}

impl Default for FakeMediaEngine {
    fn default() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            scripted_stats: Mutex::new(VecDeque::new()),
            // Healthy network unless a test scripts otherwise.
            default_stats: Mutex::new(stats_with(2500, 0.5, 50)),
            applied_settings: Mutex::new(Vec::new()),
            remote_descriptions: Mutex::new(Vec::new()),
            candidates: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
            fail_prepare: AtomicBool::new(false),
            fail_statistics: AtomicBool::new(false),
            fail_apply: AtomicBool::new(false),
        }
    }
}

impl FakeMediaEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue snapshots to serve, in order, before the default repeats.
    pub fn script_stats(&self, stats: impl IntoIterator<Item = MediaStats>) {
        self.scripted_stats.lock().unwrap().extend(stats);
    }

    pub fn set_default_stats(&self, stats: MediaStats) {
        *self.default_stats.lock().unwrap() = stats;
    }

    pub fn set_fail_prepare(&self, fail: bool) {
        self.fail_prepare.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_statistics(&self, fail: bool) {
        self.fail_statistics.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_apply(&self, fail: bool) {
        self.fail_apply.store(fail, Ordering::Relaxed);
    }

    pub fn applied_settings(&self) -> Vec<(MediaSessionHandle, CodecSettings)> {
        self.applied_settings.lock().unwrap().clone()
    }

    pub fn remote_descriptions(&self) -> Vec<(MediaSessionHandle, SessionDescription)> {
        self.remote_descriptions.lock().unwrap().clone()
    }

    pub fn candidates(&self) -> Vec<(MediaSessionHandle, IceCandidatePayload)> {
        self.candidates.lock().unwrap().clone()
    }

    pub fn closed(&self) -> Vec<MediaSessionHandle> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaEngine for FakeMediaEngine {
    async fn prepare_local_session(
        &self,
        _peer: &PeerId,
        _video: bool,
    ) -> Result<MediaSessionHandle, CallError> {
        if self.fail_prepare.load(Ordering::Relaxed) {
            return Err(CallError::Media("prepare failed".into()));
        }
        Ok(MediaSessionHandle(
            self.next_handle.fetch_add(1, Ordering::Relaxed),
        ))
    }

    async fn create_offer(
        &self,
        handle: MediaSessionHandle,
    ) -> Result<SessionDescription, CallError> {
        Ok(SessionDescription {
            kind: SdpKind::Offer,
            sdp: format!("v=0 offer for session {}", handle.0),
        })
    }

    async fn create_answer(
        &self,
        handle: MediaSessionHandle,
    ) -> Result<SessionDescription, CallError> {
        Ok(SessionDescription {
            kind: SdpKind::Answer,
            sdp: format!("v=0 answer for session {}", handle.0),
        })
    }

    async fn set_local_description(
        &self,
        _handle: MediaSessionHandle,
        _desc: SessionDescription,
    ) -> Result<(), CallError> {
        Ok(())
    }

    async fn set_remote_description(
        &self,
        handle: MediaSessionHandle,
        desc: SessionDescription,
    ) -> Result<(), CallError> {
        self.remote_descriptions.lock().unwrap().push((handle, desc));
        Ok(())
    }

    async fn add_ice_candidate(
        &self,
        handle: MediaSessionHandle,
        candidate: IceCandidatePayload,
    ) -> Result<(), CallError> {
        self.candidates.lock().unwrap().push((handle, candidate));
        Ok(())
    }

    async fn get_statistics(&self, _handle: MediaSessionHandle) -> Result<MediaStats, CallError> {
        if self.fail_statistics.load(Ordering::Relaxed) {
            return Err(CallError::Media("statistics unavailable".into()));
        }
        let scripted = self.scripted_stats.lock().unwrap().pop_front();
        Ok(match scripted {
            Some(stats) => stats,
            None => self.default_stats.lock().unwrap().clone(),
        })
    }

    async fn apply_codec_settings(
        &self,
        handle: MediaSessionHandle,
        settings: &CodecSettings,
    ) -> Result<(), CallError> {
        if self.fail_apply.load(Ordering::Relaxed) {
            return Err(CallError::Media("encoder rejected settings".into()));
        }
        self.applied_settings
            .lock()
            .unwrap()
            .push((handle, settings.clone()));
        Ok(())
    }

    async fn close(&self, handle: MediaSessionHandle) {
        self.closed.lock().unwrap().push(handle);
    }
}
