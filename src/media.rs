//! Media engine interface.
//!
//! The engine that captures audio/video, builds peer connections and
//! produces session descriptions lives outside this crate. This module
//! defines the trait seam the coordinator and quality controller consume,
//! plus the small value types that cross it.

use crate::error::CallError;
use crate::quality::codec::CodecSettings;
use crate::types::call::PeerId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque reference to a media-engine-owned session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaSessionHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// A session description produced or consumed by the media engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

/// A single ICE candidate exchanged between peers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IceCandidatePayload {
    /// The candidate string (RFC 5245 format).
    pub candidate: String,
    /// SDP media stream identification.
    pub sdp_mid: Option<String>,
    /// SDP media line index.
    pub sdp_m_line_index: Option<u16>,
    /// Username fragment for ICE.
    pub username_fragment: Option<String>,
}

impl IceCandidatePayload {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            ..Default::default()
        }
    }

    pub fn with_sdp_mid(mut self, sdp_mid: impl Into<String>) -> Self {
        self.sdp_mid = Some(sdp_mid.into());
        self
    }

    pub fn with_sdp_m_line_index(mut self, index: u16) -> Self {
        self.sdp_m_line_index = Some(index);
        self
    }

    pub fn with_username_fragment(mut self, ufrag: impl Into<String>) -> Self {
        self.username_fragment = Some(ufrag.into());
        self
    }
}

/// One statistics snapshot from the transport underneath a media session.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaStats {
    /// Packet loss ratio in percent (0.0 - 100.0).
    pub packet_loss_pct: f64,
    pub jitter_ms: f64,
    pub rtt_ms: u32,
    /// Current audio level (0.0 - 1.0).
    pub audio_level: f32,
    pub frame_rate: u32,
    pub resolution: (u32, u32),
    /// Transport-reported available bandwidth, when the engine knows it.
    pub available_bandwidth_kbps: Option<u32>,
    /// Cumulative bytes sent on the transport, for bandwidth estimation.
    pub bytes_sent: u64,
}

impl MediaStats {
    /// Conservative snapshot used when statistics collection fails.
    /// Zero bandwidth and frame rate classify as the worst tier, which is
    /// the safe direction to adapt toward.
    pub fn fallback() -> Self {
        Self {
            packet_loss_pct: 0.0,
            jitter_ms: 0.0,
            rtt_ms: 0,
            audio_level: 0.0,
            frame_rate: 0,
            resolution: (0, 0),
            available_bandwidth_kbps: None,
            bytes_sent: 0,
        }
    }
}

/// External media engine consumed by the call core.
///
/// All methods are expected to fail fast rather than hang; errors surface
/// as [`CallError::Media`] and are converted into call events upstream.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Prepare a local media session for a call with `peer`.
    async fn prepare_local_session(
        &self,
        peer: &PeerId,
        video: bool,
    ) -> Result<MediaSessionHandle, CallError>;

    async fn create_offer(&self, handle: MediaSessionHandle)
    -> Result<SessionDescription, CallError>;

    async fn create_answer(
        &self,
        handle: MediaSessionHandle,
    ) -> Result<SessionDescription, CallError>;

    async fn set_local_description(
        &self,
        handle: MediaSessionHandle,
        desc: SessionDescription,
    ) -> Result<(), CallError>;

    async fn set_remote_description(
        &self,
        handle: MediaSessionHandle,
        desc: SessionDescription,
    ) -> Result<(), CallError>;

    async fn add_ice_candidate(
        &self,
        handle: MediaSessionHandle,
        candidate: IceCandidatePayload,
    ) -> Result<(), CallError>;

    /// Current transport statistics for the session. Callers must tolerate
    /// failure here; the quality loop substitutes [`MediaStats::fallback`].
    async fn get_statistics(&self, handle: MediaSessionHandle) -> Result<MediaStats, CallError>;

    /// Apply encoder parameters chosen by the quality controller.
    async fn apply_codec_settings(
        &self,
        handle: MediaSessionHandle,
        settings: &CodecSettings,
    ) -> Result<(), CallError>;

    async fn close(&self, handle: MediaSessionHandle);
}
