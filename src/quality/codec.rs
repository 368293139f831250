//! Codec parameter selection.
//!
//! Maps quality tiers to concrete encoder settings and refines them against
//! a live network snapshot. Pure functions, no I/O.

use super::metrics::{NetworkCondition, NetworkConditions};
use serde::{Deserialize, Serialize};

/// Ordered quality tier. Higher is better.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum VideoQuality {
    AudioOnly,
    Low,
    Standard,
    Hd,
}

impl VideoQuality {
    /// Tier recommended for a classified network condition.
    pub fn for_condition(condition: NetworkCondition) -> Self {
        match condition {
            NetworkCondition::Excellent => Self::Hd,
            NetworkCondition::Good => Self::Standard,
            NetworkCondition::Poor => Self::Low,
            NetworkCondition::Bad => Self::AudioOnly,
        }
    }
}

/// Concrete encoder parameters for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
}

/// Pure tier-to-settings mapping with network-aware refinement.
pub struct CodecSelector;

impl CodecSelector {
    /// Base settings for a tier.
    pub fn settings_for(tier: VideoQuality) -> CodecSettings {
        match tier {
            VideoQuality::Hd => CodecSettings {
                width: 1280,
                height: 720,
                frame_rate: 30,
                video_bitrate_kbps: 2000,
                audio_bitrate_kbps: 64,
            },
            VideoQuality::Standard => CodecSettings {
                width: 640,
                height: 480,
                frame_rate: 30,
                video_bitrate_kbps: 1000,
                audio_bitrate_kbps: 48,
            },
            VideoQuality::Low => CodecSettings {
                width: 320,
                height: 240,
                frame_rate: 15,
                video_bitrate_kbps: 500,
                audio_bitrate_kbps: 32,
            },
            VideoQuality::AudioOnly => CodecSettings {
                width: 0,
                height: 0,
                frame_rate: 0,
                video_bitrate_kbps: 0,
                audio_bitrate_kbps: 32,
            },
        }
    }

    /// Trim a tier's base settings against live conditions. Refinements
    /// compose with the tier recommendation and only ever reduce: high loss
    /// cuts bitrate and frame rate, high RTT cuts bitrate, low bandwidth
    /// hard-caps both video and audio bitrate.
    pub fn refine(base: CodecSettings, conditions: &NetworkConditions) -> CodecSettings {
        let mut settings = base;

        if conditions.packet_loss_pct > 5.0 {
            settings.video_bitrate_kbps =
                (settings.video_bitrate_kbps as f64 * 0.7) as u32;
            settings.frame_rate = settings.frame_rate.min(15);
        }

        if conditions.rtt_ms > 300 {
            settings.video_bitrate_kbps =
                (settings.video_bitrate_kbps as f64 * 0.8) as u32;
            settings.frame_rate = settings.frame_rate.min(20);
        }

        if conditions.bandwidth_kbps < 1000 {
            settings.video_bitrate_kbps = settings.video_bitrate_kbps.min(500);
            settings.audio_bitrate_kbps = settings.audio_bitrate_kbps.min(32);
        }

        settings
    }
}
