//! Per-call quality metrics and network condition classification.

use crate::types::call::CallId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordered network condition tier. Higher is better.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum NetworkCondition {
    Bad,
    Poor,
    Good,
    Excellent,
}

/// The inputs the classifier and codec refinement look at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkConditions {
    pub bandwidth_kbps: u32,
    pub packet_loss_pct: f64,
    pub rtt_ms: u32,
    pub jitter_ms: f64,
}

impl NetworkCondition {
    /// Fixed-threshold classification. Monotonic in each input: improving
    /// bandwidth, loss or RTT alone never lowers the tier.
    pub fn classify(conditions: &NetworkConditions) -> Self {
        let NetworkConditions {
            bandwidth_kbps,
            packet_loss_pct,
            rtt_ms,
            ..
        } = *conditions;

        if bandwidth_kbps > 2000 && packet_loss_pct < 1.0 && rtt_ms < 100 {
            Self::Excellent
        } else if bandwidth_kbps > 1000 && packet_loss_pct < 3.0 && rtt_ms < 200 {
            Self::Good
        } else if bandwidth_kbps > 500 && packet_loss_pct < 5.0 && rtt_ms < 400 {
            Self::Poor
        } else {
            Self::Bad
        }
    }
}

/// One monitoring-tick snapshot for a call. Recomputed every tick, never
/// persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CallQualityMetrics {
    pub call_id: CallId,
    pub available_bandwidth_kbps: u32,
    pub used_bandwidth_kbps: u32,
    pub packet_loss_pct: f64,
    pub jitter_ms: f64,
    pub rtt_ms: u32,
    pub audio_level: f32,
    pub frame_rate: u32,
    pub resolution: (u32, u32),
    pub sampled_at: DateTime<Utc>,
}

impl CallQualityMetrics {
    pub fn conditions(&self) -> NetworkConditions {
        NetworkConditions {
            bandwidth_kbps: self.available_bandwidth_kbps,
            packet_loss_pct: self.packet_loss_pct,
            rtt_ms: self.rtt_ms,
            jitter_ms: self.jitter_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conditions(bandwidth_kbps: u32, packet_loss_pct: f64, rtt_ms: u32) -> NetworkConditions {
        NetworkConditions {
            bandwidth_kbps,
            packet_loss_pct,
            rtt_ms,
            jitter_ms: 0.0,
        }
    }

    #[test]
    fn test_classification_thresholds() {
        assert_eq!(
            NetworkCondition::classify(&conditions(2500, 0.5, 80)),
            NetworkCondition::Excellent
        );
        assert_eq!(
            NetworkCondition::classify(&conditions(1500, 2.0, 150)),
            NetworkCondition::Good
        );
        assert_eq!(
            NetworkCondition::classify(&conditions(600, 4.0, 350)),
            NetworkCondition::Poor
        );
        assert_eq!(
            NetworkCondition::classify(&conditions(300, 1.0, 90)),
            NetworkCondition::Bad
        );
    }

    #[test]
    fn test_boundaries_are_exclusive() {
        // Exactly at a threshold falls to the next tier down.
        assert_eq!(
            NetworkCondition::classify(&conditions(2000, 0.5, 80)),
            NetworkCondition::Good
        );
        assert_eq!(
            NetworkCondition::classify(&conditions(2500, 1.0, 80)),
            NetworkCondition::Good
        );
        assert_eq!(
            NetworkCondition::classify(&conditions(2500, 0.5, 100)),
            NetworkCondition::Good
        );
        assert_eq!(
            NetworkCondition::classify(&conditions(500, 1.0, 90)),
            NetworkCondition::Bad
        );
    }

    /// Holding loss and RTT fixed, decreasing bandwidth never improves the
    /// classified tier.
    #[test]
    fn test_monotonic_in_bandwidth() {
        for &loss in &[0.0, 0.5, 2.0, 4.0, 10.0] {
            for &rtt in &[10, 90, 150, 350, 600] {
                let mut previous = NetworkCondition::Excellent;
                for bandwidth in (0..=3000).rev().step_by(50) {
                    let tier = NetworkCondition::classify(&conditions(bandwidth, loss, rtt));
                    assert!(
                        tier <= previous,
                        "tier improved from {previous:?} to {tier:?} as bandwidth dropped \
                         (bw={bandwidth}, loss={loss}, rtt={rtt})"
                    );
                    previous = tier;
                }
            }
        }
    }
}
