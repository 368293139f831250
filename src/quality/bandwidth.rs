//! Transport bandwidth estimation.
//!
//! Keeps a small per-call sampling window over the transport byte counters
//! and produces a smoothed kbps reading annotated with a trend. When the
//! media engine reports available bandwidth directly, that reading is
//! preferred and only the trend is derived here.

use crate::media::MediaStats;
use crate::types::call::CallId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Instant;

/// Direction the smoothed estimate is moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandwidthTrend {
    Increasing,
    Stable,
    Decreasing,
}

/// One trend-annotated bandwidth reading for a call.
#[derive(Debug, Clone, PartialEq)]
pub struct BandwidthEstimate {
    pub kbps: u32,
    pub trend: BandwidthTrend,
    pub sampled_at: DateTime<Utc>,
}

// EWMA smoothing factor and the relative change treated as a real move.
const SMOOTHING: f64 = 0.3;
const TREND_THRESHOLD: f64 = 0.1;

#[derive(Debug)]
struct SampleWindow {
    last_bytes: u64,
    last_at: Instant,
    smoothed_kbps: f64,
    previous_smoothed: f64,
    samples: u32,
}

/// Per-call bandwidth sampler. Each call's window is only touched by that
/// call's monitoring task, so a concurrent map is all the locking needed.
#[derive(Debug, Default)]
pub struct BandwidthEstimator {
    windows: DashMap<CallId, SampleWindow>,
}

impl BandwidthEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one statistics snapshot and produce the current estimate.
    pub fn sample(&self, call_id: &CallId, stats: &MediaStats) -> BandwidthEstimate {
        self.sample_at(call_id, stats, Instant::now())
    }

    fn sample_at(&self, call_id: &CallId, stats: &MediaStats, now: Instant) -> BandwidthEstimate {
        let mut window = self
            .windows
            .entry(call_id.clone())
            .or_insert_with(|| SampleWindow {
                last_bytes: stats.bytes_sent,
                last_at: now,
                smoothed_kbps: 0.0,
                previous_smoothed: 0.0,
                samples: 0,
            });

        let raw_kbps = match stats.available_bandwidth_kbps {
            Some(kbps) => kbps as f64,
            None => {
                let elapsed = now.saturating_duration_since(window.last_at);
                let delta = stats.bytes_sent.saturating_sub(window.last_bytes);
                if elapsed.as_secs_f64() > 0.0 {
                    (delta as f64 * 8.0 / 1000.0) / elapsed.as_secs_f64()
                } else {
                    window.smoothed_kbps
                }
            }
        };

        window.previous_smoothed = window.smoothed_kbps;
        window.smoothed_kbps = if window.samples == 0 {
            raw_kbps
        } else {
            window.smoothed_kbps * (1.0 - SMOOTHING) + raw_kbps * SMOOTHING
        };
        window.last_bytes = stats.bytes_sent;
        window.last_at = now;
        window.samples += 1;

        let trend = if window.samples < 2 || window.previous_smoothed <= 0.0 {
            BandwidthTrend::Stable
        } else {
            let ratio = window.smoothed_kbps / window.previous_smoothed;
            if ratio > 1.0 + TREND_THRESHOLD {
                BandwidthTrend::Increasing
            } else if ratio < 1.0 - TREND_THRESHOLD {
                BandwidthTrend::Decreasing
            } else {
                BandwidthTrend::Stable
            }
        };

        BandwidthEstimate {
            kbps: window.smoothed_kbps.round() as u32,
            trend,
            sampled_at: Utc::now(),
        }
    }

    /// Drop the sampling window for a finished call.
    pub fn forget(&self, call_id: &CallId) {
        self.windows.remove(call_id);
    }
}
