//! Closed-loop call quality control.
//!
//! One monitoring task per call samples the transport every few seconds,
//! classifies the network condition, and steers the encoder through
//! [`CodecSelector`] when the recommended tier drifts away from what is
//! currently applied. The controller is a subordinate, cancellable child of
//! the call's lifetime: the coordinator starts it on connect and stops it on
//! teardown, and it never mutates call state itself.

pub mod bandwidth;
pub mod codec;
pub mod metrics;

pub use bandwidth::{BandwidthEstimate, BandwidthEstimator, BandwidthTrend};
pub use codec::{CodecSelector, CodecSettings, VideoQuality};
pub use metrics::{CallQualityMetrics, NetworkCondition, NetworkConditions};

use crate::media::{MediaEngine, MediaSessionHandle, MediaStats};
use crate::types::call::CallId;
use crate::types::events::{CallQualityEvent, EventBus};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Audit record of one automatic or manual quality change.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityAdjustment {
    pub call_id: CallId,
    pub from: VideoQuality,
    pub to: VideoQuality,
    pub reason: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct QualityConfig {
    /// Interval between monitoring ticks.
    pub tick_interval: Duration,
    /// Backoff applied after a failed tick.
    pub retry_interval: Duration,
    /// Loss above this forces a settings refresh even at the same tier.
    pub loss_refresh_threshold_pct: f64,
    /// RTT above this forces a settings refresh even at the same tier.
    pub rtt_refresh_threshold_ms: u32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(3),
            retry_interval: Duration::from_secs(5),
            loss_refresh_threshold_pct: 3.0,
            rtt_refresh_threshold_ms: 300,
        }
    }
}

/// Owns the per-call monitoring loops and the latest metrics snapshots.
pub struct QualityController {
    media: Arc<dyn MediaEngine>,
    events: Arc<EventBus>,
    estimator: BandwidthEstimator,
    config: QualityConfig,
    monitors: DashMap<CallId, JoinHandle<()>>,
    metrics: DashMap<CallId, CallQualityMetrics>,
    adjustments: DashMap<CallId, Vec<QualityAdjustment>>,
}

impl QualityController {
    pub fn new(media: Arc<dyn MediaEngine>, events: Arc<EventBus>) -> Arc<Self> {
        Self::with_config(media, events, QualityConfig::default())
    }

    pub fn with_config(
        media: Arc<dyn MediaEngine>,
        events: Arc<EventBus>,
        config: QualityConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            media,
            events,
            estimator: BandwidthEstimator::new(),
            config,
            monitors: DashMap::new(),
            metrics: DashMap::new(),
            adjustments: DashMap::new(),
        })
    }

    /// Start the monitoring loop for a call. No-op if one is already
    /// running for this call identifier.
    pub fn start_monitoring(
        self: &Arc<Self>,
        handle: MediaSessionHandle,
        call_id: CallId,
        video: bool,
    ) {
        if self.monitors.contains_key(&call_id) {
            debug!(target: "Call/Quality", "Already monitoring call {call_id}");
            return;
        }

        info!(target: "Call/Quality", "Starting quality monitoring for call {call_id} (video: {video})");
        self.events
            .emit_quality(CallQualityEvent::MonitoringStarted {
                call_id: call_id.clone(),
            });

        let controller = Arc::clone(self);
        let task_call_id = call_id.clone();
        let task = tokio::spawn(async move {
            controller.monitor_loop(handle, task_call_id, video).await;
        });
        self.monitors.insert(call_id, task);
    }

    /// Cancel the monitoring loop for a call. Idempotent.
    pub fn stop_monitoring(&self, call_id: &CallId) {
        if let Some((_, task)) = self.monitors.remove(call_id) {
            task.abort();
            info!(target: "Call/Quality", "Stopped quality monitoring for call {call_id}");
            self.events
                .emit_quality(CallQualityEvent::MonitoringStopped {
                    call_id: call_id.clone(),
                });
        }
        self.estimator.forget(call_id);
        self.metrics.remove(call_id);
    }

    /// Drop all bookkeeping for a finished call, audit trail included.
    /// The coordinator calls this when the call is fully torn down.
    pub fn forget(&self, call_id: &CallId) {
        self.stop_monitoring(call_id);
        self.adjustments.remove(call_id);
    }

    pub fn is_monitoring(&self, call_id: &CallId) -> bool {
        self.monitors.contains_key(call_id)
    }

    /// Latest metrics snapshot for a call, if monitored.
    pub fn latest_metrics(&self, call_id: &CallId) -> Option<CallQualityMetrics> {
        self.metrics.get(call_id).map(|m| m.clone())
    }

    /// Audit trail of quality changes for a call. Survives stop_monitoring.
    pub fn adjustments(&self, call_id: &CallId) -> Vec<QualityAdjustment> {
        self.adjustments
            .get(call_id)
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    async fn monitor_loop(&self, handle: MediaSessionHandle, call_id: CallId, video: bool) {
        // The applied tier starts at what the call's media type implies, so
        // a healthy first tick does not generate a spurious adjustment.
        let mut applied = if video {
            VideoQuality::Hd
        } else {
            VideoQuality::AudioOnly
        };
        let mut last_condition: Option<NetworkCondition> = None;
        let mut delay = self.config.tick_interval;

        loop {
            tokio::time::sleep(delay).await;

            match self
                .run_tick(handle, &call_id, video, &mut applied, &mut last_condition)
                .await
            {
                Ok(()) => delay = self.config.tick_interval,
                Err(e) => {
                    warn!(target: "Call/Quality", "Monitoring tick failed for call {call_id}: {e}");
                    self.events.emit_quality(CallQualityEvent::MonitoringError {
                        call_id: call_id.clone(),
                        message: e.to_string(),
                    });
                    delay = self.config.retry_interval;
                }
            }
        }
    }

    async fn run_tick(
        &self,
        handle: MediaSessionHandle,
        call_id: &CallId,
        video: bool,
        applied: &mut VideoQuality,
        last_condition: &mut Option<NetworkCondition>,
    ) -> Result<(), crate::error::CallError> {
        let stats = match self.media.get_statistics(handle).await {
            Ok(stats) => stats,
            Err(e) => {
                debug!(target: "Call/Quality", "Statistics unavailable for call {call_id}, using fallback: {e}");
                MediaStats::fallback()
            }
        };

        let estimate = self.estimator.sample(call_id, &stats);
        let snapshot = CallQualityMetrics {
            call_id: call_id.clone(),
            available_bandwidth_kbps: stats.available_bandwidth_kbps.unwrap_or(estimate.kbps),
            used_bandwidth_kbps: estimate.kbps,
            packet_loss_pct: stats.packet_loss_pct,
            jitter_ms: stats.jitter_ms,
            rtt_ms: stats.rtt_ms,
            audio_level: stats.audio_level,
            frame_rate: stats.frame_rate,
            resolution: stats.resolution,
            sampled_at: Utc::now(),
        };
        let conditions = snapshot.conditions();
        self.metrics.insert(call_id.clone(), snapshot);

        let condition = NetworkCondition::classify(&conditions);
        if *last_condition != Some(condition) {
            debug!(
                target: "Call/Quality",
                "Call {call_id} network condition {:?} -> {condition:?} ({} kbps, {:.1}% loss, {} ms rtt, {:?})",
                last_condition, conditions.bandwidth_kbps, conditions.packet_loss_pct,
                conditions.rtt_ms, estimate.trend
            );
            self.events
                .emit_quality(CallQualityEvent::NetworkConditionChanged {
                    call_id: call_id.clone(),
                    previous: *last_condition,
                    current: condition,
                });
            *last_condition = Some(condition);
        }

        let recommended = if video {
            VideoQuality::for_condition(condition)
        } else {
            VideoQuality::AudioOnly
        };

        let needs_refresh = recommended != *applied
            || conditions.packet_loss_pct > self.config.loss_refresh_threshold_pct
            || conditions.rtt_ms > self.config.rtt_refresh_threshold_ms;
        if !needs_refresh {
            return Ok(());
        }

        let settings =
            CodecSelector::refine(CodecSelector::settings_for(recommended), &conditions);
        self.media.apply_codec_settings(handle, &settings).await?;

        // A refresh at the same tier re-applies settings without recording
        // a tier change.
        if recommended == *applied {
            return Ok(());
        }

        let adjustment = QualityAdjustment {
            call_id: call_id.clone(),
            from: *applied,
            to: recommended,
            reason: format!(
                "network {condition:?}: {} kbps, {:.1}% loss, {} ms rtt",
                conditions.bandwidth_kbps, conditions.packet_loss_pct, conditions.rtt_ms
            ),
            at: Utc::now(),
        };
        info!(
            target: "Call/Quality",
            "Call {call_id} quality {:?} -> {:?}: {}",
            adjustment.from, adjustment.to, adjustment.reason
        );
        self.adjustments
            .entry(call_id.clone())
            .or_default()
            .push(adjustment.clone());
        self.events
            .emit_quality(CallQualityEvent::QualityAdjusted { adjustment });
        *applied = recommended;

        Ok(())
    }
}

impl Drop for QualityController {
    fn drop(&mut self) {
        for entry in self.monitors.iter() {
            entry.value().abort();
        }
    }
}
