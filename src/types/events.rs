//! Event surface toward UI, notification and telemetry consumers.
//!
//! Two typed broadcast streams: call lifecycle events and quality events.
//! Emission never blocks and never fails; events published with no
//! subscriber are dropped.

use crate::quality::{NetworkCondition, QualityAdjustment};
use crate::types::call::{CallId, CallSession, PeerId, PendingCall};
use std::sync::Arc;
use tokio::sync::broadcast;

// The size of the broadcast channel buffer.
const CHANNEL_CAPACITY: usize = 100;

/// Call lifecycle events.
#[derive(Debug, Clone)]
pub enum CallStateEvent {
    CallInitiated { session: CallSession },
    IncomingCall { pending: PendingCall },
    CallAccepted { call_id: CallId, peer: PeerId },
    CallRejected { call_id: CallId, peer: PeerId, reason: String },
    CallEnded {
        call_id: CallId,
        peer: PeerId,
        reason: Option<String>,
        duration_secs: Option<i64>,
    },
    CallTimeout { call_id: CallId, peer: PeerId },
    CallFailed { call_id: CallId, reason: String },
    OfferReceived { call_id: CallId },
    AnswerReceived { call_id: CallId },
    IceCandidateReceived { call_id: CallId },
    SignalingError { call_id: Option<CallId>, message: String },
}

/// Quality monitoring events.
#[derive(Debug, Clone)]
pub enum CallQualityEvent {
    MonitoringStarted { call_id: CallId },
    MonitoringStopped { call_id: CallId },
    NetworkConditionChanged {
        call_id: CallId,
        previous: Option<NetworkCondition>,
        current: NetworkCondition,
    },
    QualityAdjusted { adjustment: QualityAdjustment },
    MonitoringError { call_id: CallId, message: String },
}

// Macro to generate EventBus fields and constructor
macro_rules! define_event_bus {
    ($(($field:ident, $type:ty)),* $(,)?) => {
        /// Typed event bus with a separate broadcast channel per stream.
        #[derive(Debug)]
        pub struct EventBus {
            $(
                pub $field: broadcast::Sender<$type>,
            )*
        }

        impl EventBus {
            pub fn new() -> Arc<Self> {
                Arc::new(Self {
                    $(
                        $field: broadcast::channel(CHANNEL_CAPACITY).0,
                    )*
                })
            }
        }
    };
}

define_event_bus! {
    (call_state, Arc<CallStateEvent>),
    (call_quality, Arc<CallQualityEvent>),
}

impl EventBus {
    pub fn subscribe_state(&self) -> broadcast::Receiver<Arc<CallStateEvent>> {
        self.call_state.subscribe()
    }

    pub fn subscribe_quality(&self) -> broadcast::Receiver<Arc<CallQualityEvent>> {
        self.call_quality.subscribe()
    }

    pub fn emit_state(&self, event: CallStateEvent) {
        let _ = self.call_state.send(Arc::new(event));
    }

    pub fn emit_quality(&self, event: CallQualityEvent) {
        let _ = self.call_quality.send(Arc::new(event));
    }
}
