//! Call session coordination.
//!
//! The coordinator is the only component that mutates call lifecycle state.
//! It consults the state machine in [`crate::state`] for legality, moves
//! control messages through the [`SignalingChannel`], arms the ring timeout
//! for incoming calls, and starts/stops quality monitoring with the call.
//!
//! All session and pending-call bookkeeping lives behind one mutex; every
//! read-modify-write on those maps, together with the signaling send that
//! belongs to the same transition, happens inside that critical section so
//! two events can never race the same call identifier into inconsistent
//! states.

use crate::error::CallError;
use crate::media::{IceCandidatePayload, MediaEngine, SessionDescription};
use crate::quality::QualityController;
use crate::signaling::{SignalingChannel, SignalingEvent, SignalingMessage};
use crate::state::{transition, CallEvent, CallState, InvalidTransition};
use crate::types::call::{
    CallDirection, CallId, CallSession, PeerId, PendingCall, PendingCallStatus,
};
use crate::types::events::{CallStateEvent, EventBus};
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long an incoming invitation may ring before auto-rejection.
    pub incoming_call_timeout: Duration,
    /// Maximum concurrent live calls allowed.
    pub max_concurrent_calls: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            incoming_call_timeout: Duration::from_secs(30),
            max_concurrent_calls: 1,
        }
    }
}

/// Everything guarded by the coordinator lock.
#[derive(Default)]
struct CoordinatorState {
    sessions: HashMap<CallId, CallSession>,
    pending: HashMap<CallId, PendingCall>,
    /// Machine state per known call id. Terminal calls are removed
    /// entirely, so this never outgrows the set of live calls.
    states: HashMap<CallId, CallState>,
    timeouts: HashMap<CallId, JoinHandle<()>>,
    /// ICE candidates that arrived before a local media session existed.
    ice_buffer: HashMap<CallId, Vec<IceCandidatePayload>>,
    /// An offer that arrived before the call was accepted locally.
    offer_buffer: HashMap<CallId, SessionDescription>,
}

impl CoordinatorState {
    fn current(&self, call_id: &CallId) -> CallState {
        self.states.get(call_id).copied().unwrap_or_default()
    }

    fn apply(&mut self, call_id: &CallId, event: CallEvent) -> CallState {
        let next = transition(self.current(call_id), event);
        self.states.insert(call_id.clone(), next);
        if let Some(session) = self.sessions.get_mut(call_id) {
            session.status = next;
        }
        next
    }

    fn cancel_timeout(&mut self, call_id: &CallId) {
        if let Some(timer) = self.timeouts.remove(call_id) {
            timer.abort();
        }
    }
}

/// Top-level orchestrator for call sessions.
pub struct CallSessionCoordinator {
    identity: PeerId,
    config: CoordinatorConfig,
    media: Arc<dyn MediaEngine>,
    channel: Arc<SignalingChannel>,
    quality: Arc<QualityController>,
    events: Arc<EventBus>,
    state: Mutex<CoordinatorState>,
    inbound_task: Mutex<Option<JoinHandle<()>>>,
}

impl CallSessionCoordinator {
    pub fn new(
        identity: PeerId,
        media: Arc<dyn MediaEngine>,
        channel: Arc<SignalingChannel>,
    ) -> Arc<Self> {
        Self::with_config(identity, media, channel, CoordinatorConfig::default())
    }

    pub fn with_config(
        identity: PeerId,
        media: Arc<dyn MediaEngine>,
        channel: Arc<SignalingChannel>,
        config: CoordinatorConfig,
    ) -> Arc<Self> {
        let events = EventBus::new();
        let quality = QualityController::new(media.clone(), events.clone());
        Arc::new(Self {
            identity,
            config,
            media,
            channel,
            quality,
            events,
            state: Mutex::new(CoordinatorState::default()),
            inbound_task: Mutex::new(None),
        })
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn quality(&self) -> &Arc<QualityController> {
        &self.quality
    }

    pub fn identity(&self) -> &PeerId {
        &self.identity
    }

    /// Subscribe to inbound signaling and dispatch it until shutdown.
    pub async fn start(self: &Arc<Self>) {
        let mut inbox = self.channel.subscribe(&self.identity).await;
        let coordinator = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Some(event) = inbox.recv().await {
                coordinator.handle_signaling_event(event).await;
            }
            debug!(target: "Call/Coordinator", "Inbound dispatch stopped");
        });
        *self.inbound_task.lock().await = Some(task);
    }

    /// Stop dispatching, cancel all timers and monitors, release media.
    pub async fn shutdown(&self) {
        if let Some(task) = self.inbound_task.lock().await.take() {
            task.abort();
        }
        let mut state = self.state.lock().await;
        for (_, timer) in state.timeouts.drain() {
            timer.abort();
        }
        let sessions: Vec<CallSession> = state.sessions.drain().map(|(_, s)| s).collect();
        state.pending.clear();
        state.states.clear();
        state.ice_buffer.clear();
        state.offer_buffer.clear();
        drop(state);

        for session in sessions {
            self.quality.forget(&session.call_id);
            if let Some(handle) = session.local_media {
                self.media.close(handle).await;
            }
        }
        info!(target: "Call/Coordinator", "Coordinator for {} shut down", self.identity);
    }

    /// Start an outgoing call to `peer`.
    pub async fn initiate_call(
        &self,
        peer: PeerId,
        video: bool,
    ) -> Result<CallSession, CallError> {
        let mut state = self.state.lock().await;

        if state
            .pending
            .values()
            .any(|p| p.peer == peer && p.direction == CallDirection::Outgoing)
        {
            return Err(CallError::AlreadyExists(format!(
                "outgoing call to {peer} already pending"
            )));
        }
        let live = state
            .sessions
            .values()
            .filter(|s| s.status.is_live())
            .count();
        if live >= self.config.max_concurrent_calls {
            return Err(CallError::AlreadyExists(
                "max concurrent calls reached".into(),
            ));
        }

        let call_id = CallId::generate();
        let handle = self.media.prepare_local_session(&peer, video).await?;

        let mut session =
            CallSession::new(call_id.clone(), peer.clone(), video, CallState::Idle);
        session.local_media = Some(handle);

        state.pending.insert(
            call_id.clone(),
            PendingCall::new_outgoing(call_id.clone(), peer.clone(), video),
        );
        state.sessions.insert(call_id.clone(), session);
        state.apply(&call_id, CallEvent::InitiateCall);

        // The invitation send belongs to this transition; roll back on failure.
        let invitation = SignalingMessage::invitation(call_id.clone(), video);
        if let Err(e) = self.channel.send(&peer, &invitation).await {
            state.pending.remove(&call_id);
            state.sessions.remove(&call_id);
            state.states.remove(&call_id);
            self.media.close(handle).await;
            return Err(e);
        }

        let session = state.sessions.get(&call_id).cloned().ok_or_else(|| {
            CallError::NotFound(call_id.to_string())
        })?;
        info!(
            target: "Call/Coordinator",
            "Initiated {} call {call_id} to {peer}",
            if video { "video" } else { "audio" }
        );
        self.events.emit_state(CallStateEvent::CallInitiated {
            session: session.clone(),
        });
        Ok(session)
    }

    /// Accept a pending incoming call.
    pub async fn accept_call(&self, call_id: &CallId) -> Result<CallSession, CallError> {
        let mut state = self.state.lock().await;

        let pending = state
            .pending
            .get(call_id)
            .cloned()
            .ok_or_else(|| CallError::NotFound("Call not found".into()))?;
        if pending.direction != CallDirection::Incoming
            || pending.status != PendingCallStatus::InvitationReceived
        {
            return Err(CallError::InvalidTransition(InvalidTransition {
                current_state: state.current(call_id),
                attempted: CallEvent::AcceptCall,
            }));
        }

        // The ring timeout stays armed until media preparation succeeds,
        // so a failed accept still expires instead of ringing forever.
        let handle = self
            .media
            .prepare_local_session(&pending.peer, pending.video)
            .await?;
        state.cancel_timeout(call_id);

        // The pending call is superseded by the session.
        state.pending.remove(call_id);
        let mut session = CallSession::new(
            call_id.clone(),
            pending.peer.clone(),
            pending.video,
            state.current(call_id),
        );
        session.local_media = Some(handle);
        state.sessions.insert(call_id.clone(), session);
        state.apply(call_id, CallEvent::AcceptCall);

        // Candidates and an offer may have raced ahead of the local accept.
        if let Some(candidates) = state.ice_buffer.remove(call_id) {
            for candidate in candidates {
                if let Err(e) = self.media.add_ice_candidate(handle, candidate).await {
                    warn!(target: "Call/Coordinator", "Buffered candidate rejected for call {call_id}: {e}");
                }
            }
        }
        let buffered_offer = state.offer_buffer.remove(call_id);

        let acceptance = SignalingMessage::acceptance(call_id.clone());
        if let Err(e) = self.channel.send(&pending.peer, &acceptance).await {
            self.fail_call_locked(&mut state, call_id, format!("acceptance send failed: {e}"))
                .await;
            return Err(e);
        }

        self.events.emit_state(CallStateEvent::CallAccepted {
            call_id: call_id.clone(),
            peer: pending.peer.clone(),
        });
        info!(target: "Call/Coordinator", "Accepted call {call_id} from {}", pending.peer);

        if let Some(offer) = buffered_offer {
            match self
                .answer_offer_locked(&mut state, call_id, &pending.peer, offer)
                .await
            {
                Ok(()) => {
                    // Observers see the same stream as when the offer
                    // arrives after the accept.
                    self.events.emit_state(CallStateEvent::OfferReceived {
                        call_id: call_id.clone(),
                    });
                }
                Err(e) => {
                    self.fail_call_locked(&mut state, call_id, format!("answer failed: {e}"))
                        .await;
                    return Err(e);
                }
            }
        }

        state
            .sessions
            .get(call_id)
            .cloned()
            .ok_or_else(|| CallError::NotFound(call_id.to_string()))
    }

    /// Reject a pending call. The pending entry must still exist.
    pub async fn reject_call(
        &self,
        call_id: &CallId,
        reason: Option<&str>,
    ) -> Result<(), CallError> {
        let mut state = self.state.lock().await;

        let pending = state
            .pending
            .remove(call_id)
            .ok_or_else(|| CallError::NotFound("Call not found".into()))?;
        state.cancel_timeout(call_id);
        state.ice_buffer.remove(call_id);
        state.offer_buffer.remove(call_id);
        state.states.remove(call_id);

        if let Some(session) = state.sessions.remove(call_id) {
            self.quality.forget(call_id);
            if let Some(handle) = session.local_media {
                self.media.close(handle).await;
            }
        }

        let reason = reason.unwrap_or("Call rejected").to_string();
        let rejection = SignalingMessage::rejection(call_id.clone(), reason.clone());
        if let Err(e) = self.channel.send(&pending.peer, &rejection).await {
            warn!(target: "Call/Coordinator", "Rejection send failed for call {call_id}: {e}");
            self.events.emit_state(CallStateEvent::SignalingError {
                call_id: Some(call_id.clone()),
                message: e.to_string(),
            });
        }

        info!(target: "Call/Coordinator", "Rejected call {call_id}: {reason}");
        self.events.emit_state(CallStateEvent::CallRejected {
            call_id: call_id.clone(),
            peer: pending.peer,
            reason,
        });
        Ok(())
    }

    /// End a call. Safe to call when only half the bookkeeping (or none of
    /// it) still exists, so cleanup can always proceed.
    pub async fn end_call(&self, call_id: &CallId, reason: Option<&str>) -> Result<(), CallError> {
        let mut state = self.state.lock().await;

        let session = state.sessions.remove(call_id);
        let pending = state.pending.remove(call_id);
        let Some(peer) = session
            .as_ref()
            .map(|s| s.peer.clone())
            .or_else(|| pending.as_ref().map(|p| p.peer.clone()))
        else {
            debug!(target: "Call/Coordinator", "Nothing to end for call {call_id}");
            return Ok(());
        };

        state.cancel_timeout(call_id);
        state.ice_buffer.remove(call_id);
        state.offer_buffer.remove(call_id);
        state.states.remove(call_id);

        self.quality.forget(call_id);
        if let Some(handle) = session.as_ref().and_then(|s| s.local_media) {
            self.media.close(handle).await;
        }

        let termination =
            SignalingMessage::termination(call_id.clone(), reason.map(str::to_string));
        if let Err(e) = self.channel.send(&peer, &termination).await {
            warn!(target: "Call/Coordinator", "Termination send failed for call {call_id}: {e}");
            self.events.emit_state(CallStateEvent::SignalingError {
                call_id: Some(call_id.clone()),
                message: e.to_string(),
            });
        }

        let duration_secs = session
            .as_ref()
            .and_then(|s| s.connected_at)
            .map(|at| Utc::now().signed_duration_since(at).num_seconds());
        info!(target: "Call/Coordinator", "Ended call {call_id}");
        self.events.emit_state(CallStateEvent::CallEnded {
            call_id: call_id.clone(),
            peer,
            reason: reason.map(str::to_string),
            duration_secs,
        });
        Ok(())
    }

    /// Media engine reports the connection is up.
    pub async fn notify_call_connected(&self, call_id: &CallId) -> Result<(), CallError> {
        let mut state = self.state.lock().await;
        let current = state.current(call_id);
        let next = transition(current, CallEvent::CallConnected);
        if next != CallState::Connected {
            return Err(CallError::InvalidTransition(InvalidTransition {
                current_state: current,
                attempted: CallEvent::CallConnected,
            }));
        }
        let session = state
            .sessions
            .get_mut(call_id)
            .ok_or_else(|| CallError::NotFound(call_id.to_string()))?;
        if session.connected_at.is_none() {
            session.connected_at = Some(Utc::now());
        }
        let handle = session
            .local_media
            .ok_or_else(|| CallError::Media("no local media session".into()))?;
        let video = session.video;
        state.apply(call_id, CallEvent::CallConnected);

        info!(target: "Call/Coordinator", "Call {call_id} connected");
        self.quality.start_monitoring(handle, call_id.clone(), video);
        Ok(())
    }

    /// Media engine reports an unrecoverable failure.
    pub async fn notify_call_failed(&self, call_id: &CallId, reason: &str) {
        let mut state = self.state.lock().await;
        self.fail_call_locked(&mut state, call_id, reason.to_string())
            .await;
    }

    /// Media engine reports a transient connection loss; the call drops
    /// back to connecting and monitoring keeps running.
    pub async fn notify_connection_lost(&self, call_id: &CallId) {
        let mut state = self.state.lock().await;
        let next = state.apply(call_id, CallEvent::ConnectionLost);
        debug!(target: "Call/Coordinator", "Call {call_id} connection lost, now {next:?}");
    }

    /// Dispatch one classified inbound signaling event.
    pub async fn handle_signaling_event(self: &Arc<Self>, event: SignalingEvent) {
        let SignalingEvent { from, message, .. } = event;
        debug!(target: "Call/Coordinator", "Received {message} from {from}");

        match message {
            SignalingMessage::CallInvitation { call_id, video, .. } => {
                self.handle_invitation(from, call_id, video).await;
            }
            SignalingMessage::CallAcceptance { call_id, .. } => {
                self.handle_acceptance(from, call_id).await;
            }
            SignalingMessage::CallRejection {
                call_id, reason, ..
            } => {
                self.handle_rejection(from, call_id, reason).await;
            }
            SignalingMessage::CallOffer { call_id, sdp, .. } => {
                self.handle_offer(from, call_id, sdp).await;
            }
            SignalingMessage::CallAnswer { call_id, sdp, .. } => {
                self.handle_answer(call_id, sdp).await;
            }
            SignalingMessage::IceCandidate {
                call_id, candidate, ..
            } => {
                self.handle_ice_candidate(call_id, candidate).await;
            }
            SignalingMessage::CallTermination {
                call_id, reason, ..
            } => {
                self.handle_termination(call_id, reason).await;
            }
            SignalingMessage::Error {
                call_id, message, ..
            } => {
                warn!(target: "Call/Coordinator", "Signaling error from {from}: {message}");
                self.events
                    .emit_state(CallStateEvent::SignalingError { call_id, message });
            }
        }
    }

    async fn handle_invitation(self: &Arc<Self>, from: PeerId, call_id: CallId, video: bool) {
        let mut state = self.state.lock().await;

        // A redelivered copy of an invitation we already know is dropped,
        // never answered; rejecting it would name the live call.
        if state.sessions.contains_key(&call_id) || state.pending.contains_key(&call_id) {
            debug!(target: "Call/Coordinator", "Invitation for known call {call_id}, dropping");
            return;
        }
        // First invitation wins: a second invitation from a peer that
        // already has one pending incoming is auto-rejected.
        if state
            .pending
            .values()
            .any(|p| p.peer == from && p.direction == CallDirection::Incoming)
        {
            warn!(target: "Call/Coordinator", "Duplicate invitation from {from}, rejecting call {call_id}");
            let rejection =
                SignalingMessage::rejection(call_id.clone(), "Duplicate call invitation");
            if let Err(e) = self.channel.send(&from, &rejection).await {
                warn!(target: "Call/Coordinator", "Duplicate rejection send failed: {e}");
            }
            return;
        }

        let pending = PendingCall::new_incoming(call_id.clone(), from, video);
        state.pending.insert(call_id.clone(), pending.clone());
        state.apply(&call_id, CallEvent::IncomingCall);

        // Arm the ring timeout.
        let coordinator = Arc::clone(self);
        let expiring = call_id.clone();
        let window = self.config.incoming_call_timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            coordinator.expire_incoming_call(expiring).await;
        });
        state.timeouts.insert(call_id.clone(), timer);

        info!(
            target: "Call/Coordinator",
            "Incoming {} call {call_id} from {}",
            if video { "video" } else { "audio" },
            pending.peer
        );
        self.events
            .emit_state(CallStateEvent::IncomingCall { pending });
    }

    async fn expire_incoming_call(&self, call_id: CallId) {
        let mut state = self.state.lock().await;

        let Some(pending) = state.pending.get(&call_id) else {
            return;
        };
        if pending.status != PendingCallStatus::InvitationReceived {
            return;
        }
        let peer = pending.peer.clone();

        info!(target: "Call/Coordinator", "Incoming call {call_id} timed out");
        state.pending.remove(&call_id);
        state.timeouts.remove(&call_id);
        state.ice_buffer.remove(&call_id);
        state.offer_buffer.remove(&call_id);
        state.states.remove(&call_id);

        let rejection = SignalingMessage::rejection(call_id.clone(), "Call timeout");
        if let Err(e) = self.channel.send(&peer, &rejection).await {
            warn!(target: "Call/Coordinator", "Timeout rejection send failed for call {call_id}: {e}");
        }
        self.events
            .emit_state(CallStateEvent::CallTimeout { call_id, peer });
    }

    async fn handle_acceptance(&self, from: PeerId, call_id: CallId) {
        let mut state = self.state.lock().await;

        let Some(pending) = state.pending.get(&call_id) else {
            debug!(target: "Call/Coordinator", "Acceptance for unknown call {call_id}, dropping");
            return;
        };
        if pending.direction != CallDirection::Outgoing {
            debug!(target: "Call/Coordinator", "Acceptance for non-outgoing call {call_id}, dropping");
            return;
        }

        state.pending.remove(&call_id);
        state.apply(&call_id, CallEvent::CallAccepted);

        let Some(session) = state.sessions.get(&call_id) else {
            warn!(target: "Call/Coordinator", "Accepted call {call_id} has no session");
            return;
        };
        let Some(handle) = session.local_media else {
            warn!(target: "Call/Coordinator", "Accepted call {call_id} has no local media");
            return;
        };

        self.events.emit_state(CallStateEvent::CallAccepted {
            call_id: call_id.clone(),
            peer: from.clone(),
        });

        // Initiator side of the offer/answer exchange.
        let result = async {
            let offer = self.media.create_offer(handle).await?;
            self.media.set_local_description(handle, offer.clone()).await?;
            self.channel
                .send(&from, &SignalingMessage::offer(call_id.clone(), offer))
                .await?;
            Ok::<(), CallError>(())
        }
        .await;

        if let Err(e) = result {
            self.fail_call_locked(&mut state, &call_id, format!("offer exchange failed: {e}"))
                .await;
        }
    }

    async fn handle_rejection(&self, from: PeerId, call_id: CallId, reason: String) {
        let mut state = self.state.lock().await;

        let pending = state.pending.remove(&call_id);
        let session = state.sessions.remove(&call_id);
        if pending.is_none() && session.is_none() {
            debug!(target: "Call/Coordinator", "Rejection for unknown call {call_id}, dropping");
            return;
        }

        state.cancel_timeout(&call_id);
        state.ice_buffer.remove(&call_id);
        state.offer_buffer.remove(&call_id);
        state.states.remove(&call_id);

        self.quality.forget(&call_id);
        if let Some(handle) = session.and_then(|s| s.local_media) {
            self.media.close(handle).await;
        }

        info!(target: "Call/Coordinator", "Call {call_id} rejected by {from}: {reason}");
        self.events.emit_state(CallStateEvent::CallRejected {
            call_id,
            peer: from,
            reason,
        });
    }

    async fn handle_termination(&self, call_id: CallId, reason: Option<String>) {
        let mut state = self.state.lock().await;

        let pending = state.pending.remove(&call_id);
        let session = state.sessions.remove(&call_id);
        let Some(peer) = session
            .as_ref()
            .map(|s| s.peer.clone())
            .or_else(|| pending.as_ref().map(|p| p.peer.clone()))
        else {
            debug!(target: "Call/Coordinator", "Termination for unknown call {call_id}, dropping");
            return;
        };

        state.cancel_timeout(&call_id);
        state.ice_buffer.remove(&call_id);
        state.offer_buffer.remove(&call_id);
        state.states.remove(&call_id);

        self.quality.forget(&call_id);
        if let Some(handle) = session.as_ref().and_then(|s| s.local_media) {
            self.media.close(handle).await;
        }

        let duration_secs = session
            .as_ref()
            .and_then(|s| s.connected_at)
            .map(|at| Utc::now().signed_duration_since(at).num_seconds());
        info!(target: "Call/Coordinator", "Call {call_id} terminated by {peer}");
        self.events.emit_state(CallStateEvent::CallEnded {
            call_id,
            peer,
            reason,
            duration_secs,
        });
    }

    async fn handle_offer(&self, from: PeerId, call_id: CallId, sdp: SessionDescription) {
        let mut state = self.state.lock().await;

        if state.sessions.get(&call_id).is_none() {
            if state.pending.contains_key(&call_id) {
                // Out-of-order delivery: the offer overtook our acceptance.
                debug!(target: "Call/Coordinator", "Buffering early offer for call {call_id}");
                state.offer_buffer.insert(call_id, sdp);
            } else {
                debug!(target: "Call/Coordinator", "Offer for unknown call {call_id}, dropping");
            }
            return;
        }

        if let Err(e) = self
            .answer_offer_locked(&mut state, &call_id, &from, sdp)
            .await
        {
            self.fail_call_locked(&mut state, &call_id, format!("answer failed: {e}"))
                .await;
            return;
        }
        self.events
            .emit_state(CallStateEvent::OfferReceived { call_id });
    }

    /// Apply a remote offer and send back an answer. Caller holds the lock.
    async fn answer_offer_locked(
        &self,
        state: &mut CoordinatorState,
        call_id: &CallId,
        peer: &PeerId,
        sdp: SessionDescription,
    ) -> Result<(), CallError> {
        let handle = state
            .sessions
            .get(call_id)
            .and_then(|s| s.local_media)
            .ok_or_else(|| CallError::Media("no local media session".into()))?;

        self.media.set_remote_description(handle, sdp).await?;
        let answer = self.media.create_answer(handle).await?;
        self.media.set_local_description(handle, answer.clone()).await?;
        self.channel
            .send(peer, &SignalingMessage::answer(call_id.clone(), answer))
            .await?;
        Ok(())
    }

    async fn handle_answer(&self, call_id: CallId, sdp: SessionDescription) {
        let mut state = self.state.lock().await;

        let Some(handle) = state.sessions.get(&call_id).and_then(|s| s.local_media) else {
            debug!(target: "Call/Coordinator", "Answer for unknown call {call_id}, dropping");
            return;
        };

        if let Err(e) = self.media.set_remote_description(handle, sdp).await {
            self.fail_call_locked(&mut state, &call_id, format!("remote answer rejected: {e}"))
                .await;
            return;
        }
        self.events
            .emit_state(CallStateEvent::AnswerReceived { call_id });
    }

    async fn handle_ice_candidate(&self, call_id: CallId, candidate: IceCandidatePayload) {
        let mut state = self.state.lock().await;

        if let Some(handle) = state.sessions.get(&call_id).and_then(|s| s.local_media) {
            if let Err(e) = self.media.add_ice_candidate(handle, candidate).await {
                warn!(target: "Call/Coordinator", "Candidate rejected for call {call_id}: {e}");
            }
        } else if state.pending.contains_key(&call_id) {
            // Candidates may legally arrive before the offer/answer exchange.
            state
                .ice_buffer
                .entry(call_id.clone())
                .or_default()
                .push(candidate);
        } else {
            debug!(target: "Call/Coordinator", "Candidate for unknown call {call_id}, dropping");
            return;
        }

        self.events
            .emit_state(CallStateEvent::IceCandidateReceived { call_id });
    }

    async fn fail_call_locked(
        &self,
        state: &mut CoordinatorState,
        call_id: &CallId,
        reason: String,
    ) {
        state.cancel_timeout(call_id);
        state.pending.remove(call_id);
        state.ice_buffer.remove(call_id);
        state.offer_buffer.remove(call_id);
        let session = state.sessions.remove(call_id);
        state.states.remove(call_id);

        self.quality.forget(call_id);
        if let Some(handle) = session.and_then(|s| s.local_media) {
            self.media.close(handle).await;
        }

        warn!(target: "Call/Coordinator", "Call {call_id} failed: {reason}");
        self.events.emit_state(CallStateEvent::CallFailed {
            call_id: call_id.clone(),
            reason,
        });
    }

    /// Authoritative state for a known call identifier. Ended and failed
    /// calls are forgotten and report `None`.
    pub async fn call_state(&self, call_id: &CallId) -> Option<CallState> {
        self.state.lock().await.states.get(call_id).copied()
    }

    pub async fn get_session(&self, call_id: &CallId) -> Option<CallSession> {
        self.state.lock().await.sessions.get(call_id).cloned()
    }

    pub async fn get_pending(&self, call_id: &CallId) -> Option<PendingCall> {
        self.state.lock().await.pending.get(call_id).cloned()
    }

    /// All live sessions.
    pub async fn active_calls(&self) -> Vec<CallSession> {
        self.state
            .lock()
            .await
            .sessions
            .values()
            .filter(|s| s.status.is_live())
            .cloned()
            .collect()
    }

    pub async fn pending_calls(&self) -> Vec<PendingCall> {
        self.state.lock().await.pending.values().cloned().collect()
    }
}
