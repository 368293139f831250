//! Call state machine.
//!
//! [`transition`] is a pure function over [`CallState`] and [`CallEvent`];
//! it performs no I/O and never panics. Events with no entry in the table
//! leave the state unchanged, so stray or late signaling can never crash
//! the machine. [`is_valid_transition`] is a separately written predicate
//! over (from, to, event) triples used to verify the table.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a single call identifier.
///
/// `Ended` and `Failed` are terminal for the current attempt but reusable:
/// the coordinator may start a fresh attempt on the same identifier, which
/// re-enters via `InitiateCall` or `IncomingCall`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CallState {
    #[default]
    Idle,
    /// Outgoing call: invitation sent, waiting for the peer.
    Initiating,
    /// Incoming call: ringing locally.
    Ringing,
    /// Both sides agreed, media connection being established.
    Connecting,
    /// Media flowing.
    Connected,
    /// Local teardown in progress.
    Ending,
    Ended,
    Failed,
}

impl CallState {
    /// All states, for exhaustive table checks.
    pub const ALL: [CallState; 8] = [
        Self::Idle,
        Self::Initiating,
        Self::Ringing,
        Self::Connecting,
        Self::Connected,
        Self::Ending,
        Self::Ended,
        Self::Failed,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Failed)
    }

    pub fn is_live(&self) -> bool {
        matches!(
            self,
            Self::Initiating | Self::Ringing | Self::Connecting | Self::Connected
        )
    }
}

/// Events that drive the call state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallEvent {
    InitiateCall,
    IncomingCall,
    AcceptCall,
    CallAccepted,
    RejectCall,
    CallRejected,
    CallConnected,
    CallFailed,
    ConnectionLost,
    EndCall,
    CallEnded,
    CallTimeout,
    Error,
}

impl CallEvent {
    /// All events, for exhaustive table checks.
    pub const ALL: [CallEvent; 13] = [
        Self::InitiateCall,
        Self::IncomingCall,
        Self::AcceptCall,
        Self::CallAccepted,
        Self::RejectCall,
        Self::CallRejected,
        Self::CallConnected,
        Self::CallFailed,
        Self::ConnectionLost,
        Self::EndCall,
        Self::CallEnded,
        Self::CallTimeout,
        Self::Error,
    ];
}

/// Pure transition function. Unlisted (state, event) pairs are no-ops.
pub fn transition(current: CallState, event: CallEvent) -> CallState {
    use CallEvent as E;
    use CallState as S;

    match (current, event) {
        (S::Idle, E::InitiateCall) => S::Initiating,
        (S::Idle, E::IncomingCall) => S::Ringing,

        (S::Initiating, E::CallAccepted) => S::Connecting,
        (S::Initiating, E::CallRejected) => S::Ended,
        (S::Initiating, E::CallTimeout) => S::Failed,
        (S::Initiating, E::EndCall) => S::Ending,

        (S::Ringing, E::AcceptCall) => S::Connecting,
        (S::Ringing, E::RejectCall) => S::Ended,
        (S::Ringing, E::CallTimeout) => S::Ended,
        (S::Ringing, E::EndCall) => S::Ending,

        (S::Connecting, E::CallConnected) => S::Connected,
        (S::Connecting, E::CallFailed) => S::Failed,
        (S::Connecting, E::EndCall) => S::Ending,
        (S::Connecting, E::CallTimeout) => S::Failed,

        (S::Connected, E::EndCall) => S::Ending,
        (S::Connected, E::CallFailed) => S::Failed,
        (S::Connected, E::ConnectionLost) => S::Connecting,

        (S::Ending, E::CallEnded) => S::Ended,
        (S::Ending, E::CallFailed) => S::Failed,

        // Terminal-but-reusable: a fresh attempt on the same identifier.
        (S::Ended | S::Failed, E::InitiateCall) => S::Initiating,
        (S::Ended | S::Failed, E::IncomingCall) => S::Ringing,

        (state, _) => state,
    }
}

/// Whether `event` moves the machine out of `from` at all.
fn moves(from: CallState, event: CallEvent) -> bool {
    use CallEvent as E;
    use CallState as S;

    let armed: &[E] = match from {
        S::Idle => &[E::InitiateCall, E::IncomingCall],
        S::Initiating => &[E::CallAccepted, E::CallRejected, E::CallTimeout, E::EndCall],
        S::Ringing => &[E::AcceptCall, E::RejectCall, E::CallTimeout, E::EndCall],
        S::Connecting => &[E::CallConnected, E::CallFailed, E::EndCall, E::CallTimeout],
        S::Connected => &[E::EndCall, E::CallFailed, E::ConnectionLost],
        S::Ending => &[E::CallEnded, E::CallFailed],
        S::Ended | S::Failed => &[E::InitiateCall, E::IncomingCall],
    };
    armed.contains(&event)
}

/// Verification predicate, written edge-first rather than event-first so it
/// can cross-check [`transition`] instead of restating it.
///
/// A (from, to, event) triple is valid when either the edge from→to is
/// labeled with `event`, or `to == from` and `event` is not armed in `from`
/// (the no-op case).
pub fn is_valid_transition(from: CallState, to: CallState, event: CallEvent) -> bool {
    use CallEvent as E;
    use CallState as S;

    let edge_ok = match (from, to) {
        (S::Idle, S::Initiating) => event == E::InitiateCall,
        (S::Idle, S::Ringing) => event == E::IncomingCall,
        (S::Initiating, S::Connecting) => event == E::CallAccepted,
        (S::Initiating, S::Ended) => event == E::CallRejected,
        (S::Initiating, S::Failed) => event == E::CallTimeout,
        (S::Initiating, S::Ending) => event == E::EndCall,
        (S::Ringing, S::Connecting) => event == E::AcceptCall,
        (S::Ringing, S::Ended) => matches!(event, E::RejectCall | E::CallTimeout),
        (S::Ringing, S::Ending) => event == E::EndCall,
        (S::Connecting, S::Connected) => event == E::CallConnected,
        (S::Connecting, S::Failed) => matches!(event, E::CallFailed | E::CallTimeout),
        (S::Connecting, S::Ending) => event == E::EndCall,
        (S::Connected, S::Ending) => event == E::EndCall,
        (S::Connected, S::Failed) => event == E::CallFailed,
        (S::Connected, S::Connecting) => event == E::ConnectionLost,
        (S::Ending, S::Ended) => event == E::CallEnded,
        (S::Ending, S::Failed) => event == E::CallFailed,
        (S::Ended | S::Failed, S::Initiating) => event == E::InitiateCall,
        (S::Ended | S::Failed, S::Ringing) => event == E::IncomingCall,
        _ => false,
    };

    edge_ok || (from == to && !moves(from, event))
}

/// An event the coordinator refused to apply in the current state.
#[derive(Debug, Clone)]
pub struct InvalidTransition {
    pub current_state: CallState,
    pub attempted: CallEvent,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "event {:?} not applicable in state {:?}",
            self.attempted, self.current_state
        )
    }
}

impl std::error::Error for InvalidTransition {}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every output of `transition` must satisfy the predicate. This is the
    /// core invariant between the two entry points, checked over the full
    /// cross product.
    #[test]
    fn test_transition_outputs_are_valid() {
        for from in CallState::ALL {
            for event in CallEvent::ALL {
                let to = transition(from, event);
                assert!(
                    is_valid_transition(from, to, event),
                    "transition({from:?}, {event:?}) = {to:?} fails predicate"
                );
            }
        }
    }

    /// Pairs without a table entry leave the state untouched.
    #[test]
    fn test_unlisted_pairs_are_noops() {
        use CallEvent as E;
        use CallState as S;

        assert_eq!(transition(S::Idle, E::CallConnected), S::Idle);
        assert_eq!(transition(S::Idle, E::EndCall), S::Idle);
        assert_eq!(transition(S::Connected, E::AcceptCall), S::Connected);
        assert_eq!(transition(S::Ended, E::EndCall), S::Ended);
        assert_eq!(transition(S::Failed, E::CallEnded), S::Failed);

        // Error is a no-op everywhere.
        for from in CallState::ALL {
            assert_eq!(transition(from, E::Error), from);
        }
    }

    /// The predicate rejects edges the table never produces.
    #[test]
    fn test_predicate_rejects_foreign_edges() {
        use CallEvent as E;
        use CallState as S;

        assert!(!is_valid_transition(S::Idle, S::Connected, E::CallConnected));
        assert!(!is_valid_transition(S::Ringing, S::Connected, E::AcceptCall));
        assert!(!is_valid_transition(S::Connected, S::Ended, E::EndCall));
        // Right edge, wrong label.
        assert!(!is_valid_transition(S::Idle, S::Initiating, E::IncomingCall));
        // Armed event cannot be claimed as a no-op.
        assert!(!is_valid_transition(S::Ringing, S::Ringing, E::AcceptCall));
    }

    #[test]
    fn test_outgoing_call_happy_path() {
        use CallEvent as E;
        use CallState as S;

        let mut state = S::Idle;
        for (event, expected) in [
            (E::InitiateCall, S::Initiating),
            (E::CallAccepted, S::Connecting),
            (E::CallConnected, S::Connected),
            (E::EndCall, S::Ending),
            (E::CallEnded, S::Ended),
        ] {
            state = transition(state, event);
            assert_eq!(state, expected);
        }
    }

    #[test]
    fn test_incoming_call_happy_path() {
        use CallEvent as E;
        use CallState as S;

        let mut state = S::Idle;
        for (event, expected) in [
            (E::IncomingCall, S::Ringing),
            (E::AcceptCall, S::Connecting),
            (E::CallConnected, S::Connected),
        ] {
            state = transition(state, event);
            assert_eq!(state, expected);
        }
    }

    #[test]
    fn test_connection_loss_falls_back_to_connecting() {
        use CallEvent as E;
        use CallState as S;

        let state = transition(S::Connected, E::ConnectionLost);
        assert_eq!(state, S::Connecting);
        // A recovered connection goes straight back to Connected.
        assert_eq!(transition(state, E::CallConnected), S::Connected);
    }

    #[test]
    fn test_terminal_states_are_reusable() {
        use CallEvent as E;
        use CallState as S;

        assert_eq!(transition(S::Ended, E::InitiateCall), S::Initiating);
        assert_eq!(transition(S::Failed, E::IncomingCall), S::Ringing);
    }
}
