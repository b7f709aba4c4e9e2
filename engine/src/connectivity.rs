//! Connectivity as an explicit two-state machine.
//!
//! State changes come from exactly two sources: the outcome of an active
//! health probe, and a transport failure on a live request. Runtime
//! connectivity events (browser/OS "online" notifications) are unreliable
//! and never change the state directly; they only ask for a re-probe.

use serde::{Deserialize, Serialize};

/// Whether the ledger is currently reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnState {
    Online,
    /// Starting state until the first probe succeeds.
    #[default]
    Offline,
}

/// Result of an active health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable,
    Unreachable,
}

/// A state change worth reacting to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Offline -> Online: time to drain the mutation queue.
    WentOnline,
    /// Online -> Offline: stop draining, start queueing.
    WentOffline,
}

/// The connectivity state machine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connectivity {
    state: ConnState,
}

impl Connectivity {
    /// Start offline; the first successful probe flips the state.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn is_online(&self) -> bool {
        self.state == ConnState::Online
    }

    /// Record a probe outcome. Returns the transition, if any.
    pub fn record_probe(&mut self, outcome: ProbeOutcome) -> Option<Transition> {
        let next = match outcome {
            ProbeOutcome::Reachable => ConnState::Online,
            ProbeOutcome::Unreachable => ConnState::Offline,
        };
        self.set(next)
    }

    /// Record a transport-level failure on a live request. Always forces
    /// offline. Returns the transition, if any.
    pub fn record_transport_failure(&mut self) -> Option<Transition> {
        self.set(ConnState::Offline)
    }

    fn set(&mut self, next: ConnState) -> Option<Transition> {
        if self.state == next {
            return None;
        }
        self.state = next;
        Some(match next {
            ConnState::Online => Transition::WentOnline,
            ConnState::Offline => Transition::WentOffline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_offline() {
        let conn = Connectivity::new();
        assert!(!conn.is_online());
    }

    #[test]
    fn probe_success_goes_online_once() {
        let mut conn = Connectivity::new();
        assert_eq!(
            conn.record_probe(ProbeOutcome::Reachable),
            Some(Transition::WentOnline)
        );
        // A second successful probe is not a transition.
        assert_eq!(conn.record_probe(ProbeOutcome::Reachable), None);
        assert!(conn.is_online());
    }

    #[test]
    fn probe_failure_goes_offline() {
        let mut conn = Connectivity::new();
        conn.record_probe(ProbeOutcome::Reachable);
        assert_eq!(
            conn.record_probe(ProbeOutcome::Unreachable),
            Some(Transition::WentOffline)
        );
        assert!(!conn.is_online());
    }

    #[test]
    fn transport_failure_forces_offline() {
        let mut conn = Connectivity::new();
        conn.record_probe(ProbeOutcome::Reachable);
        assert_eq!(
            conn.record_transport_failure(),
            Some(Transition::WentOffline)
        );
        // Already offline: no duplicate transition.
        assert_eq!(conn.record_transport_failure(), None);
    }

    #[test]
    fn flapping_produces_paired_transitions() {
        let mut conn = Connectivity::new();
        let mut transitions = Vec::new();
        for outcome in [
            ProbeOutcome::Reachable,
            ProbeOutcome::Unreachable,
            ProbeOutcome::Reachable,
        ] {
            if let Some(t) = conn.record_probe(outcome) {
                transitions.push(t);
            }
        }
        assert_eq!(
            transitions,
            vec![
                Transition::WentOnline,
                Transition::WentOffline,
                Transition::WentOnline
            ]
        );
    }
}
