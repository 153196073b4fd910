// src/state/machine.rs

//! Per-target execution state and its transition table.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::errors::StateError;
use crate::target::TargetName;

/// Persisted lifecycle state of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    /// Initial state: never submitted, or re-armed by `reset`.
    #[serde(rename = "unknown", alias = "shouldrun")]
    ShouldRun,
    Submitted,
    Running,
    Completed,
    Failed,
    Killed,
    Cancelled,
}

impl State {
    pub const INITIAL: State = State::ShouldRun;

    pub const ALL: [State; 7] = [
        State::ShouldRun,
        State::Submitted,
        State::Running,
        State::Completed,
        State::Failed,
        State::Killed,
        State::Cancelled,
    ];

    pub const END_STATES: [State; 4] = [
        State::Completed,
        State::Failed,
        State::Killed,
        State::Cancelled,
    ];

    /// Valid successors of `self`. Empty for end states.
    pub fn successors(self) -> &'static [State] {
        match self {
            State::ShouldRun => &[State::Submitted],
            State::Submitted => &[State::Running],
            State::Running => &Self::END_STATES,
            State::Completed | State::Failed | State::Killed | State::Cancelled => &[],
        }
    }

    pub fn can_move_to(self, to: State) -> bool {
        self.successors().contains(&to)
    }

    pub fn is_end_state(self) -> bool {
        Self::END_STATES.contains(&self)
    }

    /// Submitted or running: an external job should exist for it.
    pub fn is_in_flight(self) -> bool {
        matches!(self, State::Submitted | State::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::ShouldRun => "unknown",
            State::Submitted => "submitted",
            State::Running => "running",
            State::Completed => "completed",
            State::Failed => "failed",
            State::Killed => "killed",
            State::Cancelled => "cancelled",
        }
    }
}

impl Default for State {
    fn default() -> Self {
        State::INITIAL
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unknown" | "shouldrun" => Ok(State::ShouldRun),
            "submitted" => Ok(State::Submitted),
            "running" => Ok(State::Running),
            "completed" => Ok(State::Completed),
            "failed" => Ok(State::Failed),
            "killed" => Ok(State::Killed),
            "cancelled" => Ok(State::Cancelled),
            other => Err(format!("invalid target state: {other}")),
        }
    }
}

/// Seconds since the Unix epoch, as stored in state records.
pub type Timestamp = f64;

pub fn now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// One target's execution record.
///
/// This is a snapshot; the persisted store owns the durable copy. Mutating
/// methods here never touch the store, see
/// [`StateStore::transition`](crate::state::StateStore::transition) for the
/// committing variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetState {
    /// Key of the record; not part of the serialized value.
    #[serde(skip)]
    pub name: TargetName,
    #[serde(default)]
    pub state: State,
    #[serde(default)]
    pub submitted_at: Option<Timestamp>,
    #[serde(default)]
    pub started_at: Option<Timestamp>,
    #[serde(default)]
    pub ended_at: Option<Timestamp>,
}

impl TargetState {
    /// Fresh record in the initial state with no timestamps.
    pub fn new(name: impl Into<TargetName>) -> Self {
        Self {
            name: name.into(),
            state: State::INITIAL,
            submitted_at: None,
            started_at: None,
            ended_at: None,
        }
    }

    /// Decode a persisted value. Missing fields take the initial defaults.
    pub fn from_payload(name: &str, payload: &[u8]) -> Result<Self, StateError> {
        let mut state: TargetState =
            serde_json::from_slice(payload).map_err(|source| StateError::Corrupt {
                target: name.to_string(),
                source,
            })?;
        state.name = name.to_string();
        Ok(state)
    }

    pub fn to_payload(&self) -> Vec<u8> {
        // Serializing plain enums and options into JSON can not fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Move to `to` in memory, stamping the matching timestamp with now.
    pub fn transition(&mut self, to: State) -> Result<(), StateError> {
        self.transition_at(to, now())
    }

    /// Like [`transition`](Self::transition) with an explicit clock reading.
    ///
    /// The stamped time is clamped to the latest existing stamp, so the
    /// ordering `submitted_at <= started_at <= ended_at` survives a clock
    /// stepping backwards.
    pub fn transition_at(&mut self, to: State, at: Timestamp) -> Result<(), StateError> {
        if self.state.is_end_state() {
            return Err(StateError::TerminalState {
                target: self.name.clone(),
                state: self.state,
            });
        }
        if !self.state.can_move_to(to) {
            return Err(StateError::InvalidTransition {
                target: self.name.clone(),
                from: self.state,
                to,
            });
        }

        let floor = [self.submitted_at, self.started_at, self.ended_at]
            .into_iter()
            .flatten()
            .fold(f64::NEG_INFINITY, f64::max);
        let at = at.max(floor);

        match to {
            State::Submitted => self.submitted_at = Some(at),
            State::Running => self.started_at = Some(at),
            s if s.is_end_state() => self.ended_at = Some(at),
            _ => {}
        }
        self.state = to;
        Ok(())
    }

    /// Re-arm: back to the initial state with all timestamps cleared.
    pub fn reset(&mut self) {
        self.state = State::INITIAL;
        self.submitted_at = None;
        self.started_at = None;
        self.ended_at = None;
    }

    pub fn is_end_state(&self) -> bool {
        self.state.is_end_state()
    }

    /// Seconds elapsed so far while running, otherwise `None`.
    pub fn runtime(&self) -> Option<f64> {
        self.runtime_at(now())
    }

    pub fn runtime_at(&self, at: Timestamp) -> Option<f64> {
        if self.state != State::Running {
            return None;
        }
        self.started_at.map(|started| (at - started).max(0.0))
    }

    /// Seconds between start and end once in an end state, otherwise `None`.
    pub fn walltime(&self) -> Option<f64> {
        if !self.is_end_state() {
            return None;
        }
        match (self.started_at, self.ended_at) {
            (Some(started), Some(ended)) => Some(ended - started),
            _ => None,
        }
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_state(state: State) -> TargetState {
        TargetState {
            name: "t".to_string(),
            state,
            submitted_at: Some(1.0),
            started_at: Some(2.0),
            ended_at: None,
        }
    }

    #[test]
    fn transition_table_is_strict() {
        for from in State::ALL {
            for to in State::ALL {
                let mut s = in_state(from);
                let res = s.transition_at(to, 10.0);
                assert_eq!(
                    res.is_ok(),
                    from.successors().contains(&to),
                    "{from} -> {to}"
                );
                if res.is_err() {
                    assert_eq!(s.state, from, "failed transition must not mutate");
                }
            }
        }
    }

    #[test]
    fn running_to_submitted_fails() {
        let mut s = in_state(State::Running);
        let err = s.transition(State::Submitted).unwrap_err();
        assert!(matches!(err, StateError::InvalidTransition { .. }));
    }

    #[test]
    fn end_states_are_terminal() {
        for end in State::END_STATES {
            let mut s = in_state(end);
            let err = s.transition(State::Submitted).unwrap_err();
            assert!(matches!(err, StateError::TerminalState { .. }));
        }
    }

    #[test]
    fn transitions_stamp_matching_timestamp() {
        let mut s = TargetState::new("t");
        s.transition_at(State::Submitted, 10.0).unwrap();
        assert_eq!(s.submitted_at, Some(10.0));
        s.transition_at(State::Running, 11.0).unwrap();
        assert_eq!(s.started_at, Some(11.0));
        s.transition_at(State::Completed, 15.5).unwrap();
        assert_eq!(s.ended_at, Some(15.5));
        assert_eq!(s.walltime(), Some(4.5));
    }

    #[test]
    fn clock_going_backwards_keeps_ordering() {
        let mut s = TargetState::new("t");
        s.transition_at(State::Submitted, 10.0).unwrap();
        s.transition_at(State::Running, 5.0).unwrap();
        s.transition_at(State::Failed, 3.0).unwrap();

        assert_eq!(s.started_at, Some(10.0));
        assert_eq!(s.ended_at, Some(10.0));
    }

    #[test]
    fn reset_from_end_state_clears_everything() {
        for end in State::END_STATES {
            let mut s = in_state(end);
            s.ended_at = Some(3.0);
            s.reset();
            assert_eq!(s, TargetState::new("t"));
        }
    }

    #[test]
    fn durations_are_none_without_timestamps() {
        let mut s = TargetState::new("t");
        assert_eq!(s.runtime(), None);
        assert_eq!(s.walltime(), None);

        s.state = State::Running;
        assert_eq!(s.runtime(), None);

        s.state = State::Completed;
        assert_eq!(s.walltime(), None);

        s.started_at = Some(100.0);
        assert_eq!(s.runtime_at(103.0), None);
    }

    #[test]
    fn runtime_only_while_running() {
        let mut s = TargetState::new("t");
        s.transition_at(State::Submitted, 1.0).unwrap();
        assert_eq!(s.runtime_at(2.0), None);
        s.transition_at(State::Running, 2.0).unwrap();
        assert_eq!(s.runtime_at(5.0), Some(3.0));
        s.transition_at(State::Killed, 6.0).unwrap();
        assert_eq!(s.runtime_at(7.0), None);
    }

    #[test]
    fn payload_uses_lowercase_state_names() {
        let mut s = TargetState::new("t");
        let json: serde_json::Value = serde_json::from_slice(&s.to_payload()).unwrap();
        assert_eq!(json["state"], "unknown");
        assert!(json["submitted_at"].is_null());
        assert!(json.get("name").is_none());

        s.transition_at(State::Submitted, 42.0).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&s.to_payload()).unwrap();
        assert_eq!(json["state"], "submitted");
        assert_eq!(json["submitted_at"], 42.0);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let s = TargetState::from_payload("t", br#"{"started_at": 3.0}"#).unwrap();
        assert_eq!(s.state, State::ShouldRun);
        assert_eq!(s.started_at, Some(3.0));
        assert_eq!(s.submitted_at, None);

        let s = TargetState::from_payload("t", b"{}").unwrap();
        assert_eq!(s, TargetState::new("t"));

        let s = TargetState::from_payload("t", br#"{"state": "shouldrun"}"#).unwrap();
        assert_eq!(s.state, State::ShouldRun);
    }

    #[test]
    fn corrupt_payload_is_an_error() {
        for payload in [&b"not json"[..], br#"{"state": "exploded"}"#, b"[1,2]"] {
            let err = TargetState::from_payload("t", payload).unwrap_err();
            assert!(matches!(err, StateError::Corrupt { .. }));
        }
    }

    #[test]
    fn state_parses_from_str() {
        for s in State::ALL {
            assert_eq!(s.as_str().parse::<State>().unwrap(), s);
        }
        assert!("bogus".parse::<State>().is_err());
    }
}
