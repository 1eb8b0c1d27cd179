use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RevealPhase {
    Idle,
    Armed,
    Counting,
    Completed,
}

/// Countdown state for one round's result reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundTimer {
    pub phase: RevealPhase,
    pub remaining: Option<u32>,
}

impl Default for RoundTimer {
    fn default() -> Self {
        Self {
            phase: RevealPhase::Idle,
            remaining: None,
        }
    }
}

/// Per-round reveal countdown states, retained for the current and previous
/// round only. A round that reached `Completed` stays completed for as long
/// as it is retained; late or duplicate events cannot re-arm it.
#[derive(Debug, Default)]
pub struct TimerLedger {
    states: BTreeMap<u32, RoundTimer>,
}

impl TimerLedger {
    /// Arms a round's countdown at `ceil(duration_seconds)`. Only an `Idle`
    /// round arms; anything already armed, counting or completed rejects the
    /// request. Callers must only pass the current round.
    pub fn arm(&mut self, round_number: u32, duration_seconds: f64) -> bool {
        if duration_seconds <= 0.0 {
            return false;
        }

        let state = self.states.entry(round_number).or_default();
        match state.phase {
            RevealPhase::Idle => {
                state.phase = RevealPhase::Armed;
                state.remaining = Some(duration_seconds.ceil() as u32);
                true
            }
            RevealPhase::Completed => {
                tracing::debug!(round = round_number, "Rejecting re-arm of a completed round");
                false
            }
            RevealPhase::Armed | RevealPhase::Counting => false,
        }
    }

    /// Starts an armed countdown. Returns false if the round was not armed.
    pub fn start(&mut self, round_number: u32) -> bool {
        match self.states.get_mut(&round_number) {
            Some(state) if state.phase == RevealPhase::Armed => {
                state.phase = RevealPhase::Counting;
                true
            }
            _ => false,
        }
    }

    /// One 1 Hz tick: decrements a counting round, completing it once a
    /// second or less remains. Returns true when there is nothing left to
    /// count for the round.
    pub fn tick(&mut self, round_number: u32) -> bool {
        match self.states.get_mut(&round_number) {
            Some(state) if state.phase == RevealPhase::Counting => {
                let remaining = state.remaining.unwrap_or(0);
                if remaining > 1 {
                    state.remaining = Some(remaining - 1);
                    false
                } else {
                    state.remaining = Some(0);
                    state.phase = RevealPhase::Completed;
                    true
                }
            }
            _ => true,
        }
    }

    pub fn retain_window(&mut self, current_round: u32) {
        self.states
            .retain(|round, _| *round == current_round || round + 1 == current_round);
    }

    pub fn state(&self, round_number: u32) -> RoundTimer {
        self.states.get(&round_number).copied().unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}
