use std::collections::BTreeMap;

use crate::snapshot::{CombatEvent, CombatHistory, CombatOutcome, PlayerDirectory, MAX_ROUNDS};

use super::grouper::Participant;

/// One participant's outcome in one round, from that participant's own
/// perspective.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeEntry {
    pub result: CombatOutcome,
    pub opponent_account_id: u64,
    pub opponent_name: String,
    pub is_bot_fight: bool,
    pub source: CombatEvent,
}

/// Fixed 40-round outcome table, rebuilt in full from the combat history on
/// every update. Later events overwrite earlier entries for the same slot, so
/// conflicting duplicates display whatever the latest snapshot said.
#[derive(Debug, Default)]
pub struct RoundTable {
    rounds: Vec<BTreeMap<Participant, OutcomeEntry>>,
}

impl RoundTable {
    pub fn build(history: &CombatHistory, directory: &PlayerDirectory<'_>) -> Self {
        let mut rounds: Vec<BTreeMap<Participant, OutcomeEntry>> =
            vec![BTreeMap::new(); MAX_ROUNDS as usize];

        for event in history.events() {
            if !event.round_in_range() {
                tracing::debug!(
                    round = event.round_number,
                    player = event.player_account_id,
                    "Dropping combat event outside the round table"
                );
                continue;
            }
            if !directory.contains(event.player_account_id) {
                tracing::debug!(
                    player = event.player_account_id,
                    "Dropping combat event for unknown account"
                );
                continue;
            }

            let slot = &mut rounds[(event.round_number - 1) as usize];

            slot.insert(
                Participant::Player {
                    account_id: event.player_account_id,
                },
                OutcomeEntry {
                    result: event.result,
                    opponent_account_id: event.opponent_account_id,
                    opponent_name: directory.display_name(event.opponent_account_id),
                    is_bot_fight: event.combat_type.is_bot_fight(),
                    source: event.clone(),
                },
            );

            // The other perspective only exists when the backing account is
            // known; it self-heals once the player list catches up.
            if !directory.contains(event.opponent_account_id) {
                continue;
            }

            let mirrored = OutcomeEntry {
                result: event.result.invert(),
                opponent_account_id: event.player_account_id,
                opponent_name: directory.display_name(event.player_account_id),
                is_bot_fight: false,
                source: event.clone(),
            };

            if event.combat_type.is_real_match() {
                slot.insert(
                    Participant::Player {
                        account_id: event.opponent_account_id,
                    },
                    mirrored,
                );
            } else {
                slot.insert(
                    Participant::Bot {
                        origin_account_id: event.opponent_account_id,
                        round_number: event.round_number,
                    },
                    mirrored,
                );
            }
        }

        Self { rounds }
    }

    pub fn round(&self, round_number: u32) -> Option<&BTreeMap<Participant, OutcomeEntry>> {
        if !(1..=MAX_ROUNDS).contains(&round_number) {
            return None;
        }
        self.rounds.get((round_number - 1) as usize)
    }

    pub fn entry(&self, round_number: u32, participant: &Participant) -> Option<&OutcomeEntry> {
        self.round(round_number)
            .and_then(|slot| slot.get(participant))
    }
}
