use std::collections::HashSet;

use serde::Serialize;

use crate::snapshot::{CombatEvent, PlayerDirectory};

/// One side of a matchup. A `Bot` is synthesized from the event stream each
/// snapshot: it has no identity of its own beyond the account whose stats
/// back it and the round it was inferred for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Participant {
    Player {
        account_id: u64,
    },
    Bot {
        origin_account_id: u64,
        round_number: u32,
    },
}

impl Participant {
    /// The real account whose snapshot backs this participant's stats.
    pub fn stat_account_id(&self) -> u64 {
        match self {
            Participant::Player { account_id } => *account_id,
            Participant::Bot {
                origin_account_id, ..
            } => *origin_account_id,
        }
    }

    pub fn is_bot(&self) -> bool {
        matches!(self, Participant::Bot { .. })
    }

    pub fn player_slot(&self, directory: &PlayerDirectory<'_>) -> u32 {
        directory
            .get(self.stat_account_id())
            .map(|player| player.player_slot)
            .unwrap_or(0)
    }

    pub fn health(&self, directory: &PlayerDirectory<'_>) -> i32 {
        directory
            .get(self.stat_account_id())
            .map(|player| player.health)
            .unwrap_or(0)
    }

    pub fn final_place(&self, directory: &PlayerDirectory<'_>) -> u32 {
        directory
            .get(self.stat_account_id())
            .map(|player| player.final_place)
            .unwrap_or(0)
    }

    pub fn is_eliminated(&self, directory: &PlayerDirectory<'_>) -> bool {
        self.final_place(directory) > 0
    }

    pub fn display_name(&self, directory: &PlayerDirectory<'_>) -> String {
        let name = directory.display_name(self.stat_account_id());
        match self {
            Participant::Player { .. } => name,
            Participant::Bot { .. } => format!("{name} (bot)"),
        }
    }
}

/// Exactly two participants who fought each other in one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Matchup {
    pub participants: [Participant; 2],
}

impl Matchup {
    pub(crate) fn min_slot(&self, directory: &PlayerDirectory<'_>) -> u32 {
        self.participants
            .iter()
            .map(|participant| participant.player_slot(directory))
            .min()
            .unwrap_or(0)
    }
}

/// Partitions one round's events into exclusive pairwise matchups.
///
/// Confirmed real pairings are taken first; bot fights are inferred after, so
/// an account already placed by a real match is never grouped twice even when
/// the source data only reports one side of a fight. Output is ordered by the
/// lowest slot in each matchup, ties keeping input order.
pub fn group_round_matchups(
    round_events: &[&CombatEvent],
    directory: &PlayerDirectory<'_>,
) -> Vec<Matchup> {
    let mut grouped_accounts: HashSet<u64> = HashSet::new();
    let mut emitted_bot_keys: HashSet<(u64, u32)> = HashSet::new();
    let mut matchups = Vec::new();

    for event in round_events
        .iter()
        .filter(|event| event.combat_type.is_real_match())
    {
        let player = event.player_account_id;
        let opponent = event.opponent_account_id;

        if grouped_accounts.contains(&player) || grouped_accounts.contains(&opponent) {
            continue;
        }
        if !directory.contains(player) || !directory.contains(opponent) {
            continue;
        }

        matchups.push(Matchup {
            participants: [
                Participant::Player {
                    account_id: player,
                },
                Participant::Player {
                    account_id: opponent,
                },
            ],
        });
        grouped_accounts.insert(player);
        grouped_accounts.insert(opponent);
    }

    for event in round_events
        .iter()
        .filter(|event| event.combat_type.is_bot_fight())
    {
        let player = event.player_account_id;
        let origin = event.opponent_account_id;

        if grouped_accounts.contains(&player) {
            continue;
        }
        if !directory.contains(player) || !directory.contains(origin) {
            continue;
        }

        let bot_key = (origin, event.round_number);
        if emitted_bot_keys.contains(&bot_key) {
            continue;
        }

        matchups.push(Matchup {
            participants: [
                Participant::Player {
                    account_id: player,
                },
                Participant::Bot {
                    origin_account_id: origin,
                    round_number: event.round_number,
                },
            ],
        });
        grouped_accounts.insert(player);
        emitted_bot_keys.insert(bot_key);
    }

    // Stable sort: equal minimum slots keep their discovery order.
    matchups.sort_by_key(|matchup| matchup.min_slot(directory));
    matchups
}
