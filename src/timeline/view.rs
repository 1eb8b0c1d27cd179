use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::settings::TimelineSettings;
use crate::snapshot::{
    CombatOutcome, CurrentRound, DisplayMode, PlayerDirectory, PlayerSnapshot, RoundPhase,
    SortMode, MAX_ROUNDS,
};

use super::grouper::{Matchup, Participant};
use super::ledger::ReceiptLedger;
use super::round_table::{OutcomeEntry, RoundTable};
use super::timer::RoundTimer;

/// Operator-chosen display state, orthogonal to the feed snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewOptions {
    pub display_mode: DisplayMode,
    pub sort_mode: SortMode,
    /// Pre-filters the outcome table to combats involving this account.
    #[serde(default)]
    pub focused_account: Option<u64>,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            display_mode: DisplayMode::Main,
            sort_mode: SortMode::PlayerSlot,
            focused_account: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundCell {
    pub result: CombatOutcome,
    pub opponent_account_id: u64,
    pub opponent_name: String,
    pub is_bot_fight: bool,
    /// Seconds the renderer must still hide this result behind an overlay.
    /// Absent once the result may be shown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reveal_remaining_seconds: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRow {
    pub participant: Participant,
    pub display_name: String,
    pub player_slot: u32,
    pub health: i32,
    pub final_place: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_persona_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_count: Option<u32>,
    /// One slot per round, index 0 = round 1.
    pub cells: Vec<Option<RoundCell>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Row {
    Participant(ParticipantRow),
    GroupSeparator,
}

/// Everything the renderer needs for one frame.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineFrame {
    pub current_round: u32,
    pub round_timer: RoundTimer,
    pub rows: Vec<Row>,
}

pub(crate) struct ComposeContext<'a> {
    pub players: &'a [PlayerSnapshot],
    pub current_round: CurrentRound,
    pub matchups: &'a [Matchup],
    pub table: &'a RoundTable,
    pub receipts: &'a ReceiptLedger,
    pub settings: &'a TimelineSettings,
    pub view: ViewOptions,
    pub now: DateTime<Utc>,
}

pub(crate) fn compose_rows(context: &ComposeContext<'_>) -> Vec<Row> {
    let directory = PlayerDirectory::from_players(context.players);
    let sort_mode = context.view.sort_mode;

    // Once every player holds a final place there is nothing left to fight;
    // the combat grouping gives way to the flat standings view.
    let match_complete = !context.players.is_empty()
        && context.players.iter().all(PlayerSnapshot::is_eliminated);
    let combat_view =
        context.current_round.round_phase == RoundPhase::Combat && !match_complete;

    let mut rows = Vec::new();

    if combat_view {
        let mut ordered: Vec<&Matchup> = context.matchups.iter().collect();
        ordered.sort_by_key(|matchup| matchup_sort_key(matchup, &directory, sort_mode));

        for (index, matchup) in ordered.iter().enumerate() {
            if index > 0 {
                rows.push(Row::GroupSeparator);
            }

            let mut members = matchup.participants;
            members
                .sort_by_key(|participant| participant_sort_key(participant, &directory, sort_mode));
            for participant in members {
                rows.push(Row::Participant(build_participant_row(
                    participant,
                    &directory,
                    context,
                )));
            }
        }
    } else {
        let mut participants: Vec<Participant> = directory
            .players()
            .map(|player| Participant::Player {
                account_id: player.account_id,
            })
            .collect();
        participants
            .sort_by_key(|participant| participant_sort_key(participant, &directory, sort_mode));

        for participant in participants {
            rows.push(Row::Participant(build_participant_row(
                participant,
                &directory,
                context,
            )));
        }
    }

    rows
}

/// Active entities first; eliminated ones trail in final-place order; the
/// operator's sort mode breaks ties among the active.
fn participant_sort_key(
    participant: &Participant,
    directory: &PlayerDirectory<'_>,
    sort_mode: SortMode,
) -> (bool, u32, i64) {
    let eliminated = participant.is_eliminated(directory);
    let final_place = if eliminated {
        participant.final_place(directory)
    } else {
        0
    };
    (eliminated, final_place, mode_key(participant, directory, sort_mode))
}

fn mode_key(
    participant: &Participant,
    directory: &PlayerDirectory<'_>,
    sort_mode: SortMode,
) -> i64 {
    match sort_mode {
        SortMode::PlayerSlot => i64::from(participant.player_slot(directory)),
        SortMode::Hp => -i64::from(participant.health(directory)),
    }
}

fn matchup_sort_key(
    matchup: &Matchup,
    directory: &PlayerDirectory<'_>,
    sort_mode: SortMode,
) -> (bool, u32, i64) {
    let eliminated = matchup
        .participants
        .iter()
        .any(|participant| participant.is_eliminated(directory));
    let best_final_place = if eliminated {
        matchup
            .participants
            .iter()
            .map(|participant| participant.final_place(directory))
            .filter(|place| *place > 0)
            .min()
            .unwrap_or(0)
    } else {
        0
    };
    let mode_key = match sort_mode {
        SortMode::PlayerSlot => i64::from(matchup.min_slot(directory)),
        SortMode::Hp => -matchup
            .participants
            .iter()
            .map(|participant| i64::from(participant.health(directory)))
            .max()
            .unwrap_or(0),
    };
    (eliminated, best_final_place, mode_key)
}

fn build_participant_row(
    participant: Participant,
    directory: &PlayerDirectory<'_>,
    context: &ComposeContext<'_>,
) -> ParticipantRow {
    let backing = directory.get(participant.stat_account_id());
    let display_name = participant.display_name(directory);

    let persona_name = match participant {
        Participant::Player { .. } => backing.and_then(|player| player.persona_name.clone()),
        // Synthetic bots present their derived name as the persona.
        Participant::Bot { .. } => Some(display_name.clone()),
    };

    let cells = (1..=MAX_ROUNDS)
        .map(|round_number| {
            context
                .table
                .entry(round_number, &participant)
                .map(|entry| build_round_cell(entry, context))
        })
        .collect();

    ParticipantRow {
        participant,
        display_name,
        player_slot: participant.player_slot(directory),
        health: participant.health(directory),
        final_place: participant.final_place(directory),
        persona_name,
        bot_persona_name: backing.and_then(|player| player.bot_persona_name.clone()),
        match_count: backing.and_then(|player| player.match_count),
        cells,
    }
}

fn build_round_cell(entry: &OutcomeEntry, context: &ComposeContext<'_>) -> RoundCell {
    RoundCell {
        result: entry.result,
        opponent_account_id: entry.opponent_account_id,
        opponent_name: entry.opponent_name.clone(),
        is_bot_fight: entry.is_bot_fight,
        reveal_remaining_seconds: reveal_remaining_seconds(entry, context),
    }
}

/// Seconds left before a current-round result may be shown, computed on
/// demand from the first-seen receipt time. Never applies to past rounds or
/// to the revealing display mode.
fn reveal_remaining_seconds(entry: &OutcomeEntry, context: &ComposeContext<'_>) -> Option<u32> {
    if context.view.display_mode == DisplayMode::Revealing {
        return None;
    }
    if entry.source.round_number != context.current_round.round_number {
        return None;
    }

    let received_at = context.receipts.receipt_time(&entry.source)?;
    let elapsed_seconds = (context.now - received_at).num_milliseconds() as f64 / 1000.0;
    let gated_duration =
        (entry.source.combat_duration - context.settings.reveal_lead_seconds).max(0.0);
    let remaining = gated_duration - elapsed_seconds;

    if remaining > 0.0 {
        Some(remaining.ceil() as u32)
    } else {
        None
    }
}
