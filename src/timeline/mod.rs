mod grouper;
mod ledger;
mod round_table;
mod timer;
mod view;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::settings::TimelineSettings;
use crate::snapshot::{MatchSnapshot, PlayerDirectory};

pub use grouper::{Matchup, Participant};
pub use ledger::ReceiptLedger;
pub use round_table::{OutcomeEntry, RoundTable};
pub use timer::{RevealPhase, RoundTimer, TimerLedger};
pub use view::{ParticipantRow, Row, RoundCell, TimelineFrame, ViewOptions};

use grouper::group_round_matchups;
use view::{compose_rows, ComposeContext};

struct CountdownHandle {
    round_number: u32,
    handle: JoinHandle<()>,
}

/// Rebuilds a coherent, time-ordered view of pairwise combat outcomes from
/// the replace-on-every-tick feed. One instance serves one match: it owns the
/// receipt ledger, the reveal timers and the cached snapshot state, and must
/// be `reset` (or dropped) when the match changes.
pub struct Synchronizer {
    settings: TimelineSettings,
    receipts: ReceiptLedger,
    timers: Arc<Mutex<TimerLedger>>,
    countdown: Option<CountdownHandle>,
    snapshot: Option<MatchSnapshot>,
    round_table: RoundTable,
    matchups: Vec<Matchup>,
}

impl Synchronizer {
    pub fn new(settings: TimelineSettings) -> Self {
        Self {
            settings,
            receipts: ReceiptLedger::default(),
            timers: Arc::new(Mutex::new(TimerLedger::default())),
            countdown: None,
            snapshot: None,
            round_table: RoundTable::default(),
            matchups: Vec::new(),
        }
    }

    /// Processes one full-replacement snapshot: stamps receipt times, rebuilds
    /// the outcome table and matchups, and arms the current round's reveal
    /// countdown when unseen events arrived. Snapshots must be processed one
    /// at a time; call this from within a tokio runtime, which drives the
    /// countdown task.
    pub fn process_snapshot(&mut self, snapshot: MatchSnapshot) -> Result<(), String> {
        self.process_snapshot_at(snapshot, Utc::now())
    }

    pub(crate) fn process_snapshot_at(
        &mut self,
        snapshot: MatchSnapshot,
        now: DateTime<Utc>,
    ) -> Result<(), String> {
        let current_round = snapshot.current_round.round_number;

        let newly_recorded = self
            .receipts
            .ingest(&snapshot.combat_history, current_round, now);

        {
            let directory = PlayerDirectory::from_players(&snapshot.players);
            self.round_table = RoundTable::build(&snapshot.combat_history, &directory);
            let round_events = snapshot.combat_history.round_events(current_round);
            self.matchups = group_round_matchups(&round_events, &directory);
        }

        let longest_duration = snapshot
            .combat_history
            .round_events(current_round)
            .iter()
            .map(|event| event.combat_duration)
            .fold(0.0, f64::max);

        let armed = {
            let mut timers = self
                .timers
                .lock()
                .map_err(|error| error.to_string())?;
            timers.retain_window(current_round);

            let armed = newly_recorded > 0 && timers.arm(current_round, longest_duration);
            if armed {
                timers.start(current_round);
            }
            armed
        };

        if armed {
            self.replace_countdown(current_round);
            tracing::info!(
                round = current_round,
                seconds = longest_duration.ceil() as u32,
                "Reveal countdown armed"
            );
        }

        tracing::debug!(
            round = current_round,
            new_events = newly_recorded,
            matchups = self.matchups.len(),
            "Processed combat snapshot"
        );

        self.snapshot = Some(snapshot);
        Ok(())
    }

    /// Produces the renderer's frame for the latest snapshot: ordered rows,
    /// per-cell outcomes with reveal gating, and the round countdown badge.
    pub fn compose(&self, view: ViewOptions) -> Result<TimelineFrame, String> {
        self.compose_at(view, Utc::now())
    }

    pub(crate) fn compose_at(
        &self,
        view: ViewOptions,
        now: DateTime<Utc>,
    ) -> Result<TimelineFrame, String> {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return Ok(TimelineFrame {
                current_round: 0,
                round_timer: RoundTimer::default(),
                rows: Vec::new(),
            });
        };

        let current_round = snapshot.current_round.round_number;
        let round_timer = self.round_timer()?;

        // An operator focus narrows the table to one account's combats;
        // matchups always come from the complete history so groups stay
        // intact.
        let filtered_table;
        let table = match view.focused_account {
            Some(account_id) => {
                let directory = PlayerDirectory::from_players(&snapshot.players);
                filtered_table = RoundTable::build(
                    &snapshot.combat_history.filtered_for(account_id),
                    &directory,
                );
                &filtered_table
            }
            None => &self.round_table,
        };

        let context = ComposeContext {
            players: &snapshot.players,
            current_round: snapshot.current_round,
            matchups: &self.matchups,
            table,
            receipts: &self.receipts,
            settings: &self.settings,
            view,
            now,
        };

        Ok(TimelineFrame {
            current_round,
            round_timer,
            rows: compose_rows(&context),
        })
    }

    /// Countdown badge state for the current round.
    pub fn round_timer(&self) -> Result<RoundTimer, String> {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return Ok(RoundTimer::default());
        };
        let timers = self
            .timers
            .lock()
            .map_err(|error| error.to_string())?;
        Ok(timers.state(snapshot.current_round.round_number))
    }

    /// Match-change signal: drops every piece of per-match state and cancels
    /// any live countdown before the next match's first snapshot.
    pub fn reset(&mut self) {
        self.abort_countdown();
        self.receipts.clear();
        self.timers = Arc::new(Mutex::new(TimerLedger::default()));
        self.snapshot = None;
        self.round_table = RoundTable::default();
        self.matchups.clear();
        tracing::info!("Combat timeline reset for a new match");
    }

    fn replace_countdown(&mut self, round_number: u32) {
        self.abort_countdown();

        let timers = Arc::clone(&self.timers);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            // The first tick resolves immediately; consume it so decrements
            // run at 1 Hz from now on.
            interval.tick().await;

            loop {
                interval.tick().await;
                let finished = match timers.lock() {
                    Ok(mut timers) => timers.tick(round_number),
                    Err(error) => {
                        tracing::error!(tick_error = %error, "Reveal countdown state lock poisoned");
                        true
                    }
                };
                if finished {
                    break;
                }
            }

            tracing::debug!(round = round_number, "Reveal countdown finished");
        });

        self.countdown = Some(CountdownHandle {
            round_number,
            handle,
        });
    }

    fn abort_countdown(&mut self) {
        if let Some(countdown) = self.countdown.take() {
            countdown.handle.abort();
            tracing::debug!(
                round = countdown.round_number,
                "Cancelled reveal countdown"
            );
        }
    }
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new(TimelineSettings::default())
    }
}

impl Drop for Synchronizer {
    fn drop(&mut self) {
        self.abort_countdown();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::{RevealPhase, Synchronizer, ViewOptions};
    use crate::snapshot::{
        CombatEvent, CombatHistory, CombatKind, CombatOutcome, CurrentRound, MatchSnapshot,
        PlayerSnapshot, RoundPhase,
    };

    fn build_player(account_id: u64, player_slot: u32) -> PlayerSnapshot {
        PlayerSnapshot {
            account_id,
            player_slot,
            health: 100,
            final_place: 0,
            persona_name: Some(format!("player_{account_id}")),
            bot_persona_name: None,
            match_count: None,
        }
    }

    fn build_event(
        round_number: u32,
        player: u64,
        opponent: u64,
        duration: f64,
    ) -> CombatEvent {
        CombatEvent {
            round_number,
            player_account_id: player,
            opponent_account_id: opponent,
            combat_type: CombatKind::RealMatch2,
            result: CombatOutcome::Win,
            combat_duration: duration,
        }
    }

    fn build_snapshot(
        events: Vec<CombatEvent>,
        players: Vec<PlayerSnapshot>,
        round_number: u32,
        round_phase: RoundPhase,
    ) -> MatchSnapshot {
        let mut by_account: BTreeMap<u64, Vec<CombatEvent>> = BTreeMap::new();
        for event in events {
            by_account
                .entry(event.player_account_id)
                .or_default()
                .push(event);
        }
        MatchSnapshot {
            combat_history: CombatHistory(by_account),
            players,
            current_round: CurrentRound {
                round_number,
                round_phase,
            },
        }
    }

    fn base_time() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 22, 20, 15, 0).unwrap()
    }

    fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[tokio::test(start_paused = true)]
    async fn processing_a_snapshot_arms_and_starts_the_reveal_countdown() {
        init_test_tracing();
        let mut synchronizer = Synchronizer::default();
        let snapshot = build_snapshot(
            vec![
                build_event(5, 1, 2, 8.2),
                build_event(5, 3, 4, 6.0),
            ],
            vec![
                build_player(1, 1),
                build_player(2, 2),
                build_player(3, 3),
                build_player(4, 4),
            ],
            5,
            RoundPhase::Combat,
        );

        synchronizer
            .process_snapshot_at(snapshot, base_time())
            .expect("Expected snapshot processing to succeed");

        let badge = synchronizer.round_timer().expect("Expected badge state");
        assert_eq!(badge.phase, RevealPhase::Counting);
        assert_eq!(
            badge.remaining,
            Some(9),
            "Countdown arms at the ceiling of the longest duration"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_ticks_once_per_second() {
        init_test_tracing();
        let mut synchronizer = Synchronizer::default();
        let snapshot = build_snapshot(
            vec![build_event(5, 1, 2, 8.0)],
            vec![build_player(1, 1), build_player(2, 2)],
            5,
            RoundPhase::Combat,
        );
        synchronizer
            .process_snapshot_at(snapshot, base_time())
            .expect("Expected snapshot processing to succeed");

        // Paused clock: sleeping lets the 1 Hz countdown fire exactly three
        // times before the half-second mark.
        tokio::time::sleep(Duration::from_millis(3_500)).await;

        let badge = synchronizer.round_timer().expect("Expected badge state");
        assert_eq!(badge.phase, RevealPhase::Counting);
        assert_eq!(badge.remaining, Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn reprocessing_an_identical_snapshot_does_not_rearm() {
        let mut synchronizer = Synchronizer::default();
        let snapshot = build_snapshot(
            vec![build_event(5, 1, 2, 4.0)],
            vec![build_player(1, 1), build_player(2, 2)],
            5,
            RoundPhase::Combat,
        );

        synchronizer
            .process_snapshot_at(snapshot.clone(), base_time())
            .expect("Expected snapshot processing to succeed");
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        synchronizer
            .process_snapshot_at(snapshot, base_time() + chrono::Duration::seconds(2))
            .expect("Expected snapshot processing to succeed");

        let badge = synchronizer.round_timer().expect("Expected badge state");
        assert_eq!(
            badge.remaining,
            Some(3),
            "A re-sent snapshot must not restart the countdown"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn completed_round_stays_completed_through_late_events() {
        let mut synchronizer = Synchronizer::default();
        synchronizer
            .process_snapshot_at(
                build_snapshot(
                    vec![build_event(5, 1, 2, 1.0)],
                    vec![build_player(1, 1), build_player(2, 2)],
                    5,
                    RoundPhase::Combat,
                ),
                base_time(),
            )
            .expect("Expected snapshot processing to succeed");

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(
            synchronizer.round_timer().unwrap().phase,
            RevealPhase::Completed
        );

        // A late event for the same round carries a fresh key, but the
        // completed round must not re-arm.
        synchronizer
            .process_snapshot_at(
                build_snapshot(
                    vec![
                        build_event(5, 1, 2, 1.0),
                        build_event(5, 3, 4, 20.0),
                    ],
                    vec![
                        build_player(1, 1),
                        build_player(2, 2),
                        build_player(3, 3),
                        build_player(4, 4),
                    ],
                    5,
                    RoundPhase::Combat,
                ),
                base_time() + chrono::Duration::seconds(2),
            )
            .expect("Expected snapshot processing to succeed");

        let badge = synchronizer.round_timer().expect("Expected badge state");
        assert_eq!(badge.phase, RevealPhase::Completed);
        assert_eq!(badge.remaining, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn advancing_the_round_keeps_the_completed_flag_within_the_window() {
        let mut synchronizer = Synchronizer::default();
        synchronizer
            .process_snapshot_at(
                build_snapshot(
                    vec![build_event(3, 1, 2, 1.0)],
                    vec![build_player(1, 1), build_player(2, 2)],
                    3,
                    RoundPhase::Combat,
                ),
                base_time(),
            )
            .expect("Expected snapshot processing to succeed");
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        synchronizer
            .process_snapshot_at(
                build_snapshot(
                    vec![build_event(3, 1, 2, 1.0)],
                    vec![build_player(1, 1), build_player(2, 2)],
                    4,
                    RoundPhase::Prep,
                ),
                base_time() + chrono::Duration::seconds(30),
            )
            .expect("Expected snapshot processing to succeed");

        let timers = synchronizer.timers.lock().unwrap();
        assert_eq!(
            timers.state(3).phase,
            RevealPhase::Completed,
            "The previous round's completed flag survives one round"
        );
        assert_eq!(timers.state(4).phase, RevealPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_the_live_countdown() {
        let mut synchronizer = Synchronizer::default();
        synchronizer
            .process_snapshot_at(
                build_snapshot(
                    vec![build_event(5, 1, 2, 30.0)],
                    vec![build_player(1, 1), build_player(2, 2)],
                    5,
                    RoundPhase::Combat,
                ),
                base_time(),
            )
            .expect("Expected snapshot processing to succeed");
        assert_eq!(
            synchronizer.countdown.as_ref().map(|c| c.round_number),
            Some(5)
        );

        synchronizer
            .process_snapshot_at(
                build_snapshot(
                    vec![
                        build_event(5, 1, 2, 30.0),
                        build_event(6, 1, 2, 12.0),
                    ],
                    vec![build_player(1, 1), build_player(2, 2)],
                    6,
                    RoundPhase::Combat,
                ),
                base_time() + chrono::Duration::seconds(40),
            )
            .expect("Expected snapshot processing to succeed");

        assert_eq!(
            synchronizer.countdown.as_ref().map(|c| c.round_number),
            Some(6),
            "The previous countdown is replaced, never stacked"
        );

        let badge = synchronizer.round_timer().expect("Expected badge state");
        assert_eq!(badge.phase, RevealPhase::Counting);
        assert_eq!(badge.remaining, Some(12));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_all_per_match_state() {
        let mut synchronizer = Synchronizer::default();
        synchronizer
            .process_snapshot_at(
                build_snapshot(
                    vec![build_event(5, 1, 2, 8.0)],
                    vec![build_player(1, 1), build_player(2, 2)],
                    5,
                    RoundPhase::Combat,
                ),
                base_time(),
            )
            .expect("Expected snapshot processing to succeed");

        synchronizer.reset();

        assert!(synchronizer.receipts.is_empty());
        assert!(synchronizer.countdown.is_none());
        let frame = synchronizer
            .compose_at(ViewOptions::default(), base_time())
            .expect("Expected an empty frame");
        assert_eq!(frame.current_round, 0);
        assert!(frame.rows.is_empty());
        assert_eq!(frame.round_timer.phase, RevealPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn composed_frame_carries_rows_and_the_badge() {
        let mut synchronizer = Synchronizer::default();
        synchronizer
            .process_snapshot_at(
                build_snapshot(
                    vec![build_event(5, 1, 2, 8.0)],
                    vec![build_player(1, 1), build_player(2, 2)],
                    5,
                    RoundPhase::Combat,
                ),
                base_time(),
            )
            .expect("Expected snapshot processing to succeed");

        let frame = synchronizer
            .compose_at(ViewOptions::default(), base_time() + chrono::Duration::seconds(1))
            .expect("Expected a frame");

        assert_eq!(frame.current_round, 5);
        assert_eq!(frame.round_timer.phase, RevealPhase::Counting);
        assert_eq!(frame.rows.len(), 2, "One matchup composes two rows");
    }

    #[tokio::test(start_paused = true)]
    async fn focused_account_narrows_cells_but_not_groups() {
        let mut synchronizer = Synchronizer::default();
        synchronizer
            .process_snapshot_at(
                build_snapshot(
                    vec![
                        build_event(5, 1, 2, 8.0),
                        build_event(5, 3, 4, 8.0),
                    ],
                    vec![
                        build_player(1, 1),
                        build_player(2, 2),
                        build_player(3, 3),
                        build_player(4, 4),
                    ],
                    5,
                    RoundPhase::Combat,
                ),
                base_time(),
            )
            .expect("Expected snapshot processing to succeed");

        let view = ViewOptions {
            focused_account: Some(3),
            ..ViewOptions::default()
        };
        let frame = synchronizer
            .compose_at(view, base_time())
            .expect("Expected a frame");

        let participant_rows: Vec<_> = frame
            .rows
            .iter()
            .filter_map(|row| match row {
                super::Row::Participant(row) => Some(row),
                super::Row::GroupSeparator => None,
            })
            .collect();

        assert_eq!(
            participant_rows.len(),
            4,
            "Groups stay complete under a focus filter"
        );

        let slot_one_row = participant_rows
            .iter()
            .find(|row| row.player_slot == 1)
            .expect("Expected player 1's row");
        assert!(
            slot_one_row.cells.iter().all(Option::is_none),
            "Cells narrow to combats involving the focused account"
        );

        let slot_three_row = participant_rows
            .iter()
            .find(|row| row.player_slot == 3)
            .expect("Expected player 3's row");
        assert!(slot_three_row.cells[4].is_some());
    }
}
