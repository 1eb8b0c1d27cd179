pub mod settings;
pub mod snapshot;
pub mod timeline;

pub use settings::TimelineSettings;
pub use snapshot::{
    CombatEvent, CombatHistory, CombatKind, CombatOutcome, CurrentRound, DisplayMode,
    MatchSnapshot, PlayerSnapshot, RoundPhase, SortMode, MAX_ROUNDS,
};
pub use timeline::{
    Matchup, OutcomeEntry, Participant, ParticipantRow, RevealPhase, Row, RoundCell, RoundTimer,
    Synchronizer, TimelineFrame, ViewOptions,
};
