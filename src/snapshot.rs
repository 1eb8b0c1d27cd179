use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Rounds a match can run for; the outcome table always has this many slots.
pub const MAX_ROUNDS: u32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombatOutcome {
    Win,
    Loss,
    Draw,
}

impl CombatOutcome {
    pub fn invert(self) -> Self {
        match self {
            CombatOutcome::Win => CombatOutcome::Loss,
            CombatOutcome::Loss => CombatOutcome::Win,
            CombatOutcome::Draw => CombatOutcome::Draw,
        }
    }
}

/// Combat kinds as the feed encodes them: 1 = NPC fight, 2/3 = real pairings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CombatKind {
    BotFight,
    RealMatch2,
    RealMatch3,
}

impl CombatKind {
    pub fn is_real_match(self) -> bool {
        matches!(self, CombatKind::RealMatch2 | CombatKind::RealMatch3)
    }

    pub fn is_bot_fight(self) -> bool {
        matches!(self, CombatKind::BotFight)
    }
}

impl TryFrom<u8> for CombatKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(CombatKind::BotFight),
            2 => Ok(CombatKind::RealMatch2),
            3 => Ok(CombatKind::RealMatch3),
            other => Err(format!("Unknown combat type '{other}'")),
        }
    }
}

impl From<CombatKind> for u8 {
    fn from(kind: CombatKind) -> Self {
        match kind {
            CombatKind::BotFight => 1,
            CombatKind::RealMatch2 => 2,
            CombatKind::RealMatch3 => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatEvent {
    pub round_number: u32,
    pub player_account_id: u64,
    pub opponent_account_id: u64,
    pub combat_type: CombatKind,
    pub result: CombatOutcome,
    #[serde(default)]
    pub combat_duration: f64,
}

impl CombatEvent {
    pub fn round_in_range(&self) -> bool {
        (1..=MAX_ROUNDS).contains(&self.round_number)
    }
}

/// Full-replacement combat history: account id -> that account's events, as
/// delivered by the feed each update. Keyed with a BTreeMap so every
/// traversal is deterministic; grouping tie-breaks rely on input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CombatHistory(pub BTreeMap<u64, Vec<CombatEvent>>);

impl CombatHistory {
    pub fn events(&self) -> impl Iterator<Item = &CombatEvent> {
        self.0.values().flatten()
    }

    pub fn round_events(&self, round_number: u32) -> Vec<&CombatEvent> {
        self.events()
            .filter(|event| event.round_number == round_number)
            .collect()
    }

    /// Keeps only events involving the given account, on either side.
    pub fn filtered_for(&self, account_id: u64) -> CombatHistory {
        let mut filtered = BTreeMap::new();
        for (owner, events) in &self.0 {
            let relevant: Vec<CombatEvent> = events
                .iter()
                .filter(|event| {
                    event.player_account_id == account_id
                        || event.opponent_account_id == account_id
                })
                .cloned()
                .collect();
            if !relevant.is_empty() {
                filtered.insert(*owner, relevant);
            }
        }
        CombatHistory(filtered)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub account_id: u64,
    pub player_slot: u32,
    #[serde(default)]
    pub health: i32,
    #[serde(default)]
    pub final_place: u32,
    #[serde(default)]
    pub persona_name: Option<String>,
    #[serde(default)]
    pub bot_persona_name: Option<String>,
    #[serde(default)]
    pub match_count: Option<u32>,
}

impl PlayerSnapshot {
    pub fn display_name(&self) -> String {
        if let Some(name) = self.persona_name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        if let Some(name) = self.bot_persona_name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        format!("Player {}", self.player_slot)
    }

    pub fn is_eliminated(&self) -> bool {
        self.final_place > 0
    }
}

/// Account-keyed lookup over one snapshot's player list.
#[derive(Debug)]
pub struct PlayerDirectory<'a> {
    by_account: BTreeMap<u64, &'a PlayerSnapshot>,
}

impl<'a> PlayerDirectory<'a> {
    pub fn from_players(players: &'a [PlayerSnapshot]) -> Self {
        let mut by_account = BTreeMap::new();
        for player in players {
            by_account.insert(player.account_id, player);
        }
        Self { by_account }
    }

    pub fn get(&self, account_id: u64) -> Option<&'a PlayerSnapshot> {
        self.by_account.get(&account_id).copied()
    }

    pub fn contains(&self, account_id: u64) -> bool {
        self.by_account.contains_key(&account_id)
    }

    pub fn display_name(&self, account_id: u64) -> String {
        match self.get(account_id) {
            Some(player) => player.display_name(),
            None => format!("Player {account_id}"),
        }
    }

    pub fn players(&self) -> impl Iterator<Item = &'a PlayerSnapshot> + '_ {
        self.by_account.values().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundPhase {
    Prep,
    Combat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentRound {
    pub round_number: u32,
    pub round_phase: RoundPhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    Main,
    Revealing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    PlayerSlot,
    Hp,
}

/// One full feed update: replaces whatever was delivered before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub combat_history: CombatHistory,
    pub players: Vec<PlayerSnapshot>,
    pub current_round: CurrentRound,
}

impl MatchSnapshot {
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, String> {
        serde_json::from_slice(bytes)
            .map_err(|error| format!("Failed to parse match snapshot: {error}"))
    }
}
