use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::snapshot::{CombatEvent, CombatHistory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ReceiptKey {
    player_account_id: u64,
    opponent_account_id: u64,
    round_number: u32,
}

impl ReceiptKey {
    pub(crate) fn for_event(event: &CombatEvent) -> Self {
        Self {
            player_account_id: event.player_account_id,
            opponent_account_id: event.opponent_account_id,
            round_number: event.round_number,
        }
    }
}

/// First-seen receipt times for combat events, keyed by
/// (player, opponent, round). A timestamp is never overwritten once set, so
/// re-sent events cannot restart their reveal countdown. Only the current and
/// previous round are retained.
#[derive(Debug, Default)]
pub struct ReceiptLedger {
    receipts: HashMap<ReceiptKey, DateTime<Utc>>,
}

impl ReceiptLedger {
    /// Stamps every unseen in-window event with `now` and drops entries that
    /// fell out of the retention window. Returns how many events were newly
    /// recorded; a zero return means the snapshot carried nothing unseen.
    pub fn ingest(
        &mut self,
        history: &CombatHistory,
        current_round: u32,
        now: DateTime<Utc>,
    ) -> usize {
        self.receipts
            .retain(|key, _| in_retention_window(key.round_number, current_round));

        let mut newly_recorded = 0;
        for event in history.events() {
            if !in_retention_window(event.round_number, current_round) {
                continue;
            }

            self.receipts
                .entry(ReceiptKey::for_event(event))
                .or_insert_with(|| {
                    newly_recorded += 1;
                    now
                });
        }

        newly_recorded
    }

    pub fn receipt_time(&self, event: &CombatEvent) -> Option<DateTime<Utc>> {
        self.receipts.get(&ReceiptKey::for_event(event)).copied()
    }

    pub fn clear(&mut self) {
        self.receipts.clear();
    }

    pub fn len(&self) -> usize {
        self.receipts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }
}

fn in_retention_window(round_number: u32, current_round: u32) -> bool {
    round_number == current_round || round_number + 1 == current_round
}
