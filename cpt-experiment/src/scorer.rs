use cpt_core::{Outcome, Polarity, ResponseRecord, Symbol};
use std::time::Duration;

/// Per-run scoring with round-indexed debounce markers.
///
/// Ticks and keypresses both land here for the same round; the markers,
/// not locks, keep each round scored at most once per source.
#[derive(Debug, Clone, Default)]
pub struct ResponseScorer {
    record: ResponseRecord,
    space_pressed_for_round: u32,
    omission_checked_for_round: u32,
}

impl ResponseScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scores a press during `round`. `reaction` is measured from the
    /// round's presentation.
    pub fn on_key_press(
        &mut self,
        round: u32,
        active: Option<&Symbol>,
        polarity: Polarity,
        target: &Symbol,
        reaction: Duration,
    ) -> Outcome {
        if round == 0 || self.space_pressed_for_round == round {
            return Outcome::Ignored;
        }
        let Some(active) = active else {
            return Outcome::Ignored;
        };
        self.space_pressed_for_round = round;

        if polarity.requires_press(active, target) {
            self.record.hits += 1;
            self.record
                .hit_reaction_times
                .insert(round, whole_millis(reaction));
            Outcome::Hit
        } else {
            self.record.commission_misses += 1;
            Outcome::CommissionMiss
        }
    }

    /// Retroactive omission check for a round that just ended. Returns
    /// `true` when an omission was counted. Each round is checked once.
    pub fn check_omission(
        &mut self,
        round: u32,
        shown: &Symbol,
        polarity: Polarity,
        target: &Symbol,
    ) -> bool {
        if !self.needs_omission_check(round) {
            return false;
        }
        self.omission_checked_for_round = round;
        if polarity.requires_press(shown, target) && self.space_pressed_for_round != round {
            self.record.omission_misses += 1;
            return true;
        }
        false
    }

    pub fn needs_omission_check(&self, round: u32) -> bool {
        round > self.omission_checked_for_round
    }

    pub fn record(&self) -> &ResponseRecord {
        &self.record
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn whole_millis(d: Duration) -> u64 {
    (d.as_nanos() as f64 / 1_000_000.0).round() as u64
}
