use crate::stimulus::Symbol;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Run lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Countdown(CountdownStep),
    Running,
    Completed,
    /// Transient: always followed by `Countdown`.
    Restarting,
    /// Torn down by the host; nothing fires afterwards.
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStep {
    LeadIn,
    Count(u8),
    Start,
}

/// Classification of a single keypress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Hit,
    CommissionMiss,
    Ignored,
}

/// The round currently on screen.
#[derive(Debug, Clone)]
pub struct RoundState<T> {
    pub number: u32,
    pub symbol: Option<Symbol>,
    /// When the round counter moved to `number`.
    pub advanced_at: T,
    /// When the host confirmed the stimulus was painted.
    pub presented_at: Option<T>,
}

impl<T: Copy> RoundState<T> {
    pub fn new(number: u32, symbol: Option<Symbol>, advanced_at: T) -> Self {
        Self {
            number,
            symbol,
            advanced_at,
            presented_at: None,
        }
    }

    /// Reaction-time origin: paint time when known, else the advance time.
    pub fn origin(&self) -> T {
        self.presented_at.unwrap_or(self.advanced_at)
    }
}

/// Cumulative scoring for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRecord {
    pub hits: u32,
    pub commission_misses: u32,
    pub omission_misses: u32,
    /// Round number -> whole milliseconds from presentation to press.
    pub hit_reaction_times: BTreeMap<u32, u64>,
}

/// What a finished real run reports to the metrics sink.
pub type RunResult = ResponseRecord;

impl ResponseRecord {
    pub fn mistakes(&self) -> u32 {
        self.commission_misses + self.omission_misses
    }

    pub fn mean_reaction_time_ms(&self) -> Option<u64> {
        if self.hit_reaction_times.is_empty() {
            return None;
        }
        let sum: u64 = self.hit_reaction_times.values().sum();
        let n = self.hit_reaction_times.len() as f64;
        Some((sum as f64 / n).round() as u64)
    }
}
