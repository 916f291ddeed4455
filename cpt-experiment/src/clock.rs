use cpt_core::{RoundState, Symbol};
use std::time::Duration;

/// Fixed-cadence round counter.
///
/// The clock does not own a timer task; drivers deliver ticks and the
/// controller calls [`advance`](Self::advance). It only tracks which round
/// is on screen and when it got there.
#[derive(Debug, Clone)]
pub struct PresentationClock<Ts> {
    interval: Duration,
    running: bool,
    round: u32,
    current: Option<RoundState<Ts>>,
}

impl<Ts: Copy> PresentationClock<Ts> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            running: false,
            round: 1,
            current: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Puts round 1 on the clock.
    pub fn start(&mut self, now: Ts, symbol: Option<Symbol>) {
        self.running = true;
        self.round = 1;
        self.current = Some(RoundState::new(1, symbol, now));
    }

    /// Returns whether the clock was running.
    pub fn stop(&mut self) -> bool {
        std::mem::replace(&mut self.running, false)
    }

    /// Moves to the next round and returns its number.
    pub fn advance(&mut self, now: Ts, symbol: Option<Symbol>) -> u32 {
        self.round += 1;
        self.current = Some(RoundState::new(self.round, symbol, now));
        self.round
    }

    /// Records the paint time of `round`. Returns the advance time so the
    /// caller can measure presentation latency, or `None` when the ack is
    /// for another round or arrives twice.
    pub fn mark_presented(&mut self, round: u32, now: Ts) -> Option<Ts> {
        let current = self.current.as_mut()?;
        if current.number != round || current.presented_at.is_some() {
            return None;
        }
        current.presented_at = Some(now);
        Some(current.advanced_at)
    }

    pub fn reset(&mut self) {
        self.running = false;
        self.round = 1;
        self.current = None;
    }

    pub fn round_number(&self) -> u32 {
        self.round
    }

    pub fn current(&self) -> Option<&RoundState<Ts>> {
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_advance_from_one() {
        let mut c = PresentationClock::new(Duration::from_millis(1500));
        assert_eq!(c.round_number(), 1);
        assert!(c.current().is_none());
        c.start(0u64, Some(Symbol::new("star")));
        assert_eq!(c.advance(1500, Some(Symbol::new("circle"))), 2);
        let cur = c.current().unwrap();
        assert_eq!(cur.number, 2);
        assert_eq!(cur.advanced_at, 1500);
    }

    #[test]
    fn paint_ack_is_accepted_once_for_the_current_round() {
        let mut c = PresentationClock::new(Duration::from_millis(1500));
        c.start(100u64, Some(Symbol::new("1")));
        assert_eq!(c.mark_presented(2, 110), None);
        assert_eq!(c.mark_presented(1, 116), Some(100));
        assert_eq!(c.mark_presented(1, 130), None);
        assert_eq!(c.current().unwrap().origin(), 116);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut c = PresentationClock::new(Duration::from_millis(10));
        c.start(0u64, None);
        assert!(c.stop());
        assert!(!c.stop());
        c.reset();
        assert_eq!(c.round_number(), 1);
    }
}
