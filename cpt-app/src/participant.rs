use cpt_core::{Polarity, Symbol};
use cpt_experiment::{Participant, TestSpec};
use rand::Rng;
use std::time::Duration;

/// Responder with a fixed accuracy and a uniformly jittered reaction time.
pub struct SimulatedParticipant<R: Rng> {
    target: Symbol,
    polarity: Polarity,
    accuracy: f64,
    mean_rt_ms: u64,
    jitter_ms: u64,
    /// Presses never land after the next round starts.
    latest_ms: u64,
    rng: R,
}

impl<R: Rng> SimulatedParticipant<R> {
    pub fn new(spec: &TestSpec, accuracy: f64, mean_rt_ms: u64, interval: Duration, rng: R) -> Self {
        let latest_ms = (interval.as_millis() as u64).saturating_sub(1).max(1);
        Self {
            target: spec.target.clone(),
            polarity: spec.polarity,
            accuracy,
            mean_rt_ms: mean_rt_ms.clamp(1, latest_ms),
            jitter_ms: mean_rt_ms / 4,
            latest_ms,
            rng,
        }
    }

    fn reaction_time(&mut self) -> Duration {
        let low = self.mean_rt_ms.saturating_sub(self.jitter_ms).max(1);
        let high = (self.mean_rt_ms + self.jitter_ms).min(self.latest_ms).max(low);
        Duration::from_millis(self.rng.random_range(low..=high))
    }
}

impl<R: Rng> Participant for SimulatedParticipant<R> {
    fn on_stimulus(&mut self, _round: u32, symbol: &Symbol) -> Option<Duration> {
        let required = self.polarity.requires_press(symbol, &self.target);
        let correct = self.rng.random_bool(self.accuracy);
        (required == correct).then(|| self.reaction_time())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpt_experiment::Battery;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn participant(id: &str, accuracy: f64) -> SimulatedParticipant<StdRng> {
        let battery = Battery::standard();
        SimulatedParticipant::new(
            battery.get(id).unwrap(),
            accuracy,
            450,
            Duration::from_millis(1500),
            StdRng::seed_from_u64(1),
        )
    }

    #[test]
    fn perfect_go_participant_presses_only_on_target() {
        let mut p = participant("test1", 1.0);
        assert!(p.on_stimulus(1, &Symbol::new("triangle")).is_some());
        assert!(p.on_stimulus(2, &Symbol::new("star")).is_none());
    }

    #[test]
    fn perfect_no_go_participant_withholds_on_target() {
        let mut p = participant("test6", 1.0);
        assert!(p.on_stimulus(1, &Symbol::new("circle")).is_none());
        let rt = p.on_stimulus(2, &Symbol::new("square")).unwrap();
        assert!(rt >= Duration::from_millis(338) && rt <= Duration::from_millis(562));
    }

    #[test]
    fn zero_accuracy_inverts_every_response() {
        let mut p = participant("test1", 0.0);
        assert!(p.on_stimulus(1, &Symbol::new("triangle")).is_none());
        assert!(p.on_stimulus(2, &Symbol::new("circle")).is_some());
    }
}
