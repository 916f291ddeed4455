use crate::battery::TestSpec;
use crate::clock::PresentationClock;
use crate::collaborators::{Collaborators, Cue};
use crate::config::RunConfig;
use crate::error::{RunError, SequenceError};
use crate::scorer::ResponseScorer;
use crate::sequence::{Sequence, SequenceGenerator};
use cpt_core::{CountdownStep, Outcome, Phase, ResponseRecord, RunMode, RunState, Symbol};
use cpt_timing::Timer;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

pub const RESTART_MESSAGE: &str = "Too many mistakes, restarting the trial";

/// Inputs to the controller. Drivers serialize every source onto one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEvent {
    Mount,
    Tick { epoch: u64 },
    /// The host committed the stimulus of `round` to the display.
    Presented { round: u32, epoch: u64 },
    KeyPress,
    Wake { wake: Wake, epoch: u64 },
    Abort,
}

/// Which delayed transition a wake belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Countdown,
    Restart,
    Advance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    Message(String),
    Countdown(CountdownStep),
    Stimulus { round: u32, symbol: Symbol },
    Blank,
}

/// Side effects requested from the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Show(Screen),
    /// Deliver `Tick { epoch }` every `interval` until `StopClock`.
    StartClock { interval: Duration, epoch: u64 },
    StopClock,
    WakeAfter {
        delay: Duration,
        wake: Wake,
        epoch: u64,
    },
    /// Nothing further will happen in this run.
    Finished,
}

/// One trial or real run of a single test.
///
/// Sans-IO: every input arrives through [`handle_event`](Self::handle_event)
/// and every effect leaves as a [`Directive`]. Delayed work carries the
/// epoch it was scheduled in; bumping the epoch cancels all of it.
pub struct RunController<T, R>
where
    T: Timer<Timestamp = u64>,
    R: Rng,
{
    spec: TestSpec,
    mode: RunMode,
    config: RunConfig,
    timer: T,
    generator: SequenceGenerator<R>,
    sequence: Sequence,
    clock: PresentationClock<u64>,
    scorer: ResponseScorer,
    collaborators: Collaborators,
    state: RunState,
    epoch: u64,
    restarts: u32,
    advanced: bool,
    last_outcome: Option<Outcome>,
}

impl<T, R> RunController<T, R>
where
    T: Timer<Timestamp = u64>,
    R: Rng,
{
    /// Builds the run and its sequence. Fails before anything is shown
    /// when the config is unusable or the real-mode plan cannot be
    /// satisfied.
    pub fn new(
        spec: TestSpec,
        phase: Phase,
        config: RunConfig,
        timer: T,
        rng: R,
        collaborators: Collaborators,
    ) -> Result<Self, RunError> {
        config.validate()?;
        let mut generator = SequenceGenerator::new(spec.alphabet.clone(), rng)
            .with_sampling_attempts(config.sampling_attempts)
            .with_best_effort(config.allow_best_effort);
        let sequence = match phase {
            Phase::Trial => generator.trial(config.trial_initial_length),
            Phase::Real => {
                let plan = spec.plan(config.real_round_count as usize)?;
                generator.real(&plan)?
            }
        };
        info!(
            test = %spec.id,
            %phase,
            polarity = %spec.polarity,
            strategy = ?sequence.strategy(),
            "run constructed"
        );

        Ok(Self {
            mode: spec.mode(phase),
            clock: PresentationClock::new(config.round_interval()),
            spec,
            config,
            timer,
            generator,
            sequence,
            scorer: ResponseScorer::new(),
            collaborators,
            state: RunState::Idle,
            epoch: 0,
            restarts: 0,
            advanced: false,
            last_outcome: None,
        })
    }

    /// Replaces the generated sequence. A real sequence must satisfy the
    /// plan exactly unless best effort is allowed. A trial restart always
    /// draws a fresh sequence.
    pub fn with_sequence(mut self, sequence: Sequence) -> Result<Self, SequenceError> {
        if let Some(s) = sequence
            .symbols()
            .iter()
            .find(|s| !self.spec.alphabet.contains(s))
        {
            return Err(SequenceError::RejectedSequence(format!(
                "'{s}' is not in the alphabet"
            )));
        }
        let needed = match self.mode.phase {
            Phase::Trial => 1,
            Phase::Real => self.config.real_round_count as usize,
        };
        if sequence.len() < needed {
            return Err(SequenceError::RejectedSequence(format!(
                "{} rounds given, {needed} needed",
                sequence.len()
            )));
        }
        if self.mode.phase.is_real() {
            let plan = self.spec.plan(needed)?;
            let violations = plan.violations(&sequence.symbols()[..needed]);
            if !violations.is_empty() {
                if !self.config.allow_best_effort {
                    return Err(SequenceError::RejectedSequence(violations.join("; ")));
                }
                warn!(test = %self.spec.id, ?violations, "provided sequence breaks the plan");
            }
        }
        self.sequence = sequence;
        Ok(self)
    }

    pub fn handle_event(&mut self, event: RunEvent) -> Vec<Directive> {
        let mut out = Vec::new();
        self.last_outcome = None;

        match (self.state, event) {
            (RunState::Aborted, _) => trace!(?event, "run aborted, event dropped"),

            (_, RunEvent::Abort) => self.abort(&mut out),

            (RunState::Idle, RunEvent::Mount) => self.begin_countdown(&mut out),

            (_, RunEvent::Tick { epoch })
            | (_, RunEvent::Presented { epoch, .. })
            | (_, RunEvent::Wake { epoch, .. })
                if epoch != self.epoch =>
            {
                trace!(?event, current = self.epoch, "stale event dropped");
            }

            (RunState::Countdown(step), RunEvent::Wake { wake: Wake::Countdown, .. }) => {
                self.step_countdown(step, &mut out)
            }

            (RunState::Running, RunEvent::Tick { .. }) => self.on_tick(&mut out),

            (_, RunEvent::Presented { round, .. }) => self.on_presented(round),

            (RunState::Running, RunEvent::KeyPress) => {
                self.last_outcome = Some(self.on_key_press(&mut out))
            }

            (RunState::Restarting, RunEvent::Wake { wake: Wake::Restart, .. }) => {
                self.begin_countdown(&mut out)
            }

            (RunState::Completed, RunEvent::Wake { wake: Wake::Advance, .. }) => {
                if !self.advanced {
                    self.advanced = true;
                    info!(test = %self.spec.id, phase = %self.mode.phase, "advancing to next");
                    self.collaborators.navigator.advance_to_next();
                }
                out.push(Directive::Finished);
            }

            (state, event) => trace!(?state, ?event, "event not handled"),
        }

        out
    }

    fn begin_countdown(&mut self, out: &mut Vec<Directive>) {
        self.state = RunState::Countdown(CountdownStep::LeadIn);
        info!(test = %self.spec.id, phase = %self.mode.phase, restarts = self.restarts, "countdown");
        out.push(Directive::Show(Screen::Message(
            self.mode.phase.lead_in_message().to_string(),
        )));
        self.wake_after(self.config.lead_in(), Wake::Countdown, out);
    }

    fn step_countdown(&mut self, step: CountdownStep, out: &mut Vec<Directive>) {
        let next = match step {
            CountdownStep::LeadIn if self.config.countdown_from > 0 => {
                CountdownStep::Count(self.config.countdown_from)
            }
            CountdownStep::Count(n) if n > 1 => CountdownStep::Count(n - 1),
            CountdownStep::LeadIn | CountdownStep::Count(_) => CountdownStep::Start,
            CountdownStep::Start => return self.start_running(out),
        };

        self.state = RunState::Countdown(next);
        out.push(Directive::Show(Screen::Countdown(next)));
        match next {
            CountdownStep::Start => {
                self.cue(Cue::Start);
                self.wake_after(self.config.start_hold(), Wake::Countdown, out);
            }
            _ => {
                self.cue(Cue::CountdownTick);
                self.wake_after(self.config.countdown_step(), Wake::Countdown, out);
            }
        }
    }

    fn start_running(&mut self, out: &mut Vec<Directive>) {
        self.state = RunState::Running;
        let symbol = self.symbol_for(1);
        self.clock.start(self.timer.now(), symbol.clone());
        info!(test = %self.spec.id, phase = %self.mode.phase, "running");
        out.push(Directive::StartClock {
            interval: self.clock.interval(),
            epoch: self.epoch,
        });
        self.show_round(1, symbol, out);
    }

    fn on_tick(&mut self, out: &mut Vec<Directive>) {
        let round = self.clock.round_number();
        if let Some(shown) = self.clock.current().and_then(|c| c.symbol.clone()) {
            if self
                .scorer
                .check_omission(round, &shown, self.mode.polarity, &self.spec.target)
            {
                debug!(round, symbol = %shown, "omission");
            }
        }

        if self.mode.phase.is_trial() && self.mistake_ceiling_reached() {
            return self.restart(out);
        }

        let next = round + 1;
        if self.mode.phase.is_real() && next > self.config.real_round_count {
            return self.complete(out);
        }

        let symbol = self.symbol_for(next);
        self.clock.advance(self.timer.now(), symbol.clone());
        self.show_round(next, symbol, out);
    }

    fn on_presented(&mut self, round: u32) {
        let now = self.timer.now();
        if let Some(advanced_at) = self.clock.mark_presented(round, now) {
            let latency = self.timer.between(advanced_at, now);
            self.timer.record_latency(latency);
            trace!(round, latency_us = latency.as_micros() as u64, "presented");
        }
    }

    fn on_key_press(&mut self, out: &mut Vec<Directive>) -> Outcome {
        let now = self.timer.now();
        let round = self.clock.round_number();
        let (active, origin) = match self.clock.current() {
            Some(c) => (c.symbol.clone(), c.origin()),
            None => (None, now),
        };
        let reaction = self.timer.between(origin, now);
        let outcome = self.scorer.on_key_press(
            round,
            active.as_ref(),
            self.mode.polarity,
            &self.spec.target,
            reaction,
        );

        match outcome {
            Outcome::Ignored => {
                trace!(round, "press ignored");
                return outcome;
            }
            Outcome::Hit => {
                debug!(round, rt_ms = reaction.as_millis() as u64, "hit");
            }
            Outcome::CommissionMiss => debug!(round, "commission miss"),
        }
        self.cue(Cue::Response);

        if self.mode.phase.is_trial() {
            let record = self.scorer.record();
            if outcome == Outcome::Hit && record.hits >= self.config.trial_success_hits {
                self.complete(out);
            } else if self.mistake_ceiling_reached() {
                self.restart(out);
            }
        }
        outcome
    }

    fn complete(&mut self, out: &mut Vec<Directive>) {
        self.state = RunState::Completed;
        self.halt(out);

        let record = self.scorer.record().clone();
        info!(
            test = %self.spec.id,
            phase = %self.mode.phase,
            hits = record.hits,
            commission = record.commission_misses,
            omission = record.omission_misses,
            mean_rt_ms = ?record.mean_reaction_time_ms(),
            "run completed"
        );
        self.log_latency();

        if self.mode.phase.is_real() {
            if let Err(err) = self.collaborators.metrics.record(&self.spec.id, &record) {
                error!(test = %self.spec.id, "failed to record metrics: {err:#}");
            }
        }

        out.push(Directive::Show(Screen::Message(
            self.mode.phase.completion_message().to_string(),
        )));
        self.wake_after(self.config.completion_delay(), Wake::Advance, out);
    }

    fn restart(&mut self, out: &mut Vec<Directive>) {
        self.state = RunState::Restarting;
        self.halt(out);
        self.restarts += 1;
        warn!(
            test = %self.spec.id,
            restarts = self.restarts,
            mistakes = self.scorer.record().mistakes(),
            "mistake ceiling reached, restarting trial"
        );

        self.scorer.reset();
        self.clock.reset();
        self.sequence = self.generator.trial(self.config.trial_initial_length);

        out.push(Directive::Show(Screen::Message(RESTART_MESSAGE.to_string())));
        self.wake_after(self.config.restart_delay(), Wake::Restart, out);
    }

    fn abort(&mut self, out: &mut Vec<Directive>) {
        let was = self.state;
        self.state = RunState::Aborted;
        self.halt(out);
        info!(test = %self.spec.id, state = ?was, "run aborted");
        out.push(Directive::Finished);
    }

    /// Stops the clock and invalidates everything scheduled so far.
    fn halt(&mut self, out: &mut Vec<Directive>) {
        if self.clock.stop() {
            out.push(Directive::StopClock);
        }
        self.epoch += 1;
    }

    fn mistake_ceiling_reached(&self) -> bool {
        self.scorer.record().mistakes() >= self.config.trial_mistake_ceiling
    }

    /// Symbol for `round`, growing the trial buffer when the run outlasts it.
    fn symbol_for(&mut self, round: u32) -> Option<Symbol> {
        if self.mode.phase.is_trial() {
            while self.sequence.len() < round as usize {
                self.generator
                    .extend(&mut self.sequence, self.config.trial_extension_chunk);
                debug!(len = self.sequence.len(), "trial sequence extended");
            }
        }
        let symbol = self.sequence.get(round).cloned();
        if symbol.is_none() {
            error!(round, len = self.sequence.len(), "no stimulus for round");
        }
        symbol
    }

    fn show_round(&self, round: u32, symbol: Option<Symbol>, out: &mut Vec<Directive>) {
        out.push(Directive::Show(match symbol {
            Some(symbol) => Screen::Stimulus { round, symbol },
            None => Screen::Blank,
        }));
    }

    fn wake_after(&self, delay: Duration, wake: Wake, out: &mut Vec<Directive>) {
        out.push(Directive::WakeAfter {
            delay,
            wake,
            epoch: self.epoch,
        });
    }

    fn cue(&mut self, cue: Cue) {
        if let Err(err) = self.collaborators.audio.play(cue) {
            debug!(?cue, "audio cue dropped: {err}");
        }
    }

    fn log_latency(&self) {
        let stats = self.timer.latency_stats();
        if stats.samples == 0 {
            return;
        }
        info!(
            samples = stats.samples,
            mean_ms = stats.average_ns / 1_000_000.0,
            jitter_ms = stats.jitter_ns / 1_000_000.0,
            min_ms = stats.min_ns / 1_000_000.0,
            max_ms = stats.max_ns / 1_000_000.0,
            "presentation latency"
        );
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn spec(&self) -> &TestSpec {
        &self.spec
    }

    pub fn record(&self) -> &ResponseRecord {
        self.scorer.record()
    }

    pub fn round(&self) -> u32 {
        self.clock.round_number()
    }

    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Classification of the key press handled by the last event, if any.
    pub fn last_outcome(&self) -> Option<Outcome> {
        self.last_outcome
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }
}
