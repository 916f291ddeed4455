//! Virtual-time driver for simulation and deterministic tests.
//!
//! Events sit in a time-ordered heap; the driver pops the earliest, moves a
//! shared [`ManualTimer`] to its timestamp and hands it to the controller.
//! Ties resolve in scheduling order.

use crate::state::{Directive, RunController, RunEvent, Screen};
use cpt_core::{ResponseRecord, RunState, Symbol};
use cpt_timing::{ManualTimer, Timer};
use rand::Rng;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;
use tracing::trace;

/// Simulated responder. Returns the delay from paint to press, or `None`
/// to let the stimulus pass.
pub trait Participant {
    fn on_stimulus(&mut self, round: u32, symbol: &Symbol) -> Option<Duration>;
}

impl<F> Participant for F
where
    F: FnMut(u32, &Symbol) -> Option<Duration>,
{
    fn on_stimulus(&mut self, round: u32, symbol: &Symbol) -> Option<Duration> {
        self(round, symbol)
    }
}

/// Never presses.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passive;

impl Participant for Passive {
    fn on_stimulus(&mut self, _round: u32, _symbol: &Symbol) -> Option<Duration> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub at: Duration,
    pub screen: Screen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub state: RunState,
    pub record: ResponseRecord,
    pub restarts: u32,
    /// Virtual time of the last processed event.
    pub elapsed: Duration,
}

#[derive(Debug)]
struct Scheduled {
    at_ns: u64,
    seq: u64,
    event: RunEvent,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at_ns, self.seq).cmp(&(other.at_ns, other.seq))
    }
}

pub struct ReplayDriver<R: Rng> {
    controller: RunController<ManualTimer, R>,
    timer: ManualTimer,
    queue: BinaryHeap<Reverse<Scheduled>>,
    seq: u64,
    clock: Option<(u64, u64)>,
    paint_latency: Duration,
    transcript: Vec<TranscriptEntry>,
}

impl<R: Rng> ReplayDriver<R> {
    /// `timer` must be a clone of the one the controller was built with.
    pub fn new(controller: RunController<ManualTimer, R>, timer: ManualTimer) -> Self {
        Self {
            controller,
            timer,
            queue: BinaryHeap::new(),
            seq: 0,
            clock: None,
            paint_latency: Duration::ZERO,
            transcript: Vec::new(),
        }
    }

    /// Delay between a stimulus directive and its paint acknowledgement.
    pub fn with_paint_latency(mut self, latency: Duration) -> Self {
        self.paint_latency = latency;
        self
    }

    /// Schedules a press at an absolute virtual time since mount.
    pub fn press_at(&mut self, at: Duration) -> &mut Self {
        self.schedule(at.as_nanos() as u64, RunEvent::KeyPress);
        self
    }

    pub fn abort_at(&mut self, at: Duration) -> &mut Self {
        self.schedule(at.as_nanos() as u64, RunEvent::Abort);
        self
    }

    /// Mounts the run and processes events until it finishes, the queue
    /// drains, or virtual time passes `limit`.
    pub fn run<P: Participant>(&mut self, participant: &mut P, limit: Duration) -> ReplayReport {
        let limit_ns = limit.as_nanos() as u64;
        let mount_at = self.timer.now();
        self.schedule(mount_at, RunEvent::Mount);

        while let Some(Reverse(next)) = self.queue.pop() {
            if next.at_ns > limit_ns {
                trace!(at_ns = next.at_ns, "replay limit reached");
                break;
            }
            self.timer.advance_to(next.at_ns);

            if let RunEvent::Tick { epoch } = next.event {
                match self.clock {
                    Some((clock_epoch, interval)) if clock_epoch == epoch => {
                        self.schedule(next.at_ns + interval, next.event)
                    }
                    _ => continue,
                }
            }

            let directives = self.controller.handle_event(next.event);
            if self.apply(directives, participant) {
                break;
            }
        }

        ReplayReport {
            state: self.controller.state(),
            record: self.controller.record().clone(),
            restarts: self.controller.restarts(),
            elapsed: Duration::from_nanos(self.timer.now()),
        }
    }

    fn apply<P: Participant>(&mut self, directives: Vec<Directive>, participant: &mut P) -> bool {
        let now = self.timer.now();
        let mut finished = false;
        for directive in directives {
            match directive {
                Directive::Show(screen) => {
                    if let Screen::Stimulus { round, symbol } = &screen {
                        let painted = now + self.paint_latency.as_nanos() as u64;
                        let epoch = self.controller.epoch();
                        self.schedule(painted, RunEvent::Presented { round: *round, epoch });
                        if let Some(delay) = participant.on_stimulus(*round, symbol) {
                            self.schedule(painted + delay.as_nanos() as u64, RunEvent::KeyPress);
                        }
                    }
                    self.transcript.push(TranscriptEntry {
                        at: Duration::from_nanos(now),
                        screen,
                    });
                }
                Directive::StartClock { interval, epoch } => {
                    let interval = interval.as_nanos() as u64;
                    self.clock = Some((epoch, interval));
                    self.schedule(now + interval, RunEvent::Tick { epoch });
                }
                Directive::StopClock => self.clock = None,
                Directive::WakeAfter { delay, wake, epoch } => {
                    self.schedule(now + delay.as_nanos() as u64, RunEvent::Wake { wake, epoch })
                }
                Directive::Finished => finished = true,
            }
        }
        finished
    }

    fn schedule(&mut self, at_ns: u64, event: RunEvent) {
        self.seq += 1;
        self.queue.push(Reverse(Scheduled {
            at_ns,
            seq: self.seq,
            event,
        }));
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// Stimuli shown, in order, with their rounds.
    pub fn stimuli(&self) -> Vec<(u32, Symbol)> {
        self.transcript
            .iter()
            .filter_map(|e| match &e.screen {
                Screen::Stimulus { round, symbol } => Some((*round, symbol.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn controller(&self) -> &RunController<ManualTimer, R> {
        &self.controller
    }
}
