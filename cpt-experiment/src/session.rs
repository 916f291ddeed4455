//! Real-time driver: runs a [`RunController`] on tokio.
//!
//! Ticks, wakes and key presses all funnel into one unbounded channel that
//! a single loop drains, so the controller never sees two inputs at once.

use crate::state::{Directive, RunController, RunEvent, Screen};
use cpt_core::{ResponseRecord, RunState};
use cpt_timing::{LatencyStats, LatencyWindow, Timer};
use rand::Rng;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Host surface that puts a [`Screen`] in front of the participant.
///
/// Returning `Ok` means the frame is committed; the driver turns that into
/// the paint acknowledgement for stimulus screens.
pub trait Display {
    fn show(&mut self, screen: &Screen) -> anyhow::Result<()>;
}

impl<F> Display for F
where
    F: FnMut(&Screen) -> anyhow::Result<()>,
{
    fn show(&mut self, screen: &Screen) -> anyhow::Result<()> {
        self(screen)
    }
}

/// Cloneable input handle for the response key and teardown.
#[derive(Debug, Clone)]
pub struct KeyHandle(mpsc::UnboundedSender<RunEvent>);

impl KeyHandle {
    /// Returns `false` once the session is gone.
    pub fn press(&self) -> bool {
        self.0.send(RunEvent::KeyPress).is_ok()
    }

    pub fn abort(&self) -> bool {
        self.0.send(RunEvent::Abort).is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub state: RunState,
    pub record: ResponseRecord,
    pub restarts: u32,
}

/// [`Timer`] on tokio's clock, so paused-time tests see consistent
/// reaction times.
#[derive(Debug, Clone)]
pub struct TokioTimer {
    start: Instant,
    latencies: LatencyWindow,
}

impl TokioTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            latencies: LatencyWindow::default(),
        }
    }
}

impl Default for TokioTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer for TokioTimer {
    type Timestamp = u64;
    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
    fn between(&self, from: u64, to: u64) -> Duration {
        Duration::from_nanos(to.saturating_sub(from))
    }
    fn record_latency(&mut self, d: Duration) {
        self.latencies.push(d);
    }
    fn latency_stats(&self) -> LatencyStats {
        self.latencies.stats()
    }
}

pub struct Session<T, R>
where
    T: Timer<Timestamp = u64>,
    R: Rng,
{
    controller: RunController<T, R>,
    tx: mpsc::UnboundedSender<RunEvent>,
    rx: mpsc::UnboundedReceiver<RunEvent>,
    clock: Option<JoinHandle<()>>,
    wakes: Vec<JoinHandle<()>>,
}

impl<T, R> Session<T, R>
where
    T: Timer<Timestamp = u64>,
    R: Rng,
{
    pub fn new(controller: RunController<T, R>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            controller,
            tx,
            rx,
            clock: None,
            wakes: Vec::new(),
        }
    }

    pub fn keys(&self) -> KeyHandle {
        KeyHandle(self.tx.clone())
    }

    /// Mounts the run and drives it until it finishes or is aborted.
    pub async fn run<D: Display>(&mut self, display: &mut D) -> anyhow::Result<SessionOutcome> {
        let mut pending = VecDeque::from([RunEvent::Mount]);
        let mut finished = false;

        while !finished {
            let event = match pending.pop_front() {
                Some(event) => event,
                None => match self.rx.recv().await {
                    Some(event) => event,
                    None => break,
                },
            };

            for directive in self.controller.handle_event(event) {
                match directive {
                    Directive::Show(screen) => match display.show(&screen) {
                        Ok(()) => {
                            if let Screen::Stimulus { round, .. } = screen {
                                pending.push_back(RunEvent::Presented {
                                    round,
                                    epoch: self.controller.epoch(),
                                });
                            }
                        }
                        Err(err) => warn!(?screen, "display failed: {err:#}"),
                    },
                    Directive::StartClock { interval, epoch } => {
                        self.start_clock(interval, epoch)
                    }
                    Directive::StopClock => self.stop_clock(),
                    Directive::WakeAfter { delay, wake, epoch } => {
                        self.wakes.retain(|h| !h.is_finished());
                        let tx = self.tx.clone();
                        self.wakes.push(tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            let _ = tx.send(RunEvent::Wake { wake, epoch });
                        }));
                    }
                    Directive::Finished => finished = true,
                }
            }
        }

        self.teardown();
        Ok(SessionOutcome {
            state: self.controller.state(),
            record: self.controller.record().clone(),
            restarts: self.controller.restarts(),
        })
    }

    fn start_clock(&mut self, interval: Duration, epoch: u64) {
        self.stop_clock();
        let tx = self.tx.clone();
        debug!(?interval, epoch, "clock started");
        self.clock = Some(tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + interval, interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if tx.send(RunEvent::Tick { epoch }).is_err() {
                    break;
                }
            }
        }));
    }

    fn stop_clock(&mut self) {
        if let Some(handle) = self.clock.take() {
            handle.abort();
        }
    }

    fn teardown(&mut self) {
        self.stop_clock();
        for handle in self.wakes.drain(..) {
            handle.abort();
        }
    }
}
