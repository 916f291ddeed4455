//! Seams to the surrounding application: metrics, navigation and audio.

use cpt_core::RunResult;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

use crate::metrics::SessionMetrics;

/// Receives the final result of a real run, once.
pub trait MetricsSink: Send {
    fn record(&mut self, test_id: &str, result: &RunResult) -> anyhow::Result<()>;
}

impl<F> MetricsSink for F
where
    F: FnMut(&str, &RunResult) -> anyhow::Result<()> + Send,
{
    fn record(&mut self, test_id: &str, result: &RunResult) -> anyhow::Result<()> {
        self(test_id, result)
    }
}

/// Session-wide metrics shared between the sink and the host.
#[derive(Debug, Clone, Default)]
pub struct SharedMetrics(Arc<Mutex<SessionMetrics>>);

impl SharedMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SessionMetrics {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl MetricsSink for SharedMetrics {
    fn record(&mut self, test_id: &str, result: &RunResult) -> anyhow::Result<()> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(test_id, result.clone());
        Ok(())
    }
}

/// Moves the host on to whatever follows this run.
pub trait Navigator: Send {
    fn advance_to_next(&mut self);
}

impl<F> Navigator for F
where
    F: FnMut() + Send,
{
    fn advance_to_next(&mut self) {
        self()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    CountdownTick,
    Start,
    Response,
}

impl Cue {
    pub fn frequency_hz(&self) -> u32 {
        match self {
            Cue::CountdownTick => 600,
            Cue::Start => 800,
            Cue::Response => 400,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(match self {
            Cue::CountdownTick => 150,
            Cue::Start => 300,
            Cue::Response => 50,
        })
    }
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio output unavailable: {0}")]
    Unavailable(String),
}

/// Best-effort tone output. Failures never reach scoring.
pub trait AudioCue: Send {
    fn play(&mut self, cue: Cue) -> Result<(), AudioError>;
}

/// Audio that plays nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl AudioCue for Silent {
    fn play(&mut self, _cue: Cue) -> Result<(), AudioError> {
        Ok(())
    }
}

pub struct Collaborators {
    pub metrics: Box<dyn MetricsSink>,
    pub navigator: Box<dyn Navigator>,
    pub audio: Box<dyn AudioCue>,
}

impl Collaborators {
    pub fn new(metrics: impl MetricsSink + 'static, navigator: impl Navigator + 'static) -> Self {
        Self {
            metrics: Box::new(metrics),
            navigator: Box::new(navigator),
            audio: Box::new(Silent),
        }
    }

    pub fn with_audio(mut self, audio: impl AudioCue + 'static) -> Self {
        self.audio = Box::new(audio);
        self
    }

    /// Discards metrics and navigation.
    pub fn detached() -> Self {
        Self::new(
            |_: &str, _: &RunResult| -> anyhow::Result<()> { Ok(()) },
            || {},
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_metrics_collects_by_test_id() {
        let shared = SharedMetrics::new();
        let mut sink = shared.clone();
        let result = RunResult {
            hits: 4,
            ..Default::default()
        };
        sink.record("test2", &result).unwrap();
        assert_eq!(shared.snapshot().get("test2"), Some(&result));
    }

    #[test]
    fn cues_have_distinct_pitches() {
        assert_ne!(Cue::CountdownTick.frequency_hz(), Cue::Start.frequency_hz());
        assert_ne!(Cue::Start.frequency_hz(), Cue::Response.frequency_hz());
        assert_eq!(Cue::Response.duration(), Duration::from_millis(50));
    }
}
