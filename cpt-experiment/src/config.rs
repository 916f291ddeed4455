use crate::battery::{Battery, TestSpec};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Timing and phase constants for a single run. All durations in ms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub round_interval_ms: u64,
    pub real_round_count: u32,
    pub trial_mistake_ceiling: u32,
    pub trial_success_hits: u32,
    pub trial_initial_length: usize,
    pub trial_extension_chunk: usize,
    pub lead_in_ms: u64,
    pub countdown_from: u8,
    pub countdown_step_ms: u64,
    pub start_hold_ms: u64,
    pub completion_delay_ms: u64,
    pub restart_delay_ms: u64,
    /// Fast-path attempts before real generation falls back to backtracking.
    pub sampling_attempts: usize,
    /// Accept a flagged greedy sequence when a plan cannot be satisfied.
    pub allow_best_effort: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            round_interval_ms: 1500,
            real_round_count: 20,
            trial_mistake_ceiling: 3,
            trial_success_hits: 3,
            trial_initial_length: 100,
            trial_extension_chunk: 50,
            lead_in_ms: 1500,
            countdown_from: 3,
            countdown_step_ms: 1000,
            start_hold_ms: 500,
            completion_delay_ms: 2000,
            restart_delay_ms: 2500,
            sampling_attempts: 1000,
            allow_best_effort: false,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let check = |ok: bool, what: &str| {
            if ok {
                Ok(())
            } else {
                Err(ConfigError::Invalid(what.to_string()))
            }
        };
        check(self.round_interval_ms > 0, "round_interval_ms must be positive")?;
        check(self.real_round_count > 0, "real_round_count must be positive")?;
        check(self.trial_mistake_ceiling > 0, "trial_mistake_ceiling must be positive")?;
        check(self.trial_success_hits > 0, "trial_success_hits must be positive")?;
        check(self.trial_initial_length > 0, "trial_initial_length must be positive")?;
        check(self.trial_extension_chunk > 0, "trial_extension_chunk must be positive")?;
        Ok(())
    }

    pub fn round_interval(&self) -> Duration {
        Duration::from_millis(self.round_interval_ms)
    }

    pub fn lead_in(&self) -> Duration {
        Duration::from_millis(self.lead_in_ms)
    }

    pub fn countdown_step(&self) -> Duration {
        Duration::from_millis(self.countdown_step_ms)
    }

    pub fn start_hold(&self) -> Duration {
        Duration::from_millis(self.start_hold_ms)
    }

    pub fn completion_delay(&self) -> Duration {
        Duration::from_millis(self.completion_delay_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    /// Time from mount until round 1 is on screen.
    pub fn countdown_total(&self) -> Duration {
        self.lead_in() + self.countdown_step() * u32::from(self.countdown_from) + self.start_hold()
    }
}

/// Contents of a `cpt.toml` file: a `[run]` table and optional `[[tests]]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub tests: Vec<TestSpec>,
}

impl Settings {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Configured tests, or the standard battery when none are listed.
    pub fn battery(&self) -> Battery {
        if self.tests.is_empty() {
            Battery::standard()
        } else {
            Battery {
                tests: self.tests.clone(),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.run.validate()?;
        self.battery().validate(self.run.real_round_count as usize)
    }
}
