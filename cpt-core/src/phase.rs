use crate::stimulus::Symbol;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which half of a sub-test is running.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Practice: early exit after enough hits, restart on too many mistakes.
    #[default]
    Trial,
    /// Scored: fixed round count, metrics reported at the end.
    Real,
}

impl Phase {
    pub fn next(&self) -> Option<Self> {
        match self {
            Phase::Trial => Some(Phase::Real),
            Phase::Real => None,
        }
    }

    pub fn is_trial(&self) -> bool {
        matches!(self, Phase::Trial)
    }

    pub fn is_real(&self) -> bool {
        matches!(self, Phase::Real)
    }

    pub fn lead_in_message(&self) -> &'static str {
        match self {
            Phase::Trial => "Trial starting...",
            Phase::Real => "Real test starting...",
        }
    }

    pub fn completion_message(&self) -> &'static str {
        match self {
            Phase::Trial => "Trial finished!",
            Phase::Real => "Test is done!",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Trial => "trial",
            Phase::Real => "real",
        })
    }
}

/// What a press on the designated symbol means.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Polarity {
    /// Press only on the designated symbol.
    Go,
    /// Press on everything except the designated symbol.
    NoGo,
}

impl Polarity {
    /// Whether `active` obligates a press given the designated `target`.
    pub fn requires_press(&self, active: &Symbol, target: &Symbol) -> bool {
        match self {
            Polarity::Go => active == target,
            Polarity::NoGo => active != target,
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Polarity::Go => "go",
            Polarity::NoGo => "no-go",
        })
    }
}

#[derive(Copy, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMode {
    pub polarity: Polarity,
    pub phase: Phase,
}

impl RunMode {
    pub fn new(polarity: Polarity, phase: Phase) -> Self {
        Self { polarity, phase }
    }
}
