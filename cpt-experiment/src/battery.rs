use crate::error::{ConfigError, SequenceError};
use crate::sequence::SequencePlan;
use cpt_core::{Alphabet, CoreError, Phase, Polarity, RunMode, Symbol};
use serde::{Deserialize, Serialize};

/// Real-mode frequency constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Quota {
    /// Target in exactly `percent`% of rounds, other symbols fill.
    TargetShare { percent: u32 },
    /// Every symbol equally often.
    Balanced,
}

/// One sub-test of the battery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSpec {
    pub id: String,
    pub alphabet: Alphabet,
    pub target: Symbol,
    pub polarity: Polarity,
    pub quota: Quota,
}

impl TestSpec {
    pub fn new(
        id: impl Into<String>,
        alphabet: Alphabet,
        target: impl Into<Symbol>,
        polarity: Polarity,
        quota: Quota,
    ) -> Self {
        Self {
            id: id.into(),
            alphabet,
            target: target.into(),
            polarity,
            quota,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::Invalid("test id must not be empty".into()));
        }
        if !self.alphabet.contains(&self.target) {
            return Err(CoreError::UnknownSymbol {
                symbol: self.target.to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn mode(&self, phase: Phase) -> RunMode {
        RunMode::new(self.polarity, phase)
    }

    /// Real-mode plan for `rounds` rounds.
    pub fn plan(&self, rounds: usize) -> Result<SequencePlan, SequenceError> {
        match self.quota {
            Quota::TargetShare { percent } => {
                SequencePlan::target_share(&self.alphabet, &self.target, rounds, percent)
            }
            Quota::Balanced => SequencePlan::balanced(&self.alphabet, rounds),
        }
    }
}

/// Ordered list of sub-tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Battery {
    pub tests: Vec<TestSpec>,
}

impl Battery {
    /// The ten standard sub-tests.
    ///
    /// 1-3 shape go, 4-5 digit go (40% targets), 6-8 shape no-go and
    /// 9-10 digit no-go (balanced four-symbol alphabets).
    pub fn standard() -> Self {
        let go = Quota::TargetShare { percent: 40 };
        let shapes = Alphabet::shapes();
        let shapes4 = Alphabet::shapes_with_square();
        let digits3 = Alphabet::numbers();
        let digits4 = Alphabet::numbers_with_four();
        let tests = vec![
            TestSpec::new("test1", shapes.clone(), "triangle", Polarity::Go, go),
            TestSpec::new("test2", shapes.clone(), "star", Polarity::Go, go),
            TestSpec::new("test3", shapes, "circle", Polarity::Go, go),
            TestSpec::new("test4", digits3.clone(), "1", Polarity::Go, go),
            TestSpec::new("test5", digits3, "2", Polarity::Go, go),
            TestSpec::new("test6", shapes4.clone(), "circle", Polarity::NoGo, Quota::Balanced),
            TestSpec::new("test7", shapes4.clone(), "star", Polarity::NoGo, Quota::Balanced),
            TestSpec::new("test8", shapes4, "triangle", Polarity::NoGo, Quota::Balanced),
            TestSpec::new("test9", digits4.clone(), "1", Polarity::NoGo, Quota::Balanced),
            TestSpec::new("test10", digits4, "3", Polarity::NoGo, Quota::Balanced),
        ];
        Self { tests }
    }

    pub fn get(&self, id: &str) -> Result<&TestSpec, ConfigError> {
        self.tests
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| ConfigError::UnknownTest(id.to_string()))
    }

    pub fn validate(&self, rounds: usize) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for t in &self.tests {
            t.validate()?;
            if !seen.insert(t.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate test id '{}'", t.id)));
            }
            let plan = t.plan(rounds)?;
            if !plan.is_satisfiable() {
                return Err(SequenceError::ConstraintUnsatisfiable {
                    length: rounds,
                    detail: format!("test '{}'", t.id),
                }
                .into());
            }
        }
        Ok(())
    }
}

impl Default for Battery {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_battery_is_valid_for_twenty_rounds() {
        let b = Battery::standard();
        assert_eq!(b.tests.len(), 10);
        b.validate(20).unwrap();
        assert_eq!(b.get("test6").unwrap().polarity, Polarity::NoGo);
        assert_eq!(b.get("test6").unwrap().alphabet.len(), 4);
        assert_eq!(b.get("test4").unwrap().alphabet.len(), 3);
        assert!(matches!(b.get("test11"), Err(ConfigError::UnknownTest(_))));
    }

    #[test]
    fn go_plan_takes_forty_percent() {
        let b = Battery::standard();
        let plan = b.get("test1").unwrap().plan(20).unwrap();
        assert_eq!(plan.quota(&Symbol::new("triangle")), Some(8));
    }

    #[test]
    fn battery_rejects_rounds_that_do_not_divide() {
        let b = Battery::standard();
        assert!(b.validate(21).is_err());
    }

    #[test]
    fn target_outside_alphabet_is_rejected() {
        let t = TestSpec::new(
            "odd",
            Alphabet::shapes(),
            "square",
            Polarity::Go,
            Quota::TargetShare { percent: 40 },
        );
        assert!(matches!(t.validate(), Err(ConfigError::Core(_))));
    }
}
