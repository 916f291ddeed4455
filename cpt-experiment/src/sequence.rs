//! Stimulus sequence generation.
//!
//! Trial sequences are unconstrained apart from the no-repeat rule and grow
//! on demand. Real sequences follow a [`SequencePlan`]: exact per-symbol
//! counts plus the no-repeat rule. Real generation tries a cheap randomized
//! fast path first and then falls back to a complete backtracking search, so
//! a plan either yields a valid sequence or fails with
//! [`SequenceError::ConstraintUnsatisfiable`].

use crate::error::SequenceError;
use cpt_core::{Alphabet, CoreError, Symbol};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, warn};

/// How a sequence came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Trial draw, uniform over the alphabet minus the previous symbol.
    Random,
    /// Real plan satisfied by the sampling fast path.
    Sampled,
    /// Real plan satisfied by backtracking.
    Backtracked,
    /// Greedy fallback; `violations` quota or adjacency breaches remain.
    BestEffort { violations: usize },
    /// Supplied by the host.
    Provided,
}

/// 1-indexed list of stimuli, one per round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sequence {
    symbols: Vec<Symbol>,
    strategy: Strategy,
}

impl Sequence {
    pub fn new(symbols: Vec<Symbol>, strategy: Strategy) -> Self {
        Self { symbols, strategy }
    }

    pub fn provided(symbols: Vec<Symbol>) -> Self {
        Self::new(symbols, Strategy::Provided)
    }

    /// Symbol shown in `round` (1-indexed).
    pub fn get(&self, round: u32) -> Option<&Symbol> {
        if round == 0 {
            return None;
        }
        self.symbols.get(round as usize - 1)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn last(&self) -> Option<&Symbol> {
        self.symbols.last()
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn count_of(&self, symbol: &Symbol) -> usize {
        self.symbols.iter().filter(|s| *s == symbol).count()
    }

    /// Number of positions equal to their left neighbour.
    pub fn adjacent_repeats(&self) -> usize {
        self.symbols.windows(2).filter(|w| w[0] == w[1]).count()
    }
}

/// Exact-count requirements for a real sequence.
///
/// Every alphabet member either has a fixed count or is a free filler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencePlan {
    symbols: Vec<Symbol>,
    quotas: Vec<Option<usize>>,
    length: usize,
}

impl SequencePlan {
    pub fn new(
        alphabet: &Alphabet,
        length: usize,
        fixed: &[(Symbol, usize)],
    ) -> Result<Self, SequenceError> {
        if length == 0 {
            return Err(SequenceError::InvalidPlan("length must be positive".into()));
        }
        let symbols = alphabet.symbols().to_vec();
        let mut quotas = vec![None; symbols.len()];
        for (symbol, count) in fixed {
            let idx = alphabet
                .index_of(symbol)
                .ok_or_else(|| CoreError::UnknownSymbol {
                    symbol: symbol.to_string(),
                })?;
            if quotas[idx].is_some() {
                return Err(SequenceError::InvalidPlan(format!(
                    "quota for '{symbol}' given twice"
                )));
            }
            quotas[idx] = Some(*count);
        }
        let fixed_sum: usize = quotas.iter().flatten().sum();
        if fixed_sum > length {
            return Err(SequenceError::InvalidPlan(format!(
                "quotas sum to {fixed_sum} but only {length} rounds exist"
            )));
        }
        if quotas.iter().all(Option::is_some) && fixed_sum != length {
            return Err(SequenceError::InvalidPlan(format!(
                "quotas sum to {fixed_sum}, expected exactly {length}"
            )));
        }
        Ok(Self {
            symbols,
            quotas,
            length,
        })
    }

    /// `target` exactly `count` times, every other symbol free.
    pub fn target_count(
        alphabet: &Alphabet,
        target: &Symbol,
        length: usize,
        count: usize,
    ) -> Result<Self, SequenceError> {
        Self::new(alphabet, length, &[(target.clone(), count)])
    }

    /// `target` in exactly `percent`% of rounds.
    pub fn target_share(
        alphabet: &Alphabet,
        target: &Symbol,
        length: usize,
        percent: u32,
    ) -> Result<Self, SequenceError> {
        let scaled = length * percent as usize;
        if percent > 100 || scaled % 100 != 0 {
            return Err(SequenceError::InvalidPlan(format!(
                "{percent}% of {length} rounds is not a whole number of rounds"
            )));
        }
        Self::target_count(alphabet, target, length, scaled / 100)
    }

    /// Every symbol exactly `length / |alphabet|` times.
    pub fn balanced(alphabet: &Alphabet, length: usize) -> Result<Self, SequenceError> {
        let n = alphabet.len();
        if length % n != 0 {
            return Err(SequenceError::InvalidPlan(format!(
                "{length} rounds cannot be split evenly across {n} symbols"
            )));
        }
        let fixed: Vec<(Symbol, usize)> = alphabet
            .symbols()
            .iter()
            .map(|s| (s.clone(), length / n))
            .collect();
        Self::new(alphabet, length, &fixed)
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Fixed count for `symbol`; `None` for free fillers and non-members.
    pub fn quota(&self, symbol: &Symbol) -> Option<usize> {
        let idx = self.symbols.iter().position(|s| s == symbol)?;
        self.quotas[idx]
    }

    pub fn is_satisfiable(&self) -> bool {
        feasible(&self.quotas, self.length, None)
    }

    /// Human-readable list of every way `symbols` breaks this plan.
    pub fn violations(&self, symbols: &[Symbol]) -> Vec<String> {
        let mut out = Vec::new();
        if symbols.len() != self.length {
            out.push(format!(
                "length {} instead of {}",
                symbols.len(),
                self.length
            ));
        }
        for (symbol, quota) in self.symbols.iter().zip(&self.quotas) {
            if let Some(expected) = quota {
                let got = symbols.iter().filter(|s| *s == symbol).count();
                if got != *expected {
                    out.push(format!("'{symbol}' appears {got} times, expected {expected}"));
                }
            }
        }
        for s in symbols {
            if !self.symbols.contains(s) {
                out.push(format!("'{s}' is not in the alphabet"));
            }
        }
        for (i, w) in symbols.windows(2).enumerate() {
            if w[0] == w[1] {
                out.push(format!("'{}' repeats at rounds {} and {}", w[0], i + 1, i + 2));
            }
        }
        out
    }

    fn describe(&self) -> String {
        let parts: Vec<String> = self
            .symbols
            .iter()
            .zip(&self.quotas)
            .map(|(s, q)| match q {
                Some(c) => format!("{s}={c}"),
                None => format!("{s}=*"),
            })
            .collect();
        format!("[{}] over {} rounds", parts.join(", "), self.length)
    }

    fn materialize(&self, indices: &[usize]) -> Vec<Symbol> {
        indices.iter().map(|&i| self.symbols[i].clone()).collect()
    }
}

/// Necessary condition for arranging the remaining quotas into `slots`
/// positions without adjacent repeats, given the symbol just placed.
///
/// With one free symbol its count is forced to the spare slots. With two or
/// more free symbols the spare slots never conflict with each other.
fn feasible(quotas: &[Option<usize>], slots: usize, prev: Option<usize>) -> bool {
    let fixed: usize = quotas.iter().flatten().sum();
    if fixed > slots {
        return false;
    }
    let spare = slots - fixed;
    let free = quotas.iter().filter(|q| q.is_none()).count();
    if free == 0 && spare != 0 {
        return false;
    }
    let ceil = slots.div_ceil(2);
    let floor = slots / 2;
    quotas.iter().enumerate().all(|(i, q)| {
        let count = match q {
            Some(c) => *c,
            None if free == 1 => spare,
            None => return true,
        };
        let limit = if prev == Some(i) { floor } else { ceil };
        count <= limit
    })
}

/// Generation policy for [`SequenceGenerator::generate`].
#[derive(Debug, Clone)]
pub enum Policy {
    Trial { length: usize },
    Real(SequencePlan),
}

pub struct SequenceGenerator<R: Rng> {
    rng: R,
    alphabet: Alphabet,
    sampling_attempts: usize,
    allow_best_effort: bool,
}

impl<R: Rng> SequenceGenerator<R> {
    pub fn new(alphabet: Alphabet, rng: R) -> Self {
        Self {
            rng,
            alphabet,
            sampling_attempts: 1000,
            allow_best_effort: false,
        }
    }

    /// Cap on fast-path attempts before backtracking. Zero skips sampling.
    pub fn with_sampling_attempts(mut self, attempts: usize) -> Self {
        self.sampling_attempts = attempts;
        self
    }

    /// Return a flagged greedy sequence instead of failing on an
    /// unsatisfiable plan.
    pub fn with_best_effort(mut self, allow: bool) -> Self {
        self.allow_best_effort = allow;
        self
    }

    pub fn generate(&mut self, policy: &Policy) -> Result<Sequence, SequenceError> {
        match policy {
            Policy::Trial { length } => Ok(self.trial(*length)),
            Policy::Real(plan) => self.real(plan),
        }
    }

    pub fn trial(&mut self, length: usize) -> Sequence {
        Sequence::new(self.draw_run(None, length), Strategy::Random)
    }

    /// Appends `chunk` symbols; the first differs from the current tail.
    pub fn extend(&mut self, sequence: &mut Sequence, chunk: usize) {
        let tail = sequence.last().cloned();
        let more = self.draw_run(tail, chunk);
        sequence.symbols.extend(more);
    }

    pub fn real(&mut self, plan: &SequencePlan) -> Result<Sequence, SequenceError> {
        if plan.symbols() != self.alphabet.symbols() {
            return Err(SequenceError::InvalidPlan(
                "plan was built for a different alphabet".into(),
            ));
        }
        if plan.is_satisfiable() {
            if let Some(indices) = self.sample(plan) {
                let symbols = plan.materialize(&indices);
                if plan.violations(&symbols).is_empty() {
                    return Ok(Sequence::new(symbols, Strategy::Sampled));
                }
            }
            if let Some(indices) = self.backtrack(plan) {
                debug!(plan = %plan.describe(), "sampling exhausted, sequence built by backtracking");
                return Ok(Sequence::new(plan.materialize(&indices), Strategy::Backtracked));
            }
        }
        if self.allow_best_effort {
            let symbols = plan.materialize(&self.greedy(plan));
            let violations = plan.violations(&symbols);
            warn!(
                plan = %plan.describe(),
                ?violations,
                "no valid arrangement exists, returning best-effort sequence"
            );
            return Ok(Sequence::new(
                symbols,
                Strategy::BestEffort {
                    violations: violations.len(),
                },
            ));
        }
        Err(SequenceError::ConstraintUnsatisfiable {
            length: plan.length(),
            detail: plan.describe(),
        })
    }

    fn draw_run(&mut self, mut prev: Option<Symbol>, length: usize) -> Vec<Symbol> {
        let mut out = Vec::with_capacity(length);
        for _ in 0..length {
            let next = self.draw_after(prev.as_ref());
            out.push(next.clone());
            prev = Some(next);
        }
        out
    }

    fn draw_after(&mut self, prev: Option<&Symbol>) -> Symbol {
        let candidates: Vec<&Symbol> = self
            .alphabet
            .symbols()
            .iter()
            .filter(|s| Some(*s) != prev)
            .collect();
        candidates[self.rng.random_range(0..candidates.len())].clone()
    }

    fn sample(&mut self, plan: &SequencePlan) -> Option<Vec<usize>> {
        if self.sampling_attempts == 0 {
            return None;
        }
        let fixed: Vec<usize> = (0..plan.quotas.len())
            .filter(|&i| plan.quotas[i].is_some())
            .collect();
        match fixed.as_slice() {
            [target] if fixed.len() < plan.quotas.len() => self.sample_target_positions(plan, *target),
            _ if fixed.len() == plan.quotas.len() => self.sample_shuffled(plan),
            _ => None,
        }
    }

    /// Rejection-samples non-adjacent target positions, then fills the rest
    /// with fillers that differ from both neighbours.
    fn sample_target_positions(&mut self, plan: &SequencePlan, target: usize) -> Option<Vec<usize>> {
        let count = plan.quotas[target]?;
        let len = plan.length;
        let mut positions: Vec<usize> = Vec::with_capacity(count);
        let mut attempts = 0;
        while positions.len() < count && attempts < self.sampling_attempts {
            attempts += 1;
            let candidate = self.rng.random_range(0..len);
            if positions.iter().all(|&p| p.abs_diff(candidate) > 1) {
                positions.push(candidate);
            }
        }
        if positions.len() < count {
            return None;
        }

        let mut slots: Vec<Option<usize>> = vec![None; len];
        for p in positions {
            slots[p] = Some(target);
        }
        let fillers: Vec<usize> = (0..plan.quotas.len())
            .filter(|&i| plan.quotas[i].is_none())
            .collect();
        for i in 0..len {
            if slots[i].is_some() {
                continue;
            }
            let left = if i > 0 { slots[i - 1] } else { None };
            let right = slots.get(i + 1).copied().flatten();
            let options: Vec<usize> = fillers
                .iter()
                .copied()
                .filter(|&f| Some(f) != left && Some(f) != right)
                .collect();
            if options.is_empty() {
                return None;
            }
            slots[i] = Some(options[self.rng.random_range(0..options.len())]);
        }
        slots.into_iter().collect()
    }

    fn sample_shuffled(&mut self, plan: &SequencePlan) -> Option<Vec<usize>> {
        let mut pool: Vec<usize> = plan
            .quotas
            .iter()
            .enumerate()
            .flat_map(|(i, q)| std::iter::repeat_n(i, q.unwrap_or(0)))
            .collect();
        for _ in 0..self.sampling_attempts {
            pool.shuffle(&mut self.rng);
            if pool.windows(2).all(|w| w[0] != w[1]) {
                return Some(pool);
            }
        }
        None
    }

    fn backtrack(&mut self, plan: &SequencePlan) -> Option<Vec<usize>> {
        let mut remaining = plan.quotas.clone();
        let mut out = Vec::with_capacity(plan.length);
        if self.place(&mut remaining, &mut out, plan.length) {
            Some(out)
        } else {
            None
        }
    }

    fn place(&mut self, remaining: &mut [Option<usize>], out: &mut Vec<usize>, length: usize) -> bool {
        if out.len() == length {
            return true;
        }
        let prev = out.last().copied();
        let mut order: Vec<usize> = (0..remaining.len()).collect();
        order.shuffle(&mut self.rng);
        for i in order {
            if Some(i) == prev || remaining[i] == Some(0) {
                continue;
            }
            if let Some(c) = remaining[i].as_mut() {
                *c -= 1;
            }
            out.push(i);
            if feasible(remaining, length - out.len(), Some(i)) && self.place(remaining, out, length) {
                return true;
            }
            out.pop();
            if let Some(c) = remaining[i].as_mut() {
                *c += 1;
            }
        }
        false
    }

    fn greedy(&mut self, plan: &SequencePlan) -> Vec<usize> {
        let n = plan.quotas.len();
        let mut remaining = plan.quotas.clone();
        let mut out: Vec<usize> = Vec::with_capacity(plan.length);
        for _ in 0..plan.length {
            let prev = out.last().copied();
            let available: Vec<usize> = (0..n)
                .filter(|&i| remaining[i] != Some(0) && Some(i) != prev)
                .collect();
            let pick = if available.is_empty() {
                (0..n)
                    .find(|&i| remaining[i] != Some(0))
                    .or_else(|| (0..n).find(|&i| Some(i) != prev))
                    .unwrap_or(0)
            } else {
                available[self.rng.random_range(0..available.len())]
            };
            if let Some(c) = remaining[pick].as_mut() {
                *c = c.saturating_sub(1);
            }
            out.push(pick);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s)
    }

    #[test]
    fn go_plan_places_exactly_eight_targets_without_repeats() {
        let alphabet = Alphabet::shapes();
        let target = sym("triangle");
        let plan = SequencePlan::target_share(&alphabet, &target, 20, 40).unwrap();
        for seed in 0..300 {
            let mut g = SequenceGenerator::new(alphabet.clone(), StdRng::seed_from_u64(seed));
            let seq = g.real(&plan).unwrap();
            assert_eq!(seq.len(), 20);
            assert_eq!(seq.count_of(&target), 8, "seed {seed}");
            assert_eq!(seq.adjacent_repeats(), 0, "seed {seed}: {:?}", seq.symbols());
        }
    }

    #[test]
    fn balanced_plan_places_five_of_each_without_repeats() {
        let alphabet = Alphabet::digits(4).unwrap();
        let plan = SequencePlan::balanced(&alphabet, 20).unwrap();
        for seed in 0..300 {
            let mut g = SequenceGenerator::new(alphabet.clone(), StdRng::seed_from_u64(seed));
            let seq = g.real(&plan).unwrap();
            for s in alphabet.symbols() {
                assert_eq!(seq.count_of(s), 5, "seed {seed}");
            }
            assert_eq!(seq.adjacent_repeats(), 0, "seed {seed}");
        }
    }

    #[test]
    fn backtracking_alone_satisfies_both_plans() {
        let shapes = Alphabet::shapes_with_square();
        let balanced = SequencePlan::balanced(&shapes, 20).unwrap();
        let go = SequencePlan::target_count(&shapes, &sym("star"), 20, 8).unwrap();
        for seed in 0..50 {
            let mut g = SequenceGenerator::new(shapes.clone(), StdRng::seed_from_u64(seed))
                .with_sampling_attempts(0);
            let a = g.real(&balanced).unwrap();
            assert_eq!(a.strategy(), Strategy::Backtracked);
            assert!(balanced.violations(a.symbols()).is_empty());
            let b = g.real(&go).unwrap();
            assert!(go.violations(b.symbols()).is_empty());
        }
    }

    #[test]
    fn binary_alphabet_forces_alternation() {
        let alphabet = Alphabet::new(["a", "b"]).unwrap();
        let plan = SequencePlan::target_count(&alphabet, &sym("a"), 9, 5).unwrap();
        let mut g = SequenceGenerator::new(alphabet, StdRng::seed_from_u64(7));
        let seq = g.real(&plan).unwrap();
        let text: Vec<&str> = seq.symbols().iter().map(Symbol::as_str).collect();
        assert_eq!(text, ["a", "b", "a", "b", "a", "b", "a", "b", "a"]);
    }

    #[test]
    fn overfull_target_fails_loudly() {
        let alphabet = Alphabet::shapes();
        let plan = SequencePlan::target_count(&alphabet, &sym("circle"), 5, 4).unwrap();
        assert!(!plan.is_satisfiable());
        let mut g = SequenceGenerator::new(alphabet, StdRng::seed_from_u64(1));
        let err = g.real(&plan).unwrap_err();
        assert!(matches!(err, SequenceError::ConstraintUnsatisfiable { length: 5, .. }));
    }

    #[test]
    fn best_effort_is_flagged() {
        let alphabet = Alphabet::shapes();
        let plan = SequencePlan::target_count(&alphabet, &sym("circle"), 5, 4).unwrap();
        let mut g =
            SequenceGenerator::new(alphabet, StdRng::seed_from_u64(1)).with_best_effort(true);
        let seq = g.real(&plan).unwrap();
        assert_eq!(seq.len(), 5);
        assert!(matches!(seq.strategy(), Strategy::BestEffort { violations } if violations > 0));
    }

    #[test]
    fn trial_extension_never_repeats_at_the_seam() {
        for seed in 0..200 {
            let mut g =
                SequenceGenerator::new(Alphabet::shapes(), StdRng::seed_from_u64(seed));
            let initial = (seed % 7 + 1) as usize;
            let mut seq = g.trial(initial);
            for chunk in 1..6 {
                g.extend(&mut seq, chunk);
            }
            assert_eq!(seq.len(), initial + 15);
            assert_eq!(seq.adjacent_repeats(), 0, "seed {seed}");
            assert_eq!(seq.strategy(), Strategy::Random);
        }
    }

    #[test]
    fn extending_an_empty_sequence_draws_freely() {
        let mut g = SequenceGenerator::new(Alphabet::shapes(), StdRng::seed_from_u64(3));
        let mut seq = Sequence::provided(Vec::new());
        g.extend(&mut seq, 4);
        assert_eq!(seq.len(), 4);
        assert_eq!(seq.get(0), None);
        assert!(seq.get(4).is_some());
        assert!(seq.get(5).is_none());
    }

    #[test]
    fn plan_validation() {
        let shapes = Alphabet::shapes();
        assert!(matches!(
            SequencePlan::target_share(&shapes, &sym("star"), 20, 33),
            Err(SequenceError::InvalidPlan(_))
        ));
        assert!(matches!(
            SequencePlan::balanced(&shapes, 20),
            Err(SequenceError::InvalidPlan(_))
        ));
        assert!(matches!(
            SequencePlan::target_count(&shapes, &sym("square"), 20, 8),
            Err(SequenceError::Core(CoreError::UnknownSymbol { .. }))
        ));
        let plan = SequencePlan::target_share(&shapes, &sym("star"), 20, 40).unwrap();
        assert_eq!(plan.quota(&sym("star")), Some(8));
        assert_eq!(plan.quota(&sym("circle")), None);
    }

    #[test]
    fn generate_dispatches_on_policy() {
        let shapes = Alphabet::shapes();
        let mut g = SequenceGenerator::new(shapes.clone(), StdRng::seed_from_u64(11));
        let trial = g.generate(&Policy::Trial { length: 100 }).unwrap();
        assert_eq!(trial.len(), 100);
        let plan = SequencePlan::target_share(&shapes, &sym("circle"), 20, 40).unwrap();
        let real = g.generate(&Policy::Real(plan)).unwrap();
        assert_eq!(real.count_of(&sym("circle")), 8);
    }

    #[test]
    fn violations_report_every_breach() {
        let shapes = Alphabet::shapes();
        let plan = SequencePlan::target_count(&shapes, &sym("star"), 4, 2).unwrap();
        let bad = vec![sym("star"), sym("star"), sym("circle"), sym("circle")];
        let v = plan.violations(&bad);
        assert_eq!(v.len(), 2, "{v:?}");
    }
}
