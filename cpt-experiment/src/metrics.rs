use cpt_core::RunResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Real-run results of one participant session, keyed by test id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionMetrics {
    tests: BTreeMap<String, RunResult>,
}

/// Sort key splitting an id into its name and trailing number.
fn test_order(id: &str) -> (&str, Option<u64>, &str) {
    let name = id.trim_end_matches(|c: char| c.is_ascii_digit());
    (name, id[name.len()..].parse().ok(), id)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub hits: u32,
    pub commission_misses: u32,
    pub omission_misses: u32,
}

impl SessionMetrics {
    pub fn insert(&mut self, test_id: &str, result: RunResult) {
        self.tests.insert(test_id.to_string(), result);
    }

    pub fn get(&self, test_id: &str) -> Option<&RunResult> {
        self.tests.get(test_id)
    }

    /// Entries in test order: `test2` before `test10`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RunResult)> {
        let mut entries: Vec<_> = self.tests.iter().map(|(k, v)| (k.as_str(), v)).collect();
        entries.sort_by(|a, b| test_order(a.0).cmp(&test_order(b.0)));
        entries.into_iter()
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn totals(&self) -> Totals {
        self.tests.values().fold(Totals::default(), |acc, r| Totals {
            hits: acc.hits + r.hits,
            commission_misses: acc.commission_misses + r.commission_misses,
            omission_misses: acc.omission_misses + r.omission_misses,
        })
    }

    /// Mean over every recorded hit in every test, rounded to whole ms.
    pub fn mean_reaction_time_ms(&self) -> Option<u64> {
        let all: Vec<u64> = self
            .tests
            .values()
            .flat_map(|r| r.hit_reaction_times.values().copied())
            .collect();
        if all.is_empty() {
            return None;
        }
        Some((all.iter().sum::<u64>() as f64 / all.len() as f64).round() as u64)
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(hits: u32, commission: u32, omission: u32, rts: &[(u32, u64)]) -> RunResult {
        RunResult {
            hits,
            commission_misses: commission,
            omission_misses: omission,
            hit_reaction_times: rts.iter().copied().collect(),
        }
    }

    #[test]
    fn totals_and_mean_span_all_tests() {
        let mut m = SessionMetrics::default();
        m.insert("test1", result(2, 1, 0, &[(2, 300), (5, 400)]));
        m.insert("test6", result(1, 0, 3, &[(1, 500)]));
        assert_eq!(
            m.totals(),
            Totals {
                hits: 3,
                commission_misses: 1,
                omission_misses: 3
            }
        );
        assert_eq!(m.mean_reaction_time_ms(), Some(400));
    }

    #[test]
    fn empty_session_has_no_mean() {
        assert_eq!(SessionMetrics::default().mean_reaction_time_ms(), None);
    }

    #[test]
    fn serializes_as_a_map_of_test_ids() {
        let mut m = SessionMetrics::default();
        m.insert("test3", result(1, 0, 0, &[(7, 251)]));
        let v = m.to_json().unwrap();
        assert_eq!(v["test3"]["hits"], 1);
        assert_eq!(v["test3"]["hitReactionTimes"]["7"], 251);
    }

    #[test]
    fn iterates_in_test_number_order() {
        let mut m = SessionMetrics::default();
        for id in ["test10", "test2", "test1", "letters", "test9"] {
            m.insert(id, RunResult::default());
        }
        let ids: Vec<&str> = m.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, ["letters", "test1", "test2", "test9", "test10"]);
    }
}
