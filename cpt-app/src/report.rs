use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use comfy_table::{Cell, Table};
use cpt_experiment::SessionMetrics;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// One participant session as submitted to the results store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub key: Uuid,
    pub created_at: DateTime<Utc>,
    pub metrics: SessionMetrics,
}

impl SessionRecord {
    pub fn new(metrics: SessionMetrics) -> Self {
        Self {
            key: Uuid::new_v4(),
            created_at: Utc::now(),
            metrics,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json_pretty()?)
            .with_context(|| format!("writing session record to {}", path.display()))
    }

    pub fn summary_table(&self) -> Table {
        let mut table = Table::new();
        table.set_header(vec!["Test", "Hits", "Commission", "Omission", "Mean RT"]);
        for (id, r) in self.metrics.iter() {
            table.add_row(vec![
                Cell::new(id),
                Cell::new(r.hits),
                Cell::new(r.commission_misses),
                Cell::new(r.omission_misses),
                Cell::new(mean(r.mean_reaction_time_ms())),
            ]);
        }
        let totals = self.metrics.totals();
        table.add_row(vec![
            Cell::new("total"),
            Cell::new(totals.hits),
            Cell::new(totals.commission_misses),
            Cell::new(totals.omission_misses),
            Cell::new(mean(self.metrics.mean_reaction_time_ms())),
        ]);
        table
    }
}

fn mean(ms: Option<u64>) -> String {
    ms.map(|ms| format!("{ms}ms")).unwrap_or_else(|| "-".to_string())
}
