//! Integration status records and their aggregation.
//!
//! The backend reports one record per active integration. This module
//! reduces a fetched batch into the two totals shown in the tray counter
//! and keeps the original records for the per-integration menu rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Separator between the failed and missing totals in the counter text.
const COUNTER_SEPARATOR: &str = " / ";

/// Per-integration status as reported by `status.get_integrations`.
///
/// Count fields are decoded leniently: absent, non-numeric, or non-positive
/// values all contribute 0. Backends with partial or legacy data must degrade
/// to a smaller total, never to a decode error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrationStatusRecord {
    /// Display name of the integration.
    #[serde(default)]
    pub name: String,
    /// Background jobs for this integration that ended in a failed state.
    #[serde(default, deserialize_with = "lenient_count")]
    pub failed_jobs_count: u64,
    /// Mapping entries with an external value but no internal counterpart.
    #[serde(default, deserialize_with = "lenient_count")]
    pub missing_mappings_count: u64,
    /// Any further backend fields, passed through untouched for rendering.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IntegrationStatusRecord {
    /// Shorthand used by tests and fixtures.
    pub fn new(name: impl Into<String>, failed: u64, missing: u64) -> Self {
        Self {
            name: name.into(),
            failed_jobs_count: failed,
            missing_mappings_count: missing,
            extra: Map::new(),
        }
    }
}

/// Decode a count field, mapping anything that is not a positive integer to 0.
fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        // as_u64 is None for negatives and floats
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        _ => 0,
    })
}

/// Latest aggregation over one fetched batch of records.
///
/// The snapshot has no identity beyond "most recent": it is replaced
/// wholesale on every successful refresh and never merged with prior state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedStatus {
    /// Sum of `failed_jobs_count` over `records`.
    pub total_failed: u64,
    /// Sum of `missing_mappings_count` over `records`.
    pub total_missing: u64,
    /// The fetched records, backend order preserved.
    pub records: Vec<IntegrationStatusRecord>,
    /// When this batch was aggregated.
    pub fetched_at: DateTime<Utc>,
}

impl Default for AggregatedStatus {
    fn default() -> Self {
        Self {
            total_failed: 0,
            total_missing: 0,
            records: Vec::new(),
            fetched_at: Utc::now(),
        }
    }
}

impl AggregatedStatus {
    /// `"<total_failed> / <total_missing>"`, the tray counter text.
    pub fn counter_text(&self) -> String {
        format_counter(self.total_failed, self.total_missing)
    }

    /// True when no integration reports failures or missing mappings.
    pub fn is_all_clear(&self) -> bool {
        self.total_failed == 0 && self.total_missing == 0
    }
}

/// Reduce a fetched batch into its aggregate totals.
///
/// Pure and total: left-to-right u64 accumulation, empty input yields zeros.
pub fn aggregate(records: Vec<IntegrationStatusRecord>) -> AggregatedStatus {
    let (total_failed, total_missing) =
        records.iter().fold((0u64, 0u64), |(failed, missing), r| {
            (
                failed.saturating_add(r.failed_jobs_count),
                missing.saturating_add(r.missing_mappings_count),
            )
        });

    AggregatedStatus {
        total_failed,
        total_missing,
        records,
        fetched_at: Utc::now(),
    }
}

/// Join the two totals with the literal `" / "` separator.
pub fn format_counter(total_failed: u64, total_missing: u64) -> String {
    format!("{}{}{}", total_failed, COUNTER_SEPARATOR, total_missing)
}
