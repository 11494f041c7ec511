//! Per-comment vote tally.
//!
//! Stored on the comment as a JSON object `{system: {value: count}}` plus a
//! `total_votes` column. This type is the typed view of that pair.

use std::collections::BTreeMap;

use persona_db::entities::{comment, vote::PersonalitySystem};
use serde::Serialize;
use serde_json::{Map, Value};

/// Counts per value, per system.
pub type TallyCounts = BTreeMap<PersonalitySystem, BTreeMap<String, u64>>;

/// A comment's vote tally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteTally {
    pub vote_stats: TallyCounts,
    pub total_votes: u64,
}

impl VoteTally {
    /// Read the stored tally of a comment.
    #[must_use]
    pub fn from_comment(comment: &comment::Model) -> Self {
        Self {
            vote_stats: counts_from_json(&comment.vote_stats),
            total_votes: u64::try_from(comment.total_votes).unwrap_or(0),
        }
    }

    /// Build a tally from grouped `(system, value, count)` rows.
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (PersonalitySystem, String, i64)>,
    {
        let mut tally = Self::default();
        for (system, value, count) in rows {
            let count = u64::try_from(count).unwrap_or(0);
            if count == 0 {
                continue;
            }
            *tally
                .vote_stats
                .entry(system)
                .or_default()
                .entry(value)
                .or_default() += count;
            tally.total_votes += count;
        }
        tally
    }

    /// Count for one value.
    #[must_use]
    pub fn get(&self, system: PersonalitySystem, value: &str) -> u64 {
        self.vote_stats
            .get(&system)
            .and_then(|values| values.get(value))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of every per-value count.
    #[must_use]
    pub fn sum(&self) -> u64 {
        self.vote_stats.values().flat_map(BTreeMap::values).sum()
    }

    /// Whether `total_votes` agrees with the per-value counts.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.total_votes == self.sum()
    }

    /// Compare two tallies, treating zero counts as absent.
    #[must_use]
    pub fn same_counts(&self, other: &Self) -> bool {
        self.total_votes == other.total_votes && self.non_zero() == other.non_zero()
    }

    fn non_zero(&self) -> TallyCounts {
        self.vote_stats
            .iter()
            .map(|(system, values)| {
                let values: BTreeMap<String, u64> = values
                    .iter()
                    .filter(|(_, count)| **count > 0)
                    .map(|(value, count)| (value.clone(), *count))
                    .collect();
                (*system, values)
            })
            .filter(|(_, values)| !values.is_empty())
            .collect()
    }

    /// The storage form of the per-value counts.
    #[must_use]
    pub fn stats_json(&self) -> Value {
        let systems: Map<String, Value> = self
            .vote_stats
            .iter()
            .map(|(system, values)| {
                let values: Map<String, Value> = values
                    .iter()
                    .map(|(value, count)| (value.clone(), Value::from(*count)))
                    .collect();
                (system.as_str().to_string(), Value::Object(values))
            })
            .collect();
        Value::Object(systems)
    }
}

/// Parse stored counts, skipping unknown systems and non-integer counts.
fn counts_from_json(json: &Value) -> TallyCounts {
    let Some(systems) = json.as_object() else {
        return TallyCounts::new();
    };

    systems
        .iter()
        .filter_map(|(system, values)| {
            let system = system.parse::<PersonalitySystem>().ok()?;
            let values = values
                .as_object()?
                .iter()
                .filter_map(|(value, count)| Some((value.clone(), count.as_u64()?)))
                .collect();
            Some((system, values))
        })
        .collect()
}
