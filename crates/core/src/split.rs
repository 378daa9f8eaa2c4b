//! Partitioning of aggregated records by data completeness.

use std::path::Path;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::aggregate::{AggregatedApplicationRecord, format_timestamp, load_source};
use crate::record::{Availability, Family};
use crate::{DashError, Result};

/// Families a record needs to count as complete unless told otherwise.
pub const DEFAULT_REQUIRED: [Family; 3] = [Family::Downloads, Family::Revenue, Family::Behavior];

pub const COMPLETE_KEY: &str = "Complete_Products_Data";
pub const INCOMPLETE_KEY: &str = "Incomplete_Products_Data";

const COMPLETE_DESCRIPTION: &str = "Products with all required data sources";
const INCOMPLETE_DESCRIPTION: &str = "Products missing one or more data sources";

/// Records split into complete and incomplete lists, input order preserved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletenessSplit {
    pub complete: Vec<AggregatedApplicationRecord>,
    pub incomplete: Vec<AggregatedApplicationRecord>,
}

/// Whether every `required` family is available in `record`.
pub fn is_complete(record: &AggregatedApplicationRecord, required: &[Family]) -> bool {
    required
        .iter()
        .all(|family| record.data_sources.get(*family) == Availability::Available)
}

pub fn split_by_completeness(
    records: impl IntoIterator<Item = AggregatedApplicationRecord>, required: &[Family],
) -> CompletenessSplit {
    let mut split = CompletenessSplit::default();
    for record in records {
        if is_complete(&record, required) {
            split.complete.push(record);
        } else {
            split.incomplete.push(record);
        }
    }
    info!(complete = split.complete.len(), incomplete = split.incomplete.len(), "records split");
    split
}

/// Body of one output envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductGroup {
    pub generated_time: String,
    pub total_products: usize,
    pub description: String,
    pub products: Vec<AggregatedApplicationRecord>,
}

/// An envelope file: a single key naming the group.
pub type Envelope = std::collections::BTreeMap<String, ProductGroup>;

impl CompletenessSplit {
    /// The complete and incomplete envelopes, stamped with `now`.
    pub fn envelopes(&self, now: OffsetDateTime) -> (Envelope, Envelope) {
        let generated_time = format_timestamp(now);
        let wrap = |key: &str, description: &str, products: &[AggregatedApplicationRecord]| {
            let group = ProductGroup {
                generated_time: generated_time.clone(),
                total_products: products.len(),
                description: description.to_string(),
                products: products.to_vec(),
            };
            Envelope::from([(key.to_string(), group)])
        };

        (
            wrap(COMPLETE_KEY, COMPLETE_DESCRIPTION, &self.complete),
            wrap(INCOMPLETE_KEY, INCOMPLETE_DESCRIPTION, &self.incomplete),
        )
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecordFile {
    Many(Vec<AggregatedApplicationRecord>),
    One(AggregatedApplicationRecord),
}

/// Reads aggregated records from files holding one record or a list.
///
/// Unreadable files are skipped with a warning.
///
/// # Errors
///
/// Returns [`DashError::NoUsableSource`] when no file yielded a record.
pub fn load_records<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<AggregatedApplicationRecord>> {
    let mut records = Vec::new();
    for path in paths {
        match load_source::<RecordFile>(path.as_ref()) {
            Some(RecordFile::Many(many)) => records.extend(many),
            Some(RecordFile::One(one)) => records.push(one),
            None => warn!(path = %path.as_ref().display(), "skipped record file"),
        }
    }

    if records.is_empty() {
        return Err(DashError::NoUsableSource);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use time::macros::datetime;

    fn record(name: &str, available: [bool; 4]) -> AggregatedApplicationRecord {
        let flag = |b: bool| if b { "Available" } else { "Not Available" };
        serde_json::from_value(json!({
            "Application": name,
            "Last Updated": "2025-06-01 00:00:00",
            "Data Sources": {
                "Downloads & Basic Metrics": flag(available[0]),
                "Revenue Data": flag(available[1]),
                "User Behavior Data": flag(available[2]),
                "User Retention Data": flag(available[3])
            },
            "Platforms": {}
        }))
        .unwrap()
    }

    #[test]
    fn test_split_default_required() {
        let records = vec![
            record("full", [true, true, true, false]),
            record("no revenue", [true, false, true, true]),
            record("all", [true, true, true, true]),
        ];
        let split = split_by_completeness(records, &DEFAULT_REQUIRED);

        let complete: Vec<&str> = split.complete.iter().map(|r| r.application.as_str()).collect();
        assert_eq!(complete, vec!["full", "all"]);
        assert_eq!(split.incomplete[0].application, "no revenue");
    }

    #[test]
    fn test_split_custom_required() {
        let split = split_by_completeness(vec![record("full", [true, true, true, false])], &Family::ALL);
        assert!(split.complete.is_empty());
        assert_eq!(split.incomplete.len(), 1);

        let split = split_by_completeness(vec![record("none", [false; 4])], &[]);
        assert_eq!(split.complete.len(), 1);
    }

    #[test]
    fn test_envelopes() {
        let split = split_by_completeness(vec![record("a", [true; 4])], &DEFAULT_REQUIRED);
        let (complete, incomplete) = split.envelopes(datetime!(2025-07-01 09:30:00 UTC));

        let group = &complete[COMPLETE_KEY];
        assert_eq!(group.generated_time, "2025-07-01 09:30:00");
        assert_eq!(group.total_products, 1);
        assert_eq!(group.products[0].application, "a");
        assert_eq!(incomplete[INCOMPLETE_KEY].total_products, 0);

        let value = serde_json::to_value(&incomplete).unwrap();
        assert_eq!(value[INCOMPLETE_KEY]["products"], json!([]));
    }

    #[test]
    fn test_load_records_mixed_files() {
        let dir = tempfile::tempdir().unwrap();
        let one = dir.path().join("one.json");
        let many = dir.path().join("many.json");
        let broken = dir.path().join("broken.json");
        fs::write(&one, serde_json::to_string(&record("x", [true; 4])).unwrap()).unwrap();
        fs::write(&many, serde_json::to_string(&vec![record("y", [false; 4]), record("z", [true; 4])]).unwrap())
            .unwrap();
        fs::write(&broken, "[").unwrap();

        let records = load_records(&[one, many, broken]).unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_load_records_nothing_usable() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_records(&[dir.path().join("missing.json")]);
        assert!(matches!(result, Err(DashError::NoUsableSource)));
    }
}
