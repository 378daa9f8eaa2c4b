//! Day-N retention extraction.
//!
//! A retention page carries two tables sharing one day-offset column schema:
//! a monthly series keyed by month and an overall series keyed by application.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::extract::Extractor;
use crate::locator::{Role, RowPair, Table, TableKind};
use crate::normalize::normalize;
use crate::parse::Document;
use crate::record::{CombinedRetention, Platform, RETENTION_DAYS, RetentionIdentity, RetentionMonthEntry, RetentionReport};

/// Fixed-column test id of the month cell.
const MONTH_CELL: &str = "table-cell#date";

const NOT_AVAILABLE: &str = "N/A";

/// `data-key` of the retention column for day `offset`.
pub fn retention_key(offset: u16) -> String {
    format!("est_retention_day__aggr-{}", offset)
}

impl Extractor {
    /// Extracts both retention tables of a page.
    pub fn retention(&self, doc: &Document) -> RetentionReport {
        let identity = doc.identity();
        let monthly = self.retention_table(doc, TableKind::MonthlyRetention, RetentionIdentity::Month);
        let overall = self.retention_table(doc, TableKind::OverallRetention, RetentionIdentity::Application);
        info!(monthly = monthly.len(), overall = overall.len(), "retention extracted");

        RetentionReport { application: identity.application, platform: identity.platform, monthly, overall }
    }

    fn retention_table(&self, doc: &Document, kind: TableKind, identity: RetentionIdentity) -> Vec<RetentionMonthEntry> {
        let Some(table) = self.locator().table(doc, kind) else {
            warn!(?kind, "retention table not found");
            return Vec::new();
        };

        table
            .paired_rows()
            .rows
            .iter()
            .map(|pair| RetentionMonthEntry {
                identity,
                label: row_label(&table, pair, identity),
                days: RETENTION_DAYS
                    .iter()
                    .map(|&day| (day, normalize(&self.retention_value(pair, day))))
                    .collect(),
            })
            .collect()
    }

    /// Display value of a day cell, then its placeholder text, else `"N/A"`.
    fn retention_value(&self, pair: &RowPair<'_>, day: u16) -> String {
        let Some(cell) = pair.cell(&retention_key(day)) else {
            return NOT_AVAILABLE.to_string();
        };
        let locator = self.locator();
        locator
            .find(cell, Role::DisplayValue)
            .or_else(|| locator.find(cell, Role::Placeholder))
            .map(|el| el.text_trimmed())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    }
}

fn row_label<'a>(table: &Table<'a, '_>, pair: &RowPair<'a>, identity: RetentionIdentity) -> String {
    let label = match identity {
        RetentionIdentity::Month => pair.fixed_cell(MONTH_CELL).map(|cell| cell.text_trimmed()),
        RetentionIdentity::Application => table.text_component(pair.fixed),
    };
    label.unwrap_or_default()
}

/// Builds the combined multi-platform shape from per-platform reports.
///
/// The application name is taken from the first report. Returns `None` when
/// no report was given.
pub fn combine_retention(reports: impl IntoIterator<Item = (Platform, RetentionReport)>) -> Option<CombinedRetention> {
    let mut application = None;
    let mut platforms = BTreeMap::new();
    for (platform, report) in reports {
        application.get_or_insert_with(|| report.application.clone());
        platforms.insert(platform.key().to_string(), report);
    }
    application.map(|application| CombinedRetention { application, platforms })
}
