//! Downloads and basic-metrics extraction.
//!
//! The overview table lists one row per application and store with four
//! metric columns, each paired with a period-over-period change column. The
//! trend chart above it contributes recent monthly download points.
//!
//! Rows and chart points are first read into flat lists and then folded into
//! per-application records by [`group_downloads`].

use tracing::{debug, info, warn};

use crate::extract::{Extractor, apply_direction};
use crate::locator::{Role, RowPair, Table, TableKind};
use crate::normalize::{Normalized, normalize};
use crate::parse::{Document, Element};
use crate::record::{ApplicationDownloads, Platform, TrendEntry};

/// Output field holding the chart trend points.
pub const TREND_FIELD: &str = "Recent Three Month Downloads";

/// `(data-key, output name, change output name)` for every metric column.
pub const METRIC_COLUMNS: &[(&str, &str, &str)] = &[
    ("est_download__sum", "Downloads", "Downloads Change"),
    ("est_cumulative_download__aggr", "Cumulative Downloads", "Cumulative Downloads Change"),
    ("est_revenue__sum", "Store Revenue", "Store Revenue Change"),
    ("est_average_active_users__aggr", "Active Users", "Active Users Change"),
];

/// One table row before grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadsRow {
    pub application: String,
    pub platform: Platform,
    /// Output field name and value, in column order. Absent cells are omitted.
    pub metrics: Vec<(&'static str, Normalized)>,
}

/// One chart point before grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendPoint {
    pub application: String,
    pub platform: Platform,
    pub entry: TrendEntry,
}

/// Folds rows and chart points into per-application records.
///
/// Applications appear in first-seen order, rows before points. A repeated
/// application/platform row replaces the earlier row's metric fields. Trend
/// points append to their platform's trend list in input order.
pub fn group_downloads(rows: Vec<DownloadsRow>, points: Vec<TrendPoint>) -> Vec<ApplicationDownloads> {
    let mut grouped: Vec<ApplicationDownloads> = Vec::new();

    fn slot<'g>(grouped: &'g mut Vec<ApplicationDownloads>, application: &str) -> &'g mut ApplicationDownloads {
        let idx = match grouped.iter().position(|a| a.application == application) {
            Some(idx) => idx,
            None => {
                grouped.push(ApplicationDownloads { application: application.to_string(), platforms: Default::default() });
                grouped.len() - 1
            }
        };
        &mut grouped[idx]
    }

    for row in rows {
        let app = slot(&mut grouped, &row.application);
        let record = app.platforms.entry(row.platform.key().to_string()).or_default();
        for (field, value) in row.metrics {
            record.insert(field.to_string(), value.into());
        }
    }

    for point in points {
        let app = slot(&mut grouped, &point.application);
        let record = app.platforms.entry(point.platform.key().to_string()).or_default();
        let trend = record
            .entry(TREND_FIELD.to_string())
            .or_insert_with(|| serde_json::Value::Array(Vec::new()));
        if let serde_json::Value::Array(items) = trend
            && let Ok(value) = serde_json::to_value(&point.entry)
        {
            items.push(value);
        }
    }

    grouped
}

impl Extractor {
    /// Extracts the downloads family from a parsed overview page.
    pub fn downloads(&self, doc: &Document) -> Vec<ApplicationDownloads> {
        let rows = self.downloads_rows(doc);
        let fallback = match rows.first() {
            Some(row) => row.application.clone(),
            None => doc.resolve_application(),
        };
        let points = self.trend_points(doc, &fallback);
        info!(rows = rows.len(), points = points.len(), "downloads extracted");
        group_downloads(rows, points)
    }

    /// Reads every paired table row.
    pub fn downloads_rows(&self, doc: &Document) -> Vec<DownloadsRow> {
        let Some(table) = self.locator().table(doc, TableKind::Generic) else {
            warn!("downloads table not found");
            return Vec::new();
        };

        let headers: Vec<String> = table
            .sticky_header()
            .into_iter()
            .chain(table.metrics_header())
            .map(|cell| cell.label)
            .collect();
        debug!(?headers, "downloads headers");

        table
            .paired_rows()
            .rows
            .iter()
            .filter_map(|pair| self.downloads_row(&table, pair))
            .collect()
    }

    fn downloads_row<'a>(&self, table: &Table<'a, '_>, pair: &RowPair<'a>) -> Option<DownloadsRow> {
        let Some(application) = table.text_component(pair.fixed).filter(|name| !name.is_empty()) else {
            debug!(row = pair.index, "row without application name skipped");
            return None;
        };
        let platform = table.store_badge(pair.fixed).map(Platform::from_store_badge).unwrap_or(Platform::Unknown);

        let mut metrics = Vec::with_capacity(METRIC_COLUMNS.len() * 2);
        for (key, name, change_name) in METRIC_COLUMNS {
            if let Some(cell) = pair.cell(key) {
                metrics.push((*name, normalize(&cell.text_trimmed())));
            }
            if let Some(change) = self.change_value(pair, key) {
                metrics.push((*change_name, change));
            }
        }

        debug!(row = pair.index, %application, %platform, fields = metrics.len(), "downloads row");
        Some(DownloadsRow { application, platform, metrics })
    }

    /// Signed change of a metric column.
    ///
    /// The display span carries the magnitude; a descendant classed `down`
    /// flips the sign.
    fn change_value(&self, pair: &RowPair<'_>, key: &str) -> Option<Normalized> {
        let cell = pair.cell(&format!("value_change({})__aggr", key))?;
        let shown = self.locator().find(cell, Role::DisplayValue)?;
        let down = is_down(cell);
        Some(apply_direction(normalize(&shown.text_trimmed()), down))
    }

    /// Reads every chart point, attributing unnamed points to `fallback`.
    pub fn trend_points(&self, doc: &Document, fallback: &str) -> Vec<TrendPoint> {
        self.locator()
            .chart_series(doc, &self.config().palette)
            .into_iter()
            .flat_map(|series| {
                let platform = series.platform;
                series.points.into_iter().map(move |point| TrendPoint {
                    application: if point.app_label.is_empty() { fallback.to_string() } else { point.app_label },
                    platform,
                    entry: TrendEntry { month: point.month, year: point.year, downloads: point.downloads },
                })
            })
            .collect()
    }
}

fn is_down(cell: Element<'_>) -> bool {
    cell.descendants().any(|el| el.tag_name() == "div" && el.has_class("down"))
}
