//! Cross-family merge into one application record.
//!
//! Each metric family is extracted independently and written to its own JSON
//! document. [`Aggregator::aggregate`] folds whatever subset of those
//! documents is available into a single [`AggregatedApplicationRecord`], one
//! bucket per platform.
//!
//! Merge rules:
//! - families merge in the fixed order downloads, revenue, behavior,
//!   retention;
//! - a family only writes the fields it owns ([`Family::owned_fields`]), so
//!   no family can overwrite another's data;
//! - within a family the last write wins (a second revenue document for the
//!   same platform replaces the first);
//! - availability flags reflect only whether a family's document was given.
//!
//! # Example
//!
//! ```rust
//! use dashmetrics_core::aggregate::{Aggregator, RevenueDocument, Sources};
//! use time::macros::datetime;
//!
//! let revenue: RevenueDocument = serde_json::from_str(
//!     r#"{"Application": "Chai", "Platform": "Google Play",
//!         "Revenue Data": [{"Device": "Phone", "Average Store Revenue": 1200}]}"#,
//! ).unwrap();
//!
//! let record = Aggregator::new().aggregate(&Sources::new().with_revenue(revenue), datetime!(2025-06-01 12:00 UTC));
//! assert_eq!(record.application, "Chai");
//! assert_eq!(record.platforms["Android"]["Average Store Revenue"], 1200);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{debug, info, warn};

use crate::extract::ExtractConfig;
use crate::normalize::normalize;
use crate::record::{ApplicationDownloads, Availability, Family, Platform, PlatformRecord, UNKNOWN_APPLICATION};
use crate::{DashError, Result};

const DEFAULT_DEVICE: &str = "Unknown Device";

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

static CJK_MONTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})\s*年\s*(\d{1,2})\s*月").expect("cjk month pattern is valid"));
static LATIN_MONTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z]+)\.?\s+(\d{4})").expect("latin month pattern is valid"));

/// Downloads-family document: the list written by the downloads extractor.
pub type DownloadsDocument = Vec<ApplicationDownloads>;

/// Revenue-family document as read back from JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RevenueDocument {
    #[serde(rename = "Application", default)]
    pub application: String,
    #[serde(rename = "Platform", default)]
    pub platform: String,
    #[serde(rename = "Revenue Data", default)]
    pub rows: Vec<serde_json::Map<String, Value>>,
}

/// One platform's behavior document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlatformBehavior {
    #[serde(rename = "Application", default)]
    pub application: String,
    #[serde(rename = "Platform", default)]
    pub platform: String,
    #[serde(rename = "User Behavior Data", default)]
    pub rows: Vec<serde_json::Map<String, Value>>,
}

/// Behavior-family document in either of its two shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BehaviorDocument {
    /// `{Application, Platforms: {Android: {...}, iOS: {...}}}`.
    Combined {
        #[serde(rename = "Application", default)]
        application: String,
        #[serde(rename = "Platforms")]
        platforms: BTreeMap<String, PlatformBehavior>,
    },
    /// A single platform document; its bucket comes from the store label.
    Single(PlatformBehavior),
}

impl BehaviorDocument {
    pub fn application(&self) -> &str {
        match self {
            BehaviorDocument::Combined { application, .. } => application,
            BehaviorDocument::Single(doc) => &doc.application,
        }
    }

    /// `(platform key, document)` pairs to merge.
    fn buckets(&self) -> Vec<(String, &PlatformBehavior)> {
        match self {
            BehaviorDocument::Combined { platforms, .. } => platforms.iter().map(|(k, v)| (k.clone(), v)).collect(),
            BehaviorDocument::Single(doc) => vec![(Platform::bucket_for_store(&doc.platform).key().to_string(), doc)],
        }
    }
}

/// One platform's retention document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlatformRetention {
    #[serde(rename = "Application", default)]
    pub application: String,
    #[serde(rename = "Platform", default)]
    pub platform: String,
    #[serde(rename = "Monthly App Retention", default, skip_serializing_if = "Option::is_none")]
    pub monthly: Option<Value>,
    #[serde(rename = "Publisher Apps User Retention (Overall)", default, skip_serializing_if = "Option::is_none")]
    pub overall: Option<Value>,
}

/// Retention-family document in either of its two shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RetentionDocument {
    Combined {
        #[serde(rename = "Application", default)]
        application: String,
        #[serde(rename = "Platforms")]
        platforms: BTreeMap<String, PlatformRetention>,
    },
    Single(PlatformRetention),
}

impl RetentionDocument {
    pub fn application(&self) -> &str {
        match self {
            RetentionDocument::Combined { application, .. } => application,
            RetentionDocument::Single(doc) => &doc.application,
        }
    }

    fn buckets(&self) -> Vec<(String, &PlatformRetention)> {
        match self {
            RetentionDocument::Combined { platforms, .. } => platforms.iter().map(|(k, v)| (k.clone(), v)).collect(),
            RetentionDocument::Single(doc) => vec![(Platform::bucket_for_store(&doc.platform).key().to_string(), doc)],
        }
    }
}

/// The per-family documents handed to the aggregator. Absent means the
/// family's source was missing or unreadable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sources {
    pub downloads: Option<DownloadsDocument>,
    /// Merged in order; later documents win per platform.
    pub revenue: Vec<RevenueDocument>,
    pub behavior: Option<BehaviorDocument>,
    pub retention: Option<RetentionDocument>,
}

impl Sources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_downloads(mut self, doc: DownloadsDocument) -> Self {
        self.downloads = Some(doc);
        self
    }

    /// Appends a revenue document.
    pub fn with_revenue(mut self, doc: RevenueDocument) -> Self {
        self.revenue.push(doc);
        self
    }

    pub fn with_behavior(mut self, doc: BehaviorDocument) -> Self {
        self.behavior = Some(doc);
        self
    }

    pub fn with_retention(mut self, doc: RetentionDocument) -> Self {
        self.retention = Some(doc);
        self
    }

    /// Loads every given path, treating missing or unparseable files as
    /// absent.
    pub fn load(paths: &SourcePaths) -> Self {
        Self {
            downloads: paths.downloads.as_deref().and_then(load_source),
            revenue: paths.revenue.iter().filter_map(|p| load_source(p)).collect(),
            behavior: paths.behavior.as_deref().and_then(load_source),
            retention: paths.retention.as_deref().and_then(load_source),
        }
    }

    /// Whether `family` contributed any data. An empty downloads list and
    /// revenue documents without rows count as absent.
    pub fn is_present(&self, family: Family) -> bool {
        match family {
            Family::Downloads => self.downloads.as_ref().is_some_and(|d| !d.is_empty()),
            Family::Revenue => self.revenue.iter().any(|doc| !doc.rows.is_empty()),
            Family::Behavior => self.behavior.is_some(),
            Family::Retention => self.retention.is_some(),
        }
    }

    /// Whether no family has a document.
    pub fn is_empty(&self) -> bool {
        Family::ALL.iter().all(|f| !self.is_present(*f))
    }

    /// Application name of `family`'s document, if it carries a non-empty one.
    fn application_of(&self, family: Family) -> Option<&str> {
        let name = match family {
            Family::Downloads => self.downloads.as_ref()?.first().map(|a| a.application.as_str()),
            Family::Revenue => self.revenue.first().map(|r| r.application.as_str()),
            Family::Behavior => self.behavior.as_ref().map(BehaviorDocument::application),
            Family::Retention => self.retention.as_ref().map(RetentionDocument::application),
        }?;
        let name = name.trim();
        (!name.is_empty()).then_some(name)
    }
}

/// Source file per family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePaths {
    pub downloads: Option<PathBuf>,
    pub revenue: Vec<PathBuf>,
    pub behavior: Option<PathBuf>,
    pub retention: Option<PathBuf>,
}

/// Converts a typed report into the loose document shape the aggregator reads.
///
/// # Errors
///
/// Fails only if `report` does not serialise into the target shape.
pub fn to_document<T: Serialize, D: DeserializeOwned>(report: &T) -> Result<D> {
    Ok(serde_json::from_value(serde_json::to_value(report)?)?)
}

/// Reads a source document, logging and discarding any failure.
pub fn load_source<D: DeserializeOwned>(path: &Path) -> Option<D> {
    match read_source(path) {
        Ok(doc) => Some(doc),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "source unavailable");
            None
        }
    }
}

fn read_source<D: DeserializeOwned>(path: &Path) -> Result<D> {
    if !path.exists() {
        return Err(DashError::FileNotFound(path.to_path_buf()));
    }
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Availability flag per family, serialised in fixed family order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSources {
    #[serde(rename = "Downloads & Basic Metrics")]
    pub downloads: Availability,
    #[serde(rename = "Revenue Data")]
    pub revenue: Availability,
    #[serde(rename = "User Behavior Data")]
    pub behavior: Availability,
    #[serde(rename = "User Retention Data")]
    pub retention: Availability,
}

impl Default for DataSources {
    fn default() -> Self {
        Self {
            downloads: Availability::NotAvailable,
            revenue: Availability::NotAvailable,
            behavior: Availability::NotAvailable,
            retention: Availability::NotAvailable,
        }
    }
}

impl DataSources {
    pub fn from_sources(sources: &Sources) -> Self {
        Self {
            downloads: Availability::from_present(sources.is_present(Family::Downloads)),
            revenue: Availability::from_present(sources.is_present(Family::Revenue)),
            behavior: Availability::from_present(sources.is_present(Family::Behavior)),
            retention: Availability::from_present(sources.is_present(Family::Retention)),
        }
    }

    pub fn get(&self, family: Family) -> Availability {
        match family {
            Family::Downloads => self.downloads,
            Family::Revenue => self.revenue,
            Family::Behavior => self.behavior,
            Family::Retention => self.retention,
        }
    }

    pub fn set(&mut self, family: Family, value: Availability) {
        match family {
            Family::Downloads => self.downloads = value,
            Family::Revenue => self.revenue = value,
            Family::Behavior => self.behavior = value,
            Family::Retention => self.retention = value,
        }
    }
}

/// The canonical merged record of one application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedApplicationRecord {
    #[serde(rename = "Application")]
    pub application: String,
    #[serde(rename = "Last Updated", default)]
    pub last_updated: String,
    #[serde(rename = "Data Sources", default)]
    pub data_sources: DataSources,
    #[serde(rename = "Platforms", default)]
    pub platforms: BTreeMap<String, PlatformRecord>,
}

impl AggregatedApplicationRecord {
    /// Drops every field `family` owns from every bucket and marks the family
    /// unavailable. Returns the number of fields removed.
    pub fn remove_family(&mut self, family: Family) -> usize {
        let mut removed = 0;
        for bucket in self.platforms.values_mut() {
            for field in family.owned_fields() {
                if bucket.remove(*field).is_some() {
                    removed += 1;
                }
            }
        }
        self.data_sources.set(family, Availability::NotAvailable);
        debug!(%family, removed, application = %self.application, "family removed");
        removed
    }

    /// Drops the whole bucket of `platform` (`"Android"`, `"iOS"`, ...).
    pub fn remove_platform(&mut self, platform: &str) -> bool {
        let removed = self.platforms.remove(platform).is_some();
        if removed {
            debug!(platform, application = %self.application, "platform removed");
        }
        removed
    }

    /// Drops the listed countries from `User Behavior by Country`, in every
    /// bucket or only in `platform`. Returns the number of rows removed.
    ///
    /// Platform-level behavior summaries are left as they are, even when the
    /// global row is among the removed countries.
    pub fn remove_countries<S: AsRef<str>>(&mut self, countries: &[S], platform: Option<&str>) -> usize {
        let mut removed = 0;
        for (key, bucket) in self.platforms.iter_mut() {
            if platform.is_some_and(|p| p != key) {
                continue;
            }
            let Some(Value::Array(rows)) = bucket.get_mut("User Behavior by Country") else {
                continue;
            };
            let before = rows.len();
            rows.retain(|row| {
                let country = row.get("Country/Region").and_then(Value::as_str).map(str::trim);
                !country.is_some_and(|c| countries.iter().any(|d| d.as_ref().trim() == c))
            });
            removed += before - rows.len();
        }
        debug!(removed, application = %self.application, "country rows removed");
        removed
    }

    /// Drops download-trend points and monthly-retention rows that fall in
    /// `period`. Returns the number of entries removed.
    pub fn remove_period(&mut self, period: Period) -> usize {
        let mut removed = 0;
        for bucket in self.platforms.values_mut() {
            if let Some(Value::Array(points)) = bucket.get_mut("Recent Three Month Downloads") {
                let before = points.len();
                points.retain(|point| {
                    let year = point.get("Year").and_then(Value::as_i64).and_then(|y| i32::try_from(y).ok());
                    let month = point.get("Month").and_then(Value::as_str).and_then(month_number);
                    !year.is_some_and(|y| period.contains(y, month))
                });
                removed += before - points.len();
            }
            if let Some(Value::Array(months)) = bucket.get_mut("Monthly Retention") {
                let before = months.len();
                months.retain(|row| {
                    let label = row.get("Month").and_then(Value::as_str).unwrap_or_default();
                    !label_period(label).is_some_and(|(y, m)| period.contains(y, m))
                });
                removed += before - months.len();
            }
        }
        debug!(%period, removed, application = %self.application, "period removed");
        removed
    }
}

/// A calendar year, optionally narrowed to one month.
///
/// Parses from `2025`, `2025-06` or `2025-June`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub year: i32,
    /// 1-based month
    pub month: Option<u8>,
}

impl Period {
    pub fn year(year: i32) -> Self {
        Self { year, month: None }
    }

    pub fn month(year: i32, month: u8) -> Self {
        Self { year, month: Some(month) }
    }

    fn contains(&self, year: i32, month: Option<u8>) -> bool {
        self.year == year && self.month.is_none_or(|m| month == Some(m))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.month {
            Some(month) => write!(f, "{}-{:02}", self.year, month),
            None => write!(f, "{}", self.year),
        }
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || format!("Invalid period: {}. Expected YYYY or YYYY-MM", s);
        let (year, month) = match s.trim().split_once('-') {
            Some((year, month)) => (year, Some(month)),
            None => (s.trim(), None),
        };
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        match month {
            Some(month) => month_number(month).map(|m| Period::month(year, m)).ok_or_else(invalid),
            None => Ok(Period::year(year)),
        }
    }
}

/// `6`, `06`, `June` or `Jun` to 6.
fn month_number(text: &str) -> Option<u8> {
    let text = text.trim();
    if let Ok(n) = text.parse::<u8>() {
        return (1..=12).contains(&n).then_some(n);
    }
    let lower = text.to_lowercase();
    if lower.len() < 3 {
        return None;
    }
    MONTH_NAMES
        .iter()
        .position(|name| name.starts_with(&lower))
        .and_then(|idx| u8::try_from(idx + 1).ok())
}

/// Year and month named by a retention row label such as `2025年6月` or
/// `June 2025`.
fn label_period(label: &str) -> Option<(i32, Option<u8>)> {
    if let Some(caps) = CJK_MONTH_RE.captures(label) {
        let year = caps[1].parse().ok()?;
        return Some((year, month_number(&caps[2])));
    }
    let caps = LATIN_MONTH_RE.captures(label)?;
    let year = caps[2].parse().ok()?;
    Some((year, month_number(&caps[1])))
}

/// Formats a timestamp as `YYYY-MM-DD HH:MM:SS`.
pub fn format_timestamp(at: OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    at.format(&format).unwrap_or_default()
}

/// Writes `value` into `bucket` if `family` owns `field`.
fn write_field(bucket: &mut PlatformRecord, family: Family, field: &str, value: Value) {
    if !family.owns(field) {
        warn!(%family, field, owner = ?Family::owner_of(field), "refused write to field of another family");
        return;
    }
    if bucket.contains_key(field) {
        debug!(%family, field, "overwriting field");
    }
    bucket.insert(field.to_string(), value);
}

/// Normalises string values; numbers and structures pass through.
fn normalize_value(value: &Value) -> Value {
    match value {
        Value::String(s) => normalize(s).into(),
        other => other.clone(),
    }
}

/// Merges per-family documents into application records.
#[derive(Debug, Clone)]
pub struct Aggregator {
    global_region_labels: Vec<String>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::from_config(&ExtractConfig::default())
    }

    /// Uses the global-region labels of `config`.
    pub fn from_config(config: &ExtractConfig) -> Self {
        Self { global_region_labels: config.global_region_labels.clone() }
    }

    fn is_global(&self, row: &serde_json::Map<String, Value>) -> bool {
        row.get("Country/Region")
            .and_then(Value::as_str)
            .is_some_and(|c| self.global_region_labels.iter().any(|l| l.eq_ignore_ascii_case(c.trim())))
    }

    /// Produces one record from whatever sources are present.
    ///
    /// Never fails: with no sources the record is named
    /// [`UNKNOWN_APPLICATION`] and carries two empty buckets.
    pub fn aggregate(&self, sources: &Sources, now: OffsetDateTime) -> AggregatedApplicationRecord {
        let application = Family::ALL
            .iter()
            .find_map(|f| sources.application_of(*f))
            .unwrap_or(UNKNOWN_APPLICATION)
            .to_string();

        let mut platforms = self.seed(sources);
        self.merge_revenue(&mut platforms, &sources.revenue);
        if let Some(behavior) = &sources.behavior {
            self.merge_behavior(&mut platforms, behavior);
        }
        if let Some(retention) = &sources.retention {
            self.merge_retention(&mut platforms, retention);
        }

        let data_sources = DataSources::from_sources(sources);
        info!(%application, platforms = platforms.len(), "aggregated application record");

        AggregatedApplicationRecord { application, last_updated: format_timestamp(now), data_sources, platforms }
    }

    /// The first downloads entry's platforms, else empty Android and iOS
    /// buckets.
    fn seed(&self, sources: &Sources) -> BTreeMap<String, PlatformRecord> {
        if let Some(downloads) = &sources.downloads
            && let Some(first) = downloads.first()
        {
            if downloads.len() > 1 {
                debug!(ignored = downloads.len() - 1, "only the first downloads entry seeds the record");
            }
            return first.platforms.clone();
        }

        [Platform::Android, Platform::Ios]
            .into_iter()
            .map(|p| (p.key().to_string(), PlatformRecord::new()))
            .collect()
    }

    fn merge_revenue(&self, platforms: &mut BTreeMap<String, PlatformRecord>, docs: &[RevenueDocument]) {
        for doc in docs {
            let key = Platform::bucket_for_store(&doc.platform).key();
            let bucket = platforms.entry(key.to_string()).or_default();
            let Some(first) = doc.rows.first() else {
                debug!(platform = key, "revenue document has no rows");
                continue;
            };

            let revenue = first.get("Average Store Revenue").cloned().unwrap_or_else(|| Value::from(0));
            let device = first
                .get("Device")
                .cloned()
                .unwrap_or_else(|| Value::String(DEFAULT_DEVICE.to_string()));
            write_field(bucket, Family::Revenue, "Average Store Revenue", revenue);
            write_field(bucket, Family::Revenue, "Device Info", device);
        }
    }

    fn merge_behavior(&self, platforms: &mut BTreeMap<String, PlatformRecord>, doc: &BehaviorDocument) {
        for (key, platform_doc) in doc.buckets() {
            let bucket = platforms.entry(key.clone()).or_default();
            if platform_doc.rows.is_empty() {
                continue;
            }

            match platform_doc.rows.iter().find(|row| self.is_global(row)) {
                Some(global) => {
                    for (source, target) in [
                        ("Active Users", "Active Users from Behavior"),
                        ("User Share", "User Share"),
                        ("Avg Time Per User", "Avg Time Per User"),
                    ] {
                        if let Some(value) = global.get(source) {
                            write_field(bucket, Family::Behavior, target, normalize_value(value));
                        }
                    }
                }
                None => warn!(platform = %key, "no global region row in behavior data"),
            }

            let rows = platform_doc.rows.iter().cloned().map(Value::Object).collect();
            write_field(bucket, Family::Behavior, "User Behavior by Country", Value::Array(rows));
        }
    }

    fn merge_retention(&self, platforms: &mut BTreeMap<String, PlatformRecord>, doc: &RetentionDocument) {
        for (key, platform_doc) in doc.buckets() {
            let bucket = platforms.entry(key).or_default();
            if let Some(monthly) = &platform_doc.monthly {
                write_field(bucket, Family::Retention, "Monthly Retention", monthly.clone());
            }
            if let Some(overall) = &platform_doc.overall {
                write_field(bucket, Family::Retention, "Overall Retention", overall.clone());
            }
        }
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregates with the default global-region labels.
pub fn aggregate(sources: &Sources, now: OffsetDateTime) -> AggregatedApplicationRecord {
    Aggregator::new().aggregate(sources, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    fn now() -> OffsetDateTime {
        datetime!(2025-06-30 08:15:00 UTC)
    }

    fn revenue(platform: &str, device: &str, value: i64) -> RevenueDocument {
        serde_json::from_value(json!({
            "Application": "Chai",
            "Platform": platform,
            "Revenue Data": [{"Device": device, "Average Store Revenue": value}]
        }))
        .unwrap()
    }

    #[test]
    fn test_no_sources() {
        let record = aggregate(&Sources::new(), now());
        assert_eq!(record.application, UNKNOWN_APPLICATION);
        assert_eq!(record.last_updated, "2025-06-30 08:15:00");
        assert_eq!(record.data_sources, DataSources::default());
        assert_eq!(record.platforms.len(), 2);
        assert!(record.platforms.values().all(|b| b.is_empty()));
    }

    #[test]
    fn test_revenue_routes_by_store() {
        let record = aggregate(&Sources::new().with_revenue(revenue("Google Play", "Phone", 10)), now());
        assert_eq!(record.platforms["Android"]["Average Store Revenue"], json!(10));
        assert_eq!(record.platforms["Android"]["Device Info"], json!("Phone"));
        assert!(record.platforms["iOS"].is_empty());

        let record = aggregate(&Sources::new().with_revenue(revenue("Unknown Platform", "Pad", 3)), now());
        assert_eq!(record.platforms["iOS"]["Device Info"], json!("Pad"));
    }

    #[test]
    fn test_revenue_last_writer_wins() {
        let sources = Sources::new()
            .with_revenue(revenue("App Store", "iPhone", 10))
            .with_revenue(revenue("App Store", "iPad", 20));
        let record = aggregate(&sources, now());
        assert_eq!(record.platforms["iOS"]["Device Info"], json!("iPad"));
        assert_eq!(record.platforms["iOS"]["Average Store Revenue"], json!(20));
    }

    #[test]
    fn test_revenue_defaults() {
        let doc: RevenueDocument =
            serde_json::from_value(json!({"Application": "A", "Platform": "Google Play", "Revenue Data": [{}]})).unwrap();
        let record = aggregate(&Sources::new().with_revenue(doc), now());
        assert_eq!(record.platforms["Android"]["Average Store Revenue"], json!(0));
        assert_eq!(record.platforms["Android"]["Device Info"], json!(DEFAULT_DEVICE));
    }

    #[test]
    fn test_empty_documents_are_not_available() {
        let no_rows: RevenueDocument =
            serde_json::from_value(json!({"Application": "Chai", "Platform": "Google Play", "Revenue Data": []})).unwrap();
        let sources = Sources::new().with_downloads(Vec::new()).with_revenue(no_rows);
        assert!(sources.is_empty());

        let record = aggregate(&sources, now());
        assert_eq!(record.application, "Chai");
        assert_eq!(record.data_sources.downloads, Availability::NotAvailable);
        assert_eq!(record.data_sources.revenue, Availability::NotAvailable);
        assert!(record.platforms.values().all(|b| b.is_empty()));
    }

    #[test]
    fn test_single_shape_behavior() {
        let doc: BehaviorDocument = serde_json::from_value(json!({
            "Application": "Chai",
            "Platform": "App Store",
            "User Behavior Data": [
                {"Country/Region": "美国", "Active Users": 10},
                {"Country/Region": "全球", "Active Users": "5万", "User Share": "12%", "Avg Time Per User": 300}
            ]
        }))
        .unwrap();
        assert!(matches!(doc, BehaviorDocument::Single(_)));

        let record = aggregate(&Sources::new().with_behavior(doc), now());
        let ios = &record.platforms["iOS"];
        assert_eq!(ios["Active Users from Behavior"], json!(50000));
        assert_eq!(ios["User Share"], json!(12.0));
        assert_eq!(ios["Avg Time Per User"], json!(300));
        assert_eq!(ios["User Behavior by Country"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_behavior_without_global_row_keeps_country_list() {
        let doc: BehaviorDocument = serde_json::from_value(json!({
            "Application": "Chai",
            "Platforms": {"Android": {"Application": "Chai", "Platform": "Google Play",
                "User Behavior Data": [{"Country/Region": "日本", "Active Users": 1}]}}
        }))
        .unwrap();
        let record = aggregate(&Sources::new().with_behavior(doc), now());
        let android = &record.platforms["Android"];
        assert!(android.get("Active Users from Behavior").is_none());
        assert!(android.contains_key("User Behavior by Country"));
    }

    #[test]
    fn test_retention_both_shapes() {
        let combined: RetentionDocument = serde_json::from_value(json!({
            "Application": "Chai",
            "Platforms": {
                "Android": {"Monthly App Retention": [{"Month": "2025年6月"}], "Publisher Apps User Retention (Overall)": []},
                "iOS": {"Monthly App Retention": []}
            }
        }))
        .unwrap();
        let record = aggregate(&Sources::new().with_retention(combined), now());
        assert_eq!(record.platforms["Android"]["Monthly Retention"], json!([{"Month": "2025年6月"}]));
        assert_eq!(record.platforms["Android"]["Overall Retention"], json!([]));
        assert!(record.platforms["iOS"].get("Overall Retention").is_none());

        let single: RetentionDocument =
            serde_json::from_value(json!({"Application": "Chai", "Platform": "Google Play", "Monthly App Retention": []}))
                .unwrap();
        let record = aggregate(&Sources::new().with_retention(single), now());
        assert_eq!(record.platforms["Android"]["Monthly Retention"], json!([]));
    }

    #[test]
    fn test_downloads_seed_and_name_priority() {
        let downloads: DownloadsDocument = serde_json::from_value(json!([
            {"Application": "X", "Platforms": {"Android": {"Downloads": 1000000}}}
        ]))
        .unwrap();
        let sources = Sources::new()
            .with_downloads(downloads)
            .with_revenue(revenue("Google Play", "Phone", 5));
        let record = aggregate(&sources, now());

        assert_eq!(record.application, "X");
        assert_eq!(record.platforms.len(), 1);
        assert_eq!(record.platforms["Android"]["Downloads"], json!(1000000));
        assert_eq!(record.platforms["Android"]["Device Info"], json!("Phone"));
    }

    #[test]
    fn test_empty_name_falls_through() {
        let mut doc = revenue("Google Play", "Phone", 5);
        doc.application = "  ".into();
        let behavior: BehaviorDocument =
            serde_json::from_value(json!({"Application": "Beh", "Platform": "App Store"})).unwrap();
        let record = aggregate(&Sources::new().with_revenue(doc).with_behavior(behavior), now());
        assert_eq!(record.application, "Beh");
    }

    #[test]
    fn test_write_field_refuses_foreign_fields() {
        let mut bucket = PlatformRecord::new();
        bucket.insert("Downloads".into(), json!(1));
        write_field(&mut bucket, Family::Revenue, "Downloads", json!(2));
        assert_eq!(bucket["Downloads"], json!(1));
    }

    #[test]
    fn test_data_sources_key_order() {
        let record = aggregate(&Sources::new().with_revenue(revenue("Google Play", "P", 1)), now());
        let json = serde_json::to_string(&record.data_sources).unwrap();
        assert_eq!(
            json,
            r#"{"Downloads & Basic Metrics":"Not Available","Revenue Data":"Available","User Behavior Data":"Not Available","User Retention Data":"Not Available"}"#
        );
    }

    #[test]
    fn test_load_is_lenient() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("revenue.json");
        fs::write(&broken, "{not json").unwrap();

        let paths = SourcePaths {
            downloads: Some(dir.path().join("missing.json")),
            revenue: vec![broken],
            ..Default::default()
        };
        let sources = Sources::load(&paths);
        assert!(sources.is_empty());
    }

    #[test]
    fn test_remove_family() {
        let sources = Sources::new()
            .with_revenue(revenue("Google Play", "Phone", 1))
            .with_revenue(revenue("App Store", "iPhone", 2));
        let mut record = aggregate(&sources, now());
        record.platforms.get_mut("iOS").unwrap().insert("Downloads".into(), json!(9));

        assert_eq!(record.remove_family(Family::Revenue), 4);
        assert_eq!(record.data_sources.revenue, Availability::NotAvailable);
        assert_eq!(record.platforms["iOS"]["Downloads"], json!(9));
        assert_eq!(record.remove_family(Family::Revenue), 0);
    }

    fn cleanable_record() -> AggregatedApplicationRecord {
        serde_json::from_value(json!({
            "Application": "Chai",
            "Platforms": {
                "Android": {
                    "Recent Three Month Downloads": [
                        {"Month": "December", "Year": 2024, "Downloads": 1},
                        {"Month": "May", "Year": 2025, "Downloads": 2},
                        {"Month": "June", "Year": 2025, "Downloads": 3}
                    ],
                    "Monthly Retention": [
                        {"Month": "2024年12月", "Day 1 Retention": 30.0},
                        {"Month": "2025年5月", "Day 1 Retention": 31.0},
                        {"Month": "2025年6月", "Day 1 Retention": 32.0}
                    ],
                    "User Behavior by Country": [
                        {"Country/Region": "全球", "Active Users": 10},
                        {"Country/Region": "美国", "Active Users": 4},
                        {"Country/Region": "日本", "Active Users": 3}
                    ]
                },
                "iOS": {
                    "User Behavior by Country": [
                        {"Country/Region": "美国", "Active Users": 2}
                    ]
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_remove_platform() {
        let mut record = cleanable_record();
        assert!(record.remove_platform("iOS"));
        assert!(!record.remove_platform("iOS"));
        assert_eq!(record.platforms.keys().collect::<Vec<_>>(), vec!["Android"]);
    }

    #[test]
    fn test_remove_countries_everywhere_and_per_platform() {
        let mut record = cleanable_record();
        assert_eq!(record.remove_countries(&["美国"], Some("Android")), 1);
        assert_eq!(record.platforms["iOS"]["User Behavior by Country"].as_array().unwrap().len(), 1);

        assert_eq!(record.remove_countries(&["美国", " 日本 "], None), 2);
        assert_eq!(
            record.platforms["Android"]["User Behavior by Country"],
            json!([{"Country/Region": "全球", "Active Users": 10}])
        );
        assert_eq!(record.platforms["iOS"]["User Behavior by Country"], json!([]));
    }

    #[test]
    fn test_remove_period_month() {
        let mut record = cleanable_record();
        assert_eq!(record.remove_period(Period::month(2025, 6)), 2);

        let android = &record.platforms["Android"];
        let months: Vec<&str> = android["Recent Three Month Downloads"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|p| p["Month"].as_str())
            .collect();
        assert_eq!(months, vec!["December", "May"]);
        assert_eq!(android["Monthly Retention"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_remove_period_year() {
        let mut record = cleanable_record();
        assert_eq!(record.remove_period(Period::year(2025)), 4);
        let android = &record.platforms["Android"];
        assert_eq!(android["Recent Three Month Downloads"][0]["Year"], json!(2024));
        assert_eq!(android["Monthly Retention"], json!([{"Month": "2024年12月", "Day 1 Retention": 30.0}]));
        assert_eq!(record.remove_period(Period::year(2023)), 0);
    }

    #[test]
    fn test_period_parsing() {
        assert_eq!("2025".parse::<Period>(), Ok(Period::year(2025)));
        assert_eq!("2025-06".parse::<Period>(), Ok(Period::month(2025, 6)));
        assert_eq!("2025-June".parse::<Period>(), Ok(Period::month(2025, 6)));
        assert_eq!("2025-sep".parse::<Period>(), Ok(Period::month(2025, 9)));
        assert!("2025-13".parse::<Period>().is_err());
        assert!("June".parse::<Period>().is_err());
        assert_eq!(Period::month(2025, 6).to_string(), "2025-06");
    }

    #[test]
    fn test_label_period() {
        assert_eq!(label_period("2025年6月"), Some((2025, Some(6))));
        assert_eq!(label_period("June 2025"), Some((2025, Some(6))));
        assert_eq!(label_period("Chai"), None);
    }

    #[test]
    fn test_record_round_trips_without_data_sources() {
        let record: AggregatedApplicationRecord =
            serde_json::from_value(json!({"Application": "A", "Platforms": {}})).unwrap();
        assert_eq!(record.data_sources.get(Family::Downloads), Availability::NotAvailable);
    }
}
