//! Metric records produced by the extractors.
//!
//! Every type here serialises with the stable, human-readable field names the
//! downstream JSON consumers rely on (`"Application"`, `"Revenue Data"`, ...).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::normalize::Normalized;

/// Application name used by the identity resolver when nothing matched.
pub const UNKNOWN_PRODUCT: &str = "Unknown Product";

/// Application name of an aggregated record built from zero sources.
pub const UNKNOWN_APPLICATION: &str = "Unknown Application";

/// Per-platform bag of fields inside an aggregated record.
///
/// Fields from different metric families coexist by union; see
/// [`Family::owned_fields`].
pub type PlatformRecord = serde_json::Map<String, serde_json::Value>;

/// Store identity of a data row or document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "Android")]
    Android,
    #[serde(rename = "iOS")]
    Ios,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl Platform {
    /// Key of this platform's bucket in a `Platforms` map.
    pub const fn key(self) -> &'static str {
        match self {
            Platform::Android => "Android",
            Platform::Ios => "iOS",
            Platform::Unknown => "Unknown",
        }
    }

    /// Storefront label written into single-document `Platform` fields.
    pub const fn store_label(self) -> &'static str {
        match self {
            Platform::Android => "Google Play",
            Platform::Ios => "App Store",
            Platform::Unknown => "Unknown Platform",
        }
    }

    /// Maps the `type` attribute of a row's store badge.
    pub fn from_store_badge(kind: &str) -> Self {
        match kind {
            "gp" => Platform::Android,
            "ios" => Platform::Ios,
            _ => Platform::Unknown,
        }
    }

    /// Routes a document-level store label to a platform bucket.
    ///
    /// Only the Google storefront routes to Android; every other label,
    /// including the unknown sentinel, lands in iOS.
    pub fn bucket_for_store(label: &str) -> Self {
        if label.eq_ignore_ascii_case(Platform::Android.store_label()) {
            Platform::Android
        } else {
            Platform::Ios
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "android" | "gp" | "google play" => Ok(Self::Android),
            "ios" | "app store" => Ok(Self::Ios),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("Invalid platform: {}. Valid options: android, ios", s)),
        }
    }
}

/// One independent extraction domain with its own source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    Downloads,
    Revenue,
    Behavior,
    Retention,
}

impl Family {
    /// All families in merge order.
    pub const ALL: [Family; 4] = [Family::Downloads, Family::Revenue, Family::Behavior, Family::Retention];

    /// Key used in the `Data Sources` availability map.
    pub const fn source_label(self) -> &'static str {
        match self {
            Family::Downloads => "Downloads & Basic Metrics",
            Family::Revenue => "Revenue Data",
            Family::Behavior => "User Behavior Data",
            Family::Retention => "User Retention Data",
        }
    }

    /// Platform-record fields this family writes during aggregation.
    ///
    /// The sets are disjoint, which is what lets all four families share one
    /// platform bucket without collisions.
    pub const fn owned_fields(self) -> &'static [&'static str] {
        match self {
            Family::Downloads => &[
                "Downloads",
                "Downloads Change",
                "Cumulative Downloads",
                "Cumulative Downloads Change",
                "Store Revenue",
                "Store Revenue Change",
                "Active Users",
                "Active Users Change",
                "Recent Three Month Downloads",
            ],
            Family::Revenue => &["Average Store Revenue", "Device Info"],
            Family::Behavior => &[
                "Active Users from Behavior",
                "User Share",
                "Avg Time Per User",
                "User Behavior by Country",
            ],
            Family::Retention => &["Monthly Retention", "Overall Retention"],
        }
    }

    pub fn owns(self, field: &str) -> bool {
        self.owned_fields().contains(&field)
    }

    /// Family that owns `field`, if any.
    pub fn owner_of(field: &str) -> Option<Family> {
        Family::ALL.into_iter().find(|f| f.owns(field))
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source_label())
    }
}

impl FromStr for Family {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "downloads" | "grabbed" => Ok(Self::Downloads),
            "revenue" => Ok(Self::Revenue),
            "behavior" | "behaviour" | "user_behavior" => Ok(Self::Behavior),
            "retention" | "user_retention" => Ok(Self::Retention),
            _ => Err(format!(
                "Invalid family: {}. Valid options: downloads, revenue, behavior, retention",
                s
            )),
        }
    }
}

/// Availability flag of one metric family in an aggregated record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    Available,
    #[serde(rename = "Not Available")]
    NotAvailable,
}

impl Availability {
    pub fn from_present(present: bool) -> Self {
        if present { Availability::Available } else { Availability::NotAvailable }
    }
}

/// Downloads-family output: one entry per application, grouped by platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationDownloads {
    #[serde(rename = "Application")]
    pub application: String,
    #[serde(rename = "Platforms", default)]
    pub platforms: BTreeMap<String, PlatformRecord>,
}

/// One point of the recent download trend chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendEntry {
    #[serde(rename = "Month")]
    pub month: String,
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Downloads")]
    pub downloads: i64,
}

/// One device row of the revenue table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueRow {
    #[serde(rename = "Device")]
    pub device: String,
    #[serde(rename = "Average Store Revenue", skip_serializing_if = "Option::is_none")]
    pub average_store_revenue: Option<Normalized>,
}

/// Revenue-family output for one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueReport {
    #[serde(rename = "Application")]
    pub application: String,
    /// Store label, e.g. `"Google Play"`.
    #[serde(rename = "Platform")]
    pub platform: String,
    #[serde(rename = "Revenue Data")]
    pub rows: Vec<RevenueRow>,
}

/// Semantic columns of the per-country behavior table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BehaviorField {
    #[serde(rename = "Active Users")]
    ActiveUsers,
    #[serde(rename = "User Share")]
    UserShare,
    #[serde(rename = "Day 1 Retention")]
    Day1Retention,
    #[serde(rename = "Day 7 Retention")]
    Day7Retention,
    #[serde(rename = "Day 30 Retention")]
    Day30Retention,
    #[serde(rename = "Avg Time Per User")]
    AvgTimePerUser,
    #[serde(rename = "Session Count")]
    SessionCount,
    #[serde(rename = "Avg Session Duration")]
    AvgSessionDuration,
    #[serde(rename = "Avg Active Days")]
    AvgActiveDays,
    #[serde(rename = "Active Days Percentage")]
    ActiveDaysPercentage,
}

impl BehaviorField {
    /// Output field name.
    pub const fn name(self) -> &'static str {
        match self {
            BehaviorField::ActiveUsers => "Active Users",
            BehaviorField::UserShare => "User Share",
            BehaviorField::Day1Retention => "Day 1 Retention",
            BehaviorField::Day7Retention => "Day 7 Retention",
            BehaviorField::Day30Retention => "Day 30 Retention",
            BehaviorField::AvgTimePerUser => "Avg Time Per User",
            BehaviorField::SessionCount => "Session Count",
            BehaviorField::AvgSessionDuration => "Avg Session Duration",
            BehaviorField::AvgActiveDays => "Avg Active Days",
            BehaviorField::ActiveDaysPercentage => "Active Days Percentage",
        }
    }
}

/// One country row of the behavior table, fields in profile column order.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryBehaviorEntry {
    pub country: String,
    pub values: Vec<(BehaviorField, Normalized)>,
}

impl CountryBehaviorEntry {
    pub fn get(&self, field: BehaviorField) -> Option<&Normalized> {
        self.values.iter().find(|(f, _)| *f == field).map(|(_, v)| v)
    }
}

impl Serialize for CountryBehaviorEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len() + 1))?;
        map.serialize_entry("Country/Region", &self.country)?;
        for (field, value) in &self.values {
            map.serialize_entry(field.name(), value)?;
        }
        map.end()
    }
}

/// Behavior-family output for one platform document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BehaviorReport {
    #[serde(rename = "Application")]
    pub application: String,
    #[serde(rename = "Platform")]
    pub platform: String,
    #[serde(rename = "User Behavior Data")]
    pub rows: Vec<CountryBehaviorEntry>,
}

/// Combined multi-platform behavior output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedBehavior {
    #[serde(rename = "Application")]
    pub application: String,
    #[serde(rename = "Platforms")]
    pub platforms: BTreeMap<String, BehaviorReport>,
}

/// Day offsets of every retention table, in column order.
pub const RETENTION_DAYS: [u16; 10] = [0, 1, 2, 3, 4, 5, 6, 7, 14, 30];

/// Which identity column a retention row carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionIdentity {
    /// Monthly series, keyed by month label.
    Month,
    /// Overall/publisher series, keyed by application label.
    Application,
}

impl RetentionIdentity {
    pub const fn field(self) -> &'static str {
        match self {
            RetentionIdentity::Month => "Month",
            RetentionIdentity::Application => "Application",
        }
    }
}

/// One row of a retention table.
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionMonthEntry {
    pub identity: RetentionIdentity,
    pub label: String,
    /// `(day offset, retention)` in [`RETENTION_DAYS`] order.
    pub days: Vec<(u16, Normalized)>,
}

impl RetentionMonthEntry {
    pub fn day(&self, offset: u16) -> Option<&Normalized> {
        self.days.iter().find(|(d, _)| *d == offset).map(|(_, v)| v)
    }
}

impl Serialize for RetentionMonthEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.days.len() + 1))?;
        map.serialize_entry(self.identity.field(), &self.label)?;
        for (day, value) in &self.days {
            map.serialize_entry(&format!("Day {} Retention", day), value)?;
        }
        map.end()
    }
}

/// Retention-family output for one platform document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionReport {
    #[serde(rename = "Application")]
    pub application: String,
    #[serde(rename = "Platform")]
    pub platform: String,
    #[serde(rename = "Monthly App Retention")]
    pub monthly: Vec<RetentionMonthEntry>,
    #[serde(rename = "Publisher Apps User Retention (Overall)")]
    pub overall: Vec<RetentionMonthEntry>,
}

/// Combined multi-platform retention output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedRetention {
    #[serde(rename = "Application")]
    pub application: String,
    #[serde(rename = "Platforms")]
    pub platforms: BTreeMap<String, RetentionReport>,
}
