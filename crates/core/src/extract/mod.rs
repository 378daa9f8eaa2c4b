//! Per-family extraction API.
//!
//! The entry point is [`Extractor`], which owns an [`ExtractConfig`] and the
//! compiled [`Locator`]. One method per metric family walks the located
//! regions of a [`Document`] in a single pass and returns a typed report.
//! Missing tables and rows yield empty reports, never errors.
//!
//! # Example
//!
//! ```rust
//! use dashmetrics_core::extract::{ExtractConfig, Extractor};
//! use dashmetrics_core::parse::Document;
//!
//! let extractor = Extractor::with_config(ExtractConfig::builder().build()).unwrap();
//! let doc = Document::parse("<html><head><title>Chai | 收入</title></head></html>");
//! let report = extractor.revenue(&doc);
//! assert_eq!(report.application, "Chai");
//! assert!(report.rows.is_empty());
//! ```

pub mod behavior;
pub mod downloads;
pub mod retention;
pub mod revenue;

use serde::{Deserialize, Serialize};

use crate::locator::chart::ChartPalette;
use crate::locator::{Locator, Selectors};
use crate::normalize::Normalized;
use crate::parse::Document;
use crate::record::{ApplicationDownloads, BehaviorReport, Platform, RetentionReport, RevenueReport};
use crate::Result;

pub use behavior::{BehaviorProfile, ColumnBinding, ColumnSpec, combine_behavior};
pub use downloads::{DownloadsRow, TrendPoint, group_downloads};
pub use retention::combine_retention;

/// Configuration for every extractor.
///
/// Every field has a default, and the whole struct deserialises from a
/// partial JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// CSS behind each locator role.
    pub selectors: Selectors,

    /// Chart stroke colours per platform (default: `#41A481` Android,
    /// `#0099F9` iOS).
    pub palette: ChartPalette,

    /// Country labels that mark the all-regions row of the behavior table.
    pub global_region_labels: Vec<String>,

    /// Behavior columns read from Android pages (default: rich profile).
    pub android_profile: BehaviorProfile,

    /// Behavior columns read from iOS pages (default: reduced profile).
    pub ios_profile: BehaviorProfile,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            selectors: Selectors::default(),
            palette: ChartPalette::default(),
            global_region_labels: vec!["全球".to_string(), "Worldwide".to_string(), "Global".to_string()],
            android_profile: BehaviorProfile::rich(),
            ios_profile: BehaviorProfile::reduced(),
        }
    }
}

impl ExtractConfig {
    /// Creates a new builder for ExtractConfig.
    ///
    /// # Example
    ///
    /// ```rust
    /// use dashmetrics_core::extract::ExtractConfig;
    ///
    /// let config = ExtractConfig::builder().global_region_labels(["All"]).build();
    /// assert!(config.is_global_region("All"));
    /// ```
    pub fn builder() -> ExtractConfigBuilder {
        ExtractConfigBuilder::new()
    }

    /// Behavior profile used for `platform`. Unknown platforms read the
    /// reduced profile.
    pub fn profile_for(&self, platform: Platform) -> &BehaviorProfile {
        match platform {
            Platform::Android => &self.android_profile,
            Platform::Ios | Platform::Unknown => &self.ios_profile,
        }
    }

    /// Whether `country` is the all-regions sentinel.
    pub fn is_global_region(&self, country: &str) -> bool {
        let country = country.trim();
        self.global_region_labels.iter().any(|label| label.eq_ignore_ascii_case(country))
    }
}

/// Builder for ExtractConfig.
#[derive(Debug, Clone)]
pub struct ExtractConfigBuilder {
    config: ExtractConfig,
}

impl ExtractConfigBuilder {
    pub fn new() -> Self {
        Self { config: ExtractConfig::default() }
    }

    /// Replaces the selector table.
    pub fn selectors(mut self, value: Selectors) -> Self {
        self.config.selectors = value;
        self
    }

    /// Replaces the chart palette.
    pub fn palette(mut self, value: ChartPalette) -> Self {
        self.config.palette = value;
        self
    }

    /// Replaces the global-region sentinel labels.
    pub fn global_region_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.global_region_labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn android_profile(mut self, value: BehaviorProfile) -> Self {
        self.config.android_profile = value;
        self
    }

    pub fn ios_profile(mut self, value: BehaviorProfile) -> Self {
        self.config.ios_profile = value;
        self
    }

    /// Builds the config.
    pub fn build(self) -> ExtractConfig {
        self.config
    }
}

impl Default for ExtractConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the per-family extractors against parsed documents.
#[derive(Debug, Clone)]
pub struct Extractor {
    config: ExtractConfig,
    locator: Locator,
}

impl Extractor {
    /// Creates an extractor with the default configuration.
    pub fn new() -> Self {
        Self { config: ExtractConfig::default(), locator: Locator::default() }
    }

    /// Creates an extractor with a custom configuration.
    ///
    /// # Errors
    ///
    /// Fails when a configured selector does not compile.
    pub fn with_config(config: ExtractConfig) -> Result<Self> {
        let locator = Locator::new(&config.selectors)?;
        Ok(Self { config, locator })
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Extracts the downloads family from HTML with the default configuration.
pub fn extract_downloads(html: &str) -> Vec<ApplicationDownloads> {
    Extractor::new().downloads(&Document::parse(html))
}

/// Extracts the revenue family from HTML with the default configuration.
pub fn extract_revenue(html: &str) -> RevenueReport {
    Extractor::new().revenue(&Document::parse(html))
}

/// Extracts the behavior family from HTML with the default configuration.
///
/// `platform` selects the column profile.
pub fn extract_behavior(html: &str, platform: Platform) -> BehaviorReport {
    Extractor::new().behavior(&Document::parse(html), platform).report
}

/// Extracts the retention family from HTML with the default configuration.
pub fn extract_retention(html: &str) -> RetentionReport {
    Extractor::new().retention(&Document::parse(html))
}

/// Negates a parsed change value when its cell carries a downward indicator.
///
/// Text values are left alone.
pub(crate) fn apply_direction(value: Normalized, down: bool) -> Normalized {
    if !down {
        return value;
    }
    match value {
        Normalized::Integer(i) => Normalized::Integer(-i.abs()),
        Normalized::Float(f) => Normalized::Float(-f.abs()),
        text @ Normalized::Text(_) => text,
    }
}
