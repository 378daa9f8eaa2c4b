pub mod aggregate;
pub mod config;
pub mod error;
pub mod extract;
pub mod formatters;
pub mod identity;
pub mod locator;
pub mod normalize;
pub mod parse;
pub mod record;
pub mod split;

pub use aggregate::{
    AggregatedApplicationRecord, Aggregator, BehaviorDocument, DataSources, DownloadsDocument, Period, RetentionDocument,
    RevenueDocument, SourcePaths, Sources, aggregate,
};
pub use config::{ConfigLoader, ConfigLoaderBuilder, load_config};
pub use error::{DashError, Result};
pub use extract::{
    BehaviorProfile, ColumnBinding, ColumnSpec, ExtractConfig, ExtractConfigBuilder, Extractor, combine_behavior,
    combine_retention, extract_behavior, extract_downloads, extract_retention, extract_revenue,
};
pub use formatters::{JsonConfig, JsonFormatter, to_json, write_json};
pub use identity::Identity;
#[doc(hidden)]
pub use locator::{Locator, Role, Selectors, TableKind, pair_by_index};
pub use normalize::{Normalized, normalize};
pub use parse::Document;
pub use record::{
    ApplicationDownloads, Availability, BehaviorReport, CombinedBehavior, CombinedRetention, Family, Platform,
    PlatformRecord, RetentionReport, RevenueReport,
};
pub use split::{CompletenessSplit, DEFAULT_REQUIRED, split_by_completeness};
