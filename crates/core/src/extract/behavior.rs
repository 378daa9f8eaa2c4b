//! Per-country user-behavior extraction.
//!
//! Android and iOS pages expose different metric columns, so the columns to
//! read are described by a [`BehaviorProfile`]: an ordered list of
//! [`ColumnSpec`]s. Each spec is bound to a concrete `data-key` either through
//! its header label or, when no header matches, by guessing from substrings of
//! the keys present on the page. The outcome of every binding is returned as a
//! [`ColumnBinding`] so a wrong guess can be spotted in the logs and in tests.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::extract::Extractor;
use crate::locator::{HeaderCell, TableKind};
use crate::normalize::normalize;
use crate::parse::{Document, Element};
use crate::record::{BehaviorField, BehaviorReport, CombinedBehavior, CountryBehaviorEntry, Platform};

/// Fixed-column test id of the country cell.
const COUNTRY_CELL: &str = "table-cell#country_code";

/// Value written when a bound cell is absent from a row.
const MISSING_CELL: &str = "N/A";

/// One semantic column and how to find it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub field: BehaviorField,
    /// Header labels that identify the column, compared case-insensitively.
    pub labels: Vec<String>,
    /// Substrings of a `data-key` that identify the column when no header
    /// label matched, in priority order.
    #[serde(default)]
    pub fallback_patterns: Vec<String>,
}

impl ColumnSpec {
    pub fn new(field: BehaviorField, labels: &[&str], fallback_patterns: &[&str]) -> Self {
        Self {
            field,
            labels: labels.iter().map(|s| s.to_string()).collect(),
            fallback_patterns: fallback_patterns.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn matches_label(&self, label: &str) -> bool {
        let label = label.split_whitespace().collect::<Vec<_>>().join(" ");
        self.labels.iter().any(|l| l.eq_ignore_ascii_case(&label))
    }
}

/// Ordered column set read for one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorProfile {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
}

impl BehaviorProfile {
    fn base_columns() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::new(BehaviorField::ActiveUsers, &["活跃用户", "Active Users"], &["active_users"]),
            ColumnSpec::new(BehaviorField::UserShare, &["用户份额", "User Share"], &["share"]),
            ColumnSpec::new(
                BehaviorField::Day1Retention,
                &["第1天留存率", "Day 1 Retention"],
                &["retention_d1", "retention_day__aggr-1"],
            ),
            ColumnSpec::new(
                BehaviorField::Day7Retention,
                &["第7天留存率", "Day 7 Retention"],
                &["retention_d7", "retention_day__aggr-7"],
            ),
            ColumnSpec::new(
                BehaviorField::Day30Retention,
                &["第30天留存率", "Day 30 Retention"],
                &["retention_d30", "retention_day__aggr-30"],
            ),
            ColumnSpec::new(
                BehaviorField::AvgTimePerUser,
                &["平均时间/用户", "Avg Time Per User"],
                &["time_per_user", "usage_time"],
            ),
        ]
    }

    /// Base columns plus session and active-day metrics.
    pub fn rich() -> Self {
        let mut columns = Self::base_columns();
        columns.extend([
            ColumnSpec::new(
                BehaviorField::SessionCount,
                &["会话次数", "平均会话次数/用户", "Session Count"],
                &["session_count", "sessions"],
            ),
            ColumnSpec::new(
                BehaviorField::AvgSessionDuration,
                &["平均会话时长", "Avg Session Duration"],
                &["session_duration", "session_length"],
            ),
            ColumnSpec::new(
                BehaviorField::AvgActiveDays,
                &["平均活跃天数", "Avg Active Days"],
                &["avg_active_days", "active_days__avg"],
            ),
            ColumnSpec::new(
                BehaviorField::ActiveDaysPercentage,
                &["活跃天数百分比", "Active Days Percentage"],
                &["active_days_percent", "active_days__pct"],
            ),
        ]);
        Self { name: "rich".to_string(), columns }
    }

    /// Base columns plus average active days.
    pub fn reduced() -> Self {
        let mut columns = Self::base_columns();
        columns.push(ColumnSpec::new(
            BehaviorField::AvgActiveDays,
            &["平均活跃天数", "Avg Active Days"],
            &["avg_active_days", "active_days__avg"],
        ));
        Self { name: "reduced".to_string(), columns }
    }
}

/// How a [`ColumnSpec`] was bound to the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "binding")]
pub enum ColumnBinding {
    /// A header label matched; the key comes from that header cell.
    Header { field: BehaviorField, key: String, label: String },
    /// No header matched; a fallback pattern matched this key.
    Guessed { field: BehaviorField, key: String, pattern: String },
    /// Neither matched. The field is left out of every row.
    Missing { field: BehaviorField },
}

impl ColumnBinding {
    pub fn field(&self) -> BehaviorField {
        match self {
            ColumnBinding::Header { field, .. }
            | ColumnBinding::Guessed { field, .. }
            | ColumnBinding::Missing { field } => *field,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            ColumnBinding::Header { key, .. } | ColumnBinding::Guessed { key, .. } => Some(key),
            ColumnBinding::Missing { .. } => None,
        }
    }
}

/// Binds every column of `profile` to a `data-key`.
///
/// Header labels are tried first for all columns. Columns still unbound then
/// take the first unclaimed key, among header keys and then `row_keys`, that
/// contains one of their fallback patterns. A key is bound at most once.
pub fn bind_columns(profile: &BehaviorProfile, headers: &[HeaderCell], row_keys: &[&str]) -> Vec<ColumnBinding> {
    let mut claimed: HashSet<String> = HashSet::new();
    let mut bound: Vec<Option<ColumnBinding>> = Vec::with_capacity(profile.columns.len());

    for spec in &profile.columns {
        let hit = headers.iter().find_map(|cell| match &cell.key {
            Some(key) if spec.matches_label(&cell.label) && !claimed.contains(key) => Some((key.clone(), cell.label.clone())),
            _ => None,
        });
        bound.push(hit.map(|(key, label)| {
            claimed.insert(key.clone());
            ColumnBinding::Header { field: spec.field, key, label }
        }));
    }

    let mut candidates: Vec<&str> = Vec::new();
    for key in headers.iter().filter_map(|c| c.key.as_deref()).chain(row_keys.iter().copied()) {
        if !candidates.contains(&key) {
            candidates.push(key);
        }
    }

    profile
        .columns
        .iter()
        .zip(bound)
        .map(|(spec, binding)| {
            if let Some(binding) = binding {
                return binding;
            }
            for pattern in &spec.fallback_patterns {
                let needle = pattern.to_lowercase();
                if let Some(key) = candidates
                    .iter()
                    .find(|key| !claimed.contains(**key) && key.to_lowercase().contains(&needle))
                {
                    claimed.insert(key.to_string());
                    return ColumnBinding::Guessed { field: spec.field, key: key.to_string(), pattern: pattern.clone() };
                }
            }
            ColumnBinding::Missing { field: spec.field }
        })
        .collect()
}

/// Whether a cell text is a "no data" placeholder.
pub fn is_placeholder(text: &str) -> bool {
    let text = text.trim();
    text.is_empty() || text == "-" || text == "N/A" || text.starts_with("NaN")
}

/// Visible value of a behavior cell.
///
/// Takes the first nested span or div with a non-placeholder text, else the
/// cell's own text.
fn read_cell(cell: Element<'_>) -> String {
    cell.descendants()
        .filter(|el| matches!(el.tag_name().as_str(), "span" | "div"))
        .map(|el| el.text_trimmed())
        .find(|text| !is_placeholder(text))
        .unwrap_or_else(|| cell.text_trimmed())
}

/// Behavior report plus the column bindings used to build it.
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviorExtraction {
    pub report: BehaviorReport,
    pub bindings: Vec<ColumnBinding>,
}

impl Extractor {
    /// Extracts the behavior family from one platform's page.
    ///
    /// `platform` picks the column profile; the report's `Platform` field is
    /// still the storefront inferred from the document.
    pub fn behavior(&self, doc: &Document, platform: Platform) -> BehaviorExtraction {
        let identity = doc.identity();
        let mut report = BehaviorReport { application: identity.application, platform: identity.platform, rows: Vec::new() };
        let profile = self.config().profile_for(platform);

        let Some(table) = self.locator().table(doc, TableKind::Behavior) else {
            warn!(%platform, "behavior table not found");
            return BehaviorExtraction { report, bindings: Vec::new() };
        };

        let headers = table.header_cells();
        let paired = table.paired_rows();
        let row_keys = paired.rows.first().map(|pair| pair.data_keys()).unwrap_or_default();

        let bindings = bind_columns(profile, &headers, &row_keys);
        for binding in &bindings {
            match binding {
                ColumnBinding::Header { field, key, .. } => debug!(field = field.name(), %key, "column bound by header"),
                ColumnBinding::Guessed { field, key, pattern } => {
                    warn!(field = field.name(), %key, %pattern, "column guessed from data key")
                }
                ColumnBinding::Missing { field } => warn!(field = field.name(), "column not found"),
            }
        }

        for pair in &paired.rows {
            let country = pair
                .fixed_cell(COUNTRY_CELL)
                .and_then(|cell| table.text_component(cell))
                .unwrap_or_else(|| MISSING_CELL.to_string());

            let values = bindings
                .iter()
                .filter_map(|binding| {
                    let key = binding.key()?;
                    let raw = pair.cell(key).map(read_cell).unwrap_or_else(|| MISSING_CELL.to_string());
                    Some((binding.field(), normalize(&raw)))
                })
                .collect();

            debug!(row = pair.index, %country, "behavior row");
            report.rows.push(CountryBehaviorEntry { country, values });
        }

        info!(%platform, profile = %profile.name, rows = report.rows.len(), "behavior extracted");
        BehaviorExtraction { report, bindings }
    }
}

/// Builds the combined multi-platform shape from per-platform reports.
///
/// The application name is taken from the first report. Returns `None` when
/// no report was given.
pub fn combine_behavior(reports: impl IntoIterator<Item = (Platform, BehaviorReport)>) -> Option<CombinedBehavior> {
    let mut application = None;
    let mut platforms = BTreeMap::new();
    for (platform, report) in reports {
        application.get_or_insert_with(|| report.application.clone());
        platforms.insert(platform.key().to_string(), report);
    }
    application.map(|application| CombinedBehavior { application, platforms })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Normalized;

    fn header(key: &str, label: &str) -> HeaderCell {
        HeaderCell { key: Some(key.to_string()), label: label.to_string() }
    }

    fn behavior_html(header_cells: &str, cells: &str) -> String {
        format!(
            r#"<html><head><title>PolyBuzz | 使用行为</title></head><body>
            <div data-table-type="table_change(__table__$app_usage_country)">
                <div class="TableHeader__TableRow-sc-194ff62d-4 bAcynv">{header_cells}</div>
                <div class="ReactVirtualized__Table FixedStyledTable">
                    <div class="ReactVirtualized__Table__row" aria-rowindex="1">
                        <div data-testid="table-cell#country_code"><div data-testid="text-component">全球</div></div>
                    </div>
                    <div class="ReactVirtualized__Table__row" aria-rowindex="2">
                        <div data-testid="table-cell#country_code"><div data-testid="text-component">美国</div></div>
                    </div>
                </div>
                <div class="ReactVirtualized__Table StyledTable">
                    <div class="ReactVirtualized__Table__row" aria-rowindex="1">{cells}</div>
                    <div class="ReactVirtualized__Table__row" aria-rowindex="2"><div data-key="est_active_users__aggr"><span>-</span></div></div>
                </div>
            </div></body></html>"#
        )
    }

    #[test]
    fn test_bind_by_header_label() {
        let headers = vec![header("k_users", "活跃用户"), header("k_share", "user  share")];
        let bindings = bind_columns(&BehaviorProfile::reduced(), &headers, &[]);

        assert_eq!(
            bindings[0],
            ColumnBinding::Header { field: BehaviorField::ActiveUsers, key: "k_users".into(), label: "活跃用户".into() }
        );
        assert_eq!(bindings[1].key(), Some("k_share"));
        assert!(matches!(bindings[2], ColumnBinding::Missing { field: BehaviorField::Day1Retention }));
    }

    #[test]
    fn test_guess_from_row_keys() {
        let row_keys = ["est_session_count__avg", "est_session_duration__avg", "est_avg_active_days__avg"];
        let bindings = bind_columns(&BehaviorProfile::rich(), &[], &row_keys);

        let by_field = |f: BehaviorField| bindings.iter().find(|b| b.field() == f).unwrap().clone();
        assert_eq!(
            by_field(BehaviorField::SessionCount),
            ColumnBinding::Guessed {
                field: BehaviorField::SessionCount,
                key: "est_session_count__avg".into(),
                pattern: "session_count".into()
            }
        );
        assert_eq!(by_field(BehaviorField::AvgSessionDuration).key(), Some("est_session_duration__avg"));
        assert_eq!(by_field(BehaviorField::AvgActiveDays).key(), Some("est_avg_active_days__avg"));
        assert!(matches!(by_field(BehaviorField::UserShare), ColumnBinding::Missing { .. }));
    }

    #[test]
    fn test_header_key_not_claimed_twice() {
        let headers = vec![header("k_users", "Active Users")];
        let row_keys = ["k_users"];
        let bindings = bind_columns(&BehaviorProfile::reduced(), &headers, &row_keys);
        assert_eq!(bindings.iter().filter(|b| b.key() == Some("k_users")).count(), 1);
    }

    #[rstest::rstest]
    #[case("", true)]
    #[case("-", true)]
    #[case("N/A", true)]
    #[case("NaN%", true)]
    #[case("12%", false)]
    fn test_placeholders(#[case] text: &str, #[case] expected: bool) {
        assert_eq!(is_placeholder(text), expected);
    }

    #[test]
    fn test_behavior_extraction() {
        let headers = r#"<div data-header-key="est_active_users__aggr"><div class="TableHeader__CellContent-sc-194ff62d-3">活跃用户</div></div>
            <div data-header-key="est_share__aggr"><div class="TableHeader__CellContent-sc-194ff62d-3"><span class="Tooltip__ContentWrapper-sc-a710cec5-0">用户份额</span></div></div>
            <div data-header-key="est_time__avg"><div class="TableHeader__CellContent-sc-194ff62d-3">平均时间/用户</div></div>"#;
        let cells = r#"<div data-key="est_active_users__aggr"><span>5万</span></div>
            <div data-key="est_share__aggr"><div><span>12%</span></div></div>
            <div data-key="est_time__avg"><span>NaN</span><span>1h 5m</span></div>"#;
        let doc = Document::parse(&behavior_html(headers, cells));
        let extraction = Extractor::new().behavior(&doc, Platform::Ios);
        let report = extraction.report;

        assert_eq!(report.application, "PolyBuzz");
        assert_eq!(report.rows.len(), 2);
        let global = &report.rows[0];
        assert_eq!(global.country, "全球");
        assert_eq!(global.get(BehaviorField::ActiveUsers), Some(&Normalized::Integer(50_000)));
        assert_eq!(global.get(BehaviorField::UserShare), Some(&Normalized::Float(12.0)));
        assert_eq!(global.get(BehaviorField::AvgTimePerUser), Some(&Normalized::Integer(3900)));
        assert_eq!(global.get(BehaviorField::Day1Retention), None);

        let us = &report.rows[1];
        assert_eq!(us.get(BehaviorField::ActiveUsers), Some(&Normalized::Text("-".into())));
        assert_eq!(us.get(BehaviorField::UserShare), Some(&Normalized::Text("N/A".into())));

        let missing = extraction.bindings.iter().filter(|b| matches!(b, ColumnBinding::Missing { .. })).count();
        assert_eq!(missing, 4);
    }

    #[test]
    fn test_missing_behavior_table() {
        let doc = Document::parse("<html><head><title>X | 使用行为</title></head></html>");
        let extraction = Extractor::new().behavior(&doc, Platform::Android);
        assert!(extraction.report.rows.is_empty());
        assert!(extraction.bindings.is_empty());
    }

    #[test]
    fn test_combine_behavior() {
        let report = |app: &str| BehaviorReport { application: app.into(), platform: "Google Play".into(), rows: vec![] };
        let combined = combine_behavior([(Platform::Android, report("A")), (Platform::Ios, report("B"))]).unwrap();
        assert_eq!(combined.application, "A");
        assert_eq!(combined.platforms.keys().collect::<Vec<_>>(), vec!["Android", "iOS"]);
        assert!(combine_behavior(Vec::new()).is_none());
    }
}
