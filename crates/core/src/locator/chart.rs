//! Line-chart series lookup.
//!
//! The download trend chart is an SVG with one `g.highcharts-series-N` per
//! line and a sibling `g.highcharts-markers.highcharts-series-N` holding the
//! data points. A line belongs to a platform by its stroke colour; every point
//! carries an accessibility label of the form
//! `May 2025, 1,234,567. PolyBuzz (Google Play).`

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::locator::{Locator, Role};
use crate::parse::{Document, Element};
use crate::record::Platform;

static POINT_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(January|February|March|April|May|June|July|August|September|October|November|December) (\d{4}), ([\d,]+)\. (.*)",
    )
    .expect("point label pattern is valid")
});

static STORE_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\((?:Google Play|iOS)\)$").expect("store suffix pattern is valid"));

static SERIES_INDEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^highcharts-series-(\d+)$").expect("series index pattern is valid"));

/// Stroke colour to platform mapping. Colours compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChartPalette {
    colors: BTreeMap<String, Platform>,
}

impl Default for ChartPalette {
    fn default() -> Self {
        let mut colors = BTreeMap::new();
        colors.insert("#41A481".to_string(), Platform::Android);
        colors.insert("#0099F9".to_string(), Platform::Ios);
        Self { colors }
    }
}

impl ChartPalette {
    pub fn new(colors: impl IntoIterator<Item = (String, Platform)>) -> Self {
        Self { colors: colors.into_iter().collect() }
    }

    /// Platform drawn in `stroke`, [`Platform::Unknown`] for unmapped colours.
    pub fn platform_for(&self, stroke: &str) -> Platform {
        let stroke = stroke.trim();
        self.colors
            .iter()
            .find(|(color, _)| color.eq_ignore_ascii_case(stroke))
            .map(|(_, platform)| *platform)
            .unwrap_or(Platform::Unknown)
    }
}

/// A parsed chart point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartPoint {
    pub month: String,
    pub year: i32,
    pub downloads: i64,
    /// Application part of the label, store suffix and trailing period removed.
    /// Empty when the label carried no name.
    pub app_label: String,
}

/// One visible chart line and its points.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSeries {
    pub index: u32,
    pub stroke: String,
    pub platform: Platform,
    pub points: Vec<ChartPoint>,
}

/// Parses a point's accessibility label.
///
/// Returns `None` when the label does not follow the
/// `<Month> <Year>, <count>. <app>` shape.
pub fn parse_point_label(label: &str) -> Option<ChartPoint> {
    let caps = POINT_LABEL_RE.captures(label)?;
    let year = caps[2].parse::<i32>().ok()?;
    let downloads = caps[3].replace(',', "").parse::<i64>().ok()?;

    Some(ChartPoint {
        month: caps[1].to_string(),
        year,
        downloads,
        app_label: strip_app_label(&caps[4]),
    })
}

fn strip_app_label(raw: &str) -> String {
    let mut label = raw.trim();
    if let Some(stripped) = label.strip_suffix('.') {
        label = stripped.trim_end();
    }
    STORE_SUFFIX_RE.replace(label, "").trim().to_string()
}

/// Application name for a point: the cleaned label, or `fallback` when the
/// label had no name left after stripping.
pub fn clean_app_label(raw: &str, fallback: &str) -> String {
    let cleaned = strip_app_label(raw);
    if cleaned.is_empty() { fallback.to_string() } else { cleaned }
}

fn series_index(el: Element<'_>) -> Option<u32> {
    el.classes()
        .find_map(|c| SERIES_INDEX_RE.captures(c).and_then(|caps| caps[1].parse().ok()))
}

fn is_visible_line(path: Element<'_>) -> bool {
    let Some(stroke) = path.attr("stroke") else {
        return false;
    };
    if stroke.trim().is_empty() || stroke == "none" {
        return false;
    }
    let width = path
        .attr("stroke-width")
        .and_then(|w| w.trim().parse::<f64>().ok())
        .unwrap_or(1.0);
    width > 0.0
}

impl Locator {
    /// Every visible line series of the document's chart.
    ///
    /// Lines with zero stroke width (baselines, hidden series) are skipped;
    /// points whose label does not parse are dropped with a debug event.
    pub fn chart_series(&self, doc: &Document, palette: &ChartPalette) -> Vec<ChartSeries> {
        let Some(group) = self.find_in(doc, Role::ChartSeriesGroup) else {
            debug!("chart series group not found");
            return Vec::new();
        };

        let all: Vec<Element<'_>> = group.descendants().filter(|el| el.tag_name() == "g").collect();

        let mut series = Vec::new();
        for line in all.iter().filter(|g| g.has_class("highcharts-series") && g.has_class("highcharts-line-series")) {
            let Some(index) = series_index(*line) else {
                continue;
            };
            let Some(path) = line
                .descendants()
                .find(|el| el.tag_name() == "path" && el.has_class("highcharts-graph"))
            else {
                continue;
            };
            if !is_visible_line(path) {
                debug!(index, "skipping invisible chart line");
                continue;
            }

            let stroke = path.attr("stroke").unwrap_or_default().to_string();
            let platform = palette.platform_for(&stroke);
            if platform == Platform::Unknown {
                warn!(%stroke, index, "chart line colour not in palette");
            }

            let marker_class = format!("highcharts-series-{}", index);
            let points = all
                .iter()
                .find(|g| g.has_class("highcharts-markers") && g.has_class(&marker_class))
                .map(|markers| {
                    markers
                        .descendants()
                        .filter(|el| el.has_class("highcharts-point"))
                        .filter_map(|el| el.attr("aria-label"))
                        .filter_map(|label| {
                            let point = parse_point_label(label);
                            if point.is_none() {
                                debug!(label, "unrecognised chart point label");
                            }
                            point
                        })
                        .collect()
                })
                .unwrap_or_default();

            series.push(ChartSeries { index, stroke, platform, points });
        }
        series
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const CHART: &str = r##"
        <svg><g class="highcharts-series-group">
            <g class="highcharts-series highcharts-series-0 highcharts-line-series">
                <path class="highcharts-graph" stroke="#cccccc" stroke-width="0"></path>
            </g>
            <g class="highcharts-series highcharts-series-1 highcharts-line-series">
                <path class="highcharts-graph" stroke="#41a481" stroke-width="2"></path>
            </g>
            <g class="highcharts-markers highcharts-series-1 highcharts-line-series highcharts-tracker">
                <path class="highcharts-point" aria-label="April 2025, 1,200,000. PolyBuzz (Google Play)."></path>
                <path class="highcharts-point" aria-label="May 2025, 1,350,000. PolyBuzz (Google Play)."></path>
                <path class="highcharts-point" aria-label="garbage"></path>
            </g>
            <g class="highcharts-series highcharts-series-2 highcharts-line-series">
                <path class="highcharts-graph" stroke="#0099F9"></path>
            </g>
            <g class="highcharts-markers highcharts-series-2 highcharts-line-series highcharts-tracker">
                <path class="highcharts-point" aria-label="May 2025, 800,000. ."></path>
            </g>
        </g></svg>
    "##;

    #[test]
    fn test_palette_is_case_insensitive() {
        let palette = ChartPalette::default();
        assert_eq!(palette.platform_for("#41a481"), Platform::Android);
        assert_eq!(palette.platform_for("#0099F9"), Platform::Ios);
        assert_eq!(palette.platform_for("#000000"), Platform::Unknown);
    }

    #[rstest]
    #[case("May 2025, 1,234,567. PolyBuzz (Google Play).", "PolyBuzz")]
    #[case("May 2025, 1,234,567. PolyBuzz (iOS)", "PolyBuzz")]
    #[case("May 2025, 1,234,567. Talkie: Soulful AI.", "Talkie: Soulful AI")]
    #[case("May 2025, 1,234,567. .", "")]
    fn test_parse_point_label(#[case] label: &str, #[case] app: &str) {
        let point = parse_point_label(label).unwrap();
        assert_eq!(point.month, "May");
        assert_eq!(point.year, 2025);
        assert_eq!(point.downloads, 1_234_567);
        assert_eq!(point.app_label, app);
    }

    #[test]
    fn test_unparseable_label() {
        assert!(parse_point_label("Q2 2025: lots").is_none());
    }

    #[test]
    fn test_clean_app_label_falls_back() {
        assert_eq!(clean_app_label(" (iOS).", "Known App"), "Known App");
        assert_eq!(clean_app_label("Other (iOS).", "Known App"), "Other");
    }

    #[test]
    fn test_chart_series_skips_zero_width_lines() {
        let doc = Document::parse(CHART);
        let locator = Locator::default();
        let series = locator.chart_series(&doc, &ChartPalette::default());

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].index, 1);
        assert_eq!(series[0].platform, Platform::Android);
        assert_eq!(series[0].points.len(), 2);
        assert_eq!(series[0].points[1].downloads, 1_350_000);

        assert_eq!(series[1].platform, Platform::Ios);
        assert_eq!(series[1].points[0].app_label, "");
    }

    #[test]
    fn test_no_chart_is_empty() {
        let doc = Document::parse("<html><body></body></html>");
        assert!(Locator::default().chart_series(&doc, &ChartPalette::default()).is_empty());
    }
}
