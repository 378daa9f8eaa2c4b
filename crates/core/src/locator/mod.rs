//! Declarative region lookup over a dashboard document.
//!
//! Extractors never spell out markup. They ask the [`Locator`] for a region
//! by [`Role`] ("table wrapper", "fixed column group", "metrics header row",
//! ...) and get back an element or nothing. The CSS behind each role lives in
//! [`Selectors`], which is plain configuration and can be overridden from a
//! config file when the dashboard markup drifts.
//!
//! Wide tables render as two independently virtualised halves: a *fixed*
//! group carrying identity columns and a *scrollable* group carrying metric
//! columns. [`Table::paired_rows`] correlates them by row index.

pub mod chart;

use scraper::Selector;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::parse::{Document, Element, compile};
use crate::Result;

/// Structural role of a region inside a dashboard page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Outer wrapper of an untyped data table.
    TableWrapper,
    /// Column group with identity columns (app, device, country, month).
    FixedColumnGroup,
    /// Column group with metric columns.
    ScrollableColumnGroup,
    /// Data row inside either column group.
    Row,
    /// Header row above the fixed group.
    StickyHeaderRow,
    /// Header row above the scrollable group.
    MetricsHeaderRow,
    /// Header cell keyed by a `data-header-key` attribute.
    HeaderCell,
    /// Text container of a header cell.
    HeaderContent,
    /// Tooltip body that holds the full header label.
    Tooltip,
    /// Rendered value inside a metric cell.
    DisplayValue,
    /// Placeholder shown for cells without data.
    Placeholder,
    /// Generic text node of identity cells.
    TextComponent,
    /// Store icon of a row.
    StoreBadge,
    /// SVG group holding every chart series.
    ChartSeriesGroup,
}

/// CSS selector for every [`Role`], plus the `data-table-type` values of the
/// typed tables.
///
/// Defaults match the hashed styled-component class names of the dashboard by
/// their stable prefix, so a rebuild that changes the hash suffix keeps
/// working.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub table_wrapper: String,
    pub fixed_group: String,
    pub scrollable_group: String,
    pub row: String,
    pub sticky_header_row: String,
    pub metrics_header_row: String,
    pub header_cell: String,
    pub header_content: String,
    pub tooltip: String,
    pub display_value: String,
    pub placeholder: String,
    pub text_component: String,
    pub store_badge: String,
    pub chart_series_group: String,
    /// `data-table-type` of the per-country behavior table.
    pub behavior_table_type: String,
    /// `data-table-type` of the monthly retention table.
    pub monthly_retention_table_type: String,
    /// `data-table-type` of the overall (publisher) retention table.
    pub overall_retention_table_type: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            table_wrapper: r#"div[class*="Table__TableWrapper"]"#.to_string(),
            fixed_group: "div.ReactVirtualized__Table.FixedStyledTable".to_string(),
            scrollable_group: "div.ReactVirtualized__Table.StyledTable:not(.FixedStyledTable)".to_string(),
            row: "div.ReactVirtualized__Table__row[aria-rowindex]".to_string(),
            sticky_header_row: r#"div[class*="TableHeader__StickyTableRow"]"#.to_string(),
            metrics_header_row: r#"div[class*="TableHeader__TableRow"]"#.to_string(),
            header_cell: "div[data-header-key]".to_string(),
            header_content: r#"[class*="TableHeader__CellContent"]"#.to_string(),
            tooltip: r#"span[class*="Tooltip__ContentWrapper"]"#.to_string(),
            display_value: r#"span[class*="DataMetric__DisplayValue"]"#.to_string(),
            placeholder: r#"span[class*="NA__Wrapper"]"#.to_string(),
            text_component: r#"div[data-testid="text-component"]"#.to_string(),
            store_badge: r#"span[data-testid="store-image"]"#.to_string(),
            chart_series_group: "g.highcharts-series-group".to_string(),
            behavior_table_type: "table_change(__table__$app_usage_country)".to_string(),
            monthly_retention_table_type: "app_user_retention_table".to_string(),
            overall_retention_table_type: "publisher_apps_user_retention_table".to_string(),
        }
    }
}

/// Which table of a page to locate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// First generic table wrapper (downloads overview, revenue by device).
    Generic,
    Behavior,
    MonthlyRetention,
    OverallRetention,
}

/// Compiled selectors answering role queries.
#[derive(Debug, Clone)]
pub struct Locator {
    table_wrapper: Selector,
    fixed_group: Selector,
    scrollable_group: Selector,
    row: Selector,
    sticky_header_row: Selector,
    metrics_header_row: Selector,
    header_cell: Selector,
    header_content: Selector,
    tooltip: Selector,
    display_value: Selector,
    placeholder: Selector,
    text_component: Selector,
    store_badge: Selector,
    chart_series_group: Selector,
    behavior_table: Selector,
    monthly_retention_table: Selector,
    overall_retention_table: Selector,
}

impl Locator {
    /// Compiles a selector table.
    ///
    /// # Errors
    ///
    /// Returns [`DashError::HtmlParseError`](crate::DashError::HtmlParseError)
    /// naming the first invalid selector.
    pub fn new(selectors: &Selectors) -> Result<Self> {
        Ok(Self {
            table_wrapper: compile(&selectors.table_wrapper)?,
            fixed_group: compile(&selectors.fixed_group)?,
            scrollable_group: compile(&selectors.scrollable_group)?,
            row: compile(&selectors.row)?,
            sticky_header_row: compile(&selectors.sticky_header_row)?,
            metrics_header_row: compile(&selectors.metrics_header_row)?,
            header_cell: compile(&selectors.header_cell)?,
            header_content: compile(&selectors.header_content)?,
            tooltip: compile(&selectors.tooltip)?,
            display_value: compile(&selectors.display_value)?,
            placeholder: compile(&selectors.placeholder)?,
            text_component: compile(&selectors.text_component)?,
            store_badge: compile(&selectors.store_badge)?,
            chart_series_group: compile(&selectors.chart_series_group)?,
            behavior_table: compile(&typed_table(&selectors.behavior_table_type))?,
            monthly_retention_table: compile(&typed_table(&selectors.monthly_retention_table_type))?,
            overall_retention_table: compile(&typed_table(&selectors.overall_retention_table_type))?,
        })
    }

    fn selector(&self, role: Role) -> &Selector {
        match role {
            Role::TableWrapper => &self.table_wrapper,
            Role::FixedColumnGroup => &self.fixed_group,
            Role::ScrollableColumnGroup => &self.scrollable_group,
            Role::Row => &self.row,
            Role::StickyHeaderRow => &self.sticky_header_row,
            Role::MetricsHeaderRow => &self.metrics_header_row,
            Role::HeaderCell => &self.header_cell,
            Role::HeaderContent => &self.header_content,
            Role::Tooltip => &self.tooltip,
            Role::DisplayValue => &self.display_value,
            Role::Placeholder => &self.placeholder,
            Role::TextComponent => &self.text_component,
            Role::StoreBadge => &self.store_badge,
            Role::ChartSeriesGroup => &self.chart_series_group,
        }
    }

    /// First descendant of `scope` playing `role`.
    pub fn find<'a>(&self, scope: Element<'a>, role: Role) -> Option<Element<'a>> {
        scope.select_first(self.selector(role))
    }

    /// Every descendant of `scope` playing `role`, in document order.
    pub fn find_all<'a>(&self, scope: Element<'a>, role: Role) -> Vec<Element<'a>> {
        scope.select_all(self.selector(role))
    }

    /// First region of the whole document playing `role`.
    pub fn find_in<'a>(&self, doc: &'a Document, role: Role) -> Option<Element<'a>> {
        doc.select_first(self.selector(role))
    }

    /// Locates a table of the given kind.
    ///
    /// Returns `None` when the wrapper is absent; that is an ordinary outcome
    /// for partially saved pages.
    pub fn table<'a, 'l>(&'l self, doc: &'a Document, kind: TableKind) -> Option<Table<'a, 'l>> {
        let selector = match kind {
            TableKind::Generic => &self.table_wrapper,
            TableKind::Behavior => &self.behavior_table,
            TableKind::MonthlyRetention => &self.monthly_retention_table,
            TableKind::OverallRetention => &self.overall_retention_table,
        };

        let wrapper = doc.select_first(selector);
        if wrapper.is_none() {
            debug!(?kind, "table wrapper not found");
        }
        wrapper.map(|wrapper| Table { wrapper, locator: self })
    }

    /// Visible label of a header cell.
    ///
    /// Header text may be wrapped in a tooltip body that carries the full
    /// label; it wins over the cell's own text.
    pub fn header_label(&self, cell: Element<'_>) -> String {
        if let Some(tip) = self.find(cell, Role::Tooltip) {
            return tip.text_trimmed();
        }
        if let Some(content) = self.find(cell, Role::HeaderContent) {
            return content.text_trimmed();
        }
        cell.text_trimmed()
    }

    /// Rendered value of a metric cell.
    ///
    /// Prefers the display-value span, then the placeholder span, then the
    /// cell's own text.
    pub fn cell_value(&self, cell: Element<'_>) -> String {
        if let Some(value) = self.find(cell, Role::DisplayValue) {
            return value.text_trimmed();
        }
        if let Some(placeholder) = self.find(cell, Role::Placeholder) {
            return placeholder.text_trimmed();
        }
        cell.text_trimmed()
    }
}

impl Default for Locator {
    fn default() -> Self {
        Self::new(&Selectors::default()).expect("default selectors are valid")
    }
}

fn typed_table(table_type: &str) -> String {
    format!(r#"div[data-table-type="{}"]"#, table_type.replace('"', "\\\""))
}

/// One header cell: its data key (if any) and its visible label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderCell {
    pub key: Option<String>,
    pub label: String,
}

/// Row `index` of the fixed group paired with row `index` of the scrollable
/// group.
#[derive(Debug, Clone, Copy)]
pub struct RowPair<'a> {
    pub index: usize,
    pub fixed: Element<'a>,
    pub scrollable: Element<'a>,
}

impl<'a> RowPair<'a> {
    /// Metric cell of this row keyed by its `data-key` column attribute.
    ///
    /// Column order in the scrollable group is not stable, so cells are
    /// always addressed by key, never by position.
    pub fn cell(&self, data_key: &str) -> Option<Element<'a>> {
        self.scrollable.find_by_attr("data-key", data_key)
    }

    /// Identity cell of this row keyed by its `data-testid`.
    pub fn fixed_cell(&self, test_id: &str) -> Option<Element<'a>> {
        self.fixed.find_by_attr("data-testid", test_id)
    }

    /// Every `data-key` present on this row's metric cells.
    pub fn data_keys(&self) -> Vec<&'a str> {
        self.scrollable.descendants().filter_map(|el| el.attr("data-key")).collect()
    }
}

/// Outcome of row pairing, including the raw group sizes.
#[derive(Debug, Clone)]
pub struct PairedRows<'a> {
    pub rows: Vec<RowPair<'a>>,
    pub fixed_count: usize,
    pub scrollable_count: usize,
}

impl PairedRows<'_> {
    fn empty() -> Self {
        Self { rows: Vec::new(), fixed_count: 0, scrollable_count: 0 }
    }

    /// Rows dropped because one group rendered more rows than the other.
    pub fn dropped(&self) -> usize {
        self.fixed_count.max(self.scrollable_count) - self.rows.len()
    }
}

/// Pairs two row lists by index, truncating to the shorter one.
///
/// Divergent counts usually mean the dashboard rendered partially. The extra
/// rows are dropped silently; the count is only reported through logging.
pub fn pair_by_index<T>(fixed: Vec<T>, scrollable: Vec<T>) -> Vec<(T, T)> {
    fixed.into_iter().zip(scrollable).collect()
}

/// A located table region.
#[derive(Debug, Clone, Copy)]
pub struct Table<'a, 'l> {
    wrapper: Element<'a>,
    locator: &'l Locator,
}

impl<'a> Table<'a, '_> {
    pub fn wrapper(&self) -> Element<'a> {
        self.wrapper
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.wrapper.attr(name)
    }

    /// Header cells of the sticky identity-header row.
    pub fn sticky_header(&self) -> Vec<HeaderCell> {
        self.header_row(Role::StickyHeaderRow)
    }

    /// Header cells of the metrics-header row.
    pub fn metrics_header(&self) -> Vec<HeaderCell> {
        self.header_row(Role::MetricsHeaderRow)
    }

    /// Every keyed header cell of the table, regardless of row.
    pub fn header_cells(&self) -> Vec<HeaderCell> {
        self.locator
            .find_all(self.wrapper, Role::HeaderCell)
            .into_iter()
            .map(|cell| HeaderCell {
                key: cell.attr("data-header-key").map(str::to_string),
                label: self.locator.header_label(cell),
            })
            .collect()
    }

    fn header_row(&self, role: Role) -> Vec<HeaderCell> {
        let Some(row) = self.locator.find(self.wrapper, role) else {
            debug!(?role, "header row not found");
            return Vec::new();
        };

        let keyed = self.locator.find_all(row, Role::HeaderCell);
        if !keyed.is_empty() {
            return keyed
                .into_iter()
                .map(|cell| HeaderCell {
                    key: cell.attr("data-header-key").map(str::to_string),
                    label: self.locator.header_label(cell),
                })
                .collect();
        }

        self.locator
            .find_all(row, Role::HeaderContent)
            .into_iter()
            .map(|cell| HeaderCell { key: None, label: self.locator.header_label(cell) })
            .collect()
    }

    /// Correlates fixed and scrollable rows by index.
    ///
    /// A missing column group yields no rows.
    pub fn paired_rows(&self) -> PairedRows<'a> {
        let fixed = self.locator.find(self.wrapper, Role::FixedColumnGroup);
        let scrollable = self.locator.find(self.wrapper, Role::ScrollableColumnGroup);

        let (Some(fixed), Some(scrollable)) = (fixed, scrollable) else {
            debug!("fixed or scrollable column group missing");
            return PairedRows::empty();
        };

        let fixed_rows = self.locator.find_all(fixed, Role::Row);
        let scroll_rows = self.locator.find_all(scrollable, Role::Row);
        let fixed_count = fixed_rows.len();
        let scrollable_count = scroll_rows.len();
        info!(fixed = fixed_count, scrollable = scrollable_count, "table rows found");

        let rows = pair_by_index(fixed_rows, scroll_rows)
            .into_iter()
            .enumerate()
            .map(|(index, (fixed, scrollable))| RowPair { index, fixed, scrollable })
            .collect();

        PairedRows { rows, fixed_count, scrollable_count }
    }

    /// Text of the first generic text component inside `scope`.
    pub fn text_component(&self, scope: Element<'a>) -> Option<String> {
        self.locator.find(scope, Role::TextComponent).map(|el| el.text_trimmed())
    }

    /// Store badge `type` attribute of a fixed row.
    pub fn store_badge(&self, scope: Element<'a>) -> Option<&'a str> {
        self.locator.find(scope, Role::StoreBadge).and_then(|el| el.attr("type"))
    }

    pub fn locator(&self) -> &Locator {
        self.locator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_html(fixed: usize, scrollable: usize) -> String {
        let fixed_rows: String = (0..fixed)
            .map(|i| {
                format!(
                    r#"<div class="ReactVirtualized__Table__row" aria-rowindex="{i}"><div data-testid="text-component">App {i}</div></div>"#
                )
            })
            .collect();
        let scroll_rows: String = (0..scrollable)
            .map(|i| {
                format!(
                    r#"<div class="ReactVirtualized__Table__row" aria-rowindex="{i}"><div data-key="est_download__sum">{i}万</div></div>"#
                )
            })
            .collect();

        format!(
            r#"<html><body>
            <div class="Table__TableWrapper-sc-5979c7d8-0 kXyz">
                <div class="TableHeader__StickyTableRow-sc-194ff62d-5 abc">
                    <div data-header-key="product_id"><div class="TableHeader__CellContent-sc-194ff62d-3">应用</div></div>
                </div>
                <div class="TableHeader__TableRow-sc-194ff62d-4 bAcynv">
                    <div data-header-key="est_download__sum">
                        <div class="TableHeader__CellContent-sc-194ff62d-3">
                            <span class="Tooltip__ContentWrapper-sc-a710cec5-0">下载</span>
                            <svg></svg>
                        </div>
                    </div>
                </div>
                <div class="ReactVirtualized__Table FixedStyledTable">{fixed_rows}</div>
                <div class="ReactVirtualized__Table StyledTable">{scroll_rows}</div>
            </div>
            </body></html>"#
        )
    }

    #[test]
    fn test_pairing_truncates_to_shorter_group() {
        let doc = Document::parse(&table_html(5, 3));
        let locator = Locator::default();
        let table = locator.table(&doc, TableKind::Generic).unwrap();
        let paired = table.paired_rows();

        assert_eq!(paired.rows.len(), 3);
        assert_eq!(paired.fixed_count, 5);
        assert_eq!(paired.scrollable_count, 3);
        assert_eq!(paired.dropped(), 2);
        assert_eq!(table.text_component(paired.rows[2].fixed).as_deref(), Some("App 2"));
    }

    #[test]
    fn test_pair_by_index_truncates() {
        let pairs = pair_by_index(vec![1, 2, 3, 4, 5], vec![10, 20, 30]);
        assert_eq!(pairs, vec![(1, 10), (2, 20), (3, 30)]);
        assert!(pair_by_index(Vec::<i32>::new(), vec![1]).is_empty());
    }

    #[test]
    fn test_cell_lookup_by_data_key() {
        let doc = Document::parse(&table_html(2, 2));
        let locator = Locator::default();
        let table = locator.table(&doc, TableKind::Generic).unwrap();
        let paired = table.paired_rows();

        let cell = paired.rows[1].cell("est_download__sum").unwrap();
        assert_eq!(locator.cell_value(cell), "1万");
        assert!(paired.rows[1].cell("est_revenue__sum").is_none());
    }

    #[test]
    fn test_header_rows_prefer_tooltip() {
        let doc = Document::parse(&table_html(1, 1));
        let locator = Locator::default();
        let table = locator.table(&doc, TableKind::Generic).unwrap();

        let sticky = table.sticky_header();
        assert_eq!(sticky, vec![HeaderCell { key: Some("product_id".into()), label: "应用".into() }]);

        let metrics = table.metrics_header();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].label, "下载");
        assert_eq!(table.header_cells().len(), 2);
    }

    #[test]
    fn test_missing_table_is_none() {
        let doc = Document::parse("<html><body><p>nothing</p></body></html>");
        let locator = Locator::default();
        assert!(locator.table(&doc, TableKind::Generic).is_none());
        assert!(locator.table(&doc, TableKind::Behavior).is_none());
    }

    #[test]
    fn test_missing_column_group_yields_no_rows() {
        let html = r#"<div class="Table__TableWrapper-sc-1"><div class="ReactVirtualized__Table FixedStyledTable">
            <div class="ReactVirtualized__Table__row" aria-rowindex="1"></div></div></div>"#;
        let doc = Document::parse(html);
        let locator = Locator::default();
        let table = locator.table(&doc, TableKind::Generic).unwrap();
        assert!(table.paired_rows().rows.is_empty());
    }

    #[test]
    fn test_typed_table_selector() {
        let html = r#"<div data-table-type="table_change(__table__$app_usage_country)"></div>"#;
        let doc = Document::parse(html);
        let locator = Locator::default();
        assert!(locator.table(&doc, TableKind::Behavior).is_some());
    }

    #[test]
    fn test_invalid_selector_is_rejected() {
        let selectors = Selectors { row: "[[broken".to_string(), ..Default::default() };
        assert!(Locator::new(&selectors).is_err());
    }

    #[test]
    fn test_selectors_partial_override_from_json() {
        let selectors: Selectors = serde_json::from_str(r#"{"row": "div.row"}"#).unwrap();
        assert_eq!(selectors.row, "div.row");
        assert_eq!(selectors.fixed_group, Selectors::default().fixed_group);
    }
}
