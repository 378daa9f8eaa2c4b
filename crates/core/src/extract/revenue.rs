//! Revenue-by-device extraction.

use tracing::{info, warn};

use crate::extract::Extractor;
use crate::locator::TableKind;
use crate::normalize::normalize;
use crate::parse::Document;
use crate::record::{RevenueReport, RevenueRow};

/// `data-key` of the average revenue column.
pub const AVERAGE_REVENUE_KEY: &str = "est_revenue__avg";

impl Extractor {
    /// Extracts the revenue family: one row per device, tagged with the
    /// document's inferred application and storefront.
    pub fn revenue(&self, doc: &Document) -> RevenueReport {
        let identity = doc.identity();
        let mut report = RevenueReport { application: identity.application, platform: identity.platform, rows: Vec::new() };

        let Some(table) = self.locator().table(doc, TableKind::Generic) else {
            warn!("revenue table not found");
            return report;
        };

        for pair in table.paired_rows().rows {
            let device = table.text_component(pair.fixed).unwrap_or_default();
            let average_store_revenue = pair.cell(AVERAGE_REVENUE_KEY).map(|cell| normalize(&cell.text_trimmed()));
            report.rows.push(RevenueRow { device, average_store_revenue });
        }

        info!(application = %report.application, rows = report.rows.len(), "revenue extracted");
        report
    }
}
