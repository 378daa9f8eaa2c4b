//! Application and storefront inference from page metadata.
//!
//! Saved dashboard pages rarely state the application or store explicitly
//! in their data tables, so both are recovered from the surrounding chrome.
//!
//! ```rust
//! use dashmetrics_core::parse::Document;
//!
//! let doc = Document::parse(
//!     r#"<html><head><title>PolyBuzz | 收入</title>
//!        <meta name="description" content="Google Play revenue"></head></html>"#,
//! );
//! let identity = doc.identity();
//! assert_eq!(identity.application, "PolyBuzz");
//! assert_eq!(identity.platform, "Google Play");
//! ```

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::parse::Document;
use crate::record::{Platform, UNKNOWN_PRODUCT};

/// Heading fragments that name a dashboard page type rather than an app.
const PAGE_TYPE_LABELS: &[&str] = &["收入", "用户留存", "留存", "使用行为", "revenue", "retention", "behavior", "behaviour"];

/// Inferred document identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub application: String,
    /// Store label (`"Google Play"`, `"App Store"` or `"Unknown Platform"`).
    pub platform: String,
}

impl Identity {
    /// Platform bucket this document routes to.
    pub fn bucket(&self) -> Platform {
        Platform::bucket_for_store(&self.platform)
    }
}

// Storefront names must stand alone as ASCII words; CJK neighbours still count
// as separators so that `iOS用户` matches while `ratios` does not.
static GOOGLE_STORE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z0-9])(?:google play|android)(?:$|[^a-z0-9])").expect("google store pattern is valid")
});
static APPLE_STORE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z0-9])(?:app store|ios)(?:$|[^a-z0-9])").expect("apple store pattern is valid")
});

/// Matches text against the two storefront name sets.
///
/// Google storefront names win when both appear.
fn match_store(text: &str) -> Option<Platform> {
    if GOOGLE_STORE_RE.is_match(text) {
        Some(Platform::Android)
    } else if APPLE_STORE_RE.is_match(text) {
        Some(Platform::Ios)
    } else {
        None
    }
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

impl Document {
    /// Resolves both application name and storefront.
    pub fn identity(&self) -> Identity {
        Identity { application: self.resolve_application(), platform: self.resolve_platform().to_string() }
    }

    /// Application name with priority fallback:
    /// 1. `<title>` split on `|` (or `_`)
    /// 2. Breadcrumb navigation, second-to-last link
    /// 3. First `<h1>` that is not a page-type label
    /// 4. Meta `title` / `og:title` split on `|`
    /// 5. First span or div of an `app-info` / `product-info` block
    ///
    /// Falls back to [`UNKNOWN_PRODUCT`].
    pub fn resolve_application(&self) -> String {
        if let Some(title) = self.title() {
            let separator = if title.contains('|') {
                Some('|')
            } else if title.contains('_') {
                Some('_')
            } else {
                None
            };
            if let Some(sep) = separator
                && let Some(head) = title.split(sep).next()
                && let Some(name) = non_empty(head)
            {
                debug!(%name, "application from title");
                return name;
            }
        }

        if let Ok(crumbs) = self.select("nav.breadcrumb, div.breadcrumb")
            && let Some(crumb) = crumbs.first()
            && let Ok(links) = crumb.select("a")
            && links.len() > 1
            && let Some(name) = non_empty(&links[links.len() - 2].text_trimmed())
        {
            debug!(%name, "application from breadcrumb");
            return name;
        }

        if let Ok(headings) = self.select("h1")
            && let Some(first) = headings.first()
        {
            let text = first.text_trimmed();
            let lower = text.to_lowercase();
            if !PAGE_TYPE_LABELS.iter().any(|label| lower.contains(label))
                && let Some(name) = non_empty(&text)
            {
                debug!(%name, "application from heading");
                return name;
            }
        }

        if let Ok(metas) = self.select(r#"meta[name="title"], meta[property="og:title"]"#)
            && let Some(meta) = metas.first()
            && let Some(content) = meta.attr("content")
            && content.contains('|')
            && let Some(name) = content.split('|').next().and_then(non_empty)
        {
            debug!(%name, "application from meta title");
            return name;
        }

        if let Ok(blocks) = self.select(r#"div[class*="app-info"], div[class*="product-info"]"#)
            && let Some(block) = blocks.first()
            && let Ok(inner) = block.select("span, div")
            && let Some(first) = inner.first()
            && let Some(name) = non_empty(&first.text_trimmed())
        {
            debug!(%name, "application from info block");
            return name;
        }

        UNKNOWN_PRODUCT.to_string()
    }

    /// Storefront label with priority fallback:
    /// 1. Any meta `content`
    /// 2. Divs and spans whose class mentions `platform` or `store`
    /// 3. Whole-document text
    ///
    /// Falls back to `"Unknown Platform"`.
    pub fn resolve_platform(&self) -> &'static str {
        if let Ok(metas) = self.select("meta[content]") {
            for meta in metas {
                if let Some(platform) = meta.attr("content").and_then(match_store) {
                    return platform.store_label();
                }
            }
        }

        if let Ok(elements) = self.select("div[class], span[class]") {
            for el in elements {
                let classes = el.attr("class").unwrap_or_default().to_lowercase();
                if (classes.contains("platform") || classes.contains("store"))
                    && let Some(platform) = match_store(&el.text())
                {
                    debug!(%classes, "platform from badge");
                    return platform.store_label();
                }
            }
        }

        if let Some(platform) = match_store(&self.text_content()) {
            return platform.store_label();
        }

        Platform::Unknown.store_label()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("<title>PolyBuzz | 收入</title>", "PolyBuzz")]
    #[case("<title>Talkie_用户留存</title>", "Talkie")]
    #[case(
        r#"<title>Dashboard</title></head><body><nav class="breadcrumb"><a>Home</a><a>Chai</a><a>Revenue</a></nav>"#,
        "Chai"
    )]
    #[case("<title>Dashboard</title></head><body><h1>Character AI</h1>", "Character AI")]
    #[case(
        r#"<meta property="og:title" content="Linky | Revenue"></head><body><h1>收入</h1>"#,
        "Linky"
    )]
    #[case(r#"</head><body><div class="top app-info"><span> Replika </span></div>"#, "Replika")]
    #[case("<title>Dashboard</title></head><body><h1>User Retention</h1>", "Unknown Product")]
    fn test_resolve_application(#[case] head: &str, #[case] expected: &str) {
        let html = format!("<html><head>{}</body></html>", head);
        let doc = Document::parse(&html);
        assert_eq!(doc.resolve_application(), expected);
    }

    #[test]
    fn test_empty_title_segment_falls_through() {
        let doc = Document::parse("<html><head><title> | 收入</title></head><body><h1>Chai</h1></body></html>");
        assert_eq!(doc.resolve_application(), "Chai");
    }

    #[rstest]
    #[case(r#"<meta name="description" content="Top apps on Google Play">"#, "Google Play")]
    #[case(r#"<meta name="description" content="iOS store data">"#, "App Store")]
    #[case(r#"</head><body><p>Downloads from the App Store</p>"#, "App Store")]
    #[case(r#"</head><body><p>Android and iOS</p>"#, "Google Play")]
    #[case(r#"</head><body><p>nothing here</p>"#, "Unknown Platform")]
    #[case(r#"</head><body><p>Usage ratios by country and scenarios</p>"#, "Unknown Platform")]
    #[case(r#"</head><body><p>iOS用户留存</p>"#, "App Store")]
    #[case(r#"</head><body><p>Android users</p><span class="store-name">App Store</span>"#, "App Store")]
    fn test_resolve_platform(#[case] head: &str, #[case] expected: &str) {
        let html = format!("<html><head>{}</body></html>", head);
        let doc = Document::parse(&html);
        assert_eq!(doc.resolve_platform(), expected);
    }

    #[test]
    fn test_identity_bucket() {
        let doc = Document::parse("<html><head><title>X | Revenue</title></head><body>Google Play</body></html>");
        let identity = doc.identity();
        assert_eq!(identity.bucket(), Platform::Android);
    }
}
