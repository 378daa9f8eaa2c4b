//! HTML parsing and DOM access.
//!
//! This module provides the [`Document`] and [`Element`] types for parsing a
//! saved dashboard page and querying it with CSS selectors. Extractors never
//! touch these directly for table structure; they go through the
//! [`Locator`](crate::locator::Locator), which is built on top of them.
//!
//! # Example
//!
//! ```rust
//! use dashmetrics_core::parse::Document;
//!
//! let html = r#"
//!     <html>
//!         <head><title>Poly.AI | Revenue</title></head>
//!         <body><div data-key="est_revenue__avg"> $1.2万 </div></body>
//!     </html>
//! "#;
//!
//! let doc = Document::parse(html);
//! assert_eq!(doc.title(), Some("Poly.AI | Revenue".to_string()));
//! let cells = doc.select("[data-key]").unwrap();
//! assert_eq!(cells[0].text_trimmed(), "$1.2万");
//! ```

use scraper::{ElementRef, Html, Selector};

use crate::{DashError, Result};

/// A parsed dashboard snapshot.
///
/// The tree is immutable once parsed; it lives for a single extraction run.
pub struct Document {
    html: Html,
}

impl Document {
    /// Parses HTML from a string.
    ///
    /// html5ever recovers from any malformed input, so parsing itself cannot
    /// fail; broken markup simply yields fewer matching regions later.
    pub fn parse(html: &str) -> Self {
        Self { html: Html::parse_document(html) }
    }

    /// Gets the raw HTML representation.
    pub fn html(&self) -> &Html {
        &self.html
    }

    /// The `<html>` element, used as the outermost search scope.
    pub fn root(&self) -> Element<'_> {
        Element { element: self.html.root_element() }
    }

    /// Selects elements using a CSS selector.
    ///
    /// # Errors
    ///
    /// Returns [`DashError::HtmlParseError`] if the selector is invalid.
    pub fn select(&self, selector: &str) -> Result<Vec<Element<'_>>> {
        let sel = compile(selector)?;
        Ok(self.html.select(&sel).map(Element::from).collect())
    }

    /// Selects the first element matching a compiled selector.
    pub fn select_first(&self, selector: &Selector) -> Option<Element<'_>> {
        self.html.select(selector).next().map(Element::from)
    }

    /// Gets the title of the document.
    ///
    /// Returns the text of the `<title>` element if present.
    pub fn title(&self) -> Option<String> {
        let selector = Selector::parse("title").ok()?;
        self.html.select(&selector).next().map(|el| el.text().collect::<String>())
    }

    /// Gets all text content from the document.
    pub fn text_content(&self) -> String {
        self.html.root_element().text().collect()
    }
}

/// Compiles a CSS selector, mapping failures onto [`DashError::HtmlParseError`].
pub fn compile(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| DashError::HtmlParseError(format!("Invalid selector `{}`: {}", selector, e)))
}

/// A wrapper around scraper's ElementRef.
///
/// Element borrows from its [`Document`], so everything selected through it
/// shares the document lifetime `'a`.
#[derive(Clone, Copy, Debug)]
pub struct Element<'a> {
    element: ElementRef<'a>,
}

impl<'a> From<ElementRef<'a>> for Element<'a> {
    fn from(element: ElementRef<'a>) -> Self {
        Self { element }
    }
}

impl<'a> Element<'a> {
    /// Gets the outer HTML of this element.
    pub fn outer_html(&self) -> String {
        self.element.html()
    }

    /// Gets the concatenated text of all text nodes within this element.
    pub fn text(&self) -> String {
        self.element.text().collect()
    }

    /// Gets the text content with every text node trimmed and empty nodes
    /// dropped before joining.
    ///
    /// Dashboard cells spread one value across several inline nodes with
    /// formatting whitespace between them; this recovers the visible token.
    pub fn text_trimmed(&self) -> String {
        self.element.text().map(str::trim).filter(|t| !t.is_empty()).collect()
    }

    /// Gets the value of an attribute.
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.element.value().attr(name)
    }

    /// Gets the lowercase tag name of this element.
    pub fn tag_name(&self) -> String {
        self.element.value().name().to_lowercase()
    }

    /// Whether this element carries the exact class token `class`.
    pub fn has_class(&self, class: &str) -> bool {
        self.element.value().classes().any(|c| c == class)
    }

    /// Whether any class token of this element contains `fragment`.
    pub fn class_contains(&self, fragment: &str) -> bool {
        self.element.value().classes().any(|c| c.contains(fragment))
    }

    /// Iterates over every class token of this element.
    pub fn classes(&self) -> impl Iterator<Item = &'a str> + 'a {
        self.element.value().classes()
    }

    /// Selects descendant elements using a CSS selector string.
    ///
    /// # Errors
    ///
    /// Returns [`DashError::HtmlParseError`] if the selector is invalid.
    pub fn select(&self, selector: &str) -> Result<Vec<Element<'a>>> {
        let sel = compile(selector)?;
        Ok(self.select_all(&sel))
    }

    /// Selects descendant elements using a compiled selector.
    pub fn select_all(&self, selector: &Selector) -> Vec<Element<'a>> {
        self.element.select(selector).map(Element::from).collect()
    }

    /// Selects the first descendant matching a compiled selector.
    pub fn select_first(&self, selector: &Selector) -> Option<Element<'a>> {
        self.element.select(selector).next().map(Element::from)
    }

    /// All descendant elements in document order, excluding `self`.
    pub fn descendants(&self) -> impl Iterator<Item = Element<'a>> + 'a {
        self.element.descendants().skip(1).filter_map(ElementRef::wrap).map(Element::from)
    }

    /// First descendant whose attribute `name` equals `value` exactly.
    ///
    /// Used for per-column lookups keyed by a data attribute whose values
    /// (`value_change(est_download__sum)__aggr`) are awkward to quote inside
    /// a CSS selector.
    pub fn find_by_attr(&self, name: &str, value: &str) -> Option<Element<'a>> {
        self.descendants().find(|el| el.attr(name) == Some(value))
    }
}
