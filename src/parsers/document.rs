//! A small, typed query layer over parsed HTML.
//!
//! Parsers only ever need three things from a page: find elements by a
//! structural pattern, read an attribute, and read text. Keeping those behind
//! [`Document`] and [`Node`] means the scraping logic does not depend on the
//! HTML library's API.

use scraper::{ElementRef, Html, Selector};
use url::Url;

/// A compiled structural pattern (a CSS selector).
pub struct Pattern(Selector);

impl Pattern {
    pub fn parse(css: &str) -> Result<Self, String> {
        Selector::parse(css)
            .map(Pattern)
            .map_err(|e| format!("invalid pattern {:?}: {}", css, e))
    }
}

/// A parsed HTML document.
pub struct Document {
    html: Html,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
        }
    }

    /// All elements matching `pattern`, in document order.
    pub fn find_all(&self, pattern: &Pattern) -> Vec<Node<'_>> {
        self.html.select(&pattern.0).map(Node::from).collect()
    }

    pub fn find_first(&self, pattern: &Pattern) -> Option<Node<'_>> {
        self.html.select(&pattern.0).next().map(Node::from)
    }

    pub fn exists(&self, pattern: &Pattern) -> bool {
        self.find_first(pattern).is_some()
    }

    /// Whitespace-normalized text of the whole document.
    pub fn text(&self) -> String {
        normalize_whitespace(&self.html.root_element().text().collect::<String>())
    }
}

/// An element inside a [`Document`].
#[derive(Clone, Copy)]
pub struct Node<'a> {
    element: ElementRef<'a>,
}

impl<'a> From<ElementRef<'a>> for Node<'a> {
    fn from(element: ElementRef<'a>) -> Self {
        Self { element }
    }
}

impl<'a> Node<'a> {
    /// Descendants matching `pattern`, in document order.
    pub fn find_all(&self, pattern: &Pattern) -> Vec<Node<'a>> {
        self.element.select(&pattern.0).map(Node::from).collect()
    }

    /// Direct child elements whose tag name is one of `tags`.
    pub fn children(&self, tags: &[&str]) -> Vec<Node<'a>> {
        self.element
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|child| tags.contains(&child.value().name()))
            .map(Node::from)
            .collect()
    }

    pub fn parent(&self) -> Option<Node<'a>> {
        self.element
            .parent()
            .and_then(ElementRef::wrap)
            .map(Node::from)
    }

    pub fn name(&self) -> &'a str {
        self.element.value().name()
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.element.value().attr(name)
    }

    /// Whitespace-normalized text of this element and its descendants.
    pub fn text(&self) -> String {
        normalize_whitespace(&self.element.text().collect::<String>())
    }

    /// Non-empty text nodes that are direct children of this element.
    pub fn own_text(&self) -> Vec<String> {
        self.element
            .children()
            .filter_map(|child| child.value().as_text())
            .map(|text| normalize_whitespace(text))
            .filter(|text| !text.is_empty())
            .collect()
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Reads a query parameter out of a (possibly relative) link.
pub fn query_param(href: &str, name: &str) -> Option<String> {
    let base = Url::parse("http://portal.invalid/").ok()?;
    let url = base.join(href.trim()).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
