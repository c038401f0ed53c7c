//! Ordered selector alternatives with first-match-wins semantics.

use crate::error::ConfigError;
use scraper::{ElementRef, Selector};

/// A list of CSS selectors tried left to right.
///
/// Built from configuration strings so templates can be added without
/// touching the code that walks them.
#[derive(Debug, Clone)]
pub struct SelectorChain {
    selectors: Vec<Selector>,
    /// All alternatives as one selector group, for document-order scans.
    group: Option<Selector>,
}

impl SelectorChain {
    /// Parse `sources` in order. `field` names the settings key in errors.
    pub fn parse(field: &str, sources: &[String]) -> Result<Self, ConfigError> {
        let invalid = |selector: &str| ConfigError::Selector {
            field: field.to_string(),
            selector: selector.to_string(),
        };

        let selectors = sources
            .iter()
            .map(|s| Selector::parse(s).map_err(|_| invalid(s)))
            .collect::<Result<Vec<_>, _>>()?;

        let group = if sources.is_empty() {
            None
        } else {
            let joined = sources.join(", ");
            Some(Selector::parse(&joined).map_err(|_| invalid(&joined))?)
        };

        Ok(Self { selectors, group })
    }

    pub fn alternatives(&self) -> impl Iterator<Item = &Selector> {
        self.selectors.iter()
    }

    /// First element matched by the first selector that matches anything.
    pub fn first<'a>(&self, root: ElementRef<'a>) -> Option<ElementRef<'a>> {
        self.selectors
            .iter()
            .find_map(|selector| root.select(selector).next())
    }

    /// First non-empty value produced by `extract`, trying selectors in order
    /// and each selector's matches in document order.
    pub fn first_map<'a, T>(
        &self,
        root: ElementRef<'a>,
        mut extract: impl FnMut(ElementRef<'a>) -> Option<T>,
    ) -> Option<T> {
        self.selectors
            .iter()
            .find_map(|selector| root.select(selector).find_map(&mut extract))
    }

    /// Every element matched by any alternative, in document order, each once.
    pub fn select_all<'a>(&self, root: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        match &self.group {
            Some(group) => root.select(group).collect(),
            None => Vec::new(),
        }
    }

    /// Whether `element` itself matches any alternative.
    pub fn matches(&self, element: &ElementRef<'_>) -> bool {
        self.selectors.iter().any(|selector| selector.matches(element))
    }

    /// Whether `element` or one of its ancestors matches any alternative.
    pub fn within(&self, element: &ElementRef<'_>) -> bool {
        if self.matches(element) {
            return true;
        }
        element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|ancestor| self.matches(&ancestor))
    }
}

/// Trimmed text content of an element.
pub fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}
