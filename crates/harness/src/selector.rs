//! Minimal selector parsing and matching
//!
//! Supports compound selectors made of an optional type selector (or `*`)
//! followed by any number of `.class` and `#id` parts, and comma-separated
//! lists of those. Combinators and attribute/pseudo selectors are rejected.

use domwatch_core::{DomwatchError, Result};

/// One compound selector, e.g. `div.card#main`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compound {
    /// Required tag name; `None` matches any tag
    pub tag: Option<String>,
    /// Required id
    pub id: Option<String>,
    /// Classes the element must carry
    pub classes: Vec<String>,
}

/// Parsed selector list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList(pub Vec<Compound>);

/// What a selector needs to know about an element
pub trait Matchable {
    fn tag(&self) -> &str;
    fn id(&self) -> Option<&str>;
    fn has_class(&self, class: &str) -> bool;
}

impl Compound {
    pub fn matches<M: Matchable + ?Sized>(&self, element: &M) -> bool {
        if let Some(tag) = &self.tag {
            if !tag.eq_ignore_ascii_case(element.tag()) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.id() != Some(id.as_str()) {
                return false;
            }
        }
        self.classes.iter().all(|class| element.has_class(class))
    }
}

impl SelectorList {
    /// Parse a selector list
    pub fn parse(input: &str) -> Result<Self> {
        let mut compounds = Vec::new();
        for part in input.split(',') {
            compounds.push(parse_compound(part.trim(), input)?);
        }
        Ok(Self(compounds))
    }

    /// Whether any compound matches
    pub fn matches<M: Matchable + ?Sized>(&self, element: &M) -> bool {
        self.0.iter().any(|compound| compound.matches(element))
    }
}

fn invalid(input: &str) -> DomwatchError {
    DomwatchError::Host(format!("'{}' is not a valid selector", input))
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn parse_compound(part: &str, input: &str) -> Result<Compound> {
    if part.is_empty() {
        return Err(invalid(input));
    }

    let mut compound = Compound::default();
    let mut rest = part;

    if let Some(after) = rest.strip_prefix('*') {
        rest = after;
    } else {
        let end = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
        if end > 0 {
            compound.tag = Some(rest[..end].to_ascii_lowercase());
            rest = &rest[end..];
        }
    }

    while let Some(marker) = rest.chars().next() {
        let body = &rest[marker.len_utf8()..];
        let end = body.find(|c: char| !is_ident_char(c)).unwrap_or(body.len());
        if end == 0 {
            return Err(invalid(input));
        }
        let name = body[..end].to_string();
        match marker {
            '.' => compound.classes.push(name),
            '#' if compound.id.is_none() => compound.id = Some(name),
            _ => return Err(invalid(input)),
        }
        rest = &body[end..];
    }

    Ok(compound)
}
