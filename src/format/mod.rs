//! Version-aware value formatting and content ordering.
//!
//! SIF changed both its primitive syntax and its element structure between
//! version families. A [`SifFormatter`] is selected once per version with
//! [`formatter_for`] and held for the lifetime of a version-bound operation
//! (rendering one message, parsing one response).
//!
//! # Primitive syntax
//!
//! | Type     | Legacy (1.x)               | Current (2.x+)                |
//! |----------|----------------------------|-------------------------------|
//! | date     | `20240105`                 | `2024-01-05`                  |
//! | time     | `13:45:00`                 | `13:45:00`                    |
//! | datetime | `20240105` (date only)     | `2024-01-05T13:45:00Z` (UTC)  |
//! | boolean  | `Yes` / `No`               | `true` / `false`              |
//! | duration | unsupported                | `P1DT2H`                      |
//! | decimal  | `12.5` (`12.5%` accepted)  | `12.5`                        |
//!
//! # Structure
//!
//! [`SifFormatter::content_list`] flattens containers collapsed under the
//! formatter's version and orders the result with [`ElementSorter`].
//! [`SifFormatter::add_child`] reverses the collapse while parsing.

mod current;
mod duration;
mod legacy;
mod sorter;

pub use current::CurrentFormatter;
pub use duration::SifDuration;
pub use legacy::LegacyFormatter;
pub use sorter::ElementSorter;

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};

use crate::error::{Result, SifError};
use crate::schema::{Element, SchemaLookup};
use crate::version::{SifVersion, VersionFamily};
use crate::RUNTIME_VERSION;

/// Primitive (de)serialization and content ordering for one SIF version.
pub trait SifFormatter: Send + Sync + std::fmt::Debug {
    /// Version this formatter renders.
    fn version(&self) -> SifVersion;

    /// Render a date.
    fn to_date_string(&self, date: NaiveDate) -> String;

    /// Parse a date.
    fn to_date(&self, value: &str) -> Result<NaiveDate>;

    /// Render a time of day.
    fn to_time_string(&self, time: NaiveTime) -> String;

    /// Parse a time of day.
    fn to_time(&self, value: &str) -> Result<NaiveTime>;

    /// Render a timestamp.
    fn to_datetime_string(&self, datetime: DateTime<FixedOffset>) -> String;

    /// Parse a timestamp.
    fn to_datetime(&self, value: &str) -> Result<DateTime<Utc>>;

    /// Render a boolean.
    fn to_bool_string(&self, value: bool) -> &'static str;

    /// Parse a boolean.
    fn to_bool(&self, value: &str) -> Result<bool>;

    /// Render a duration.
    fn to_duration_string(&self, duration: &SifDuration) -> Result<String>;

    /// Parse a duration.
    fn to_duration(&self, value: &str) -> Result<SifDuration>;

    /// Render a decimal, independent of locale.
    fn to_decimal_string(&self, value: f64) -> String {
        value.to_string()
    }

    /// Parse a decimal, independent of locale.
    fn to_decimal(&self, value: &str) -> Result<f64> {
        parse_decimal(value.trim())
    }

    /// Children of `element` as they appear on the wire under this version:
    /// unsupported elements dropped, collapsed containers replaced by their
    /// children, and the result stably ordered.
    fn content_list<'a>(&self, element: &'a Element) -> Vec<&'a Element> {
        let version = self.version();
        let mut out = Vec::with_capacity(element.children().len());
        flatten(element, version, &mut out);
        ElementSorter::new(version).sort(&mut out);
        out
    }

    /// Attach a parsed `child` to `parent`.
    ///
    /// When the child's natural container is collapsed under this version,
    /// the child is placed in that container instead, reusing an existing
    /// instance among `parent`'s children or creating one. The child's
    /// definition is then re-resolved under the runtime version.
    fn add_child(&self, parent: &mut Element, mut child: Element, schema: &dyn SchemaLookup) {
        let version = self.version();

        let container_def = match child.def().parent() {
            Some(container)
                if !container.same_as(parent.def())
                    && container.is_collapsed(version)
                    && container
                        .parent()
                        .is_some_and(|p| p.same_as(parent.def())) =>
            {
                Arc::clone(container)
            },
            _ => {
                parent.push(child);
                return;
            },
        };

        let runtime_tag = child.def().tag(RUNTIME_VERSION).to_string();
        if let Some(def) = schema.lookup_element_def(&container_def, &runtime_tag, RUNTIME_VERSION) {
            child.set_def(def);
        }

        let children = parent.children_mut();
        let index = match children.iter().position(|c| c.def().same_as(&container_def)) {
            Some(index) => index,
            None => {
                children.push(Element::new(container_def));
                children.len() - 1
            },
        };
        children[index].push(child);
    }
}

fn flatten<'a>(element: &'a Element, version: SifVersion, out: &mut Vec<&'a Element>) {
    for child in element.children() {
        if !child.def().is_supported(version) {
            continue;
        }
        if child.def().is_collapsed(version) {
            flatten(child, version, out);
        } else {
            out.push(child);
        }
    }
}

pub(crate) fn parse_decimal(value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| SifError::Messaging(format!("Invalid decimal: {value}")))
}

/// Formatter strategy for `version`.
pub fn formatter_for(version: SifVersion) -> Arc<dyn SifFormatter> {
    match version.family() {
        VersionFamily::Legacy => Arc::new(LegacyFormatter::new(version)),
        VersionFamily::Current => Arc::new(CurrentFormatter::new(version)),
    }
}
