//! Schema element metadata and element trees.
//!
//! The full SIF object model lives outside this crate. This module holds only
//! what the formatter and sorter need: per-version sequence numbers and
//! collapse flags on [`ElementDef`], a minimal [`Element`] tree, and the
//! [`SchemaLookup`] seam used to resolve child tags during parsing.
//!
//! # Versioned metadata
//!
//! An element definition carries one [`VersionInfo`] span per schema change.
//! A span applies from its `since` version up to (not including) the next
//! span's `since`:
//!
//! ```text
//! Name.FirstName   since 1.0r1  seq 2
//!                  since 2.0    seq 1  (Name collapsed before 2.0)
//! ```

mod registry;

pub use registry::SchemaRegistry;

use std::sync::Arc;

use crate::version::SifVersion;

/// Per-version schema facts for an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    /// First version these facts apply to.
    pub since: SifVersion,
    /// Ordinal position among siblings.
    pub sequence: u32,
    /// Whether this element's container markup is dropped on the wire,
    /// promoting its children into its parent.
    pub collapsed: bool,
    /// Wire tag, when it differs from the canonical tag.
    pub tag: Option<String>,
}

impl VersionInfo {
    /// Facts starting at `since` with the given sequence number.
    pub fn new(since: SifVersion, sequence: u32) -> Self {
        Self {
            since,
            sequence,
            collapsed: false,
            tag: None,
        }
    }

    /// Mark the element as collapsed from this span on.
    pub fn collapsed(mut self) -> Self {
        self.collapsed = true;
        self
    }

    /// Rename the element on the wire from this span on.
    pub fn renamed(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Immutable schema definition of one element.
#[derive(Debug)]
pub struct ElementDef {
    path: String,
    tag: String,
    parent: Option<Arc<ElementDef>>,
    versions: Vec<VersionInfo>,
    removed_in: Option<SifVersion>,
}

impl ElementDef {
    /// Define a top-level element (a data object or message root).
    pub fn root(tag: impl Into<String>) -> Arc<Self> {
        let tag = tag.into();
        Arc::new(Self {
            path: tag.clone(),
            tag,
            parent: None,
            versions: vec![VersionInfo::new(SifVersion::SIF10R1, 0)],
            removed_in: None,
        })
    }

    /// Define a child element with its version history.
    ///
    /// Spans are kept sorted by `since`; an empty history means sequence 0
    /// in every version.
    pub fn child(
        parent: &Arc<ElementDef>,
        tag: impl Into<String>,
        versions: Vec<VersionInfo>,
    ) -> Arc<Self> {
        Arc::new(Self::build(parent, tag.into(), versions, None))
    }

    /// Define a child element removed from the schema at `removed_in`.
    pub fn child_until(
        parent: &Arc<ElementDef>,
        tag: impl Into<String>,
        versions: Vec<VersionInfo>,
        removed_in: SifVersion,
    ) -> Arc<Self> {
        Arc::new(Self::build(parent, tag.into(), versions, Some(removed_in)))
    }

    fn build(
        parent: &Arc<ElementDef>,
        tag: String,
        mut versions: Vec<VersionInfo>,
        removed_in: Option<SifVersion>,
    ) -> Self {
        versions.sort_by_key(|v| v.since);
        if versions.is_empty() {
            versions.push(VersionInfo::new(SifVersion::SIF10R1, 0));
        }
        Self {
            path: format!("{}/{}", parent.path, tag),
            tag,
            parent: Some(Arc::clone(parent)),
            versions,
            removed_in,
        }
    }

    /// Unique slash-separated path from the root, e.g. `StudentPersonal/Name/FirstName`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Canonical tag (latest schema).
    pub fn canonical_tag(&self) -> &str {
        &self.tag
    }

    /// Containing element definition.
    pub fn parent(&self) -> Option<&Arc<ElementDef>> {
        self.parent.as_ref()
    }

    /// Whether two handles name the same schema element.
    pub fn same_as(&self, other: &ElementDef) -> bool {
        self.path == other.path
    }

    fn info(&self, version: SifVersion) -> &VersionInfo {
        self.versions
            .iter()
            .rev()
            .find(|v| v.since <= version)
            .unwrap_or(&self.versions[0])
    }

    /// Sibling sequence number under `version`.
    pub fn sequence(&self, version: SifVersion) -> u32 {
        self.info(version).sequence
    }

    /// Whether this element's markup is collapsed under `version`.
    pub fn is_collapsed(&self, version: SifVersion) -> bool {
        self.info(version).collapsed
    }

    /// Wire tag under `version`.
    pub fn tag(&self, version: SifVersion) -> &str {
        self.info(version).tag.as_deref().unwrap_or(&self.tag)
    }

    /// Whether the element exists in `version`'s schema.
    pub fn is_supported(&self, version: SifVersion) -> bool {
        version >= self.versions[0].since && self.removed_in.map_or(true, |r| version < r)
    }
}

/// A node in a parsed or constructed SIF element tree.
#[derive(Debug, Clone)]
pub struct Element {
    def: Arc<ElementDef>,
    value: Option<String>,
    children: Vec<Element>,
}

impl Element {
    /// Empty element of the given definition.
    pub fn new(def: Arc<ElementDef>) -> Self {
        Self {
            def,
            value: None,
            children: Vec::new(),
        }
    }

    /// Leaf element carrying a text value.
    pub fn with_value(def: Arc<ElementDef>, value: impl Into<String>) -> Self {
        Self {
            def,
            value: Some(value.into()),
            children: Vec::new(),
        }
    }

    /// Schema definition.
    pub fn def(&self) -> &Arc<ElementDef> {
        &self.def
    }

    /// Replace the schema definition.
    pub fn set_def(&mut self, def: Arc<ElementDef>) {
        self.def = def;
    }

    /// Text value, if any.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Children in insertion order.
    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// Mutable children.
    pub fn children_mut(&mut self) -> &mut Vec<Element> {
        &mut self.children
    }

    /// Append a child as-is, without collapse handling.
    pub fn push(&mut self, child: Element) {
        self.children.push(child);
    }

    /// First direct child with the given definition.
    pub fn child(&self, def: &ElementDef) -> Option<&Element> {
        self.children.iter().find(|c| c.def.same_as(def))
    }
}

/// Resolves element definitions while parsing.
pub trait SchemaLookup: Send + Sync {
    /// Definition of the child named `tag` beneath `parent`, as it appears on
    /// the wire under `version`. Collapsed descendants are reported with
    /// their natural (uncollapsed) parent.
    fn lookup_element_def(
        &self,
        parent: &ElementDef,
        tag: &str,
        version: SifVersion,
    ) -> Option<Arc<ElementDef>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_spans() {
        let root = ElementDef::root("StudentPersonal");
        let name = ElementDef::child(
            &root,
            "Name",
            vec![
                VersionInfo::new(SifVersion::SIF10R1, 3).collapsed(),
                VersionInfo::new(SifVersion::SIF20, 5),
            ],
        );

        assert_eq!(name.sequence(SifVersion::SIF11), 3);
        assert!(name.is_collapsed(SifVersion::SIF15R1));
        assert_eq!(name.sequence(SifVersion::SIF21), 5);
        assert!(!name.is_collapsed(SifVersion::SIF20));
        assert_eq!(name.path(), "StudentPersonal/Name");
    }

    #[test]
    fn test_supported_range() {
        let root = ElementDef::root("StudentPersonal");
        let old = ElementDef::child_until(
            &root,
            "HomeLanguage",
            vec![VersionInfo::new(SifVersion::SIF11, 9)],
            SifVersion::SIF20,
        );
        assert!(!old.is_supported(SifVersion::SIF10R1));
        assert!(old.is_supported(SifVersion::SIF15R1));
        assert!(!old.is_supported(SifVersion::SIF20));
    }

    #[test]
    fn test_renamed_tag() {
        let root = ElementDef::root("StudentPersonal");
        let id = ElementDef::child(
            &root,
            "LocalId",
            vec![
                VersionInfo::new(SifVersion::SIF10R1, 1).renamed("OtherId"),
                VersionInfo::new(SifVersion::SIF20, 1),
            ],
        );
        assert_eq!(id.tag(SifVersion::SIF11), "OtherId");
        assert_eq!(id.tag(SifVersion::SIF22), "LocalId");
    }
}
