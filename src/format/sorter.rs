//! Version-aware sibling ordering.
//!
//! When a container is collapsed under some version, its children are written
//! inline among the container's siblings (their former aunts and uncles). The
//! promoted element then sorts at its container's position. Ties keep document
//! order, so every sort here is stable.

use std::cmp::Ordering;

use crate::schema::{Element, ElementDef};
use crate::version::SifVersion;

/// Comparator over element definitions for one SIF version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementSorter {
    version: SifVersion,
}

impl ElementSorter {
    /// Sorter for `version`.
    pub fn new(version: SifVersion) -> Self {
        Self { version }
    }

    /// Version whose sequence numbers are compared.
    pub fn version(&self) -> SifVersion {
        self.version
    }

    /// Order `a` relative to `b` under this sorter's version.
    ///
    /// - Siblings compare by their own sequence numbers.
    /// - An element promoted out of a collapsed container takes the
    ///   container's sequence number when compared to the container's siblings.
    /// - Elements promoted out of two sibling containers compare by the
    ///   containers' sequence numbers.
    /// - Anything else falls back to the raw sequence numbers.
    pub fn compare(&self, a: &ElementDef, b: &ElementDef) -> Ordering {
        let seq = |d: &ElementDef| d.sequence(self.version);

        if let (Some(pa), Some(pb)) = (a.parent(), b.parent()) {
            if pa.same_as(pb) {
                return seq(a).cmp(&seq(b));
            }

            let ga = pa.parent();
            let gb = pb.parent();

            if ga.is_some_and(|g| g.same_as(pb)) {
                return seq(pa).cmp(&seq(b));
            }
            if gb.is_some_and(|g| g.same_as(pa)) {
                return seq(a).cmp(&seq(pb));
            }
            if let (Some(ga), Some(gb)) = (ga, gb) {
                if ga.same_as(gb) {
                    return seq(pa).cmp(&seq(pb));
                }
            }
        }

        seq(a).cmp(&seq(b))
    }

    /// Stable in-place sort of borrowed elements.
    pub fn sort(&self, elements: &mut [&Element]) {
        elements.sort_by(|a, b| self.compare(a.def(), b.def()));
    }

    /// Stable in-place sort of owned elements.
    pub fn sort_elements(&self, elements: &mut [Element]) {
        elements.sort_by(|a, b| self.compare(a.def(), b.def()));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::schema::VersionInfo;

    struct Fixture {
        root: Arc<ElementDef>,
        ref_id: Arc<ElementDef>,
        name: Arc<ElementDef>,
        first: Arc<ElementDef>,
        last: Arc<ElementDef>,
        demographics: Arc<ElementDef>,
        gender: Arc<ElementDef>,
        birth_date: Arc<ElementDef>,
    }

    // StudentPersonal{RefId, Name{Last, First}, Demographics{Gender, BirthDate}}
    // Under 1.x Name and Demographics are collapsed and their children
    // interleave with the top-level elements.
    fn fixture() -> Fixture {
        let root = ElementDef::root("StudentPersonal");
        let ref_id = ElementDef::child(&root, "RefId", vec![VersionInfo::new(SifVersion::SIF10R1, 0)]);
        let name = ElementDef::child(
            &root,
            "Name",
            vec![
                VersionInfo::new(SifVersion::SIF10R1, 2).collapsed(),
                VersionInfo::new(SifVersion::SIF20, 1),
            ],
        );
        let last = ElementDef::child(&name, "LastName", vec![VersionInfo::new(SifVersion::SIF10R1, 0)]);
        let first = ElementDef::child(&name, "FirstName", vec![VersionInfo::new(SifVersion::SIF10R1, 1)]);
        let demographics = ElementDef::child(
            &root,
            "Demographics",
            vec![
                VersionInfo::new(SifVersion::SIF10R1, 1).collapsed(),
                VersionInfo::new(SifVersion::SIF20, 2),
            ],
        );
        let gender = ElementDef::child(&demographics, "Gender", vec![VersionInfo::new(SifVersion::SIF10R1, 0)]);
        let birth_date =
            ElementDef::child(&demographics, "BirthDate", vec![VersionInfo::new(SifVersion::SIF10R1, 1)]);

        Fixture {
            root,
            ref_id,
            name,
            first,
            last,
            demographics,
            gender,
            birth_date,
        }
    }

    #[test]
    fn test_direct_siblings_use_sequence() {
        let f = fixture();
        let sorter = ElementSorter::new(SifVersion::SIF21);
        assert_eq!(sorter.compare(&f.name, &f.demographics), Ordering::Less);
        assert_eq!(sorter.compare(&f.first, &f.last), Ordering::Greater);

        let legacy = ElementSorter::new(SifVersion::SIF11);
        assert_eq!(legacy.compare(&f.name, &f.demographics), Ordering::Greater);
        assert!(f.root.parent().is_none());
    }

    #[test]
    fn test_promoted_element_uses_container_sequence() {
        let f = fixture();
        let sorter = ElementSorter::new(SifVersion::SIF11);
        // FirstName is promoted from Name (seq 2) and compared with RefId (seq 0).
        assert_eq!(sorter.compare(&f.first, &f.ref_id), Ordering::Greater);
        assert_eq!(sorter.compare(&f.ref_id, &f.first), Ordering::Less);
    }

    #[test]
    fn test_cousins_use_container_sequences() {
        let f = fixture();
        let sorter = ElementSorter::new(SifVersion::SIF11);
        // Gender (Demographics, seq 1) precedes LastName (Name, seq 2) in 1.x.
        assert_eq!(sorter.compare(&f.gender, &f.last), Ordering::Less);
        assert_eq!(sorter.compare(&f.last, &f.birth_date), Ordering::Greater);
    }

    #[test]
    fn test_stable_sort() {
        let f = fixture();
        let elements = vec![
            Element::with_value(Arc::clone(&f.first), "Ann"),
            Element::with_value(Arc::clone(&f.birth_date), "19900101"),
            Element::with_value(Arc::clone(&f.last), "Lee"),
            Element::with_value(Arc::clone(&f.ref_id), "A1"),
            Element::with_value(Arc::clone(&f.gender), "F"),
        ];
        let sorter = ElementSorter::new(SifVersion::SIF11);

        let mut once: Vec<&Element> = elements.iter().collect();
        sorter.sort(&mut once);
        let tags: Vec<&str> = once.iter().map(|e| e.def().canonical_tag()).collect();
        assert_eq!(tags, ["RefId", "Gender", "BirthDate", "LastName", "FirstName"]);

        let mut twice = once.clone();
        sorter.sort(&mut twice);
        let again: Vec<&str> = twice.iter().map(|e| e.def().canonical_tag()).collect();
        assert_eq!(tags, again);
    }

    #[test]
    fn test_ties_preserve_document_order() {
        let root = ElementDef::root("Root");
        let a = ElementDef::child(&root, "A", vec![VersionInfo::new(SifVersion::SIF10R1, 1)]);
        let b = ElementDef::child(&root, "B", vec![VersionInfo::new(SifVersion::SIF10R1, 1)]);
        let mut elements = vec![
            Element::with_value(Arc::clone(&b), "1"),
            Element::with_value(Arc::clone(&a), "2"),
            Element::with_value(Arc::clone(&b), "3"),
        ];
        ElementSorter::new(SifVersion::SIF20).sort_elements(&mut elements);
        let values: Vec<&str> = elements.iter().filter_map(Element::value).collect();
        assert_eq!(values, ["1", "2", "3"]);
    }
}
