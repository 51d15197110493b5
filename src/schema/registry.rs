//! In-memory schema lookup.

use std::collections::HashMap;
use std::sync::Arc;

use super::{ElementDef, SchemaLookup};
use crate::version::SifVersion;

/// Element definitions indexed by parent path.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    children: HashMap<String, Vec<Arc<ElementDef>>>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition under its parent. Roots are ignored.
    pub fn register(&mut self, def: &Arc<ElementDef>) {
        if let Some(parent) = def.parent() {
            self.children
                .entry(parent.path().to_string())
                .or_default()
                .push(Arc::clone(def));
        }
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, def: &Arc<ElementDef>) -> Self {
        self.register(def);
        self
    }

    fn direct(&self, parent_path: &str, tag: &str, version: SifVersion) -> Option<Arc<ElementDef>> {
        self.children
            .get(parent_path)?
            .iter()
            .find(|d| d.is_supported(version) && d.tag(version) == tag)
            .cloned()
    }
}

impl SchemaLookup for SchemaRegistry {
    fn lookup_element_def(
        &self,
        parent: &ElementDef,
        tag: &str,
        version: SifVersion,
    ) -> Option<Arc<ElementDef>> {
        if let Some(def) = self.direct(parent.path(), tag, version) {
            return Some(def);
        }

        // Children of containers collapsed into `parent` appear as its own.
        self.children
            .get(parent.path())?
            .iter()
            .filter(|c| c.is_collapsed(version))
            .find_map(|container| self.direct(container.path(), tag, version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::VersionInfo;

    #[test]
    fn test_lookup_through_collapsed_container() {
        let root = ElementDef::root("StudentPersonal");
        let name = ElementDef::child(
            &root,
            "Name",
            vec![
                VersionInfo::new(SifVersion::SIF10R1, 2).collapsed(),
                VersionInfo::new(SifVersion::SIF20, 2),
            ],
        );
        let first = ElementDef::child(&name, "FirstName", vec![]);
        let registry = SchemaRegistry::new().with(&name).with(&first);

        let found = registry
            .lookup_element_def(&root, "FirstName", SifVersion::SIF11)
            .unwrap();
        assert!(found.same_as(&first));
        assert!(found.parent().unwrap().same_as(&name));

        assert!(registry
            .lookup_element_def(&root, "FirstName", SifVersion::SIF21)
            .is_none());
        assert!(registry
            .lookup_element_def(&name, "FirstName", SifVersion::SIF21)
            .is_some());
    }
}
