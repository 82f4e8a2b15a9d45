//! Hierarchy invariant checks
//!
//! Each `find_*` check returns every violation it sees; `validate_hierarchy`
//! reports the first one. Expired snapshots count as absent.

use std::collections::{BTreeMap, HashSet};

use super::SnapshotContainer;
use crate::errors::{Result, SnapStoreError};
use crate::model::SnapshotRef;

impl SnapshotContainer {
    /// Sweep expired snapshots, then check the hierarchy invariants
    ///
    /// Checked in order:
    ///
    /// 1. Every parent link names a live snapshot
    /// 2. Every `child_ids` entry names a live snapshot
    /// 3. No snapshot is listed under more than one parent
    /// 4. Both ends of each link agree
    /// 5. No parent chain revisits a snapshot
    ///
    /// # Errors
    ///
    /// Returns the first violation: `ParentNotFound`, `ChildNotFound`,
    /// `ChildAlreadyHasParent` or `CycleDetected`. For exhaustive reporting
    /// use `hierarchy_violations`.
    pub fn validate_hierarchy(&mut self) -> Result<()> {
        self.sweep_expired();
        match self.hierarchy_violations().into_iter().next() {
            Some(violation) => Err(violation),
            None => Ok(()),
        }
    }

    /// Every hierarchy violation, in check order
    pub fn hierarchy_violations(&self) -> Vec<SnapStoreError> {
        let mut violations = Vec::new();

        for (_, parent) in self.find_dangling_parents() {
            violations.push(SnapStoreError::ParentNotFound {
                parent: parent.to_string(),
            });
        }
        for (parent, child) in self.find_missing_children() {
            violations.push(SnapStoreError::ChildNotFound {
                child: child.to_string(),
                parent: Some(parent.to_string()),
            });
        }
        for (child, parents) in self.find_multiple_parents() {
            if let Some(first) = parents.into_iter().next() {
                violations.push(SnapStoreError::ChildAlreadyHasParent {
                    child,
                    current_parent: first,
                });
            }
        }
        for (parent, child) in self.find_link_mismatches() {
            violations.push(SnapStoreError::ChildNotFound {
                child: child.to_string(),
                parent: Some(parent.to_string()),
            });
        }
        for (parent, child) in self.find_cycles() {
            violations.push(SnapStoreError::CycleDetected { parent, child });
        }

        violations
    }

    /// `(child, parent)` pairs whose parent link is dangling
    pub fn find_dangling_parents(&self) -> Vec<(SnapshotRef, SnapshotRef)> {
        self.live()
            .filter_map(|s| {
                let parent = s.parent.as_ref()?;
                self.lookup(parent)
                    .is_none()
                    .then(|| (s.reference(), parent.clone()))
            })
            .collect()
    }

    /// `(parent, child)` pairs whose `child_ids` entry is dangling
    pub fn find_missing_children(&self) -> Vec<(SnapshotRef, SnapshotRef)> {
        let mut missing = Vec::new();
        for parent in self.live() {
            for child in &parent.child_ids {
                if self.lookup(child).is_none() {
                    missing.push((parent.reference(), child.clone()));
                }
            }
        }
        missing
    }

    /// Children listed under more than one parent, with every listing parent
    pub fn find_multiple_parents(&self) -> Vec<(SnapshotRef, Vec<SnapshotRef>)> {
        let mut listed: BTreeMap<SnapshotRef, Vec<SnapshotRef>> = BTreeMap::new();
        for parent in self.live() {
            for child in &parent.child_ids {
                listed
                    .entry(child.clone())
                    .or_default()
                    .push(parent.reference());
            }
        }
        listed
            .into_iter()
            .filter(|(_, parents)| parents.len() > 1)
            .collect()
    }

    /// `(parent, child)` links recorded on one end only
    pub fn find_link_mismatches(&self) -> Vec<(SnapshotRef, SnapshotRef)> {
        let mut mismatches = Vec::new();
        for snapshot in self.live() {
            let reference = snapshot.reference();

            // listed as child, but the child names another parent or none
            for child in &snapshot.child_ids {
                if let Some(c) = self.lookup(child) {
                    if c.parent.as_ref() != Some(&reference) {
                        mismatches.push((reference.clone(), child.clone()));
                    }
                }
            }

            // names a parent that does not list it
            if let Some(parent) = &snapshot.parent {
                if let Some(p) = self.lookup(parent) {
                    if !p.has_child(&reference) {
                        mismatches.push((parent.clone(), reference.clone()));
                    }
                }
            }
        }
        mismatches
    }

    /// `(parent, child)` edges that close a loop in a parent chain
    ///
    /// Each loop is reported once, at the first snapshot (in store then
    /// insertion order) whose chain runs into it.
    pub fn find_cycles(&self) -> Vec<(SnapshotRef, SnapshotRef)> {
        let mut cycles = Vec::new();
        let mut reported: HashSet<SnapshotRef> = HashSet::new();

        for snapshot in self.live() {
            let mut chain = vec![snapshot.reference()];
            let mut seen: HashSet<SnapshotRef> = chain.iter().cloned().collect();

            while let Some(parent) = chain
                .last()
                .and_then(|current| self.lookup(current))
                .and_then(|s| s.parent.clone())
            {
                if seen.insert(parent.clone()) {
                    chain.push(parent);
                    continue;
                }
                let entry = chain.iter().position(|r| *r == parent).unwrap_or(0);
                let members = &chain[entry..];
                if members.iter().all(|r| !reported.contains(r)) {
                    reported.extend(members.iter().cloned());
                    if let Some(current) = chain.last() {
                        cycles.push((parent, current.clone()));
                    }
                }
                break;
            }
        }
        cycles
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{ContainerConfig, StoreConfig};
    use crate::container::{Locator, SnapshotContainer};
    use crate::errors::SnapStoreError;
    use crate::model::{NewSnapshot, SnapshotRef};
    use serde_json::json;

    fn container() -> SnapshotContainer {
        let mut config = ContainerConfig::default();
        config.stores.push(StoreConfig::new("tasks"));
        SnapshotContainer::init(&config).unwrap()
    }

    #[test]
    fn test_clean_hierarchy_validates() {
        let mut c = container();
        c.create(&"tasks".into(), NewSnapshot::new(json!({})).with_id("a"))
            .unwrap();
        c.add_child(&Locator::from("a"), &Locator::from("b"), Some(NewSnapshot::default()))
            .unwrap();

        assert!(c.validate_hierarchy().is_ok());
        assert!(c.hierarchy_violations().is_empty());
    }

    #[test]
    fn test_one_sided_link_is_reported() {
        let mut c = container();
        c.create(&"tasks".into(), NewSnapshot::new(json!({})).with_id("a"))
            .unwrap();
        c.create(&"tasks".into(), NewSnapshot::new(json!({})).with_id("b"))
            .unwrap();
        c.store_mut(&"tasks".into())
            .unwrap()
            .set_parent(&"b".into(), Some(SnapshotRef::new("tasks", "a")));

        let err = c.validate_hierarchy().unwrap_err();
        assert!(matches!(err, SnapStoreError::ChildNotFound { .. }));
        assert_eq!(c.find_link_mismatches().len(), 1);
    }
}
