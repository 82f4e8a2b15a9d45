//! Parent/child links across stores
//!
//! Links are store-qualified keys held on both ends: the parent lists the
//! child in `child_ids`, the child names the parent in `parent`. Linking and
//! unlinking are membership changes and do not produce new versions.
//!
//! Every walk keeps a visited set, so a cycle that slipped in through
//! `import` or raw store access is detected instead of looped on.

use std::collections::HashSet;
use std::time::Instant;

use super::{Locator, SnapshotContainer};
use crate::errors::{Result, SnapStoreError};
use crate::model::{NewSnapshot, SnapshotRef};
use crate::{log_op_end, log_op_error, log_op_start};

/// Result of a depth-first walk over `child_ids`
struct Walk {
    /// Reached snapshots in pre-order, root excluded
    reached: Vec<SnapshotRef>,
    /// First edge that re-entered an already visited snapshot
    cycle: Option<(SnapshotRef, SnapshotRef)>,
}

impl SnapshotContainer {
    /// Link `child` under `parent`
    ///
    /// When `child` does not resolve and `snapshot` is given, the child is
    /// created first: in the store a qualified `child` names, otherwise in the
    /// parent's store, under the locator's id. An existing child is linked as
    /// it is and `snapshot` is ignored. Linking a child to the parent it
    /// already has is a no-op.
    ///
    /// # Arguments
    /// * `parent` - Snapshot to link under, in any store
    /// * `child` - Snapshot to link; may live in another store
    /// * `snapshot` - Contents for `child` when it does not exist yet
    ///
    /// # Returns
    /// Reference of the linked child
    ///
    /// # Errors
    ///
    /// - `ParentNotFound` when `parent` does not resolve
    /// - `ChildNotFound` when `child` does not resolve and no snapshot is given
    /// - `ChildAlreadyHasParent` when `child` is linked elsewhere
    /// - `CycleDetected` when `parent` is `child` or one of its descendants;
    ///   the hierarchy is left unchanged
    pub fn add_child(
        &mut self,
        parent: &Locator,
        child: &Locator,
        snapshot: Option<NewSnapshot>,
    ) -> Result<SnapshotRef> {
        log_op_start!("add_child", parent = %parent, child = %child);
        let start = Instant::now();

        let result = self.add_child_impl(parent, child, snapshot).map_err(|e| {
            log_op_error!(
                "add_child",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64,
                parent = %parent,
                child = %child
            );
            e
        })?;

        log_op_end!(
            "add_child",
            duration_ms = start.elapsed().as_millis() as u64,
            parent = %parent,
            child = %result
        );
        Ok(result)
    }

    fn add_child_impl(
        &mut self,
        parent: &Locator,
        child: &Locator,
        snapshot: Option<NewSnapshot>,
    ) -> Result<SnapshotRef> {
        let parent_ref = self.resolve(parent).map_err(|e| match e {
            e if e.is_not_found() => SnapStoreError::ParentNotFound {
                parent: parent.to_string(),
            },
            other => other,
        })?;

        let child_ref = match self.resolve(child) {
            Ok(r) => r,
            Err(e) if e.is_not_found() => {
                let Some(new) = snapshot else {
                    return Err(SnapStoreError::ChildNotFound {
                        child: child.to_string(),
                        parent: Some(parent_ref.to_string()),
                    });
                };
                let store_id = child
                    .store_id()
                    .cloned()
                    .unwrap_or_else(|| parent_ref.store_id.clone());
                let mut new = new.with_id(child.id().clone());
                new.parent = None;
                self.create(&store_id, new)?.reference()
            }
            Err(e) => return Err(e),
        };

        if child_ref == parent_ref {
            return Err(SnapStoreError::CycleDetected {
                parent: parent_ref,
                child: child_ref,
            });
        }

        match self.lookup(&child_ref).and_then(|c| c.parent.clone()) {
            Some(current) if current == parent_ref => {
                self.link(&parent_ref, &child_ref)?;
                return Ok(child_ref);
            }
            Some(current) => {
                return Err(SnapStoreError::ChildAlreadyHasParent {
                    child: child_ref,
                    current_parent: current,
                });
            }
            None => {}
        }

        let walk = self.walk(&child_ref);
        if walk.cycle.is_some() || walk.reached.contains(&parent_ref) {
            return Err(SnapStoreError::CycleDetected {
                parent: parent_ref,
                child: child_ref,
            });
        }

        self.link(&parent_ref, &child_ref)?;
        Ok(child_ref)
    }

    fn link(&mut self, parent: &SnapshotRef, child: &SnapshotRef) -> Result<()> {
        self.slot(&parent.store_id)?
            .attach_child(&parent.id, child.clone());
        self.slot(&child.store_id)?
            .set_parent(&child.id, Some(parent.clone()));
        Ok(())
    }

    /// Unlink `child` from `parent`; both snapshots stay
    ///
    /// # Errors
    ///
    /// - `ParentNotFound` when `parent` does not resolve
    /// - `ChildNotFound` when `child` does not resolve or is not linked
    ///   under `parent`
    pub fn remove_child(&mut self, child: &Locator, parent: &Locator) -> Result<()> {
        log_op_start!("remove_child", parent = %parent, child = %child);
        let start = Instant::now();

        self.remove_child_impl(child, parent).map_err(|e| {
            log_op_error!(
                "remove_child",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64,
                parent = %parent,
                child = %child
            );
            e
        })?;

        log_op_end!(
            "remove_child",
            duration_ms = start.elapsed().as_millis() as u64,
            parent = %parent,
            child = %child
        );
        Ok(())
    }

    fn remove_child_impl(&mut self, child: &Locator, parent: &Locator) -> Result<()> {
        let parent_ref = self.resolve(parent).map_err(|e| match e {
            e if e.is_not_found() => SnapStoreError::ParentNotFound {
                parent: parent.to_string(),
            },
            other => other,
        })?;
        let not_linked = || SnapStoreError::ChildNotFound {
            child: child.to_string(),
            parent: Some(parent_ref.to_string()),
        };
        let child_ref = match self.resolve(child) {
            Ok(r) => r,
            Err(e) if e.is_not_found() => return Err(not_linked()),
            Err(e) => return Err(e),
        };

        let listed = self
            .slot(&parent_ref.store_id)?
            .detach_child(&parent_ref.id, &child_ref);
        let released = self
            .slot(&child_ref.store_id)?
            .release_child(&child_ref.id, &parent_ref);
        if !listed && !released {
            return Err(not_linked());
        }
        Ok(())
    }

    /// True when `child` is reachable from `parent` through `child_ids`
    ///
    /// Fails closed: unresolvable locators, a snapshot tested against
    /// itself, and any cycle met under `parent` all give `false`.
    pub fn is_descendant_of(&self, child: &Locator, parent: &Locator) -> bool {
        let (Ok(child_ref), Ok(parent_ref)) = (self.resolve(child), self.resolve(parent)) else {
            return false;
        };
        if child_ref == parent_ref {
            return false;
        }
        let walk = self.walk(&parent_ref);
        walk.cycle.is_none() && walk.reached.contains(&child_ref)
    }

    /// Parent chain of `locator`, nearest first
    ///
    /// Stops at a dangling parent link.
    ///
    /// # Errors
    ///
    /// - `NotFound` / `AmbiguousId` when the locator does not resolve
    /// - `CycleDetected` when the chain revisits a snapshot
    pub fn ancestors(&self, locator: &Locator) -> Result<Vec<SnapshotRef>> {
        let start = self.resolve(locator)?;
        let mut seen = HashSet::from([start.clone()]);
        let mut chain = Vec::new();
        let mut current = start;

        while let Some(parent) = self.lookup(&current).and_then(|s| s.parent.clone()) {
            if !seen.insert(parent.clone()) {
                return Err(SnapStoreError::CycleDetected {
                    parent,
                    child: current,
                });
            }
            if self.lookup(&parent).is_none() {
                break;
            }
            chain.push(parent.clone());
            current = parent;
        }
        Ok(chain)
    }

    /// Every snapshot reachable through `child_ids`, depth-first pre-order
    ///
    /// # Errors
    ///
    /// - `NotFound` / `AmbiguousId` when the locator does not resolve
    /// - `CycleDetected` when the walk re-enters a visited snapshot
    pub fn descendants(&self, locator: &Locator) -> Result<Vec<SnapshotRef>> {
        let root = self.resolve(locator)?;
        let walk = self.walk(&root);
        match walk.cycle {
            Some((parent, child)) => Err(SnapStoreError::CycleDetected { parent, child }),
            None => Ok(walk.reached),
        }
    }

    /// Live direct children of `locator`, in link order
    ///
    /// # Errors
    ///
    /// Same as `resolve`.
    pub fn children(&self, locator: &Locator) -> Result<Vec<SnapshotRef>> {
        let parent = self.peek(locator)?;
        Ok(parent
            .child_ids
            .iter()
            .filter(|c| self.lookup(c).is_some())
            .cloned()
            .collect())
    }

    /// # Errors
    ///
    /// Same as `resolve`.
    pub fn parent_of(&self, locator: &Locator) -> Result<Option<SnapshotRef>> {
        Ok(self.peek(locator)?.parent.clone())
    }

    fn walk(&self, root: &SnapshotRef) -> Walk {
        let mut visited = HashSet::from([root.clone()]);
        let mut reached = Vec::new();
        let mut cycle = None;
        let mut stack = vec![root.clone()];

        while let Some(current) = stack.pop() {
            let Some(snapshot) = self.lookup(&current) else {
                continue;
            };
            // reversed so the first child is visited first
            for child in snapshot.child_ids.iter().rev() {
                if self.lookup(child).is_none() {
                    continue;
                }
                if !visited.insert(child.clone()) {
                    cycle.get_or_insert_with(|| (current.clone(), child.clone()));
                    continue;
                }
                stack.push(child.clone());
            }
            if current != *root {
                reached.push(current);
            }
        }
        Walk { reached, cycle }
    }
}
