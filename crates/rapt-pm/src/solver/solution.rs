//! Persistent solution storage with structural sharing.
//!
//! A solution overlays a small delta (added entries plus a removed set) over
//! a master entry map shared with its siblings. Cloning is O(1); `prepare`
//! either promotes the parent's delta to a new shared master or, when the
//! master has been forked more often than it has entries, collapses
//! everything into a fresh independent master.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::cache::Cache;
use crate::config::Config;
use crate::solver::graph::{DependencyGraph, ElementId, InitialPackageEntry};
use crate::solver::score::ScoreChange;

/// Who introduced an entry: the version element that had the broken
/// successor this entry was chosen to fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct IntroducedBy {
    pub version_element: ElementId,
    pub broken_element: ElementId,
}

/// A currently-unsatisfied successor of an in-solution element, with the
/// validation priority it was discovered at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokenSuccessor {
    pub element: ElementId,
    pub priority: usize,
}

/// The per-element payload of a solution.
#[derive(Debug, Clone, Default)]
pub struct PackageEntry {
    /// Immutable by the search.
    pub sticked: bool,
    pub autoremoved: bool,
    pub introduced_by: Option<IntroducedBy>,
    pub broken_successors: Vec<BrokenSuccessor>,
    /// Elements previously undone in this slot on this branch; never
    /// re-introduced.
    pub rejected_conflictors: BTreeSet<ElementId>,
}

/// A shared entry map with its fork accounting.
#[derive(Debug, Default)]
pub struct PackageEntryMap {
    pub entries: BTreeMap<ElementId, PackageEntry>,
    forked_count: Cell<usize>,
}

impl Clone for PackageEntryMap {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            forked_count: Cell::new(0),
        }
    }
}

/// A candidate action: replace `old_element` with `new_element`.
#[derive(Debug, Clone)]
pub struct Action {
    pub old_element: Option<ElementId>,
    pub new_element: ElementId,
    pub introduced_by: Option<IntroducedBy>,
    pub broken_priority: usize,
    pub elements_to_reject: Vec<ElementId>,
    pub profit: Option<ScoreChange>,
}

/// One candidate system state in the search.
pub struct Solution {
    pub id: u64,
    pub level: usize,
    pub score: i64,
    pub finished: bool,
    pub pending_action: Option<Action>,
    /// Elements inserted by the search, in time order.
    pub inserted_elements: Vec<ElementId>,

    parent: Option<Arc<Solution>>,
    master_entries: Option<Arc<PackageEntryMap>>,
    added_entries: Arc<PackageEntryMap>,
    removed_entries: BTreeSet<ElementId>,
}

impl Solution {
    fn new_root() -> Self {
        Self {
            id: 0,
            level: 0,
            score: 0,
            finished: false,
            pending_action: None,
            inserted_elements: Vec::new(),
            parent: None,
            master_entries: None,
            added_entries: Arc::new(PackageEntryMap::default()),
            removed_entries: BTreeSet::new(),
        }
    }

    /// Materialize the clone delta from the parent. Must be called once
    /// before the solution is mutated.
    pub fn prepare(&mut self) {
        let parent = self
            .parent
            .take()
            .expect("internal error: undefined master solution");

        match &parent.master_entries {
            None => {
                // parent is a master solution, build a slave on top of it
                self.master_entries = Some(parent.added_entries.clone());
            }
            Some(master) => {
                let forked_count = master.forked_count.get() + parent.added_entries.entries.len();
                if forked_count > master.entries.len() {
                    master.forked_count.set(0);

                    // master is overdiverted, collapse into a new one
                    let mut merged = master.entries.clone();
                    for element in &parent.removed_entries {
                        merged.remove(element);
                    }
                    for (element, entry) in &parent.added_entries.entries {
                        merged.insert(*element, entry.clone());
                    }
                    self.master_entries = Some(Arc::new(PackageEntryMap {
                        entries: merged,
                        forked_count: Cell::new(0),
                    }));
                } else {
                    master.forked_count.set(forked_count);
                    self.master_entries = Some(master.clone());
                    self.added_entries = Arc::new((*parent.added_entries).clone());
                    self.removed_entries = parent.removed_entries.clone();
                }
            }
        }
    }

    pub fn get_package_entry(&self, element: ElementId) -> Option<&PackageEntry> {
        if let Some(entry) = self.added_entries.entries.get(&element) {
            return Some(entry);
        }
        if self.removed_entries.contains(&element) {
            return None;
        }
        self.master_entries
            .as_ref()
            .and_then(|master| master.entries.get(&element))
    }

    pub(crate) fn insert_entry(&mut self, element: ElementId, entry: PackageEntry) {
        self.removed_entries.remove(&element);
        Arc::make_mut(&mut self.added_entries)
            .entries
            .insert(element, entry);
    }

    pub(crate) fn remove_entry(&mut self, element: ElementId) {
        Arc::make_mut(&mut self.added_entries)
            .entries
            .remove(&element);
        let in_master = self
            .master_entries
            .as_ref()
            .map(|master| master.entries.contains_key(&element))
            .unwrap_or(false);
        if in_master {
            self.removed_entries.insert(element);
        }
    }

    /// All elements present, master entries first.
    pub fn get_elements(&self) -> Vec<ElementId> {
        let mut result: Vec<ElementId> = Vec::new();
        if let Some(master) = &self.master_entries {
            result.extend(
                master
                    .entries
                    .keys()
                    .filter(|element| {
                        !self.removed_entries.contains(element)
                            && !self.added_entries.entries.contains_key(element)
                    })
                    .copied(),
            );
        }
        result.extend(self.added_entries.entries.keys().copied());
        result.sort_unstable();
        result
    }

    /// All `(version element, broken successor)` pairs of the solution.
    pub fn broken_pairs(&self) -> Vec<(ElementId, BrokenSuccessor)> {
        let mut result = Vec::new();
        for element in self.get_elements() {
            if let Some(entry) = self.get_package_entry(element) {
                for broken in &entry.broken_successors {
                    result.push((element, *broken));
                }
            }
        }
        result
    }
}

/// Owns the dependency graph and hands out solution instances; all
/// mutations of solutions go through here.
pub struct SolutionStorage {
    graph: DependencyGraph,
    next_free_id: u64,
}

impl SolutionStorage {
    pub fn new(config: &Config, cache: Arc<Cache>, dummy_package_name: String) -> Self {
        Self {
            graph: DependencyGraph::new(config, cache, dummy_package_name),
            next_free_id: 1,
        }
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut DependencyGraph {
        &mut self.graph
    }

    /// Build the dependency graph closure and the initial solution.
    pub fn prepare_for_resolving(
        &mut self,
        old_packages: std::collections::HashMap<String, Arc<crate::cache::BinaryVersion>>,
        initial_packages: std::collections::BTreeMap<String, InitialPackageEntry>,
    ) -> Solution {
        let contents = self.graph.prepare(old_packages, initial_packages);
        let mut solution = Solution::new_root();
        for (element, sticked) in contents {
            solution.insert_entry(
                element,
                PackageEntry {
                    sticked,
                    ..PackageEntry::default()
                },
            );
        }
        solution
    }

    /// O(1) clone; the delta is materialized later by `prepare()`.
    pub fn clone_solution(&mut self, parent: &Arc<Solution>) -> Solution {
        let id = self.next_free_id;
        self.next_free_id += 1;
        Solution {
            id,
            level: parent.level,
            score: parent.score,
            finished: false,
            pending_action: None,
            inserted_elements: parent.inserted_elements.clone(),
            parent: Some(parent.clone()),
            master_entries: None,
            added_entries: Arc::new(PackageEntryMap::default()),
            removed_entries: BTreeSet::new(),
        }
    }

    /// The element of `element`'s package currently present in the
    /// solution, if any.
    pub fn present_family_member(
        &self,
        solution: &Solution,
        element: ElementId,
    ) -> Option<ElementId> {
        if self.graph.is_unsatisfied_marker(element) {
            return solution.get_package_entry(element).map(|_| element);
        }
        self.graph
            .conflicting_elements(element)
            .iter()
            .copied()
            .find(|&member| solution.get_package_entry(member).is_some())
    }

    fn present_version_of_package(
        &self,
        solution: &Solution,
        package_name: &str,
    ) -> Option<ElementId> {
        // any family member present in the solution occupies the slot
        self.graph
            .related_family(package_name)
            .iter()
            .copied()
            .find(|&member| solution.get_package_entry(member).is_some())
    }

    /// Whether an element of the solution is satisfied: positive elements
    /// need a present successor, anti elements need the constrained package
    /// to hold a non-conflicting element (or none at all).
    pub fn verify_element(&self, solution: &Solution, element: ElementId) -> bool {
        let successors = self.graph.successors(element);
        match self.graph.anti_target(element) {
            None => successors
                .iter()
                .any(|&successor| solution.get_package_entry(successor).is_some()),
            Some(target_package) => {
                let marker_present = successors.iter().any(|&successor| {
                    self.graph.is_unsatisfied_marker(successor)
                        && solution.get_package_entry(successor).is_some()
                });
                if marker_present {
                    return true;
                }
                match self.present_version_of_package(solution, target_package) {
                    None => true,
                    Some(occupant) => successors.contains(&occupant),
                }
            }
        }
    }

    /// Check whether `element` could be placed: its slot must be free, or
    /// held by a modifiable entry not rejecting it. Returns the would-be
    /// displaced element on success.
    pub fn simulate_set_package_entry(
        &self,
        solution: &Solution,
        element: ElementId,
    ) -> Option<Option<ElementId>> {
        match self.present_family_member(solution, element) {
            None => Some(None),
            Some(occupant) if occupant == element => Some(None),
            Some(occupant) => {
                let entry = solution
                    .get_package_entry(occupant)
                    .expect("internal error: present element has no entry");
                if entry.sticked || entry.rejected_conflictors.contains(&element) {
                    None
                } else {
                    Some(Some(occupant))
                }
            }
        }
    }

    /// Place `new_element` into the solution, displacing `displaced` if
    /// given. The slot's rejection history survives the displacement.
    pub fn set_package_entry(
        &mut self,
        solution: &mut Solution,
        new_element: ElementId,
        mut entry: PackageEntry,
        displaced: Option<ElementId>,
    ) {
        self.graph.unfold(new_element);

        if let Some(displaced) = displaced {
            if displaced != new_element {
                if let Some(displaced_entry) = solution.get_package_entry(displaced) {
                    debug_assert!(!displaced_entry.sticked);
                    entry
                        .rejected_conflictors
                        .extend(displaced_entry.rejected_conflictors.iter().copied());
                }
                solution.remove_entry(displaced);
            }
        }

        solution.insert_entry(new_element, entry);
    }

    /// The user-facing reason a broken element attributes to the version
    /// element exposing it.
    pub fn reason_of(
        &self,
        broken_element: ElementId,
        version_element: ElementId,
    ) -> crate::solver::Reason {
        use crate::solver::graph::Element;
        match self.graph.element(broken_element) {
            Element::Relation(relation) => crate::solver::Reason::RelationExpression {
                version: self
                    .graph
                    .version_of(version_element)
                    .cloned()
                    .expect("internal error: a reason parent is not a version element"),
                dependency_kind: relation.kind,
                relation_expression: relation.expression.clone(),
            },
            Element::Sync(_) => crate::solver::Reason::Synchronization {
                package_name: self
                    .graph
                    .package_name_of(version_element)
                    .expect("internal error: a reason parent is not a version element")
                    .to_string(),
            },
            _ => panic!("internal error: broken element carries no reason"),
        }
    }

    /// Render a `(version element, broken element)` pair for diagnostics.
    pub fn describe_reason(&self, broken_element: ElementId, version_element: ElementId) -> String {
        format!(
            "{}: {}",
            self.graph.describe(version_element),
            self.graph.describe(broken_element)
        )
    }

    /// Record `element` as rejected in the entry occupying its slot, or in
    /// the empty sentinel's entry when the slot is vacant.
    pub fn set_rejection(&mut self, solution: &mut Solution, element: ElementId) {
        let holder = match self.present_family_member(solution, element) {
            Some(occupant) if occupant != element => Some(occupant),
            Some(_) => return, // cannot reject the present element in itself
            None => self.graph.corresponding_empty_element(element),
        };
        let Some(holder) = holder else {
            return;
        };
        let mut entry = solution.get_package_entry(holder).cloned().unwrap_or_default();
        entry.rejected_conflictors.insert(element);
        solution.insert_entry(holder, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheBuilder;

    fn storage() -> SolutionStorage {
        let cache = Arc::new(CacheBuilder::new().finish());
        SolutionStorage::new(&Config::new(), cache, "dummy-package".to_string())
    }

    fn entry() -> PackageEntry {
        PackageEntry::default()
    }

    // helper constructing bare version elements straight through the graph
    fn element(storage: &mut SolutionStorage, name: &str) -> ElementId {
        storage.graph_mut().version_element(name, None).unwrap()
    }

    #[test]
    fn test_root_solution_entries() {
        let mut storage = storage();
        let a = element(&mut storage, "a");
        let mut solution = Solution::new_root();
        solution.insert_entry(a, entry());
        assert!(solution.get_package_entry(a).is_some());
        assert_eq!(solution.get_elements(), vec![a]);
    }

    #[test]
    fn test_clone_then_prepare_sees_parent_entries() {
        let mut storage = storage();
        let a = element(&mut storage, "a");
        let b = element(&mut storage, "b");

        let mut root = Solution::new_root();
        root.insert_entry(a, entry());
        let root = Arc::new(root);

        let mut child = storage.clone_solution(&root);
        child.prepare();
        assert!(child.get_package_entry(a).is_some());

        child.insert_entry(b, entry());
        assert!(child.get_package_entry(b).is_some());
        // the parent master map was not touched
        assert!(root.get_package_entry(b).is_none());
    }

    #[test]
    fn test_removed_entries_mask_master() {
        let mut storage = storage();
        let a = element(&mut storage, "a");

        let mut root = Solution::new_root();
        root.insert_entry(a, entry());
        let root = Arc::new(root);

        let mut child = storage.clone_solution(&root);
        child.prepare();
        child.remove_entry(a);
        assert!(child.get_package_entry(a).is_none());
        assert!(!child.get_elements().contains(&a));
        assert!(root.get_package_entry(a).is_some());
    }

    /// Structural sharing soundness: lookups agree whether or not the
    /// delta has been collapsed into a fresh master.
    #[test]
    fn test_lookup_agrees_across_collapse() {
        let mut storage = storage();
        let elements: Vec<ElementId> = ["a", "b", "c", "d"]
            .iter()
            .map(|name| element(&mut storage, name))
            .collect();

        let mut root = Solution::new_root();
        root.insert_entry(elements[0], entry());
        let mut generation = Arc::new(root);

        // repeatedly fork and mutate so both prepare() paths are taken
        for (index, &new_element) in elements.iter().enumerate().skip(1) {
            for _ in 0..4 {
                let mut fork = storage.clone_solution(&generation);
                fork.prepare();
                let _ = fork.get_elements();
            }
            let mut child = storage.clone_solution(&generation);
            child.prepare();
            child.insert_entry(new_element, entry());
            if index == 2 {
                child.remove_entry(elements[0]);
            }
            generation = Arc::new(child);
        }

        let final_solution = &generation;
        assert!(final_solution.get_package_entry(elements[0]).is_none());
        for &element in &elements[1..] {
            assert!(final_solution.get_package_entry(element).is_some());
        }
    }

    #[test]
    fn test_rejection_is_carried_across_displacement() {
        let mut storage = storage();
        let cache = Arc::new({
            let mut builder = CacheBuilder::new();
            builder.add_binary_version(crate::cache::BinaryVersionBuilder::new("p", "1.0"));
            builder.add_binary_version(crate::cache::BinaryVersionBuilder::new("p", "2.0"));
            builder.finish()
        });
        let v1 = cache.binary_package("p").unwrap().specific_version("1.0").unwrap().clone();
        let v2 = cache.binary_package("p").unwrap().specific_version("2.0").unwrap().clone();
        let e1 = storage.graph_mut().version_element("p", Some(&v1)).unwrap();
        let e2 = storage.graph_mut().version_element("p", Some(&v2)).unwrap();
        let empty = storage.graph_mut().version_element("p", None).unwrap();

        let mut solution = Solution::new_root();
        solution.insert_entry(empty, entry());

        // place v1, rejecting the sentinel for this branch
        storage.set_package_entry(&mut solution, e1, entry(), Some(empty));
        storage.set_rejection(&mut solution, empty);
        assert!(storage.simulate_set_package_entry(&solution, empty).is_none());
        assert_eq!(
            storage.simulate_set_package_entry(&solution, e2),
            Some(Some(e1))
        );

        // replacing v1 by v2 keeps the sentinel rejected
        storage.set_package_entry(&mut solution, e2, entry(), Some(e1));
        storage.set_rejection(&mut solution, e1);
        assert!(storage.simulate_set_package_entry(&solution, empty).is_none());
        assert!(storage.simulate_set_package_entry(&solution, e1).is_none());
    }
}
