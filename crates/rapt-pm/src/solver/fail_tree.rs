//! The decision-fail tree: a factored explanation of why every search
//! branch died, kept only until the first solution is found.

use std::collections::BTreeSet;

use crate::solver::graph::ElementId;
use crate::solver::solution::{IntroducedBy, Solution, SolutionStorage};

/// One step of a failed decision chain.
#[derive(Debug, Clone)]
struct Decision {
    introduced_by: IntroducedBy,
    level: usize,
    /// The element the decision inserted; empty for the final breakage.
    inserted_element: Option<ElementId>,
}

/// The decision chain of one failed leaf, with the solution's insertion
/// history used for dominance factoring.
#[derive(Debug, Clone)]
struct FailItem {
    decisions: Vec<Decision>,
    inserted_elements: Vec<ElementId>,
}

/// A fail item is dominant w.r.t. a diverge point if the element the branch
/// diverged on did not take part in its final breakage.
fn is_dominant(item: &FailItem, diverged_element: Option<ElementId>) -> bool {
    !item
        .decisions
        .iter()
        .any(|decision| decision.inserted_element == diverged_element)
}

#[derive(Debug, Default)]
pub struct DecisionFailTree {
    fail_items: Vec<FailItem>,
}

impl DecisionFailTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.fail_items.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.fail_items.is_empty()
    }

    /// Reconstruct the decision chain that led to a dead solution and fold
    /// it into the tree, dropping dominated duplicates.
    pub fn add_failed_solution(
        &mut self,
        storage: &SolutionStorage,
        solution: &Solution,
        last_introduced_by: IntroducedBy,
    ) {
        let fail_item = FailItem {
            decisions: Self::get_decisions(storage, solution, last_introduced_by),
            inserted_elements: solution.inserted_elements.clone(),
        };

        let diverge_offset = |left: &[ElementId], right: &[ElementId]| -> usize {
            let mut offset = 0;
            while offset < left.len()
                && offset < right.len()
                && left[offset] == right[offset]
            {
                offset += 1;
            }
            offset
        };

        let mut will_be_added = true;
        self.fail_items.retain(|existing| {
            let offset = diverge_offset(&existing.inserted_elements, &fail_item.inserted_elements);
            let existing_diverged = existing.inserted_elements.get(offset).copied();
            let new_diverged = fail_item.inserted_elements.get(offset).copied();
            if is_dominant(existing, existing_diverged) {
                will_be_added = false;
                true
            } else {
                // drop the existing item if the new one dominates it
                !is_dominant(&fail_item, new_diverged)
            }
        });

        if will_be_added {
            self.fail_items.push(fail_item);
        }
    }

    fn get_decisions(
        storage: &SolutionStorage,
        solution: &Solution,
        last_introduced_by: IntroducedBy,
    ) -> Vec<Decision> {
        let mut result = Vec::new();
        let mut stack = vec![Decision {
            introduced_by: last_introduced_by,
            level: 0,
            inserted_element: None,
        }];

        while let Some(item) = stack.pop() {
            let introduced_by = item.introduced_by;
            let level = item.level;
            result.push(item);

            // the decision that placed the version element itself
            if let Some(entry) = solution.get_package_entry(introduced_by.version_element) {
                if let Some(parent_introduced_by) = entry.introduced_by {
                    stack.push(Decision {
                        introduced_by: parent_introduced_by,
                        level: level + 1,
                        inserted_element: Some(introduced_by.version_element),
                    });
                }
            }

            // the decisions holding the elements that keep the broken
            // element unsatisfiable
            if !storage.verify_element(solution, introduced_by.broken_element) {
                let mut processed_conflictors: BTreeSet<ElementId> = BTreeSet::new();
                for &successor in storage.graph().successors(introduced_by.broken_element) {
                    if storage
                        .simulate_set_package_entry(solution, successor)
                        .is_none()
                    {
                        if let Some(conflictor) =
                            storage.present_family_member(solution, successor)
                        {
                            if processed_conflictors.insert(conflictor) {
                                if let Some(entry) = solution.get_package_entry(conflictor) {
                                    if let Some(conflictor_introduced_by) = entry.introduced_by {
                                        stack.push(Decision {
                                            introduced_by: conflictor_introduced_by,
                                            level: level + 1,
                                            inserted_element: Some(conflictor),
                                        });
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        result
    }

    /// Render the tree for the fatal diagnostic.
    pub fn to_string(&self, storage: &SolutionStorage) -> String {
        let mut result = String::new();
        for item in &self.fail_items {
            for decision in &item.decisions {
                result.push_str(&" ".repeat(decision.level * 2));
                result.push_str(&storage.describe_reason(
                    decision.introduced_by.broken_element,
                    decision.introduced_by.version_element,
                ));
                result.push_str(" -> ");
                match decision.inserted_element {
                    Some(element) => result.push_str(&storage.graph().describe(element)),
                    None => result.push_str("no solutions"),
                }
                result.push('\n');
            }
            result.push('\n');
        }
        result
    }
}
