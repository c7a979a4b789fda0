//! The best-first search over candidate solutions.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use rapt_version::{RelationExpression, RelationLine};

use crate::cache::version::DependencyKind;
use crate::cache::{BinaryVersion, BinaryVersionBuilder, Cache};
use crate::config::{Config, ResolverType};
use crate::error::{RaptError, Result};
use crate::solver::auto_removal::{AutoRemovalAllow, AutoRemovalPossibility};
use crate::solver::fail_tree::DecisionFailTree;
use crate::solver::graph::{Element, ElementId, InitialPackageEntry};
use crate::solver::score::ScoreManager;
use crate::solver::solution::{
    Action, BrokenSuccessor, IntroducedBy, PackageEntry, Solution, SolutionStorage,
};
use crate::solver::{Offer, Reason, SuggestedPackage, UserAnswer};

/// The synthetic package carrying satisfy/unsatisfy requests as ordinary
/// dependency problems.
const DUMMY_PACKAGE_NAME: &str = "dummy-package";

type SolutionKey = (i64, Reverse<u64>);

fn solution_key(solution: &Solution) -> SolutionKey {
    // score ascending, id descending: the map's last entry is the best
    (solution.score, Reverse(solution.id))
}

/// The resolver: collects user requests, then searches for a consistent
/// target state and proposes it through a callback.
pub struct NativeResolver {
    config: Arc<Config>,
    cache: Arc<Cache>,
    score_manager: ScoreManager,
    old_packages: HashMap<String, Arc<BinaryVersion>>,
    initial_packages: BTreeMap<String, InitialPackageEntry>,
    satisfy_expressions: Vec<RelationExpression>,
    unsatisfy_expressions: Vec<RelationExpression>,
    manually_modified: BTreeSet<String>,
}

impl NativeResolver {
    pub fn new(config: Arc<Config>, cache: Arc<Cache>) -> Self {
        let score_manager = ScoreManager::new(&config, cache.clone());
        let mut resolver = Self {
            config,
            cache,
            score_manager,
            old_packages: HashMap::new(),
            initial_packages: BTreeMap::new(),
            satisfy_expressions: Vec::new(),
            unsatisfy_expressions: Vec::new(),
            manually_modified: BTreeSet::new(),
        };
        resolver.import_installed_versions();
        resolver
    }

    fn import_installed_versions(&mut self) {
        for version in self.cache.get_installed_versions() {
            let package_name = version.package_name.clone();
            self.old_packages
                .insert(package_name.clone(), version.clone());
            self.initial_packages
                .entry(package_name)
                .or_default()
                .version = Some(version);
        }

        let debugging = self.config.debug_resolver;
        for package_name in self
            .cache
            .system_state()
            .reinstall_required_package_names()
        {
            if debugging {
                log::debug!("the package '{}' needs a reinstall", package_name);
            }
            let entry = self.initial_packages.entry(package_name.clone()).or_default();
            entry.version = None; // removed by default
            self.manually_modified.insert(package_name);
        }
    }

    /// Schedule the installation of one specific version.
    pub fn install_version(&mut self, version: &Arc<BinaryVersion>) -> Result<()> {
        let package_name = version.package_name.clone();
        let debugging = self.config.debug_resolver;
        let entry = self.initial_packages.entry(package_name.clone()).or_default();

        let already_there = entry
            .version
            .as_ref()
            .map(|v| v.version_string == version.version_string)
            .unwrap_or(false);
        if !already_there {
            if entry.sticked {
                return Err(RaptError::Reschedule(package_name));
            }
            if debugging {
                log::debug!(
                    "install package '{}', version '{}'",
                    package_name,
                    version.version_string
                );
            }
            entry.modified = true;
            entry.version = Some(version.clone());
        }

        entry.sticked = true;
        self.manually_modified.insert(package_name);
        Ok(())
    }

    /// Schedule the removal of a package.
    pub fn remove_package(&mut self, package_name: &str) -> Result<()> {
        let entry = self
            .initial_packages
            .entry(package_name.to_string())
            .or_default();
        if entry.version.is_some() && entry.sticked {
            return Err(RaptError::Reschedule(package_name.to_string()));
        }
        entry.sticked = true;
        entry.modified = true;
        entry.version = None;
        self.manually_modified.insert(package_name.to_string());

        if self.config.debug_resolver {
            log::debug!("removing package '{}'", package_name);
        }
        Ok(())
    }

    /// Require that a relation expression ends up satisfied.
    pub fn satisfy_relation_expression(&mut self, expression: RelationExpression) {
        if self.config.debug_resolver {
            log::debug!("strictly satisfying relation '{}'", expression);
        }
        self.satisfy_expressions.push(expression);
    }

    /// Require that a relation expression ends up unsatisfied.
    pub fn unsatisfy_relation_expression(&mut self, expression: RelationExpression) {
        if self.config.debug_resolver {
            log::debug!("strictly unsatisfying relation '{}'", expression);
        }
        self.unsatisfy_expressions.push(expression);
    }

    /// Move every non-sticked installed package to its policy version.
    pub fn upgrade(&mut self) -> Result<()> {
        let package_names: Vec<String> = self
            .initial_packages
            .iter()
            .filter(|(_, entry)| entry.version.is_some() && !entry.sticked)
            .map(|(name, _)| name.clone())
            .collect();

        for package_name in package_names {
            let supposed = self
                .cache
                .policy_version(&package_name)
                .ok_or_else(|| RaptError::NoAvailableVersion {
                    name: package_name.clone(),
                })?;
            let entry = self
                .initial_packages
                .get_mut(&package_name)
                .expect("internal error: upgrade lost an initial package");
            let already_there = entry
                .version
                .as_ref()
                .map(|v| v.version_string == supposed.version_string)
                .unwrap_or(false);
            if !already_there {
                entry.modified = true;
                entry.version = Some(supposed);
            }
        }
        Ok(())
    }

    /// Override the auto-installed flag the offer reports for a package.
    pub fn set_automatically_installed_flag(&mut self, package_name: &str, value: bool) {
        if value {
            self.manually_modified.remove(package_name);
        } else {
            self.manually_modified.insert(package_name.to_string());
        }
    }

    fn debug_solution(&self, solution: &Solution, message: &str) {
        log::debug!(
            "{}({}:{}) {}",
            " ".repeat(solution.level),
            solution.id,
            solution.score,
            message
        );
    }

    /// Wrap the collected requests into the dummy version so the engine
    /// sees them as ordinary dependency problems.
    fn require_strict_relation_expressions(
        &self,
        initial_packages: &mut BTreeMap<String, InitialPackageEntry>,
    ) {
        let dummy = BinaryVersionBuilder::new(DUMMY_PACKAGE_NAME, "")
            .relation(
                DependencyKind::Depends,
                RelationLine(self.satisfy_expressions.clone()),
            )
            .relation(
                DependencyKind::Breaks,
                RelationLine(self.unsatisfy_expressions.clone()),
            )
            .source(DUMMY_PACKAGE_NAME, "")
            .finish();
        initial_packages.insert(
            DUMMY_PACKAGE_NAME.to_string(),
            InitialPackageEntry {
                version: Some(Arc::new(dummy)),
                sticked: true,
                modified: false,
            },
        );
    }

    /// Run the search. The callback inspects each proposed offer and
    /// accepts, declines or abandons.
    pub fn resolve<F>(&mut self, mut callback: F) -> Result<bool>
    where
        F: FnMut(&Offer) -> UserAnswer,
    {
        let debugging = self.config.debug_resolver;
        let track_reasons = self.config.track_reasons;
        let max_solution_count = self.config.max_solution_count;
        let possibility = AutoRemovalPossibility::new(&self.config)?;
        let mut there_were_drops = false;

        if debugging {
            log::debug!("started resolving");
        }

        let mut initial_packages = self.initial_packages.clone();
        self.require_strict_relation_expressions(&mut initial_packages);

        let mut storage = SolutionStorage::new(
            &self.config,
            self.cache.clone(),
            DUMMY_PACKAGE_NAME.to_string(),
        );
        let mut fail_tree = DecisionFailTree::new();
        let mut any_solution_found = false;

        let mut initial_solution =
            storage.prepare_for_resolving(self.old_packages.clone(), initial_packages);
        self.initial_validate_pass(&mut storage, &mut initial_solution);

        let mut solutions: BTreeMap<SolutionKey, Solution> = BTreeMap::new();
        solutions.insert(solution_key(&initial_solution), initial_solution);

        // per broken element, how often it failed during this resolve
        let mut fail_counts: HashMap<ElementId, usize> = HashMap::new();

        while !solutions.is_empty() {
            let chosen_key = self.choose_solution(&solutions);
            let mut current = solutions
                .remove(&chosen_key)
                .expect("internal error: chosen solution vanished");

            if current.pending_action.is_some() {
                current.prepare();
                self.post_apply_action(&mut storage, &mut current);
            }

            // one-candidate problems are fixed in place; each fix may break
            // earlier-checked packages, so recheck until stable
            let mut check_failed;
            let mut possible_actions: Vec<Action> = Vec::new();
            loop {
                check_failed = false;
                let Some((version_element, broken_successor)) =
                    self.get_broken_pair(&storage, &current, &fail_counts)
                else {
                    break;
                };
                check_failed = true;

                if debugging {
                    let message = format!(
                        "problem ({}:{}): {}: {}",
                        storage.graph().type_priority(broken_successor.element),
                        broken_successor.priority,
                        storage.graph().describe(version_element),
                        storage.graph().describe(broken_successor.element)
                    );
                    self.debug_solution(&current, &message);
                }

                possible_actions = self.generate_possible_actions(
                    &mut storage,
                    &current,
                    version_element,
                    broken_successor.element,
                    debugging,
                );

                let introduced_by = IntroducedBy {
                    version_element,
                    broken_element: broken_successor.element,
                };
                if possible_actions.is_empty() && !any_solution_found {
                    fail_tree.add_failed_solution(&storage, &current, introduced_by);
                } else {
                    for action in &mut possible_actions {
                        action.introduced_by = Some(introduced_by);
                        action.broken_priority = broken_successor.priority;
                    }
                }

                *fail_counts.entry(broken_successor.element).or_insert(0) += 1;

                if possible_actions.len() == 1 {
                    self.calculate_profits(&storage, &mut possible_actions);
                    let action = possible_actions.pop().expect("internal error: empty fast path");
                    self.pre_apply_action(&storage, &mut current, action, debugging);
                    self.post_apply_action(&mut storage, &mut current);
                    continue;
                }
                break;
            }

            if !check_failed {
                if !current.finished {
                    if debugging {
                        self.debug_solution(&current, "finished");
                    }
                    current.finished = true;
                }
                if !any_solution_found {
                    any_solution_found = true;
                    fail_tree.clear(); // no need to store the tree anymore
                }

                let key = solution_key(&current);
                solutions.insert(key, current);
                if self.choose_solution(&solutions) != key {
                    continue; // ok, process the other solution first
                }
                let mut current = solutions
                    .remove(&key)
                    .expect("internal error: finished solution vanished");

                if !self.clean_automatically_installed(
                    &mut storage,
                    &mut current,
                    &possibility,
                    debugging,
                ) {
                    if debugging {
                        self.debug_solution(&current, "auto-removal blocked by rejects, discarding");
                    }
                    continue;
                }

                self.final_verify_solution(&storage, &current);

                if debugging {
                    self.debug_solution(&current, "proposing this solution");
                }
                let offer = self.build_offer(&storage, &current, track_reasons);
                match callback(&offer) {
                    UserAnswer::Accept => return Ok(true),
                    UserAnswer::Abandon => return Ok(false),
                    UserAnswer::Decline => {
                        if debugging {
                            self.debug_solution(&current, "declined");
                        }
                    }
                }
            } else if !possible_actions.is_empty() {
                self.calculate_profits(&storage, &mut possible_actions);
                // best profits first
                possible_actions.sort_by(|left, right| {
                    let left_value = self
                        .score_manager
                        .score_change_value(left.profit.as_ref().expect("profit missing"));
                    let right_value = self
                        .score_manager
                        .score_change_value(right.profit.as_ref().expect("profit missing"));
                    right_value.cmp(&left_value)
                });

                let parent = Arc::new(current);
                for action in possible_actions {
                    let mut cloned = storage.clone_solution(&parent);
                    self.pre_apply_action(&storage, &mut cloned, action, debugging);
                    solutions.insert(solution_key(&cloned), cloned);
                }

                while solutions.len() > max_solution_count {
                    let (_, dropped) = solutions
                        .pop_first()
                        .expect("internal error: nothing to drop");
                    if debugging {
                        self.debug_solution(&dropped, "dropped");
                    }
                    if !there_were_drops {
                        there_were_drops = true;
                        log::warn!(
                            "some solutions were dropped, you may want to increase the value of \
                             the 'cupt::resolver::max-solution-count' option"
                        );
                    }
                }
            } else if debugging {
                self.debug_solution(&current, "no solutions");
            }
        }

        if !any_solution_found {
            return Err(RaptError::NoSolution {
                explanation: fail_tree.to_string(&storage),
            });
        }
        Ok(false)
    }

    fn choose_solution(&self, solutions: &BTreeMap<SolutionKey, Solution>) -> SolutionKey {
        match self.config.resolver_type {
            ResolverType::Fair => *solutions
                .last_key_value()
                .expect("internal error: choosing from no solutions")
                .0,
            ResolverType::Full => solutions
                .iter()
                .find(|(_, solution)| !solution.finished)
                .map(|(key, _)| *key)
                .unwrap_or_else(|| {
                    *solutions
                        .last_key_value()
                        .expect("internal error: choosing from no solutions")
                        .0
                }),
        }
    }

    fn initial_validate_pass(&self, storage: &mut SolutionStorage, solution: &mut Solution) {
        for element in solution.get_elements() {
            self.validate_element(storage, solution, element, 0);
        }
    }

    fn validate_element(
        &self,
        storage: &mut SolutionStorage,
        solution: &mut Solution,
        element: ElementId,
        priority: usize,
    ) {
        let successors = storage.graph().successors(element).to_vec();
        let mut broken_successors = Vec::new();
        for successor in successors {
            if !storage.verify_element(solution, successor) {
                broken_successors.push(BrokenSuccessor {
                    element: successor,
                    priority,
                });
            }
        }
        if !broken_successors.is_empty() {
            let mut entry = solution
                .get_package_entry(element)
                .cloned()
                .expect("internal error: validating an absent element");
            entry.broken_successors = broken_successors;
            storage.set_package_entry(solution, element, entry, None);
        }
    }

    /// Refresh the broken-successor caches after `old` gave way to `new`.
    fn validate_changed_package(
        &self,
        storage: &mut SolutionStorage,
        solution: &mut Solution,
        old_element: Option<ElementId>,
        new_element: ElementId,
        priority: usize,
    ) {
        self.validate_element(storage, solution, new_element, priority);

        // an insertion with no displacee still vacates the "not installed"
        // state, which anti elements may have relied on
        let old_element =
            old_element.or_else(|| storage.graph_mut().corresponding_empty_element(new_element));

        if let Some(old_element) = old_element {
            // invalidate those which depended on the old element
            for predecessor in storage.graph().predecessors(old_element).to_vec() {
                if !storage.verify_element(solution, predecessor) {
                    for dependent in storage.graph().predecessors(predecessor).to_vec() {
                        let Some(entry) = solution.get_package_entry(dependent) else {
                            continue;
                        };
                        if entry
                            .broken_successors
                            .iter()
                            .any(|broken| broken.element == predecessor)
                        {
                            continue;
                        }
                        let mut entry = entry.clone();
                        entry.broken_successors.push(BrokenSuccessor {
                            element: predecessor,
                            priority,
                        });
                        storage.set_package_entry(solution, dependent, entry, None);
                    }
                }
            }
        }

        // revalidate those which depend on the new element
        for predecessor in storage.graph().predecessors(new_element).to_vec() {
            for dependent in storage.graph().predecessors(predecessor).to_vec() {
                let Some(entry) = solution.get_package_entry(dependent) else {
                    continue;
                };
                let was_broken = entry
                    .broken_successors
                    .iter()
                    .any(|broken| broken.element == predecessor);
                if was_broken && storage.verify_element(solution, predecessor) {
                    let mut entry = entry.clone();
                    entry
                        .broken_successors
                        .retain(|broken| broken.element != predecessor);
                    storage.set_package_entry(solution, dependent, entry, None);
                }
            }
        }
    }

    /// The worst broken pair: highest type priority, then discovery
    /// priority, then accumulated fail count, with the package name as the
    /// final tie-break.
    fn get_broken_pair(
        &self,
        storage: &SolutionStorage,
        solution: &Solution,
        fail_counts: &HashMap<ElementId, usize>,
    ) -> Option<(ElementId, BrokenSuccessor)> {
        let fail_value =
            |element: ElementId| fail_counts.get(&element).copied().unwrap_or(0usize);
        solution
            .broken_pairs()
            .into_iter()
            .max_by(|left, right| {
                let graph = storage.graph();
                graph
                    .type_priority(left.1.element)
                    .cmp(&graph.type_priority(right.1.element))
                    .then_with(|| left.1.priority.cmp(&right.1.priority))
                    .then_with(|| fail_value(left.1.element).cmp(&fail_value(right.1.element)))
                    .then_with(|| {
                        let left_name = graph.package_name_of(left.0).unwrap_or("");
                        let right_name = graph.package_name_of(right.0).unwrap_or("");
                        right_name.cmp(left_name)
                    })
            })
    }

    /// Would switching to `candidate` possibly help with `broken_element`?
    /// Rejects candidates that carry the same problem, or whose relevant
    /// relations give no more room than the broken one.
    fn makes_sense_to_modify_package(
        &self,
        storage: &mut SolutionStorage,
        solution: &Solution,
        candidate: ElementId,
        broken_element: ElementId,
        debugging: bool,
    ) -> bool {
        storage.graph_mut().unfold(candidate);

        let broken_priority = storage.graph().type_priority(broken_element);
        let candidate_successors = storage.graph().successors(candidate).to_vec();

        for &successor in &candidate_successors {
            if storage.graph().type_priority(successor) < broken_priority {
                continue;
            }
            if successor == broken_element {
                if debugging {
                    self.debug_solution(
                        solution,
                        &format!(
                            "not considering {}: it has the same problem",
                            storage.graph().describe(candidate)
                        ),
                    );
                }
                return false;
            }
        }

        let broken_element_successors = storage.graph().successors(broken_element).to_vec();
        for &successor in &candidate_successors {
            if storage.graph().type_priority(successor) < broken_priority {
                continue;
            }
            // a successor giving equal or less room cannot be a resolution
            let is_more_wide = storage
                .graph()
                .successors(successor)
                .iter()
                .any(|element| !broken_element_successors.contains(element));
            if !is_more_wide {
                if debugging {
                    self.debug_solution(
                        solution,
                        &format!(
                            "not considering {}: it contains equal or less wide relation expression '{}'",
                            storage.graph().describe(candidate),
                            storage.graph().describe(successor)
                        ),
                    );
                }
                return false;
            }
        }

        true
    }

    fn generate_possible_actions(
        &self,
        storage: &mut SolutionStorage,
        solution: &Solution,
        version_element: ElementId,
        broken_element: ElementId,
        debugging: bool,
    ) -> Vec<Action> {
        let mut actions = Vec::new();

        // satisfy the broken element by installing one of its successors
        for successor in storage.graph().successors(broken_element).to_vec() {
            if let Some(displaced) = storage.simulate_set_package_entry(solution, successor) {
                actions.push(Action {
                    old_element: displaced,
                    new_element: successor,
                    introduced_by: None,
                    broken_priority: 0,
                    elements_to_reject: displaced.into_iter().collect(),
                    profit: None,
                });
            }
        }

        // or replace the version element exposing the problem
        let entry = solution
            .get_package_entry(version_element)
            .expect("internal error: broken pair without an entry");
        if !entry.sticked {
            let rejected = entry.rejected_conflictors.clone();
            for candidate in storage.graph().conflicting_elements(version_element).to_vec() {
                if candidate == version_element || rejected.contains(&candidate) {
                    continue;
                }
                if self.makes_sense_to_modify_package(
                    storage,
                    solution,
                    candidate,
                    broken_element,
                    debugging,
                ) {
                    actions.push(Action {
                        old_element: Some(version_element),
                        new_element: candidate,
                        introduced_by: None,
                        broken_priority: 0,
                        elements_to_reject: vec![version_element],
                        profit: None,
                    });
                }
            }
        }

        actions
    }

    fn calculate_profits(&self, storage: &SolutionStorage, actions: &mut [Action]) {
        use crate::solver::graph::UnsatisfiedKind;

        for (position, action) in actions.iter_mut().enumerate() {
            let mut profit = match storage.graph().unsatisfied_kind(action.new_element) {
                UnsatisfiedKind::None => {
                    let old_version = action
                        .old_element
                        .and_then(|element| storage.graph().version_of(element));
                    let new_version = storage.graph().version_of(action.new_element);
                    self.score_manager
                        .version_score_change(old_version, new_version)
                }
                UnsatisfiedKind::Recommends => {
                    self.score_manager.unsatisfied_recommends_score_change()
                }
                UnsatisfiedKind::Suggests => {
                    self.score_manager.unsatisfied_suggests_score_change()
                }
                UnsatisfiedKind::Sync => self
                    .score_manager
                    .unsatisfied_synchronization_score_change(),
            };
            profit.set_position(position);
            action.profit = Some(profit);
        }
    }

    /// Account the action on the solution and park it as pending; the
    /// actual package changes happen when the solution is picked up.
    fn pre_apply_action(
        &self,
        storage: &SolutionStorage,
        target: &mut Solution,
        action: Action,
        debugging: bool,
    ) {
        assert!(
            !target.finished,
            "internal error: an attempt to make changes to an already finished solution"
        );

        let profit = action.profit.as_ref().expect("internal error: unrated action");
        if debugging {
            let message = format!(
                "-> ({},Δ:[{}]) trying: '{}' -> '{}'",
                target.id,
                self.score_manager.score_change_string(profit),
                action
                    .old_element
                    .map(|element| storage.graph().describe(element))
                    .unwrap_or_default(),
                storage.graph().describe(action.new_element)
            );
            self.debug_solution(target, &message);
        }

        target.level += 1;
        target.score += self.score_manager.score_change_value(profit);
        target.pending_action = Some(action);
    }

    fn post_apply_action(&self, storage: &mut SolutionStorage, solution: &mut Solution) {
        let action = solution
            .pending_action
            .take()
            .expect("internal error: no action to apply");

        let entry = PackageEntry {
            sticked: true,
            introduced_by: action.introduced_by,
            ..PackageEntry::default()
        };
        storage.set_package_entry(solution, action.new_element, entry, action.old_element);
        for element in &action.elements_to_reject {
            storage.set_rejection(solution, *element);
        }
        solution.inserted_elements.push(action.new_element);

        self.validate_changed_package(
            storage,
            solution,
            action.old_element,
            action.new_element,
            action.broken_priority + 1,
        );
    }

    fn is_candidate_for_auto_removal(
        &self,
        storage: &SolutionStorage,
        element: ElementId,
        possibility: &AutoRemovalPossibility,
    ) -> bool {
        let graph = storage.graph();
        let Some(package_name) = graph.package_name_of(element) else {
            return false;
        };
        if package_name == graph.dummy_package_name() {
            return false;
        }
        let Some(version) = graph.version_of(element) else {
            return false;
        };
        let manually_requested = graph
            .initial_package(package_name)
            .map(|entry| entry.sticked)
            .unwrap_or(false);

        possibility.classify(
            &self.cache,
            version,
            graph.was_installed_before(package_name),
            manually_requested,
        ) != AutoRemovalAllow::No
    }

    /// Drop version elements only kept alive by other auto-removable
    /// elements. Returns false when a drop is blocked by a rejected
    /// sentinel, which discards the whole solution.
    fn clean_automatically_installed(
        &self,
        storage: &mut SolutionStorage,
        solution: &mut Solution,
        possibility: &AutoRemovalPossibility,
        debugging: bool,
    ) -> bool {
        let elements = solution.get_elements();
        let element_set: BTreeSet<ElementId> = elements.iter().copied().collect();

        let mut queue: Vec<ElementId> = Vec::new();
        for &element in &elements {
            if !self.is_candidate_for_auto_removal(storage, element, possibility) {
                queue.push(element);
            }
        }

        let mut adjacency: HashMap<ElementId, Vec<ElementId>> = HashMap::new();
        for &element in &elements {
            let mut targets = Vec::new();
            for &relation in storage.graph().successors(element) {
                if storage.graph().is_anti(relation) {
                    continue;
                }
                for &satisfier in storage.graph().successors(relation) {
                    if element_set.contains(&satisfier) {
                        targets.push(satisfier);
                    }
                }
            }
            adjacency.insert(element, targets);
        }

        let mut reachable: BTreeSet<ElementId> = BTreeSet::new();
        while let Some(element) = queue.pop() {
            if reachable.insert(element) {
                if let Some(targets) = adjacency.get(&element) {
                    queue.extend(targets.iter().copied());
                }
            }
        }

        for &element in &elements {
            if reachable.contains(&element) {
                continue;
            }
            let Some(empty_element) = storage.graph_mut().corresponding_empty_element(element)
            else {
                return false;
            };
            let entry = solution
                .get_package_entry(element)
                .expect("internal error: auto-removal of an absent element");
            if entry.sticked || entry.rejected_conflictors.contains(&empty_element) {
                return false;
            }

            if debugging {
                self.debug_solution(
                    solution,
                    &format!("auto-removed '{}'", storage.graph().describe(element)),
                );
            }
            let new_entry = PackageEntry {
                autoremoved: true,
                ..PackageEntry::default()
            };
            storage.set_package_entry(solution, empty_element, new_entry, Some(element));
        }

        true
    }

    /// Internal consistency check of the solution about to be offered.
    fn final_verify_solution(&self, storage: &SolutionStorage, solution: &Solution) {
        for element in solution.get_elements() {
            for &successor in storage.graph().successors(element) {
                assert!(
                    storage.verify_element(solution, successor),
                    "internal error: final solution check failed: solution '{}', version '{}', problem '{}'",
                    solution.id,
                    storage.graph().describe(element),
                    storage.graph().describe(successor)
                );
            }
        }
    }

    fn build_offer(
        &self,
        storage: &SolutionStorage,
        solution: &Solution,
        track_reasons: bool,
    ) -> Offer {
        let mut offer = Offer::default();

        for element in solution.get_elements() {
            match storage.graph().element(element) {
                Element::Version(version_element) => {
                    let package_name = &version_element.package_name;
                    if package_name == storage.graph().dummy_package_name() {
                        continue;
                    }

                    let mut suggested = SuggestedPackage {
                        version: version_element.version.clone(),
                        manually_selected: self.manually_modified.contains(package_name),
                        reasons: Vec::new(),
                    };
                    if track_reasons {
                        let entry = solution
                            .get_package_entry(element)
                            .expect("internal error: listed element has no entry");
                        if let Some(introduced_by) = entry.introduced_by {
                            suggested.reasons.push(storage.reason_of(
                                introduced_by.broken_element,
                                introduced_by.version_element,
                            ));
                        }
                        if entry.autoremoved {
                            suggested.reasons.push(Reason::AutoRemoval);
                        }
                        let modified = storage
                            .graph()
                            .initial_package(package_name)
                            .map(|initial| initial.modified)
                            .unwrap_or(false);
                        if modified {
                            suggested.reasons.push(Reason::User);
                        }
                    }
                    offer
                        .suggested_packages
                        .insert(package_name.clone(), suggested);
                }
                _ => {
                    // an unsatisfied marker: report the soft problems it
                    // stands for
                    for &parent in storage.graph().predecessors(element) {
                        for &affected in storage.graph().predecessors(parent) {
                            if solution.get_package_entry(affected).is_some() {
                                offer
                                    .unresolved_problems
                                    .push(storage.reason_of(parent, affected));
                            }
                        }
                    }
                }
            }
        }

        offer
    }
}
