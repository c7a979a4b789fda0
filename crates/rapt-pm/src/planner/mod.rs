//! The action planner: turns an accepted offer into ordered groups of
//! low-level installer actions, respecting pre-dependencies.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::cache::version::{DependencyKind, PackagePriority};
use crate::cache::{BinaryVersion, Cache, Status, Want};
use crate::config::Config;
use crate::error::{RaptError, Result};
use crate::solver::Offer;

/// What one inner action does to one package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InnerActionKind {
    Remove,
    Unpack,
    Configure,
}

impl fmt::Display for InnerActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InnerActionKind::Remove => "remove",
            InnerActionKind::Unpack => "unpack",
            InnerActionKind::Configure => "configure",
        };
        f.write_str(s)
    }
}

/// One action over one concrete version. For removals the version is the
/// installed one going away; otherwise it is the version being installed.
#[derive(Debug, Clone)]
pub struct InnerAction {
    pub kind: InnerActionKind,
    pub version: Arc<BinaryVersion>,
}

impl fmt::Display for InnerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.kind, self.version.package_name, self.version.version_string
        )
    }
}

/// A batch handed to the low-level installer as one invocation. Ordering
/// within a group is a suggestion only.
#[derive(Debug, Clone, Default)]
pub struct ActionGroup {
    pub actions: Vec<InnerAction>,
    /// Configure immediately after unpacking (essential packages).
    pub immediate: bool,
    /// Remove configuration files too.
    pub purge: bool,
    /// The transition only touches configuration files.
    pub config_files_only: bool,
}

/// One file to fetch before execution, with its expected hashes.
#[derive(Debug, Clone)]
pub struct DownloadManifestEntry {
    pub package_name: String,
    pub version_string: String,
    pub uris: Vec<String>,
    pub size: u64,
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
}

/// The finished plan: ordered action groups plus the download manifest.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub groups: Vec<ActionGroup>,
    pub downloads: Vec<DownloadManifestEntry>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// All inner actions in execution order.
    pub fn actions(&self) -> impl Iterator<Item = &InnerAction> {
        self.groups.iter().flat_map(|group| group.actions.iter())
    }
}

/// Constraint strengths, weakest first. Fundamental edges come from
/// pre-dependencies and are respected across group boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EdgeStrength {
    Priority,
    FromVirtual,
    Soft,
    Hard,
    Fundamental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Before,
    After,
}

/// Builds plans from accepted offers.
pub struct Planner {
    cache: Arc<Cache>,
    #[allow(dead_code)]
    config: Arc<Config>,
}

impl Planner {
    pub fn new(config: Arc<Config>, cache: Arc<Cache>) -> Self {
        Self { cache, config }
    }

    /// Convert an accepted offer into an ordered plan.
    pub fn build_plan(&self, offer: &Offer) -> Result<Plan> {
        let actions = self.collect_inner_actions(offer);
        if actions.is_empty() {
            return Ok(Plan::default());
        }

        let mut edges: HashMap<(usize, usize), EdgeStrength> = HashMap::new();
        self.fill_graph_dependencies(&actions, &mut edges);
        self.break_cycles(actions.len(), &mut edges)?;

        let order = self.topological_sort(&actions, &edges);
        let groups = self.split_into_groups(&actions, &edges, &order);
        let downloads = self.collect_downloads(&actions);

        Ok(Plan { groups, downloads })
    }

    /// Expand the per-package state transitions into inner actions.
    fn collect_inner_actions(&self, offer: &Offer) -> Vec<InnerAction> {
        let mut actions = Vec::new();

        let mut package_names: Vec<&String> = offer.suggested_packages.keys().collect();
        package_names.sort();

        for package_name in package_names {
            let suggested = &offer.suggested_packages[package_name.as_str()];
            let installed = self.cache.installed_version(package_name);
            let status = self
                .cache
                .system_state()
                .installed_record(package_name)
                .map(|record| record.status);

            match (&installed, &suggested.version) {
                (None, None) => {}
                (Some(old), None) => {
                    actions.push(InnerAction {
                        kind: InnerActionKind::Remove,
                        version: old.clone(),
                    });
                }
                (None, Some(new)) => {
                    actions.push(InnerAction {
                        kind: InnerActionKind::Unpack,
                        version: new.clone(),
                    });
                    actions.push(InnerAction {
                        kind: InnerActionKind::Configure,
                        version: new.clone(),
                    });
                }
                (Some(old), Some(new)) => {
                    if old.version_string != new.version_string {
                        // the old version's removal is implicit in the unpack
                        actions.push(InnerAction {
                            kind: InnerActionKind::Unpack,
                            version: new.clone(),
                        });
                        actions.push(InnerAction {
                            kind: InnerActionKind::Configure,
                            version: new.clone(),
                        });
                    } else if matches!(status, Some(Status::Unpacked | Status::HalfConfigured)) {
                        // present but never configured
                        actions.push(InnerAction {
                            kind: InnerActionKind::Configure,
                            version: new.clone(),
                        });
                    }
                }
            }
        }

        actions
    }

    fn find_action_indices(
        &self,
        actions: &[InnerAction],
        kind: InnerActionKind,
        version: &BinaryVersion,
    ) -> Vec<usize> {
        actions
            .iter()
            .enumerate()
            .filter(|(_, action)| {
                action.kind == kind
                    && action.version.package_name == version.package_name
                    && action.version.version_string == version.version_string
            })
            .map(|(index, _)| index)
            .collect()
    }

    fn add_edge(
        edges: &mut HashMap<(usize, usize), EdgeStrength>,
        from: usize,
        to: usize,
        strength: EdgeStrength,
    ) {
        if from == to {
            return;
        }
        let slot = edges.entry((from, to)).or_insert(strength);
        if *slot < strength {
            *slot = strength;
        }
    }

    /// Add ordering edges for one relation kind of one action: the matching
    /// actions of `target_kind` must run before (or after) it.
    #[allow(clippy::too_many_arguments)]
    fn fill_action_dependencies(
        &self,
        actions: &[InnerAction],
        edges: &mut HashMap<(usize, usize), EdgeStrength>,
        action_index: usize,
        dependency_kind: DependencyKind,
        target_kind: InnerActionKind,
        direction: Direction,
        strength: EdgeStrength,
    ) {
        let version = actions[action_index].version.clone();
        let line = version.relations.get(dependency_kind).clone();

        for expression in &line.0 {
            for satisfier in self.cache.get_satisfying_versions(expression) {
                let via_provides = !expression
                    .0
                    .iter()
                    .any(|relation| relation.package_name == satisfier.package_name);
                let strength = if via_provides {
                    EdgeStrength::FromVirtual
                } else {
                    strength
                };
                for target_index in self.find_action_indices(actions, target_kind, &satisfier) {
                    match direction {
                        Direction::Before => {
                            Self::add_edge(edges, target_index, action_index, strength)
                        }
                        Direction::After => {
                            Self::add_edge(edges, action_index, target_index, strength)
                        }
                    }
                }
            }
        }
    }

    fn fill_graph_dependencies(
        &self,
        actions: &[InnerAction],
        edges: &mut HashMap<(usize, usize), EdgeStrength>,
    ) {
        use DependencyKind as DK;
        use Direction::{After, Before};
        use EdgeStrength as ES;
        use InnerActionKind as IA;

        for (index, action) in actions.iter().enumerate() {
            match action.kind {
                IA::Unpack => {
                    self.fill_unpack_dependencies(actions, edges, index);
                    // unpack precedes the configure of the same version
                    for configure_index in
                        self.find_action_indices(actions, IA::Configure, &action.version)
                    {
                        Self::add_edge(edges, index, configure_index, ES::Fundamental);
                    }
                }
                IA::Configure => {
                    // depends must be configured before
                    self.fill_action_dependencies(
                        actions, edges, index, DK::Depends, IA::Configure, Before, ES::Hard,
                    );
                    self.fill_action_dependencies(
                        actions, edges, index, DK::Recommends, IA::Configure, Before, ES::Soft,
                    );
                    self.fill_action_dependencies(
                        actions, edges, index, DK::Suggests, IA::Configure, Before, ES::Soft,
                    );
                    // configure-only transitions carry the unpack
                    // constraints themselves
                    let has_unpack = !self
                        .find_action_indices(actions, IA::Unpack, &action.version)
                        .is_empty();
                    if !has_unpack {
                        self.fill_unpack_dependencies(actions, edges, index);
                    }
                }
                IA::Remove => {
                    // reverse dependencies of the removed version go first
                    self.fill_action_dependencies(
                        actions, edges, index, DK::PreDepends, IA::Remove, After, ES::Hard,
                    );
                    self.fill_action_dependencies(
                        actions, edges, index, DK::Depends, IA::Remove, After, ES::Hard,
                    );
                    // conflicts of others may be satisfied only after
                    self.fill_action_dependencies(
                        actions, edges, index, DK::Conflicts, IA::Unpack, After, ES::Hard,
                    );
                    self.fill_action_dependencies(
                        actions, edges, index, DK::Breaks, IA::Unpack, After, ES::Hard,
                    );
                    self.fill_action_dependencies(
                        actions, edges, index, DK::Breaks, IA::Configure, After, ES::Hard,
                    );
                }
            }
        }
    }

    fn fill_unpack_dependencies(
        &self,
        actions: &[InnerAction],
        edges: &mut HashMap<(usize, usize), EdgeStrength>,
        index: usize,
    ) {
        use DependencyKind as DK;
        use Direction::Before;
        use EdgeStrength as ES;
        use InnerActionKind as IA;

        // pre-depends must be configured before the unpack
        self.fill_action_dependencies(
            actions,
            edges,
            index,
            DK::PreDepends,
            IA::Configure,
            Before,
            ES::Fundamental,
        );
        // conflicts and breaks must be unsatisfied before the unpack
        self.fill_action_dependencies(
            actions, edges, index, DK::Conflicts, IA::Remove, Before, ES::Hard,
        );
        self.fill_action_dependencies(
            actions, edges, index, DK::Breaks, IA::Remove, Before, ES::Hard,
        );
        // a replaced package should go away only after the replacer's
        // files are in place; a reorder hint, not a requirement
        self.fill_action_dependencies(
            actions,
            edges,
            index,
            DK::Replaces,
            IA::Remove,
            Direction::After,
            ES::Priority,
        );
    }

    /// Repeatedly demote the weakest edge class inside each cycle until the
    /// graph is acyclic. A cycle held together by fundamental edges alone
    /// cannot be demoted.
    fn break_cycles(
        &self,
        action_count: usize,
        edges: &mut HashMap<(usize, usize), EdgeStrength>,
    ) -> Result<()> {
        loop {
            let components = strongly_connected_components(action_count, edges);
            let mut changed = false;

            for component in components {
                if component.len() < 2 {
                    continue;
                }
                let members: BTreeSet<usize> = component.iter().copied().collect();
                let intra: Vec<((usize, usize), EdgeStrength)> = edges
                    .iter()
                    .filter(|((from, to), _)| members.contains(from) && members.contains(to))
                    .map(|(key, strength)| (*key, *strength))
                    .collect();
                let weakest = intra
                    .iter()
                    .map(|(_, strength)| *strength)
                    .min()
                    .expect("internal error: cyclic component without edges");
                if weakest == EdgeStrength::Fundamental {
                    return Err(RaptError::Planning(
                        "a pre-dependency cycle cannot be broken".to_string(),
                    ));
                }
                for (key, strength) in intra {
                    if strength == weakest {
                        edges.remove(&key);
                        changed = true;
                    }
                }
            }

            if !changed {
                return Ok(());
            }
        }
    }

    fn ordering_key(action: &InnerAction, index: usize) -> (u8, u8, String, usize) {
        let priority_rank = match action.version.priority {
            PackagePriority::Required => 0,
            PackagePriority::Important => 1,
            PackagePriority::Standard => 2,
            PackagePriority::Optional => 3,
            PackagePriority::Extra => 4,
        };
        let kind_rank = match action.kind {
            InnerActionKind::Remove => 0,
            InnerActionKind::Unpack => 1,
            InnerActionKind::Configure => 2,
        };
        (
            priority_rank,
            kind_rank,
            action.version.package_name.clone(),
            index,
        )
    }

    /// Kahn's algorithm with a deterministic ready-set order: higher
    /// priority classes first, removals before unpacks before configures.
    fn topological_sort(
        &self,
        actions: &[InnerAction],
        edges: &HashMap<(usize, usize), EdgeStrength>,
    ) -> Vec<usize> {
        let mut in_degree = vec![0usize; actions.len()];
        let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); actions.len()];
        for &(from, to) in edges.keys() {
            outgoing[from].push(to);
            in_degree[to] += 1;
        }

        let mut ready: BTreeMap<(u8, u8, String, usize), usize> = BTreeMap::new();
        for (index, action) in actions.iter().enumerate() {
            if in_degree[index] == 0 {
                ready.insert(Self::ordering_key(action, index), index);
            }
        }

        let mut order = Vec::with_capacity(actions.len());
        while let Some((key, index)) = ready.pop_first() {
            let _ = key;
            order.push(index);
            for &next in &outgoing[index] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.insert(Self::ordering_key(&actions[next], next), next);
                }
            }
        }

        assert_eq!(
            order.len(),
            actions.len(),
            "internal error: action graph still cyclic after cycle breaking"
        );
        order
    }

    /// A pre-dependency edge from inside the current group forces a group
    /// boundary, so the depended-on configure lands strictly earlier.
    fn split_into_groups(
        &self,
        actions: &[InnerAction],
        edges: &HashMap<(usize, usize), EdgeStrength>,
        order: &[usize],
    ) -> Vec<ActionGroup> {
        let mut incoming_fundamental: Vec<Vec<usize>> = vec![Vec::new(); actions.len()];
        for (&(from, to), &strength) in edges {
            if strength == EdgeStrength::Fundamental
                && actions[from].version.package_name != actions[to].version.package_name
            {
                incoming_fundamental[to].push(from);
            }
        }

        let mut groups = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        for &index in order {
            let needs_boundary = incoming_fundamental[index]
                .iter()
                .any(|predecessor| current.contains(predecessor));
            if needs_boundary && !current.is_empty() {
                groups.push(self.make_group(actions, &current));
                current.clear();
            }
            current.push(index);
        }
        if !current.is_empty() {
            groups.push(self.make_group(actions, &current));
        }
        groups
    }

    fn make_group(&self, actions: &[InnerAction], indices: &[usize]) -> ActionGroup {
        let mut group = ActionGroup::default();
        for &index in indices {
            let action = &actions[index];
            if action.version.essential {
                group.immediate = true;
            }
            if action.kind == InnerActionKind::Remove {
                let record = self
                    .cache
                    .system_state()
                    .installed_record(&action.version.package_name);
                if let Some(record) = record {
                    if record.want == Want::Purge {
                        group.purge = true;
                    }
                    if record.status == Status::ConfigFiles {
                        group.config_files_only = true;
                    }
                }
            }
            group.actions.push(action.clone());
        }
        group
    }

    fn collect_downloads(&self, actions: &[InnerAction]) -> Vec<DownloadManifestEntry> {
        let mut downloads = Vec::new();
        for action in actions {
            if action.kind != InnerActionKind::Unpack {
                continue;
            }
            let version = &action.version;
            let uris: Vec<String> = version
                .download_records()
                .into_iter()
                .map(|record| {
                    format!(
                        "{}/{}/{}",
                        record.base_uri, record.directory, version.file.name
                    )
                })
                .collect();
            downloads.push(DownloadManifestEntry {
                package_name: version.package_name.clone(),
                version_string: version.version_string.clone(),
                uris,
                size: version.file.size,
                md5: version.file.md5.clone(),
                sha1: version.file.sha1.clone(),
                sha256: version.file.sha256.clone(),
            });
        }
        downloads
    }
}

/// Kosaraju's algorithm, iterative.
fn strongly_connected_components(
    node_count: usize,
    edges: &HashMap<(usize, usize), EdgeStrength>,
) -> Vec<Vec<usize>> {
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    let mut incoming: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    for &(from, to) in edges.keys() {
        outgoing[from].push(to);
        incoming[to].push(from);
    }

    // first pass: finishing order
    let mut visited = vec![false; node_count];
    let mut finish_order = Vec::with_capacity(node_count);
    for start in 0..node_count {
        if visited[start] {
            continue;
        }
        let mut stack = vec![(start, 0usize)];
        visited[start] = true;
        while let Some(&mut (node, ref mut next)) = stack.last_mut() {
            if *next < outgoing[node].len() {
                let target = outgoing[node][*next];
                *next += 1;
                if !visited[target] {
                    visited[target] = true;
                    stack.push((target, 0));
                }
            } else {
                finish_order.push(node);
                stack.pop();
            }
        }
    }

    // second pass: assign components on the reverse graph
    let mut component_of = vec![usize::MAX; node_count];
    let mut components = Vec::new();
    for &start in finish_order.iter().rev() {
        if component_of[start] != usize::MAX {
            continue;
        }
        let component_index = components.len();
        let mut component = Vec::new();
        let mut stack = vec![start];
        component_of[start] = component_index;
        while let Some(node) = stack.pop() {
            component.push(node);
            for &previous in &incoming[node] {
                if component_of[previous] == usize::MAX {
                    component_of[previous] = component_index;
                    stack.push(previous);
                }
            }
        }
        components.push(component);
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::version::{BinaryVersionBuilder, FileRecord, ReleaseInfo};
    use crate::cache::{CacheBuilder, InstalledRecord};
    use crate::solver::SuggestedPackage;
    use rapt_version::RelationLine;

    fn release() -> Arc<ReleaseInfo> {
        Arc::new(ReleaseInfo {
            archive: "stable".to_string(),
            base_uri: "http://deb.example.org/debian".to_string(),
            ..ReleaseInfo::default()
        })
    }

    fn pkg(name: &str, version: &str) -> BinaryVersionBuilder {
        let mut builder = BinaryVersionBuilder::new(name, version).file(FileRecord {
            name: format!("{}_{}.deb", name, version),
            size: 1000,
            md5: "00".to_string(),
            sha1: "11".to_string(),
            sha256: "22".to_string(),
        });
        builder.add_source(release(), format!("pool/main/{}", name));
        builder
    }

    fn with_relation(
        builder: BinaryVersionBuilder,
        kind: DependencyKind,
        line: &str,
    ) -> BinaryVersionBuilder {
        builder.relation(kind, RelationLine::parse(line).unwrap())
    }

    fn offer_installing(cache: &Arc<Cache>, names: &[(&str, &str)]) -> Offer {
        let mut offer = Offer::default();
        for (name, version) in names {
            let version = cache
                .binary_package(name)
                .unwrap()
                .specific_version(version)
                .unwrap()
                .clone();
            offer.suggested_packages.insert(
                name.to_string(),
                SuggestedPackage {
                    version: Some(version),
                    manually_selected: false,
                    reasons: Vec::new(),
                },
            );
        }
        offer
    }

    fn offer_removing(offer: &mut Offer, names: &[&str]) {
        for name in names {
            offer.suggested_packages.insert(
                name.to_string(),
                SuggestedPackage {
                    version: None,
                    manually_selected: false,
                    reasons: Vec::new(),
                },
            );
        }
    }

    fn planner(cache: &Arc<Cache>) -> Planner {
        Planner::new(Arc::new(Config::new()), cache.clone())
    }

    fn position_of(plan: &Plan, kind: InnerActionKind, name: &str) -> usize {
        plan.actions()
            .position(|action| action.kind == kind && action.version.package_name == name)
            .unwrap_or_else(|| panic!("no {} action for {}", kind, name))
    }

    fn group_of(plan: &Plan, kind: InnerActionKind, name: &str) -> usize {
        plan.groups
            .iter()
            .position(|group| {
                group
                    .actions
                    .iter()
                    .any(|action| action.kind == kind && action.version.package_name == name)
            })
            .unwrap_or_else(|| panic!("no group with {} of {}", kind, name))
    }

    #[test]
    fn test_plain_install_unpacks_then_configures() {
        let cache = Arc::new({
            let mut builder = CacheBuilder::new();
            builder.add_binary_version(pkg("a", "1"));
            builder.finish()
        });
        let plan = planner(&cache)
            .build_plan(&offer_installing(&cache, &[("a", "1")]))
            .unwrap();

        assert_eq!(plan.groups.len(), 1);
        assert!(
            position_of(&plan, InnerActionKind::Unpack, "a")
                < position_of(&plan, InnerActionKind::Configure, "a")
        );
    }

    #[test]
    fn test_depends_orders_configures_within_one_group() {
        let cache = Arc::new({
            let mut builder = CacheBuilder::new();
            builder.add_binary_version(with_relation(pkg("a", "1"), DependencyKind::Depends, "b"));
            builder.add_binary_version(pkg("b", "1"));
            builder.finish()
        });
        let plan = planner(&cache)
            .build_plan(&offer_installing(&cache, &[("a", "1"), ("b", "1")]))
            .unwrap();

        assert_eq!(plan.groups.len(), 1);
        assert!(
            position_of(&plan, InnerActionKind::Configure, "b")
                < position_of(&plan, InnerActionKind::Configure, "a")
        );
    }

    #[test]
    fn test_pre_depends_forces_group_boundary() {
        let cache = Arc::new({
            let mut builder = CacheBuilder::new();
            builder.add_binary_version(with_relation(
                pkg("a", "1"),
                DependencyKind::PreDepends,
                "b",
            ));
            builder.add_binary_version(pkg("b", "1"));
            builder.finish()
        });
        let plan = planner(&cache)
            .build_plan(&offer_installing(&cache, &[("a", "1"), ("b", "1")]))
            .unwrap();

        // the configure of b must land in a strictly earlier group than the
        // unpack of a
        assert!(
            group_of(&plan, InnerActionKind::Configure, "b")
                < group_of(&plan, InnerActionKind::Unpack, "a")
        );
    }

    #[test]
    fn test_versioned_pre_depends_range_is_respected() {
        let cache = Arc::new({
            let mut builder = CacheBuilder::new();
            builder.add_binary_version(with_relation(
                pkg("a", "1"),
                DependencyKind::PreDepends,
                "b (>= 2)",
            ));
            builder.add_binary_version(pkg("b", "2"));
            builder.finish()
        });
        let plan = planner(&cache)
            .build_plan(&offer_installing(&cache, &[("a", "1"), ("b", "2")]))
            .unwrap();

        let configure_group = group_of(&plan, InnerActionKind::Configure, "b");
        let unpack_group = group_of(&plan, InnerActionKind::Unpack, "a");
        assert!(configure_group < unpack_group);
        // the configured b version satisfies the range
        let configured = plan
            .actions()
            .find(|action| {
                action.kind == InnerActionKind::Configure && action.version.package_name == "b"
            })
            .unwrap();
        assert_eq!(configured.version.version_string, "2");
    }

    #[test]
    fn test_conflicting_package_removed_before_unpack() {
        let cache = Arc::new({
            let mut builder = CacheBuilder::new();
            builder.add_binary_version(with_relation(
                pkg("a", "1"),
                DependencyKind::Conflicts,
                "x",
            ));
            builder.add_binary_version(pkg("x", "1"));
            builder.set_installed("x", "1", InstalledRecord::installed());
            builder.finish()
        });
        let mut offer = offer_installing(&cache, &[("a", "1")]);
        offer_removing(&mut offer, &["x"]);
        let plan = planner(&cache).build_plan(&offer).unwrap();

        assert!(
            position_of(&plan, InnerActionKind::Remove, "x")
                < position_of(&plan, InnerActionKind::Unpack, "a")
        );
    }

    #[test]
    fn test_depends_cycle_is_demoted_not_fatal() {
        let cache = Arc::new({
            let mut builder = CacheBuilder::new();
            builder.add_binary_version(with_relation(pkg("a", "1"), DependencyKind::Depends, "b"));
            builder.add_binary_version(with_relation(pkg("b", "1"), DependencyKind::Depends, "a"));
            builder.finish()
        });
        let plan = planner(&cache)
            .build_plan(&offer_installing(&cache, &[("a", "1"), ("b", "1")]))
            .unwrap();

        // all four actions survive in one group
        assert_eq!(plan.actions().count(), 4);
        assert_eq!(plan.groups.len(), 1);
    }

    #[test]
    fn test_pre_depends_cycle_is_fatal() {
        let cache = Arc::new({
            let mut builder = CacheBuilder::new();
            builder.add_binary_version(with_relation(
                pkg("a", "1"),
                DependencyKind::PreDepends,
                "b",
            ));
            builder.add_binary_version(with_relation(
                pkg("b", "1"),
                DependencyKind::PreDepends,
                "a",
            ));
            builder.finish()
        });
        let result = planner(&cache).build_plan(&offer_installing(&cache, &[("a", "1"), ("b", "1")]));
        assert!(matches!(result, Err(RaptError::Planning(_))));
    }

    #[test]
    fn test_upgrade_produces_unpack_and_configure_only() {
        let cache = Arc::new({
            let mut builder = CacheBuilder::new();
            builder.add_binary_version(pkg("a", "1"));
            builder.add_binary_version(pkg("a", "2"));
            builder.set_installed("a", "1", InstalledRecord::installed());
            builder.finish()
        });
        let plan = planner(&cache)
            .build_plan(&offer_installing(&cache, &[("a", "2")]))
            .unwrap();

        let kinds: Vec<InnerActionKind> = plan.actions().map(|action| action.kind).collect();
        assert_eq!(kinds, vec![InnerActionKind::Unpack, InnerActionKind::Configure]);
        // only the new version is downloaded
        assert_eq!(plan.downloads.len(), 1);
        assert_eq!(plan.downloads[0].version_string, "2");
    }

    #[test]
    fn test_unchanged_package_yields_no_actions() {
        let cache = Arc::new({
            let mut builder = CacheBuilder::new();
            builder.add_binary_version(pkg("a", "1"));
            builder.set_installed("a", "1", InstalledRecord::installed());
            builder.finish()
        });
        let plan = planner(&cache)
            .build_plan(&offer_installing(&cache, &[("a", "1")]))
            .unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_unpacked_package_gets_configure_only() {
        let cache = Arc::new({
            let mut builder = CacheBuilder::new();
            builder.add_binary_version(pkg("a", "1"));
            builder.set_installed(
                "a",
                "1",
                InstalledRecord::parse("a", "install ok unpacked").unwrap(),
            );
            builder.finish()
        });
        let plan = planner(&cache)
            .build_plan(&offer_installing(&cache, &[("a", "1")]))
            .unwrap();

        let kinds: Vec<InnerActionKind> = plan.actions().map(|action| action.kind).collect();
        assert_eq!(kinds, vec![InnerActionKind::Configure]);
        assert!(plan.downloads.is_empty());
    }

    #[test]
    fn test_purge_flag_from_installed_state() {
        let cache = Arc::new({
            let mut builder = CacheBuilder::new();
            builder.add_binary_version(pkg("a", "1"));
            builder.set_installed(
                "a",
                "1",
                InstalledRecord::parse("a", "purge ok installed").unwrap(),
            );
            builder.finish()
        });
        let mut offer = Offer::default();
        offer_removing(&mut offer, &["a"]);
        let plan = planner(&cache).build_plan(&offer).unwrap();

        assert_eq!(plan.groups.len(), 1);
        assert!(plan.groups[0].purge);
    }

    #[test]
    fn test_download_manifest_carries_uris_and_hashes() {
        let cache = Arc::new({
            let mut builder = CacheBuilder::new();
            builder.add_binary_version(pkg("a", "1"));
            builder.finish()
        });
        let plan = planner(&cache)
            .build_plan(&offer_installing(&cache, &[("a", "1")]))
            .unwrap();

        assert_eq!(plan.downloads.len(), 1);
        let download = &plan.downloads[0];
        assert_eq!(
            download.uris,
            vec!["http://deb.example.org/debian/pool/main/a/a_1.deb".to_string()]
        );
        assert_eq!(download.sha256, "22");
        assert_eq!(download.size, 1000);
    }

    #[test]
    fn test_replaces_hints_removal_after_unpack() {
        let cache = Arc::new({
            let mut builder = CacheBuilder::new();
            builder.add_binary_version(with_relation(
                pkg("a", "1"),
                DependencyKind::Replaces,
                "x",
            ));
            builder.add_binary_version(pkg("x", "1"));
            builder.set_installed("x", "1", InstalledRecord::installed());
            builder.finish()
        });
        let mut offer = offer_installing(&cache, &[("a", "1")]);
        offer_removing(&mut offer, &["x"]);
        let plan = planner(&cache).build_plan(&offer).unwrap();

        assert!(
            position_of(&plan, InnerActionKind::Unpack, "a")
                < position_of(&plan, InnerActionKind::Remove, "x")
        );
    }

    #[test]
    fn test_essential_package_marks_group_immediate() {
        let cache = Arc::new({
            let mut builder = CacheBuilder::new();
            builder.add_binary_version(pkg("base", "1").essential(true));
            builder.finish()
        });
        let plan = planner(&cache)
            .build_plan(&offer_installing(&cache, &[("base", "1")]))
            .unwrap();
        assert!(plan.groups[0].immediate);
    }
}
