//! The dependency graph: an arena of version and relation elements with
//! lazily materialized edges.
//!
//! Elements are addressed by stable [`ElementId`] indices into the arena and
//! live for the whole resolve call. Unfolding a version element creates its
//! relation elements; relation elements are interned so versions exposing
//! the same expression share one element.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use rapt_version::RelationExpression;

use crate::cache::version::DependencyKind;
use crate::cache::{BinaryVersion, Cache};
use crate::config::{Config, SynchronizeLevel};

/// Stable identity of a graph element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementId(pub u32);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How bad leaving a relation element broken is. `None` may not be left
/// broken at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsatisfiedKind {
    None,
    Recommends,
    Suggests,
    Sync,
}

/// A version element: one concrete version of a package, or the "not
/// installed" sentinel when `version` is empty.
#[derive(Debug, Clone)]
pub struct VersionElement {
    pub package_name: String,
    pub version: Option<Arc<BinaryVersion>>,
}

/// A relation element: one relation expression of a specific kind. Anti
/// relations are split per conflicting package, recorded in
/// `specific_package`.
#[derive(Debug, Clone)]
pub struct RelationElement {
    pub kind: DependencyKind,
    pub expression: Arc<RelationExpression>,
    pub specific_package: Option<String>,
}

/// A source-synchronization element targeting one binary package built from
/// the same source version.
#[derive(Debug, Clone)]
pub struct SyncElement {
    pub target_package: String,
    pub hard: bool,
}

/// The element sum type.
#[derive(Debug, Clone)]
pub enum Element {
    Version(VersionElement),
    Relation(RelationElement),
    Sync(SyncElement),
    /// Marker whose presence in a solution stands for "the parent element
    /// is knowingly left unsatisfied".
    Unsatisfied { parent: ElementId },
}

/// A user-requested initial state of one package.
#[derive(Debug, Clone, Default)]
pub struct InitialPackageEntry {
    pub version: Option<Arc<BinaryVersion>>,
    /// Immutable by the search.
    pub sticked: bool,
    /// Changed relative to the installed state by a user request.
    pub modified: bool,
}

#[derive(Debug, Clone, Copy)]
struct DependencyGroup {
    kind: DependencyKind,
    is_anti: bool,
}

/// The arena. All elements created during one resolve call live here.
pub struct DependencyGraph {
    cache: Arc<Cache>,
    dependency_groups: Vec<DependencyGroup>,
    sync_level: SynchronizeLevel,
    no_remove: bool,
    debugging: bool,
    dummy_package_name: String,

    old_packages: HashMap<String, Arc<BinaryVersion>>,
    initial_packages: BTreeMap<String, InitialPackageEntry>,

    elements: Vec<Element>,
    successors: Vec<Vec<ElementId>>,
    predecessors: Vec<Vec<ElementId>>,
    unfolded: Vec<bool>,

    // package name -> its version elements, the mutually conflicting set
    related: HashMap<String, Vec<ElementId>>,
    version_index: HashMap<(String, String), Option<ElementId>>,
    empty_index: HashMap<String, Option<ElementId>>,
    relation_index: HashMap<(String, DependencyKind), ElementId>,
    anti_index: HashMap<(String, DependencyKind), Vec<(String, ElementId)>>,
    sync_index: HashMap<String, Vec<(String, ElementId)>>,

    // version elements created but not yet unfolded
    pending: Vec<ElementId>,
}

impl DependencyGraph {
    pub fn new(config: &Config, cache: Arc<Cache>, dummy_package_name: String) -> Self {
        let mut dependency_groups = vec![
            DependencyGroup { kind: DependencyKind::PreDepends, is_anti: false },
            DependencyGroup { kind: DependencyKind::Depends, is_anti: false },
            DependencyGroup { kind: DependencyKind::Conflicts, is_anti: true },
            DependencyGroup { kind: DependencyKind::Breaks, is_anti: true },
        ];
        if config.keep_recommends {
            dependency_groups.push(DependencyGroup {
                kind: DependencyKind::Recommends,
                is_anti: false,
            });
        }
        if config.keep_suggests {
            dependency_groups.push(DependencyGroup {
                kind: DependencyKind::Suggests,
                is_anti: false,
            });
        }

        Self {
            cache,
            dependency_groups,
            sync_level: config.synchronize_source_versions,
            no_remove: config.no_remove,
            debugging: config.debug_resolver,
            dummy_package_name,
            old_packages: HashMap::new(),
            initial_packages: BTreeMap::new(),
            elements: Vec::new(),
            successors: Vec::new(),
            predecessors: Vec::new(),
            unfolded: Vec::new(),
            related: HashMap::new(),
            version_index: HashMap::new(),
            empty_index: HashMap::new(),
            relation_index: HashMap::new(),
            anti_index: HashMap::new(),
            sync_index: HashMap::new(),
            pending: Vec::new(),
        }
    }

    pub fn element(&self, id: ElementId) -> &Element {
        &self.elements[id.0 as usize]
    }

    pub fn successors(&self, id: ElementId) -> &[ElementId] {
        &self.successors[id.0 as usize]
    }

    pub fn predecessors(&self, id: ElementId) -> &[ElementId] {
        &self.predecessors[id.0 as usize]
    }

    /// All version elements of the element's package, the mutually
    /// conflicting set. Includes the element itself.
    pub fn conflicting_elements(&self, id: ElementId) -> &[ElementId] {
        static EMPTY: Vec<ElementId> = Vec::new();
        match self.element(id) {
            Element::Version(v) => self
                .related
                .get(&v.package_name)
                .map(Vec::as_slice)
                .unwrap_or(&EMPTY),
            _ => &EMPTY,
        }
    }

    /// The version elements of a package known so far.
    pub fn related_family(&self, package_name: &str) -> &[ElementId] {
        static EMPTY: Vec<ElementId> = Vec::new();
        self.related
            .get(package_name)
            .map(Vec::as_slice)
            .unwrap_or(&EMPTY)
    }

    pub fn is_version_element(&self, id: ElementId) -> bool {
        matches!(self.element(id), Element::Version(_))
    }

    pub fn is_unsatisfied_marker(&self, id: ElementId) -> bool {
        matches!(self.element(id), Element::Unsatisfied { .. })
    }

    pub fn version_of(&self, id: ElementId) -> Option<&Arc<BinaryVersion>> {
        match self.element(id) {
            Element::Version(v) => v.version.as_ref(),
            _ => None,
        }
    }

    pub fn package_name_of(&self, id: ElementId) -> Option<&str> {
        match self.element(id) {
            Element::Version(v) => Some(&v.package_name),
            _ => None,
        }
    }

    /// Anti elements constrain one specific package; positive elements have
    /// no such target.
    pub fn anti_target(&self, id: ElementId) -> Option<&str> {
        match self.element(id) {
            Element::Relation(r) if r.kind.is_anti() => r.specific_package.as_deref(),
            Element::Sync(s) => Some(&s.target_package),
            _ => None,
        }
    }

    pub fn is_anti(&self, id: ElementId) -> bool {
        match self.element(id) {
            Element::Relation(r) => r.kind.is_anti(),
            Element::Sync(_) => true,
            _ => false,
        }
    }

    /// The search order priority of a broken element's type. Higher means
    /// the problem is attacked earlier.
    pub fn type_priority(&self, id: ElementId) -> usize {
        match self.element(id) {
            Element::Relation(r) => match r.kind {
                DependencyKind::Conflicts | DependencyKind::Breaks => 5,
                DependencyKind::PreDepends => 4,
                DependencyKind::Depends => 3,
                DependencyKind::Recommends => 2,
                DependencyKind::Suggests => 1,
                _ => 0,
            },
            Element::Sync(s) => {
                if s.hard {
                    5
                } else {
                    2
                }
            }
            _ => 0,
        }
    }

    /// Whether placing this element instead of a real satisfier is legal,
    /// and at what cost class.
    pub fn unsatisfied_kind(&self, id: ElementId) -> UnsatisfiedKind {
        match self.element(id) {
            Element::Unsatisfied { parent } => match self.element(*parent) {
                Element::Relation(r) => match r.kind {
                    DependencyKind::Recommends => UnsatisfiedKind::Recommends,
                    DependencyKind::Suggests => UnsatisfiedKind::Suggests,
                    _ => UnsatisfiedKind::None,
                },
                Element::Sync(_) => UnsatisfiedKind::Sync,
                _ => UnsatisfiedKind::None,
            },
            _ => UnsatisfiedKind::None,
        }
    }

    /// Human-readable form for search tracing.
    pub fn describe(&self, id: ElementId) -> String {
        match self.element(id) {
            Element::Version(v) => match &v.version {
                Some(version) => format!("{} {}", v.package_name, version.version_string),
                None => format!("{} <not installed>", v.package_name),
            },
            Element::Relation(r) => {
                let mut result = format!("{} '{}'", r.kind, r.expression);
                if let Some(package) = &r.specific_package {
                    result.push_str(&format!(" [{}]", package));
                }
                result
            }
            Element::Sync(s) => format!("sync with {}", s.target_package),
            Element::Unsatisfied { parent } => {
                format!("unsatisfied {}", self.describe(*parent))
            }
        }
    }

    fn add_element(&mut self, element: Element) -> ElementId {
        let id = ElementId(self.elements.len() as u32);
        self.elements.push(element);
        self.successors.push(Vec::new());
        self.predecessors.push(Vec::new());
        self.unfolded.push(false);
        id
    }

    fn add_edge(&mut self, from: ElementId, to: ElementId) {
        if self.debugging {
            log::debug!(
                "adding an edge '{}' -> '{}'",
                self.describe(from),
                self.describe(to)
            );
        }
        self.successors[from.0 as usize].push(to);
        self.predecessors[to.0 as usize].push(from);
    }

    fn can_package_be_removed(&self, package_name: &str) -> bool {
        !self.no_remove
            || !self.old_packages.contains_key(package_name)
            || self.cache.is_automatically_installed(package_name)
    }

    /// Whether an element for this package/version combination may take
    /// part in the search at all: sticked initial entries restrict their
    /// package to the requested state.
    fn is_element_allowed(
        &self,
        package_name: &str,
        version: Option<&Arc<BinaryVersion>>,
    ) -> bool {
        if let Some(initial) = self.initial_packages.get(package_name) {
            if initial.sticked {
                // a sticked entry pins its package to the requested state
                return match (version, &initial.version) {
                    (Some(candidate), Some(wanted)) => {
                        candidate.version_string == wanted.version_string
                    }
                    (None, None) => true,
                    _ => false,
                };
            }
        }
        if version.is_none() && !self.can_package_be_removed(package_name) {
            return false;
        }
        true
    }

    /// Get or create the version element for `(package, version)`.
    /// Disallowed combinations return `None`; newly created elements are
    /// queued for unfolding.
    pub fn version_element(
        &mut self,
        package_name: &str,
        version: Option<&Arc<BinaryVersion>>,
    ) -> Option<ElementId> {
        match version {
            Some(version) => {
                let key = (package_name.to_string(), version.version_string.clone());
                if let Some(cached) = self.version_index.get(&key) {
                    return *cached;
                }
                let element = if self.is_element_allowed(package_name, Some(version)) {
                    let id = self.add_element(Element::Version(VersionElement {
                        package_name: package_name.to_string(),
                        version: Some(version.clone()),
                    }));
                    self.related
                        .entry(package_name.to_string())
                        .or_default()
                        .push(id);
                    self.pending.push(id);
                    Some(id)
                } else {
                    None
                };
                self.version_index.insert(key, element);
                element
            }
            None => {
                if let Some(cached) = self.empty_index.get(package_name) {
                    return *cached;
                }
                let element = if self.is_element_allowed(package_name, None) {
                    let id = self.add_element(Element::Version(VersionElement {
                        package_name: package_name.to_string(),
                        version: None,
                    }));
                    self.related
                        .entry(package_name.to_string())
                        .or_default()
                        .push(id);
                    // sentinels carry no relations
                    self.unfolded[id.0 as usize] = true;
                    Some(id)
                } else {
                    None
                };
                self.empty_index.insert(package_name.to_string(), element);
                element
            }
        }
    }

    /// The "not installed" sentinel of the element's package.
    pub fn corresponding_empty_element(&mut self, id: ElementId) -> Option<ElementId> {
        let package_name = match self.element(id) {
            Element::Version(v) => v.package_name.clone(),
            _ => return None,
        };
        self.version_element(&package_name, None)
    }

    /// Materialize the relations of a version element and everything newly
    /// reachable through them.
    pub fn unfold(&mut self, id: ElementId) {
        self.unfold_one(id);
        while let Some(next) = self.pending.pop() {
            self.unfold_one(next);
        }
    }

    fn unfold_one(&mut self, id: ElementId) {
        if self.unfolded[id.0 as usize] {
            return;
        }
        self.unfolded[id.0 as usize] = true;

        let version = match self.element(id) {
            Element::Version(v) => match &v.version {
                Some(version) => version.clone(),
                None => return,
            },
            _ => return,
        };

        for group in self.dependency_groups.clone() {
            let line = version.relations.get(group.kind).clone();
            for expression in line.0 {
                if group.is_anti {
                    self.process_anti_relation(&version, id, &expression, group.kind);
                } else {
                    self.process_forward_relation(&version, id, &expression, group.kind);
                }
            }
        }

        if self.sync_level != SynchronizeLevel::None {
            self.process_synchronizations(&version, id);
        }
    }

    /// An unsatisfied soft dependency is not worth raising when it was
    /// already unsatisfied for the previously installed version of the same
    /// package carrying the identical expression.
    fn is_soft_dependency_ignored(
        &self,
        version: &BinaryVersion,
        kind: DependencyKind,
        expression: &RelationExpression,
        satisfying: &[Arc<BinaryVersion>],
    ) -> bool {
        let was_satisfied_in_past = satisfying.iter().any(|candidate| {
            self.old_packages
                .get(&candidate.package_name)
                .map(|old| old.version_string == candidate.version_string)
                .unwrap_or(false)
        });
        if was_satisfied_in_past {
            return false;
        }

        if let Some(old_version) = self.old_packages.get(&version.package_name) {
            if old_version.relations.contains_expression(kind, expression) {
                return true;
            }
        }

        false
    }

    fn process_forward_relation(
        &mut self,
        version: &Arc<BinaryVersion>,
        vertex: ElementId,
        expression: &RelationExpression,
        kind: DependencyKind,
    ) {
        let is_soft = matches!(kind, DependencyKind::Recommends | DependencyKind::Suggests);
        let mut satisfying = None;

        if is_soft {
            let versions = self.cache.get_satisfying_versions(expression);
            if self.is_soft_dependency_ignored(version, kind, expression, &versions) {
                if self.debugging {
                    log::debug!(
                        "ignoring soft dependency relation: {}: {} '{}'",
                        self.describe(vertex),
                        kind,
                        expression
                    );
                }
                return;
            }
            satisfying = Some(versions);
        }

        let key = (expression.hash_string(), kind);
        if let Some(&existing) = self.relation_index.get(&key) {
            self.add_edge(vertex, existing);
            return;
        }

        let relation_element = self.add_element(Element::Relation(RelationElement {
            kind,
            expression: Arc::new(expression.clone()),
            specific_package: None,
        }));
        self.relation_index.insert(key, relation_element);
        self.add_edge(vertex, relation_element);

        let satisfying =
            satisfying.unwrap_or_else(|| self.cache.get_satisfying_versions(expression));
        for candidate in satisfying {
            let candidate_name = candidate.package_name.clone();
            if let Some(candidate_element) = self.version_element(&candidate_name, Some(&candidate))
            {
                self.add_edge(relation_element, candidate_element);
            }
        }

        if is_soft {
            let marker = self.add_element(Element::Unsatisfied {
                parent: relation_element,
            });
            self.unfolded[marker.0 as usize] = true;
            self.add_edge(relation_element, marker);
        }
    }

    fn process_anti_relation(
        &mut self,
        version: &Arc<BinaryVersion>,
        vertex: ElementId,
        expression: &RelationExpression,
        kind: DependencyKind,
    ) {
        let key = (expression.hash_string(), kind);
        if !self.anti_index.contains_key(&key) {
            let satisfying = self.cache.get_satisfying_versions(expression);
            let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for candidate in &satisfying {
                grouped
                    .entry(candidate.package_name.clone())
                    .or_default()
                    .push(candidate.version_string.clone());
            }

            let mut sub_elements = Vec::new();
            let shared_expression = Arc::new(expression.clone());
            for (conflicted_package, conflicting_versions) in grouped {
                let sub_element = self.add_element(Element::Relation(RelationElement {
                    kind,
                    expression: shared_expression.clone(),
                    specific_package: Some(conflicted_package.clone()),
                }));
                self.unfolded[sub_element.0 as usize] = true;

                let package = self
                    .cache
                    .binary_package(&conflicted_package)
                    .cloned()
                    .unwrap_or_else(|| {
                        panic!(
                            "internal error: the binary package '{}' doesn't exist",
                            conflicted_package
                        )
                    });
                for package_version in package.versions() {
                    if conflicting_versions.contains(&package_version.version_string) {
                        continue;
                    }
                    if let Some(version_element) =
                        self.version_element(&conflicted_package, Some(package_version))
                    {
                        self.add_edge(sub_element, version_element);
                    }
                }
                if let Some(empty_element) = self.version_element(&conflicted_package, None) {
                    self.add_edge(sub_element, empty_element);
                }

                sub_elements.push((conflicted_package, sub_element));
            }
            self.anti_index.insert(key.clone(), sub_elements);
        }

        let sub_elements = self.anti_index.get(&key).cloned().unwrap_or_default();
        for (conflicted_package, sub_element) in sub_elements {
            if conflicted_package == version.package_name {
                continue; // doesn't conflict with itself
            }
            self.add_edge(vertex, sub_element);
        }
    }

    fn process_synchronizations(&mut self, version: &Arc<BinaryVersion>, vertex: ElementId) {
        let hash_key = format!(
            "{} {}",
            version.source_package_name, version.source_version_string
        );
        if !self.sync_index.contains_key(&hash_key) {
            let hard = self.sync_level == SynchronizeLevel::Hard;
            let binary_names = self
                .cache
                .source_package(&version.source_package_name)
                .and_then(|source| {
                    source
                        .specific_version(&version.source_version_string)
                        .map(|v| v.binary_package_names.clone())
                })
                .unwrap_or_default();

            let mut sub_elements = Vec::new();
            for binary_name in binary_names {
                let sync_element = self.add_element(Element::Sync(SyncElement {
                    target_package: binary_name.clone(),
                    hard,
                }));
                self.unfolded[sync_element.0 as usize] = true;

                let related_version = self.cache.binary_package(&binary_name).and_then(|p| {
                    p.versions()
                        .iter()
                        .find(|v| v.source_version_string == version.source_version_string)
                        .cloned()
                });
                if let Some(related_version) = related_version {
                    if let Some(related_element) =
                        self.version_element(&binary_name, Some(&related_version))
                    {
                        self.add_edge(sync_element, related_element);
                    }
                }
                if let Some(empty_element) = self.version_element(&binary_name, None) {
                    self.add_edge(sync_element, empty_element);
                }
                if !hard {
                    let marker = self.add_element(Element::Unsatisfied {
                        parent: sync_element,
                    });
                    self.unfolded[marker.0 as usize] = true;
                    self.add_edge(sync_element, marker);
                }

                sub_elements.push((binary_name, sync_element));
            }
            self.sync_index.insert(hash_key.clone(), sub_elements);
        }

        let sub_elements = self.sync_index.get(&hash_key).cloned().unwrap_or_default();
        for (binary_name, sync_element) in sub_elements {
            if binary_name == version.package_name {
                continue; // don't synchronize with itself
            }
            self.add_edge(vertex, sync_element);
        }
    }

    /// Seed the graph from the initial package states and materialize the
    /// reachable closure. Returns the initial solution contents.
    pub fn prepare(
        &mut self,
        old_packages: HashMap<String, Arc<BinaryVersion>>,
        initial_packages: BTreeMap<String, InitialPackageEntry>,
    ) -> Vec<(ElementId, bool)> {
        self.old_packages = old_packages;
        self.initial_packages = initial_packages;

        let initial: Vec<(String, InitialPackageEntry)> = self
            .initial_packages
            .iter()
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect();

        for (package_name, entry) in &initial {
            if let Some(version) = &entry.version {
                self.version_element(package_name, Some(version));

                if !entry.sticked {
                    if let Some(package) = self.cache.binary_package(package_name).cloned() {
                        for other_version in package.versions() {
                            self.version_element(package_name, Some(other_version));
                        }
                    }
                    self.version_element(package_name, None);
                }
            }
        }
        while let Some(next) = self.pending.pop() {
            self.unfold_one(next);
        }

        let mut result = Vec::new();
        for (package_name, entry) in &initial {
            let element = self
                .version_element(package_name, entry.version.as_ref())
                .unwrap_or_else(|| {
                    panic!(
                        "internal error: no element for the initial package '{}'",
                        package_name
                    )
                });
            result.push((element, entry.sticked));
        }
        let empties: Vec<(String, Option<ElementId>)> = self
            .empty_index
            .iter()
            .map(|(name, element)| (name.clone(), *element))
            .collect();
        for (package_name, element) in empties {
            if let Some(element) = element {
                if !self.initial_packages.contains_key(&package_name) {
                    result.push((element, false));
                }
            }
        }
        result
    }

    pub fn initial_package(&self, package_name: &str) -> Option<&InitialPackageEntry> {
        self.initial_packages.get(package_name)
    }

    pub fn was_installed_before(&self, package_name: &str) -> bool {
        self.old_packages.contains_key(package_name)
    }

    pub fn dummy_package_name(&self) -> &str {
        &self.dummy_package_name
    }
}
