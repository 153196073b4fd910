// src/dag/graph.rs

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::errors::{CyclicDependencyError, GraphError};
use crate::fs::FileSystem;
use crate::target::{Target, TargetName};

static NO_NEIGHBOURS: BTreeSet<TargetName> = BTreeSet::new();

/// Immutable dependency graph of targets.
///
/// Edges come from files: a target depends on every target that lists one of
/// its inputs as an output. Built once from the resolved target list.
#[derive(Debug, Clone)]
pub struct Graph {
    targets: HashMap<TargetName, Target>,
    /// Names in creation order.
    creation_order: Vec<TargetName>,
    /// Names ordered so dependencies come before their dependents.
    topo_order: Vec<TargetName>,
    providers: HashMap<PathBuf, TargetName>,
    dependencies: HashMap<TargetName, BTreeSet<TargetName>>,
    dependents: HashMap<TargetName, BTreeSet<TargetName>>,
    /// Inputs that no target produces; they must already exist on disk.
    unresolved: Vec<(TargetName, PathBuf)>,
}

impl Graph {
    /// Build the graph, failing on duplicate names, files with more than one
    /// producer, and cycles.
    pub fn from_targets<I>(targets: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = Target>,
    {
        let mut by_name: HashMap<TargetName, Target> = HashMap::new();
        let mut creation_order = Vec::new();

        for target in targets {
            if by_name.contains_key(&target.name) {
                return Err(GraphError::DuplicateTarget(target.name));
            }
            creation_order.push(target.name.clone());
            by_name.insert(target.name.clone(), target);
        }
        creation_order.sort_by_key(|name| by_name[name].order);

        let mut providers: HashMap<PathBuf, TargetName> = HashMap::new();
        for name in &creation_order {
            for output in &by_name[name].outputs {
                if let Some(first) = providers.get(output) {
                    return Err(GraphError::MultipleProviders {
                        path: output.clone(),
                        first: first.clone(),
                        second: name.clone(),
                    });
                }
                providers.insert(output.clone(), name.clone());
            }
        }

        let mut dependencies: HashMap<TargetName, BTreeSet<TargetName>> = HashMap::new();
        let mut dependents: HashMap<TargetName, BTreeSet<TargetName>> = HashMap::new();
        let mut unresolved = Vec::new();

        for name in &creation_order {
            let deps = dependencies.entry(name.clone()).or_default();
            dependents.entry(name.clone()).or_default();

            for input in &by_name[name].inputs {
                match providers.get(input) {
                    Some(provider) if provider == name => {
                        return Err(CyclicDependencyError {
                            target: name.clone(),
                        }
                        .into());
                    }
                    Some(provider) => {
                        deps.insert(provider.clone());
                    }
                    None => unresolved.push((name.clone(), input.clone())),
                }
            }
        }

        for (name, deps) in &dependencies {
            for dep in deps {
                dependents
                    .entry(dep.clone())
                    .or_default()
                    .insert(name.clone());
            }
        }

        let topo_order = topological_order(&creation_order, &dependencies)?;

        debug!(
            targets = creation_order.len(),
            unresolved = unresolved.len(),
            "built target graph"
        );

        Ok(Self {
            targets: by_name,
            creation_order,
            topo_order,
            providers,
            dependencies,
            dependents,
            unresolved,
        })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.get(name)
    }

    /// All targets in creation order.
    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.creation_order.iter().map(|name| &self.targets[name])
    }

    /// Target names with every dependency before its dependents.
    pub fn topological_order(&self) -> &[TargetName] {
        &self.topo_order
    }

    /// Targets whose outputs `name` consumes.
    pub fn dependencies_of(&self, name: &str) -> &BTreeSet<TargetName> {
        self.dependencies.get(name).unwrap_or(&NO_NEIGHBOURS)
    }

    /// Targets that consume the outputs of `name`.
    pub fn dependents_of(&self, name: &str) -> &BTreeSet<TargetName> {
        self.dependents.get(name).unwrap_or(&NO_NEIGHBOURS)
    }

    /// The target producing `path`, if any.
    pub fn provider_of(&self, path: &Path) -> Option<&TargetName> {
        self.providers.get(path)
    }

    /// Targets nothing else depends on, in creation order.
    pub fn endpoints(&self) -> Vec<&Target> {
        self.targets()
            .filter(|t| self.dependents_of(&t.name).is_empty())
            .collect()
    }

    /// Every target `name` transitively depends on, excluding `name`.
    pub fn dependency_closure(&self, name: &str) -> BTreeSet<TargetName> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&TargetName> = self.dependencies_of(name).iter().collect();

        while let Some(dep) = stack.pop() {
            if seen.insert(dep.clone()) {
                stack.extend(self.dependencies_of(dep).iter());
            }
        }
        seen
    }

    /// Inputs not produced by any target, with the target that needs them.
    pub fn unresolved_inputs(&self) -> &[(TargetName, PathBuf)] {
        &self.unresolved
    }

    /// Fail if an input is neither produced by a target nor present on disk.
    pub fn check_unresolved(&self, fs: &dyn FileSystem) -> Result<(), GraphError> {
        for (target, path) in &self.unresolved {
            if !fs.exists(path) {
                return Err(GraphError::UnresolvedInput {
                    target: target.clone(),
                    path: path.clone(),
                });
            }
        }
        Ok(())
    }
}

fn topological_order(
    creation_order: &[TargetName],
    dependencies: &HashMap<TargetName, BTreeSet<TargetName>>,
) -> Result<Vec<TargetName>, CyclicDependencyError> {
    // Edge direction: dependency -> dependent.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in creation_order {
        graph.add_node(name.as_str());
    }
    for name in creation_order {
        for dep in &dependencies[name] {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
        Err(cycle) => Err(CyclicDependencyError {
            target: cycle.node_id().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn t(name: &str, order: usize, inputs: &[&str], outputs: &[&str]) -> Target {
        Target::empty(name, "/w")
            .with_inputs(inputs)
            .with_outputs(outputs)
            .with_order(order)
    }

    fn position(order: &[TargetName], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn edges_follow_files() {
        let graph = Graph::from_targets([
            t("T1", 0, &[], &["a.txt"]),
            t("T2", 1, &["a.txt"], &["b.txt"]),
            t("T3", 2, &["a.txt"], &["c.txt"]),
        ])
        .unwrap();

        assert!(graph.dependencies_of("T1").is_empty());
        assert_eq!(
            graph.dependents_of("T1").iter().collect::<Vec<_>>(),
            vec!["T2", "T3"]
        );
        assert_eq!(graph.dependencies_of("T2").iter().collect::<Vec<_>>(), vec!["T1"]);

        let endpoints: Vec<_> = graph.endpoints().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(endpoints, vec!["T2", "T3"]);
        assert_eq!(
            graph.provider_of(Path::new("/w/a.txt")).map(String::as_str),
            Some("T1")
        );
    }

    #[test]
    fn topological_order_puts_dependencies_first() {
        let graph = Graph::from_targets([
            t("C", 0, &["b"], &["c"]),
            t("B", 1, &["a"], &["b"]),
            t("A", 2, &[], &["a"]),
        ])
        .unwrap();

        let order = graph.topological_order();
        assert!(position(order, "A") < position(order, "B"));
        assert!(position(order, "B") < position(order, "C"));

        let created: Vec<_> = graph.targets().map(|t| t.name.as_str()).collect();
        assert_eq!(created, vec!["C", "B", "A"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let err = Graph::from_targets([
            t("A", 0, &["b"], &["a"]),
            t("B", 1, &["a"], &["b"]),
        ])
        .unwrap_err();

        match err {
            GraphError::Cycle(CyclicDependencyError { target }) => {
                assert!(target == "A" || target == "B");
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn consuming_own_output_is_a_cycle() {
        let err = Graph::from_targets([t("A", 0, &["a"], &["a"])]).unwrap_err();
        assert!(matches!(err, GraphError::Cycle(_)));
    }

    #[test]
    fn duplicate_names_and_providers_are_rejected() {
        let err = Graph::from_targets([t("A", 0, &[], &[]), t("A", 1, &[], &[])]).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateTarget(name) if name == "A"));

        let err = Graph::from_targets([t("A", 0, &[], &["x"]), t("B", 1, &[], &["x"])])
            .unwrap_err();
        assert!(matches!(err, GraphError::MultipleProviders { .. }));
    }

    #[test]
    fn dependency_closure_is_transitive() {
        let graph = Graph::from_targets([
            t("A", 0, &[], &["a"]),
            t("B", 1, &["a"], &["b"]),
            t("C", 2, &["a"], &["c"]),
            t("D", 3, &["b", "c"], &["d"]),
        ])
        .unwrap();

        let closure: Vec<_> = graph.dependency_closure("D").into_iter().collect();
        assert_eq!(closure, vec!["A", "B", "C"]);
        assert!(graph.dependency_closure("A").is_empty());
    }

    #[test]
    fn unresolved_inputs_must_exist() {
        let graph = Graph::from_targets([t("A", 0, &["raw.fa"], &["a"])]).unwrap();
        assert_eq!(graph.unresolved_inputs().len(), 1);

        let fs = MockFileSystem::new();
        assert!(matches!(
            graph.check_unresolved(&fs),
            Err(GraphError::UnresolvedInput { .. })
        ));

        fs.add_file("/w/raw.fa", ">seq");
        graph.check_unresolved(&fs).unwrap();
    }
}
