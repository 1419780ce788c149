//! Dependency Graph Analyzer
//!
//! Pure graph functions over task dependency maps: cycle detection,
//! topological ordering, readiness checks, and unblock propagation.

use std::collections::{HashMap, HashSet, VecDeque};

/// Task id to prerequisite ids
pub type DependencyMap = HashMap<String, Vec<String>>;

/// Outcome of cycle validation
#[derive(Debug, Clone)]
pub struct CycleCheck {
    pub valid: bool,
    /// Nodes on the detected cycle, in dependency order; empty when valid
    pub cycle: Vec<String>,
}

impl CycleCheck {
    fn ok() -> Self {
        Self {
            valid: true,
            cycle: Vec::new(),
        }
    }

    fn cyclic(cycle: Vec<String>) -> Self {
        Self {
            valid: false,
            cycle,
        }
    }
}

/// Errors from graph operations
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Circular dependency detected: {0:?}")]
    Cyclic(Vec<String>),
}

/// DFS node coloring
#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Graph analyzer over task dependency maps
pub struct GraphAnalyzer;

impl GraphAnalyzer {
    /// Check the dependency map for cycles.
    ///
    /// Depth-first coloring; when a node already on the DFS stack is reached,
    /// the cycle path is reconstructed through parent links. Self-loops and
    /// isolated nodes are handled.
    pub fn validate_no_cycles(deps: &DependencyMap) -> CycleCheck {
        let nodes = Self::all_nodes(deps);
        let mut colors: HashMap<&str, Color> =
            nodes.iter().map(|n| (n.as_str(), Color::White)).collect();
        let mut parents: HashMap<&str, &str> = HashMap::new();

        for node in &nodes {
            if colors[node.as_str()] == Color::White {
                if let Some(cycle) = Self::dfs_visit(node, deps, &mut colors, &mut parents) {
                    return CycleCheck::cyclic(cycle);
                }
            }
        }
        CycleCheck::ok()
    }

    fn dfs_visit<'a>(
        node: &'a str,
        deps: &'a DependencyMap,
        colors: &mut HashMap<&'a str, Color>,
        parents: &mut HashMap<&'a str, &'a str>,
    ) -> Option<Vec<String>> {
        colors.insert(node, Color::Gray);

        if let Some(prereqs) = deps.get(node) {
            for prereq in prereqs {
                match colors.get(prereq.as_str()).copied() {
                    Some(Color::Gray) => {
                        // Back edge: walk parents from `node` up to `prereq`
                        let mut cycle = vec![node.to_string()];
                        let mut current = node;
                        while current != prereq.as_str() {
                            match parents.get(current) {
                                Some(&parent) => {
                                    cycle.push(parent.to_string());
                                    current = parent;
                                }
                                None => break,
                            }
                        }
                        cycle.reverse();
                        return Some(cycle);
                    }
                    Some(Color::White) => {
                        parents.insert(prereq.as_str(), node);
                        if let Some(cycle) = Self::dfs_visit(prereq, deps, colors, parents) {
                            return Some(cycle);
                        }
                    }
                    // Black nodes are fully explored, referenced nodes with no
                    // entry of their own are leaves
                    _ => {}
                }
            }
        }

        colors.insert(node, Color::Black);
        None
    }

    /// Topological order via in-degree reduction (Kahn).
    ///
    /// Prerequisites come before their dependents. Tie-breaking between
    /// simultaneously ready nodes is unspecified. Errors on cyclic input.
    pub fn topological_sort(deps: &DependencyMap) -> Result<Vec<String>, GraphError> {
        let nodes = Self::all_nodes(deps);

        // in-degree counts incoming prerequisite edges; an edge runs from
        // prerequisite to dependent
        let mut in_degree: HashMap<&str, usize> =
            nodes.iter().map(|n| (n.as_str(), 0)).collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for (task, prereqs) in deps {
            let unique: HashSet<&str> = prereqs.iter().map(|p| p.as_str()).collect();
            for prereq in unique {
                *in_degree.entry(task.as_str()).or_insert(0) += 1;
                dependents.entry(prereq).or_default().push(task.as_str());
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| *n)
            .collect();
        let mut order = Vec::with_capacity(nodes.len());

        while let Some(node) = queue.pop_front() {
            order.push(node.to_string());
            if let Some(next) = dependents.get(node) {
                for dependent in next {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(dependent);
                        }
                    }
                }
            }
        }

        if order.len() != nodes.len() {
            let check = Self::validate_no_cycles(deps);
            return Err(GraphError::Cyclic(check.cycle));
        }
        Ok(order)
    }

    /// A task can start when every prerequisite is in the completed set.
    /// Tasks with no prerequisites are always startable.
    pub fn can_start(task: &str, deps: &DependencyMap, completed: &HashSet<String>) -> bool {
        match deps.get(task) {
            Some(prereqs) => prereqs.iter().all(|p| completed.contains(p)),
            None => true,
        }
    }

    /// Tasks that newly satisfy `can_start` once `completed_task` joins the
    /// completed set.
    ///
    /// Only direct dependents are candidates; each candidate needs all of its
    /// prerequisites (not just the one that completed) in the augmented set.
    pub fn unlocked_by(
        completed_task: &str,
        deps: &DependencyMap,
        completed: &HashSet<String>,
    ) -> Vec<String> {
        let mut augmented = completed.clone();
        augmented.insert(completed_task.to_string());

        let mut unlocked: Vec<String> = deps
            .iter()
            .filter(|(task, prereqs)| {
                task.as_str() != completed_task
                    && !completed.contains(task.as_str())
                    && prereqs.iter().any(|p| p == completed_task)
                    && prereqs.iter().all(|p| augmented.contains(p))
            })
            .map(|(task, _)| task.clone())
            .collect();
        unlocked.sort();
        unlocked
    }

    /// Every node appearing in the map, as key or prerequisite
    fn all_nodes(deps: &DependencyMap) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut nodes = Vec::new();
        for (task, prereqs) in deps {
            if seen.insert(task.as_str()) {
                nodes.push(task.clone());
            }
            for prereq in prereqs {
                if seen.insert(prereq.as_str()) {
                    nodes.push(prereq.clone());
                }
            }
        }
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(edges: &[(&str, &[&str])]) -> DependencyMap {
        edges
            .iter()
            .map(|(task, prereqs)| {
                (
                    task.to_string(),
                    prereqs.iter().map(|p| p.to_string()).collect(),
                )
            })
            .collect()
    }

    fn completed(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_graph_is_valid() {
        let map = DependencyMap::new();
        assert!(GraphAnalyzer::validate_no_cycles(&map).valid);
        assert!(GraphAnalyzer::topological_sort(&map).unwrap().is_empty());
    }

    #[test]
    fn test_linear_chain_valid_and_sorted() {
        let map = deps(&[("b", &["a"]), ("c", &["b"])]);
        assert!(GraphAnalyzer::validate_no_cycles(&map).valid);

        let order = GraphAnalyzer::topological_sort(&map).unwrap();
        let pos = |id: &str| order.iter().position(|n| n == id).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
    }

    #[test]
    fn test_self_loop_detected() {
        let map = deps(&[("a", &["a"])]);
        let check = GraphAnalyzer::validate_no_cycles(&map);
        assert!(!check.valid);
        assert!(check.cycle.contains(&"a".to_string()));
    }

    #[test]
    fn test_two_node_cycle_detected() {
        let map = deps(&[("a", &["b"]), ("b", &["a"])]);
        let check = GraphAnalyzer::validate_no_cycles(&map);
        assert!(!check.valid);
        assert!(check.cycle.contains(&"a".to_string()));
        assert!(check.cycle.contains(&"b".to_string()));
    }

    #[test]
    fn test_cycle_behind_chain_detected() {
        let map = deps(&[("a", &["b"]), ("b", &["c"]), ("c", &["b"])]);
        let check = GraphAnalyzer::validate_no_cycles(&map);
        assert!(!check.valid);
        assert!(check.cycle.contains(&"b".to_string()));
        assert!(check.cycle.contains(&"c".to_string()));
        assert!(!check.cycle.contains(&"a".to_string()));
    }

    #[test]
    fn test_parallel_edges_deduplicated() {
        let map = deps(&[("b", &["a", "a"])]);
        assert!(GraphAnalyzer::validate_no_cycles(&map).valid);

        let order = GraphAnalyzer::topological_sort(&map).unwrap();
        assert_eq!(order.len(), 2);
    }

    #[test]
    fn test_topological_sort_rejects_cycle() {
        let map = deps(&[("a", &["b"]), ("b", &["a"])]);
        assert!(matches!(
            GraphAnalyzer::topological_sort(&map),
            Err(GraphError::Cyclic(_))
        ));
    }

    #[test]
    fn test_can_start_no_prereqs() {
        let map = DependencyMap::new();
        assert!(GraphAnalyzer::can_start("a", &map, &completed(&[])));
    }

    #[test]
    fn test_can_start_requires_all_prereqs() {
        let map = deps(&[("c", &["a", "b"])]);
        assert!(!GraphAnalyzer::can_start("c", &map, &completed(&["a"])));
        assert!(GraphAnalyzer::can_start("c", &map, &completed(&["a", "b"])));
    }

    #[test]
    fn test_diamond_not_unlocked_by_one_side() {
        // b and c depend on a; d depends on b and c
        let map = deps(&[("b", &["a"]), ("c", &["a"]), ("d", &["b", "c"])]);

        // b completes while c is incomplete: d stays locked
        let unlocked = GraphAnalyzer::unlocked_by("b", &map, &completed(&["a"]));
        assert!(unlocked.is_empty());

        // c completes after b: d unlocks
        let unlocked = GraphAnalyzer::unlocked_by("c", &map, &completed(&["a", "b"]));
        assert_eq!(unlocked, vec!["d".to_string()]);
    }

    #[test]
    fn test_unlocked_by_only_direct_dependents() {
        let map = deps(&[("b", &["a"]), ("c", &["b"])]);
        // completing a unlocks b but not c, which depends only on b
        let unlocked = GraphAnalyzer::unlocked_by("a", &map, &completed(&[]));
        assert_eq!(unlocked, vec!["b".to_string()]);
    }

    #[test]
    fn test_unlocked_by_multiple_dependents_sorted() {
        let map = deps(&[("b", &["a"]), ("c", &["a"])]);
        let unlocked = GraphAnalyzer::unlocked_by("a", &map, &completed(&[]));
        assert_eq!(unlocked, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_unlocked_by_skips_already_completed() {
        let map = deps(&[("b", &["a"])]);
        let unlocked = GraphAnalyzer::unlocked_by("a", &map, &completed(&["b"]));
        assert!(unlocked.is_empty());
    }
}
