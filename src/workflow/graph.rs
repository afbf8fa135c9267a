//! Dependency-graph checks and execution ordering.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::error::SwarmError;

/// Node ids in declaration order with their dependencies.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    order: Vec<String>,
    depends_on: BTreeMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new<'a>(nodes: impl IntoIterator<Item = (&'a str, &'a [String])>) -> Self {
        let mut graph = Self::default();
        for (id, deps) in nodes {
            graph.order.push(id.to_string());
            graph.depends_on.insert(id.to_string(), deps.to_vec());
        }
        graph
    }

    pub fn contains(&self, id: &str) -> bool {
        self.depends_on.contains_key(id)
    }

    pub fn dependencies(&self, id: &str) -> &[String] {
        self.depends_on.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    fn dependents(&self, id: &str) -> impl Iterator<Item = &String> + '_ {
        let id = id.to_string();
        self.order
            .iter()
            .filter(move |candidate| self.dependencies(candidate).contains(&id))
    }

    /// Reject unknown dependencies and dependency cycles.
    pub fn validate(&self) -> Result<(), SwarmError> {
        for id in &self.order {
            if let Some(missing) = self.dependencies(id).iter().find(|dep| !self.contains(dep)) {
                return Err(SwarmError::config(format!(
                    "node '{id}' depends on undefined node '{missing}'"
                )));
            }
        }
        if let Some(cycle) = self.find_cycle() {
            return Err(SwarmError::GraphCycle { cycle });
        }
        Ok(())
    }

    /// A dependency cycle as a closed path, if one exists.
    fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit(
            graph: &DependencyGraph,
            id: &str,
            marks: &mut BTreeMap<String, Mark>,
            path: &mut Vec<String>,
        ) -> Option<Vec<String>> {
            match marks.get(id) {
                Some(Mark::Done) => return None,
                Some(Mark::Visiting) => {
                    let start = path.iter().position(|node| node == id).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(id.to_string());
                    return Some(cycle);
                }
                None => {}
            }
            marks.insert(id.to_string(), Mark::Visiting);
            path.push(id.to_string());
            for dep in graph.dependencies(id) {
                if let Some(cycle) = visit(graph, dep, marks, path) {
                    return Some(cycle);
                }
            }
            path.pop();
            marks.insert(id.to_string(), Mark::Done);
            None
        }

        let mut marks = BTreeMap::new();
        self.order
            .iter()
            .find_map(|id| visit(self, id, &mut marks, &mut Vec::new()))
    }

    /// `start` and every node that transitively depends on it.
    pub fn reachable_from(&self, start: &str) -> BTreeSet<String> {
        let mut reached = BTreeSet::from([start.to_string()]);
        let mut queue = VecDeque::from([start.to_string()]);
        while let Some(id) = queue.pop_front() {
            for dependent in self.dependents(&id) {
                if reached.insert(dependent.clone()) {
                    queue.push_back(dependent.clone());
                }
            }
        }
        reached
    }

    /// Topological order of the nodes reachable from `start`; ties keep
    /// declaration order.
    pub fn execution_order(&self, start: &str) -> Vec<String> {
        let reached = self.reachable_from(start);
        let mut pending: BTreeMap<&str, usize> = reached
            .iter()
            .map(|id| {
                let in_run = self
                    .dependencies(id)
                    .iter()
                    .filter(|dep| reached.contains(*dep))
                    .count();
                (id.as_str(), if id == start { 0 } else { in_run })
            })
            .collect();

        let mut order = Vec::with_capacity(reached.len());
        loop {
            let next = self
                .order
                .iter()
                .find(|id| pending.get(id.as_str()) == Some(&0))
                .cloned();
            let Some(id) = next else { break };
            pending.remove(id.as_str());
            for dependent in self.dependents(&id) {
                if let Some(count) = pending.get_mut(dependent.as_str()) {
                    *count = count.saturating_sub(1);
                }
            }
            order.push(id);
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
        let owned: Vec<(String, Vec<String>)> = edges
            .iter()
            .map(|(id, deps)| (id.to_string(), deps.iter().map(|d| d.to_string()).collect()))
            .collect();
        DependencyGraph::new(owned.iter().map(|(id, deps)| (id.as_str(), deps.as_slice())))
    }

    #[test]
    fn detects_cycles_with_their_path() {
        let err = graph(&[("a", &["c"]), ("b", &["a"]), ("c", &["b"])])
            .validate()
            .unwrap_err();
        match err {
            SwarmError::GraphCycle { cycle } => {
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 4);
            }
            other => panic!("expected a cycle, got {other}"),
        }
    }

    #[test]
    fn rejects_unknown_dependencies() {
        let err = graph(&[("a", &["ghost"])]).validate().unwrap_err();
        assert!(err.to_string().contains("undefined node 'ghost'"));
    }

    #[test]
    fn orders_dependents_after_dependencies() {
        let g = graph(&[
            ("plan", &[]),
            ("test", &["implement", "plan"]),
            ("implement", &["plan"]),
            ("unrelated", &[]),
        ]);
        assert!(g.validate().is_ok());
        assert_eq!(g.execution_order("plan"), vec!["plan", "implement", "test"]);
        assert_eq!(g.execution_order("implement"), vec!["implement", "test"]);
    }
}
