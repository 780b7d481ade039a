// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! Dependency graph for pipeline modules
//!
//! Edges come from two sources: explicit `depends_on` entries, and
//! producer → consumer relations over result store keys. The graph is
//! built for every pipeline (it drives `capflow graph`), but only the
//! dependency ordering mode requires it to be acyclic.

use petgraph::algo::{has_path_connecting, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::capabilities::InputDecl;
use crate::errors::{CapflowError, CapflowResult};

/// A module as seen by the graph
#[derive(Debug, Clone)]
pub struct GraphNode {
    /// Instance name
    pub name: String,
    /// Registry identifier
    pub id: String,
    pub consumes: Vec<InputDecl>,
    pub produces: Vec<String>,
    pub depends_on: Vec<String>,
}

/// Why one module must precede another
#[derive(Debug, Clone, Default)]
pub struct DependencyEdge {
    /// Declared through depends_on
    pub explicit: bool,
    /// Keys flowing along the edge
    pub keys: Vec<String>,
}

/// Module dependency graph; node weights are specification positions
pub struct DependencyGraph {
    graph: DiGraph<usize, DependencyEdge>,
    nodes: Vec<GraphNode>,
    name_to_index: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Build the graph for modules listed in specification order
    pub fn build(nodes: Vec<GraphNode>) -> CapflowResult<Self> {
        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();

        for (position, node) in nodes.iter().enumerate() {
            let index = graph.add_node(position);
            name_to_index.insert(node.name.clone(), index);
        }

        let mut dag = Self {
            graph,
            nodes,
            name_to_index,
        };

        // Explicit dependencies from depends_on
        for position in 0..dag.nodes.len() {
            let target = NodeIndex::new(position);
            for dep_name in dag.nodes[position].depends_on.clone() {
                let source = *dag.name_to_index.get(&dep_name).ok_or_else(|| {
                    CapflowError::InvalidPipeline {
                        reason: format!(
                            "Module '{}' depends on unknown module '{}'",
                            dag.nodes[position].name, dep_name
                        ),
                        help: Some(format!("Check that '{}' is listed in your pipeline", dep_name)),
                    }
                })?;

                if source == target {
                    return Err(CapflowError::InvalidPipeline {
                        reason: format!("Module '{}' depends on itself", dep_name),
                        help: None,
                    });
                }

                dag.edge_mut(source, target).explicit = true;
            }
        }

        // Implicit dependencies from produced/consumed keys. A module that
        // rewrites a key in place only reads it from producers listed before it.
        for consumer in 0..dag.nodes.len() {
            for decl in dag.nodes[consumer].consumes.clone() {
                let rewrites = dag.nodes[consumer].produces.contains(&decl.key);
                let producers = if rewrites { 0..consumer } else { 0..dag.nodes.len() };

                for producer in producers {
                    if producer != consumer && dag.nodes[producer].produces.contains(&decl.key) {
                        dag.edge_mut(NodeIndex::new(producer), NodeIndex::new(consumer))
                            .keys
                            .push(decl.key.clone());
                    }
                }
            }
        }

        Ok(dag)
    }

    fn edge_mut(&mut self, from: NodeIndex, to: NodeIndex) -> &mut DependencyEdge {
        let edge = match self.graph.find_edge(from, to) {
            Some(edge) => edge,
            None => self.graph.add_edge(from, to, DependencyEdge::default()),
        };
        &mut self.graph[edge]
    }

    /// Nodes in specification order
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Topologically sorted specification positions
    ///
    /// Among modules that are ready at the same time, the one listed
    /// first in the pipeline definition runs first.
    pub fn topological_order(&self) -> CapflowResult<Vec<usize>> {
        let mut in_degree: Vec<usize> = (0..self.nodes.len())
            .map(|i| {
                self.graph
                    .neighbors_directed(NodeIndex::new(i), Direction::Incoming)
                    .count()
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(position)) = ready.pop() {
            order.push(position);
            for next in self
                .graph
                .neighbors_directed(NodeIndex::new(position), Direction::Outgoing)
            {
                let slot = &mut in_degree[next.index()];
                *slot -= 1;
                if *slot == 0 {
                    ready.push(Reverse(next.index()));
                }
            }
        }

        if order.len() < self.nodes.len() {
            return Err(CapflowError::CyclicDependency {
                modules: self.cycle_members(),
            });
        }

        Ok(order)
    }

    /// Topologically sorted instance names
    pub fn topological_order_names(&self) -> CapflowResult<Vec<String>> {
        Ok(self
            .topological_order()?
            .into_iter()
            .map(|i| self.nodes[i].name.clone())
            .collect())
    }

    /// Members of the first cycle found, closed by repeating the first member
    fn cycle_members(&self) -> Vec<String> {
        let Some(mut component) = tarjan_scc(&self.graph)
            .into_iter()
            .find(|scc| scc.len() > 1)
        else {
            return vec![];
        };

        component.sort_by_key(|n| n.index());
        let mut members: Vec<String> = component
            .iter()
            .map(|n| self.nodes[n.index()].name.clone())
            .collect();
        members.push(members[0].clone());
        members
    }

    /// Modules that must run before `name`
    pub fn dependencies(&self, name: &str) -> Option<Vec<String>> {
        self.neighbors(name, Direction::Incoming)
    }

    /// Modules that depend on `name`
    pub fn dependents(&self, name: &str) -> Option<Vec<String>> {
        self.neighbors(name, Direction::Outgoing)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Option<Vec<String>> {
        let node = self.name_to_index.get(name)?;
        let mut positions: Vec<usize> = self
            .graph
            .neighbors_directed(*node, direction)
            .map(|n| n.index())
            .collect();
        positions.sort_unstable();
        Some(positions.into_iter().map(|i| self.nodes[i].name.clone()).collect())
    }

    /// Check if module A depends (directly or transitively) on module B
    pub fn depends_on(&self, module_a: &str, module_b: &str) -> bool {
        let Some(node_a) = self.name_to_index.get(module_a) else {
            return false;
        };
        let Some(node_b) = self.name_to_index.get(module_b) else {
            return false;
        };

        has_path_connecting(&self.graph, *node_b, *node_a, None)
    }

    /// Edges as (from, to, edge) in a stable order
    fn sorted_edges(&self) -> Vec<(usize, usize, &DependencyEdge)> {
        let mut edges: Vec<_> = self
            .graph
            .edge_indices()
            .filter_map(|e| {
                let (from, to) = self.graph.edge_endpoints(e)?;
                Some((from.index(), to.index(), &self.graph[e]))
            })
            .collect();
        edges.sort_by_key(|(from, to, _)| (*from, *to));
        edges
    }

    /// Generate Mermaid diagram of the graph
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");

        for node in &self.nodes {
            out.push_str(&format!("    {}[\"{} ({})\"]\n", node.name, node.name, node.id));
        }

        for (from, to, edge) in self.sorted_edges() {
            let from_name = &self.nodes[from].name;
            let to_name = &self.nodes[to].name;
            if edge.keys.is_empty() {
                out.push_str(&format!("    {} --> {}\n", from_name, to_name));
            } else {
                out.push_str(&format!(
                    "    {} -->|{}| {}\n",
                    from_name,
                    edge.keys.join(", "),
                    to_name
                ));
            }
        }

        out
    }

    /// Generate DOT diagram of the graph
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph pipeline {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for (from, to, edge) in self.sorted_edges() {
            let from_name = &self.nodes[from].name;
            let to_name = &self.nodes[to].name;
            if edge.keys.is_empty() {
                out.push_str(&format!("    \"{}\" -> \"{}\" [style=dashed];\n", from_name, to_name));
            } else {
                out.push_str(&format!(
                    "    \"{}\" -> \"{}\" [label=\"{}\"];\n",
                    from_name,
                    to_name,
                    edge.keys.join(", ")
                ));
            }
        }

        // Isolated nodes (no edges)
        for (position, node) in self.nodes.iter().enumerate() {
            if self
                .graph
                .neighbors_undirected(NodeIndex::new(position))
                .next()
                .is_none()
            {
                out.push_str(&format!("    \"{}\";\n", node.name));
            }
        }

        out.push_str("}\n");
        out
    }

    /// Text listing of an execution order
    pub fn to_text(&self, order: &[usize]) -> String {
        let mut out = String::new();

        for (i, position) in order.iter().enumerate() {
            let node = &self.nodes[*position];
            let deps = self.dependencies(&node.name).unwrap_or_default();

            out.push_str(&format!("{}. {} ({})", i + 1, node.name, node.id));

            if !deps.is_empty() {
                out.push_str(&format!(" [depends: {}]", deps.join(", ")));
            }

            out.push('\n');
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// (name, consumes, produces, depends_on)
    fn make_graph(nodes: Vec<(&str, Vec<&str>, Vec<&str>, Vec<&str>)>) -> CapflowResult<DependencyGraph> {
        DependencyGraph::build(
            nodes
                .into_iter()
                .map(|(name, consumes, produces, deps)| GraphNode {
                    name: name.into(),
                    id: name.into(),
                    consumes: consumes.into_iter().map(InputDecl::required).collect(),
                    produces: produces.into_iter().map(String::from).collect(),
                    depends_on: deps.into_iter().map(String::from).collect(),
                })
                .collect(),
        )
    }

    #[test]
    fn test_key_edges_reorder() {
        let dag = make_graph(vec![
            ("summarizer", vec!["raw_text"], vec!["summary"], vec![]),
            ("scraper", vec![], vec!["raw_text"], vec![]),
        ])
        .unwrap();

        assert_eq!(dag.topological_order_names().unwrap(), vec!["scraper", "summarizer"]);
        assert_eq!(dag.dependencies("summarizer").unwrap(), vec!["scraper"]);
        assert_eq!(dag.dependents("scraper").unwrap(), vec!["summarizer"]);
    }

    #[test]
    fn test_ties_follow_specification_order() {
        let dag = make_graph(vec![
            ("d", vec!["b_out", "c_out"], vec!["d_out"], vec![]),
            ("c", vec!["a_out"], vec!["c_out"], vec![]),
            ("b", vec!["a_out"], vec!["b_out"], vec![]),
            ("a", vec![], vec!["a_out"], vec![]),
            ("e", vec![], vec!["e_out"], vec![]),
        ])
        .unwrap();

        // a and e are ready first; c precedes b because it is listed first
        assert_eq!(dag.topological_order_names().unwrap(), vec!["a", "c", "b", "d", "e"]);
    }

    #[test]
    fn test_explicit_dependencies() {
        let dag = make_graph(vec![
            ("report", vec![], vec!["report"], vec!["fetch"]),
            ("fetch", vec![], vec!["page"], vec![]),
        ])
        .unwrap();

        assert_eq!(dag.topological_order().unwrap(), vec![1, 0]);
        assert!(dag.depends_on("report", "fetch"));
        assert!(!dag.depends_on("fetch", "report"));
    }

    #[test]
    fn test_cycle_detection() {
        let dag = make_graph(vec![
            ("a", vec!["y"], vec!["x"], vec![]),
            ("b", vec!["x"], vec!["y"], vec![]),
            ("c", vec![], vec!["z"], vec![]),
        ])
        .unwrap();

        match dag.topological_order() {
            Err(CapflowError::CyclicDependency { modules }) => {
                assert_eq!(modules, vec!["a", "b", "a"]);
            }
            other => panic!("expected cycle, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_unknown_and_self_dependency() {
        let unknown = make_graph(vec![("a", vec![], vec!["x"], vec!["ghost"])]);
        assert!(matches!(unknown, Err(CapflowError::InvalidPipeline { .. })));

        let own = make_graph(vec![("a", vec![], vec!["x"], vec!["a"])]);
        assert!(matches!(own, Err(CapflowError::InvalidPipeline { .. })));
    }

    #[test]
    fn test_module_consuming_its_own_key_has_no_self_edge() {
        let dag = make_graph(vec![
            ("source", vec![], vec!["text"], vec![]),
            ("normalize", vec!["text"], vec!["text"], vec![]),
        ])
        .unwrap();

        assert_eq!(dag.topological_order().unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_chained_rewrites_are_not_a_cycle() {
        let dag = make_graph(vec![
            ("source", vec![], vec!["text"], vec![]),
            ("trim", vec!["text"], vec!["text"], vec![]),
            ("lower", vec!["text"], vec!["text"], vec![]),
            ("stats", vec!["text"], vec!["stats"], vec![]),
        ])
        .unwrap();

        assert_eq!(dag.topological_order().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(dag.dependencies("lower").unwrap(), vec!["source", "trim"]);
        assert!(!dag.depends_on("trim", "lower"));
    }

    #[test]
    fn test_text_output() {
        let dag = make_graph(vec![
            ("scraper", vec![], vec!["raw_text"], vec![]),
            ("summarizer", vec!["raw_text"], vec!["summary"], vec![]),
            ("stats", vec!["raw_text"], vec!["stats"], vec![]),
        ])
        .unwrap();
        let order = dag.topological_order().unwrap();

        insta::assert_snapshot!(dag.to_text(&order).trim_end(), @r###"
        1. scraper (scraper)
        2. summarizer (summarizer) [depends: scraper]
        3. stats (stats) [depends: scraper]
        "###);
    }

    #[test]
    fn test_mermaid_and_dot_output() {
        let dag = make_graph(vec![
            ("a", vec![], vec!["x"], vec![]),
            ("b", vec!["x"], vec!["y"], vec!["a"]),
            ("lonely", vec![], vec!["z"], vec![]),
        ])
        .unwrap();

        let mermaid = dag.to_mermaid();
        assert!(mermaid.starts_with("graph TD\n"));
        assert!(mermaid.contains("a -->|x| b"));

        let dot = dag.to_dot();
        assert!(dot.contains("\"a\" -> \"b\" [label=\"x\"];"));
        assert!(dot.contains("    \"lonely\";\n"));
    }
}
