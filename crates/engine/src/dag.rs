//! Task graph construction and validation.
//!
//! Rules enforced by [`GraphBuilder::build`]:
//! 1. Task IDs must be unique (checked as tasks are added).
//! 2. Every upstream reference must name an existing task.
//! 3. The directed graph must be acyclic (topological sort must succeed).
//!
//! The resulting [`Graph`] is immutable and carries a topological order in
//! which ties are broken by insertion order, so the same definition always
//! yields the same order.

use std::collections::{BTreeSet, HashMap};

use crate::{models::TaskNode, EngineError};

/// Collects tasks before validation.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<TaskNode>,
    index: HashMap<String, usize>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task.
    ///
    /// # Errors
    /// [`EngineError::DuplicateNode`] if a task with the same ID was added.
    pub fn add_node(&mut self, node: TaskNode) -> Result<&mut Self, EngineError> {
        if self.index.contains_key(&node.id) {
            return Err(EngineError::DuplicateNode(node.id));
        }
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(self)
    }

    /// Validate edges and freeze the graph.
    ///
    /// # Errors
    /// - [`EngineError::DanglingEdge`] if an upstream reference is unknown.
    /// - [`EngineError::Cycle`] if the tasks cannot be ordered.
    pub fn build(self) -> Result<Graph, EngineError> {
        let Self { nodes, index } = self;

        // -----------------------------------------------------------------------
        // 1. Validate edge endpoints, building downstream adjacency.
        // -----------------------------------------------------------------------
        let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        let mut in_degree: Vec<usize> = vec![0; nodes.len()];

        for (i, node) in nodes.iter().enumerate() {
            for upstream in &node.upstream {
                let Some(&u) = index.get(upstream) else {
                    return Err(EngineError::DanglingEdge {
                        task_id: node.id.clone(),
                        upstream: upstream.clone(),
                    });
                };
                downstream[u].push(i);
                in_degree[i] += 1;
            }
        }

        // -----------------------------------------------------------------------
        // 2. Topological sort (Kahn's algorithm, lowest insertion index first)
        // -----------------------------------------------------------------------
        let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order: Vec<usize> = Vec::with_capacity(nodes.len());

        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &d in &downstream[i] {
                in_degree[d] -= 1;
                if in_degree[d] == 0 {
                    ready.insert(d);
                }
            }
        }

        // Whatever never reached in-degree zero sits on (or behind) a cycle.
        if order.len() != nodes.len() {
            let tasks = (0..nodes.len())
                .filter(|&i| in_degree[i] > 0)
                .map(|i| nodes[i].id.clone())
                .collect();
            return Err(EngineError::Cycle { tasks });
        }

        Ok(Graph {
            order: order.iter().map(|&i| nodes[i].id.clone()).collect(),
            downstream: downstream
                .into_iter()
                .map(|ds| ds.into_iter().map(|d| nodes[d].id.clone()).collect())
                .collect(),
            nodes,
            index,
        })
    }
}

/// A validated, immutable task graph.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<TaskNode>,
    index: HashMap<String, usize>,
    downstream: Vec<Vec<String>>,
    order: Vec<String>,
}

impl Graph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    /// Build a graph from tasks in the given order.
    pub fn from_nodes(nodes: impl IntoIterator<Item = TaskNode>) -> Result<Self, EngineError> {
        let mut builder = GraphBuilder::new();
        for node in nodes {
            builder.add_node(node)?;
        }
        builder.build()
    }

    /// Task IDs in execution order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn node(&self, id: &str) -> Option<&TaskNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Tasks in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.nodes.iter()
    }

    /// Direct upstream tasks of `id` (empty for unknown IDs).
    pub fn upstream_of(&self, id: &str) -> &[String] {
        self.node(id).map(|n| n.upstream.as_slice()).unwrap_or(&[])
    }

    /// Direct downstream tasks of `id`, in insertion order.
    pub fn downstream_of(&self, id: &str) -> &[String] {
        self.index
            .get(id)
            .map(|&i| self.downstream[i].as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, upstream: &[&str]) -> TaskNode {
        TaskNode::noop(id, upstream).expect("noop node")
    }

    #[test]
    fn valid_linear_graph_returns_sorted_order() {
        // A → B → C
        let graph = Graph::from_nodes([node("a", &[]), node("b", &["a"]), node("c", &["b"])])
            .expect("should be valid");
        assert_eq!(graph.order(), ["a", "b", "c"]);
    }

    #[test]
    fn valid_diamond_graph() {
        //   A
        //  / \
        // B   C
        //  \ /
        //   D
        let graph = Graph::from_nodes([
            node("a", &[]),
            node("b", &["a"]),
            node("c", &["a"]),
            node("d", &["b", "c"]),
        ])
        .expect("should be valid");

        assert_eq!(graph.order(), ["a", "b", "c", "d"]);
        assert_eq!(graph.downstream_of("a"), ["b", "c"]);
        assert_eq!(graph.upstream_of("d"), ["b", "c"]);
    }

    #[test]
    fn ties_follow_insertion_order_not_names() {
        let graph = Graph::from_nodes([
            node("start", &[]),
            node("zeta", &["start"]),
            node("alpha", &["start"]),
            node("mid", &["start"]),
        ])
        .unwrap();
        assert_eq!(graph.order(), ["start", "zeta", "alpha", "mid"]);
    }

    #[test]
    fn tasks_may_be_added_before_their_upstream() {
        let graph = Graph::from_nodes([node("b", &["a"]), node("a", &[])]).unwrap();
        assert_eq!(graph.order(), ["a", "b"]);
    }

    #[test]
    fn duplicate_task_id_is_rejected() {
        let mut builder = Graph::builder();
        builder.add_node(node("a", &[])).unwrap();
        assert!(matches!(
            builder.add_node(node("a", &[])),
            Err(EngineError::DuplicateNode(id)) if id == "a"
        ));
    }

    #[test]
    fn upstream_referencing_missing_task_is_rejected() {
        let result = Graph::from_nodes([node("a", &[]), node("b", &["ghost"])]);
        assert!(matches!(
            result,
            Err(EngineError::DanglingEdge { task_id, upstream })
                if task_id == "b" && upstream == "ghost"
        ));
    }

    #[test]
    fn cycle_is_detected() {
        // A → B → C → A  (cycle!)
        let result = Graph::from_nodes([
            node("a", &["c"]),
            node("b", &["a"]),
            node("c", &["b"]),
        ]);
        assert!(matches!(
            result,
            Err(EngineError::Cycle { tasks }) if tasks == ["a", "b", "c"]
        ));
    }

    #[test]
    fn self_loop_is_a_cycle() {
        assert!(matches!(
            Graph::from_nodes([node("a", &["a"])]),
            Err(EngineError::Cycle { tasks }) if tasks == ["a"]
        ));
    }

    #[test]
    fn every_back_edge_on_a_chain_is_rejected() {
        // For chains of every length up to 6, adding an edge from any later
        // task back to any earlier one closes a cycle; forward edges never do.
        for len in 1..=6usize {
            let ids: Vec<String> = (0..len).map(|i| format!("t{i}")).collect();
            for from in 0..len {
                for to in 0..len {
                    let nodes = ids.iter().enumerate().map(|(i, id)| {
                        let mut upstream: Vec<&str> = Vec::new();
                        if i > 0 {
                            upstream.push(&ids[i - 1]);
                        }
                        // Edge from → to means `to` lists `from` upstream.
                        if i == to {
                            upstream.push(&ids[from]);
                        }
                        node(id, &upstream)
                    });
                    let result = Graph::from_nodes(nodes.collect::<Vec<_>>());
                    if from >= to {
                        assert!(
                            matches!(result, Err(EngineError::Cycle { .. })),
                            "edge t{from} -> t{to} on chain of {len} should be rejected"
                        );
                    } else {
                        assert!(result.is_ok(), "edge t{from} -> t{to} is forward");
                    }
                }
            }
        }
    }

    #[test]
    fn single_node_no_edges_is_valid() {
        let graph = Graph::from_nodes([node("solo", &[])]).expect("single node should be valid");
        assert_eq!(graph.order(), ["solo"]);
        assert!(graph.downstream_of("solo").is_empty());
        assert!(graph.upstream_of("missing").is_empty());
    }
}
