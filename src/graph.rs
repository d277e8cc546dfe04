// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 The cg2md authors

//! The conversation node graph and its linearization.
//!
//! A ChatGPT conversation is stored as a DAG: every message node points at
//! its parent and lists its children. Editing an earlier message or
//! regenerating a reply adds a sibling branch instead of replacing anything,
//! so a single conversation can hold several alternate answers to the same
//! prompt.
//!
//! [`NodeGraph`] keeps the nodes in a flat vector (the archive's storage
//! order) with an id-to-index map beside it. Nothing holds references to
//! other nodes; relations are resolved through the index.
//!
//! [`NodeGraph::linearize`] produces the ordered node sequence consumed by
//! the turn assembler. It validates the graph first and reports malformed
//! structure as a [`GraphError`].

use snafu::prelude::*;
use std::collections::HashMap;

/// Structural defects that make a conversation unconvertible.
#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A node names a parent that does not exist in the graph.
    #[snafu(display("node {node} references missing parent {parent}"))]
    DanglingParent {
        /// The node carrying the bad reference.
        node: String,
        /// The parent id that could not be resolved.
        parent: String,
    },

    /// Following parent links from a node loops back on itself.
    #[snafu(display("node {node} is part of a cyclic parent chain"))]
    CyclicParentChain {
        /// The first node found on the cycle.
        node: String,
    },

    /// The graph has nodes but none of them is a root.
    #[snafu(display("conversation has {count} nodes but no root"))]
    MissingRoot {
        /// Number of nodes in the graph.
        count: usize,
    },
}

/// The author of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    /// The person using the assistant (`user` in the export format).
    Human,
    /// The model.
    Assistant,
    /// Platform-injected instructions.
    System,
    /// Output of a tool or plugin call.
    Tool,
    /// Any role name the converter does not know about.
    Unknown(String),
}

impl Role {
    /// Maps an export role name to a [`Role`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "user" | "human" => Self::Human,
            "assistant" => Self::Assistant,
            "system" => Self::System,
            "tool" => Self::Tool,
            other => Self::Unknown(other.to_owned()),
        }
    }
}

/// The content of a message, reduced to what the converter can use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    /// Text fragments in payload order.
    pub fragments: Vec<String>,

    /// Number of non-text parts (images, files) that were dropped.
    pub attachments: usize,

    /// Source language for code payloads.
    pub language: Option<String>,
}

/// A message carried by a node.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Who wrote it.
    pub role: Role,

    /// The payload kind tag (`content_type` in the export format).
    pub kind: String,

    /// The extracted payload.
    pub payload: Payload,

    /// Creation time in Unix seconds, when the export has one.
    pub create_time: Option<f64>,

    /// Model identifier for assistant messages (e.g. "gpt-4o").
    pub model_slug: Option<String>,
}

/// One node of the conversation graph.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageNode {
    /// Unique node id.
    pub id: String,

    /// Parent node id; `None` for a root.
    pub parent: Option<String>,

    /// Child node ids in archive order.
    pub children: Vec<String>,

    /// The message, or `None` for structural nodes such as the root.
    pub message: Option<Message>,
}

impl MessageNode {
    /// Returns the author role, if the node carries a message.
    #[must_use]
    pub fn role(&self) -> Option<&Role> {
        self.message.as_ref().map(|m| &m.role)
    }

    /// Returns `true` if the node carries a message written by the user.
    #[must_use]
    pub fn is_human(&self) -> bool {
        matches!(self.role(), Some(Role::Human))
    }

    /// Returns `true` if the node carries a message written by the model.
    #[must_use]
    pub fn is_assistant(&self) -> bool {
        matches!(self.role(), Some(Role::Assistant))
    }
}

/// A conversation's nodes in storage order, indexed by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeGraph {
    nodes: Vec<MessageNode>,
    index: HashMap<String, usize>,
}

impl NodeGraph {
    /// Builds a graph from nodes in storage order.
    ///
    /// If two nodes share an id, the later one wins the index slot; both stay
    /// in storage order.
    #[must_use]
    pub fn new(nodes: Vec<MessageNode>) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.clone(), i))
            .collect();
        Self { nodes, index }
    }

    /// Number of nodes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the graph has no nodes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in storage order.
    #[must_use]
    pub fn nodes(&self) -> &[MessageNode] {
        &self.nodes
    }

    /// Looks up a node by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&MessageNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Root node ids (nodes without a parent) in storage order.
    #[must_use]
    pub fn roots(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|node| node.parent.is_none())
            .map(|node| node.id.as_str())
            .collect()
    }

    /// Returns every node reachable from a root, in storage order.
    ///
    /// Storage order is creation order in the export, so regenerated answers
    /// to one prompt come out next to each other even though no single
    /// parent-to-child walk visits them in sequence. Nodes of every role are
    /// kept; classification happens later.
    ///
    /// An empty graph yields an empty sequence.
    ///
    /// # Errors
    ///
    /// Returns a [`GraphError`] if a parent reference dangles, a parent chain
    /// is cyclic, or a non-empty graph has no root.
    pub fn linearize(&self) -> Result<Vec<&MessageNode>, GraphError> {
        if self.nodes.is_empty() {
            return Ok(Vec::new());
        }

        let parents = self.resolve_parents()?;
        let roots: Vec<usize> = parents
            .iter()
            .enumerate()
            .filter_map(|(i, parent)| parent.is_none().then_some(i))
            .collect();
        ensure!(
            !roots.is_empty(),
            MissingRootSnafu {
                count: self.nodes.len()
            }
        );
        self.check_acyclic(&parents)?;

        let reachable = self.reachable_from(&roots);
        Ok(self
            .nodes
            .iter()
            .zip(reachable)
            .filter_map(|(node, seen)| seen.then_some(node))
            .collect())
    }

    /// Resolves every parent id to an index.
    fn resolve_parents(&self) -> Result<Vec<Option<usize>>, GraphError> {
        self.nodes
            .iter()
            .map(|node| match &node.parent {
                None => Ok(None),
                Some(parent) => self.index.get(parent).copied().map(Some).context(
                    DanglingParentSnafu {
                        node: &node.id,
                        parent,
                    },
                ),
            })
            .collect()
    }

    /// Walks each parent chain once, marking finished nodes so the total work
    /// stays linear.
    fn check_acyclic(&self, parents: &[Option<usize>]) -> Result<(), GraphError> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Unvisited,
            OnPath,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; parents.len()];
        let mut path = Vec::new();

        for start in 0..parents.len() {
            let mut current = Some(start);
            while let Some(i) = current {
                match marks[i] {
                    Mark::Done => break,
                    Mark::OnPath => {
                        return CyclicParentChainSnafu {
                            node: &self.nodes[i].id,
                        }
                        .fail();
                    }
                    Mark::Unvisited => {
                        marks[i] = Mark::OnPath;
                        path.push(i);
                        current = parents[i];
                    }
                }
            }
            for i in path.drain(..) {
                marks[i] = Mark::Done;
            }
        }

        Ok(())
    }

    /// Marks the nodes reachable through child links from the given roots.
    ///
    /// Child ids that resolve to nothing are ignored.
    fn reachable_from(&self, roots: &[usize]) -> Vec<bool> {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = roots.to_vec();

        while let Some(i) = stack.pop() {
            if std::mem::replace(&mut seen[i], true) {
                continue;
            }
            stack.extend(
                self.nodes[i]
                    .children
                    .iter()
                    .filter_map(|child| self.index.get(child).copied())
                    .filter(|&c| !seen[c]),
            );
        }

        seen
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Builds a node with a single text fragment.
    pub fn node(id: &str, parent: Option<&str>, role: Role, kind: &str, text: &str) -> MessageNode {
        MessageNode {
            id: id.into(),
            parent: parent.map(Into::into),
            children: Vec::new(),
            message: Some(Message {
                role,
                kind: kind.into(),
                payload: Payload {
                    fragments: vec![text.into()],
                    ..Payload::default()
                },
                create_time: None,
                model_slug: None,
            }),
        }
    }

    /// Builds a node without a message.
    pub fn bare(id: &str, parent: Option<&str>) -> MessageNode {
        MessageNode {
            id: id.into(),
            parent: parent.map(Into::into),
            children: Vec::new(),
            message: None,
        }
    }

    /// Builds a graph, filling in child lists from the parent links.
    pub fn graph(mut nodes: Vec<MessageNode>) -> NodeGraph {
        let links: Vec<(String, String)> = nodes
            .iter()
            .filter_map(|n| Some((n.parent.clone()?, n.id.clone())))
            .collect();
        for (parent, child) in links {
            if let Some(p) = nodes.iter_mut().find(|n| n.id == parent) {
                p.children.push(child);
            }
        }
        NodeGraph::new(nodes)
    }

    /// A linear chain: root, then alternating user/assistant messages.
    pub fn chain(texts: &[(Role, &str)]) -> NodeGraph {
        let mut nodes = vec![bare("root", None)];
        let mut parent = "root".to_owned();
        for (i, (role, text)) in texts.iter().enumerate() {
            let id = format!("n{i}");
            nodes.push(node(&id, Some(&parent), role.clone(), "text", text));
            parent = id;
        }
        graph(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    fn ids(nodes: &[&MessageNode]) -> Vec<String> {
        nodes.iter().map(|n| n.id.clone()).collect()
    }

    #[test]
    fn maps_role_names() {
        assert_eq!(Role::from_name("user"), Role::Human);
        assert_eq!(Role::from_name("human"), Role::Human);
        assert_eq!(Role::from_name("assistant"), Role::Assistant);
        assert_eq!(Role::from_name("system"), Role::System);
        assert_eq!(Role::from_name("tool"), Role::Tool);
        assert_eq!(Role::from_name("critic"), Role::Unknown("critic".into()));
    }

    #[test]
    fn empty_graph_linearizes_to_nothing() {
        let graph = NodeGraph::default();
        assert!(graph.linearize().unwrap().is_empty());
        assert!(graph.roots().is_empty());
    }

    #[test]
    fn keeps_storage_order_for_sibling_branches() {
        // u1 has two regenerated answers; the second answer's follow-up
        // comes after both in storage order.
        let graph = graph(vec![
            bare("root", None),
            node("u1", Some("root"), Role::Human, "text", "Hello"),
            node("a1", Some("u1"), Role::Assistant, "text", "Hi!"),
            node("a2", Some("u1"), Role::Assistant, "text", "Hey!"),
            node("u2", Some("a2"), Role::Human, "text", "Next"),
        ]);

        let order = graph.linearize().unwrap();
        assert_eq!(ids(&order), ["root", "u1", "a1", "a2", "u2"]);
    }

    #[test]
    fn retains_system_and_tool_nodes() {
        let graph = graph(vec![
            bare("root", None),
            node("s", Some("root"), Role::System, "text", ""),
            node("u", Some("s"), Role::Human, "text", "Q"),
            node("t", Some("u"), Role::Tool, "text", "tool output"),
        ]);

        assert_eq!(ids(&graph.linearize().unwrap()), ["root", "s", "u", "t"]);
    }

    #[test]
    fn skips_nodes_not_listed_as_children() {
        let mut root = bare("root", None);
        root.children.push("u".into());
        // Claims a parent that never lists it.
        let graph = NodeGraph::new(vec![
            root,
            node("u", Some("root"), Role::Human, "text", "Q"),
            node("orphan", Some("u"), Role::Assistant, "text", "A"),
        ]);

        assert_eq!(ids(&graph.linearize().unwrap()), ["root", "u"]);
    }

    #[test]
    fn ignores_unknown_child_ids() {
        let mut root = bare("root", None);
        root.children = vec!["ghost".into()];
        let graph = NodeGraph::new(vec![root]);

        assert_eq!(ids(&graph.linearize().unwrap()), ["root"]);
    }

    #[test]
    fn reports_dangling_parent() {
        let graph = graph(vec![
            bare("root", None),
            node("u", Some("missing"), Role::Human, "text", "Q"),
        ]);

        assert_eq!(
            graph.linearize().unwrap_err(),
            GraphError::DanglingParent {
                node: "u".into(),
                parent: "missing".into(),
            }
        );
    }

    #[test]
    fn reports_cyclic_parent_chain() {
        let graph = graph(vec![
            bare("root", None),
            node("a", Some("b"), Role::Human, "text", "x"),
            node("b", Some("a"), Role::Assistant, "text", "y"),
        ]);

        assert!(matches!(
            graph.linearize().unwrap_err(),
            GraphError::CyclicParentChain { .. }
        ));
    }

    #[test]
    fn reports_self_parent_as_cycle() {
        let graph = NodeGraph::new(vec![bare("root", None), node("a", Some("a"), Role::Human, "text", "x")]);

        assert_eq!(
            graph.linearize().unwrap_err(),
            GraphError::CyclicParentChain { node: "a".into() }
        );
    }

    #[test]
    fn reports_missing_root() {
        let graph = NodeGraph::new(vec![
            node("a", Some("b"), Role::Human, "text", "x"),
            node("b", Some("a"), Role::Assistant, "text", "y"),
        ]);

        assert_eq!(graph.linearize().unwrap_err(), GraphError::MissingRoot { count: 2 });
    }

    #[test]
    fn reports_missing_root_for_lone_self_parent() {
        let graph = NodeGraph::new(vec![node("a", Some("a"), Role::Human, "text", "x")]);

        assert_eq!(graph.linearize().unwrap_err(), GraphError::MissingRoot { count: 1 });
    }

    #[test]
    fn supports_multiple_roots() {
        let graph = graph(vec![
            bare("r1", None),
            node("u1", Some("r1"), Role::Human, "text", "one"),
            bare("r2", None),
            node("u2", Some("r2"), Role::Human, "text", "two"),
        ]);

        assert_eq!(graph.roots(), ["r1", "r2"]);
        assert_eq!(ids(&graph.linearize().unwrap()), ["r1", "u1", "r2", "u2"]);
    }

    #[test]
    fn looks_up_nodes_by_id() {
        let graph = chain(&[(Role::Human, "Q"), (Role::Assistant, "A")]);

        assert_eq!(graph.len(), 3);
        assert!(graph.get("n1").unwrap().is_assistant());
        assert!(graph.get("n0").unwrap().is_human());
        assert!(graph.get("nope").is_none());
    }

    #[test]
    fn handles_long_chains_without_recursion() {
        let texts: Vec<(Role, &str)> = (0..2_000)
            .map(|i| {
                if i % 2 == 0 {
                    (Role::Human, "q")
                } else {
                    (Role::Assistant, "a")
                }
            })
            .collect();
        let graph = chain(&texts);

        assert_eq!(graph.linearize().unwrap().len(), 2_001);
    }
}
