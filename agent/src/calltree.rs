//! Call tree aggregation
//!
//! Merges resolved stacks into a prefix tree rooted at a synthetic `"root"`
//! node. Every node's value equals the sum of the sample weights whose paths
//! pass through it, so a parent's value is never less than the sum of its
//! children. Children keep first-insertion order.

use crate::collector::symbols::SymbolCache;
use flareprof_shared::types::events::RawSample;
use indexmap::IndexMap;
use thiserror::Error;

pub type NodeId = usize;

/// Id of the root node
pub const ROOT: NodeId = 0;

pub const ROOT_NAME: &str = "root";

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("weight overflow in frame {0:?}")]
    Overflow(String),

    #[error("frame {name:?} holds {value} but its children sum to {children}")]
    Conservation {
        name: String,
        value: u64,
        children: u128,
    },
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    value: u64,
    children: IndexMap<String, NodeId>,
}

impl Node {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: 0,
            children: IndexMap::new(),
        }
    }
}

/// Arena-backed aggregated call tree
#[derive(Debug, Clone)]
pub struct CallTree {
    nodes: Vec<Node>,
}

impl CallTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(ROOT_NAME)],
        }
    }

    /// Aggregate samples in order, resolving each address through `symbols`.
    ///
    /// Addresses that resolve to several inlined frames contribute all of
    /// them, outermost first.
    pub fn build(samples: &[RawSample], symbols: &SymbolCache) -> Result<Self, TreeError> {
        let mut tree = Self::new();
        for sample in samples {
            let resolved = symbols.resolve_stack(sample.addresses());
            let path = resolved
                .iter()
                .rev()
                .flat_map(|frames| frames.iter().rev())
                .map(|frame| frame.name.as_str());
            tree.insert(path, sample.weight())?;
        }
        Ok(tree)
    }

    /// Add `weight` along a root-first path of frame names
    pub fn insert<'a, I>(&mut self, path: I, weight: u64) -> Result<(), TreeError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.add_weight(ROOT, weight)?;

        let mut current = ROOT;
        for name in path {
            let child = self.child_or_insert(current, name);
            self.add_weight(child, weight)?;
            current = child;
        }
        Ok(())
    }

    fn child_or_insert(&mut self, parent: NodeId, name: &str) -> NodeId {
        if let Some(&id) = self.nodes[parent].children.get(name) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(Node::new(name));
        self.nodes[parent].children.insert(name.to_string(), id);
        id
    }

    fn add_weight(&mut self, id: NodeId, weight: u64) -> Result<(), TreeError> {
        let node = &mut self.nodes[id];
        node.value = node
            .value
            .checked_add(weight)
            .ok_or_else(|| TreeError::Overflow(node.name.clone()))?;
        Ok(())
    }

    pub fn root(&self) -> NodeRef<'_> {
        NodeRef {
            tree: self,
            id: ROOT,
        }
    }

    /// Sum of every aggregated weight
    pub fn total(&self) -> u64 {
        self.nodes[ROOT].value
    }

    /// Number of nodes, the root included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// True when no frame was ever inserted
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Longest root-to-leaf path, not counting the root
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(ROOT, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            stack.extend(self.nodes[id].children.values().map(|&c| (c, depth + 1)));
        }
        max_depth
    }

    /// Find the node reached by following frame names from the root.
    /// An empty path is the root itself.
    pub fn find(&self, path: &[&str]) -> Option<NodeRef<'_>> {
        let mut current = self.root();
        for name in path {
            current = current.child(name)?;
        }
        Some(current)
    }

    /// Check the conservation law on every node
    pub fn validate(&self) -> Result<(), TreeError> {
        for node in &self.nodes {
            let children: u128 = node
                .children
                .values()
                .map(|&c| self.nodes[c].value as u128)
                .sum();
            if children > node.value as u128 {
                return Err(TreeError::Conservation {
                    name: node.name.clone(),
                    value: node.value,
                    children,
                });
            }
        }
        Ok(())
    }
}

impl Default for CallTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrowed view of one node
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    tree: &'a CallTree,
    id: NodeId,
}

impl<'a> NodeRef<'a> {
    fn node(&self) -> &'a Node {
        &self.tree.nodes[self.id]
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &'a str {
        &self.node().name
    }

    pub fn value(&self) -> u64 {
        self.node().value
    }

    /// Weight of samples that ended exactly at this node
    pub fn self_value(&self) -> u64 {
        let children: u64 = self.children().map(|c| c.value()).sum();
        self.value().saturating_sub(children)
    }

    pub fn is_leaf(&self) -> bool {
        self.node().children.is_empty()
    }

    /// Children in first-insertion order
    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let tree = self.tree;
        self.node()
            .children
            .values()
            .map(move |&id| NodeRef { tree, id })
    }

    pub fn child(&self, name: &str) -> Option<NodeRef<'a>> {
        self.node().children.get(name).map(|&id| NodeRef {
            tree: self.tree,
            id,
        })
    }
}

impl std::fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRef")
            .field("name", &self.name())
            .field("value", &self.value())
            .finish()
    }
}
