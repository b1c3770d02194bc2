use std::fmt::{Debug, Display};

use anyhow::bail;
use approx::relative_eq;

use crate::Result;
use NodeIdx::{Internal as Int, Leaf};

pub(crate) mod tree_parser;
pub use tree_parser::from_newick;

#[derive(Debug, PartialEq, Clone, Copy, PartialOrd, Eq, Ord, Hash)]
pub enum NodeIdx {
    Internal(usize),
    Leaf(usize),
}

impl From<NodeIdx> for usize {
    fn from(node_idx: NodeIdx) -> usize {
        match node_idx {
            Int(idx) => idx,
            Leaf(idx) => idx,
        }
    }
}

impl Display for NodeIdx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Int(idx) => write!(f, "internal node {}", idx),
            Leaf(idx) => write!(f, "leaf node {}", idx),
        }
    }
}

/// A node of a genealogy. Heights are measured backwards in time from the
/// most recent sample at time zero.
///
/// A reassortment vertex is an internal node with a single child; it is
/// listed as a child of two distinct parents, of which `parent` records the
/// first one attached.
#[derive(Clone)]
pub struct Node {
    pub idx: NodeIdx,
    pub parent: Option<NodeIdx>,
    pub children: Vec<NodeIdx>,
    pub height: f64,
    pub id: String,
}

impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.id.is_empty() {
            write!(f, "{}", self.idx)
        } else {
            write!(f, "{} with id {}", self.idx, self.id)
        }
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.id.is_empty() {
            writeln!(
                f,
                "{:?} at height {}, parent: {:?}, children: {:?}",
                self.idx, self.height, self.parent, self.children,
            )
        } else {
            writeln!(
                f,
                "({}) {:?} at height {}, parent: {:?}, children: {:?}",
                self.id, self.idx, self.height, self.parent, self.children,
            )
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        (self.idx == other.idx)
            && (self.parent == other.parent)
            && (self.children.iter().min() == other.children.iter().min())
            && (self.children.iter().max() == other.children.iter().max())
            && relative_eq!(self.height, other.height)
    }
}

impl Node {
    pub(crate) fn new_leaf(idx: usize, parent: Option<NodeIdx>, height: f64, id: String) -> Self {
        Self {
            idx: Leaf(idx),
            parent,
            children: Vec::new(),
            height,
            id,
        }
    }

    pub(crate) fn new_internal(
        idx: usize,
        parent: Option<NodeIdx>,
        children: Vec<NodeIdx>,
        height: f64,
        id: String,
    ) -> Self {
        Self {
            idx: Int(idx),
            parent,
            children,
            height,
            id,
        }
    }
}

/// Read-only queries over a genealogy, consumed by the interval engine.
///
/// The generation counter stands in for change notification: every mutation
/// of the underlying genealogy bumps it, and cached quantities compare their
/// last-seen value against it instead of registering listeners.
pub trait GenealogyView {
    fn node_count(&self) -> usize;
    fn tip_count(&self) -> usize;
    fn height(&self, idx: NodeIdx) -> f64;
    fn children(&self, idx: NodeIdx) -> &[NodeIdx];
    fn root(&self) -> NodeIdx;
    fn generation(&self) -> u64;

    fn child_count(&self, idx: NodeIdx) -> usize {
        self.children(idx).len()
    }

    fn is_recombination_node(&self, idx: NodeIdx) -> bool {
        matches!(idx, Int(_)) && self.child_count(idx) == 1
    }
}

/// A mutable genealogy: a time-ordered tree, possibly with reassortment
/// vertices (an ancestral recombination graph).
///
/// Nodes live in a single flat vector indexed by [`NodeIdx`]. The struct
/// carries its own store/restore transaction so a rejected MCMC proposal can
/// roll topology and heights back exactly.
#[derive(Debug, Clone)]
pub struct Genealogy {
    pub root: NodeIdx,
    pub nodes: Vec<Node>,
    n: usize,
    complete: bool,
    generation: u64,
    stored_nodes: Vec<Node>,
    stored_root: NodeIdx,
    stored_generation: u64,
}

impl GenealogyView for Genealogy {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn tip_count(&self) -> usize {
        self.n
    }

    fn height(&self, idx: NodeIdx) -> f64 {
        self.nodes[usize::from(idx)].height
    }

    fn children(&self, idx: NodeIdx) -> &[NodeIdx] {
        &self.nodes[usize::from(idx)].children
    }

    fn root(&self) -> NodeIdx {
        self.root
    }

    fn generation(&self) -> u64 {
        self.generation
    }
}

impl Genealogy {
    /// Creates an incomplete genealogy holding only the sampled tips, all at
    /// height zero. Internal structure is added with [`Self::add_internal`]
    /// and [`Self::add_reassortment`], closed off by [`Self::finish`].
    pub fn new(tip_ids: &[&str]) -> Self {
        Self {
            root: Int(0),
            nodes: tip_ids
                .iter()
                .enumerate()
                .map(|(i, id)| Node::new_leaf(i, None, 0.0, id.to_string()))
                .collect(),
            n: tip_ids.len(),
            complete: false,
            generation: 0,
            stored_nodes: Vec::new(),
            stored_root: Int(0),
            stored_generation: 0,
        }
    }

    pub(crate) fn new_empty() -> Self {
        Self {
            root: Int(0),
            nodes: Vec::new(),
            n: 0,
            complete: false,
            generation: 0,
            stored_nodes: Vec::new(),
            stored_root: Int(0),
            stored_generation: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn root_height(&self) -> f64 {
        self.height(self.root)
    }

    pub fn node(&self, idx: NodeIdx) -> &Node {
        &self.nodes[usize::from(idx)]
    }

    pub fn node_id(&self, idx: NodeIdx) -> &str {
        &self.nodes[usize::from(idx)].id
    }

    pub fn get_idx_by_id(&self, id: &str) -> Result<NodeIdx> {
        match self.nodes.iter().find(|node| node.id == id) {
            Some(node) => Ok(node.idx),
            None => bail!("No node with id {} found in the genealogy.", id),
        }
    }

    pub fn reassortment_node_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| self.is_recombination_node(node.idx))
            .count()
    }

    /// Adds an internal node at the given height with the given children.
    /// A child that already has a parent must be a reassortment vertex, in
    /// which case this node becomes its second parent.
    pub fn add_internal(&mut self, height: f64, children: Vec<NodeIdx>) -> Result<NodeIdx> {
        if children.is_empty() {
            bail!("An internal node must have at least one child.");
        }
        let idx = self.nodes.len();
        for &child in &children {
            let child_node = &self.nodes[usize::from(child)];
            if child_node.height > height {
                bail!(
                    "Cannot attach {} at height {} below its child at height {}.",
                    Int(idx),
                    height,
                    child_node.height
                );
            }
            if child_node.parent.is_some() && child_node.children.len() != 1 {
                bail!("{} already has a parent.", child);
            }
        }
        self.nodes.push(Node::new_internal(
            idx,
            None,
            children.clone(),
            height,
            "".to_string(),
        ));
        for child in children {
            let child_node = &mut self.nodes[usize::from(child)];
            if child_node.parent.is_none() {
                child_node.parent = Some(Int(idx));
            }
        }
        self.generation += 1;
        Ok(Int(idx))
    }

    /// Splices a reassortment vertex above `child`: a single-child node whose
    /// two parents are attached later with [`Self::add_internal`].
    pub fn add_reassortment(&mut self, child: NodeIdx, height: f64) -> Result<NodeIdx> {
        self.add_internal(height, vec![child])
    }

    /// Marks construction finished: locates the unique parentless node as the
    /// root and validates heights along every edge.
    pub fn finish(&mut self) -> Result<()> {
        let roots: Vec<NodeIdx> = self
            .nodes
            .iter()
            .filter(|node| node.parent.is_none())
            .map(|node| node.idx)
            .collect();
        if roots.len() != 1 {
            bail!(
                "A genealogy must have exactly one root, found {}.",
                roots.len()
            );
        }
        self.root = roots[0];
        self.n = self
            .nodes
            .iter()
            .filter(|node| matches!(node.idx, Leaf(_)))
            .count();
        if self.n == 0 {
            bail!("A genealogy must have at least one sampled tip.");
        }
        self.complete = true;
        Ok(())
    }

    /// Sets the height of a node, invalidating downstream caches via the
    /// generation counter.
    pub fn set_node_height(&mut self, idx: NodeIdx, height: f64) -> Result<()> {
        if !height.is_finite() || height < 0.0 {
            bail!("Node heights must be finite and non-negative, got {}.", height);
        }
        self.nodes[usize::from(idx)].height = height;
        self.generation += 1;
        Ok(())
    }

    /// Checkpoints the full node state for rollback.
    pub fn store_state(&mut self) {
        self.stored_nodes.clone_from(&self.nodes);
        self.stored_root = self.root;
        self.stored_generation = self.generation;
    }

    /// Rolls back to the last checkpoint, generation counter included, so a
    /// rejected proposal leaves no trace.
    pub fn restore_state(&mut self) {
        std::mem::swap(&mut self.nodes, &mut self.stored_nodes);
        self.root = self.stored_root;
        self.generation = self.stored_generation;
    }

    /// Serialises the genealogy to a newick string with branch lengths
    /// recomputed from node heights. Refuses graphs with reassortment
    /// vertices, which newick cannot express.
    pub fn to_newick(&self) -> Result<String> {
        if self.reassortment_node_count() > 0 {
            bail!("Cannot write a genealogy with reassortment vertices as newick.");
        }
        let mut newick = String::new();
        self.write_node(self.root, self.root_height(), &mut newick);
        newick.push(';');
        Ok(newick)
    }

    fn write_node(&self, idx: NodeIdx, parent_height: f64, out: &mut String) {
        let node = self.node(idx);
        if !node.children.is_empty() {
            out.push('(');
            for (i, &child) in node.children.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                self.write_node(child, node.height, out);
            }
            out.push(')');
        }
        out.push_str(&node.id);
        out.push_str(&format!(":{}", parent_height - node.height));
    }
}
