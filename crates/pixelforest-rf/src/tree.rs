use crate::distribution::LabelDistribution;
use crate::node::Node;
use crate::sample::Sample;

/// A trained decision tree.
///
/// Built by [`TreeBuilder`](crate::TreeBuilder) or read back from disk; a
/// tree is never modified after construction.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Tree {
    root: Node,
}

impl Tree {
    /// Wrap a root node.
    #[must_use]
    pub fn new(root: Node) -> Self {
        Self { root }
    }

    /// The root node.
    #[must_use]
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Return the distribution of the leaf `sample` falls into.
    #[must_use]
    pub fn classify<S: Sample + ?Sized>(&self, sample: &S) -> &LabelDistribution {
        self.root.descend(sample)
    }

    /// Return the total number of nodes in the tree (both splits and leaves).
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        let mut n = 0;
        self.root.walk(|_, _| n += 1);
        n
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        let mut n = 0;
        self.root.walk(|node, _| n += usize::from(node.is_leaf()));
        n
    }

    /// Return the maximum depth of the tree. A single leaf has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        self.root.walk(|_, d| deepest = deepest.max(d));
        deepest
    }
}
