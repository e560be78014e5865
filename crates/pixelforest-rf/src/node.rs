use crate::candidate::{Side, SplitCandidate};
use crate::distribution::LabelDistribution;
use crate::sample::Sample;

/// A node in a decision tree.
///
/// Children are owned boxes so that left and right subtrees can be built
/// independently, each by its own task.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Node {
    /// An interior test node.
    Split {
        /// Routes samples: below the threshold goes left.
        candidate: SplitCandidate,
        /// Subtree for [`Side::Left`].
        left: Box<Node>,
        /// Subtree for [`Side::Right`].
        right: Box<Node>,
    },
    /// A terminal node.
    Leaf {
        /// Label frequencies of the training samples that reached this leaf.
        distribution: LabelDistribution,
    },
}

impl Node {
    /// Create a leaf.
    #[must_use]
    pub fn leaf(distribution: LabelDistribution) -> Self {
        Node::Leaf { distribution }
    }

    /// Create a split over two subtrees.
    #[must_use]
    pub fn split(candidate: SplitCandidate, left: Node, right: Node) -> Self {
        Node::Split {
            candidate,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Return `true` if this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    /// Descend from this node to the leaf that `sample` lands in.
    #[must_use]
    pub fn descend<S: Sample + ?Sized>(&self, sample: &S) -> &LabelDistribution {
        let mut node = self;
        loop {
            match node {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    candidate,
                    left,
                    right,
                } => {
                    node = match candidate.classify(sample) {
                        Side::Left => left.as_ref(),
                        Side::Right => right.as_ref(),
                    };
                }
            }
        }
    }

    /// Visit every node with its depth, pre-order.
    pub(crate) fn walk(&self, mut visit: impl FnMut(&Node, usize)) {
        let mut stack = vec![(self, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            visit(node, depth);
            if let Node::Split { left, right, .. } = node {
                stack.push((right.as_ref(), depth + 1));
                stack.push((left.as_ref(), depth + 1));
            }
        }
    }
}
