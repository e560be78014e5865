//! Line-oriented text format for trees and forest directories.
//!
//! One line per node, in pre-order (a split, then its whole left subtree,
//! then its right subtree):
//!
//! ```text
//! S <id> <o1.dx> <o1.dy> <o2.dx> <o2.dy> <threshold>
//! L <id> <p_0> <p_1> ... <p_{label_count-1}>
//! ```
//!
//! Ids count up from 1 in write order. Leaf probabilities are dense and
//! indexed by label id. Floats are written in their shortest round-trip form,
//! so reading a file back reproduces every threshold and probability exactly.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, instrument};

use crate::candidate::SplitCandidate;
use crate::distribution::LabelDistribution;
use crate::error::RfError;
use crate::forest::Forest;
use crate::label::Label;
use crate::node::Node;
use crate::sample::Offset;
use crate::tree::Tree;

/// File name of tree `index` inside a forest directory.
#[must_use]
pub fn tree_file_name(index: usize) -> String {
    format!("{index}.tree")
}

/// Render `tree` in the text format with `label_count` values per leaf.
///
/// # Errors
///
/// Returns [`RfError::LabelOutOfRange`] if a leaf holds a label id
/// `>= label_count`.
pub fn tree_to_text(tree: &Tree, label_count: usize) -> Result<String, RfError> {
    let mut text = String::new();
    let mut stack = vec![tree.root()];
    let mut id = 1usize;
    while let Some(node) = stack.pop() {
        match node {
            Node::Split {
                candidate,
                left,
                right,
            } => {
                let SplitCandidate {
                    offset1: o1,
                    offset2: o2,
                    threshold,
                } = candidate;
                text.push_str(&format!(
                    "S {id} {} {} {} {} {threshold}\n",
                    o1.dx, o1.dy, o2.dx, o2.dy
                ));
                stack.push(right.as_ref());
                stack.push(left.as_ref());
            }
            Node::Leaf { distribution } => {
                text.push_str(&format!("L {id}"));
                for p in distribution.to_dense(label_count)? {
                    text.push_str(&format!(" {p}"));
                }
                text.push('\n');
            }
        }
        id += 1;
    }
    Ok(text)
}

/// A split whose children are still being read.
struct PendingSplit {
    candidate: SplitCandidate,
    left: Option<Node>,
}

struct LineParser<'a> {
    path: &'a Path,
    line: usize,
}

impl LineParser<'_> {
    fn malformed(&self, reason: impl Into<String>) -> RfError {
        RfError::MalformedTree {
            path: self.path.to_path_buf(),
            line: self.line,
            reason: reason.into(),
        }
    }

    fn field<T: std::str::FromStr>(&self, name: &str, raw: Option<&str>) -> Result<T, RfError> {
        let raw = raw.ok_or_else(|| self.malformed(format!("missing {name}")))?;
        raw.parse()
            .map_err(|_| self.malformed(format!("cannot parse {name} from {raw:?}")))
    }

    fn split(&self, fields: &[&str]) -> Result<SplitCandidate, RfError> {
        if fields.len() != 5 {
            return Err(self.malformed(format!(
                "split needs 5 values after the id, found {}",
                fields.len()
            )));
        }
        let at = |i: usize| fields.get(i).copied();
        let offset1 = Offset::new(self.field("o1.dx", at(0))?, self.field("o1.dy", at(1))?);
        let offset2 = Offset::new(self.field("o2.dx", at(2))?, self.field("o2.dy", at(3))?);
        let threshold: f64 = self.field("threshold", at(4))?;
        if !threshold.is_finite() {
            return Err(self.malformed("threshold is not finite"));
        }
        Ok(SplitCandidate::new(offset1, offset2, threshold))
    }

    fn leaf(&self, fields: &[&str], label_count: usize) -> Result<LabelDistribution, RfError> {
        if fields.len() != label_count {
            return Err(RfError::LabelCountMismatch {
                path: self.path.to_path_buf(),
                line: self.line,
                expected: label_count,
                found: fields.len(),
            });
        }
        let mut entries = Vec::with_capacity(label_count);
        for (id, raw) in fields.iter().enumerate() {
            let p: f64 = self.field("probability", Some(raw))?;
            if !(p.is_finite() && p >= 0.0) {
                return Err(self.malformed(format!("invalid probability {raw}")));
            }
            entries.push((Label::new(id as u32), p));
        }
        LabelDistribution::from_probabilities(entries)
            .ok_or_else(|| self.malformed("leaf has no positive probability"))
    }
}

/// Parse a tree from the text format.
///
/// `path` is only used in error messages.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`RfError::MalformedTree`] | unknown tag, bad field, duplicate id, truncated input, or nodes after the root is complete |
/// | [`RfError::LabelCountMismatch`] | a leaf does not carry exactly `label_count` values |
pub fn tree_from_text(text: &str, label_count: usize, path: &Path) -> Result<Tree, RfError> {
    let mut stack: Vec<PendingSplit> = Vec::new();
    let mut root: Option<Node> = None;
    let mut seen_ids = HashSet::new();
    let mut parser = LineParser { path, line: 0 };

    for (index, line) in text.lines().enumerate() {
        parser.line = index + 1;
        let mut fields = line.split_whitespace();
        let Some(tag) = fields.next() else {
            continue;
        };
        if root.is_some() {
            return Err(parser.malformed("node after the tree is complete"));
        }
        let id: usize = parser.field("id", fields.next())?;
        if !seen_ids.insert(id) {
            return Err(parser.malformed(format!("duplicate node id {id}")));
        }
        let rest: Vec<&str> = fields.collect();

        let mut node = match tag {
            "S" => {
                stack.push(PendingSplit {
                    candidate: parser.split(&rest)?,
                    left: None,
                });
                continue;
            }
            "L" => Node::leaf(parser.leaf(&rest, label_count)?),
            other => return Err(parser.malformed(format!("unknown node tag {other:?}"))),
        };

        // Attach the finished node, closing every split it completes.
        loop {
            match stack.pop() {
                None => {
                    root = Some(node);
                    break;
                }
                Some(PendingSplit {
                    candidate,
                    left: None,
                }) => {
                    stack.push(PendingSplit {
                        candidate,
                        left: Some(node),
                    });
                    break;
                }
                Some(PendingSplit {
                    candidate,
                    left: Some(left),
                }) => node = Node::split(candidate, left, node),
            }
        }
    }

    root.map(Tree::new).ok_or_else(|| RfError::MalformedTree {
        path: path.to_path_buf(),
        line: parser.line,
        reason: format!("truncated: {} split(s) still open", stack.len()),
    })
}

impl Tree {
    /// Write the tree to `path` in the text format.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::LabelOutOfRange`] | a leaf label id is `>= label_count` |
    /// | [`RfError::WriteTree`] | the file cannot be written |
    pub fn write_file(&self, path: impl AsRef<Path>, label_count: usize) -> Result<(), RfError> {
        let path = path.as_ref();
        let text = tree_to_text(self, label_count)?;
        std::fs::write(path, text).map_err(|e| RfError::WriteTree {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Read a tree written by [`Tree::write_file`].
    ///
    /// # Errors
    ///
    /// Returns [`RfError::ReadTree`] when the file cannot be read, otherwise
    /// any error from [`tree_from_text`].
    pub fn read_file(path: impl AsRef<Path>, label_count: usize) -> Result<Self, RfError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| RfError::ReadTree {
            path: path.to_path_buf(),
            source: e,
        })?;
        tree_from_text(&text, label_count, path)
    }
}

impl Forest {
    /// Write every tree to `dir` as `<index>.tree`, creating `dir` if needed.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::WriteTree`] | the directory or a file cannot be written |
    /// | [`RfError::LabelOutOfRange`] | a leaf label id is `>= label_count` |
    #[instrument(skip_all, fields(dir = %dir.as_ref().display(), n_trees = self.n_trees()))]
    pub fn write_dir(&self, dir: impl AsRef<Path>) -> Result<(), RfError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| RfError::WriteTree {
            path: dir.to_path_buf(),
            source: e,
        })?;
        self.trees
            .par_iter()
            .enumerate()
            .try_for_each(|(i, tree)| tree.write_file(dir.join(tree_file_name(i)), self.label_count))?;
        info!(label_count = self.label_count, "forest written");
        Ok(())
    }

    /// Load `number_of_trees` trees from `dir`, expecting `label_count`
    /// values per leaf. Any missing or malformed file fails the whole load.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::InvalidTreeCount`] | `number_of_trees` is zero |
    /// | [`RfError::ReadTree`] | a tree file cannot be read |
    /// | [`RfError::MalformedTree`] / [`RfError::LabelCountMismatch`] | a tree file does not parse |
    #[instrument(skip(dir), fields(dir = %dir.as_ref().display()))]
    pub fn load_dir(
        number_of_trees: usize,
        label_count: usize,
        dir: impl AsRef<Path>,
    ) -> Result<Self, RfError> {
        if number_of_trees == 0 {
            return Err(RfError::InvalidTreeCount { number_of_trees });
        }
        let dir = dir.as_ref();
        let trees = (0..number_of_trees)
            .into_par_iter()
            .map(|i| {
                let path: PathBuf = dir.join(tree_file_name(i));
                let tree = Tree::read_file(&path, label_count)?;
                debug!(path = %path.display(), n_nodes = tree.n_nodes(), "tree loaded");
                Ok(tree)
            })
            .collect::<Result<Vec<_>, RfError>>()?;
        info!(n_trees = trees.len(), "forest loaded");
        Ok(Self::from_trees(trees, label_count))
    }
}
