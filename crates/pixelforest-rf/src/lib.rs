//! Randomized decision forests over depth-image pixels.
//!
//! Each tree node tests a depth-normalized difference between two probe
//! offsets around a pixel; leaves hold label probability distributions that
//! the forest averages. Training draws candidates at random, keeps the one
//! with the highest information gain, and can spread that search over rayon
//! threads or over several processes linked by a coordinator. Trained trees
//! persist to a plain-text directory format or to a single bincode snapshot.

mod builder;
mod candidate;
mod config;
mod confusion;
mod coordinator;
mod distribution;
mod error;
mod eval;
mod forest;
mod frame;
mod label;
mod link;
mod node;
mod persist;
mod sample;
mod search;
mod serialize;
mod tree;

pub use builder::{TreeBuilder, partition};
pub use candidate::{
    CandidateSampler, MIN_NORMALIZATION_DEPTH, ScoredCandidate, Side, SplitCandidate, Spread,
    normalization_depth,
};
pub use config::TrainConfig;
pub use confusion::{ConfusionMatrix, LabelMetrics};
pub use coordinator::{COORDINATOR_RANK, Coordinator, Worker};
pub use distribution::{LabelCounts, LabelDistribution};
pub use error::RfError;
pub use eval::{Classifier, Evaluation, EvaluationReport, evaluate};
pub use forest::Forest;
pub use frame::{DepthFrame, FrameSet, OUT_OF_RANGE_DEPTH, PixelRef, scene, synthetic_scene};
pub use label::{Label, LabelTable};
pub use link::{ChannelLink, Link, StreamLink, ToCoordinator, ToWorker, channel_pair};
pub use node::Node;
pub use persist::{tree_file_name, tree_from_text, tree_to_text};
pub use sample::{InMemorySet, Offset, Sample, SampleCursor, TrainSet};
pub use search::{SplitSearch, reduce_best, sequential_best, split_budget};
pub use tree::Tree;
