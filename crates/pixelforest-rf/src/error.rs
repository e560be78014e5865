use std::path::PathBuf;

/// Errors from forest training, persistence, and distributed coordination.
#[derive(Debug, thiserror::Error)]
pub enum RfError {
    /// Returned when number_of_trees is zero.
    #[error("number_of_trees must be at least 1, got {number_of_trees}")]
    InvalidTreeCount {
        /// The invalid number_of_trees value provided.
        number_of_trees: usize,
    },

    /// Returned when candidates_per_node is zero.
    #[error("candidates_per_node must be at least 1, got {candidates}")]
    InvalidCandidateCount {
        /// The invalid candidate budget provided.
        candidates: usize,
    },

    /// Returned when search_threads is zero.
    #[error("search_threads must be at least 1, got {threads}")]
    InvalidThreadCount {
        /// The invalid thread count provided.
        threads: usize,
    },

    /// Returned when min_samples_per_node is zero.
    #[error("min_samples_per_node must be at least 1, got {min_samples}")]
    InvalidMinSamples {
        /// The invalid minimum provided.
        min_samples: usize,
    },

    /// Returned when the offset range is empty (min > max).
    #[error("offset range is empty: [{min}, {max}]")]
    InvalidOffsetRange {
        /// Inclusive lower bound.
        min: i32,
        /// Inclusive upper bound.
        max: i32,
    },

    /// Returned when the threshold range is empty or not finite.
    #[error("threshold range must be finite with min <= max, got [{min}, {max}]")]
    InvalidThresholdRange {
        /// Inclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
    },

    /// Returned when a train or test set yields zero samples.
    #[error("dataset yielded zero samples")]
    EmptyDataset,

    /// Returned when a distribution or entropy is requested for an empty sample set.
    #[error("cannot compute a label distribution or entropy over an empty sample set")]
    EmptySampleSet,

    /// Returned when a label id does not fit the configured label count.
    #[error("label {label} is outside the configured label count {label_count}")]
    LabelOutOfRange {
        /// The offending label id.
        label: u32,
        /// The configured number of labels.
        label_count: usize,
    },

    /// Returned when a label table has no dense id left for a new name.
    #[error("label table is full: {registered} labels already registered")]
    TooManyLabels {
        /// Number of labels already in the table.
        registered: usize,
    },

    /// Returned when a frame's buffers do not match its dimensions.
    #[error("frame of {width}x{height} does not match {depth_len} depths and {label_len} labels")]
    FrameShapeMismatch {
        /// Frame width in pixels.
        width: usize,
        /// Frame height in pixels.
        height: usize,
        /// Length of the depth buffer.
        depth_len: usize,
        /// Length of the label buffer.
        label_len: usize,
    },

    /// Returned when a tree file cannot be opened or read.
    #[error("failed to read tree from {path}")]
    ReadTree {
        /// Path to the tree file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a tree file cannot be created or written.
    #[error("failed to write tree to {path}")]
    WriteTree {
        /// Path to the tree file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a tree file does not follow the node line format.
    #[error("malformed tree {path} at line {line}: {reason}")]
    MalformedTree {
        /// Path to the tree file (or `<memory>` for in-memory parses).
        path: PathBuf,
        /// One-based line number of the offending line.
        line: usize,
        /// Human-readable description of the problem.
        reason: String,
    },

    /// Returned when a leaf carries a different number of probabilities than configured.
    #[error("tree {path} line {line}: leaf has {found} probabilities, expected {expected}")]
    LabelCountMismatch {
        /// Path to the tree file.
        path: PathBuf,
        /// One-based line number of the leaf.
        line: usize,
        /// The configured label count.
        expected: usize,
        /// The number of probabilities found.
        found: usize,
    },

    /// Returned when model serialization fails.
    #[error("failed to serialize model")]
    SerializeModel {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when model deserialization fails.
    #[error("failed to deserialize model from {path}")]
    DeserializeModel {
        /// Path to the model file that could not be deserialized.
        path: PathBuf,
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when writing the model file fails.
    #[error("failed to write model to {path}")]
    WriteModel {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading the model file fails.
    #[error("failed to read model from {path}")]
    ReadModel {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when loading a model with an incompatible format version.
    #[error("incompatible model version in {path}: expected {expected}, found {found}")]
    IncompatibleModelVersion {
        /// The model format version this build expects.
        expected: u32,
        /// The model format version found in the file.
        found: u32,
        /// Path to the model file with the incompatible version.
        path: PathBuf,
    },

    /// Returned when the peer of a coordination link has gone away.
    #[error("link to participant {rank} closed")]
    LinkClosed {
        /// Rank of the unreachable participant.
        rank: usize,
    },

    /// Returned when a stream link fails to encode or decode a message.
    #[error("link to participant {rank} failed")]
    LinkIo {
        /// Rank of the peer.
        rank: usize,
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when a participant receives a message out of protocol order.
    #[error("participant {rank} violated the split protocol: {reason}")]
    ProtocolViolation {
        /// Rank of the participant that detected the violation.
        rank: usize,
        /// What was expected and what arrived.
        reason: String,
    },

    /// Returned when a worker's replica batch differs from the coordinator's.
    #[error("worker {rank} drew {found} samples, coordinator drew {expected}")]
    ReplicaMismatch {
        /// Rank of the mismatching worker.
        rank: usize,
        /// Batch size on the coordinator.
        expected: usize,
        /// Batch size reported by the worker.
        found: usize,
    },
}
