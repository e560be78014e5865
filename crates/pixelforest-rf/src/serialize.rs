//! Single-file binary snapshots of a trained forest via bincode.
//!
//! The tree directory written by [`Forest::write_dir`] is the interchange
//! format; snapshots are a compact alternative that also keeps the label
//! count alongside the trees.

use std::path::Path;

use tracing::{debug, info, instrument};

use crate::error::RfError;
use crate::forest::Forest;

/// Current snapshot format version.
const FORMAT_VERSION: u32 = 1;

/// Versioned envelope around a forest; `F` is `&Forest` when writing and
/// `Forest` when reading.
#[derive(serde::Serialize, serde::Deserialize)]
struct ModelEnvelope<F> {
    format_version: u32,
    n_trees: usize,
    label_count: usize,
    forest: F,
}

impl Forest {
    /// Save the forest to a single binary file.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::SerializeModel`] | bincode encoding failed |
    /// | [`RfError::WriteModel`] | file write failed |
    #[instrument(skip(self), fields(path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RfError> {
        let path = path.as_ref();
        let envelope = ModelEnvelope {
            format_version: FORMAT_VERSION,
            n_trees: self.n_trees(),
            label_count: self.label_count,
            forest: self,
        };
        let bytes =
            bincode::serialize(&envelope).map_err(|e| RfError::SerializeModel { source: e })?;
        std::fs::write(path, &bytes).map_err(|e| RfError::WriteModel {
            path: path.to_path_buf(),
            source: e,
        })?;
        info!(size_bytes = bytes.len(), n_trees = self.n_trees(), "forest saved");
        Ok(())
    }

    /// Load a forest written by [`Forest::save`].
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::ReadModel`] | file read failed |
    /// | [`RfError::DeserializeModel`] | bincode decoding failed |
    /// | [`RfError::IncompatibleModelVersion`] | format version mismatch |
    #[instrument(fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RfError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| RfError::ReadModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        // The version leads the envelope, so it can be checked before the
        // rest of the payload is trusted.
        let format_version: u32 =
            bincode::deserialize(&bytes).map_err(|e| RfError::DeserializeModel {
                path: path.to_path_buf(),
                source: e,
            })?;
        if format_version != FORMAT_VERSION {
            return Err(RfError::IncompatibleModelVersion {
                expected: FORMAT_VERSION,
                found: format_version,
                path: path.to_path_buf(),
            });
        }

        let envelope: ModelEnvelope<Forest> =
            bincode::deserialize(&bytes).map_err(|e| RfError::DeserializeModel {
                path: path.to_path_buf(),
                source: e,
            })?;
        debug!(
            n_trees = envelope.n_trees,
            label_count = envelope.label_count,
            "forest loaded"
        );
        Ok(envelope.forest)
    }
}
