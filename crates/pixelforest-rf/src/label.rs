use std::collections::HashMap;
use std::fmt;

use crate::error::RfError;

/// A class label attached to a sample.
///
/// Labels are only compared and counted. The derived ordering exists so that
/// distributions iterate in a fixed order; it carries no meaning otherwise.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct Label(u32);

impl Label {
    /// The label of unlabeled pixels.
    pub const BACKGROUND: Label = Label(0);

    /// Create a label from its dense id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Return the dense label id.
    #[must_use]
    pub fn id(self) -> u32 {
        self.0
    }

    /// Return the dense label id as an index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Return `true` for the background label.
    #[must_use]
    pub fn is_background(self) -> bool {
        self == Self::BACKGROUND
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registry mapping label names to dense label ids.
///
/// Built once by the caller and passed into the pipeline. The background
/// label is always registered first as `"background"`.
#[derive(Debug, Clone)]
pub struct LabelTable {
    names: Vec<String>,
    by_name: HashMap<String, Label>,
}

impl LabelTable {
    /// Name under which [`Label::BACKGROUND`] is registered.
    pub const BACKGROUND_NAME: &'static str = "background";

    /// Create a table holding only the background label.
    #[must_use]
    pub fn new() -> Self {
        Self {
            names: vec![Self::BACKGROUND_NAME.to_string()],
            by_name: HashMap::from([(Self::BACKGROUND_NAME.to_string(), Label::BACKGROUND)]),
        }
    }

    /// Register `name`, returning its label. Re-registering returns the existing label.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::TooManyLabels`] once every `u32` id is taken.
    pub fn register(&mut self, name: impl Into<String>) -> Result<Label, RfError> {
        let name = name.into();
        if let Some(&label) = self.by_name.get(&name) {
            return Ok(label);
        }
        let label = next_label(self.names.len())?;
        self.names.push(name.clone());
        self.by_name.insert(name, label);
        Ok(label)
    }

    /// Look up the label registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Label> {
        self.by_name.get(name).copied()
    }

    /// Return the name registered for `label`.
    #[must_use]
    pub fn name(&self, label: Label) -> Option<&str> {
        self.names.get(label.index()).map(String::as_str)
    }

    /// Number of registered labels, background included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always `false`: the background label is registered on construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate labels in id order together with their names.
    pub fn iter(&self) -> impl Iterator<Item = (Label, &str)> {
        self.names
            .iter()
            .zip(0u32..)
            .map(|(n, id)| (Label::new(id), n.as_str()))
    }
}

/// Label for the entry registered after `registered` others.
fn next_label(registered: usize) -> Result<Label, RfError> {
    u32::try_from(registered)
        .map(Label::new)
        .map_err(|_| RfError::TooManyLabels { registered })
}

impl Default for LabelTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{Label, LabelTable, next_label};
    use crate::error::RfError;

    #[test]
    fn roundtrip() {
        let label = Label::new(7);
        assert_eq!(label.id(), 7);
        assert_eq!(label.index(), 7);
    }

    #[test]
    fn display() {
        assert_eq!(format!("{}", Label::new(3)), "3");
    }

    #[test]
    fn background_is_zero() {
        assert!(Label::new(0).is_background());
        assert!(!Label::new(1).is_background());
    }

    #[test]
    fn table_starts_with_background() {
        let table = LabelTable::new();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("background"), Some(Label::BACKGROUND));
        assert_eq!(table.name(Label::BACKGROUND), Some("background"));
    }

    #[test]
    fn register_is_dense_and_idempotent() {
        let mut table = LabelTable::new();
        let apple = table.register("apple").unwrap();
        let banana = table.register("banana").unwrap();
        assert_eq!(apple, Label::new(1));
        assert_eq!(banana, Label::new(2));
        assert_eq!(table.register("apple").unwrap(), apple);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn unknown_name() {
        let table = LabelTable::new();
        assert_eq!(table.get("cherry"), None);
        assert_eq!(table.name(Label::new(9)), None);
    }

    #[test]
    fn iter_in_id_order() {
        let mut table = LabelTable::new();
        table.register("a").unwrap();
        table.register("b").unwrap();
        let names: Vec<&str> = table.iter().map(|(_, n)| n).collect();
        assert_eq!(names, vec!["background", "a", "b"]);
    }

    #[test]
    fn last_id_is_u32_max() {
        assert_eq!(next_label(u32::MAX as usize).unwrap(), Label::new(u32::MAX));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn ids_past_u32_are_rejected() {
        let registered = u32::MAX as usize + 1;
        let err = next_label(registered).unwrap_err();
        assert!(matches!(err, RfError::TooManyLabels { registered: r } if r == registered));
    }
}
