//! State records
//!
//! A `StateRecord` is the unit that flows along edges and is stored per
//! input position: a payload, the `Lm` stamped when the payload last
//! changed, and a condition flag. Records also carry the split/join
//! correlation stamp (`group_lm`) and a free-form metadata map that
//! components may annotate without affecting change detection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::lm::Lm;

/// Virtual node id: one logical entity slice served by a node instance
pub type Vnid = String;

/// The vnid of the singleton slice; IIP constants land here
pub const DEFAULT_VNID: &str = "";

/// Health of a record: healthy, derived from a failed upstream, or the
/// product of a failed updater run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    #[default]
    Clean,
    Stale,
    Errored,
}

impl Condition {
    pub fn is_clean(&self) -> bool {
        matches!(self, Condition::Clean)
    }
}

/// One versioned piece of pipeline state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub vnid: Vnid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lm: Option<Lm>,
    #[serde(default, skip_serializing_if = "Condition::is_clean")]
    pub condition: Condition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_lm: Option<Lm>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl StateRecord {
    /// An empty record for the given vnid: no payload, no stamp, Clean
    pub fn new(vnid: impl Into<Vnid>) -> Self {
        Self {
            vnid: vnid.into(),
            data: None,
            lm: None,
            condition: Condition::Clean,
            group_lm: None,
            metadata: BTreeMap::new(),
        }
    }

    /// A record already carrying a payload and stamp
    pub fn with_data(vnid: impl Into<Vnid>, data: Value, lm: Lm) -> Self {
        let mut record = Self::new(vnid);
        record.set_data(data, lm);
        record
    }

    /// Install a fresh payload. Marks the record Clean; the stamp must be
    /// newly issued unless the caller is deliberately replaying.
    pub fn set_data(&mut self, data: Value, lm: Lm) {
        self.data = Some(data);
        self.lm = Some(lm);
        self.condition = Condition::Clean;
    }

    /// Clear everything except the vnid
    pub fn reset(&mut self) {
        let vnid = std::mem::take(&mut self.vnid);
        *self = Self::new(vnid);
    }

    /// Merge a partial update; fields the patch leaves unset are untouched
    pub fn apply(&mut self, patch: StatePatch) {
        if let Some(vnid) = patch.vnid {
            self.vnid = vnid;
        }
        if let Some(data) = patch.data {
            self.data = Some(data);
        }
        if let Some(lm) = patch.lm {
            self.lm = Some(lm);
        }
        if let Some(condition) = patch.condition {
            self.condition = condition;
        }
        if let Some(group_lm) = patch.group_lm {
            self.group_lm = Some(group_lm);
        }
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn is_errored(&self) -> bool {
        self.condition == Condition::Errored
    }

    pub fn is_stale(&self) -> bool {
        self.condition == Condition::Stale
    }

    /// Annotate the record; annotations ride along downstream but never
    /// count as a data change
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn clear_metadata(&mut self) {
        self.metadata.clear();
    }
}

/// Partial update merged into a `StateRecord` by [`StateRecord::apply`]
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
    pub vnid: Option<Vnid>,
    pub data: Option<Value>,
    pub lm: Option<Lm>,
    pub condition: Option<Condition>,
    pub group_lm: Option<Lm>,
}

impl StatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vnid(mut self, vnid: impl Into<Vnid>) -> Self {
        self.vnid = Some(vnid.into());
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn lm(mut self, lm: Lm) -> Self {
        self.lm = Some(lm);
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn group_lm(mut self, group_lm: Lm) -> Self {
        self.group_lm = Some(group_lm);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lm::next_lm;
    use serde_json::json;

    #[test]
    fn test_new_record_is_empty_and_clean() {
        let record = StateRecord::new("7");
        assert_eq!(record.vnid, "7");
        assert!(record.data.is_none());
        assert!(record.lm.is_none());
        assert_eq!(record.condition, Condition::Clean);
        assert!(record.group_lm.is_none());
    }

    #[test]
    fn test_set_data_stamps_and_cleans() {
        let mut record = StateRecord::new(DEFAULT_VNID);
        record.condition = Condition::Errored;
        let lm = next_lm();
        record.set_data(json!({"ok": true}), lm);
        assert_eq!(record.data, Some(json!({"ok": true})));
        assert_eq!(record.lm, Some(lm));
        assert!(record.condition.is_clean());
    }

    #[test]
    fn test_patch_merges_without_clobbering() {
        let lm = next_lm();
        let mut record = StateRecord::with_data("x", json!(1), lm);
        record.apply(StatePatch::new().condition(Condition::Stale));
        assert_eq!(record.data, Some(json!(1)));
        assert_eq!(record.lm, Some(lm));
        assert!(record.is_stale());

        let group = next_lm();
        record.apply(StatePatch::new().group_lm(group).vnid("y"));
        assert_eq!(record.group_lm, Some(group));
        assert_eq!(record.vnid, "y");
        assert_eq!(record.lm, Some(lm));
    }

    #[test]
    fn test_reset_keeps_vnid_only() {
        let mut record = StateRecord::with_data("42", json!("payload"), next_lm());
        record.set_metadata("origin", json!("n1"));
        record.reset();
        assert_eq!(record, StateRecord::new("42"));
    }

    #[test]
    fn test_metadata_round_trip() {
        let mut record = StateRecord::new(DEFAULT_VNID);
        record.set_metadata("patient", json!("p-9"));
        assert_eq!(record.metadata("patient"), Some(&json!("p-9")));
        record.clear_metadata();
        assert!(record.metadata.is_empty());
    }

    #[test]
    fn test_serde_skips_empty_fields() {
        let record = StateRecord::new("");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, json!({"vnid": ""}));

        let full: StateRecord = serde_json::from_value(json!({
            "vnid": "1",
            "data": "one",
            "lm": "LM1487988968297.00000000000000035",
            "condition": "stale"
        }))
        .unwrap();
        assert_eq!(full.data, Some(json!("one")));
        assert!(full.is_stale());
    }
}
