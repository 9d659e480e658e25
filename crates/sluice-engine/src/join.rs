//! Join wrapper
//!
//! The barrier that closes a split episode. Contributions arrive as
//! records carrying a group stamp; the hash that opened the episode
//! arrives on its own port without one, identified by its stamp equaling
//! the contributions' group stamp. Once every key of the hash has
//! reported, the wrapper emits the reassembled hash on the hash's vnid
//! with one fresh stamp.
//!
//! Episodes in flight live in a ledger owned by the wrapper instance,
//! bounded by [`JoinConfig::max_groups`]; the oldest episode is dropped
//! when the bound is hit, and contributions for unknown or dropped
//! episodes are ignored.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::error::UpdaterError;
use crate::lm::{next_lm, Lm};
use crate::state::{StatePatch, Vnid};
use crate::wrapper::{Updater, UpdaterContext, UpdaterWrapper};

#[derive(Debug, Clone)]
pub struct JoinConfig {
    /// Episodes tracked at once before the oldest is dropped
    pub max_groups: usize,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self { max_groups: 64 }
    }
}

struct GroupEntry {
    hash_vnid: Vnid,
    expected: BTreeSet<String>,
    collected: Map<String, Value>,
}

pub(crate) enum JoinProgress {
    /// Group never opened, or already dropped
    Unknown,
    /// Contribution recorded, more outstanding
    Pending,
    /// Every expected key reported
    Complete(Vnid, Map<String, Value>),
}

/// Episodes in flight, keyed by group stamp
pub(crate) struct JoinLedger {
    groups: HashMap<Lm, GroupEntry>,
    order: VecDeque<Lm>,
    capacity: usize,
}

impl JoinLedger {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            groups: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Start tracking `group` if it is new, returning a group that had to
    /// be dropped to make room
    pub(crate) fn open(
        &mut self,
        group: Lm,
        hash_vnid: &str,
        hash_data: Option<&Value>,
    ) -> Option<Lm> {
        if self.groups.contains_key(&group) {
            return None;
        }
        let mut evicted = None;
        if self.groups.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.groups.remove(&oldest);
                evicted = Some(oldest);
            }
        }
        let expected = hash_data
            .and_then(Value::as_object)
            .map(|hash| hash.keys().cloned().collect())
            .unwrap_or_default();
        self.groups.insert(
            group,
            GroupEntry {
                hash_vnid: hash_vnid.to_string(),
                expected,
                collected: Map::new(),
            },
        );
        self.order.push_back(group);
        evicted
    }

    /// Record one contribution; completion removes the group
    pub(crate) fn record(&mut self, group: Lm, vnid: &str, value: Value) -> JoinProgress {
        let complete = match self.groups.get_mut(&group) {
            Some(entry) => {
                entry.collected.insert(vnid.to_string(), value);
                entry
                    .expected
                    .iter()
                    .all(|key| entry.collected.contains_key(key))
            }
            None => return JoinProgress::Unknown,
        };
        if !complete {
            return JoinProgress::Pending;
        }
        match self.groups.remove(&group) {
            Some(entry) => {
                self.order.retain(|g| *g != group);
                JoinProgress::Complete(entry.hash_vnid, entry.collected)
            }
            None => JoinProgress::Unknown,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.groups.len()
    }
}

pub struct JoinWrapper {
    updater: Arc<dyn Updater>,
    ledger: Mutex<JoinLedger>,
}

impl JoinWrapper {
    pub fn new(updater: Arc<dyn Updater>) -> Self {
        Self::with_config(updater, JoinConfig::default())
    }

    pub fn with_config(updater: Arc<dyn Updater>, config: JoinConfig) -> Self {
        Self {
            updater,
            ledger: Mutex::new(JoinLedger::new(config.max_groups)),
        }
    }

    /// Episodes currently waiting on contributions
    pub fn tracked_groups(&self) -> usize {
        self.ledger.lock().len()
    }
}

#[async_trait]
impl UpdaterWrapper for JoinWrapper {
    async fn run_updater(&self, ctx: &UpdaterContext) -> std::result::Result<(), UpdaterError> {
        let trigger = ctx.trigger().clone();
        if trigger.is_errored() {
            let payload = trigger.data.clone().unwrap_or(Value::Null);
            ctx.patch_error(StatePatch::new().data(payload).lm(next_lm()));
            return Ok(());
        }
        // The hash arrives without a group stamp and there is nothing to
        // do for it until contributions show up.
        let group = match trigger.group_lm {
            Some(group) => group,
            None => return Ok(()),
        };

        // The opening hash is the input whose own stamp equals the
        // contribution's group stamp; on a duplicate the first match in
        // port order wins.
        let hash = ctx
            .input_records()
            .into_iter()
            .find(|record| record.group_lm.is_none() && record.lm == Some(group));
        let hash = match hash {
            Some(hash) => hash,
            None => {
                log::debug!(
                    "{}: no hash matches group {group}, ignoring contribution from '{}'",
                    ctx.node_id(),
                    trigger.vnid
                );
                return Ok(());
            }
        };

        if let Some(evicted) = self
            .ledger
            .lock()
            .open(group, &hash.vnid, hash.data.as_ref())
        {
            log::warn!(
                "{}: join ledger full, dropping unfinished group {evicted}",
                ctx.node_id()
            );
        }

        let snapshot = ctx.snapshot_args();
        let result = match self.updater.update(ctx, snapshot.args.clone()).await? {
            Some(result) => result,
            None => return Ok(()),
        };

        // An updater that moved the output stamp itself has taken over.
        if ctx.output_state().lm != snapshot.output_lm {
            return Ok(());
        }

        let contribution = match &result {
            Value::Object(map) if map.contains_key("input") => map["input"].clone(),
            _ => result,
        };

        match self.ledger.lock().record(group, &trigger.vnid, contribution) {
            JoinProgress::Unknown => {
                log::debug!(
                    "{}: group {group} no longer tracked, dropping contribution from '{}'",
                    ctx.node_id(),
                    trigger.vnid
                );
            }
            JoinProgress::Pending => {}
            JoinProgress::Complete(hash_vnid, collected) => {
                ctx.patch_output(
                    StatePatch::new()
                        .vnid(hash_vnid)
                        .data(Value::Object(collected))
                        .lm(next_lm()),
                );
            }
        }
        Ok(())
    }
}
