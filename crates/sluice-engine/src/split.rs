//! Split wrapper
//!
//! Opens a fan-out episode: the updater returns a hash keyed by vnid, and
//! the wrapper sends one record per entry straight downstream, every one
//! stamped with the shared group stamp that the matching join uses to put
//! the episode back together. The hash itself is parked on the output
//! record without advancing its stamp, so the regular dispatch pass stays
//! quiet and only the per-entry records travel.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::UpdaterError;
use crate::lm::next_lm;
use crate::state::{StatePatch, StateRecord};
use crate::wrapper::{Updater, UpdaterContext, UpdaterWrapper};

pub struct SplitWrapper {
    updater: Arc<dyn Updater>,
}

impl SplitWrapper {
    pub fn new(updater: Arc<dyn Updater>) -> Self {
        Self { updater }
    }
}

#[async_trait]
impl UpdaterWrapper for SplitWrapper {
    async fn run_updater(&self, ctx: &UpdaterContext) -> std::result::Result<(), UpdaterError> {
        let snapshot = ctx.snapshot_args();
        let result = match self.updater.update(ctx, snapshot.args.clone()).await? {
            Some(result) => result,
            None => return Ok(()),
        };
        let hash = match result {
            Value::Object(hash) => hash,
            other => {
                return Err(UpdaterError::with_payload(
                    "Split wrapper requires a hash return from the updater",
                    other,
                ))
            }
        };

        // The stamp of the first input record becomes the group stamp for
        // every record of this episode.
        let group_lm = ctx
            .input_records()
            .iter()
            .find_map(|record| record.lm)
            .unwrap_or_else(next_lm);

        ctx.patch_output(
            StatePatch::new()
                .data(Value::Object(hash.clone()))
                .group_lm(group_lm),
        );

        for (vnid, value) in &hash {
            let mut episode = StateRecord::with_data(vnid.clone(), value.clone(), group_lm);
            episode.group_lm = Some(group_lm);
            if let Err(err) = ctx.send_direct(&episode) {
                log::error!(
                    "{}: split delivery for '{}' failed: {err}",
                    ctx.node_id(),
                    vnid
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    use crate::descriptor::{PORT_ERROR, PORT_OUTPUT};
    use crate::metrics::{EngineMetrics, NodeMetrics};
    use crate::port::testing::RecordingSocket;
    use crate::port::{InputAttachments, OutputPort};
    use crate::vni::VniStore;
    use crate::wrapper::testing::simple_descriptor;
    use crate::wrapper::{NodeCore, SyncCallbackUpdater};

    fn split_core() -> (Arc<NodeCore>, Arc<RecordingSocket>) {
        let socket = Arc::new(RecordingSocket::default());
        let mut output_port = OutputPort::new("s1", PORT_OUTPUT);
        output_port.attach(socket.clone());
        let core = Arc::new(NodeCore {
            id: "s1".to_string(),
            descriptor: simple_descriptor(&["vnid_hash"]),
            store: Mutex::new(VniStore::new("s1", Arc::new(EngineMetrics::new()))),
            attachments: InputAttachments::new(),
            metrics: NodeMetrics::new(),
            output_port,
            error_port: OutputPort::new("s1", PORT_ERROR),
        });
        (core, socket)
    }

    fn seed_hash(core: &Arc<NodeCore>, data: Value) {
        let spec = core.descriptor.input_port("vnid_hash").cloned().unwrap();
        let mut store = core.store.lock();
        let record = StateRecord::with_data("", data, next_lm());
        store.vni("").inputs.set(&spec, 0, Some(record));
    }

    fn passthrough() -> Arc<dyn Updater> {
        Arc::new(SyncCallbackUpdater::new(|args| {
            Ok(args[0].single().cloned())
        }))
    }

    #[tokio::test]
    async fn test_split_fans_out_one_record_per_entry() {
        let (core, socket) = split_core();
        seed_hash(&core, json!({"1": "one", "2": "two", "3": "three"}));
        let ctx = UpdaterContext::new(core.clone(), String::new(), StateRecord::new(""));

        SplitWrapper::new(passthrough())
            .run_updater(&ctx)
            .await
            .unwrap();

        let records = socket.records();
        assert_eq!(records.len(), 3);
        let group = records[0].group_lm.unwrap();
        for record in &records {
            assert_eq!(record.group_lm, Some(group));
            assert_eq!(record.lm, Some(group));
        }
        let vnids: Vec<&str> = records.iter().map(|r| r.vnid.as_str()).collect();
        assert!(vnids.contains(&"1") && vnids.contains(&"2") && vnids.contains(&"3"));
    }

    #[tokio::test]
    async fn test_group_stamp_comes_from_the_triggering_input() {
        let (core, socket) = split_core();
        let input_lm = next_lm();
        {
            let spec = core.descriptor.input_port("vnid_hash").cloned().unwrap();
            let mut store = core.store.lock();
            let record = StateRecord::with_data("", json!({"1": "one"}), input_lm);
            store.vni("").inputs.set(&spec, 0, Some(record));
        }
        let ctx = UpdaterContext::new(core.clone(), String::new(), StateRecord::new(""));
        SplitWrapper::new(passthrough())
            .run_updater(&ctx)
            .await
            .unwrap();

        assert_eq!(socket.records()[0].group_lm, Some(input_lm));
    }

    #[tokio::test]
    async fn test_hash_parks_on_output_without_stamp() {
        let (core, _socket) = split_core();
        seed_hash(&core, json!({"1": "one"}));
        let ctx = UpdaterContext::new(core.clone(), String::new(), StateRecord::new(""));
        SplitWrapper::new(passthrough())
            .run_updater(&ctx)
            .await
            .unwrap();

        let output = ctx.output_state();
        assert_eq!(output.data, Some(json!({"1": "one"})));
        assert!(output.lm.is_none());
        assert!(output.group_lm.is_some());
    }

    #[tokio::test]
    async fn test_non_hash_result_is_rejected() {
        let (core, socket) = split_core();
        seed_hash(&core, json!("not a hash"));
        let ctx = UpdaterContext::new(core.clone(), String::new(), StateRecord::new(""));

        let err = SplitWrapper::new(passthrough())
            .run_updater(&ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("hash return"));
        assert!(socket.records().is_empty());
    }

    #[tokio::test]
    async fn test_suppressed_result_sends_nothing() {
        let (core, socket) = split_core();
        seed_hash(&core, json!({"1": "one"}));
        let ctx = UpdaterContext::new(core.clone(), String::new(), StateRecord::new(""));

        SplitWrapper::new(Arc::new(SyncCallbackUpdater::new(|_| Ok(None))))
            .run_updater(&ctx)
            .await
            .unwrap();
        assert!(socket.records().is_empty());
    }
}
