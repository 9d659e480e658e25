//! Updater execution
//!
//! Components supply an [`Updater`]; the engine never calls it directly.
//! A wrapper implementing [`UpdaterWrapper`] sits in between and carries
//! the shared protocol: extract positional arguments in declared port
//! order, invoke the updater, and write the result back with a fresh stamp
//! unless the updater already advanced the output itself. Returning
//! `None` from an updater deliberately suppresses output, which is how
//! barrier components hold the line.
//!
//! The stock [`FnWrapper`] is exactly that protocol. The split, join, and
//! transform wrappers in the sibling modules layer episode handling and
//! pre/post pipelines on top of the same context.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::descriptor::ComponentDescriptor;
use crate::error::UpdaterError;
use crate::lm::{next_lm, Lm};
use crate::metrics::NodeMetrics;
use crate::port::{InputAttachments, OutputPort};
use crate::state::{StatePatch, StateRecord, Vnid};
use crate::vni::{ResolvedPort, VniStore};

/// Shared runtime of one node instance: its identity, declared ports,
/// state store, and downstream ports. Drivers and in-flight updater
/// invocations hold this through an `Arc`; the store mutex is only ever
/// held for short synchronous sections.
pub struct NodeCore {
    pub id: String,
    pub descriptor: ComponentDescriptor,
    pub store: Mutex<VniStore>,
    pub attachments: InputAttachments,
    pub metrics: NodeMetrics,
    pub output_port: OutputPort,
    pub error_port: OutputPort,
}

/// One positional updater argument, shaped by the declared port
#[derive(Debug, Clone, PartialEq)]
pub enum PortArg {
    /// Payload of a plain port, if any record is present
    Single(Option<Value>),
    /// Payloads of an addressable port, one slot per attached socket
    Sockets(Vec<Option<Value>>),
}

impl PortArg {
    /// The payload of a plain port
    pub fn single(&self) -> Option<&Value> {
        match self {
            PortArg::Single(value) => value.as_ref(),
            PortArg::Sockets(_) => None,
        }
    }

    /// Payloads present on an addressable port, in socket order
    pub fn values(&self) -> Vec<&Value> {
        match self {
            PortArg::Single(value) => value.iter().collect(),
            PortArg::Sockets(slots) => slots.iter().flatten().collect(),
        }
    }
}

/// Inputs captured under one lock before an updater runs
#[derive(Debug, Clone)]
pub struct ArgSnapshot {
    /// Arguments in declared port order
    pub args: Vec<PortArg>,
    /// First correlation stamp found among the input records
    pub group_lm: Option<Lm>,
    /// Output stamp at extraction time; the commit compares against it
    pub output_lm: Option<Lm>,
}

/// What an updater (and its wrapper) may see and touch while running.
///
/// Every accessor locks the node's store for the duration of the call
/// only, so holding the context across awaits is safe.
pub struct UpdaterContext {
    core: Arc<NodeCore>,
    vnid: Vnid,
    trigger: StateRecord,
}

impl UpdaterContext {
    pub fn new(core: Arc<NodeCore>, vnid: Vnid, trigger: StateRecord) -> Self {
        Self {
            core,
            vnid,
            trigger,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.core.id
    }

    pub fn vnid(&self) -> &str {
        &self.vnid
    }

    /// The record whose delivery qualified this run
    pub fn trigger(&self) -> &StateRecord {
        &self.trigger
    }

    pub fn descriptor(&self) -> &ComponentDescriptor {
        &self.core.descriptor
    }

    /// Extract arguments and stamps for one updater run
    pub fn snapshot_args(&self) -> ArgSnapshot {
        let store = self.core.store.lock();
        let mut args = Vec::with_capacity(self.core.descriptor.inputs.len());
        let mut group_lm = None;
        for spec in &self.core.descriptor.inputs {
            let attached = self.core.attachments.attached(&spec.name);
            let resolved = store.resolve(&self.vnid, spec, attached);
            if group_lm.is_none() {
                group_lm = resolved
                    .present()
                    .iter()
                    .find_map(|record| record.group_lm);
            }
            args.push(match resolved {
                ResolvedPort::Single(record) => {
                    PortArg::Single(record.and_then(|r| r.data.clone()))
                }
                ResolvedPort::Addressable(slots) => PortArg::Sockets(
                    slots
                        .iter()
                        .map(|slot| slot.and_then(|r| r.data.clone()))
                        .collect(),
                ),
            });
        }
        let output_lm = store.get(&self.vnid).and_then(|vni| vni.output.lm);
        ArgSnapshot {
            args,
            group_lm,
            output_lm,
        }
    }

    /// Commit an updater result: install it with a fresh stamp and the
    /// correlated group stamp, unless the updater already advanced the
    /// output itself while running.
    ///
    /// A result identical to what the output already holds keeps the old
    /// stamp, so redelivered inputs never masquerade as real changes.
    pub fn write_result(&self, snapshot: &ArgSnapshot, data: Value) {
        let mut store = self.core.store.lock();
        let vni = store.vni(&self.vnid);
        if vni.output.lm != snapshot.output_lm {
            log::debug!(
                "{}/{}: updater advanced the output itself, keeping its stamp",
                self.core.id,
                self.vnid
            );
            return;
        }
        if vni.output.condition.is_clean()
            && vni.output.data.as_ref() == Some(&data)
            && vni.output.group_lm == snapshot.group_lm
        {
            log::debug!(
                "{}/{}: result unchanged, keeping the output stamp",
                self.core.id,
                self.vnid
            );
            return;
        }
        vni.output.set_data(data, next_lm());
        vni.output.group_lm = snapshot.group_lm;
    }

    /// Current output record of this VNI
    pub fn output_state(&self) -> StateRecord {
        let mut store = self.core.store.lock();
        store.vni(&self.vnid).output.clone()
    }

    /// Merge a partial update into the output record
    pub fn patch_output(&self, patch: StatePatch) {
        let mut store = self.core.store.lock();
        store.vni(&self.vnid).output.apply(patch);
    }

    /// Clear the output record back to empty
    pub fn clear_output(&self) {
        let mut store = self.core.store.lock();
        store.vni(&self.vnid).output.reset();
    }

    /// Current error record of this VNI
    pub fn error_state(&self) -> StateRecord {
        let mut store = self.core.store.lock();
        store.vni(&self.vnid).error.clone()
    }

    /// Merge a partial update into the error record
    pub fn patch_error(&self, patch: StatePatch) {
        let mut store = self.core.store.lock();
        store.vni(&self.vnid).error.apply(patch);
    }

    /// Annotate the output record; annotations never count as changes
    pub fn set_output_metadata(&self, key: impl Into<String>, value: Value) {
        let mut store = self.core.store.lock();
        store.vni(&self.vnid).output.set_metadata(key, value);
    }

    /// Drop every annotation from the output record
    pub fn clear_output_metadata(&self) {
        let mut store = self.core.store.lock();
        store.vni(&self.vnid).output.clear_metadata();
    }

    /// The resolved record on a plain input port, if any
    pub fn input_record(&self, port: &str) -> Option<StateRecord> {
        let spec = self.core.descriptor.input_port(port)?.clone();
        let attached = self.core.attachments.attached(port);
        let store = self.core.store.lock();
        match store.resolve(&self.vnid, &spec, attached) {
            ResolvedPort::Single(record) => record.cloned(),
            ResolvedPort::Addressable(_) => None,
        }
    }

    /// Resolved records on every declared input port, declaration order
    pub fn input_records(&self) -> Vec<StateRecord> {
        let store = self.core.store.lock();
        let mut records = Vec::new();
        for spec in &self.core.descriptor.inputs {
            let attached = self.core.attachments.attached(&spec.name);
            records.extend(
                store
                    .resolve(&self.vnid, spec, attached)
                    .present()
                    .into_iter()
                    .cloned(),
            );
        }
        records
    }

    /// VNIs alive on this node
    pub fn vni_count(&self) -> usize {
        self.core.store.lock().len()
    }

    /// Send a record straight out of the standing output port, bypassing
    /// change detection. The split wrapper fans episodes out this way.
    pub fn send_direct(&self, record: &StateRecord) -> crate::error::Result<()> {
        let sent = self.core.output_port.send(record);
        self.core.output_port.disconnect();
        sent
    }
}

/// User code of a component
#[async_trait]
pub trait Updater: Send + Sync {
    /// Compute this node's output for one qualifying event.
    ///
    /// `args` line up with the descriptor's declared inputs. Returning
    /// `Ok(None)` suppresses output for this run.
    async fn update(
        &self,
        ctx: &UpdaterContext,
        args: Vec<PortArg>,
    ) -> std::result::Result<Option<Value>, UpdaterError>;
}

/// Execution protocol around an [`Updater`]
#[async_trait]
pub trait UpdaterWrapper: Send + Sync {
    /// Run the updater for one qualifying event, leaving results on the
    /// VNI's records. The scheduler handles dispatch afterwards.
    async fn run_updater(&self, ctx: &UpdaterContext) -> std::result::Result<(), UpdaterError>;
}

/// Creates the wrapper for one node instance. Wrappers may hold per-node
/// state (the join ledger does), so every instantiation gets its own.
pub trait WrapperFactory: Send + Sync {
    fn create_wrapper(&self) -> Arc<dyn UpdaterWrapper>;
}

impl<F> WrapperFactory for F
where
    F: Fn() -> Arc<dyn UpdaterWrapper> + Send + Sync,
{
    fn create_wrapper(&self) -> Arc<dyn UpdaterWrapper> {
        (self)()
    }
}

/// The stock wrapper: extract, invoke, commit
pub struct FnWrapper {
    updater: Arc<dyn Updater>,
}

impl FnWrapper {
    pub fn new(updater: Arc<dyn Updater>) -> Self {
        Self { updater }
    }
}

#[async_trait]
impl UpdaterWrapper for FnWrapper {
    async fn run_updater(&self, ctx: &UpdaterContext) -> std::result::Result<(), UpdaterError> {
        let snapshot = ctx.snapshot_args();
        let result = self.updater.update(ctx, snapshot.args.clone()).await?;
        if let Some(data) = result {
            ctx.write_result(&snapshot, data);
        } else {
            log::debug!(
                "{}/{}: updater returned nothing, suppressing output",
                ctx.node_id(),
                ctx.vnid()
            );
        }
        Ok(())
    }
}

type BoxedUpdate =
    Pin<Box<dyn Future<Output = std::result::Result<Option<Value>, UpdaterError>> + Send>>;

/// Async closure-backed updater, mostly for tests and host callbacks
pub struct CallbackUpdater {
    callback: Box<dyn Fn(Vec<PortArg>) -> BoxedUpdate + Send + Sync>,
}

impl CallbackUpdater {
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn(Vec<PortArg>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Option<Value>, UpdaterError>> + Send + 'static,
    {
        Self {
            callback: Box::new(move |args| Box::pin(callback(args))),
        }
    }
}

#[async_trait]
impl Updater for CallbackUpdater {
    async fn update(
        &self,
        _ctx: &UpdaterContext,
        args: Vec<PortArg>,
    ) -> std::result::Result<Option<Value>, UpdaterError> {
        (self.callback)(args).await
    }
}

/// Synchronous closure-backed updater
pub struct SyncCallbackUpdater {
    callback:
        Box<dyn Fn(Vec<PortArg>) -> std::result::Result<Option<Value>, UpdaterError> + Send + Sync>,
}

impl SyncCallbackUpdater {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(Vec<PortArg>) -> std::result::Result<Option<Value>, UpdaterError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }
}

#[async_trait]
impl Updater for SyncCallbackUpdater {
    async fn update(
        &self,
        _ctx: &UpdaterContext,
        args: Vec<PortArg>,
    ) -> std::result::Result<Option<Value>, UpdaterError> {
        (self.callback)(args)
    }
}
