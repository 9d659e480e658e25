//! Node scheduling
//!
//! Every node runs as one actor task draining a mailbox of deliveries and
//! updater settlements, so state mutation for a node is serialized without
//! holding locks across awaits. Per delivery the driver stores the record,
//! runs the staleness step, consults the update policy, and launches the
//! wrapper on its own task; the settlement message then carries the
//! outcome back for dispatch.
//!
//! At most one updater runs per (node, vnid). A qualifying delivery that
//! arrives while one is in flight parks its trigger and the policy is
//! re-consulted when the settlement lands.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::error::UpdaterError;
use crate::lm::next_lm;
use crate::output::{handle_error, handle_output};
use crate::policy::{GatingPort, PolicyView, UpdatePolicy};
use crate::port::Packet;
use crate::state::{Condition, StateRecord, Vnid, DEFAULT_VNID};
use crate::wrapper::{NodeCore, UpdaterContext, UpdaterWrapper};

/// Mail for one node's driver task
pub(crate) enum NodeMessage {
    /// A record arrived on an input port
    Deliver(Packet),
    /// A spawned updater invocation finished
    Settled(Settlement),
    /// Stop draining. Senders survive inside feedback edges, so shutdown
    /// is a message rather than channel closure.
    Stop,
}

pub(crate) struct Settlement {
    vnid: Vnid,
    pre: RunSnapshot,
    outcome: Result<(), UpdaterError>,
    elapsed: Duration,
}

/// State captured just before an updater runs, consumed when it settles
pub(crate) struct RunSnapshot {
    output_lm: Option<crate::lm::Lm>,
    error_before: StateRecord,
}

impl RunSnapshot {
    /// Snapshot the records the settlement will compare against, clear
    /// the error record for the run, and drop a leftover error flag from
    /// the output.
    fn take(core: &NodeCore, vnid: &str) -> Self {
        let mut store = core.store.lock();
        let vni = store.vni(vnid);
        let output_lm = vni.output.lm;
        let error_before = vni.error.clone();
        vni.error.reset();
        if vni.output.condition == Condition::Errored {
            vni.output.condition = Condition::Clean;
        }
        Self {
            output_lm,
            error_before,
        }
    }
}

pub(crate) struct NodeDriver {
    core: Arc<NodeCore>,
    wrapper: Arc<dyn UpdaterWrapper>,
    policy: Arc<dyn UpdatePolicy>,
    mailbox: mpsc::UnboundedReceiver<NodeMessage>,
    handle: mpsc::UnboundedSender<NodeMessage>,
    inflight: HashSet<Vnid>,
    /// Latest qualifying trigger per vnid that arrived mid-flight
    parked: HashMap<Vnid, StateRecord>,
    emitted: HashSet<Vnid>,
}

impl NodeDriver {
    pub(crate) fn new(
        core: Arc<NodeCore>,
        wrapper: Arc<dyn UpdaterWrapper>,
        policy: Arc<dyn UpdatePolicy>,
    ) -> (Self, mpsc::UnboundedSender<NodeMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = Self::with_mailbox(core, wrapper, policy, tx.clone(), rx);
        (driver, tx)
    }

    /// Build a driver over a mailbox the caller created. The network host
    /// wires upstream sockets to the sender before the driver exists.
    pub(crate) fn with_mailbox(
        core: Arc<NodeCore>,
        wrapper: Arc<dyn UpdaterWrapper>,
        policy: Arc<dyn UpdatePolicy>,
        handle: mpsc::UnboundedSender<NodeMessage>,
        mailbox: mpsc::UnboundedReceiver<NodeMessage>,
    ) -> Self {
        Self {
            core,
            wrapper,
            policy,
            mailbox,
            handle,
            inflight: HashSet::new(),
            parked: HashMap::new(),
            emitted: HashSet::new(),
        }
    }

    /// Drain the mailbox until a stop message arrives or every sender is
    /// gone
    pub(crate) async fn run(mut self) {
        while let Some(message) = self.mailbox.recv().await {
            match message {
                NodeMessage::Deliver(packet) => self.on_packet(packet),
                NodeMessage::Settled(settlement) => self.on_settled(settlement),
                NodeMessage::Stop => break,
            }
        }
        log::debug!("{}: driver stopped", self.core.id);
    }

    fn on_packet(&mut self, packet: Packet) {
        let Packet {
            port,
            socket,
            record,
        } = packet;
        self.core.metrics.packet_seen();

        let spec = match self.core.descriptor.input_port(&port) {
            Some(spec) => spec.clone(),
            None => {
                log::warn!("{}: dropping packet for unknown port '{port}'", self.core.id);
                return;
            }
        };
        let vnid = record.vnid.clone();
        let trigger = record.clone();
        let new_lm = record.lm;

        let forward = {
            let mut store = self.core.store.lock();
            let (was_stale, remembered_lm) = {
                let vni = store.vni(&vnid);
                match vni.inputs.set(&spec, socket, Some(record)) {
                    Some(previous) => (!previous.condition.is_clean(), previous.lm),
                    None => (false, None),
                }
            };

            let mut is_stale = was_stale && new_lm == remembered_lm;
            if !is_stale {
                is_stale = self.core.descriptor.inputs.iter().any(|spec| {
                    let attached = self.core.attachments.attached(&spec.name);
                    attached > 0
                        && store
                            .resolve(&vnid, spec, attached)
                            .present()
                            .iter()
                            .any(|record| !record.condition.is_clean())
                });
            }

            if is_stale {
                let vni = store.vni(&vnid);
                let last_lm = vni.output.lm;
                if vni.output.condition == Condition::Clean {
                    vni.output.condition = Condition::Stale;
                    vni.output.lm = Some(next_lm());
                    log::debug!("{}/{vnid}: output marked stale", self.core.id);
                }
                Some((last_lm, vni.output.clone()))
            } else {
                None
            }
        };

        // Stale status travels without running the updater.
        if let Some((last_lm, output)) = forward {
            if handle_output(&self.core.output_port, last_lm, &output) {
                self.finish_emit(&vnid);
            }
            return;
        }

        if self.should_run(&vnid) {
            self.launch(vnid, trigger);
        }
    }

    fn on_settled(&mut self, settlement: Settlement) {
        let Settlement {
            vnid,
            pre,
            outcome,
            elapsed,
        } = settlement;
        self.inflight.remove(&vnid);
        let failure = match outcome {
            Ok(()) => None,
            Err(err) => Some(err),
        };
        self.core.metrics.update_finished(elapsed, failure.is_some());

        let (output, error) = {
            let mut store = self.core.store.lock();
            let vni = store.vni(&vnid);
            match failure {
                None => {
                    // The updater may still have recorded an error itself.
                    if vni.error.data != pre.error_before.data {
                        vni.error.lm = Some(next_lm());
                        vni.output.condition = if vni.error.data.is_some() {
                            Condition::Errored
                        } else {
                            Condition::Clean
                        };
                    }
                }
                Some(err) => {
                    log::debug!("{}/{vnid}: updater failed: {err}", self.core.id);
                    if vni.error.data.is_none() && vni.error.lm.is_none() {
                        vni.error.data = Some(err.into_value());
                    }
                    if vni.error.data != pre.error_before.data {
                        vni.error.lm = Some(next_lm());
                    } else if vni.error.lm.is_none() {
                        vni.error.lm = pre.error_before.lm;
                    }
                    vni.output.condition = Condition::Errored;
                }
            }
            (vni.output.clone(), vni.error.clone())
        };

        // A changed error forces the output out even with an unmoved stamp.
        let last_lm = if error.data != pre.error_before.data {
            None
        } else {
            pre.output_lm
        };
        let sent = handle_output(&self.core.output_port, last_lm, &output);

        if !(error.data.is_none() && error.lm.is_none()) {
            let mut dispatch = error;
            handle_error(&self.core.error_port, &pre.error_before, &mut dispatch);
            // Persist the stamp the dedup may have restored.
            let mut store = self.core.store.lock();
            if let Some(vni) = store.get_mut(&vnid) {
                vni.error.lm = dispatch.lm;
            }
        }

        if sent {
            self.finish_emit(&vnid);
        }

        if let Some(trigger) = self.parked.remove(&vnid) {
            if self.should_run(&vnid) {
                self.launch(vnid, trigger);
            }
        }
    }

    fn should_run(&self, vnid: &str) -> bool {
        let store = self.core.store.lock();
        let mut ports = Vec::new();
        for spec in &self.core.descriptor.inputs {
            let attached = self.core.attachments.attached(&spec.name);
            if attached == 0 {
                continue;
            }
            ports.push(GatingPort {
                spec,
                attached,
                resolved: store.resolve(vnid, spec, attached),
            });
        }
        let view = PolicyView::new(&self.core.id, vnid, ports, self.emitted.contains(vnid));
        self.policy.should_run(&view)
    }

    fn launch(&mut self, vnid: Vnid, trigger: StateRecord) {
        if self.inflight.contains(&vnid) {
            log::debug!("{}/{vnid}: updater busy, parking trigger", self.core.id);
            self.parked.insert(vnid, trigger);
            return;
        }
        self.inflight.insert(vnid.clone());

        let core = self.core.clone();
        let wrapper = self.wrapper.clone();
        let handle = self.handle.clone();
        tokio::spawn(async move {
            let pre = RunSnapshot::take(&core, &vnid);
            let ctx = UpdaterContext::new(core, vnid.clone(), trigger);
            let started = Instant::now();
            let outcome = wrapper.run_updater(&ctx).await;
            let settled = Settlement {
                vnid,
                pre,
                outcome,
                elapsed: started.elapsed(),
            };
            // The driver may already be gone during shutdown.
            let _ = handle.send(NodeMessage::Settled(settled));
        });
    }

    /// Bookkeeping after a record actually left the output port
    fn finish_emit(&mut self, vnid: &str) {
        self.emitted.insert(vnid.to_string());
        if self.core.descriptor.transient && vnid != DEFAULT_VNID {
            let mut store = self.core.store.lock();
            store.delete(vnid);
            drop(store);
            self.emitted.remove(vnid);
            self.parked.remove(vnid);
        }
    }
}
