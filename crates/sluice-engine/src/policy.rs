//! Update gating
//!
//! After every delivery the scheduler asks a policy whether the node's
//! updater may run for the delivered vnid. The stock policy runs once all
//! attached required inputs are present and healthy; swap in another
//! implementation per node to change that (fire-on-any, quorum, debounce).

use crate::descriptor::PortSpec;
use crate::vni::ResolvedPort;

/// One attached input port as the policy sees it
pub struct GatingPort<'a> {
    pub spec: &'a PortSpec,
    pub attached: usize,
    pub resolved: ResolvedPort<'a>,
}

/// Everything a policy may consider for one (node, vnid) evaluation.
///
/// Only ports with at least one attached socket appear; detached ports are
/// vacuously satisfied.
pub struct PolicyView<'a> {
    node_id: &'a str,
    vnid: &'a str,
    ports: Vec<GatingPort<'a>>,
    has_emitted: bool,
}

impl<'a> PolicyView<'a> {
    pub fn new(
        node_id: &'a str,
        vnid: &'a str,
        ports: Vec<GatingPort<'a>>,
        has_emitted: bool,
    ) -> Self {
        Self {
            node_id,
            vnid,
            ports,
            has_emitted,
        }
    }

    pub fn node_id(&self) -> &str {
        self.node_id
    }

    pub fn vnid(&self) -> &str {
        self.vnid
    }

    pub fn ports(&self) -> &[GatingPort<'a>] {
        &self.ports
    }

    /// Whether this VNI has produced output before
    pub fn has_emitted(&self) -> bool {
        self.has_emitted
    }
}

/// Decides whether an updater run is warranted
pub trait UpdatePolicy: Send + Sync {
    fn should_run(&self, view: &PolicyView<'_>) -> bool;
}

/// Run once every attached required port is fully populated with healthy
/// records.
///
/// Holds off while any gating record is stale or errored, and while a
/// gating record has no payload after the node already produced output
/// (a still-initializing upstream must not re-trigger it).
pub struct AllInputs;

impl UpdatePolicy for AllInputs {
    fn should_run(&self, view: &PolicyView<'_>) -> bool {
        for port in view.ports() {
            if !port.spec.required {
                continue;
            }
            if !port.resolved.fully_populated() {
                log::debug!(
                    "{}/{}: holding, port '{}' not fully populated",
                    view.node_id(),
                    view.vnid(),
                    port.spec.name
                );
                return false;
            }
            for record in port.resolved.present() {
                if !record.condition.is_clean() {
                    log::debug!(
                        "{}/{}: holding, port '{}' carries a {:?} record",
                        view.node_id(),
                        view.vnid(),
                        port.spec.name,
                        record.condition
                    );
                    return false;
                }
                if record.data.is_none() && view.has_emitted() {
                    log::debug!(
                        "{}/{}: holding, port '{}' lost its payload after a prior emit",
                        view.node_id(),
                        view.vnid(),
                        port.spec.name
                    );
                    return false;
                }
            }
        }
        true
    }
}
