//! Virtual node instances
//!
//! A node instance serves many logical entities at once. Each entity's
//! slice of the node is a `Vni`: the input records seen for that vnid plus
//! the output and error records the node computed for it. `VniStore` owns
//! every slice of one node and implements the default-vnid fallback that
//! lets constants and broadcast inputs reach every slice.

use std::collections::HashMap;
use std::sync::Arc;

use crate::descriptor::PortSpec;
use crate::input_states::InputStates;
use crate::metrics::EngineMetrics;
use crate::state::{StateRecord, Vnid, DEFAULT_VNID};

/// One per-(node, vnid) state bundle
#[derive(Debug, Clone)]
pub struct Vni {
    vnid: Vnid,
    pub inputs: InputStates,
    pub output: StateRecord,
    pub error: StateRecord,
}

impl Vni {
    pub fn new(vnid: impl Into<Vnid>) -> Self {
        let vnid = vnid.into();
        Self {
            inputs: InputStates::new(),
            output: StateRecord::new(vnid.clone()),
            error: StateRecord::new(vnid.clone()),
            vnid,
        }
    }

    pub fn vnid(&self) -> &str {
        &self.vnid
    }
}

/// Resolution of one input port for one vnid, shaped by the port's spec
#[derive(Debug)]
pub enum ResolvedPort<'a> {
    Single(Option<&'a StateRecord>),
    Addressable(Vec<Option<&'a StateRecord>>),
}

impl ResolvedPort<'_> {
    /// Records actually present at this port
    pub fn present(&self) -> Vec<&StateRecord> {
        match self {
            ResolvedPort::Single(record) => record.iter().copied().collect(),
            ResolvedPort::Addressable(slots) => slots.iter().flatten().copied().collect(),
        }
    }

    /// Whether every position of the port holds a record
    pub fn fully_populated(&self) -> bool {
        match self {
            ResolvedPort::Single(record) => record.is_some(),
            ResolvedPort::Addressable(slots) => {
                !slots.is_empty() && slots.iter().all(Option::is_some)
            }
        }
    }
}

/// All VNIs of one node
pub struct VniStore {
    node_id: String,
    vnis: HashMap<Vnid, Vni>,
    metrics: Arc<EngineMetrics>,
}

impl VniStore {
    pub fn new(node_id: impl Into<String>, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            node_id: node_id.into(),
            vnis: HashMap::new(),
            metrics,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Get the slice for a vnid, creating an empty one on first touch
    pub fn vni(&mut self, vnid: &str) -> &mut Vni {
        if !self.vnis.contains_key(vnid) {
            log::debug!("{}: creating vni '{}'", self.node_id, vnid);
            self.metrics.vni_created(vnid == DEFAULT_VNID);
        }
        self.vnis
            .entry(vnid.to_string())
            .or_insert_with(|| Vni::new(vnid))
    }

    pub fn get(&self, vnid: &str) -> Option<&Vni> {
        self.vnis.get(vnid)
    }

    pub fn get_mut(&mut self, vnid: &str) -> Option<&mut Vni> {
        self.vnis.get_mut(vnid)
    }

    /// Destroy one slice; transient nodes do this after a successful emit
    pub fn delete(&mut self, vnid: &str) -> bool {
        if self.vnis.remove(vnid).is_some() {
            log::debug!("{}: deleted vni '{}'", self.node_id, vnid);
            self.metrics.vni_destroyed(vnid == DEFAULT_VNID);
            true
        } else {
            false
        }
    }

    /// Destroy every slice
    pub fn clear(&mut self) {
        for vnid in self.vnis.keys() {
            self.metrics.vni_destroyed(vnid == DEFAULT_VNID);
        }
        self.vnis.clear();
    }

    pub fn len(&self) -> usize {
        self.vnis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vnis.is_empty()
    }

    pub fn vnids(&self) -> Vec<&str> {
        self.vnis.keys().map(|v| v.as_str()).collect()
    }

    /// Resolve one input port for one vnid.
    ///
    /// A port with no entry under `vnid` falls back to the entry recorded
    /// under the default vnid, which is how IIP constants and whole-pipeline
    /// inputs become visible to every entity slice. The fallback is
    /// per-port: each port resolves independently.
    pub fn resolve<'a>(
        &'a self,
        vnid: &str,
        spec: &PortSpec,
        attached: usize,
    ) -> ResolvedPort<'a> {
        let own = self.vnis.get(vnid).filter(|v| v.inputs.contains(&spec.name));
        let source = own.or_else(|| {
            if vnid == DEFAULT_VNID {
                None
            } else {
                self.vnis
                    .get(DEFAULT_VNID)
                    .filter(|v| v.inputs.contains(&spec.name))
            }
        });
        if spec.addressable {
            let slots = source
                .and_then(|v| v.inputs.sockets(&spec.name, attached))
                .unwrap_or_else(|| vec![None; attached]);
            ResolvedPort::Addressable(slots)
        } else {
            ResolvedPort::Single(source.and_then(|v| v.inputs.single(&spec.name)))
        }
    }
}
