//! In-process pipeline host
//!
//! The reference implementation of the host side of the port contract:
//! nodes are resolved from a [`ComponentRegistry`](crate::ComponentRegistry),
//! edges become channel-backed sockets feeding downstream mailboxes, and
//! IIPs (constant initial packets) are delivered once at start under the
//! default vnid.
//!
//! Graphs may contain cycles; the funnel pattern depends on a feedback
//! edge returning completion signals to an earlier node. Validation
//! therefore checks references and wrappers, never acyclicity.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use parking_lot::Mutex;

use crate::descriptor::{ComponentDescriptor, PORT_ERROR, PORT_OUTPUT};
use crate::error::{EngineError, Result};
use crate::lm::next_lm;
use crate::metrics::{EngineMetrics, NodeMetrics};
use crate::policy::AllInputs;
use crate::port::{InputAttachments, OutputPort, OutputSocket, Packet};
use crate::registry::ComponentRegistry;
use crate::scheduler::{NodeDriver, NodeMessage};
use crate::state::{StateRecord, DEFAULT_VNID};
use crate::vni::VniStore;
use crate::wrapper::NodeCore;

/// Socket feeding a downstream node's mailbox
struct ChannelSocket {
    node: String,
    port: String,
    socket: usize,
    tx: mpsc::UnboundedSender<NodeMessage>,
}

impl OutputSocket for ChannelSocket {
    fn deliver(&self, record: StateRecord) -> Result<()> {
        self.tx
            .send(NodeMessage::Deliver(Packet {
                port: self.port.clone(),
                socket: self.socket,
                record,
            }))
            .map_err(|_| EngineError::SendFailed {
                node: self.node.clone(),
                port: self.port.clone(),
            })
    }
}

/// Socket feeding an observer outside the graph
struct CaptureSocket {
    tx: mpsc::UnboundedSender<StateRecord>,
}

impl OutputSocket for CaptureSocket {
    fn deliver(&self, record: StateRecord) -> Result<()> {
        // A dropped observer is not a pipeline fault
        let _ = self.tx.send(record);
        Ok(())
    }
}

/// Observer end of a [`NetworkBuilder::capture`] socket
pub struct OutputCapture {
    rx: mpsc::UnboundedReceiver<StateRecord>,
}

impl OutputCapture {
    /// Next captured record; `None` once the network is gone
    pub async fn recv(&mut self) -> Option<StateRecord> {
        self.rx.recv().await
    }

    /// A captured record if one is already queued
    pub fn try_recv(&mut self) -> Option<StateRecord> {
        self.rx.try_recv().ok()
    }
}

/// Host-side input attachment, created before the network starts so its
/// socket index participates in fan-in alignment
pub struct InputHandle {
    node: String,
    port: String,
    socket: usize,
    tx: mpsc::UnboundedSender<NodeMessage>,
}

impl InputHandle {
    /// Deliver a complete record
    pub fn send(&self, record: StateRecord) -> Result<()> {
        self.tx
            .send(NodeMessage::Deliver(Packet {
                port: self.port.clone(),
                socket: self.socket,
                record,
            }))
            .map_err(|_| EngineError::SendFailed {
                node: self.node.clone(),
                port: self.port.clone(),
            })
    }

    /// Deliver a payload as a fresh default-vnid record
    pub fn send_value(&self, value: Value) -> Result<()> {
        self.send(StateRecord::with_data(DEFAULT_VNID, value, next_lm()))
    }
}

/// One problem found while assembling a network
#[derive(Debug, Clone)]
enum ValidationError {
    DuplicateNode {
        node: String,
    },
    UnknownComponent {
        node: String,
        component: String,
    },
    /// Component is registered descriptor-only
    MissingWrapper {
        node: String,
    },
    UnknownNode {
        context: String,
        node: String,
    },
    UnknownPort {
        context: String,
        node: String,
        port: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateNode { node } => write!(f, "Duplicate node id '{node}'"),
            Self::UnknownComponent { node, component } => {
                write!(f, "Unknown component '{component}' for node '{node}'")
            }
            Self::MissingWrapper { node } => {
                write!(
                    f,
                    "Node '{node}': No wrapper fRunUpdater function found!  Cannot run updater."
                )
            }
            Self::UnknownNode { context, node } => {
                write!(f, "{context} references unknown node '{node}'")
            }
            Self::UnknownPort {
                context,
                node,
                port,
            } => {
                write!(f, "{context}: node '{node}' has no port '{port}'")
            }
        }
    }
}

struct NodeDecl {
    id: String,
    component: String,
    tx: mpsc::UnboundedSender<NodeMessage>,
    rx: mpsc::UnboundedReceiver<NodeMessage>,
}

struct EdgeDecl {
    from: String,
    from_port: String,
    to: String,
    to_port: String,
    socket: usize,
}

struct IipDecl {
    node: String,
    port: String,
    value: Value,
    socket: usize,
}

struct CaptureDecl {
    node: String,
    port: String,
    tx: mpsc::UnboundedSender<StateRecord>,
}

struct HostInputDecl {
    node: String,
    port: String,
}

/// Fluent assembly of a pipeline graph
///
/// # Example
///
/// ```ignore
/// let mut builder = NetworkBuilder::new(registry)
///     .node("upper", "sluice/to-upper-case")
///     .node("sink", "sluice/repeat")
///     .connect("upper", "output", "sink", "input")
///     .iip("upper", "input", json!("hello"));
/// let mut out = builder.capture("sink", "output");
/// let mut network = builder.build()?;
/// network.start()?;
/// ```
pub struct NetworkBuilder {
    registry: ComponentRegistry,
    nodes: Vec<NodeDecl>,
    edges: Vec<EdgeDecl>,
    iips: Vec<IipDecl>,
    captures: Vec<CaptureDecl>,
    host_inputs: Vec<HostInputDecl>,
    /// Socket indices assigned in call order across edges, IIPs, and host
    /// inputs
    attachments: HashMap<String, InputAttachments>,
}

impl NetworkBuilder {
    pub fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry,
            nodes: Vec::new(),
            edges: Vec::new(),
            iips: Vec::new(),
            captures: Vec::new(),
            host_inputs: Vec::new(),
            attachments: HashMap::new(),
        }
    }

    /// Add a node instantiating `component`
    pub fn node(mut self, id: impl Into<String>, component: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        self.nodes.push(NodeDecl {
            id: id.into(),
            component: component.into(),
            tx,
            rx,
        });
        self
    }

    /// Connect an output port to a downstream input port. Feedback edges
    /// are legal.
    pub fn connect(
        mut self,
        from: impl Into<String>,
        from_port: impl Into<String>,
        to: impl Into<String>,
        to_port: impl Into<String>,
    ) -> Self {
        let to = to.into();
        let to_port = to_port.into();
        let socket = self.attach(&to, &to_port);
        self.edges.push(EdgeDecl {
            from: from.into(),
            from_port: from_port.into(),
            to,
            to_port,
            socket,
        });
        self
    }

    /// Attach a constant packet, delivered once at start under the default
    /// vnid
    pub fn iip(mut self, node: impl Into<String>, port: impl Into<String>, value: Value) -> Self {
        let node = node.into();
        let port = port.into();
        let socket = self.attach(&node, &port);
        self.iips.push(IipDecl {
            node,
            port,
            value,
            socket,
        });
        self
    }

    /// Attach an observer to a node's `output` or `error` port. Counts as
    /// an attached socket, so the node emits rather than logging.
    pub fn capture(&mut self, node: impl Into<String>, port: impl Into<String>) -> OutputCapture {
        let (tx, rx) = mpsc::unbounded_channel();
        self.captures.push(CaptureDecl {
            node: node.into(),
            port: port.into(),
            tx,
        });
        OutputCapture { rx }
    }

    /// Attach a host-driven input feed to a declared node. The node must
    /// already be declared because the handle wraps its mailbox.
    pub fn input(
        &mut self,
        node: impl Into<String>,
        port: impl Into<String>,
    ) -> Result<InputHandle> {
        let node = node.into();
        let port = port.into();
        let tx = self
            .nodes
            .iter()
            .find(|decl| decl.id == node)
            .map(|decl| decl.tx.clone())
            .ok_or_else(|| EngineError::UnknownNode(node.clone()))?;
        let socket = self.attach(&node, &port);
        self.host_inputs.push(HostInputDecl {
            node: node.clone(),
            port: port.clone(),
        });
        Ok(InputHandle {
            node,
            port,
            socket,
            tx,
        })
    }

    fn attach(&mut self, node: &str, port: &str) -> usize {
        self.attachments
            .entry(node.to_string())
            .or_default()
            .attach(port)
    }

    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut descriptors: HashMap<&str, &ComponentDescriptor> = HashMap::new();

        for decl in &self.nodes {
            if !seen.insert(&decl.id) {
                errors.push(ValidationError::DuplicateNode {
                    node: decl.id.clone(),
                });
                continue;
            }
            match self.registry.get_descriptor(&decl.component) {
                Some(descriptor) => {
                    descriptors.insert(&decl.id, descriptor);
                    if self.registry.get_wrapper(&decl.component).is_none() {
                        errors.push(ValidationError::MissingWrapper {
                            node: decl.id.clone(),
                        });
                    }
                }
                None => errors.push(ValidationError::UnknownComponent {
                    node: decl.id.clone(),
                    component: decl.component.clone(),
                }),
            }
        }

        let check_input = |errors: &mut Vec<ValidationError>, context: String, node: &str, port: &str| {
            match descriptors.get(node) {
                None if !seen.contains(node) => errors.push(ValidationError::UnknownNode {
                    context,
                    node: node.to_string(),
                }),
                Some(descriptor) if descriptor.input_port(port).is_none() => {
                    errors.push(ValidationError::UnknownPort {
                        context,
                        node: node.to_string(),
                        port: port.to_string(),
                    });
                }
                _ => {}
            }
        };

        for edge in &self.edges {
            let context = format!(
                "edge '{}.{} -> {}.{}'",
                edge.from, edge.from_port, edge.to, edge.to_port
            );
            if !seen.contains(edge.from.as_str()) {
                errors.push(ValidationError::UnknownNode {
                    context: context.clone(),
                    node: edge.from.clone(),
                });
            } else if edge.from_port != PORT_OUTPUT && edge.from_port != PORT_ERROR {
                errors.push(ValidationError::UnknownPort {
                    context: context.clone(),
                    node: edge.from.clone(),
                    port: edge.from_port.clone(),
                });
            }
            check_input(&mut errors, context, &edge.to, &edge.to_port);
        }

        for iip in &self.iips {
            let context = format!("iip into '{}.{}'", iip.node, iip.port);
            check_input(&mut errors, context, &iip.node, &iip.port);
        }

        for host in &self.host_inputs {
            let context = format!("input feed into '{}.{}'", host.node, host.port);
            check_input(&mut errors, context, &host.node, &host.port);
        }

        for capture in &self.captures {
            let context = format!("capture on '{}.{}'", capture.node, capture.port);
            if !seen.contains(capture.node.as_str()) {
                errors.push(ValidationError::UnknownNode {
                    context,
                    node: capture.node.clone(),
                });
            } else if capture.port != PORT_OUTPUT && capture.port != PORT_ERROR {
                errors.push(ValidationError::UnknownPort {
                    context,
                    node: capture.node.clone(),
                    port: capture.port.clone(),
                });
            }
        }

        errors
    }

    /// Validate the graph and assemble a stopped [`Network`].
    ///
    /// Every problem found is reported, not just the first.
    pub fn build(mut self) -> Result<Network> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(EngineError::Validation(
                errors.iter().map(ToString::to_string).collect(),
            ));
        }

        let metrics = Arc::new(EngineMetrics::new());
        let senders: HashMap<String, mpsc::UnboundedSender<NodeMessage>> = self
            .nodes
            .iter()
            .map(|decl| (decl.id.clone(), decl.tx.clone()))
            .collect();

        let mut handles = HashMap::new();
        let mut order = Vec::new();
        let mut drivers = Vec::new();

        for decl in self.nodes {
            let descriptor = self
                .registry
                .get_descriptor(&decl.component)
                .cloned()
                .ok_or_else(|| EngineError::UnknownComponent(decl.component.clone()))?;
            let wrapper = self
                .registry
                .get_wrapper(&decl.component)
                .ok_or(EngineError::MissingWrapper)?;

            let mut output_port = OutputPort::new(&decl.id, PORT_OUTPUT);
            let mut error_port = OutputPort::new(&decl.id, PORT_ERROR);
            for edge in self.edges.iter().filter(|e| e.from == decl.id) {
                let tx = senders
                    .get(&edge.to)
                    .cloned()
                    .ok_or_else(|| EngineError::UnknownNode(edge.to.clone()))?;
                let socket = Arc::new(ChannelSocket {
                    node: edge.to.clone(),
                    port: edge.to_port.clone(),
                    socket: edge.socket,
                    tx,
                });
                if edge.from_port == PORT_ERROR {
                    error_port.attach(socket);
                } else {
                    output_port.attach(socket);
                }
            }
            for capture in self.captures.iter().filter(|c| c.node == decl.id) {
                let socket = Arc::new(CaptureSocket {
                    tx: capture.tx.clone(),
                });
                if capture.port == PORT_ERROR {
                    error_port.attach(socket);
                } else {
                    output_port.attach(socket);
                }
            }

            let core = Arc::new(NodeCore {
                id: decl.id.clone(),
                descriptor,
                store: Mutex::new(VniStore::new(&decl.id, metrics.clone())),
                attachments: self.attachments.remove(&decl.id).unwrap_or_default(),
                metrics: NodeMetrics::new(),
                output_port,
                error_port,
            });

            drivers.push(NodeDriver::with_mailbox(
                core.clone(),
                wrapper,
                Arc::new(AllInputs),
                decl.tx.clone(),
                decl.rx,
            ));
            order.push(decl.id.clone());
            handles.insert(
                decl.id.clone(),
                NodeHandle {
                    id: decl.id,
                    core,
                    tx: decl.tx,
                },
            );
        }

        Ok(Network {
            run_id: Uuid::new_v4(),
            metrics,
            handles,
            order,
            drivers: Some(drivers),
            tasks: Vec::new(),
            iips: self.iips,
        })
    }
}

/// Introspection and injection surface for one running node
pub struct NodeHandle {
    id: String,
    core: Arc<NodeCore>,
    tx: mpsc::UnboundedSender<NodeMessage>,
}

impl NodeHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// VNIs currently alive on the node
    pub fn vni_count(&self) -> usize {
        self.core.store.lock().len()
    }

    /// Snapshot of the output record for one vnid
    pub fn output_state(&self, vnid: &str) -> Option<StateRecord> {
        self.core.store.lock().get(vnid).map(|vni| vni.output.clone())
    }

    /// Snapshot of the error record for one vnid
    pub fn error_state(&self, vnid: &str) -> Option<StateRecord> {
        self.core.store.lock().get(vnid).map(|vni| vni.error.clone())
    }

    pub fn metrics(&self) -> &NodeMetrics {
        &self.core.metrics
    }

    /// Deliver a record to an input port, as socket 0.
    ///
    /// Ad-hoc injection for hosts and tests; regular feeds should go
    /// through [`NetworkBuilder::input`] so fan-in indices line up.
    pub fn send(&self, port: impl Into<String>, record: StateRecord) -> Result<()> {
        let port = port.into();
        self.tx
            .send(NodeMessage::Deliver(Packet {
                port: port.clone(),
                socket: 0,
                record,
            }))
            .map_err(|_| EngineError::SendFailed {
                node: self.id.clone(),
                port,
            })
    }
}

/// A validated pipeline, stopped until [`start`](Self::start) is called
pub struct Network {
    run_id: Uuid,
    metrics: Arc<EngineMetrics>,
    handles: HashMap<String, NodeHandle>,
    order: Vec<String>,
    drivers: Option<Vec<NodeDriver>>,
    tasks: Vec<JoinHandle<()>>,
    iips: Vec<IipDecl>,
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("run_id", &self.run_id)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

impl Network {
    /// Spawn every node driver, then deliver the IIP constants in
    /// declaration order. Idempotent.
    pub fn start(&mut self) -> Result<()> {
        let Some(drivers) = self.drivers.take() else {
            return Ok(());
        };
        let nodes = drivers.len();
        for driver in drivers {
            self.tasks.push(tokio::spawn(driver.run()));
        }
        log::info!("network {}: started {nodes} nodes", self.run_id);

        for iip in &self.iips {
            let record =
                StateRecord::with_data(DEFAULT_VNID, iip.value.clone(), next_lm());
            let handle = self
                .handles
                .get(&iip.node)
                .ok_or_else(|| EngineError::UnknownNode(iip.node.clone()))?;
            handle
                .tx
                .send(NodeMessage::Deliver(Packet {
                    port: iip.port.clone(),
                    socket: iip.socket,
                    record,
                }))
                .map_err(|_| EngineError::SendFailed {
                    node: iip.node.clone(),
                    port: iip.port.clone(),
                })?;
        }
        Ok(())
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn node(&self, id: &str) -> Option<&NodeHandle> {
        self.handles.get(id)
    }

    /// Network-wide gauges shared by every node's store
    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Stop every driver and log the run's counters
    pub async fn shutdown(mut self) {
        for handle in self.handles.values() {
            let _ = handle.tx.send(NodeMessage::Stop);
        }
        for task in self.tasks.drain(..) {
            if let Err(err) = task.await {
                log::error!("network {}: driver task failed: {err}", self.run_id);
            }
        }
        for id in &self.order {
            if let Some(handle) = self.handles.get(id) {
                let metrics = handle.metrics();
                log::info!(
                    "{}: {} packets, {} updates, {} errors",
                    id,
                    metrics.packets(),
                    metrics.updates(),
                    metrics.errors()
                );
            }
        }
        log::info!(
            "network {}: stopped ({} live VNIs, {} default)",
            self.run_id,
            self.metrics.total_vnis(),
            self.metrics.total_default_vnis()
        );
    }
}
