//! Sluice Engine - reactive state propagation for dataflow pipelines
//!
//! This crate is the scheduling core of a sluice pipeline: components wired
//! into a graph exchange versioned state records, and the engine decides
//! per node and per virtual-node-id (vnid) when enough input has arrived
//! to run the component's updater, how staleness and errors propagate
//! without running it, and when a result is genuinely new. It supports:
//!
//! - Per-vnid state slices, so one wiring processes many entities
//! - Logical-clock versioning (LM stamps) for cheap change detection
//! - Exactly-once updater invocation per qualifying input set
//! - Split/join fan-out with group-stamp correlation
//! - Staleness and error propagation as data, on the standing
//!   `output`/`error` ports every node carries
//!
//! # Architecture
//!
//! Each node runs as an actor draining a mailbox of packet deliveries and
//! updater settlements. State lives in a per-node [`VniStore`](vni::VniStore);
//! wrappers ([`FnWrapper`], [`SplitWrapper`], [`JoinWrapper`],
//! [`TransformWrapper`]) adapt user updaters to the store's bookkeeping.
//! The in-process host in [`network`] wires registered components into a
//! runnable graph.
//!
//! # Example
//!
//! ```ignore
//! use sluice_engine::{ComponentRegistry, NetworkBuilder};
//!
//! let mut registry = ComponentRegistry::new();
//! sluice_components::register_builtins(&mut registry);
//!
//! let mut builder = NetworkBuilder::new(registry)
//!     .node("upper", "sluice/to-upper-case")
//!     .iip("upper", "input", serde_json::json!("hello"));
//! let mut out = builder.capture("upper", "output");
//! let mut network = builder.build()?;
//! network.start()?;
//! ```

pub mod descriptor;
pub mod error;
pub mod input_states;
pub mod join;
pub mod lm;
pub mod metrics;
pub mod network;
pub mod policy;
pub mod port;
pub mod registry;
pub mod split;
pub mod state;
pub mod transform;
pub mod vni;
pub mod wrapper;

mod output;
mod scheduler;

// Re-export key types
pub use descriptor::{
    collected_descriptors, Category, ComponentDescriptor, DescriptorFn, PortSpec, PORT_ERROR,
    PORT_OUTPUT,
};
pub use error::{EngineError, Result, UpdaterError};
pub use join::{JoinConfig, JoinWrapper};
pub use lm::{next_lm, Lm};
pub use metrics::{EngineMetrics, NodeMetrics};
pub use network::{InputHandle, Network, NetworkBuilder, NodeHandle, OutputCapture};
pub use policy::{AllInputs, UpdatePolicy};
pub use registry::ComponentRegistry;
pub use split::SplitWrapper;
pub use state::{Condition, StatePatch, StateRecord, Vnid, DEFAULT_VNID};
pub use transform::{Transform, TransformWrapper};
pub use wrapper::{
    CallbackUpdater, FnWrapper, PortArg, SyncCallbackUpdater, Updater, UpdaterContext,
    UpdaterWrapper, WrapperFactory,
};
