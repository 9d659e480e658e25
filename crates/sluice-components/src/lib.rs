//! Sluice component library
//!
//! Builtin components for sluice pipelines. Each component pairs a
//! descriptor with an updater (or a transform) and submits itself for
//! palette discovery via `inventory`; [`register_builtins`] wires the
//! whole set into a [`ComponentRegistry`].
//!
//! # Categories
//!
//! - **Processing**: data shaping (JSON parsing, casing, pointer projection)
//! - **Control**: gates, queues, and split/join endpoints
//! - **Storage**: file reads and writes
//! - **System**: shell command execution

pub mod control;
pub mod processing;
pub mod storage;
pub mod system;

// Re-export all components for convenience
pub use control::*;
pub use processing::*;
pub use storage::*;
pub use system::*;

use std::sync::Arc;

use sluice_engine::{
    ComponentRegistry, FnWrapper, JoinWrapper, SplitWrapper, TransformWrapper, UpdaterWrapper,
};

/// Register every builtin component.
///
/// Plain components share one stateless updater behind the stock wrapper.
/// The funnel, splitter and joiner get a fresh wrapper per node so queue
/// and episode state stays node-local; the pointer runs behind the
/// transform wrapper.
pub fn register_builtins(registry: &mut ComponentRegistry) {
    registry.register_updater(Repeat::descriptor(), Repeat);
    registry.register_updater(ToUpperCase::descriptor(), ToUpperCase);
    registry.register_updater(ParseJson::descriptor(), ParseJson);
    registry.register_updater(StringifyJson::descriptor(), StringifyJson);
    registry.register_updater(AndGate::descriptor(), AndGate);
    registry.register_updater(ReadContent::descriptor(), ReadContent);
    registry.register_updater(WriteContent::descriptor(), WriteContent);
    registry.register_updater(ExecCommand::descriptor(), ExecCommand);
    registry.register(
        Funnel::descriptor(),
        Arc::new(|| Arc::new(FnWrapper::new(Arc::new(Funnel::new()))) as Arc<dyn UpdaterWrapper>),
    );
    registry.register(
        Splitter::descriptor(),
        Arc::new(|| Arc::new(SplitWrapper::new(Arc::new(Splitter))) as Arc<dyn UpdaterWrapper>),
    );
    registry.register(
        Joiner::descriptor(),
        Arc::new(|| Arc::new(JoinWrapper::new(Arc::new(Joiner))) as Arc<dyn UpdaterWrapper>),
    );
    registry.register(
        JsonPointer::descriptor(),
        Arc::new(|| {
            Arc::new(TransformWrapper::new(Arc::new(JsonPointer))) as Arc<dyn UpdaterWrapper>
        }),
    );
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use sluice_engine::port::{InputAttachments, OutputPort};
    use sluice_engine::vni::VniStore;
    use sluice_engine::wrapper::NodeCore;
    use sluice_engine::{
        ComponentDescriptor, EngineMetrics, NodeMetrics, StateRecord, UpdaterContext, PORT_ERROR,
        PORT_OUTPUT,
    };

    /// Context over an empty store, for driving updaters directly
    pub(crate) fn context_for(descriptor: ComponentDescriptor) -> UpdaterContext {
        let node_id = "test-node";
        let core = Arc::new(NodeCore {
            id: node_id.to_string(),
            descriptor,
            store: Mutex::new(VniStore::new(node_id, Arc::new(EngineMetrics::new()))),
            attachments: InputAttachments::new(),
            metrics: NodeMetrics::new(),
            output_port: OutputPort::new(node_id, PORT_OUTPUT),
            error_port: OutputPort::new(node_id, PORT_ERROR),
        });
        UpdaterContext::new(core, String::new(), StateRecord::new(""))
    }
}

#[cfg(test)]
mod tests {
    use sluice_engine::{collected_descriptors, ComponentRegistry};

    use super::register_builtins;

    #[test]
    fn test_inventory_collects_all_builtins() {
        let names: Vec<String> = collected_descriptors()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names.len(), 12, "Expected 12 built-in components");

        // Spot-check known names
        assert!(names.iter().any(|n| n == "sluice/repeat"));
        assert!(names.iter().any(|n| n == "sluice/to-upper-case"));
        assert!(names.iter().any(|n| n == "sluice/funnel"));
        assert!(names.iter().any(|n| n == "sluice/splitter"));
        assert!(names.iter().any(|n| n == "sluice/joiner"));
        assert!(names.iter().any(|n| n == "sluice/pointer"));
        assert!(names.iter().any(|n| n == "sluice/exec-command"));
    }

    #[test]
    fn test_every_builtin_is_registered_with_a_wrapper() {
        let mut registry = ComponentRegistry::new();
        register_builtins(&mut registry);
        for descriptor in collected_descriptors() {
            assert!(
                registry.get_wrapper(&descriptor.name).is_some(),
                "{} has no wrapper factory",
                descriptor.name
            );
        }
    }
}
