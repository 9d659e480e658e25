//! Component registry for dynamic node resolution
//!
//! Maps component name strings to descriptors and wrapper factories so
//! networks can be assembled from data (graph files, host calls) instead
//! of a hardcoded match over component types.
//!
//! # Usage
//!
//! ```ignore
//! use sluice_engine::{ComponentRegistry, FnWrapper};
//!
//! let mut registry = ComponentRegistry::new();
//! registry.register_updater(descriptor, my_updater);
//!
//! // Hand to NetworkBuilder, which resolves node component names here
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::descriptor::{Category, ComponentDescriptor};
use crate::wrapper::{FnWrapper, Updater, UpdaterWrapper, WrapperFactory};

/// A registration entry combining a descriptor with an optional wrapper
/// factory. Metadata-only entries list in the palette but cannot be
/// instantiated.
struct RegistryEntry {
    descriptor: ComponentDescriptor,
    factory: Option<Arc<dyn WrapperFactory>>,
}

/// Registry of components with their descriptors and wrapper factories
///
/// Registries compose by merging, so a host can layer plugin components
/// over the builtin set:
///
/// ```ignore
/// let mut registry = ComponentRegistry::new();
/// sluice_components::register_builtins(&mut registry);
/// registry.merge(plugin_registry);
/// ```
pub struct ComponentRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a component with its descriptor and a wrapper factory
    pub fn register(&mut self, descriptor: ComponentDescriptor, factory: Arc<dyn WrapperFactory>) {
        self.entries.insert(
            descriptor.name.clone(),
            RegistryEntry {
                descriptor,
                factory: Some(factory),
            },
        );
    }

    /// Register a component backed by a plain updater behind the stock
    /// wrapper. Covers most components; split/join/transform components
    /// use [`register`](Self::register) with their own factory.
    pub fn register_updater(
        &mut self,
        descriptor: ComponentDescriptor,
        updater: impl Updater + 'static,
    ) {
        let updater: Arc<dyn Updater> = Arc::new(updater);
        self.register(
            descriptor,
            Arc::new(move || {
                Arc::new(FnWrapper::new(updater.clone())) as Arc<dyn UpdaterWrapper>
            }),
        );
    }

    /// Register a descriptor with no wrapper (palette listing only)
    pub fn register_metadata(&mut self, descriptor: ComponentDescriptor) {
        self.entries.insert(
            descriptor.name.clone(),
            RegistryEntry {
                descriptor,
                factory: None,
            },
        );
    }

    pub fn get_descriptor(&self, component: &str) -> Option<&ComponentDescriptor> {
        self.entries.get(component).map(|e| &e.descriptor)
    }

    pub fn all_descriptors(&self) -> Vec<&ComponentDescriptor> {
        self.entries.values().map(|e| &e.descriptor).collect()
    }

    /// Descriptors grouped for palette display
    pub fn descriptors_by_category(&self) -> HashMap<Category, Vec<&ComponentDescriptor>> {
        let mut grouped: HashMap<Category, Vec<&ComponentDescriptor>> = HashMap::new();
        for entry in self.entries.values() {
            grouped
                .entry(entry.descriptor.category)
                .or_default()
                .push(&entry.descriptor);
        }
        grouped
    }

    /// Build a fresh wrapper for a component, if one was registered
    pub fn get_wrapper(&self, component: &str) -> Option<Arc<dyn UpdaterWrapper>> {
        self.entries
            .get(component)
            .and_then(|e| e.factory.as_ref())
            .map(|f| f.create_wrapper())
    }

    pub fn has_component(&self, component: &str) -> bool {
        self.entries.contains_key(component)
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Merge another registry into this one. Entries from `other` win on
    /// name collisions.
    pub fn merge(&mut self, other: ComponentRegistry) {
        self.entries.extend(other.entries);
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::descriptor::PortSpec;
    use crate::wrapper::SyncCallbackUpdater;

    fn sample_descriptor(name: &str) -> ComponentDescriptor {
        ComponentDescriptor::new(name, Category::Processing)
            .input(PortSpec::required("input"))
    }

    #[test]
    fn test_registered_component_resolves_descriptor_and_wrapper() {
        let mut registry = ComponentRegistry::new();
        registry.register_updater(
            sample_descriptor("sluice/echo"),
            SyncCallbackUpdater::new(|_| Ok(Some(json!("hi")))),
        );

        assert!(registry.has_component("sluice/echo"));
        assert_eq!(
            registry.get_descriptor("sluice/echo").map(|d| d.name.as_str()),
            Some("sluice/echo")
        );
        assert!(registry.get_wrapper("sluice/echo").is_some());
        assert!(registry.get_wrapper("sluice/missing").is_none());
    }

    #[test]
    fn test_metadata_only_entry_has_no_wrapper() {
        let mut registry = ComponentRegistry::new();
        registry.register_metadata(sample_descriptor("sluice/palette-only"));

        assert!(registry.has_component("sluice/palette-only"));
        assert!(registry.get_wrapper("sluice/palette-only").is_none());
    }

    #[test]
    fn test_merge_prefers_the_incoming_entry() {
        let mut base = ComponentRegistry::new();
        base.register_metadata(sample_descriptor("sluice/dup"));

        let mut overlay = ComponentRegistry::new();
        overlay.register_updater(
            sample_descriptor("sluice/dup"),
            SyncCallbackUpdater::new(|_| Ok(None)),
        );

        base.merge(overlay);
        assert!(base.get_wrapper("sluice/dup").is_some());
        assert_eq!(base.component_names(), vec!["sluice/dup"]);
    }

    #[test]
    fn test_descriptors_group_by_category() {
        let mut registry = ComponentRegistry::new();
        registry.register_metadata(sample_descriptor("sluice/a"));
        registry.register_metadata(ComponentDescriptor::new("sluice/b", Category::Control));

        let grouped = registry.descriptors_by_category();
        assert_eq!(grouped[&Category::Processing].len(), 1);
        assert_eq!(grouped[&Category::Control].len(), 1);
    }
}
