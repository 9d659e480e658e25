//! Component descriptors
//!
//! A descriptor is the single source of truth for a component: its name,
//! its declared input ports in *positional order* (the order updater
//! arguments are extracted in), and its flags. Nothing in the engine
//! inspects updater signatures; the descriptor is the parameter mapping.

use serde::{Deserialize, Serialize};

/// Standing output port present on every node
pub const PORT_OUTPUT: &str = "output";
/// Standing error port present on every node
pub const PORT_ERROR: &str = "error";

/// Category for palette grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Processing,
    Control,
    Storage,
    System,
}

/// Metadata for a single input or output port
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortSpec {
    /// Port identifier (edge endpoints and arg extraction use this)
    pub name: String,
    /// Description of what flows through the port
    pub description: String,
    /// Whether gating waits for this port once it has attached sockets
    pub required: bool,
    /// Whether the port fans in (one record per attached socket)
    pub addressable: bool,
}

impl PortSpec {
    pub fn new(name: impl Into<String>, required: bool, addressable: bool) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            required,
            addressable,
        }
    }

    /// A required single-socket port
    pub fn required(name: impl Into<String>) -> Self {
        Self::new(name, true, false)
    }

    /// An optional single-socket port
    pub fn optional(name: impl Into<String>) -> Self {
        Self::new(name, false, false)
    }

    /// Accept several attached sockets, one record slot each
    pub fn addressable(mut self) -> Self {
        self.addressable = true;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Complete metadata for a component type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDescriptor {
    /// Unique name (e.g. "sluice/funnel")
    pub name: String,
    pub description: String,
    pub category: Category,
    /// Destroy a vnid's state bundle after it successfully emits
    pub transient: bool,
    /// Declared input ports, in updater-argument order
    pub inputs: Vec<PortSpec>,
    /// Output ports; the standing `output` and `error` ports always exist
    pub outputs: Vec<PortSpec>,
}

impl ComponentDescriptor {
    /// A descriptor with the standing output ports and nothing else
    pub fn new(name: impl Into<String>, category: Category) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            category,
            transient: false,
            inputs: Vec::new(),
            outputs: vec![
                PortSpec::optional(PORT_OUTPUT).describe("Computed state records"),
                PortSpec::optional(PORT_ERROR).describe("Error state records"),
            ],
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    /// Append a declared input port; call order fixes argument order
    pub fn input(mut self, port: PortSpec) -> Self {
        self.inputs.push(port);
        self
    }

    /// Append an extra output port beyond the standing pair
    pub fn output(mut self, port: PortSpec) -> Self {
        self.outputs.push(port);
        self
    }

    pub fn input_port(&self, name: &str) -> Option<&PortSpec> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output_port(&self, name: &str) -> Option<&PortSpec> {
        self.outputs.iter().find(|p| p.name == name)
    }
}

/// Link-time registration of a component descriptor.
///
/// Component crates submit one of these per component so hosts can list
/// the palette without constructing wrappers:
///
/// ```ignore
/// inventory::submit!(sluice_engine::DescriptorFn(descriptor));
/// ```
pub struct DescriptorFn(pub fn() -> ComponentDescriptor);

inventory::collect!(DescriptorFn);

/// All descriptors submitted at link time
pub fn collected_descriptors() -> Vec<ComponentDescriptor> {
    inventory::iter::<DescriptorFn>
        .into_iter()
        .map(|f| (f.0)())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_carries_standing_ports() {
        let descriptor = ComponentDescriptor::new("sluice/example", Category::Processing);
        assert!(descriptor.output_port(PORT_OUTPUT).is_some());
        assert!(descriptor.output_port(PORT_ERROR).is_some());
        assert!(descriptor.inputs.is_empty());
        assert!(!descriptor.transient);
    }

    #[test]
    fn test_input_order_is_declaration_order() {
        let descriptor = ComponentDescriptor::new("sluice/example", Category::Processing)
            .input(PortSpec::required("command"))
            .input(PortSpec::optional("args"))
            .input(PortSpec::required("stdin").addressable());
        let names: Vec<_> = descriptor.inputs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["command", "args", "stdin"]);
        assert!(descriptor.input_port("stdin").unwrap().addressable);
        assert!(!descriptor.input_port("args").unwrap().required);
    }

    #[test]
    fn test_descriptor_serialization_is_camel_case() {
        let descriptor = ComponentDescriptor::new("sluice/example", Category::Control)
            .transient()
            .input(PortSpec::required("input"));
        let json = serde_json::to_string(&descriptor).unwrap();
        assert!(json.contains("\"transient\":true"));
        assert!(json.contains("\"addressable\":false"));
        assert!(json.contains("\"category\":\"control\""));
    }
}
