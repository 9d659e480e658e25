//! JSON serialization component

use async_trait::async_trait;
use serde_json::Value;
use sluice_engine::{
    Category, ComponentDescriptor, PortArg, PortSpec, Updater, UpdaterContext, UpdaterError,
};

/// Pretty-prints a JSON payload as a string
pub struct StringifyJson;

impl StringifyJson {
    pub const NAME: &'static str = "sluice/stringify-json";
    pub const PORT_INPUT: &'static str = "input";

    pub fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor::new(Self::NAME, Category::Processing)
            .describe("Stringifies a JSON object")
            .input(PortSpec::required(Self::PORT_INPUT).describe("JSON object"))
    }
}

inventory::submit!(sluice_engine::DescriptorFn(StringifyJson::descriptor));

#[async_trait]
impl Updater for StringifyJson {
    async fn update(
        &self,
        _ctx: &UpdaterContext,
        args: Vec<PortArg>,
    ) -> Result<Option<Value>, UpdaterError> {
        match args.first().and_then(|arg| arg.single()) {
            Some(value) => Ok(Some(Value::String(serde_json::to_string_pretty(value)?))),
            None => Ok(None),
        }
    }
}
