//! JSON parsing component

use async_trait::async_trait;
use serde_json::Value;
use sluice_engine::{
    Category, ComponentDescriptor, PortArg, PortSpec, Updater, UpdaterContext, UpdaterError,
};

/// Parses a string payload as JSON
pub struct ParseJson;

impl ParseJson {
    pub const NAME: &'static str = "sluice/parse-json";
    pub const PORT_INPUT: &'static str = "input";

    pub fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor::new(Self::NAME, Category::Processing)
            .describe("Parses a string as JSON")
            .input(PortSpec::required(Self::PORT_INPUT).describe("JSON formatted string"))
    }
}

inventory::submit!(sluice_engine::DescriptorFn(ParseJson::descriptor));

#[async_trait]
impl Updater for ParseJson {
    async fn update(
        &self,
        _ctx: &UpdaterContext,
        args: Vec<PortArg>,
    ) -> Result<Option<Value>, UpdaterError> {
        match args.first().and_then(|arg| arg.single()) {
            Some(Value::String(text)) => Ok(Some(serde_json::from_str(text)?)),
            Some(other) => Err(UpdaterError::with_payload(
                "parse-json requires a string input",
                other.clone(),
            )),
            None => Err(UpdaterError::msg("parse-json requires a string input")),
        }
    }
}
