//! Write content component
//!
//! Writes its input to a file and emits the absolute path of what it
//! wrote. Strings go to disk verbatim; any other payload is serialized
//! as JSON first. Transient, so a pipeline fanning writes across many
//! vnids does not accumulate a slice per file.
//!
//! # Ports
//! - `filename` (required) - path of the file to write
//! - `data` (required) - content to write

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use sluice_engine::{
    Category, ComponentDescriptor, PortArg, PortSpec, Updater, UpdaterContext, UpdaterError,
};
use tokio::fs;

pub struct WriteContent;

impl WriteContent {
    pub const NAME: &'static str = "sluice/write-content";
    pub const PORT_FILENAME: &'static str = "filename";
    pub const PORT_DATA: &'static str = "data";

    pub fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor::new(Self::NAME, Category::Storage)
            .describe("Writes content to a file and returns the absolute path written")
            .transient()
            .input(PortSpec::required(Self::PORT_FILENAME).describe("Path of the file to write"))
            .input(PortSpec::required(Self::PORT_DATA).describe("Content to write"))
    }
}

inventory::submit!(sluice_engine::DescriptorFn(WriteContent::descriptor));

#[async_trait]
impl Updater for WriteContent {
    async fn update(
        &self,
        ctx: &UpdaterContext,
        args: Vec<PortArg>,
    ) -> Result<Option<Value>, UpdaterError> {
        let filename = match args.first().and_then(|arg| arg.single()) {
            Some(Value::String(name)) if !name.is_empty() => name.clone(),
            _ => {
                return Err(UpdaterError::msg(
                    "Write content component requires a file name!",
                ))
            }
        };
        let text = match args.get(1).and_then(|arg| arg.single()) {
            None => return Ok(None),
            Some(Value::String(text)) => text.clone(),
            Some(other) => serde_json::to_string_pretty(other)?,
        };

        log::debug!(
            "{}: writing {} bytes to '{filename}'",
            ctx.node_id(),
            text.len()
        );
        fs::write(&filename, text.as_bytes())
            .await
            .map_err(|e| UpdaterError::msg(format!("Failed to write file '{filename}': {e}")))?;
        let absolute = fs::canonicalize(&filename)
            .await
            .unwrap_or_else(|_| PathBuf::from(&filename));
        Ok(Some(json!(absolute.to_string_lossy())))
    }
}
