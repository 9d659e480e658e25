//! Splitter component
//!
//! Opens a fan-out episode from a hash keyed by vnid. The updater only
//! validates the hash; the split wrapper it runs behind sends one record
//! per entry downstream, all stamped with the episode's group stamp.
//!
//! # Ports
//! - `vnid_hash` (required) - object mapping vnids to their payloads

use async_trait::async_trait;
use serde_json::Value;
use sluice_engine::{
    Category, ComponentDescriptor, PortArg, PortSpec, Updater, UpdaterContext, UpdaterError,
};

pub struct Splitter;

impl Splitter {
    pub const NAME: &'static str = "sluice/splitter";
    pub const PORT_VNID_HASH: &'static str = "vnid_hash";

    pub fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor::new(Self::NAME, Category::Control)
            .describe("Splits a hash of vnids and values into one record per entry")
            .input(
                PortSpec::required(Self::PORT_VNID_HASH)
                    .describe("Object mapping vnids to payloads"),
            )
    }
}

inventory::submit!(sluice_engine::DescriptorFn(Splitter::descriptor));

#[async_trait]
impl Updater for Splitter {
    async fn update(
        &self,
        _ctx: &UpdaterContext,
        args: Vec<PortArg>,
    ) -> Result<Option<Value>, UpdaterError> {
        match args.first().and_then(|arg| arg.single()) {
            Some(Value::Object(hash)) if !hash.is_empty() => {
                Ok(Some(Value::Object(hash.clone())))
            }
            _ => Err(UpdaterError::msg(
                "Splitter requires a vnid hash parameter!",
            )),
        }
    }
}
