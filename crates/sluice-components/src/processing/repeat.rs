//! Repeat component
//!
//! Forwards whatever arrives on its input, keeping metadata intact. The
//! pipeline workhorse for fan-out points and for observing a record
//! stream mid-graph.
//!
//! # Ports
//! - `new_data` (required) - payload to forward
//! - `old_data` (optional) - prior payload, kept for pipelines that diff

use async_trait::async_trait;
use serde_json::Value;
use sluice_engine::{
    Category, ComponentDescriptor, PortArg, PortSpec, Updater, UpdaterContext, UpdaterError,
};

pub struct Repeat;

impl Repeat {
    pub const NAME: &'static str = "sluice/repeat";
    pub const PORT_NEW_DATA: &'static str = "new_data";
    pub const PORT_OLD_DATA: &'static str = "old_data";

    pub fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor::new(Self::NAME, Category::Processing)
            .describe("Forwards packets the same way it receives them")
            .transient()
            .input(PortSpec::required(Self::PORT_NEW_DATA).describe("Data to be forwarded"))
            .input(PortSpec::optional(Self::PORT_OLD_DATA).describe("Original data on input"))
    }
}

inventory::submit!(sluice_engine::DescriptorFn(Repeat::descriptor));

#[async_trait]
impl Updater for Repeat {
    async fn update(
        &self,
        _ctx: &UpdaterContext,
        args: Vec<PortArg>,
    ) -> Result<Option<Value>, UpdaterError> {
        Ok(args.first().and_then(|arg| arg.single().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::testing::context_for;

    #[tokio::test]
    async fn test_forwards_the_new_data_argument() {
        let ctx = context_for(Repeat::descriptor());
        let result = Repeat
            .update(
                &ctx,
                vec![
                    PortArg::Single(Some(json!({"a": 1}))),
                    PortArg::Single(Some(json!("stale"))),
                ],
            )
            .await
            .unwrap();
        assert_eq!(result, Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_missing_payload_suppresses_output() {
        let ctx = context_for(Repeat::descriptor());
        let result = Repeat
            .update(&ctx, vec![PortArg::Single(None)])
            .await
            .unwrap();
        assert_eq!(result, None);
    }
}
