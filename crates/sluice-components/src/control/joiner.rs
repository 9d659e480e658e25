//! Joiner component
//!
//! Closes a fan-out episode. The join wrapper it runs behind matches each
//! contribution to the hash that opened the episode and emits once every
//! key has reported; the updater validates the hash and hands the wrapper
//! the contribution to collect.
//!
//! # Ports
//! - `vnid_hash` (required) - the hash that opened the episode, straight
//!   from the node that feeds the splitter
//! - `input` (required) - per-entry contributions coming back around

use async_trait::async_trait;
use serde_json::{json, Value};
use sluice_engine::{
    Category, ComponentDescriptor, PortArg, PortSpec, Updater, UpdaterContext, UpdaterError,
};

pub struct Joiner;

impl Joiner {
    pub const NAME: &'static str = "sluice/joiner";
    pub const PORT_VNID_HASH: &'static str = "vnid_hash";
    pub const PORT_INPUT: &'static str = "input";

    pub fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor::new(Self::NAME, Category::Control)
            .describe("Joins split records back into a single hash once every entry reports")
            .input(
                PortSpec::required(Self::PORT_VNID_HASH)
                    .describe("Hash that opened the episode"),
            )
            .input(PortSpec::required(Self::PORT_INPUT).describe("Per-entry contributions"))
    }
}

inventory::submit!(sluice_engine::DescriptorFn(Joiner::descriptor));

#[async_trait]
impl Updater for Joiner {
    async fn update(
        &self,
        _ctx: &UpdaterContext,
        args: Vec<PortArg>,
    ) -> Result<Option<Value>, UpdaterError> {
        let hash = match args.first().and_then(|arg| arg.single()) {
            Some(Value::Object(hash)) if !hash.is_empty() => Value::Object(hash.clone()),
            _ => {
                return Err(UpdaterError::msg(
                    "Joiner requires a vnid hash parameter!",
                ))
            }
        };
        let input = args
            .get(1)
            .and_then(|arg| arg.single())
            .cloned()
            .unwrap_or(Value::Null);
        Ok(Some(json!({"vnid_hash": hash, "input": input})))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::testing::context_for;

    #[tokio::test]
    async fn test_returns_hash_and_contribution() {
        let ctx = context_for(Joiner::descriptor());
        let args = vec![
            PortArg::Single(Some(json!({"1": "one"}))),
            PortArg::Single(Some(json!("ONE"))),
        ];
        assert_eq!(
            Joiner.update(&ctx, args).await.unwrap(),
            Some(json!({"vnid_hash": {"1": "one"}, "input": "ONE"}))
        );
    }

    #[tokio::test]
    async fn test_missing_hash_is_rejected() {
        let ctx = context_for(Joiner::descriptor());
        let args = vec![PortArg::Single(None), PortArg::Single(Some(json!("ONE")))];
        assert_eq!(
            Joiner.update(&ctx, args).await.unwrap_err().to_string(),
            "Joiner requires a vnid hash parameter!"
        );
    }
}
