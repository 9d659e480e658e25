//! And-gate component
//!
//! Waits until every attached edge has sent input, then forwards the
//! received values as one payload: a lone distinct value goes out as
//! itself, several go out as an array in socket order.

use async_trait::async_trait;
use serde_json::Value;
use sluice_engine::{
    Category, ComponentDescriptor, PortArg, PortSpec, Updater, UpdaterContext, UpdaterError,
};

pub struct AndGate;

impl AndGate {
    pub const NAME: &'static str = "sluice/and-gate";
    pub const PORT_INPUT: &'static str = "input";

    pub fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor::new(Self::NAME, Category::Control)
            .describe("Waits for all connected edges to send input, then returns the values")
            .input(
                PortSpec::required(Self::PORT_INPUT)
                    .addressable()
                    .describe("Fan-in of the values to gate on"),
            )
    }
}

inventory::submit!(sluice_engine::DescriptorFn(AndGate::descriptor));

#[async_trait]
impl Updater for AndGate {
    async fn update(
        &self,
        ctx: &UpdaterContext,
        args: Vec<PortArg>,
    ) -> Result<Option<Value>, UpdaterError> {
        let values: Vec<Value> = match args.first() {
            Some(arg) => arg.values().into_iter().cloned().collect(),
            None => Vec::new(),
        };
        if values.is_empty() {
            return Ok(None);
        }

        // distinct values, first occurrence wins the slot
        let mut distinct: Vec<Value> = Vec::new();
        for value in values {
            if !distinct.contains(&value) {
                distinct.push(value);
            }
        }
        log::debug!("{}: and gate returning {distinct:?}", ctx.node_id());

        if distinct.len() == 1 {
            Ok(distinct.pop())
        } else {
            Ok(Some(Value::Array(distinct)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::testing::context_for;

    #[tokio::test]
    async fn test_distinct_values_come_back_as_an_array() {
        let ctx = context_for(AndGate::descriptor());
        let result = AndGate
            .update(
                &ctx,
                vec![PortArg::Sockets(vec![
                    Some(json!("a")),
                    Some(json!("b")),
                    Some(json!("c")),
                ])],
            )
            .await
            .unwrap();
        assert_eq!(result, Some(json!(["a", "b", "c"])));
    }

    #[tokio::test]
    async fn test_identical_values_collapse_to_one() {
        let ctx = context_for(AndGate::descriptor());
        let result = AndGate
            .update(
                &ctx,
                vec![PortArg::Sockets(vec![Some(json!("go")), Some(json!("go"))])],
            )
            .await
            .unwrap();
        assert_eq!(result, Some(json!("go")));
    }

    #[tokio::test]
    async fn test_no_values_yield_nothing() {
        let ctx = context_for(AndGate::descriptor());
        let result = AndGate
            .update(&ctx, vec![PortArg::Sockets(vec![None, None])])
            .await
            .unwrap();
        assert_eq!(result, None);
    }
}
