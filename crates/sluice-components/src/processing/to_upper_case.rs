//! Upper-case component
//!
//! Upper-cases a string payload. Mostly a pipeline test fixture: simple
//! enough to see through, real enough to exercise per-vnid fan-out.

use async_trait::async_trait;
use serde_json::Value;
use sluice_engine::{
    Category, ComponentDescriptor, PortArg, PortSpec, Updater, UpdaterContext, UpdaterError,
};

pub struct ToUpperCase;

impl ToUpperCase {
    pub const NAME: &'static str = "sluice/to-upper-case";
    pub const PORT_STRING: &'static str = "string";

    pub fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor::new(Self::NAME, Category::Processing)
            .describe("Upper-cases a string input")
            .input(PortSpec::required(Self::PORT_STRING).describe("String to be upper-cased"))
    }
}

inventory::submit!(sluice_engine::DescriptorFn(ToUpperCase::descriptor));

#[async_trait]
impl Updater for ToUpperCase {
    async fn update(
        &self,
        _ctx: &UpdaterContext,
        args: Vec<PortArg>,
    ) -> Result<Option<Value>, UpdaterError> {
        match args.first().and_then(|arg| arg.single()) {
            Some(Value::String(s)) => Ok(Some(Value::String(s.to_uppercase()))),
            _ => Err(UpdaterError::msg(
                "toUppercase requires an input string parameter!",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::testing::context_for;

    #[tokio::test]
    async fn test_uppercases_strings() {
        let ctx = context_for(ToUpperCase::descriptor());
        let result = ToUpperCase
            .update(&ctx, vec![PortArg::Single(Some(json!("one")))])
            .await
            .unwrap();
        assert_eq!(result, Some(json!("ONE")));
    }

    #[tokio::test]
    async fn test_rejects_non_string_payloads() {
        let ctx = context_for(ToUpperCase::descriptor());
        let err = ToUpperCase
            .update(&ctx, vec![PortArg::Single(Some(json!(13)))])
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "toUppercase requires an input string parameter!"
        );
    }

    #[tokio::test]
    async fn test_rejects_missing_payloads() {
        let ctx = context_for(ToUpperCase::descriptor());
        assert!(ToUpperCase
            .update(&ctx, vec![PortArg::Single(None)])
            .await
            .is_err());
    }
}
