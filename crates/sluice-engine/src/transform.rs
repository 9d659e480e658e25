//! Transform wrapper
//!
//! A three-stage pipeline around one async transformation: shape the
//! extracted arguments into a stage input, run the stage, then shape the
//! stage result before it lands on the output record. Both shaping hooks
//! default to identity, so a plain transformation only implements
//! [`Transform::transform`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::UpdaterError;
use crate::wrapper::{PortArg, UpdaterContext, UpdaterWrapper};

#[async_trait]
pub trait Transform: Send + Sync {
    /// Shape the extracted arguments into the stage input. Defaults to
    /// the first argument's payload.
    fn preprocess(
        &self,
        _ctx: &UpdaterContext,
        args: &[PortArg],
    ) -> std::result::Result<Value, UpdaterError> {
        Ok(args
            .first()
            .and_then(|arg| arg.single().cloned())
            .unwrap_or(Value::Null))
    }

    /// The transformation itself
    async fn transform(
        &self,
        ctx: &UpdaterContext,
        input: Value,
    ) -> std::result::Result<Value, UpdaterError>;

    /// Shape the stage result before it lands on the output record.
    /// Returning `None` suppresses output for this run.
    fn postprocess(
        &self,
        _ctx: &UpdaterContext,
        output: Value,
    ) -> std::result::Result<Option<Value>, UpdaterError> {
        Ok(Some(output))
    }
}

pub struct TransformWrapper {
    transform: Arc<dyn Transform>,
}

impl TransformWrapper {
    pub fn new(transform: Arc<dyn Transform>) -> Self {
        Self { transform }
    }
}

#[async_trait]
impl UpdaterWrapper for TransformWrapper {
    async fn run_updater(&self, ctx: &UpdaterContext) -> std::result::Result<(), UpdaterError> {
        let snapshot = ctx.snapshot_args();
        let input = self.transform.preprocess(ctx, &snapshot.args)?;
        let output = self.transform.transform(ctx, input).await?;
        if let Some(data) = self.transform.postprocess(ctx, output)? {
            ctx.write_result(&snapshot, data);
        }
        Ok(())
    }
}
