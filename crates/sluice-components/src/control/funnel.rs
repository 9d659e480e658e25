//! Funnel component
//!
//! Feeds ids into the pipeline one at a time: the first id goes straight
//! through, later ids queue, and each queued id is released when the id
//! currently in flight comes back on the same port as a completion echo.
//! The released id is also recorded as output metadata so downstream
//! nodes can tell which entity a record belongs to.
//!
//! The input port is intentionally single-socket with two expected
//! attachments: the feed edge and the completion feedback edge. Ids must
//! be unique; a repeated id is treated as its own completion echo.
//!
//! # Ports
//! - `input` (required) - new ids and completion echoes
//! - `metadata_key` (optional) - metadata key for the released id,
//!   `funnelId` when absent

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use sluice_engine::{
    Category, ComponentDescriptor, PortArg, PortSpec, Updater, UpdaterContext, UpdaterError,
};

const DEFAULT_METADATA_KEY: &str = "funnelId";

#[derive(Default)]
struct FunnelState {
    executing: Option<String>,
    queue: VecDeque<String>,
    executed: Vec<String>,
}

pub struct Funnel {
    state: Mutex<FunnelState>,
}

impl Funnel {
    pub const NAME: &'static str = "sluice/funnel";
    pub const PORT_INPUT: &'static str = "input";
    pub const PORT_METADATA_KEY: &'static str = "metadata_key";

    pub fn new() -> Self {
        Self {
            state: Mutex::new(FunnelState::default()),
        }
    }

    pub fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor::new(Self::NAME, Category::Control)
            .describe(
                "Builds a queue of input and feeds each one through the funnel, \
                 waiting for a completion signal before sending the next one",
            )
            .transient()
            .input(PortSpec::required(Self::PORT_INPUT).describe("Ids to queue, and completion echoes"))
            .input(
                PortSpec::optional(Self::PORT_METADATA_KEY)
                    .describe("Metadata key for the id sent downstream"),
            )
    }

    /// Release `id`: stamp it into the output metadata and hand it back
    /// as the updater result.
    fn release(ctx: &UpdaterContext, key: &str, id: String) -> Option<Value> {
        ctx.clear_output_metadata();
        ctx.set_output_metadata(key, Value::String(id.clone()));
        Some(Value::String(id))
    }
}

impl Default for Funnel {
    fn default() -> Self {
        Self::new()
    }
}

inventory::submit!(sluice_engine::DescriptorFn(Funnel::descriptor));

#[async_trait]
impl Updater for Funnel {
    async fn update(
        &self,
        ctx: &UpdaterContext,
        args: Vec<PortArg>,
    ) -> Result<Option<Value>, UpdaterError> {
        let input = match args.first().and_then(|arg| arg.single()) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                log::warn!("{}: funnel ignoring non-string input {other}", ctx.node_id());
                return Ok(None);
            }
            None => return Ok(None),
        };
        let key = match args.get(1).and_then(|arg| arg.single()) {
            None | Some(Value::Null) => DEFAULT_METADATA_KEY.to_string(),
            Some(Value::String(s)) if s.is_empty() => DEFAULT_METADATA_KEY.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(UpdaterError::msg("Funnel requires a metadata key string!")),
        };

        // ids arriving over http carry extraneous surrounding quotes
        let input = input
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(&input)
            .to_string();

        let mut state = self.state.lock();
        if state.executing.as_deref() == Some(&input) {
            log::info!("{}: completed processing id {input}", ctx.node_id());
            state.executed.push(input);
            match state.queue.pop_front() {
                Some(next) => {
                    state.executing = Some(next.clone());
                    log::info!(
                        "{}: funnel sending {next}, {} ids in the queue",
                        ctx.node_id(),
                        state.queue.len()
                    );
                    Ok(Self::release(ctx, &key, next))
                }
                None => {
                    state.executing = None;
                    log::info!(
                        "{}: nothing left in funnel after {} ids",
                        ctx.node_id(),
                        state.executed.len()
                    );
                    Ok(None)
                }
            }
        } else if state.queue.contains(&input) {
            log::warn!("{}: already queued {input}", ctx.node_id());
            Ok(None)
        } else if state.executed.contains(&input) {
            log::warn!("{}: already processed {input}", ctx.node_id());
            Ok(None)
        } else if state.executing.is_none() && !input.is_empty() {
            state.executing = Some(input.clone());
            log::info!("{}: funnel sending {input}", ctx.node_id());
            Ok(Self::release(ctx, &key, input))
        } else {
            if !input.is_empty() {
                state.queue.push_back(input);
                log::info!(
                    "{}: funnel queued input, {} waiting",
                    ctx.node_id(),
                    state.queue.len()
                );
            }
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::testing::context_for;

    fn feed(id: &str) -> Vec<PortArg> {
        vec![PortArg::Single(Some(json!(id))), PortArg::Single(None)]
    }

    #[tokio::test]
    async fn test_first_input_returns_immediately() {
        let ctx = context_for(Funnel::descriptor());
        let funnel = Funnel::new();
        let result = funnel.update(&ctx, feed("un")).await.unwrap();
        assert_eq!(result, Some(json!("un")));
        assert_eq!(ctx.output_state().metadata("funnelId"), Some(&json!("un")));
    }

    #[tokio::test]
    async fn test_second_input_queues_until_completion() {
        let ctx = context_for(Funnel::descriptor());
        let funnel = Funnel::new();

        assert_eq!(funnel.update(&ctx, feed("un")).await.unwrap(), Some(json!("un")));
        assert_eq!(funnel.update(&ctx, feed("deux")).await.unwrap(), None);

        // completion echo of the first id releases the second
        assert_eq!(
            funnel.update(&ctx, feed("un")).await.unwrap(),
            Some(json!("deux"))
        );
        assert_eq!(ctx.output_state().metadata("funnelId"), Some(&json!("deux")));
    }

    #[tokio::test]
    async fn test_three_inputs_release_one_at_a_time() {
        let ctx = context_for(Funnel::descriptor());
        let funnel = Funnel::new();

        assert_eq!(funnel.update(&ctx, feed("un")).await.unwrap(), Some(json!("un")));
        assert_eq!(funnel.update(&ctx, feed("deux")).await.unwrap(), None);
        assert_eq!(funnel.update(&ctx, feed("trois")).await.unwrap(), None);

        assert_eq!(
            funnel.update(&ctx, feed("un")).await.unwrap(),
            Some(json!("deux"))
        );
        assert_eq!(
            funnel.update(&ctx, feed("deux")).await.unwrap(),
            Some(json!("trois"))
        );
        assert_eq!(funnel.update(&ctx, feed("trois")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_queued_id_is_dropped() {
        let ctx = context_for(Funnel::descriptor());
        let funnel = Funnel::new();

        funnel.update(&ctx, feed("un")).await.unwrap();
        assert_eq!(funnel.update(&ctx, feed("deux")).await.unwrap(), None);
        assert_eq!(funnel.update(&ctx, feed("deux")).await.unwrap(), None);

        // finishing "un" must release "deux" exactly once
        assert_eq!(
            funnel.update(&ctx, feed("un")).await.unwrap(),
            Some(json!("deux"))
        );
        assert_eq!(funnel.update(&ctx, feed("deux")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_custom_metadata_key() {
        let ctx = context_for(Funnel::descriptor());
        let funnel = Funnel::new();
        let args = vec![
            PortArg::Single(Some(json!("p-1"))),
            PortArg::Single(Some(json!("patientId"))),
        ];
        assert_eq!(funnel.update(&ctx, args).await.unwrap(), Some(json!("p-1")));
        assert_eq!(ctx.output_state().metadata("patientId"), Some(&json!("p-1")));
    }

    #[tokio::test]
    async fn test_non_string_metadata_key_errors() {
        let ctx = context_for(Funnel::descriptor());
        let funnel = Funnel::new();
        let args = vec![
            PortArg::Single(Some(json!("p-1"))),
            PortArg::Single(Some(json!(42))),
        ];
        assert_eq!(
            funnel.update(&ctx, args).await.unwrap_err().to_string(),
            "Funnel requires a metadata key string!"
        );
    }
}
