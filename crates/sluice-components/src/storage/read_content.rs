//! Read content component
//!
//! Reads a file into a string state. Only utf-8 content is supported;
//! the optional `encoding` port exists so pipelines can declare their
//! expectation and fail loudly on anything else.
//!
//! # Ports
//! - `filename` (required) - path of the file to read
//! - `encoding` (optional) - must name utf-8 when present

use async_trait::async_trait;
use serde_json::Value;
use sluice_engine::{
    Category, ComponentDescriptor, PortArg, PortSpec, Updater, UpdaterContext, UpdaterError,
};
use tokio::fs;

pub struct ReadContent;

impl ReadContent {
    pub const NAME: &'static str = "sluice/read-content";
    pub const PORT_FILENAME: &'static str = "filename";
    pub const PORT_ENCODING: &'static str = "encoding";

    pub fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor::new(Self::NAME, Category::Storage)
            .describe("Reads file content into a string state")
            .input(PortSpec::required(Self::PORT_FILENAME).describe("Path of the file to read"))
            .input(PortSpec::optional(Self::PORT_ENCODING).describe("Expected text encoding"))
    }
}

inventory::submit!(sluice_engine::DescriptorFn(ReadContent::descriptor));

#[async_trait]
impl Updater for ReadContent {
    async fn update(
        &self,
        ctx: &UpdaterContext,
        args: Vec<PortArg>,
    ) -> Result<Option<Value>, UpdaterError> {
        let filename = match args.first().and_then(|arg| arg.single()) {
            Some(Value::String(name)) if !name.is_empty() => name.clone(),
            _ => {
                return Err(UpdaterError::msg(
                    "Read content component requires a file name!",
                ))
            }
        };
        match args.get(1).and_then(|arg| arg.single()) {
            None | Some(Value::Null) => {}
            Some(Value::String(enc))
                if enc.eq_ignore_ascii_case("utf-8") || enc.eq_ignore_ascii_case("utf8") => {}
            Some(other) => {
                return Err(UpdaterError::with_payload(
                    "read-content supports only utf-8 content",
                    other.clone(),
                ))
            }
        }

        log::debug!("{}: reading '{filename}'", ctx.node_id());
        let content = fs::read_to_string(&filename)
            .await
            .map_err(|e| UpdaterError::msg(format!("Failed to read file '{filename}': {e}")))?;
        Ok(Some(Value::String(content)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::tempdir;

    use crate::testing::context_for;

    #[tokio::test]
    async fn test_reads_an_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("content.txt");
        {
            let mut file = std::fs::File::create(&path).unwrap();
            write!(file, "hello from disk").unwrap();
        }

        let ctx = context_for(ReadContent::descriptor());
        let args = vec![
            PortArg::Single(Some(json!(path.to_string_lossy()))),
            PortArg::Single(None),
        ];
        assert_eq!(
            ReadContent.update(&ctx, args).await.unwrap(),
            Some(json!("hello from disk"))
        );
    }

    #[tokio::test]
    async fn test_missing_file_reports_the_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.txt");

        let ctx = context_for(ReadContent::descriptor());
        let args = vec![
            PortArg::Single(Some(json!(path.to_string_lossy()))),
            PortArg::Single(None),
        ];
        let err = ReadContent.update(&ctx, args).await.unwrap_err();
        assert!(err.to_string().contains("absent.txt"));
    }

    #[tokio::test]
    async fn test_missing_filename_is_rejected() {
        let ctx = context_for(ReadContent::descriptor());
        let args = vec![PortArg::Single(None), PortArg::Single(None)];
        assert_eq!(
            ReadContent.update(&ctx, args).await.unwrap_err().to_string(),
            "Read content component requires a file name!"
        );
    }

    #[tokio::test]
    async fn test_unsupported_encoding_is_rejected() {
        let ctx = context_for(ReadContent::descriptor());
        let args = vec![
            PortArg::Single(Some(json!("whatever.txt"))),
            PortArg::Single(Some(json!("latin-1"))),
        ];
        let err = ReadContent.update(&ctx, args).await.unwrap_err();
        assert!(err.to_string().contains("utf-8"));
    }
}
