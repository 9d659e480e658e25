//! Execute command component
//!
//! Runs a shell command and emits `{code, stdout, stderr}`. A non-zero
//! exit is still a normal result; only failing to launch the shell at
//! all lands on the error channel. Transient.
//!
//! # Ports
//! - `command` (required) - command line passed to `sh -c`
//! - `args` (optional) - string or array of strings appended to the
//!   command line

use async_trait::async_trait;
use serde_json::{json, Value};
use sluice_engine::{
    Category, ComponentDescriptor, PortArg, PortSpec, Updater, UpdaterContext, UpdaterError,
};
use tokio::process::Command;

pub struct ExecCommand;

impl ExecCommand {
    pub const NAME: &'static str = "sluice/exec-command";
    pub const PORT_COMMAND: &'static str = "command";
    pub const PORT_ARGS: &'static str = "args";

    pub fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor::new(Self::NAME, Category::System)
            .describe("Runs a shell command and returns its exit code and captured output")
            .transient()
            .input(PortSpec::required(Self::PORT_COMMAND).describe("Command line to run"))
            .input(PortSpec::optional(Self::PORT_ARGS).describe("Extra arguments to append"))
    }
}

inventory::submit!(sluice_engine::DescriptorFn(ExecCommand::descriptor));

fn append_args(command: &mut String, args: &Value) -> Result<(), UpdaterError> {
    match args {
        Value::Null => Ok(()),
        Value::String(extra) => {
            if !extra.is_empty() {
                command.push(' ');
                command.push_str(extra);
            }
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                match item.as_str() {
                    Some(extra) => {
                        command.push(' ');
                        command.push_str(extra);
                    }
                    None => {
                        return Err(UpdaterError::with_payload(
                            "exec-command args must be strings",
                            item.clone(),
                        ))
                    }
                }
            }
            Ok(())
        }
        other => Err(UpdaterError::with_payload(
            "exec-command args must be a string or an array of strings",
            other.clone(),
        )),
    }
}

#[async_trait]
impl Updater for ExecCommand {
    async fn update(
        &self,
        ctx: &UpdaterContext,
        args: Vec<PortArg>,
    ) -> Result<Option<Value>, UpdaterError> {
        let mut command_line = match args.first().and_then(|arg| arg.single()) {
            Some(Value::String(command)) if !command.is_empty() => command.clone(),
            _ => {
                return Err(UpdaterError::msg(
                    "Execute command component requires a command to execute!",
                ))
            }
        };
        if let Some(extra) = args.get(1).and_then(|arg| arg.single()) {
            append_args(&mut command_line, extra)?;
        }

        log::debug!("{}: executing '{command_line}'", ctx.node_id());
        let output = Command::new("sh")
            .arg("-c")
            .arg(&command_line)
            .output()
            .await
            .map_err(|e| {
                UpdaterError::msg(format!("Failed to execute '{command_line}': {e}"))
            })?;

        Ok(Some(json!({
            "code": output.status.code(),
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::testing::context_for;

    async fn run(command: Value, extra: Option<Value>) -> Value {
        let ctx = context_for(ExecCommand::descriptor());
        let args = vec![PortArg::Single(Some(command)), PortArg::Single(extra)];
        ExecCommand.update(&ctx, args).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_captures_stdout_and_exit_code() {
        let result = run(json!("echo hello"), None).await;
        assert_eq!(result["code"], json!(0));
        assert_eq!(result["stdout"], json!("hello\n"));
        assert_eq!(result["stderr"], json!(""));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_a_normal_result() {
        let result = run(json!("exit 3"), None).await;
        assert_eq!(result["code"], json!(3));
    }

    #[tokio::test]
    async fn test_captures_stderr() {
        let result = run(json!("echo oops >&2"), None).await;
        assert_eq!(result["stderr"], json!("oops\n"));
    }

    #[tokio::test]
    async fn test_array_args_are_appended() {
        let result = run(json!("echo"), Some(json!(["a", "b"]))).await;
        assert_eq!(result["stdout"], json!("a b\n"));
    }

    #[tokio::test]
    async fn test_missing_command_is_rejected() {
        let ctx = context_for(ExecCommand::descriptor());
        let args = vec![PortArg::Single(None), PortArg::Single(None)];
        assert_eq!(
            ExecCommand.update(&ctx, args).await.unwrap_err().to_string(),
            "Execute command component requires a command to execute!"
        );
    }
}
