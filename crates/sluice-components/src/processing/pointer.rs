//! JSON pointer component
//!
//! Projects part of its input through an RFC 6901 pointer, optionally
//! grafting the projection back into the input at a second pointer and
//! returning the whole document. Runs behind the transform wrapper:
//! pointer syntax is checked in `preprocess`, the projection happens in
//! `transform`, and the set path is applied in `postprocess`.
//!
//! # Ports
//! - `input` (required) - document to project from
//! - `get` (required) - pointer selecting the projection
//! - `set` (optional) - pointer to graft the projection at; when present
//!   the output is the whole grafted document

use async_trait::async_trait;
use serde_json::{json, Value};
use sluice_engine::{
    Category, ComponentDescriptor, PortArg, PortSpec, Transform, UpdaterContext, UpdaterError,
};

pub struct JsonPointer;

impl JsonPointer {
    pub const NAME: &'static str = "sluice/pointer";
    pub const PORT_INPUT: &'static str = "input";
    pub const PORT_GET: &'static str = "get";
    pub const PORT_SET: &'static str = "set";

    pub fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor::new(Self::NAME, Category::Processing)
            .describe("Extracts part of the input selected by a JSON pointer")
            .input(PortSpec::required(Self::PORT_INPUT).describe("Document to project from"))
            .input(PortSpec::required(Self::PORT_GET).describe("Pointer to extract"))
            .input(
                PortSpec::optional(Self::PORT_SET)
                    .describe("Pointer to graft the extracted value at"),
            )
    }
}

inventory::submit!(sluice_engine::DescriptorFn(JsonPointer::descriptor));

fn check_pointer(path: &str, port: &str) -> Result<(), UpdaterError> {
    if path.is_empty() || path.starts_with('/') {
        Ok(())
    } else {
        Err(UpdaterError::with_payload(
            format!("json-pointer {port} path must be empty or start with '/'"),
            json!(path),
        ))
    }
}

/// Write `value` at `path`, creating the final object key if needed.
/// `pointer_mut` alone cannot do this: it resolves only locations that
/// already exist.
fn graft(target: &mut Value, path: &str, value: Value) -> Result<(), UpdaterError> {
    if path.is_empty() {
        *target = value;
        return Ok(());
    }
    let split = path.rfind('/').unwrap_or(0);
    let (parent, token) = (&path[..split], &path[split + 1..]);
    let token = token.replace("~1", "/").replace("~0", "~");
    let cannot =
        || UpdaterError::msg(format!("json-pointer cannot set a value at '{path}'"));
    match target.pointer_mut(parent) {
        Some(Value::Object(map)) => {
            map.insert(token, value);
            Ok(())
        }
        Some(Value::Array(items)) => {
            if token == "-" {
                items.push(value);
                return Ok(());
            }
            match token.parse::<usize>() {
                Ok(index) if index < items.len() => {
                    items[index] = value;
                    Ok(())
                }
                Ok(index) if index == items.len() => {
                    items.push(value);
                    Ok(())
                }
                _ => Err(cannot()),
            }
        }
        _ => Err(cannot()),
    }
}

#[async_trait]
impl Transform for JsonPointer {
    fn preprocess(
        &self,
        _ctx: &UpdaterContext,
        args: &[PortArg],
    ) -> Result<Value, UpdaterError> {
        let input = match args.first().and_then(|arg| arg.single()) {
            Some(value) => value.clone(),
            None => return Err(UpdaterError::msg("json-pointer requires an input")),
        };
        let get = match args.get(1).and_then(|arg| arg.single()) {
            Some(Value::String(path)) => path.clone(),
            _ => return Err(UpdaterError::msg("json-pointer requires a get pointer string")),
        };
        check_pointer(&get, "get")?;
        let set = match args.get(2).and_then(|arg| arg.single()) {
            None | Some(Value::Null) => Value::Null,
            Some(Value::String(path)) => {
                check_pointer(path, "set")?;
                json!(path)
            }
            Some(other) => {
                return Err(UpdaterError::with_payload(
                    "json-pointer set path must be a string",
                    other.clone(),
                ))
            }
        };
        Ok(json!({"input": input, "get": get, "set": set}))
    }

    async fn transform(
        &self,
        ctx: &UpdaterContext,
        staged: Value,
    ) -> Result<Value, UpdaterError> {
        let mut staged = match staged {
            Value::Object(map) => map,
            _ => return Ok(Value::Null),
        };
        let input = staged.remove("input").unwrap_or(Value::Null);
        let get = match staged.remove("get") {
            Some(Value::String(path)) => path,
            _ => String::new(),
        };
        let set = staged.remove("set").unwrap_or(Value::Null);
        match input.pointer(&get) {
            Some(hit) => {
                let hit = hit.clone();
                Ok(json!({"hit": hit, "input": input, "set": set}))
            }
            None => {
                log::debug!(
                    "{}: nothing at json pointer '{get}', suppressing output",
                    ctx.node_id()
                );
                Ok(Value::Null)
            }
        }
    }

    fn postprocess(
        &self,
        _ctx: &UpdaterContext,
        output: Value,
    ) -> Result<Option<Value>, UpdaterError> {
        let mut output = match output {
            Value::Object(map) => map,
            // projection miss
            _ => return Ok(None),
        };
        let hit = output.remove("hit").unwrap_or(Value::Null);
        match output.remove("set") {
            Some(Value::String(path)) => {
                let mut document = output.remove("input").unwrap_or(Value::Null);
                graft(&mut document, &path, hit)?;
                Ok(Some(document))
            }
            _ => Ok(Some(hit)),
        }
    }
}
