//! Processing components
//!
//! Components that transform a payload in place: forwarders, string and
//! JSON manipulation.

mod parse_json;
mod pointer;
mod repeat;
mod stringify_json;
mod to_upper_case;

pub use parse_json::ParseJson;
pub use pointer::JsonPointer;
pub use repeat::Repeat;
pub use stringify_json::StringifyJson;
pub use to_upper_case::ToUpperCase;
