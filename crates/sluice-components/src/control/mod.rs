//! Flow-control components: gates, queues, and split/join endpoints

mod and_gate;
mod funnel;
mod joiner;
mod splitter;

pub use and_gate::AndGate;
pub use funnel::Funnel;
pub use joiner::Joiner;
pub use splitter::Splitter;
