//! Ports and sockets
//!
//! The seam between the engine and whatever host delivers packets. The
//! engine only ever pushes records into [`OutputSocket`]s attached to an
//! [`OutputPort`]; the in-process host in `network` attaches sockets that
//! feed downstream mailboxes, and tests attach capturing sockets.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::state::StateRecord;

/// A record arriving at one input position of a node
#[derive(Debug, Clone)]
pub struct Packet {
    pub port: String,
    pub socket: usize,
    pub record: StateRecord,
}

/// One attached downstream consumer of an output port
pub trait OutputSocket: Send + Sync {
    /// Hand one record to the consumer
    fn deliver(&self, record: StateRecord) -> Result<()>;

    /// Frame boundary after a transmission. The channel host treats every
    /// delivery as complete, so the default does nothing; framed hosts
    /// override it.
    fn end_frame(&self) {}
}

/// An output port and whatever is attached to it
pub struct OutputPort {
    node_id: String,
    name: String,
    sockets: Vec<Arc<dyn OutputSocket>>,
}

impl OutputPort {
    pub fn new(node_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            name: name.into(),
            sockets: Vec::new(),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attach(&mut self, socket: Arc<dyn OutputSocket>) {
        self.sockets.push(socket);
    }

    /// Number of attached downstream sockets
    pub fn attached(&self) -> usize {
        self.sockets.len()
    }

    /// Send one record to every attached socket.
    ///
    /// Every socket is attempted even if one fails; the first failure is
    /// returned so the caller can log it.
    pub fn send(&self, record: &StateRecord) -> Result<()> {
        let mut first_failure = Ok(());
        for socket in &self.sockets {
            let outcome = socket.deliver(record.clone());
            if outcome.is_err() && first_failure.is_ok() {
                first_failure = outcome;
            }
        }
        first_failure
    }

    /// Mark the end of a transmission on every socket
    pub fn disconnect(&self) {
        for socket in &self.sockets {
            socket.end_frame();
        }
    }
}

/// Static input attachment bookkeeping for one node.
///
/// Socket indices are assigned in attachment order per port, and the
/// per-port totals size the fan-in alignment of addressable reads.
#[derive(Debug, Clone, Default)]
pub struct InputAttachments {
    counts: HashMap<String, usize>,
}

impl InputAttachments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more attachment on `port`, returning the socket index it
    /// was assigned
    pub fn attach(&mut self, port: &str) -> usize {
        let count = self.counts.entry(port.to_string()).or_insert(0);
        let index = *count;
        *count += 1;
        index
    }

    /// Sockets currently attached to `port`
    pub fn attached(&self, port: &str) -> usize {
        self.counts.get(port).copied().unwrap_or(0)
    }

    /// Ports with at least one attachment
    pub fn attached_ports(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(port, count)| (port.as_str(), *count))
    }
}
