//! Per-VNI input state storage
//!
//! One `InputStates` instance holds the latest record seen on each input
//! position of one VNI. Non-addressable ports keep a single record (the
//! latest of possibly several writers); addressable ports keep one slot
//! per attached socket, aligned with attachment order.

use std::collections::HashMap;

use crate::descriptor::PortSpec;
use crate::state::StateRecord;

/// Records held for one input port
#[derive(Debug, Clone)]
pub enum PortRecords {
    Single(StateRecord),
    Addressable(Vec<Option<StateRecord>>),
}

/// Latest input records for one VNI, keyed by port name
#[derive(Debug, Clone, Default)]
pub struct InputStates {
    ports: HashMap<String, PortRecords>,
}

impl InputStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or clear, when `record` is None) the record at one input
    /// position. Returns the record previously held there; the staleness
    /// step inspects it.
    ///
    /// A port entry disappears entirely once it holds no records, which
    /// re-enables the default-vnid fallback for that port.
    pub fn set(
        &mut self,
        spec: &PortSpec,
        socket: usize,
        record: Option<StateRecord>,
    ) -> Option<StateRecord> {
        if spec.addressable {
            let entry = self
                .ports
                .entry(spec.name.clone())
                .or_insert_with(|| PortRecords::Addressable(Vec::new()));
            if matches!(entry, PortRecords::Single(_)) {
                *entry = PortRecords::Addressable(Vec::new());
            }
            let PortRecords::Addressable(slots) = entry else {
                return None;
            };
            if slots.len() <= socket {
                slots.resize(socket + 1, None);
            }
            let previous = std::mem::replace(&mut slots[socket], record);
            if slots.iter().all(Option::is_none) {
                self.ports.remove(&spec.name);
            }
            previous
        } else {
            match record {
                Some(record) => match self
                    .ports
                    .insert(spec.name.clone(), PortRecords::Single(record))
                {
                    Some(PortRecords::Single(previous)) => Some(previous),
                    _ => None,
                },
                None => match self.ports.remove(&spec.name) {
                    Some(PortRecords::Single(previous)) => Some(previous),
                    _ => None,
                },
            }
        }
    }

    /// Whether any record is stored for the port
    pub fn contains(&self, port: &str) -> bool {
        self.ports.contains_key(port)
    }

    /// The single record stored for a non-addressable port
    pub fn single(&self, port: &str) -> Option<&StateRecord> {
        match self.ports.get(port) {
            Some(PortRecords::Single(record)) => Some(record),
            _ => None,
        }
    }

    /// Records for an addressable port, padded with `None` to the attached
    /// socket count so positions always line up with attachment order
    pub fn sockets(&self, port: &str, attached: usize) -> Option<Vec<Option<&StateRecord>>> {
        match self.ports.get(port) {
            Some(PortRecords::Addressable(slots)) => {
                let mut aligned: Vec<Option<&StateRecord>> =
                    slots.iter().take(attached).map(Option::as_ref).collect();
                aligned.resize(attached, None);
                Some(aligned)
            }
            _ => None,
        }
    }

    /// Every record currently stored, port by port
    pub fn records(&self) -> impl Iterator<Item = &StateRecord> {
        self.ports.values().flat_map(|records| {
            let iter: Box<dyn Iterator<Item = &StateRecord>> = match records {
                PortRecords::Single(record) => Box::new(std::iter::once(record)),
                PortRecords::Addressable(slots) => Box::new(slots.iter().flatten()),
            };
            iter
        })
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}
