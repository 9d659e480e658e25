//! Output dispatch
//!
//! The last step of every scheduling pass: decide whether a computed record
//! actually goes downstream. Emission needs a real change (the stamp moved)
//! or an error to report; anything else is suppressed so identical state
//! never ripples through the pipeline twice.

use crate::lm::Lm;
use crate::port::OutputPort;
use crate::state::StateRecord;

/// Forward `record` downstream if it changed since `last_lm` or carries an
/// error. Unattached ports log the record instead of sending. Returns
/// whether a send happened.
pub fn handle_output(port: &OutputPort, last_lm: Option<Lm>, record: &StateRecord) -> bool {
    if last_lm == record.lm && !record.is_errored() {
        return false;
    }
    if port.attached() == 0 {
        log::debug!(
            "{}: '{}' unattached, not forwarding {}",
            port.node_id(),
            port.name(),
            summarize(record)
        );
        return false;
    }
    emit(port, record)
}

/// Forward an error record, deduplicating repeats: a payload identical to
/// the previous one keeps the previous stamp so the same failure is
/// reported once. Terminal (unattached) errors are logged at error
/// severity so they stay observable.
pub fn handle_error(port: &OutputPort, previous: &StateRecord, record: &mut StateRecord) -> bool {
    if record.data.is_some() && previous.data.is_some() && record.data == previous.data {
        record.lm = previous.lm;
    }
    if record.lm == previous.lm && !record.is_errored() {
        return false;
    }
    if port.attached() == 0 {
        if record.data.is_some() {
            log::error!("{}: unconsumed error: {}", port.node_id(), summarize(record));
        }
        return false;
    }
    emit(port, record)
}

fn emit(port: &OutputPort, record: &StateRecord) -> bool {
    match port.send(record) {
        Ok(()) => {
            port.disconnect();
            log::debug!(
                "{}: sent {} on '{}'",
                port.node_id(),
                summarize(record),
                port.name()
            );
            true
        }
        Err(err) => {
            log::error!(
                "{}: delivery on '{}' failed: {err}",
                port.node_id(),
                port.name()
            );
            false
        }
    }
}

fn summarize(record: &StateRecord) -> String {
    serde_json::to_string(record).unwrap_or_else(|_| format!("{record:?}"))
}
