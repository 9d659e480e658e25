//! Runtime counters
//!
//! Lightweight atomics mirroring what operators ask first when a pipeline
//! misbehaves: how many VNIs are alive, how often each node ran, how often
//! it failed, and how long its updater takes. Read through the network and
//! node handles; logged once at shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Network-wide gauges
#[derive(Debug, Default)]
pub struct EngineMetrics {
    vnis: AtomicU64,
    default_vnis: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn vni_created(&self, default_vnid: bool) {
        self.vnis.fetch_add(1, Ordering::Relaxed);
        if default_vnid {
            self.default_vnis.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn vni_destroyed(&self, default_vnid: bool) {
        self.vnis.fetch_sub(1, Ordering::Relaxed);
        if default_vnid {
            self.default_vnis.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// VNIs currently alive across the network
    pub fn total_vnis(&self) -> u64 {
        self.vnis.load(Ordering::Relaxed)
    }

    /// Alive VNIs holding the default vnid
    pub fn total_default_vnis(&self) -> u64 {
        self.default_vnis.load(Ordering::Relaxed)
    }
}

/// Per-node counters
#[derive(Debug, Default)]
pub struct NodeMetrics {
    packets: AtomicU64,
    updates: AtomicU64,
    errors: AtomicU64,
    update_micros: AtomicU64,
}

impl NodeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn packet_seen(&self) {
        self.packets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn update_finished(&self, elapsed: Duration, failed: bool) {
        self.updates.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        self.update_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Packets delivered to the node
    pub fn packets(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }

    /// Updater invocations that settled (successes and failures)
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// Updater invocations that settled with an error
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Mean updater wall time, if anything ran
    pub fn average_update_time(&self) -> Option<Duration> {
        let updates = self.updates();
        if updates == 0 {
            return None;
        }
        let micros = self.update_micros.load(Ordering::Relaxed);
        Some(Duration::from_micros(micros / updates))
    }
}
