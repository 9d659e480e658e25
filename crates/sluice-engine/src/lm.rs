//! Logical modification stamps
//!
//! Every state record carries an `Lm` issued by a process-wide clock.
//! Stamps are strictly increasing and collision-free, so comparing two of
//! them answers "did this state really change" without inspecting payloads.
//! The wire form is `LM<millis>.<seq>` with the sequence zero-padded to 17
//! digits, kept for log and fixture compatibility.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Width of the zero-padded sequence field in the wire form
const SEQ_WIDTH: usize = 17;

/// A logical modification stamp: wall-clock milliseconds plus a
/// disambiguating sequence number for stamps issued within one millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lm {
    millis: u64,
    seq: u64,
}

impl Lm {
    /// Construct a stamp from raw parts (fixtures and tests)
    pub fn from_parts(millis: u64, seq: u64) -> Self {
        Self { millis, seq }
    }

    /// Milliseconds component
    pub fn millis(&self) -> u64 {
        self.millis
    }

    /// Sequence component
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for Lm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LM{}.{:0width$}", self.millis, self.seq, width = SEQ_WIDTH)
    }
}

/// Error parsing an `Lm` from its wire form
#[derive(Debug, Error)]
#[error("invalid lm literal: {0}")]
pub struct ParseLmError(String);

impl FromStr for Lm {
    type Err = ParseLmError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bad = || ParseLmError(s.to_string());
        let rest = s.strip_prefix("LM").ok_or_else(bad)?;
        let (millis, seq) = rest.split_once('.').ok_or_else(bad)?;
        Ok(Self {
            millis: millis.parse().map_err(|_| bad())?,
            seq: seq.parse().map_err(|_| bad())?,
        })
    }
}

impl Serialize for Lm {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Lm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct LmVisitor;

        impl Visitor<'_> for LmVisitor {
            type Value = Lm;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an LM<millis>.<seq> string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Lm, E> {
                v.parse().map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(LmVisitor)
    }
}

struct ClockInner {
    last_millis: u64,
    seq: u64,
}

/// Issues strictly increasing stamps.
///
/// A fresh millisecond resets the sequence; repeated calls within one
/// millisecond (or after the wall clock steps backwards) keep the last
/// millisecond and bump the sequence, so ordering never regresses.
pub struct LmClock {
    inner: Mutex<ClockInner>,
}

impl LmClock {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ClockInner {
                last_millis: 0,
                seq: 0,
            }),
        }
    }

    /// Issue the next stamp
    pub fn next(&self) -> Lm {
        let now = unix_millis();
        let mut inner = self.inner.lock();
        if now > inner.last_millis {
            inner.last_millis = now;
            inner.seq = 0;
        } else {
            inner.seq += 1;
        }
        Lm {
            millis: inner.last_millis,
            seq: inner.seq,
        }
    }
}

impl Default for LmClock {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

static CLOCK: Lazy<LmClock> = Lazy::new(LmClock::new);

/// Issue the next stamp from the process-wide clock
pub fn next_lm() -> Lm {
    CLOCK.next()
}
