//! Basic types shared across tapnet crates

use core::fmt;
use core::ops::Sub;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Input Identifier
// ----------------------------------------------------------------------------

/// Logical identifier of a physical button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InputId(u8);

impl InputId {
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    pub const fn as_u8(&self) -> u8 {
        self.0
    }

    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "input{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Address Family
// ----------------------------------------------------------------------------

/// Address family requested when resolving a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    #[default]
    Ipv4,
    Ipv6,
    Unspecified,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Ipv4 => write!(f, "ipv4"),
            AddressFamily::Ipv6 => write!(f, "ipv6"),
            AddressFamily::Unspecified => write!(f, "unspec"),
        }
    }
}

// ----------------------------------------------------------------------------
// Time
// ----------------------------------------------------------------------------

/// Millisecond timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Sub for Timestamp {
    type Output = u64;

    fn sub(self, other: Timestamp) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

impl Timestamp {
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Milliseconds since the process-wide monotonic epoch
    pub fn now() -> Self {
        use std::sync::OnceLock;
        use std::time::Instant;

        static EPOCH: OnceLock<Instant> = OnceLock::new();
        let epoch = EPOCH.get_or_init(Instant::now);
        Self(epoch.elapsed().as_millis() as u64)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

/// Source of the current time, injectable for deterministic tests
pub trait TimeSource {
    fn now(&self) -> Timestamp;
}

/// Monotonic clock backed by `std::time::Instant`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    pub fn new() -> Self {
        Self
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

impl<T: TimeSource + ?Sized> TimeSource for std::sync::Arc<T> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_difference_saturates() {
        let earlier = Timestamp::new(100);
        let later = Timestamp::new(350);
        assert_eq!(later - earlier, 250);
        assert_eq!(earlier - later, 0);
    }

    #[test]
    fn test_system_time_is_monotonic() {
        let source = SystemTimeSource::new();
        let first = source.now();
        let second = source.now();
        assert!(second >= first);
    }
}
