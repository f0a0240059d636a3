//! Ephemeral port selection.

use rand::Rng;
use serde::Deserialize;

/// Inclusive range of ports a session may listen on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PortRange {
    pub min: u16,
    pub max: u16,
}

impl PortRange {
    pub const fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.min..=self.max).contains(&port)
    }

    /// Non-empty and above the reserved zero port.
    pub fn is_valid(&self) -> bool {
        self.min > 0 && self.min <= self.max
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self::new(4000, 8000)
    }
}

/// Picks listening ports at random from a fixed range.
///
/// The port is not probed; a taken port surfaces as a bind error when the
/// session starts and is not retried here.
#[derive(Debug, Clone, Copy)]
pub struct PortAllocator {
    range: PortRange,
}

impl PortAllocator {
    pub fn new(range: PortRange) -> Self {
        Self { range }
    }

    pub fn range(&self) -> PortRange {
        self.range
    }

    pub fn allocate(&self) -> u16 {
        rand::thread_rng().gen_range(self.range.min..=self.range.max)
    }
}
