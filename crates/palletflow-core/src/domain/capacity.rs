//! Capacity policy: how many more pallets a location can take.

use serde::{Deserialize, Serialize};

use super::errors::{LogisticsError, LogisticsResult};

/// Free space at a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Space {
    /// No declared capacity (production lines, delivery points).
    Unlimited,
    Pallets(u32),
}

impl Space {
    /// `capacity − load`, never below zero.
    pub fn available(capacity: Option<u32>, load: u32) -> Self {
        match capacity {
            Some(cap) if cap > 0 => Space::Pallets(cap.saturating_sub(load)),
            _ => Space::Unlimited,
        }
    }

    /// Fails with `CapacityExceeded` when `requested` does not fit.
    pub fn ensure(self, location: &str, requested: u32) -> LogisticsResult<()> {
        match self {
            Space::Pallets(free) if requested > free => Err(LogisticsError::CapacityExceeded {
                location: location.to_string(),
                requested,
                available: free,
            }),
            _ => Ok(()),
        }
    }

    pub fn as_pallets(self) -> Option<u32> {
        match self {
            Space::Unlimited => None,
            Space::Pallets(n) => Some(n),
        }
    }
}
