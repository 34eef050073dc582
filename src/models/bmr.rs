//! Data types returned by the BMR HC64 controller.
//!
//! Nothing here talks to the device; decoding from the wire lives in
//! `crate::protocol`.

use chrono::NaiveDateTime;
use serde::Serialize;

/// Index of a heating circuit (room) on the controller, starting at 0.
pub type CircuitId = u8;

/// Snapshot of a single heating circuit as reported by `/wholeRoom`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitStatus {
    pub id: CircuitId,
    pub enabled: bool,
    pub name: String,
    /// Measured temperature in °C.
    pub temperature: Option<f64>,
    pub target_temperature: Option<f64>,
    /// Offset currently applied by the user on the room unit.
    pub user_offset: Option<f64>,
    pub max_offset: Option<f64>,
    pub heating: bool,
    /// Water-based circuits only.
    pub cooling: bool,
    /// Assigned to low mode and low mode is active.
    pub low_mode: bool,
    /// Assigned to summer mode and summer mode is active.
    pub summer_mode: bool,
    /// Negative values are device sentinels such as `-01`.
    pub warning: i16,
}

/// State of the controller-wide LOW (reduced temperature) mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LowMode {
    pub enabled: bool,
    pub temperature: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDateTime>,
}

/// Membership of each circuit in a mode group (summer or low), indexed by
/// circuit id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Assignments(pub Vec<bool>);

impl Assignments {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Circuits currently included in the group.
    pub fn assigned(&self) -> impl Iterator<Item = CircuitId> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, v)| **v)
            .filter_map(|(i, _)| CircuitId::try_from(i).ok())
    }
}

impl From<Vec<bool>> for Assignments {
    fn from(value: Vec<bool>) -> Self {
        Assignments(value)
    }
}
