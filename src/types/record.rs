//! Historical operating points

use chrono::NaiveDateTime;

/// One row of the historical table, split by variable role.
///
/// Read-only once derived; the response is kept for reporting and is never
/// an optimizer input.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestepRecord {
    pub timestamp: NaiveDateTime,
    /// Last known controllable values, in control-variable order
    pub controllable: Vec<f64>,
    /// Noncontrollable context values, in configured order
    pub context: Vec<f64>,
    pub response: Option<f64>,
}
