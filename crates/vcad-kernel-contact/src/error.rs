//! Error types for contact handling.

use thiserror::Error;

/// Errors raised while configuring contact resolution.
///
/// Solving itself never fails; it always runs its fixed iteration budget.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContactError {
    /// Solver or material configuration could not be parsed or is out of range.
    #[error("invalid contact config: {0}")]
    Config(String),

    /// Joint limit with lower bound above upper bound.
    #[error("joint {joint}: lower limit {lower} is above upper limit {upper}")]
    InvalidLimit {
        /// Joint name.
        joint: String,
        /// Lower bound.
        lower: f64,
        /// Upper bound.
        upper: f64,
    },
}
