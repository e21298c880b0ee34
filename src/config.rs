//! Shared configuration error for the typestate builders (§1c).

/// Returned by a builder's `build()` when an eagerly-validated field is out
/// of range. Builders never panic on bad input; they return this instead.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be non-zero")]
    Zero { field: &'static str },
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: i64 },
    #[error("{field} exceeds its maximum of {max}, got {value}")]
    ExceedsMax {
        field: &'static str,
        value: u64,
        max: u64,
    },
    /// §6: an unrecognised connection-configuration option.
    #[error("unrecognised connection option {0:?}")]
    InvalidOption(String),
}
