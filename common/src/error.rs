use thiserror::Error;

/// Failures surfaced by the scheduling engine and its persistence codec.
///
/// Expected conditions are always reported through this enum, never by
/// panicking. Lock and hardware failures are transient; callers decide
/// whether and when to retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The engine has not completed a successful `begin()` yet.
    #[error("not initialized - call begin() first")]
    NotInitialized,

    /// The engine lock could not be acquired within the bounded wait.
    #[error("engine lock unavailable")]
    LockUnavailable,

    /// A caller-supplied value was malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The schedule set is already at capacity.
    #[error("maximum number of schedules reached")]
    CapacityExceeded,

    /// No schedule with the given id exists.
    #[error("schedule {0} not found")]
    NotFound(u8),

    /// No enabled schedule has an upcoming start to arm an alarm for.
    #[error("no upcoming schedule start")]
    NoUpcomingEvent,

    /// Persisted data does not start with the expected magic bytes.
    #[error("persisted data has an invalid magic number")]
    BadMagic,

    /// Persisted data was written by an unknown format version.
    #[error("unsupported persistence format version {0}")]
    UnsupportedVersion(u8),

    /// Persisted data claims more schedules than the engine can hold.
    #[error("persisted schedule count {0} exceeds capacity")]
    TooManySchedules(u8),

    /// A UTC epoch predating 2000-01-01 was supplied.
    #[error("UTC epoch {0} predates 2000-01-01")]
    InvalidEpoch(u32),

    /// Applying the UTC offset produced a wall-clock year the hardware
    /// cannot represent.
    #[error("offset conversion produced out-of-range year {0}")]
    InvalidConversion(i32),

    /// The underlying clock peripheral transaction failed.
    #[error("clock hardware failure: {0}")]
    Hardware(String),
}

pub type Result<T> = std::result::Result<T, Error>;
