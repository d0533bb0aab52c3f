//! Unified error hierarchy for liftrs
//!
//! Separates client-input failures (decode, mismatch) from recoverable
//! progression skips and persistence failures, and maps each to a severity
//! for the tracing system.

use thiserror::Error;

/// Top-level error type for all liftrs operations
#[derive(Debug, Error)]
pub enum LiftRsError {
    /// Malformed field identifier or value in a partial update
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Referenced plan, week, day or exercise does not exist
    #[error("Mismatch error: {0}")]
    Mismatch(#[from] MismatchError),

    /// Progression engine errors
    #[error("Progression error: {0}")]
    Progression(#[from] ProgressionError),

    /// Document store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Field identifier decoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Identifier contains non-ASCII characters
    #[error("Field identifier is not ASCII: {field}")]
    NotAscii { field: String },

    /// A literal part of the identifier is missing or wrong
    #[error("Malformed field identifier {field}: expected '{expected}' at offset {offset}")]
    MalformedIdentifier {
        field: String,
        expected: &'static str,
        offset: usize,
    },

    /// Non-numeric character where a digit is expected
    #[error("Invalid digit in field identifier {field} at offset {offset}: '{found}'")]
    InvalidDigit {
        field: String,
        offset: usize,
        found: char,
    },

    /// Day number or exercise ordinal of zero
    #[error("Field identifier {field} uses index 0; days and exercises start at 1")]
    ZeroIndex { field: String },

    /// Attribute suffix not part of the protocol
    #[error("Unknown attribute '{suffix}' in field identifier {field}")]
    UnknownAttribute { field: String, suffix: String },

    /// Value cannot be converted to the attribute's type
    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Errors for references that do not resolve in the plan
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MismatchError {
    /// Plan does not belong to the user
    #[error("Training plan not found: {plan_id}")]
    PlanNotFound { plan_id: String },

    /// Week index past the end of the plan
    #[error("Week {week} out of range (plan has {weeks} weeks)")]
    WeekOutOfRange { week: usize, weeks: usize },

    /// Day index past the end of the week
    #[error("Day {day} out of range (week has {days} days)")]
    DayOutOfRange { day: usize, days: usize },

    /// Field identifier addresses another day than the request
    #[error("Field addresses day {found} but the request edits day {expected}")]
    DayMismatch { expected: usize, found: usize },

    /// Field update targets an exercise that does not exist
    #[error("Exercise {ordinal} does not exist (day has {exercises} exercises)")]
    ExerciseNotFound { ordinal: usize, exercises: usize },

    /// Creating the exercise would leave a hole in the sequence
    #[error("Cannot create exercise {ordinal}: day has only {exercises} exercises")]
    OrdinalGap { ordinal: usize, exercises: usize },
}

/// Progression engine errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressionError {
    /// Target RPE that is neither a number nor a number list
    #[error("Unparsable target RPE '{value}'")]
    UnparsableRpe { value: String },

    /// Invalid parameter
    #[error("Invalid progression parameter: {parameter}={value}")]
    InvalidParameter { parameter: String, value: String },
}

/// Document store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// No document for this user id
    #[error("User not found: {user_id}")]
    UserNotFound { user_id: String },

    /// Backend failure (connection, query, task)
    #[error("Store backend failure: {reason}")]
    Backend { reason: String },

    /// Document could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type alias for liftrs operations
pub type Result<T> = std::result::Result<T, LiftRsError>;

impl LiftRsError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LiftRsError::Store(StoreError::Backend { .. })
                | LiftRsError::Store(StoreError::Sqlite(_))
                | LiftRsError::Io(_)
        )
    }

    /// Client input errors are returned to the editing client verbatim
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            LiftRsError::Decode(_) | LiftRsError::Mismatch(_) | LiftRsError::Validation(_)
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            LiftRsError::Decode(_) => ErrorSeverity::Warning,
            LiftRsError::Mismatch(_) => ErrorSeverity::Warning,
            LiftRsError::Validation(_) => ErrorSeverity::Warning,
            LiftRsError::Progression(ProgressionError::UnparsableRpe { .. }) => ErrorSeverity::Info,
            LiftRsError::Progression(_) => ErrorSeverity::Warning,
            LiftRsError::Store(StoreError::UserNotFound { .. }) => ErrorSeverity::Warning,
            LiftRsError::Store(_) => ErrorSeverity::Error,
            LiftRsError::Internal(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            LiftRsError::Decode(err) => {
                format!("The submitted changes could not be read: {}", err)
            }
            LiftRsError::Mismatch(MismatchError::PlanNotFound { .. }) => {
                "This training plan no longer exists.".to_string()
            }
            LiftRsError::Mismatch(err) => {
                format!("The plan changed while you were editing it: {}", err)
            }
            LiftRsError::Store(StoreError::Backend { .. } | StoreError::Sqlite(_)) => {
                "Unable to save your training data. Please try again.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
    /// Informational message
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}
