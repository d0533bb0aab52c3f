// Library interface for liftrs modules
// This allows integration tests and the CLI to share the core functionality

pub mod clock;
pub mod config;
pub mod error;
pub mod field_update;
pub mod logging;
pub mod models;
pub mod notify;
pub mod progression;
pub mod service;
pub mod session;
pub mod store;

// Re-export commonly used types for convenience
pub use models::*;
pub use clock::{Clock, TokioClock};
pub use config::AppConfig;
pub use error::{LiftRsError, Result};
pub use field_update::{decode_payload, Attribute, FieldId, FieldUpdate};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use notify::{LogNotifier, Notifier};
pub use progression::{apply_progression, ProgressionLimits, ProgressionOptions, ProgressionReport};
pub use service::{NewPlan, TrainingService};
pub use session::{SessionRegistry, SessionTracker};
pub use store::{DocumentStore, InMemoryStore, SqliteStore};
