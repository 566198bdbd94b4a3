pub mod config;
pub mod error;
pub mod events;
pub mod fingerprint;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineErrorKind, Result, ShopsenseError};
pub use events::{Event, EventBus, EventHandler, EventType};
pub use fingerprint::{normalize_query, Fingerprint};
