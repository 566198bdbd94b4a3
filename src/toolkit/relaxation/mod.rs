

pub mod controller;
pub mod models;

pub use controller::{
    broaden, relax_filters, AttemptRecord, RelaxationConfig, RelaxationController,
    RelaxationOutcome,
};
pub use models::{FallbackReason, FallbackSignal, FallbackStage, FallbackState, FallbackStrategy};
