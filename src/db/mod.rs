

pub mod client;

pub use client::{ExecutionError, ExecutionResult, HttpSearchExecutor, SearchExecutor};
