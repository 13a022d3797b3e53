//! Core library for the Lingua LLM task service.
//!
//! Each module is kept small so the boundaries between responsibilities stay
//! obvious when exploring the codebase:
//! - [`agents`] holds provider settings, the prompt registry, the
//!   OpenAI-compatible client and model discovery.
//! - [`executor`] runs one task end to end and produces a uniform result.
//! - [`api`] exposes the HTTP surface the frontend calls.
//! - [`errors`] keeps the error catalogue with event codes and explanations.
//! - [`logging`] renders structured events through the `log` facade.

pub mod agents;
pub mod api;
pub mod errors;
pub mod executor;
pub mod logging;

pub use errors::TaskError;
pub use executor::{TaskExecutor, TaskRequest, TaskResult};
