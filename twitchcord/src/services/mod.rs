//! Service layer module.
//!
//! Builds every component from [`crate::config::AppConfig`] and owns their tasks.

pub mod container;

pub use container::ServiceContainer;
