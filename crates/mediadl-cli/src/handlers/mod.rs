//! Command handlers.
//!
//! Handlers are thin: resolve what they need from settings or the composed
//! [`crate::ServiceContext`], call into the library crates, print results.

pub mod serve;
pub mod status;
pub mod stop;
