//! HTTP handlers.

pub mod snapshot;
pub mod stream;
