// file: src/logging/mod.rs
// version: 1.0.0
// guid: a8b9c0d1-e2f3-4567-8901-234567abcdef

//! Logging and user-facing notification module

pub mod logger;

pub use logger::{init_logger, notify_error, notify_ok, notify_status, notify_step};
