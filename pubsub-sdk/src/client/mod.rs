//! The client handle and its configuration.

pub mod config;
pub mod core;
