//! Subcommand implementations

pub mod consumer;
pub mod provider;
