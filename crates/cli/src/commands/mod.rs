//! Subcommand implementations

pub mod monitoring;
pub mod tenants;
