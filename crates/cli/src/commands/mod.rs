//! Subcommand implementations

pub mod status;
pub mod suspend;
pub mod wake;
