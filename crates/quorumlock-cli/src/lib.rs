//! Quorumlock CLI - acquire, hold and inspect quorum locks from the shell

pub mod command;
pub mod model;
pub mod startup;
