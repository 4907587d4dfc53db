//! Command handlers for the Reasoner CLI.

pub mod ask;
pub mod config;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use config::ConfigCommand;
