//! Command handlers for the crisis CLI.

pub mod corpus;

pub use corpus::CorpusCommand;
