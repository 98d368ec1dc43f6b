//! aoform - deploy versioned Lua source to AO processes.
//!
//! The binary is a thin wrapper over these modules; they are exposed so the
//! HTTP gateway and the commands can be exercised from integration tests.

pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod wallet;

pub use client::HttpGateway;
pub use commands::Cli;
pub use config::Config;
pub use error::CliError;
pub use wallet::Wallet;
