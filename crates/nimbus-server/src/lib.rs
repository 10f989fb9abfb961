//! Nimbus server - administrative entry point
//!
//! Loads configuration and the allocation inventory, registers provider
//! backends and runs one subcommand against them.

pub mod cli;
pub mod commands;
pub mod config;
pub mod inventory;
pub mod logging;
pub mod startup;

pub use cli::{Cli, Command, OutputFormat};
pub use commands::{Context, execute};
pub use config::Configuration;
pub use inventory::FileInventory;
