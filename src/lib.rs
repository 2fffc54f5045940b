pub mod cli;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod sessions;
