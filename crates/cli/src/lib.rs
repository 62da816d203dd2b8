//! Command-line front end and HTTP server for the `invite` crate.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;
pub mod output;
pub mod server;
pub mod sheets;
