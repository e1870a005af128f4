//! Wiring for the `ckpool-node` binary: configuration and the `App`
//! aggregate that spawns every long-lived subsystem task.

pub mod app;
pub mod config;

pub use app::App;
pub use config::Cli;
