pub mod registry;
pub mod server;

pub use registry::Metrics;
pub use server::run_metrics_server;
