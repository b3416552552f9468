mod collector;
mod logging;
mod metrics;

pub use collector::RunCollector;
pub use logging::LoggingHandler;
pub use metrics::{MetricsCollector, MetricsHandler, RunMetrics};
