pub mod metrics;
pub mod tracing;

pub use metrics::HelperMetrics;
pub use self::tracing::init_tracing;
