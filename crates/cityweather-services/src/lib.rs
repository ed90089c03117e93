//! Concurrent resolution and aggregation of weather for many location names.

pub mod aggregator;
pub mod builder;
pub mod fetch;
pub mod outcome;
pub mod pool;
pub mod resolver;
pub mod retry;

pub use aggregator::{AggregateError, AggregateOptions, Aggregator};
pub use builder::{build_aggregator, BuildError};
pub use fetch::WeatherFetcher;
pub use outcome::{AggregateOutcome, FailureRecord, WeatherRecord};
pub use pool::{PoolError, WorkerPool};
pub use resolver::IdentifierResolver;
pub use retry::RetryPolicy;
