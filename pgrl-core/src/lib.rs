pub mod config;
pub mod distributions;
pub mod env;
pub mod error;
pub mod estimators;
pub mod logger;
pub mod models;
pub mod network;
pub mod optimizer;
pub mod registry;
pub mod rng;
pub mod tensors;
pub mod thread_safe_sequential;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
