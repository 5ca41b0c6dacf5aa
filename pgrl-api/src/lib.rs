// builders + higher level helpers
pub mod builders;

pub use pgrl_agents::{Agent, ConfigurableAgent, TrainingBudget};
pub use pgrl_core::{config::Config, env::Env, registry::ObjRegistry};

use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber filtered by `RUST_LOG`, falling back to `default_filter`. Does
/// nothing when a global subscriber is already set.
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .try_init();
}
