pub mod base_agent;
pub mod batch_agent;
pub mod ppo;
pub mod reinforce;
pub mod vpg;

use anyhow::Result;
use base_agent::BaseAgent;
use candle_core::Device;
use pgrl_core::{
    config::{AgentConfig, Config},
    env::{Env, TrackedEnv},
    error::PgError,
    models::Model,
    registry::ObjRegistry,
};
use std::path::Path;
use tracing::info;

pub use ppo::PPOAgent;
pub use reinforce::ReinforceAgent;
pub use vpg::VanillaPGAgent;

/// Stopping criteria of a training run. A negative bound leaves that axis unbounded; training
/// stops as soon as any bounded counter reaches its bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainingBudget {
    pub max_updates: i64,
    pub max_episodes: i64,
    pub max_steps: i64,
}

impl Default for TrainingBudget {
    fn default() -> Self {
        Self {
            max_updates: -1,
            max_episodes: -1,
            max_steps: -1,
        }
    }
}

impl TrainingBudget {
    pub fn new(max_updates: i64, max_episodes: i64, max_steps: i64) -> Self {
        Self {
            max_updates,
            max_episodes,
            max_steps,
        }
    }

    pub fn updates(max_updates: i64) -> Self {
        Self {
            max_updates,
            ..Default::default()
        }
    }

    pub fn episodes(max_episodes: i64) -> Self {
        Self {
            max_episodes,
            ..Default::default()
        }
    }

    pub fn steps(max_steps: i64) -> Self {
        Self {
            max_steps,
            ..Default::default()
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_updates < 0 && self.max_episodes < 0 && self.max_steps < 0
    }

    pub fn is_exhausted(&self, updates: usize, episodes: usize, steps: usize) -> bool {
        fn reached(count: usize, bound: i64) -> bool {
            bound >= 0 && count as i64 >= bound
        }
        reached(updates, self.max_updates)
            || reached(episodes, self.max_episodes)
            || reached(steps, self.max_steps)
    }

    pub fn max_steps(&self) -> Option<usize> {
        usize::try_from(self.max_steps).ok()
    }
}

pub trait Agent {
    /// Runs the training loop until the budget is exhausted and returns the mean reward over
    /// every finished episode.
    fn train(&mut self, budget: TrainingBudget) -> Result<f32>;
}

/// Agents that can be assembled from a [`Config`].
pub trait ConfigurableAgent: Sized {
    type Model: Model;

    fn from_base(base: BaseAgent<Self::Model>, config: &Config) -> Result<Self>;

    /// The env passed in takes precedence over the one described in the config.
    fn from_config(config: &Config, env: Option<Box<dyn Env>>, registry: &ObjRegistry) -> Result<Self> {
        config.model.validate()?;
        config.agent.validate()?;
        let env = match (env, &config.env) {
            (Some(env), _) => env,
            (None, Some(env_config)) => registry.get_obj(&env_config.obj)?,
            (None, None) => return Err(PgError::MissingEnv.into()),
        };
        let env = TrackedEnv::new(env);
        let model = config.model.build::<Self::Model>(env.description(), &Device::Cpu)?;
        info!(description = ?env.description(), "agent created");
        let AgentConfig {
            gamma, log_every, ..
        } = &config.agent;
        let base = BaseAgent::new(env, model, *gamma).with_log_every(*log_every);
        Self::from_base(base, config)
    }

    fn from_file(
        path: impl AsRef<Path>,
        env: Option<Box<dyn Env>>,
        registry: &ObjRegistry,
    ) -> Result<Self> {
        let config = Config::load(path)?;
        Self::from_config(&config, env, registry)
    }
}

#[cfg(test)]
mod tests {
    use super::TrainingBudget;

    #[test]
    fn unbounded_axes_never_stop_training() {
        let budget = TrainingBudget::new(5, -1, -1);
        assert!(!budget.is_exhausted(4, 1_000_000, 1_000_000));
        assert!(budget.is_exhausted(5, 0, 0));
        assert!(!TrainingBudget::default().is_exhausted(usize::MAX, usize::MAX, usize::MAX));
        assert!(TrainingBudget::default().is_unbounded());
    }

    #[test]
    fn any_bounded_axis_stops_training() {
        let budget = TrainingBudget::new(10, 3, -1);
        assert!(budget.is_exhausted(2, 3, 0));
        assert!(TrainingBudget::steps(100).is_exhausted(0, 0, 100));
        assert_eq!(TrainingBudget::steps(100).max_steps(), Some(100));
        assert_eq!(TrainingBudget::updates(1).max_steps(), None);
    }
}
