use crate::{Agent, ConfigurableAgent, TrainingBudget, base_agent::BaseAgent};
use anyhow::Result;
use pgrl_core::{
    config::Config,
    estimators::{CompleteReturn, Estimator},
    models::{Model, ReinforceModel},
};

/// Monte Carlo policy gradient: whole episodes, discounted returns used directly as advantages.
pub struct ReinforceAgent {
    pub base: BaseAgent<ReinforceModel>,
    pub timesteps_per_batch: i64,
    pub episodes_per_batch: i64,
}

impl ReinforceAgent {
    pub fn new(base: BaseAgent<ReinforceModel>, timesteps_per_batch: i64, episodes_per_batch: i64) -> Self {
        Self {
            base,
            timesteps_per_batch,
            episodes_per_batch,
        }
    }
}

impl Agent for ReinforceAgent {
    fn train(&mut self, budget: TrainingBudget) -> Result<f32> {
        self.base.start(budget);
        let estimator = CompleteReturn::new(self.base.gamma);
        loop {
            let mut batch = self
                .base
                .generate_batch(self.timesteps_per_batch, self.episodes_per_batch)?;
            let returns = estimator.estimate(&batch)?;
            batch.set_returns(returns.clone())?;
            batch.set_advantages(returns)?;
            self.base.model.train_step(&mut batch)?;
            self.base.maybe_write_logs()?;
            if self.base.check_termination() {
                break;
            }
        }
        Ok(self.base.mean_reward())
    }
}

impl ConfigurableAgent for ReinforceAgent {
    type Model = ReinforceModel;

    fn from_base(base: BaseAgent<Self::Model>, config: &Config) -> Result<Self> {
        Ok(Self::new(
            base,
            config.agent.timesteps_per_batch,
            config.agent.episodes_per_batch,
        ))
    }
}
