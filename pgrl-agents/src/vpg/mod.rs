use crate::{Agent, ConfigurableAgent, TrainingBudget, base_agent::BaseAgent};
use anyhow::Result;
use pgrl_core::{
    config::Config,
    estimators::{BaselineAdvantage, CompleteReturn, Estimator, estimation_funcs::normalize},
    models::{Model, VanillaPGModel},
};

/// Vanilla policy gradient. Advantages are returns minus the value baseline when a value
/// network is configured, and the value network regresses onto the returns.
pub struct VanillaPGAgent {
    pub base: BaseAgent<VanillaPGModel>,
    pub timesteps_per_batch: i64,
    pub episodes_per_batch: i64,
    pub normalize_advantages: bool,
}

impl Agent for VanillaPGAgent {
    fn train(&mut self, budget: TrainingBudget) -> Result<f32> {
        self.base.start(budget);
        let returns_estimator = CompleteReturn::new(self.base.gamma);
        loop {
            let mut batch = self
                .base
                .generate_batch(self.timesteps_per_batch, self.episodes_per_batch)?;
            let returns = returns_estimator.estimate(&batch)?;
            batch.set_returns(returns.clone())?;
            batch.set_vtarget(returns)?;
            let mut advantages = BaselineAdvantage.estimate(&batch)?;
            if self.normalize_advantages {
                normalize(&mut advantages);
            }
            batch.set_advantages(advantages)?;
            self.base.model.train_step(&mut batch)?;
            self.base.maybe_write_logs()?;
            if self.base.check_termination() {
                break;
            }
        }
        Ok(self.base.mean_reward())
    }
}

impl ConfigurableAgent for VanillaPGAgent {
    type Model = VanillaPGModel;

    fn from_base(base: BaseAgent<Self::Model>, config: &Config) -> Result<Self> {
        Ok(Self {
            base,
            timesteps_per_batch: config.agent.timesteps_per_batch,
            episodes_per_batch: config.agent.episodes_per_batch,
            normalize_advantages: config.agent.normalize_advantages,
        })
    }
}
