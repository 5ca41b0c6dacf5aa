use crate::{Agent, ConfigurableAgent, TrainingBudget, base_agent::BaseAgent};
use anyhow::Result;
use pgrl_core::{
    config::Config,
    error::PgError,
    estimators::{Estimator, GAE, GeneralizedAdvantage, estimation_funcs::normalize},
    models::{Model, PPOModel},
};

/// Step bound collection with generalized advantage estimation, trained by a surrogate model
/// (`PPOModel` or `SurrogatePGModel`). Needs a value network.
pub struct PPOAgent<M: Model = PPOModel> {
    pub base: BaseAgent<M>,
    pub steps_per_batch: usize,
    pub lambda: f32,
    pub normalize_advantages: bool,
}

impl<M: Model> Agent for PPOAgent<M> {
    fn train(&mut self, budget: TrainingBudget) -> Result<f32> {
        self.base.start(budget);
        let advantage_estimator = GeneralizedAdvantage::new(self.base.gamma, self.lambda);
        loop {
            let mut batch = self.base.generate_step_batch(self.steps_per_batch)?;
            let advantages = advantage_estimator.estimate(&batch)?;
            batch.set_advantages(advantages.clone())?;
            // value targets come from the unnormalized advantages
            let vtarget = GAE.estimate(&batch)?;
            batch.set_vtarget(vtarget)?;
            if self.normalize_advantages {
                let mut advantages = advantages;
                normalize(&mut advantages);
                batch.set_advantages(advantages)?;
            }
            self.base.model.train_step(&mut batch)?;
            self.base.maybe_write_logs()?;
            if self.base.check_termination() {
                break;
            }
        }
        Ok(self.base.mean_reward())
    }
}

impl<M: Model> ConfigurableAgent for PPOAgent<M> {
    type Model = M;

    fn from_base(base: BaseAgent<Self::Model>, config: &Config) -> Result<Self> {
        if config.model.value_nn.is_none() {
            return Err(PgError::InvalidConfig(
                "advantage estimation needs a value network".to_owned(),
            )
            .into());
        }
        Ok(Self {
            base,
            steps_per_batch: config.agent.steps_per_batch,
            lambda: config.agent.lambda,
            normalize_advantages: config.agent.normalize_advantages,
        })
    }
}
