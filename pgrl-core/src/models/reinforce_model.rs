use super::{
    Model, PGModel,
    losses::{LossRegistry, policy_gradient_loss},
};
use crate::{
    config::ModelConfig,
    env::EnvironmentDescription,
    logger::Logger,
    utils::batch::{Batch, BatchKey},
};
use anyhow::Result;
use candle_core::{Device, Tensor};
use derive_more::{Deref, DerefMut};

/// REINFORCE: the policy gradient loss on Monte Carlo returns, no value network involved.
#[derive(Debug, Deref, DerefMut)]
pub struct ReinforceModel {
    #[deref]
    #[deref_mut]
    pg: PGModel,
    losses: LossRegistry,
}

impl ReinforceModel {
    pub fn new(pg: PGModel) -> Self {
        let losses = LossRegistry::default()
            .register("policy", |model, batch| Ok(policy_gradient_loss(model, batch)?.0));
        Self { pg, losses }
    }
}

impl Model for ReinforceModel {
    fn batch_keys(&self) -> Vec<BatchKey> {
        vec![BatchKey::States, BatchKey::Actions, BatchKey::Advantages]
    }

    fn select_action(&mut self, states: &Tensor) -> Result<Tensor> {
        self.pg.select_action(states)
    }

    fn state_values(&self, states: &Tensor) -> Result<Option<Vec<f32>>> {
        self.pg.state_values(states)
    }

    fn train_step(&mut self, batch: &mut Batch) -> Result<()> {
        batch.require(&self.batch_keys())?;
        self.pg.set_dists(batch)?;
        self.pg.optimize(&self.losses, batch)?;
        self.pg.num_updates += 1;
        Ok(())
    }

    fn num_updates(&self) -> usize {
        self.pg.num_updates
    }

    fn write_logs(&mut self, logger: &mut Logger) -> Result<()> {
        self.pg.write_logs(logger)
    }

    fn from_config(
        config: &ModelConfig,
        description: &EnvironmentDescription,
        device: &Device,
    ) -> Result<Self> {
        Ok(Self::new(PGModel::from_config(config, description, device)?))
    }
}
