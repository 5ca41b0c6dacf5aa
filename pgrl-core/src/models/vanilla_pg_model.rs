use super::{
    Model, PGModel,
    losses::{LossRegistry, entropy_loss, policy_gradient_loss, value_loss},
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

/// Policy gradient with an entropy bonus and, when a value network is configured, a value
/// regression loss trained in the same step.
#[derive(Debug, Deref, DerefMut)]
pub struct VanillaPGModel {
    #[deref]
    #[deref_mut]
    pg: PGModel,
    losses: LossRegistry,
}

impl VanillaPGModel {
    pub fn new(pg: PGModel) -> Self {
        let mut losses = LossRegistry::default()
            .register("policy", |model, batch| Ok(policy_gradient_loss(model, batch)?.0))
            .register("entropy", |model, batch| Ok(entropy_loss(model, batch)?.0));
        if pg.value_nn().is_some() {
            losses = losses.register("value", |model, batch| Ok(value_loss(model, batch)?.0));
        }
        Self { pg, losses }
    }

    pub fn losses(&self) -> &LossRegistry {
        &self.losses
    }
}

impl Model for VanillaPGModel {
    fn batch_keys(&self) -> Vec<BatchKey> {
        let mut keys = vec![BatchKey::States, BatchKey::Actions, BatchKey::Advantages];
        if self.pg.value_nn().is_some() {
            keys.push(BatchKey::Vtarget);
        }
        keys
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
