use super::{
    Model, PGModel,
    losses::{LossRegistry, clipped_surrogate_loss},
    surrogate_pg_model::{SurrogatePGModel, surrogate_batch_keys},
};
use crate::{
    config::{ModelConfig, PPOConfig},
    env::EnvironmentDescription,
    logger::Logger,
    utils::batch::{Batch, BatchKey},
};
use anyhow::Result;
use candle_core::{Device, Tensor};
use derive_more::{Deref, DerefMut};
use tracing::debug;

/// Clipped surrogate objective optimized for several epochs over shuffled mini-batches. The
/// old distribution is captured once per outer step, so every mini-batch compares against the
/// policy that collected the data.
#[derive(Debug, Deref, DerefMut)]
pub struct PPOModel {
    #[deref]
    #[deref_mut]
    surrogate: SurrogatePGModel,
    ppo: PPOConfig,
}

impl PPOModel {
    pub fn new(pg: PGModel, ppo: PPOConfig) -> Self {
        let clip_range = ppo.clip_range;
        let losses = LossRegistry::default().register("policy", move |_, batch| {
            Ok(clipped_surrogate_loss(batch, clip_range)?.0)
        });
        Self {
            surrogate: SurrogatePGModel::with_losses(pg, losses),
            ppo,
        }
    }

    pub fn ppo_config(&self) -> &PPOConfig {
        &self.ppo
    }
}

impl Model for PPOModel {
    fn batch_keys(&self) -> Vec<BatchKey> {
        surrogate_batch_keys(&self.surrogate)
    }

    fn select_action(&mut self, states: &Tensor) -> Result<Tensor> {
        self.surrogate.select_action(states)
    }

    fn state_values(&self, states: &Tensor) -> Result<Option<Vec<f32>>> {
        self.surrogate.state_values(states)
    }

    fn train_step(&mut self, batch: &mut Batch) -> Result<()> {
        self.surrogate.begin_step(batch)?;
        self.surrogate.capture_old_dists(batch)?;
        for epoch in 0..self.ppo.num_epochs {
            for mini_batch in batch.mini_batches(self.ppo.mini_batch_size) {
                let mut mini_batch = mini_batch?;
                self.surrogate.update(&mut mini_batch)?;
            }
            debug!(epoch, losses = ?self.surrogate.last_losses(), "ppo epoch finished");
        }
        self.surrogate.refresh_new_dists(batch)?;
        self.surrogate.num_updates += 1;
        Ok(())
    }

    fn num_updates(&self) -> usize {
        self.surrogate.num_updates
    }

    fn write_logs(&mut self, logger: &mut Logger) -> Result<()> {
        self.surrogate.write_logs(logger)
    }

    fn from_config(
        config: &ModelConfig,
        description: &EnvironmentDescription,
        device: &Device,
    ) -> Result<Self> {
        let pg = PGModel::from_config(config, description, device)?;
        Ok(Self::new(pg, config.ppo.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::PPOModel;
    use crate::{
        config::{ModelConfig, NetworkConfig, PPOConfig},
        env::{EnvironmentDescription, Space},
        models::{Model, surrogate_pg_model::SurrogateState},
        rng,
        utils::batch::{Batch, BatchKey},
    };
    use anyhow::Result;
    use candle_core::{Device, Tensor};

    #[test]
    fn one_outer_step_counts_as_one_update() -> Result<()> {
        rng::seed(11);
        let config = ModelConfig {
            value_nn: Some(NetworkConfig::default()),
            share_body: true,
            ppo: PPOConfig {
                clip_range: 0.2,
                num_epochs: 3,
                mini_batch_size: 2,
            },
            ..Default::default()
        };
        let description =
            EnvironmentDescription::new(Space::continuous_from_dims(vec![2]), Space::Discrete(2));
        let mut model: PPOModel = config.build(&description, &Device::Cpu)?;
        assert_eq!(
            model.losses().names().collect::<Vec<_>>(),
            vec!["policy", "entropy", "value"]
        );
        let states = Tensor::new(&[[1f32, 0.], [0., 1.], [1., 1.], [0., 0.], [0.5, 0.5]], &Device::Cpu)?;
        let actions = Tensor::new(&[0u32, 1, 0, 1, 0], &Device::Cpu)?;
        let mut batch = Batch::new(states, actions, vec![1.; 5], vec![false, false, true, false, true])?;
        batch.set_advantages(vec![1., -1., 1., -1., 0.])?;
        batch.set_vtarget(vec![1.; 5])?;
        model.train_step(&mut batch)?;
        assert_eq!(model.num_updates(), 1);
        assert_eq!(model.state(), SurrogateState::NewDistRefreshed);
        assert!(batch.has(BatchKey::OldLogProb));
        assert!(model.kl_divergence()?.is_some());
        Ok(())
    }
}
