use super::{
    Model, PGModel,
    losses::{LossRegistry, entropy_loss, surrogate_policy_gradient_loss, value_loss},
};
use crate::{
    config::ModelConfig,
    distributions::Distribution,
    env::EnvironmentDescription,
    error::PgError,
    logger::Logger,
    utils::batch::{Batch, BatchKey},
};
use anyhow::Result;
use candle_core::{Device, Tensor};
use derive_more::{Deref, DerefMut};

/// Where a surrogate model is within one outer training step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurrogateState {
    Init,
    OldDistCaptured,
    Updated,
    NewDistRefreshed,
}

impl SurrogateState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::OldDistCaptured => "old_dist_captured",
            Self::Updated => "updated",
            Self::NewDistRefreshed => "new_dist_refreshed",
        }
    }

    fn check(self, allowed: &[SurrogateState], to: SurrogateState) -> Result<()> {
        if allowed.contains(&self) {
            Ok(())
        } else {
            Err(PgError::InvalidTransition {
                from: self.name(),
                to: to.name(),
            }
            .into())
        }
    }
}

pub(crate) fn surrogate_batch_keys(pg: &PGModel) -> Vec<BatchKey> {
    let mut keys = vec![BatchKey::States, BatchKey::Actions, BatchKey::Advantages];
    if pg.value_nn().is_some() {
        keys.push(BatchKey::Vtarget);
    }
    keys
}

/// Maximizes `ratio * advantage` where the ratio compares the current policy with the one that
/// was in place when the step started. The old distribution is captured, detached, before any
/// parameter changes; a gradient step without it is rejected.
#[derive(Debug, Deref, DerefMut)]
pub struct SurrogatePGModel {
    #[deref]
    #[deref_mut]
    pg: PGModel,
    losses: LossRegistry,
    state: SurrogateState,
}

impl SurrogatePGModel {
    pub fn new(pg: PGModel) -> Self {
        let losses = LossRegistry::default().register("policy", |_, batch| {
            Ok(surrogate_policy_gradient_loss(batch)?.0)
        });
        Self::with_losses(pg, losses)
    }

    /// Appends the entropy term and, with a value network, the value term to `losses`.
    pub fn with_losses(pg: PGModel, losses: LossRegistry) -> Self {
        let mut losses =
            losses.register("entropy", |model, batch| Ok(entropy_loss(model, batch)?.0));
        if pg.value_nn().is_some() {
            losses = losses.register("value", |model, batch| Ok(value_loss(model, batch)?.0));
        }
        Self {
            pg,
            losses,
            state: SurrogateState::Init,
        }
    }

    pub fn state(&self) -> SurrogateState {
        self.state
    }

    pub fn losses(&self) -> &LossRegistry {
        &self.losses
    }

    pub(crate) fn begin_step(&mut self, batch: &Batch) -> Result<()> {
        batch.require(&surrogate_batch_keys(&self.pg))?;
        self.state = SurrogateState::Init;
        Ok(())
    }

    /// Builds the pre-update distribution and stores its log probabilities as `old_log_prob`.
    pub fn capture_old_dists(&mut self, batch: &mut Batch) -> Result<()> {
        let to = SurrogateState::OldDistCaptured;
        self.state.check(&[SurrogateState::Init], to)?;
        let old_dists = self.pg.create_dist(batch.states())?.detach();
        batch.set_old_log_prob(old_dists.log_prob(batch.actions())?)?;
        self.pg.memory.old_dists = Some(old_dists);
        self.state = to;
        Ok(())
    }

    /// A gradient step on `batch`, which has to carry `old_log_prob` from the capture.
    pub fn update(&mut self, batch: &mut Batch) -> Result<()> {
        let to = SurrogateState::Updated;
        self.state.check(
            &[
                SurrogateState::OldDistCaptured,
                SurrogateState::Updated,
                SurrogateState::NewDistRefreshed,
            ],
            to,
        )?;
        let new_dists = self.pg.create_dist(batch.states())?;
        batch.set_new_log_prob(new_dists.log_prob(batch.actions())?)?;
        self.pg.memory.dists = Some(new_dists);
        self.pg.optimize(&self.losses, batch)?;
        self.state = to;
        Ok(())
    }

    /// Rebuilds the distribution with the updated parameters.
    pub fn refresh_new_dists(&mut self, batch: &mut Batch) -> Result<()> {
        let to = SurrogateState::NewDistRefreshed;
        self.state.check(&[SurrogateState::Updated], to)?;
        let new_dists = self.pg.create_dist(batch.states())?.detach();
        batch.set_new_log_prob(new_dists.log_prob(batch.actions())?)?;
        self.pg.memory.dists = Some(new_dists);
        self.state = to;
        Ok(())
    }

    /// Mean `KL(old || new)` over the states of the last step.
    pub fn kl_divergence(&self) -> Result<Option<f32>> {
        let (Some(old_dists), Some(new_dists)) = (&self.pg.memory.old_dists, &self.pg.memory.dists)
        else {
            return Ok(None);
        };
        let kl = old_dists.kl_divergence(new_dists)?.mean_all()?;
        Ok(Some(kl.to_scalar::<f32>()?))
    }
}

impl Model for SurrogatePGModel {
    fn batch_keys(&self) -> Vec<BatchKey> {
        surrogate_batch_keys(&self.pg)
    }

    fn select_action(&mut self, states: &Tensor) -> Result<Tensor> {
        self.pg.select_action(states)
    }

    fn state_values(&self, states: &Tensor) -> Result<Option<Vec<f32>>> {
        self.pg.state_values(states)
    }

    fn train_step(&mut self, batch: &mut Batch) -> Result<()> {
        self.begin_step(batch)?;
        self.capture_old_dists(batch)?;
        self.update(batch)?;
        self.refresh_new_dists(batch)?;
        self.pg.num_updates += 1;
        Ok(())
    }

    fn num_updates(&self) -> usize {
        self.pg.num_updates
    }

    fn write_logs(&mut self, logger: &mut Logger) -> Result<()> {
        self.pg.write_logs(logger)?;
        if let Some(kl) = self.kl_divergence()? {
            logger.add_log("KL Divergence", kl, 4);
        }
        Ok(())
    }

    fn from_config(
        config: &ModelConfig,
        description: &EnvironmentDescription,
        device: &Device,
    ) -> Result<Self> {
        Ok(Self::new(PGModel::from_config(config, description, device)?))
    }
}

#[cfg(test)]
mod tests {
    use super::{SurrogatePGModel, SurrogateState};
    use crate::{
        config::ModelConfig,
        env::{EnvironmentDescription, Space},
        error::PgError,
        logger::Logger,
        models::Model,
        utils::batch::{Batch, BatchKey},
    };
    use anyhow::Result;
    use candle_core::{Device, Tensor};

    fn model() -> Result<SurrogatePGModel> {
        let description =
            EnvironmentDescription::new(Space::continuous_from_dims(vec![2]), Space::Discrete(3));
        ModelConfig::default().build(&description, &Device::Cpu)
    }

    fn batch() -> Result<Batch> {
        let states = Tensor::new(&[[1f32, 0.], [0., 1.], [1., 1.]], &Device::Cpu)?;
        let actions = Tensor::new(&[0u32, 1, 2], &Device::Cpu)?;
        let mut batch = Batch::new(states, actions, vec![0.; 3], vec![false, false, true])?;
        batch.set_advantages(vec![1., -1., 0.5])?;
        Ok(batch)
    }

    #[test]
    fn update_without_old_distribution_is_rejected() -> Result<()> {
        let mut model = model()?;
        let mut batch = batch()?;
        let err = model.update(&mut batch).unwrap_err();
        assert_eq!(
            err.downcast_ref::<PgError>(),
            Some(&PgError::InvalidTransition {
                from: "init",
                to: "updated"
            })
        );
        assert!(!batch.has(BatchKey::NewLogProb));
        Ok(())
    }

    #[test]
    fn first_step_has_unit_ratio() -> Result<()> {
        let mut model = model()?;
        let mut batch = batch()?;
        model.begin_step(&batch)?;
        model.capture_old_dists(&mut batch)?;
        assert_eq!(model.state(), SurrogateState::OldDistCaptured);
        model.update(&mut batch)?;
        // before the step both distributions come from the same parameters
        let loss = model.last_losses().get("policy").unwrap();
        assert!((loss + 0.5 / 3.).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn train_step_walks_the_state_machine() -> Result<()> {
        let mut model = model()?;
        let mut batch = batch()?;
        model.train_step(&mut batch)?;
        assert_eq!(model.state(), SurrogateState::NewDistRefreshed);
        assert_eq!(model.num_updates(), 1);
        assert!(batch.has(BatchKey::OldLogProb));
        assert!(batch.has(BatchKey::NewLogProb));
        let mut logger = Logger::new();
        model.write_logs(&mut logger)?;
        assert!(logger.get("KL Divergence").unwrap() >= -1e-6);
        // a second outer step captures a fresh old distribution
        model.train_step(&mut batch)?;
        assert_eq!(model.num_updates(), 2);
        Ok(())
    }
}
