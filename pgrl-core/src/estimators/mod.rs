pub mod estimation_funcs;

use crate::utils::batch::Batch;
use anyhow::Result;
use estimation_funcs::{discounted_sum_rewards, generalized_advantage, td_target};

/// Maps a batch to one value per step (returns, targets or advantages).
pub trait Estimator {
    fn estimate(&self, batch: &Batch) -> Result<Vec<f32>>;
}

/// Monte Carlo discounted return, bootstrapped with `last_state_value` when the batch ends in
/// the middle of an episode.
#[derive(Debug, Clone, Copy)]
pub struct CompleteReturn {
    pub gamma: f32,
}

impl CompleteReturn {
    pub fn new(gamma: f32) -> Self {
        Self { gamma }
    }
}

impl Estimator for CompleteReturn {
    fn estimate(&self, batch: &Batch) -> Result<Vec<f32>> {
        Ok(discounted_sum_rewards(
            batch.rewards(),
            batch.dones(),
            batch.last_state_value(),
            self.gamma,
        ))
    }
}

/// One step TD target `r + gamma * V(s')`. Needs state values.
#[derive(Debug, Clone, Copy)]
pub struct TDTarget {
    pub gamma: f32,
}

impl TDTarget {
    pub fn new(gamma: f32) -> Self {
        Self { gamma }
    }
}

impl Estimator for TDTarget {
    fn estimate(&self, batch: &Batch) -> Result<Vec<f32>> {
        Ok(td_target(
            batch.rewards(),
            batch.dones(),
            batch.state_values()?,
            batch.last_state_value(),
            self.gamma,
        ))
    }
}

/// Adds the state values back onto the advantages already stored in the batch. This is not
/// generalized advantage estimation itself, it turns GAE advantages into value targets. See
/// [`GeneralizedAdvantage`] for the advantages.
#[derive(Debug, Clone, Copy, Default)]
pub struct GAE;

impl Estimator for GAE {
    fn estimate(&self, batch: &Batch) -> Result<Vec<f32>> {
        let advantages = batch.advantages()?;
        let state_values = batch.state_values()?;
        Ok(advantages
            .iter()
            .zip(state_values)
            .map(|(advantage, value)| advantage + value)
            .collect())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GeneralizedAdvantage {
    pub gamma: f32,
    pub lambda: f32,
}

impl GeneralizedAdvantage {
    pub fn new(gamma: f32, lambda: f32) -> Self {
        Self { gamma, lambda }
    }
}

impl Estimator for GeneralizedAdvantage {
    fn estimate(&self, batch: &Batch) -> Result<Vec<f32>> {
        Ok(generalized_advantage(
            batch.rewards(),
            batch.dones(),
            batch.state_values()?,
            batch.last_state_value(),
            self.gamma,
            self.lambda,
        ))
    }
}

/// `returns - state_values`, or plain returns when the batch has no state values.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaselineAdvantage;

impl Estimator for BaselineAdvantage {
    fn estimate(&self, batch: &Batch) -> Result<Vec<f32>> {
        let returns = batch.returns()?;
        let Ok(state_values) = batch.state_values() else {
            return Ok(returns.to_vec());
        };
        Ok(returns
            .iter()
            .zip(state_values)
            .map(|(ret, value)| ret - value)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::PgError, utils::batch::BatchKey};
    use candle_core::{Device, Tensor};

    fn batch(rewards: Vec<f32>, dones: Vec<bool>) -> Result<Batch> {
        let n = rewards.len();
        let states = Tensor::zeros((n, 1), candle_core::DType::F32, &Device::Cpu)?;
        let actions = Tensor::zeros(n, candle_core::DType::U32, &Device::Cpu)?;
        Batch::new(states, actions, rewards, dones)
    }

    #[test]
    fn single_step_episode_returns_the_reward() -> Result<()> {
        let batch = batch(vec![3.], vec![true])?;
        for gamma in [0.1, 0.5, 0.99, 1.] {
            assert_eq!(CompleteReturn::new(gamma).estimate(&batch)?, vec![3.]);
        }
        Ok(())
    }

    #[test]
    fn two_step_episode() -> Result<()> {
        let batch = batch(vec![1., 1.], vec![false, true])?;
        assert_eq!(CompleteReturn::new(0.5).estimate(&batch)?, vec![1.5, 1.]);
        Ok(())
    }

    #[test]
    fn concatenated_trajectories_match_separate_ones() -> Result<()> {
        let first = batch(vec![1., 2., 3.], vec![false, false, true])?;
        let second = batch(vec![4., 5.], vec![false, true])?;
        let joined = batch(vec![1., 2., 3., 4., 5.], vec![false, false, true, false, true])?;
        let estimator = CompleteReturn::new(0.9);
        let mut separate = estimator.estimate(&first)?;
        separate.extend(estimator.estimate(&second)?);
        assert_eq!(estimator.estimate(&joined)?, separate);
        Ok(())
    }

    #[test]
    fn td_target_at_terminal_step_is_the_reward() -> Result<()> {
        let mut batch = batch(vec![1., 2.], vec![false, true])?;
        batch.set_state_values(vec![5., 7.])?;
        let targets = TDTarget::new(0.5).estimate(&batch)?;
        assert_eq!(targets, vec![4.5, 2.]);
        Ok(())
    }

    #[test]
    fn td_target_requires_state_values() -> Result<()> {
        let batch = batch(vec![1.], vec![true])?;
        let err = TDTarget::new(0.5).estimate(&batch).unwrap_err();
        assert_eq!(
            err.downcast_ref::<PgError>(),
            Some(&PgError::MissingField(BatchKey::StateValues))
        );
        Ok(())
    }

    #[test]
    fn gae_restores_the_baseline() -> Result<()> {
        let mut batch = batch(vec![0., 0.], vec![false, true])?;
        batch.set_state_values(vec![1., 2.])?;
        batch.set_advantages(vec![0.5, -0.5])?;
        assert_eq!(GAE.estimate(&batch)?, vec![1.5, 1.5]);
        Ok(())
    }

    #[test]
    fn baseline_advantage_without_values_is_the_return() -> Result<()> {
        let mut batch = batch(vec![1., 1.], vec![false, true])?;
        batch.set_returns(vec![2., 1.])?;
        assert_eq!(BaselineAdvantage.estimate(&batch)?, vec![2., 1.]);
        batch.set_state_values(vec![0.5, 0.5])?;
        assert_eq!(BaselineAdvantage.estimate(&batch)?, vec![1.5, 0.5]);
        Ok(())
    }
}
