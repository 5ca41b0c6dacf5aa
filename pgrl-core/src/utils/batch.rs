use super::{mini_batching::MiniBatchIterator, rollout_buffer::Trajectory};
use crate::error::PgError;
use anyhow::Result;
use candle_core::{Device, Tensor};
use derive_more::Display;
use tracing::debug;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchKey {
    #[display("states")]
    States,
    #[display("actions")]
    Actions,
    #[display("rewards")]
    Rewards,
    #[display("dones")]
    Dones,
    #[display("state_values")]
    StateValues,
    #[display("returns")]
    Returns,
    #[display("vtarget")]
    Vtarget,
    #[display("advantages")]
    Advantages,
    #[display("old_log_prob")]
    OldLogProb,
    #[display("new_log_prob")]
    NewLogProb,
}

macro_rules! scalar_field {
    ($field:ident, $setter:ident, $key:expr) => {
        pub fn $field(&self) -> Result<&[f32]> {
            self.$field
                .as_deref()
                .ok_or_else(|| PgError::MissingField($key).into())
        }

        pub fn $setter(&mut self, values: Vec<f32>) -> Result<()> {
            self.check_len($key, values.len())?;
            self.$field = Some(values);
            Ok(())
        }
    };
}

macro_rules! tensor_field {
    ($field:ident, $setter:ident, $key:expr) => {
        pub fn $field(&self) -> Result<&Tensor> {
            self.$field
                .as_ref()
                .ok_or_else(|| PgError::MissingField($key).into())
        }

        pub fn $setter(&mut self, values: Tensor) -> Result<()> {
            self.check_len($key, values.dim(0)?)?;
            self.$field = Some(values);
            Ok(())
        }
    };
}

/// Per-step records of one or more trajectories, stacked along the first dimension. Every
/// field has exactly `len()` entries and entry `i` of each field refers to the same env step.
#[derive(Debug, Clone)]
pub struct Batch {
    states: Tensor,
    actions: Tensor,
    rewards: Vec<f32>,
    dones: Vec<bool>,
    last_state_value: f32,
    state_values: Option<Vec<f32>>,
    returns: Option<Vec<f32>>,
    vtarget: Option<Vec<f32>>,
    advantages: Option<Vec<f32>>,
    old_log_prob: Option<Tensor>,
    new_log_prob: Option<Tensor>,
}

impl Batch {
    pub fn new(states: Tensor, actions: Tensor, rewards: Vec<f32>, dones: Vec<bool>) -> Result<Self> {
        let len = rewards.len();
        if len == 0 {
            return Err(PgError::EmptyBatch.into());
        }
        let batch = Self {
            states,
            actions,
            rewards,
            dones,
            last_state_value: 0.,
            state_values: None,
            returns: None,
            vtarget: None,
            advantages: None,
            old_log_prob: None,
            new_log_prob: None,
        };
        batch.check_len(BatchKey::States, batch.states.dim(0)?)?;
        batch.check_len(BatchKey::Actions, batch.actions.dim(0)?)?;
        batch.check_len(BatchKey::Dones, batch.dones.len())?;
        Ok(batch)
    }

    /// Concatenates trajectories in order. Only the final trajectory may be cut by a step
    /// budget, its bootstrap value becomes `last_state_value`. An earlier cut trajectory is
    /// closed at its boundary so returns never flow into the next trajectory.
    pub fn from_trajectories(trajectories: Vec<Trajectory>) -> Result<Self> {
        let trajectories: Vec<Trajectory> = trajectories
            .into_iter()
            .filter(|trajectory| !trajectory.is_empty())
            .collect();
        let Some(last_idx) = trajectories.len().checked_sub(1) else {
            return Err(PgError::EmptyBatch.into());
        };
        let total_steps: usize = trajectories.iter().map(Trajectory::len).sum();
        let mut states = Vec::with_capacity(total_steps);
        let mut actions = Vec::with_capacity(total_steps);
        let mut rewards = Vec::with_capacity(total_steps);
        let mut dones = Vec::with_capacity(total_steps);
        let mut last_state_value = 0.;
        for (idx, trajectory) in trajectories.into_iter().enumerate() {
            let Trajectory {
                states: traj_states,
                actions: traj_actions,
                rewards: traj_rewards,
                dones: mut traj_dones,
                truncated,
                last_state_value: traj_last_value,
                ..
            } = trajectory;
            if idx == last_idx {
                last_state_value = if truncated { traj_last_value } else { 0. };
            } else if truncated {
                if let Some(done) = traj_dones.last_mut() {
                    debug!(trajectory = idx, "closing truncated trajectory at batch boundary");
                    *done = true;
                }
            }
            states.extend(traj_states);
            actions.extend(traj_actions);
            rewards.extend(traj_rewards);
            dones.extend(traj_dones);
        }
        let mut batch = Self::new(
            Tensor::stack(&states, 0)?,
            Tensor::stack(&actions, 0)?,
            rewards,
            dones,
        )?;
        batch.last_state_value = last_state_value;
        Ok(batch)
    }

    fn check_len(&self, key: BatchKey, got: usize) -> Result<()> {
        let expected = self.len();
        if got != expected {
            return Err(PgError::LengthMismatch { key, expected, got }.into());
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn device(&self) -> &Device {
        self.states.device()
    }

    pub fn states(&self) -> &Tensor {
        &self.states
    }

    pub fn actions(&self) -> &Tensor {
        &self.actions
    }

    pub fn rewards(&self) -> &[f32] {
        &self.rewards
    }

    pub fn dones(&self) -> &[bool] {
        &self.dones
    }

    pub fn last_state_value(&self) -> f32 {
        self.last_state_value
    }

    pub fn set_last_state_value(&mut self, value: f32) {
        self.last_state_value = value;
    }

    scalar_field!(state_values, set_state_values, BatchKey::StateValues);
    scalar_field!(returns, set_returns, BatchKey::Returns);
    scalar_field!(vtarget, set_vtarget, BatchKey::Vtarget);
    scalar_field!(advantages, set_advantages, BatchKey::Advantages);
    tensor_field!(old_log_prob, set_old_log_prob, BatchKey::OldLogProb);
    tensor_field!(new_log_prob, set_new_log_prob, BatchKey::NewLogProb);

    pub fn has(&self, key: BatchKey) -> bool {
        match key {
            BatchKey::States | BatchKey::Actions | BatchKey::Rewards | BatchKey::Dones => true,
            BatchKey::StateValues => self.state_values.is_some(),
            BatchKey::Returns => self.returns.is_some(),
            BatchKey::Vtarget => self.vtarget.is_some(),
            BatchKey::Advantages => self.advantages.is_some(),
            BatchKey::OldLogProb => self.old_log_prob.is_some(),
            BatchKey::NewLogProb => self.new_log_prob.is_some(),
        }
    }

    /// Fails on the first key that is not populated.
    pub fn require(&self, keys: &[BatchKey]) -> Result<()> {
        match keys.iter().find(|key| !self.has(**key)) {
            Some(key) => Err(PgError::MissingField(*key).into()),
            None => Ok(()),
        }
    }

    /// A field as a tensor on the batch device. Scalar fields become `(N,)` f32 tensors.
    pub fn tensor(&self, key: BatchKey) -> Result<Tensor> {
        let to_tensor = |values: &[f32]| Tensor::from_slice(values, values.len(), self.device());
        let tensor = match key {
            BatchKey::States => self.states.clone(),
            BatchKey::Actions => self.actions.clone(),
            BatchKey::Rewards => to_tensor(&self.rewards)?,
            BatchKey::Dones => {
                let dones: Vec<f32> = self.dones.iter().map(|d| f32::from(u8::from(*d))).collect();
                to_tensor(&dones)?
            }
            BatchKey::StateValues => to_tensor(self.state_values()?)?,
            BatchKey::Returns => to_tensor(self.returns()?)?,
            BatchKey::Vtarget => to_tensor(self.vtarget()?)?,
            BatchKey::Advantages => to_tensor(self.advantages()?)?,
            BatchKey::OldLogProb => self.old_log_prob()?.clone(),
            BatchKey::NewLogProb => self.new_log_prob()?.clone(),
        };
        Ok(tensor)
    }

    /// Builds a new batch out of the given steps, keeping every populated field aligned.
    pub fn select(&self, indices: &[usize]) -> Result<Self> {
        if indices.is_empty() {
            return Err(PgError::EmptyBatch.into());
        }
        let ids: Vec<u32> = indices.iter().map(|idx| *idx as u32).collect();
        let ids = Tensor::from_vec(ids, indices.len(), self.device())?;
        let pick = |values: &[f32]| indices.iter().map(|idx| values[*idx]).collect::<Vec<_>>();
        let pick_tensor =
            |values: &Option<Tensor>| values.as_ref().map(|t| t.index_select(&ids, 0)).transpose();
        Ok(Self {
            states: self.states.index_select(&ids, 0)?,
            actions: self.actions.index_select(&ids, 0)?,
            rewards: pick(&self.rewards),
            dones: indices.iter().map(|idx| self.dones[*idx]).collect(),
            // mini batches are shuffled, there is no meaningful next state anymore
            last_state_value: 0.,
            state_values: self.state_values.as_deref().map(pick),
            returns: self.returns.as_deref().map(pick),
            vtarget: self.vtarget.as_deref().map(pick),
            advantages: self.advantages.as_deref().map(pick),
            old_log_prob: pick_tensor(&self.old_log_prob)?,
            new_log_prob: pick_tensor(&self.new_log_prob)?,
        })
    }

    pub fn mini_batches(&self, mini_batch_size: usize) -> MiniBatchIterator<'_> {
        MiniBatchIterator::new(self, mini_batch_size)
    }
}

#[cfg(test)]
mod tests {
    use super::{Batch, BatchKey};
    use crate::{error::PgError, utils::rollout_buffer::Trajectory};
    use anyhow::Result;
    use candle_core::{Device, Tensor};

    fn trajectory(rewards: &[f32], truncated: bool) -> Result<Trajectory> {
        let mut trajectory = Trajectory::default();
        for (idx, reward) in rewards.iter().enumerate() {
            let state = Tensor::new(&[*reward, idx as f32], &Device::Cpu)?;
            let action = Tensor::new(idx as u32, &Device::Cpu)?;
            let done = !truncated && idx == rewards.len() - 1;
            trajectory.push_step(state, action, *reward, done);
        }
        let last = Tensor::new(&[0f32, 0.], &Device::Cpu)?;
        trajectory.set_last_state(last, truncated);
        Ok(trajectory)
    }

    #[test]
    fn trajectories_are_stacked_in_order() -> Result<()> {
        let batch = Batch::from_trajectories(vec![
            trajectory(&[1., 2.], false)?,
            trajectory(&[3., 4., 5.], false)?,
        ])?;
        assert_eq!(batch.len(), 5);
        assert_eq!(batch.states().dims(), &[5, 2]);
        assert_eq!(batch.actions().to_vec1::<u32>()?, vec![0, 1, 0, 1, 2]);
        assert_eq!(batch.rewards(), &[1., 2., 3., 4., 5.]);
        assert_eq!(batch.dones(), &[false, true, false, false, true]);
        assert_eq!(batch.last_state_value(), 0.);
        // value estimates are attached by the collector, never by stacking
        assert!(!batch.has(BatchKey::StateValues));
        Ok(())
    }

    #[test]
    fn only_the_final_trajectory_bootstraps() -> Result<()> {
        let mut first = trajectory(&[1.], true)?;
        first.last_state_value = 10.;
        let mut last = trajectory(&[1., 1.], true)?;
        last.last_state_value = 7.;
        let batch = Batch::from_trajectories(vec![first, last])?;
        assert_eq!(batch.dones(), &[true, false, false]);
        assert_eq!(batch.last_state_value(), 7.);
        Ok(())
    }

    #[test]
    fn empty_trajectories_are_rejected() {
        let err = Batch::from_trajectories(vec![Trajectory::default()]).unwrap_err();
        assert_eq!(err.downcast_ref::<PgError>(), Some(&PgError::EmptyBatch));
    }

    #[test]
    fn missing_and_misaligned_fields_fail_fast() -> Result<()> {
        let mut batch = Batch::from_trajectories(vec![trajectory(&[1., 2., 3.], false)?])?;
        let err = batch.advantages().unwrap_err();
        assert_eq!(
            err.downcast_ref::<PgError>(),
            Some(&PgError::MissingField(BatchKey::Advantages))
        );
        let err = batch.set_returns(vec![1., 2.]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<PgError>(),
            Some(&PgError::LengthMismatch {
                key: BatchKey::Returns,
                expected: 3,
                got: 2
            })
        );
        batch.set_advantages(vec![0.; 3])?;
        let err = batch
            .require(&[BatchKey::States, BatchKey::Advantages, BatchKey::Vtarget])
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<PgError>(),
            Some(&PgError::MissingField(BatchKey::Vtarget))
        );
        Ok(())
    }

    #[test]
    fn select_keeps_fields_aligned() -> Result<()> {
        let mut batch = Batch::from_trajectories(vec![trajectory(&[1., 2., 3., 4.], false)?])?;
        batch.set_advantages(vec![10., 20., 30., 40.])?;
        batch.set_old_log_prob(Tensor::new(&[-1f32, -2., -3., -4.], &Device::Cpu)?)?;
        let selected = batch.select(&[3, 1])?;
        assert_eq!(selected.rewards(), &[4., 2.]);
        assert_eq!(selected.advantages()?, &[40., 20.]);
        assert_eq!(selected.actions().to_vec1::<u32>()?, vec![3, 1]);
        assert_eq!(selected.old_log_prob()?.to_vec1::<f32>()?, vec![-4., -2.]);
        assert_eq!(selected.states().to_vec2::<f32>()?[0], vec![4., 3.]);
        assert!(!selected.has(BatchKey::Returns));
        Ok(())
    }
}
