use crate::base_agent::{BaseAgent, select_single_action};
use anyhow::Result;
use pgrl_core::{models::Model, utils::batch::Batch};
use tracing::debug;

impl<M: Model> BaseAgent<M> {
    /// Collects whole episodes until `timesteps_per_batch` steps or `episodes_per_batch`
    /// episodes are reached. Negative budgets are unbounded; at least one episode is always
    /// collected.
    pub fn generate_batch(&mut self, timesteps_per_batch: i64, episodes_per_batch: i64) -> Result<Batch> {
        let mut trajectories = vec![];
        let mut steps = 0;
        loop {
            let trajectory = self.run_one_episode()?;
            steps += trajectory.len();
            trajectories.push(trajectory);
            let episodes = trajectories.len();
            let steps_done = timesteps_per_batch >= 0 && steps as i64 >= timesteps_per_batch;
            let episodes_done = episodes_per_batch >= 0 && episodes as i64 >= episodes_per_batch;
            if steps_done || episodes_done || (timesteps_per_batch < 0 && episodes_per_batch < 0) {
                break;
            }
        }
        debug!(episodes = trajectories.len(), steps, "batch collected");
        let mut batch = Batch::from_trajectories(trajectories)?;
        self.add_state_values(&mut batch)?;
        Ok(batch)
    }

    /// Collects exactly `n_steps` steps. An episode cut by the budget is bootstrapped with the
    /// value of its final observation.
    pub fn generate_step_batch(&mut self, n_steps: usize) -> Result<Batch> {
        let model = &mut self.model;
        let mut trajectories = self
            .env
            .run_n_steps(n_steps, |state| select_single_action(model, state))?;
        if let Some(trajectory) = trajectories.last_mut() {
            if let (true, Some(last_state)) = (trajectory.truncated, &trajectory.last_state) {
                let values = self.model.state_values(&last_state.unsqueeze(0)?)?;
                trajectory.last_state_value =
                    values.and_then(|v| v.first().copied()).unwrap_or(0.);
            }
        }
        let mut batch = Batch::from_trajectories(trajectories)?;
        self.add_state_values(&mut batch)?;
        Ok(batch)
    }

    fn add_state_values(&self, batch: &mut Batch) -> Result<()> {
        if let Some(values) = self.model.state_values(batch.states())? {
            batch.set_state_values(values)?;
        }
        Ok(())
    }
}
