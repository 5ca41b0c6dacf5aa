use crate::TrainingBudget;
use anyhow::Result;
use candle_core::Tensor;
use pgrl_core::{
    env::TrackedEnv, logger::Logger, models::Model, utils::rollout_buffer::Trajectory,
};
use tracing::warn;

/// Presents a single observation as a batch of one and unwraps the sampled action, a scalar
/// index for discrete action spaces.
pub fn select_single_action<M: Model>(model: &mut M, state: &Tensor) -> Result<Tensor> {
    let action = model.select_action(&state.unsqueeze(0)?)?;
    Ok(action.squeeze(0)?)
}

/// The parts every agent shares: the tracked env, the model and the bookkeeping around
/// termination and logging.
pub struct BaseAgent<M: Model> {
    pub env: TrackedEnv,
    pub model: M,
    pub gamma: f32,
    pub logger: Logger,
    budget: TrainingBudget,
    log_every: usize,
    last_logged_ep: usize,
}

impl<M: Model> BaseAgent<M> {
    pub fn new(env: TrackedEnv, model: M, gamma: f32) -> Self {
        let last_logged_ep = env.num_episodes();
        Self {
            env,
            model,
            gamma,
            logger: Logger::new(),
            budget: TrainingBudget::default(),
            log_every: 1,
            last_logged_ep,
        }
    }

    pub fn with_log_every(mut self, log_every: usize) -> Self {
        self.log_every = log_every.max(1);
        self
    }

    pub fn budget(&self) -> TrainingBudget {
        self.budget
    }

    /// Stores the budget of the run that is about to start.
    pub fn start(&mut self, budget: TrainingBudget) {
        if budget.is_unbounded() {
            warn!("training without any bound, it only stops on error");
        }
        self.budget = budget;
    }

    pub fn select_action(&mut self, state: &Tensor) -> Result<Tensor> {
        select_single_action(&mut self.model, state)
    }

    pub fn run_one_episode(&mut self) -> Result<Trajectory> {
        let model = &mut self.model;
        self.env.run_one_episode(|state| select_single_action(model, state))
    }

    pub fn check_termination(&self) -> bool {
        self.budget.is_exhausted(
            self.model.num_updates(),
            self.env.num_episodes(),
            self.env.num_steps(),
        )
    }

    /// Logs every `log_every` updates.
    pub fn maybe_write_logs(&mut self) -> Result<()> {
        if self.model.num_updates() % self.log_every == 0 {
            self.write_logs()?;
        }
        Ok(())
    }

    pub fn write_logs(&mut self) -> Result<()> {
        let num_episodes = self.env.num_episodes();
        let new_eps = num_episodes - self.last_logged_ep;
        self.last_logged_ep = num_episodes;
        if new_eps > 0 {
            let rewards = &self.env.rewards()[self.env.rewards().len() - new_eps..];
            let mean = rewards.iter().sum::<f32>() / new_eps as f32;
            self.logger.add_log("Reward/Episode", mean, 2);
        } else {
            warn!("no episode finished since the last log");
        }
        self.model.write_logs(&mut self.logger)?;
        self.logger.log(&format!(
            "Update {} | Episode {} | Step {}",
            self.model.num_updates(),
            num_episodes,
            self.env.num_steps()
        ));
        self.logger.timeit(self.env.num_steps(), self.budget.max_steps());
        Ok(())
    }

    /// Mean total reward over every finished episode, 0 before the first one.
    pub fn mean_reward(&self) -> f32 {
        let rewards = self.env.rewards();
        if rewards.is_empty() {
            return 0.;
        }
        rewards.iter().sum::<f32>() / rewards.len() as f32
    }
}
