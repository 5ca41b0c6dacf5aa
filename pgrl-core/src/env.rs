use crate::{rng, utils::rollout_buffer::Trajectory};
use anyhow::Result;
use candle_core::Tensor;
use serde::{Deserialize, Serialize};
use std::mem;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Space {
    Discrete(usize),
    Continuous {
        min: Option<Vec<f32>>,
        max: Option<Vec<f32>>,
        size: usize,
    },
}

impl Space {
    pub fn continuous_from_dims(dims: Vec<usize>) -> Self {
        Self::Continuous {
            min: None,
            max: None,
            size: dims.iter().product(),
        }
    }

    pub fn size(&self) -> usize {
        match &self {
            Self::Discrete(size) => *size,
            Self::Continuous { size, .. } => *size,
        }
    }

    pub fn is_discrete(&self) -> bool {
        matches!(self, Self::Discrete(..))
    }
}

/// Shape information of an environment. For discrete action spaces the action size is the
/// number of available actions, the sampled actions themselves are scalar indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentDescription {
    pub observation_space: Space,
    pub action_space: Space,
}

impl EnvironmentDescription {
    pub fn new(observation_space: Space, action_space: Space) -> Self {
        Self {
            observation_space,
            action_space,
        }
    }

    pub fn action_size(&self) -> usize {
        self.action_space.size()
    }

    pub fn observation_size(&self) -> usize {
        self.observation_space.size()
    }
}

pub struct SnapShot {
    pub state: Tensor,
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
}

pub trait Env {
    /// Starts a new episode and returns the first, flattened observation.
    fn reset(&mut self, seed: u64) -> Result<Tensor>;

    fn step(&mut self, action: &Tensor) -> Result<SnapShot>;

    fn env_description(&self) -> EnvironmentDescription;
}

impl<E: Env + ?Sized> Env for Box<E> {
    fn reset(&mut self, seed: u64) -> Result<Tensor> {
        (**self).reset(seed)
    }

    fn step(&mut self, action: &Tensor) -> Result<SnapShot> {
        (**self).step(action)
    }

    fn env_description(&self) -> EnvironmentDescription {
        (**self).env_description()
    }
}

/// Episode left unfinished by a step budget, picked up by the next `run_n_steps` call.
struct OpenEpisode {
    state: Tensor,
    reward: f32,
}

/// Wraps an environment and keeps the bookkeeping agents rely on: finished episodes, steps
/// taken and the total reward of every finished episode.
pub struct TrackedEnv {
    env: Box<dyn Env>,
    description: EnvironmentDescription,
    num_episodes: usize,
    num_steps: usize,
    rewards: Vec<f32>,
    open_episode: Option<OpenEpisode>,
}

impl TrackedEnv {
    pub fn new(env: Box<dyn Env>) -> Self {
        let description = env.env_description();
        Self {
            env,
            description,
            num_episodes: 0,
            num_steps: 0,
            rewards: vec![],
            open_episode: None,
        }
    }

    pub fn num_episodes(&self) -> usize {
        self.num_episodes
    }

    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    pub fn rewards(&self) -> &[f32] {
        &self.rewards
    }

    pub fn description(&self) -> &EnvironmentDescription {
        &self.description
    }

    fn finish_episode(&mut self, episode_reward: f32) {
        self.num_episodes += 1;
        self.rewards.push(episode_reward);
        debug!(
            episode = self.num_episodes,
            reward = episode_reward,
            "episode finished"
        );
    }

    /// Runs the env until it reports a terminated or truncated step. An episode left open by
    /// `run_n_steps` is abandoned.
    pub fn run_one_episode<F>(&mut self, mut select_action: F) -> Result<Trajectory>
    where
        F: FnMut(&Tensor) -> Result<Tensor>,
    {
        if self.open_episode.take().is_some() {
            debug!("dropping the episode left open by a step budget");
        }
        let mut trajectory = Trajectory::default();
        let mut state = self.env.reset(rng::random_seed())?;
        let mut episode_reward = 0.;
        loop {
            let action = select_action(&state)?;
            let SnapShot {
                state: next_state,
                reward,
                terminated,
                truncated,
            } = self.env.step(&action)?;
            let done = terminated || truncated;
            trajectory.push_step(state, action, reward, done);
            self.num_steps += 1;
            episode_reward += reward;
            state = next_state;
            if done {
                break;
            }
        }
        trajectory.set_last_state(state, false);
        self.finish_episode(episode_reward);
        Ok(trajectory)
    }

    /// Collects exactly `n_steps` transitions. Finished episodes become separate trajectories;
    /// the last one is cut by the step budget unless it happened to end on the final step. A
    /// cut episode stays open and the next call continues it.
    pub fn run_n_steps<F>(
        &mut self,
        n_steps: usize,
        mut select_action: F,
    ) -> Result<Vec<Trajectory>>
    where
        F: FnMut(&Tensor) -> Result<Tensor>,
    {
        let mut trajectories = vec![];
        let mut trajectory = Trajectory::default();
        let OpenEpisode {
            mut state,
            reward: mut episode_reward,
        } = match self.open_episode.take() {
            Some(open) => open,
            None => OpenEpisode {
                state: self.env.reset(rng::random_seed())?,
                reward: 0.,
            },
        };
        for step in 0..n_steps {
            let action = select_action(&state)?;
            let SnapShot {
                state: next_state,
                reward,
                terminated,
                truncated,
            } = self.env.step(&action)?;
            let done = terminated || truncated;
            trajectory.push_step(state, action, reward, done);
            self.num_steps += 1;
            episode_reward += reward;
            if done {
                trajectory.set_last_state(next_state, false);
                trajectories.push(mem::take(&mut trajectory));
                self.finish_episode(mem::take(&mut episode_reward));
                if step + 1 == n_steps {
                    return Ok(trajectories);
                }
                state = self.env.reset(rng::random_seed())?;
            } else {
                state = next_state;
            }
        }
        trajectory.set_last_state(state.clone(), true);
        trajectories.push(trajectory);
        self.open_episode = Some(OpenEpisode {
            state,
            reward: episode_reward,
        });
        Ok(trajectories)
    }
}
