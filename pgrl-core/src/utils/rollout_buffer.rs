use candle_core::Tensor;

/// One episode (or the part of it collected before a step budget ran out).
#[derive(Debug, Clone, Default)]
pub struct Trajectory {
    pub states: Vec<Tensor>,
    pub actions: Vec<Tensor>,
    pub rewards: Vec<f32>,
    pub dones: Vec<bool>,
    /// Observation reached after the final step.
    pub last_state: Option<Tensor>,
    /// Collection stopped before the episode finished.
    pub truncated: bool,
    /// Value estimate of `last_state`, only non zero for truncated trajectories.
    pub last_state_value: f32,
}

impl Trajectory {
    pub fn push_step(&mut self, state: Tensor, action: Tensor, reward: f32, done: bool) {
        self.states.push(state);
        self.actions.push(action);
        self.rewards.push(reward);
        self.dones.push(done);
    }

    pub fn set_last_state(&mut self, state: Tensor, truncated: bool) {
        self.last_state = Some(state);
        self.truncated = truncated;
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn total_reward(&self) -> f32 {
        self.rewards.iter().sum()
    }
}
