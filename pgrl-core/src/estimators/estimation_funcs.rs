//! Slice level return and advantage recursions. Every function walks the steps backwards and
//! cuts the recursion at `done` steps, so trajectories concatenated into one batch never leak
//! into each other. `last_state_value` is the value of the state following the final step.

pub fn discounted_sum_rewards(
    rewards: &[f32],
    dones: &[bool],
    last_state_value: f32,
    gamma: f32,
) -> Vec<f32> {
    let mut returns = vec![0.; rewards.len()];
    let mut running = last_state_value;
    for i in (0..rewards.len()).rev() {
        let next_non_terminal = if dones[i] { 0. } else { 1. };
        running = rewards[i] + gamma * running * next_non_terminal;
        returns[i] = running;
    }
    returns
}

pub fn td_target(
    rewards: &[f32],
    dones: &[bool],
    state_values: &[f32],
    last_state_value: f32,
    gamma: f32,
) -> Vec<f32> {
    (0..rewards.len())
        .map(|i| {
            let next_value = state_values.get(i + 1).copied().unwrap_or(last_state_value);
            let next_non_terminal = if dones[i] { 0. } else { 1. };
            rewards[i] + gamma * next_value * next_non_terminal
        })
        .collect()
}

pub fn generalized_advantage(
    rewards: &[f32],
    dones: &[bool],
    state_values: &[f32],
    last_state_value: f32,
    gamma: f32,
    lambda: f32,
) -> Vec<f32> {
    let total_steps = rewards.len();
    let mut advantages = vec![0.; total_steps];
    let mut last_gae_lam = 0.;
    for i in (0..total_steps).rev() {
        let next_non_terminal = if dones[i] { 0. } else { 1. };
        let next_value = state_values.get(i + 1).copied().unwrap_or(last_state_value);
        let delta = rewards[i] + next_non_terminal * gamma * next_value - state_values[i];
        last_gae_lam = delta + next_non_terminal * gamma * lambda * last_gae_lam;
        advantages[i] = last_gae_lam;
    }
    advantages
}

/// Zero mean, unit standard deviation.
pub fn normalize(values: &mut [f32]) {
    if values.is_empty() {
        return;
    }
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    let variance = values.iter().map(|x| (*x - mean).powi(2)).sum::<f32>() / values.len() as f32;
    let std = variance.sqrt() + 1e-8;
    for x in values.iter_mut() {
        *x = (*x - mean) / std;
    }
}
