//! Deterministic environments for tests.

use crate::{
    env::{Env, EnvironmentDescription, SnapShot, Space},
    error::PgError,
    registry::ObjRegistry,
};
use anyhow::Result;
use candle_core::{Device, Tensor};

fn discrete_action(action: &Tensor) -> Result<u32> {
    let action = action.flatten_all()?.to_vec1::<u32>()?;
    action
        .first()
        .copied()
        .ok_or_else(|| PgError::InvalidConfig("empty action".to_owned()).into())
}

/// Episodes of exactly `length` steps with a reward of 1 per step. The observation is the
/// fraction of steps left, actions are ignored.
#[derive(Debug, Clone)]
pub struct CountdownEnv {
    length: usize,
    remaining: usize,
}

impl CountdownEnv {
    pub fn new(length: usize) -> Self {
        Self {
            length,
            remaining: length,
        }
    }

    /// Reads `{ "length": n }`, defaulting to 5.
    pub fn from_args(args: &serde_json::Value) -> Result<Self> {
        let length = args.get("length").and_then(|l| l.as_u64()).unwrap_or(5) as usize;
        if length == 0 {
            return Err(PgError::InvalidConfig("countdown length must be positive".to_owned()).into());
        }
        Ok(Self::new(length))
    }

    fn observation(&self) -> Result<Tensor> {
        let left = self.remaining as f32 / self.length as f32;
        Ok(Tensor::new(&[left], &Device::Cpu)?)
    }
}

impl Env for CountdownEnv {
    fn reset(&mut self, _seed: u64) -> Result<Tensor> {
        self.remaining = self.length;
        self.observation()
    }

    fn step(&mut self, _action: &Tensor) -> Result<SnapShot> {
        self.remaining = self.remaining.saturating_sub(1);
        Ok(SnapShot {
            state: self.observation()?,
            reward: 1.,
            terminated: self.remaining == 0,
            truncated: false,
        })
    }

    fn env_description(&self) -> EnvironmentDescription {
        EnvironmentDescription::new(Space::continuous_from_dims(vec![1]), Space::Discrete(2))
    }
}

/// Single step episodes. Pulling arm `best` pays 1, every other arm pays 0.
#[derive(Debug, Clone)]
pub struct BanditEnv {
    arms: usize,
    best: u32,
}

impl BanditEnv {
    pub fn new(arms: usize, best: u32) -> Self {
        Self { arms, best }
    }

    /// Reads `{ "arms": n, "best": i }`, defaulting to two arms with arm 0 paying.
    pub fn from_args(args: &serde_json::Value) -> Result<Self> {
        let arms = args.get("arms").and_then(|a| a.as_u64()).unwrap_or(2) as usize;
        let best = args.get("best").and_then(|b| b.as_u64()).unwrap_or(0) as u32;
        if best as usize >= arms {
            return Err(PgError::InvalidConfig(format!("arm {best} out of {arms}")).into());
        }
        Ok(Self::new(arms, best))
    }
}

impl Env for BanditEnv {
    fn reset(&mut self, _seed: u64) -> Result<Tensor> {
        Ok(Tensor::new(&[1f32], &Device::Cpu)?)
    }

    fn step(&mut self, action: &Tensor) -> Result<SnapShot> {
        let reward = if discrete_action(action)? == self.best { 1. } else { 0. };
        Ok(SnapShot {
            state: Tensor::new(&[1f32], &Device::Cpu)?,
            reward,
            terminated: true,
            truncated: false,
        })
    }

    fn env_description(&self) -> EnvironmentDescription {
        EnvironmentDescription::new(Space::continuous_from_dims(vec![1]), Space::Discrete(self.arms))
    }
}

/// A registry with `countdown` and `bandit` registered.
pub fn test_registry() -> ObjRegistry {
    let mut registry = ObjRegistry::new();
    registry
        .register("countdown", |args| Ok(Box::new(CountdownEnv::from_args(args)?)))
        .register("bandit", |args| Ok(Box::new(BanditEnv::from_args(args)?)));
    registry
}
