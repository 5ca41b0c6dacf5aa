use crate::error::PgError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Named constructor call resolved through an [`ObjRegistry`](crate::registry::ObjRegistry),
/// e.g. `{ "func": "countdown", "args": { "length": 5 } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjSpec {
    pub func: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvConfig {
    pub obj: ObjSpec,
}

/// Hidden layer sizes. Body layers are all followed by a ReLU, the head gets a final linear
/// output layer sized by the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub body: Vec<usize>,
    pub head: Vec<usize>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            body: vec![64],
            head: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PPOConfig {
    /// Probability ratio clipping epsilon (default: 0.2).
    pub clip_range: f32,
    /// Passes over every batch (default: 4).
    pub num_epochs: usize,
    /// (default: 64).
    pub mini_batch_size: usize,
}

impl Default for PPOConfig {
    fn default() -> Self {
        Self {
            clip_range: 0.2,
            num_epochs: 4,
            mini_batch_size: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub policy_nn: NetworkConfig,
    /// No value network is built when missing.
    pub value_nn: Option<NetworkConfig>,
    /// Run the value head on top of the policy body.
    pub share_body: bool,
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub max_grad_norm: Option<f32>,
    pub entropy_coef: f32,
    pub value_coef: f32,
    pub ppo: PPOConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            policy_nn: NetworkConfig::default(),
            value_nn: None,
            share_body: false,
            learning_rate: 1e-3,
            weight_decay: 0.01,
            max_grad_norm: None,
            entropy_coef: 0.,
            value_coef: 1.,
            ppo: PPOConfig::default(),
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.learning_rate <= 0. {
            return Err(PgError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            ))
            .into());
        }
        if self.ppo.clip_range <= 0. {
            return Err(PgError::InvalidConfig(format!(
                "clip_range must be positive, got {}",
                self.ppo.clip_range
            ))
            .into());
        }
        if self.ppo.num_epochs == 0 || self.ppo.mini_batch_size == 0 {
            return Err(PgError::InvalidConfig(
                "num_epochs and mini_batch_size must be at least 1".to_owned(),
            )
            .into());
        }
        Ok(())
    }
}

/// Batch budgets are `i64` where a negative value means unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub gamma: f32,
    /// GAE lambda (default: 0.95).
    pub lambda: f32,
    pub timesteps_per_batch: i64,
    pub episodes_per_batch: i64,
    /// Steps collected per update by step bound agents (default: 2048).
    pub steps_per_batch: usize,
    pub normalize_advantages: bool,
    /// Write logs every `log_every` updates (default: 1).
    pub log_every: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            lambda: 0.95,
            timesteps_per_batch: -1,
            episodes_per_batch: 1,
            steps_per_batch: 2048,
            normalize_advantages: false,
            log_every: 1,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.gamma > 0. && self.gamma <= 1.) {
            return Err(PgError::InvalidConfig(format!(
                "gamma must be in (0, 1], got {}",
                self.gamma
            ))
            .into());
        }
        if !(0. ..=1.).contains(&self.lambda) {
            return Err(PgError::InvalidConfig(format!(
                "lambda must be in [0, 1], got {}",
                self.lambda
            ))
            .into());
        }
        if self.steps_per_batch == 0 {
            return Err(
                PgError::InvalidConfig("steps_per_batch must be at least 1".to_owned()).into(),
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub env: Option<EnvConfig>,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        Self::from_json_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.model.validate()?;
        config.agent.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::Config;
    use crate::error::PgError;
    use anyhow::Result;

    #[test]
    fn missing_sections_fall_back_to_defaults() -> Result<()> {
        let config = Config::from_json_str(
            r#"{
                "env": { "obj": { "func": "countdown", "args": { "length": 3 } } },
                "model": { "value_nn": { "body": [32] }, "share_body": true },
                "agent": { "gamma": 0.9 }
            }"#,
        )?;
        let env = config.env.unwrap();
        assert_eq!(env.obj.func, "countdown");
        assert_eq!(env.obj.args["length"], 3);
        let value_nn = config.model.value_nn.unwrap();
        assert_eq!(value_nn.body, vec![32]);
        assert!(value_nn.head.is_empty());
        assert_eq!(config.model.value_coef, 1.);
        assert_eq!(config.model.weight_decay, 0.01);
        assert_eq!(config.model.ppo.clip_range, 0.2);
        assert_eq!(config.agent.gamma, 0.9);
        assert_eq!(config.agent.timesteps_per_batch, -1);
        Ok(())
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let err = Config::from_json_str(r#"{ "agent": { "gamma": 1.5 } }"#).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PgError>(),
            Some(PgError::InvalidConfig(_))
        ));
        let err = Config::from_json_str(r#"{ "model": { "learning_rate": 0.0 } }"#).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PgError>(),
            Some(PgError::InvalidConfig(_))
        ));
    }
}
