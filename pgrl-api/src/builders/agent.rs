use anyhow::Result;
use pgrl_agents::{
    Agent, ConfigurableAgent, PPOAgent, ReinforceAgent, TrainingBudget, VanillaPGAgent,
};
use pgrl_core::{
    config::{Config, NetworkConfig, PPOConfig},
    env::Env,
    error::PgError,
    models::{Model, PPOModel, SurrogatePGModel},
    registry::ObjRegistry,
};
use serde::{Deserialize, Serialize};
use std::{path::Path, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentType {
    #[serde(rename = "reinforce")]
    Reinforce,
    #[serde(rename = "vanilla_pg", alias = "vpg")]
    VanillaPG,
    #[serde(rename = "surrogate")]
    Surrogate,
    #[serde(rename = "ppo")]
    PPO,
}

impl FromStr for AgentType {
    type Err = PgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reinforce" => Ok(Self::Reinforce),
            "vanilla_pg" | "vpg" => Ok(Self::VanillaPG),
            "surrogate" => Ok(Self::Surrogate),
            "ppo" => Ok(Self::PPO),
            other => Err(PgError::UnknownObject(other.to_owned())),
        }
    }
}

pub enum AgentKind {
    Reinforce(ReinforceAgent),
    VanillaPG(VanillaPGAgent),
    Surrogate(PPOAgent<SurrogatePGModel>),
    PPO(PPOAgent<PPOModel>),
}

macro_rules! dispatch {
    ($kind:expr, $agent:ident => $body:expr) => {
        match $kind {
            AgentKind::Reinforce($agent) => $body,
            AgentKind::VanillaPG($agent) => $body,
            AgentKind::Surrogate($agent) => $body,
            AgentKind::PPO($agent) => $body,
        }
    };
}

impl AgentKind {
    /// `(updates, episodes, steps)` done so far.
    pub fn progress(&self) -> (usize, usize, usize) {
        dispatch!(self, agent => (
            agent.base.model.num_updates(),
            agent.base.env.num_episodes(),
            agent.base.env.num_steps(),
        ))
    }

    /// Total reward of every finished episode, oldest first.
    pub fn episode_rewards(&self) -> &[f32] {
        dispatch!(self, agent => agent.base.env.rewards())
    }
}

impl Agent for AgentKind {
    fn train(&mut self, budget: TrainingBudget) -> Result<f32> {
        dispatch!(self, agent => agent.train(budget))
    }
}

pub struct AgentBuilder {
    pub agent_type: AgentType,
    pub config: Config,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        let mut config = Config::default();
        config.model.policy_nn = NetworkConfig {
            body: vec![64, 64],
            head: vec![],
        };
        config.model.value_nn = Some(NetworkConfig {
            body: vec![64, 64],
            head: vec![],
        });
        config.model.ppo = PPOConfig {
            clip_range: 0.2,
            num_epochs: 4,
            mini_batch_size: 64,
        };
        config.agent.gamma = 0.98;
        config.agent.lambda = 0.8;
        Self {
            agent_type: AgentType::PPO,
            config,
        }
    }
}

impl AgentBuilder {
    pub fn new(agent_type: AgentType, config: Config) -> Self {
        Self { agent_type, config }
    }

    pub fn from_file(agent_type: AgentType, path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(agent_type, Config::load(path)?))
    }

    pub fn build(&self, env: Option<Box<dyn Env>>, registry: &ObjRegistry) -> Result<AgentKind> {
        let config = &self.config;
        let agent = match self.agent_type {
            AgentType::Reinforce => {
                AgentKind::Reinforce(ReinforceAgent::from_config(config, env, registry)?)
            }
            AgentType::VanillaPG => {
                AgentKind::VanillaPG(VanillaPGAgent::from_config(config, env, registry)?)
            }
            AgentType::Surrogate => AgentKind::Surrogate(PPOAgent::from_config(config, env, registry)?),
            AgentType::PPO => AgentKind::PPO(PPOAgent::from_config(config, env, registry)?),
        };
        Ok(agent)
    }
}
