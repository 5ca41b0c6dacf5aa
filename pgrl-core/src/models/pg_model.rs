use super::losses::{LossRegistry, LossTerms};
use crate::{
    config::ModelConfig,
    distributions::{
        Distribution, DistributionKind, categorical_distribution::CategoricalDistribution,
        diagonal_distribution::DiagGaussianDistribution,
    },
    env::EnvironmentDescription,
    error::PgError,
    logger::Logger,
    network::Network,
    optimizer::OptimizerWithMaxGrad,
    tensors::ValuesPred,
    utils::batch::Batch,
};
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{Init, Module, VarBuilder, VarMap, ops::softmax};
use std::sync::Arc;
use tracing::{debug, warn};

/// Distributions kept for the duration of one training step.
#[derive(Debug, Default)]
pub struct Memory {
    pub dists: Option<DistributionKind>,
    pub old_dists: Option<DistributionKind>,
}

/// Policy network, optional value network and the single optimizer that trains both. The
/// concrete models decide which losses are evaluated and when distributions are built.
#[derive(Debug)]
pub struct PGModel {
    policy_nn: Network,
    value_nn: Option<Network>,
    log_std: Option<Tensor>,
    optimizer: OptimizerWithMaxGrad,
    entropy_coef: f32,
    value_coef: f32,
    saved_dists: Vec<DistributionKind>,
    pub memory: Memory,
    pub num_updates: usize,
    last_losses: LossTerms,
    device: Device,
}

impl PGModel {
    pub fn from_config(
        config: &ModelConfig,
        description: &EnvironmentDescription,
        device: &Device,
    ) -> Result<Self> {
        config.validate()?;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let (policy_nn, value_nn, log_std) = Self::create_networks(config, description, &vb)?;
        let optimizer = OptimizerWithMaxGrad::new(
            varmap,
            config.learning_rate,
            config.weight_decay,
            config.max_grad_norm,
        )?;
        Ok(Self {
            policy_nn,
            value_nn,
            log_std,
            optimizer,
            entropy_coef: config.entropy_coef,
            value_coef: config.value_coef,
            saved_dists: vec![],
            memory: Memory::default(),
            num_updates: 0,
            last_losses: LossTerms::default(),
            device: device.clone(),
        })
    }

    /// Registers every parameter in `vb`. With `share_body` the value head runs on the policy
    /// body handle instead of a body of its own.
    fn create_networks(
        config: &ModelConfig,
        description: &EnvironmentDescription,
        vb: &VarBuilder,
    ) -> Result<(Network, Option<Network>, Option<Tensor>)> {
        let observation_size = description.observation_size();
        let action_size = description.action_size();
        let policy_nn = Network::build(observation_size, action_size, &config.policy_nn, vb, "policy")?;
        let log_std = if description.action_space.is_discrete() {
            None
        } else {
            Some(vb.get_with_hints(action_size, "log_std", Init::Const(0.))?)
        };
        let value_nn = match &config.value_nn {
            Some(value_config) if config.share_body => Some(Network::with_body(
                Arc::clone(policy_nn.body()),
                policy_nn.features(),
                1,
                value_config,
                vb,
                "value",
            )?),
            Some(value_config) => Some(Network::build(observation_size, 1, value_config, vb, "value")?),
            None => {
                if config.share_body {
                    warn!("share_body is set but no value network is configured");
                }
                None
            }
        };
        Ok((policy_nn, value_nn, log_std))
    }

    pub fn policy_nn(&self) -> &Network {
        &self.policy_nn
    }

    pub fn value_nn(&self) -> Option<&Network> {
        self.value_nn.as_ref()
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn entropy_coef(&self) -> f32 {
        self.entropy_coef
    }

    pub fn value_coef(&self) -> f32 {
        self.value_coef
    }

    pub fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }

    pub fn last_losses(&self) -> &LossTerms {
        &self.last_losses
    }

    pub fn saved_dists(&self) -> &[DistributionKind] {
        &self.saved_dists
    }

    /// Action probabilities for discrete action spaces, means for continuous ones.
    pub fn forward(&self, states: &Tensor) -> Result<Tensor> {
        let outputs = self.policy_nn.forward(states)?;
        match self.log_std {
            None => Ok(softmax(&outputs, 1)?),
            Some(_) => Ok(outputs),
        }
    }

    pub fn create_dist(&self, states: &Tensor) -> Result<DistributionKind> {
        let parameters = self.forward(states)?;
        let dist = match &self.log_std {
            None => CategoricalDistribution::from_probs(&parameters)?.into(),
            Some(log_std) => DiagGaussianDistribution::new(parameters, log_std.clone())?.into(),
        };
        Ok(dist)
    }

    /// Samples one action per state. The distribution is kept, detached, for entropy logging.
    pub fn select_action(&mut self, states: &Tensor) -> Result<Tensor> {
        let dist = self.create_dist(states)?.detach();
        let action = dist.sample()?;
        self.saved_dists.push(dist);
        Ok(action)
    }

    /// Value predictions of shape `(N,)` that keep gradient tracking.
    pub fn value_predictions(&self, states: &Tensor) -> Result<ValuesPred> {
        let value_nn = self
            .value_nn
            .as_ref()
            .ok_or_else(|| PgError::InvalidConfig("model has no value network".to_owned()))?;
        Ok(ValuesPred(value_nn.forward(states)?.squeeze(1)?))
    }

    pub fn state_values(&self, states: &Tensor) -> Result<Option<Vec<f32>>> {
        if self.value_nn.is_none() {
            return Ok(None);
        }
        let values = self.value_predictions(states)?.detach();
        Ok(Some(values.to_vec1()?))
    }

    /// The distribution the current update evaluates its losses with.
    pub fn dists(&self) -> Result<&DistributionKind> {
        self.memory.dists.as_ref().ok_or_else(|| {
            PgError::InvalidTransition {
                from: "init",
                to: "loss_evaluation",
            }
            .into()
        })
    }

    pub fn set_dists(&mut self, batch: &Batch) -> Result<()> {
        self.memory.dists = Some(self.create_dist(batch.states())?);
        Ok(())
    }

    /// Evaluates the registry in order and sums the contributions.
    pub fn add_losses(&self, registry: &LossRegistry, batch: &Batch) -> Result<(Tensor, LossTerms)> {
        let mut total: Option<Tensor> = None;
        let mut terms = LossTerms::default();
        for (name, loss_fn) in registry.iter() {
            let loss = loss_fn(self, batch)?;
            terms.terms.push((name, loss.to_scalar::<f32>()?));
            total = Some(match total {
                Some(total) => (total + loss)?,
                None => loss,
            });
        }
        let total = total.ok_or_else(|| PgError::InvalidConfig("no losses registered".to_owned()))?;
        Ok((total, terms))
    }

    /// One gradient step on the summed losses.
    pub fn optimize(&mut self, registry: &LossRegistry, batch: &Batch) -> Result<()> {
        let (loss, terms) = self.add_losses(registry, batch)?;
        self.optimizer.backward_step(&loss)?;
        debug!(?terms, "optimizer step");
        self.last_losses = terms;
        Ok(())
    }

    pub fn write_logs(&mut self, logger: &mut Logger) -> Result<()> {
        if !self.saved_dists.is_empty() {
            let mut entropy_sum = 0.;
            let mut count = 0;
            for dist in self.saved_dists.drain(..) {
                entropy_sum += dist.entropy()?.sum_all()?.to_scalar::<f32>()?;
                count += dist.len()?;
            }
            logger.add_log("Policy/Entropy", entropy_sum / count.max(1) as f32, 4);
        }
        for (name, value) in &self.last_losses.terms {
            logger.add_log(format!("Loss/{name}"), *value, 4);
        }
        Ok(())
    }
}
