use super::pg_model::PGModel;
use crate::{
    distributions::Distribution,
    tensors::{EntropyLoss, LogProbs, PolicyLoss, ProbRatio, ValueLoss},
    utils::batch::{Batch, BatchKey},
};
use anyhow::Result;
use candle_core::Tensor;
use std::fmt::Debug;

pub type LossFn = Box<dyn Fn(&PGModel, &Batch) -> Result<Tensor> + Send + Sync>;

/// Ordered, named loss terms. Every registered loss is evaluated on each update and the
/// contributions are summed.
#[derive(Default)]
pub struct LossRegistry {
    losses: Vec<(&'static str, LossFn)>,
}

impl Debug for LossRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl LossRegistry {
    pub fn register<F>(mut self, name: &'static str, loss: F) -> Self
    where
        F: Fn(&PGModel, &Batch) -> Result<Tensor> + Send + Sync + 'static,
    {
        self.losses.push((name, Box::new(loss)));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.losses.iter().map(|(name, _)| *name)
    }

    pub fn len(&self) -> usize {
        self.losses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.losses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &LossFn)> {
        self.losses.iter().map(|(name, loss)| (*name, loss))
    }
}

/// Scalar values of the loss terms of the last update, in registration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LossTerms {
    pub terms: Vec<(&'static str, f32)>,
}

impl LossTerms {
    pub fn total(&self) -> f32 {
        self.terms.iter().map(|(_, value)| value).sum()
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.terms
            .iter()
            .find(|(term, _)| *term == name)
            .map(|(_, value)| *value)
    }
}

pub fn calculate_prob_ratio(new_log_probs: &LogProbs, old_log_probs: &LogProbs) -> Result<ProbRatio> {
    let ratio = (&new_log_probs.0 - &old_log_probs.0)?.exp()?;
    Ok(ProbRatio(ratio))
}

/// `-(log_prob(action) * advantage).mean()` with the distribution built at the start of the
/// update.
pub fn policy_gradient_loss(model: &PGModel, batch: &Batch) -> Result<PolicyLoss> {
    let log_probs = model.dists()?.log_prob(batch.actions())?;
    let advantages = batch.tensor(BatchKey::Advantages)?;
    let loss = log_probs.mul(&advantages)?.mean_all()?.neg()?;
    Ok(PolicyLoss(loss))
}

/// Importance weighted objective `-(ratio * advantage).mean()`.
pub fn surrogate_policy_gradient_loss(batch: &Batch) -> Result<PolicyLoss> {
    let prob_ratio = batch_prob_ratio(batch)?;
    let advantages = batch.tensor(BatchKey::Advantages)?;
    let loss = prob_ratio.mul(&advantages)?.mean_all()?.neg()?;
    Ok(PolicyLoss(loss))
}

/// PPO objective, `-min(ratio * A, clip(ratio, 1 - eps, 1 + eps) * A).mean()`.
pub fn clipped_surrogate_loss(batch: &Batch, clip_range: f32) -> Result<PolicyLoss> {
    let prob_ratio = batch_prob_ratio(batch)?;
    let advantages = batch.tensor(BatchKey::Advantages)?;
    let surr1 = prob_ratio.mul(&advantages)?;
    let surr2 = prob_ratio
        .clamp(1. - clip_range, 1. + clip_range)?
        .mul(&advantages)?;
    let loss = surr1.minimum(&surr2)?.mean_all()?.neg()?;
    Ok(PolicyLoss(loss))
}

/// Mean squared error between the value predictions and `vtarget`, scaled by `value_coef`.
pub fn value_loss(model: &PGModel, batch: &Batch) -> Result<ValueLoss> {
    let values_pred = model.value_predictions(batch.states())?;
    let vtarget = batch.tensor(BatchKey::Vtarget)?;
    let loss = candle_nn::loss::mse(&values_pred, &vtarget)?.affine(model.value_coef() as f64, 0.)?;
    Ok(ValueLoss(loss))
}

/// `-entropy_coef * entropy.mean()`, rewards spread out action distributions.
pub fn entropy_loss(model: &PGModel, _batch: &Batch) -> Result<EntropyLoss> {
    let entropy = model.dists()?.entropy()?.mean_all()?;
    let loss = entropy.affine(-(model.entropy_coef() as f64), 0.)?;
    Ok(EntropyLoss(loss))
}

fn batch_prob_ratio(batch: &Batch) -> Result<ProbRatio> {
    let new_log_probs = LogProbs(batch.new_log_prob()?.clone());
    let old_log_probs = LogProbs(batch.old_log_prob()?.clone());
    calculate_prob_ratio(&new_log_probs, &old_log_probs)
}
