use super::Distribution;
use crate::rng::RNG;
use anyhow::Result;
use candle_core::{Error, Tensor};
use candle_nn::ops::{log_softmax, softmax};
use rand::distr::Distribution as RandDistribution;
use rand::distr::weighted::WeightedIndex;

/// Categorical distributions over `K` actions for a batch of `N` states. Actions are `u32`
/// indices.
#[derive(Clone, Debug)]
pub struct CategoricalDistribution {
    probs: Tensor,
    log_probs: Tensor,
}

impl CategoricalDistribution {
    /// `logits` has shape `(N, K)`.
    pub fn from_logits(logits: &Tensor) -> Result<Self> {
        let probs = softmax(logits, 1)?;
        let log_probs = log_softmax(logits, 1)?;
        Ok(Self { probs, log_probs })
    }

    pub fn from_probs(probs: &Tensor) -> Result<Self> {
        let log_probs = probs.clamp(1e-8f32, 1f32)?.log()?;
        Ok(Self {
            probs: probs.clone(),
            log_probs,
        })
    }

    pub fn probs(&self) -> &Tensor {
        &self.probs
    }

    pub fn detach(&self) -> Self {
        Self {
            probs: self.probs.detach(),
            log_probs: self.log_probs.detach(),
        }
    }

    pub fn kl_divergence(&self, other: &Self) -> Result<Tensor> {
        let log_ratio = (&self.log_probs - &other.log_probs)?;
        Ok(self.probs.mul(&log_ratio)?.sum(1)?)
    }
}

impl Distribution for CategoricalDistribution {
    fn sample(&self) -> Result<Tensor> {
        let probs: Vec<Vec<f32>> = self.probs.to_vec2()?;
        let actions = RNG.with_borrow_mut(|rng| {
            probs
                .iter()
                .map(|row| {
                    let dist = WeightedIndex::new(row).map_err(Error::wrap)?;
                    Ok(dist.sample(rng) as u32)
                })
                .collect::<Result<Vec<u32>>>()
        })?;
        let n = actions.len();
        Ok(Tensor::from_vec(actions, n, self.probs.device())?)
    }

    fn log_prob(&self, actions: &Tensor) -> Result<Tensor> {
        let actions = actions.flatten_all()?.unsqueeze(1)?;
        Ok(self.log_probs.gather(&actions, 1)?.squeeze(1)?)
    }

    fn entropy(&self) -> Result<Tensor> {
        Ok(self.probs.mul(&self.log_probs)?.sum(1)?.neg()?)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.probs.dim(0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::CategoricalDistribution;
    use crate::{distributions::Distribution, rng};
    use anyhow::Result;
    use candle_core::{Device, Tensor};

    #[test]
    fn log_prob_picks_the_action_column() -> Result<()> {
        let probs = Tensor::new(&[[0.25f32, 0.75], [0.5, 0.5]], &Device::Cpu)?;
        let dist = CategoricalDistribution::from_probs(&probs)?;
        let actions = Tensor::new(&[1u32, 0], &Device::Cpu)?;
        let log_prob = dist.log_prob(&actions)?.to_vec1::<f32>()?;
        assert!((log_prob[0] - 0.75f32.ln()).abs() < 1e-6);
        assert!((log_prob[1] - 0.5f32.ln()).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn uniform_entropy_is_log_k() -> Result<()> {
        let logits = Tensor::zeros((3, 4), candle_core::DType::F32, &Device::Cpu)?;
        let dist = CategoricalDistribution::from_logits(&logits)?;
        for entropy in dist.entropy()?.to_vec1::<f32>()? {
            assert!((entropy - 4f32.ln()).abs() < 1e-5);
        }
        let kl = dist.kl_divergence(&dist.detach())?.to_vec1::<f32>()?;
        assert!(kl.iter().all(|v| v.abs() < 1e-6));
        Ok(())
    }

    #[test]
    fn sampling_respects_zero_probabilities() -> Result<()> {
        rng::seed(7);
        let probs = Tensor::new(&[[0f32, 1., 0.], [1., 0., 0.]], &Device::Cpu)?;
        let dist = CategoricalDistribution::from_probs(&probs)?;
        for _ in 0..20 {
            assert_eq!(dist.sample()?.to_vec1::<u32>()?, vec![1, 0]);
        }
        assert_eq!(dist.len()?, 2);
        Ok(())
    }
}
