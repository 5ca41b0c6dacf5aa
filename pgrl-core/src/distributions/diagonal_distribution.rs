use super::Distribution;
use crate::rng;
use anyhow::Result;
use candle_core::Tensor;
use std::f32;

/// Independent Gaussians per action dimension. `mean` is `(N, A)`, `log_std` is a shared `(A,)`
/// parameter vector.
#[derive(Debug, Clone)]
pub struct DiagGaussianDistribution {
    mean: Tensor,
    log_std: Tensor,
}

impl DiagGaussianDistribution {
    pub fn new(mean: Tensor, log_std: Tensor) -> Result<Self> {
        let log_std = log_std.broadcast_as(mean.shape())?;
        Ok(Self { mean, log_std })
    }

    pub fn mean(&self) -> &Tensor {
        &self.mean
    }

    pub fn std(&self) -> Result<f32> {
        Ok(self.log_std.exp()?.mean_all()?.to_scalar::<f32>()?)
    }

    pub fn detach(&self) -> Self {
        Self {
            mean: self.mean.detach(),
            log_std: self.log_std.detach(),
        }
    }

    pub fn kl_divergence(&self, other: &Self) -> Result<Tensor> {
        let var = self.log_std.exp()?.sqr()?;
        let other_var = other.log_std.exp()?.sqr()?;
        let mean_diff = (&self.mean - &other.mean)?.sqr()?;
        let kl = ((&other.log_std - &self.log_std)?
            + ((var + mean_diff)? / other_var.affine(2., 0.)?)?)?
            .affine(1., -0.5)?;
        Ok(kl.sum(1)?)
    }
}

impl Distribution for DiagGaussianDistribution {
    fn sample(&self) -> Result<Tensor> {
        let noise = rng::standard_normal(self.mean.elem_count());
        let noise = Tensor::from_vec(noise, self.mean.shape(), self.mean.device())?;
        let action = (&self.mean + self.log_std.exp()?.mul(&noise)?)?;
        Ok(action.detach())
    }

    fn log_prob(&self, actions: &Tensor) -> Result<Tensor> {
        let actions = actions.reshape(self.mean.shape())?;
        let var = self.log_std.exp()?.sqr()?;
        let log_sqrt_2pi = f32::ln(f32::sqrt(2f32 * f32::consts::PI)) as f64;
        let log_probs = (((actions - &self.mean)?.sqr()? / var.affine(2., 0.)?)?.neg()?
            - &self.log_std)?
            .affine(1., -log_sqrt_2pi)?;
        Ok(log_probs.sum(1)?)
    }

    fn entropy(&self) -> Result<Tensor> {
        let log_2pi_plus_1_div_2 = 0.5 * ((2. * std::f64::consts::PI).ln() + 1.);
        Ok(self.log_std.affine(1., log_2pi_plus_1_div_2)?.sum(1)?)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.mean.dim(0)?)
    }
}
