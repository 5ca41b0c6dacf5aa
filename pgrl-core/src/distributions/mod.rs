pub mod categorical_distribution;
pub mod diagonal_distribution;

use crate::error::PgError;
use anyhow::Result;
use candle_core::Tensor;
use categorical_distribution::CategoricalDistribution;
use diagonal_distribution::DiagGaussianDistribution;
use enum_dispatch::enum_dispatch;

/// A batch of action distributions, one per state. Every method works on the whole batch and
/// returns per-state values of shape `(N,)`.
#[enum_dispatch]
pub trait Distribution {
    fn sample(&self) -> Result<Tensor>;
    fn log_prob(&self, actions: &Tensor) -> Result<Tensor>;
    fn entropy(&self) -> Result<Tensor>;
    fn len(&self) -> Result<usize>;
}

#[enum_dispatch(Distribution)]
#[derive(Debug, Clone)]
pub enum DistributionKind {
    Categorical(CategoricalDistribution),
    DiagGaussian(DiagGaussianDistribution),
}

impl DistributionKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Categorical(_) => "categorical",
            Self::DiagGaussian(_) => "diag_gaussian",
        }
    }

    /// `KL(self || other)` per state.
    pub fn kl_divergence(&self, other: &DistributionKind) -> Result<Tensor> {
        match (self, other) {
            (Self::Categorical(p), Self::Categorical(q)) => p.kl_divergence(q),
            (Self::DiagGaussian(p), Self::DiagGaussian(q)) => p.kl_divergence(q),
            _ => Err(PgError::DistributionMismatch(self.name(), other.name()).into()),
        }
    }

    /// Same distribution with its parameters cut from the autograd graph.
    pub fn detach(&self) -> Self {
        match self {
            Self::Categorical(dist) => Self::Categorical(dist.detach()),
            Self::DiagGaussian(dist) => Self::DiagGaussian(dist.detach()),
        }
    }
}
