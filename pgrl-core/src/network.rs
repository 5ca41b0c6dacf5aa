use crate::{
    config::NetworkConfig,
    thread_safe_sequential::{ThreadSafeSequential, build_sequential},
};
use candle_core::{Result, Tensor};
use candle_nn::{Module, VarBuilder};
use std::sync::Arc;

/// Feature extracting body followed by an output head. The body is reference counted so that
/// a value network can run on top of the policy's features.
#[derive(Debug, Clone)]
pub struct Network {
    body: Arc<ThreadSafeSequential>,
    head: ThreadSafeSequential,
    features: usize,
}

impl Network {
    pub fn build(
        input_dim: usize,
        output_dim: usize,
        config: &NetworkConfig,
        vb: &VarBuilder,
        prefix: &str,
    ) -> Result<Self> {
        let body = build_sequential(input_dim, &config.body, vb, &format!("{prefix}_body"), true)?;
        let features = body.out_dim().unwrap_or(input_dim);
        Self::with_body(Arc::new(body), features, output_dim, config, vb, prefix)
    }

    /// Builds a head on top of an existing body handle. The body parameters are not duplicated.
    pub fn with_body(
        body: Arc<ThreadSafeSequential>,
        features: usize,
        output_dim: usize,
        config: &NetworkConfig,
        vb: &VarBuilder,
        prefix: &str,
    ) -> Result<Self> {
        let mut head_layers = config.head.clone();
        head_layers.push(output_dim);
        let head = build_sequential(features, &head_layers, vb, &format!("{prefix}_head"), false)?;
        Ok(Self {
            body,
            head,
            features,
        })
    }

    pub fn body(&self) -> &Arc<ThreadSafeSequential> {
        &self.body
    }

    pub fn features(&self) -> usize {
        self.features
    }

    pub fn shares_body_with(&self, other: &Network) -> bool {
        Arc::ptr_eq(&self.body, &other.body)
    }
}

impl Module for Network {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let features = self.body.forward(xs)?;
        self.head.forward(&features)
    }
}
