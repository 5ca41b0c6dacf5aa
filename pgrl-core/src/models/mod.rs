pub mod losses;
pub mod pg_model;
pub mod ppo_model;
pub mod reinforce_model;
pub mod surrogate_pg_model;
pub mod vanilla_pg_model;

use crate::{
    config::ModelConfig, env::EnvironmentDescription, logger::Logger, utils::batch::{Batch, BatchKey},
};
use anyhow::Result;
use candle_core::{Device, Tensor};

pub use pg_model::PGModel;
pub use ppo_model::PPOModel;
pub use reinforce_model::ReinforceModel;
pub use surrogate_pg_model::SurrogatePGModel;
pub use vanilla_pg_model::VanillaPGModel;

pub trait Model {
    /// Fields `train_step` reads. Missing ones fail the step before any update.
    fn batch_keys(&self) -> Vec<BatchKey>;

    /// One action per row of `states`.
    fn select_action(&mut self, states: &Tensor) -> Result<Tensor>;

    /// Detached value estimates, `None` without a value network.
    fn state_values(&self, states: &Tensor) -> Result<Option<Vec<f32>>>;

    fn train_step(&mut self, batch: &mut Batch) -> Result<()>;

    fn num_updates(&self) -> usize;

    fn write_logs(&mut self, logger: &mut Logger) -> Result<()>;

    fn from_config(
        config: &ModelConfig,
        description: &EnvironmentDescription,
        device: &Device,
    ) -> Result<Self>
    where
        Self: Sized;
}

impl ModelConfig {
    pub fn build<M: Model>(&self, description: &EnvironmentDescription, device: &Device) -> Result<M> {
        M::from_config(self, description, device)
    }
}
