pub mod batch;
pub mod clip_grad;
pub mod mini_batching;
pub mod rollout_buffer;
