use candle_core::Tensor;
use derive_more::{Deref, DerefMut, Display};

#[derive(Deref, DerefMut, Debug, Display, Clone)]
pub struct LogProbs(pub Tensor);

#[derive(Deref, DerefMut, Debug, Display, Clone)]
pub struct ProbRatio(pub Tensor);

#[derive(Deref, DerefMut, Debug, Display, Clone)]
pub struct ValuesPred(pub Tensor);

#[derive(Deref, DerefMut, Debug, Display, Clone)]
pub struct PolicyLoss(pub Tensor);

#[derive(Deref, DerefMut, Debug, Display, Clone)]
pub struct ValueLoss(pub Tensor);

#[derive(Deref, DerefMut, Debug, Display, Clone)]
pub struct EntropyLoss(pub Tensor);
