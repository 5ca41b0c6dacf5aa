use crate::utils::clip_grad::clip_grad;
use candle_core::{Result, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarMap};
use std::fmt::Debug;

pub struct OptimizerWithMaxGrad {
    pub optimizer: AdamW,
    pub max_grad_norm: Option<f32>,
    pub varmap: VarMap,
}

impl Debug for OptimizerWithMaxGrad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizerWithMaxGrad")
            .field("learning_rate", &self.optimizer.learning_rate())
            .field("max_grad_norm", &self.max_grad_norm)
            .finish()
    }
}

impl OptimizerWithMaxGrad {
    pub fn new(
        varmap: VarMap,
        learning_rate: f64,
        weight_decay: f64,
        max_grad_norm: Option<f32>,
    ) -> Result<Self> {
        let params = ParamsAdamW {
            lr: learning_rate,
            weight_decay,
            ..Default::default()
        };
        let optimizer = AdamW::new(varmap.all_vars(), params)?;
        Ok(Self {
            optimizer,
            max_grad_norm,
            varmap,
        })
    }

    pub fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }

    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        let grads = if let Some(max_norm) = self.max_grad_norm {
            clip_grad(loss, &self.varmap, max_norm)?
        } else {
            loss.backward()?
        };
        self.optimizer.step(&grads)?;
        Ok(())
    }
}
