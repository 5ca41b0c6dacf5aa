use candle_core::{Result, Tensor, backprop::GradStore};
use candle_nn::VarMap;

/// Backpropagates `loss` and rescales the gradients so that their global norm is at most
/// `max_norm`.
pub fn clip_grad(loss: &Tensor, varmap: &VarMap, max_norm: f32) -> Result<GradStore> {
    let mut grad_store = loss.backward()?;
    let all_vars = varmap.all_vars();
    let mut total_norm_squared = 0.0f32;
    for var in all_vars.iter() {
        if let Some(grad) = grad_store.get(var) {
            total_norm_squared += grad.sqr()?.sum_all()?.to_scalar::<f32>()?;
        }
    }
    let total_norm = total_norm_squared.sqrt();
    if total_norm > max_norm {
        let clip_coef = (max_norm / (total_norm + 1e-6)) as f64;
        for var in all_vars.iter() {
            if let Some(grad) = grad_store.get(var) {
                let new_grad = grad.affine(clip_coef, 0.)?;
                grad_store.insert(var, new_grad);
            }
        }
    }
    Ok(grad_store)
}

#[cfg(test)]
mod tests {
    use super::clip_grad;
    use candle_core::{DType, Device, Result};
    use candle_nn::{Init, VarMap};

    #[test]
    fn large_gradients_are_rescaled() -> Result<()> {
        let varmap = VarMap::new();
        let w = varmap.get(4, "w", Init::Const(1.), DType::F32, &Device::Cpu)?;
        let loss = w.affine(10., 0.)?.sum_all()?;
        let grads = clip_grad(&loss, &varmap, 1.)?;
        let vars = varmap.all_vars();
        let grad = grads.get(&vars[0]).unwrap();
        let norm = grad.sqr()?.sum_all()?.to_scalar::<f32>()?.sqrt();
        assert!((norm - 1.).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn small_gradients_are_untouched() -> Result<()> {
        let varmap = VarMap::new();
        let w = varmap.get(2, "w", Init::Const(1.), DType::F32, &Device::Cpu)?;
        let loss = w.affine(0.5, 0.)?.sum_all()?;
        let grads = clip_grad(&loss, &varmap, 10.)?;
        let vars = varmap.all_vars();
        let grad = grads.get(&vars[0]).unwrap().to_vec1::<f32>()?;
        assert_eq!(grad, vec![0.5, 0.5]);
        Ok(())
    }
}
